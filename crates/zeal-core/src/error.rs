//! Error types for zeal-core operations.
//!
//! All fallible public functions return [`Result`]. The variants mirror how
//! failures surface at the HTTP boundary: [`Error::NotFound`] becomes a 404,
//! [`Error::Network`] a 502-ish upstream failure, and the rest a 500 with
//! the error text as the body.

use thiserror::Error;

/// The error type shared by all zeal-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog or archive fetch from an upstream mirror failed.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Catalog database or docset archive query failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A gzip, tar, XML, or JSON payload could not be decoded.
    #[error("corrupt payload: {0}")]
    Corrupt(String),

    /// Archive row, docset, or group lookup miss.
    #[error("not found: {0}")]
    NotFound(String),

    /// Data directory resolution or bookkeeping failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// True for lookup misses that the HTTP layer maps to 404.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(format!("invalid JSON: {err}"))
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_distinguishable() {
        let err = Error::NotFound("docs/missing.html".into());
        assert!(err.is_not_found());
        assert!(!Error::Corrupt("bad gzip".into()).is_not_found());
    }

    #[test]
    fn display_includes_context() {
        let err = Error::NotFound("Foo.docset/a.html".into());
        assert_eq!(err.to_string(), "not found: Foo.docset/a.html");
    }
}
