//! Data directory resolution.
//!
//! Docset archives and the catalog database live together in one data
//! directory so a single backup captures everything the server owns.

use std::path::{Path, PathBuf};

use directories::BaseDirs;

use crate::{Error, Result};

/// File name of the persistent catalog database inside the data directory.
pub const CATALOG_DB_NAME: &str = "zealcore_cache.sqlite3";

/// Resolved locations for archives and the catalog database.
#[derive(Debug, Clone)]
pub struct Config {
    data_dir: PathBuf,
}

impl Config {
    /// Resolves the default data directory.
    ///
    /// Order: `ZEAL_DATA_DIR` override, then `XDG_DATA_HOME/zealcore`, then
    /// `~/.local/share/zealcore`.
    pub fn new() -> Result<Self> {
        if let Ok(dir) = std::env::var("ZEAL_DATA_DIR") {
            let trimmed = dir.trim();
            if !trimmed.is_empty() {
                return Self::with_data_dir(PathBuf::from(trimmed));
            }
        }

        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            let trimmed = xdg.trim();
            if !trimmed.is_empty() {
                return Self::with_data_dir(PathBuf::from(trimmed).join("zealcore"));
            }
        }

        let base = BaseDirs::new()
            .ok_or_else(|| Error::Storage("failed to determine home directory".into()))?;
        Self::with_data_dir(base.home_dir().join(".local/share/zealcore"))
    }

    /// Creates a config rooted at an explicit data directory, creating it if
    /// needed.
    pub fn with_data_dir(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| Error::Storage(format!("failed to create data directory: {e}")))?;
        Ok(Self { data_dir })
    }

    /// The directory holding archives and the catalog database.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the archive for a docset title.
    #[must_use]
    pub fn archive_path(&self, title: &str) -> PathBuf {
        self.data_dir.join(format!("{title}.zealdocset"))
    }

    /// Path of the persistent catalog database.
    #[must_use]
    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join(CATALOG_DB_NAME)
    }
}
