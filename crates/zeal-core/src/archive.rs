//! Single-file docset archives.
//!
//! A `<title>.zealdocset` archive is an SQLite database with one table,
//! `files(path, blob)`, where each row is one original file compressed
//! with gzip and keyed by its intra-docset path. Archives are written once
//! by the ingest pipeline and then opened read-only per extraction.

use std::io::{self, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rusqlite::{Connection, OpenFlags, OptionalExtension};

use crate::{Error, Result};

/// An open docset archive.
pub struct DocsetArchive {
    conn: Connection,
}

impl DocsetArchive {
    /// Creates (or resets) an archive for writing.
    pub fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "DROP TABLE IF EXISTS files;
             CREATE TABLE files(path TEXT, blob BLOB);",
        )?;
        Ok(Self { conn })
    }

    /// Opens an existing archive read-only.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Stores one already-compressed file under its intra-docset path.
    pub fn insert(&self, path: &str, gz_blob: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT INTO files(path, blob) VALUES (?1, ?2)",
            (path, gz_blob),
        )?;
        Ok(())
    }

    /// Decompresses the file stored under `path` into `sink`.
    pub fn extract_to(&self, path: &str, sink: &mut dyn Write) -> Result<()> {
        let blob: Option<Vec<u8>> = self
            .conn
            .query_row("SELECT blob FROM files WHERE path = ?1", [path], |row| {
                row.get(0)
            })
            .optional()?;
        let Some(blob) = blob else {
            return Err(Error::NotFound(path.to_string()));
        };
        let mut decoder = GzDecoder::new(blob.as_slice());
        io::copy(&mut decoder, sink)
            .map_err(|e| Error::Corrupt(format!("gunzip of {path} failed: {e}")))?;
        Ok(())
    }

    /// Number of stored files.
    pub fn file_count(&self) -> Result<u64> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// One-shot extraction with a short-lived connection.
pub fn extract_file(archive: &Path, entry: &str, sink: &mut dyn Write) -> Result<()> {
    DocsetArchive::open(archive)?.extract_to(entry, sink)
}

/// Gzips a buffer the way archive blobs are stored.
pub(crate) fn gzip_bytes(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("Foo.zealdocset");
        let body = b"<html><body>hello docs</body></html>";

        let archive = DocsetArchive::create(&path).unwrap();
        archive
            .insert(
                "Foo.docset/Contents/Resources/Documents/a.html",
                &gzip_bytes(body).unwrap(),
            )
            .unwrap();
        drop(archive);

        let mut out = Vec::new();
        extract_file(
            &path,
            "Foo.docset/Contents/Resources/Documents/a.html",
            &mut out,
        )
        .unwrap();
        assert_eq!(out, body);
    }

    #[test]
    fn missing_entry_is_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("Foo.zealdocset");
        DocsetArchive::create(&path).unwrap();

        let mut out = Vec::new();
        let err = extract_file(&path, "nope.html", &mut out).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn create_resets_previous_contents() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("Foo.zealdocset");

        let archive = DocsetArchive::create(&path).unwrap();
        archive.insert("old.html", &gzip_bytes(b"old").unwrap()).unwrap();
        drop(archive);

        let archive = DocsetArchive::create(&path).unwrap();
        assert_eq!(archive.file_count().unwrap(), 0);
    }

    #[test]
    fn open_missing_archive_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(DocsetArchive::open(&tmp.path().join("absent.zealdocset")).is_err());
    }
}
