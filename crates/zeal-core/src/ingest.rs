//! Streaming docset install pipeline.
//!
//! A docset arrives as a tarball (raw or gzipped). One reader walks the tar
//! entries, a pool of workers gzips each file, and a single writer
//! serializes the inserts into the archive database:
//!
//! ```text
//! tar reader -> bounded work queue -> N compressors -> write queue -> sqlite
//! ```
//!
//! The work queue is bounded by the worker count, so the reader blocks
//! instead of buffering the whole tarball. Progress is fanned out on every
//! entry; the reported byte count is clamped below the stream total until
//! the caller has finished reindexing and broadcasts the final event
//! itself.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::bounded;
use flate2::read::GzDecoder;
use tar::EntryType;
use tracing::{debug, info};

use crate::archive::{gzip_bytes, DocsetArchive};
use crate::progress::{ProgressEvent, ProgressHandlers};
use crate::{Error, Result};

/// Counts bytes as they are pulled from the underlying stream.
pub struct ReaderWithProgress<R> {
    inner: R,
    bytes_read: Arc<AtomicU64>,
}

impl<R: Read> ReaderWithProgress<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared counter of bytes consumed so far.
    #[must_use]
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bytes_read)
    }
}

impl<R: Read> Read for ReaderWithProgress<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Rewrites a tar entry path so its first component becomes
/// `<title>.docset`. Docsets whose tar root differs from their title (a
/// "Lua 5.1" docset shipping a "Lua" root directory) are normalized here.
fn rebase_entry_path(title: &str, raw: &str) -> String {
    let rest = raw.split_once('/').map_or(raw, |(_, rest)| rest);
    format!("{title}.docset/{rest}")
}

/// Streams a docset tarball into `archive_path`.
///
/// `input` may be a raw tar or a gzipped one; the gzip magic is sniffed
/// from the first bytes. `total` is the expected stream length in bytes
/// (0 when unknown) and is only used for progress reporting. All pipeline
/// threads are joined before the archive database is closed; on return the
/// archive is complete and durable.
pub fn install_stream(
    input: impl Read,
    repo_id: &str,
    title: &str,
    total: u64,
    archive_path: &Path,
    progress: &ProgressHandlers,
) -> Result<()> {
    let reader = ReaderWithProgress::new(input);
    let bytes_read = reader.counter();
    let mut buffered = BufReader::new(reader);

    let head = buffered.fill_buf()?;
    let is_gzip = head.len() >= 2 && head[0] == 0x1f && head[1] == 0x8b;
    let stream: Box<dyn Read + '_> = if is_gzip {
        Box::new(GzDecoder::new(buffered))
    } else {
        Box::new(buffered)
    };
    let mut tar = tar::Archive::new(stream);

    let workers = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    let (work_tx, work_rx) = bounded::<(String, Vec<u8>)>(workers);
    let (write_tx, write_rx) = bounded::<(String, Vec<u8>)>(workers);

    info!(title, repo_id, workers, "installing docset");

    std::thread::scope(|s| {
        let compressors: Vec<_> = (0..workers)
            .map(|_| {
                let work_rx = work_rx.clone();
                let write_tx = write_tx.clone();
                s.spawn(move || -> Result<()> {
                    for (path, bytes) in work_rx {
                        let gz = gzip_bytes(&bytes)?;
                        if write_tx.send((path, gz)).is_err() {
                            // Writer is gone; its own error is reported below.
                            break;
                        }
                    }
                    Ok(())
                })
            })
            .collect();
        drop(work_rx);
        drop(write_tx);

        let writer = s.spawn(move || -> Result<()> {
            let archive = DocsetArchive::create(archive_path)?;
            let mut inserted = 0u64;
            for (path, gz) in write_rx {
                archive.insert(&path, &gz)?;
                inserted += 1;
            }
            debug!(inserted, "archive writer finished");
            Ok(())
        });

        let fed = (|| -> Result<()> {
            for entry in tar
                .entries()
                .map_err(|e| Error::Corrupt(format!("bad tar stream: {e}")))?
            {
                let mut entry =
                    entry.map_err(|e| Error::Corrupt(format!("bad tar entry: {e}")))?;
                if entry.header().entry_type() != EntryType::Regular {
                    continue;
                }
                let raw_path = entry
                    .path()
                    .map_err(|e| Error::Corrupt(format!("bad tar entry path: {e}")))?
                    .to_string_lossy()
                    .into_owned();

                let mut body = Vec::with_capacity(entry.size() as usize);
                entry
                    .read_to_end(&mut body)
                    .map_err(|e| Error::Corrupt(format!("truncated tar entry {raw_path}: {e}")))?;

                if work_tx
                    .send((rebase_entry_path(title, &raw_path), body))
                    .is_err()
                {
                    break;
                }

                let read = bytes_read.load(Ordering::Relaxed);
                let clamped = if total > 0 { read.min(total - 1) } else { read };
                progress.broadcast(&ProgressEvent::new(repo_id, title, clamped, total));
            }
            Ok(())
        })();
        // Closing the work queue lets the compressors drain and exit, which
        // in turn closes the write queue and stops the writer.
        drop(work_tx);

        let mut first_err = fed.err();
        for handle in compressors {
            match handle.join() {
                Ok(Ok(())) => {},
                Ok(Err(e)) => {
                    first_err.get_or_insert(e);
                },
                Err(_) => {
                    first_err.get_or_insert(Error::Corrupt("compressor thread panicked".into()));
                },
            }
        }
        match writer.join() {
            Ok(Ok(())) => {},
            Ok(Err(e)) => {
                first_err.get_or_insert(e);
            },
            Err(_) => {
                first_err.get_or_insert(Error::Corrupt("archive writer thread panicked".into()));
            },
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    })
}
