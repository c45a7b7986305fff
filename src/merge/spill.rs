//! Spill store for overflow sequence data.
//!
//! # Responsibilities
//! - Open one write-once/read-once resource per extra sequence field
//! - Keep small resources in memory, move large ones to anonymous temp files
//! - Compress file-backed data with LZ4 frames
//!
//! # Design Decisions
//! - Temp files are created unlinked, so nothing is left behind on crash
//! - `finish` consumes the writer: a resource cannot be read while a write is outstanding
//! - I/O is synchronous; resources are owned by a single merge session
//! - File-backed appends, finish and reads run under `block_in_place` on a
//!   multi-thread runtime so a slow disk does not stall other tasks on the
//!   worker; on a current-thread runtime they run inline

use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::config::SpillConfig;

#[derive(Debug, Error)]
pub enum SpillError {
    #[error("create spill file for {field}: {source}")]
    Create {
        field: String,
        #[source]
        source: io::Error,
    },

    #[error("write spill for {field}: {source}")]
    Write {
        field: String,
        #[source]
        source: io::Error,
    },

    #[error("finish spill for {field}: {source}")]
    Finish {
        field: String,
        #[source]
        source: io::Error,
    },

    #[error("read spill for {field}: {source}")]
    Read {
        field: String,
        #[source]
        source: io::Error,
    },
}

/// Run blocking file I/O, handing the worker off when the runtime allows it.
fn blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => tokio::task::block_in_place(f),
        _ => f(),
    }
}

/// Where an injected spill failure fires.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fault {
    Append,
    Finish,
    Read,
}

/// Creates spill resources according to the `[spill]` config.
#[derive(Debug, Clone)]
pub struct SpillStore {
    directory: Option<PathBuf>,
    memory_threshold: usize,
    compress: bool,
    #[cfg(test)]
    fault: Option<(String, Fault)>,
}

impl SpillStore {
    pub fn new(config: &SpillConfig) -> Self {
        Self {
            directory: config.directory.clone(),
            memory_threshold: config.memory_threshold_bytes,
            compress: config.compress,
            #[cfg(test)]
            fault: None,
        }
    }

    /// Fail resources for `field` at `at` with an I/O error.
    #[cfg(test)]
    pub(crate) fn with_fault(mut self, field: &str, at: Fault) -> Self {
        self.fault = Some((field.to_string(), at));
        self
    }

    #[cfg(test)]
    fn check_fault(&self, field: &str, at: Fault) -> io::Result<()> {
        match &self.fault {
            Some((name, fault)) if name == field && *fault == at => Err(io::Error::other("injected spill fault")),
            _ => Ok(()),
        }
    }

    /// Open a resource for `field`. A zero memory threshold creates the file immediately.
    pub fn open(&self, field: &str) -> Result<SpillResource, SpillError> {
        let mut resource = SpillResource {
            field: field.to_string(),
            backing: Backing::Memory(Vec::new()),
            store: self.clone(),
            written: 0,
        };
        if self.memory_threshold == 0 {
            resource.migrate()?;
        }
        Ok(resource)
    }

    fn temp_file(&self) -> io::Result<File> {
        match &self.directory {
            Some(dir) => tempfile::tempfile_in(dir),
            None => tempfile::tempfile(),
        }
    }
}

impl Default for SpillStore {
    fn default() -> Self {
        Self::new(&SpillConfig::default())
    }
}

enum Backing {
    Memory(Vec<u8>),
    Plain(BufWriter<File>),
    Compressed(FrameEncoder<File>),
}

/// Append-only sink for one sequence field, read back once via `finish`.
pub struct SpillResource {
    field: String,
    backing: Backing,
    store: SpillStore,
    written: u64,
}

impl SpillResource {
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Raw (uncompressed) bytes appended so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn is_on_disk(&self) -> bool {
        !matches!(self.backing, Backing::Memory(_))
    }

    pub fn append(&mut self, data: &[u8]) -> Result<(), SpillError> {
        if let Backing::Memory(buf) = &self.backing {
            if buf.len() + data.len() > self.store.memory_threshold {
                self.migrate()?;
            }
        }
        #[cfg(test)]
        self.store
            .check_fault(&self.field, Fault::Append)
            .map_err(|source| SpillError::Write {
                field: self.field.clone(),
                source,
            })?;
        let result = match &mut self.backing {
            Backing::Memory(buf) => {
                buf.extend_from_slice(data);
                Ok(())
            }
            Backing::Plain(w) => blocking(|| w.write_all(data)),
            Backing::Compressed(w) => blocking(|| w.write_all(data)),
        };
        result.map_err(|source| SpillError::Write {
            field: self.field.clone(),
            source,
        })?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Move the in-memory content to a temp file.
    fn migrate(&mut self) -> Result<(), SpillError> {
        blocking(|| self.migrate_now())
    }

    fn migrate_now(&mut self) -> Result<(), SpillError> {
        let file = self.store.temp_file().map_err(|source| SpillError::Create {
            field: self.field.clone(),
            source,
        })?;
        let pending = match &mut self.backing {
            Backing::Memory(buf) => std::mem::take(buf),
            _ => return Ok(()),
        };
        let mut backing = if self.store.compress {
            Backing::Compressed(FrameEncoder::new(file))
        } else {
            Backing::Plain(BufWriter::new(file))
        };
        let result = match &mut backing {
            Backing::Plain(w) => w.write_all(&pending),
            Backing::Compressed(w) => w.write_all(&pending),
            Backing::Memory(_) => Ok(()),
        };
        result.map_err(|source| SpillError::Write {
            field: self.field.clone(),
            source,
        })?;
        tracing::debug!(field = %self.field, bytes = pending.len(), compress = self.store.compress, "Spill moved to temp file");
        self.backing = backing;
        Ok(())
    }

    /// Finish writing and reopen the content for one sequential read.
    pub fn finish(self) -> Result<SpillReader, SpillError> {
        let field = self.field;
        let finish_err = |source: io::Error| SpillError::Finish {
            field: field.clone(),
            source,
        };
        #[cfg(test)]
        {
            self.store.check_fault(&field, Fault::Finish).map_err(finish_err)?;
            if self.store.check_fault(&field, Fault::Read).is_err() {
                return Ok(SpillReader::Broken);
            }
        }
        match self.backing {
            Backing::Memory(buf) => Ok(SpillReader::Memory(Cursor::new(buf))),
            Backing::Plain(w) => blocking(|| -> Result<SpillReader, SpillError> {
                let mut file = w.into_inner().map_err(|e| finish_err(e.into_error()))?;
                file.seek(SeekFrom::Start(0)).map_err(finish_err)?;
                Ok(SpillReader::Plain(BufReader::new(file)))
            }),
            Backing::Compressed(w) => blocking(|| -> Result<SpillReader, SpillError> {
                let mut file = w.finish().map_err(|e| finish_err(io::Error::other(e)))?;
                file.seek(SeekFrom::Start(0)).map_err(finish_err)?;
                Ok(SpillReader::Compressed(FrameDecoder::new(BufReader::new(file))))
            }),
        }
    }
}

/// Read side of a finished spill resource.
pub enum SpillReader {
    Memory(Cursor<Vec<u8>>),
    Plain(BufReader<File>),
    Compressed(FrameDecoder<BufReader<File>>),
    #[cfg(test)]
    Broken,
}

impl Read for SpillReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SpillReader::Memory(r) => r.read(buf),
            SpillReader::Plain(r) => blocking(|| r.read(buf)),
            SpillReader::Compressed(r) => blocking(|| r.read(buf)),
            #[cfg(test)]
            SpillReader::Broken => Err(io::Error::other("injected spill fault")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(threshold: usize, compress: bool, dir: &tempfile::TempDir) -> SpillStore {
        SpillStore::new(&SpillConfig {
            directory: Some(dir.path().to_path_buf()),
            memory_threshold_bytes: threshold,
            compress,
        })
    }

    fn read_all(resource: SpillResource) -> Vec<u8> {
        let mut out = Vec::new();
        resource.finish().unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_small_resource_stays_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let mut res = store(64, true, &dir).open("Items").unwrap();
        res.append(b"\"Items\":[").unwrap();
        res.append(b"1,2").unwrap();
        assert!(!res.is_on_disk());
        assert_eq!(res.bytes_written(), 12);
        assert_eq!(read_all(res), b"\"Items\":[1,2");
    }

    #[test]
    fn test_migrates_past_threshold() {
        let dir = tempfile::tempdir().unwrap();
        for compress in [true, false] {
            let mut res = store(16, compress, &dir).open("Rows").unwrap();
            let mut want = Vec::new();
            for i in 0..500 {
                let piece = format!("{},", i);
                res.append(piece.as_bytes()).unwrap();
                want.extend_from_slice(piece.as_bytes());
            }
            assert!(res.is_on_disk());
            assert_eq!(read_all(res), want);
        }
        // unlinked temp files leave nothing in the directory
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_zero_threshold_spills_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let res = store(0, true, &dir).open("X").unwrap();
        assert!(res.is_on_disk());
        assert!(read_all(res).is_empty());
    }

    #[test]
    fn test_missing_directory_fails_on_create() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpillStore::new(&SpillConfig {
            directory: Some(dir.path().join("missing")),
            memory_threshold_bytes: 0,
            compress: true,
        });
        assert!(matches!(store.open("X"), Err(SpillError::Create { .. })));
    }

    #[test]
    fn test_blocking_runs_inline_without_runtime() {
        assert_eq!(blocking(|| 7), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_disk_spill_on_multi_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        for compress in [true, false] {
            let mut res = store(0, compress, &dir).open("Rows").unwrap();
            res.append(b"1,2,3").unwrap();
            assert!(res.is_on_disk());
            assert_eq!(read_all(res), b"1,2,3");
        }
    }

    #[tokio::test]
    async fn test_disk_spill_on_current_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let mut res = store(0, false, &dir).open("Rows").unwrap();
        res.append(b"4,5").unwrap();
        assert_eq!(read_all(res), b"4,5");
    }
}
