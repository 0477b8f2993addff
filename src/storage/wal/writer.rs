//! File-backed message log
//!
//! Provides committed write transactions with a single fsync per segment.
//! File I/O runs on tokio's blocking pool while the state lock is held.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::WalError;
use crate::storage::wal::format::{encode_entry, header, Frame, HEADER_SIZE};
use crate::storage::wal::reader::FileLogReader;
use crate::storage::wal::recovery::LogScan;
use crate::traits::{LogReader, LogWriter, WriteAheadLog};

/// Options for opening a message log
#[derive(Debug, Clone)]
pub struct WalOptions {
    /// Log file path
    pub path: PathBuf,

    /// File size above which a fully applied log is truncated
    pub target_size: u64,

    /// Initial capacity of each writer's transaction buffer
    pub buffer_size: usize,

    /// Enable fsync on commit (disable only for testing)
    pub fsync_enabled: bool,
}

impl WalOptions {
    pub fn new(path: impl Into<PathBuf>, target_size: u64) -> Self {
        Self {
            path: path.into(),
            target_size,
            buffer_size: 64 * 1024,
            fsync_enabled: true,
        }
    }
}

/// Mutable file state shared by the handle and its writers
#[derive(Debug)]
struct LogFile {
    /// None once closed
    file: Option<File>,

    /// Current file length
    len: u64,

    /// Highest committed segment epoch
    max_committed: Option<i64>,

    /// Highest applied epoch
    applied: Option<i64>,
}

impl LogFile {
    fn file_mut(&mut self) -> Result<&mut File, WalError> {
        self.file.as_mut().ok_or(WalError::Closed)
    }

    /// Append `bytes` at the end, rolling the file back if the write fails
    fn commit(&mut self, bytes: &[u8], fsync: bool) -> Result<(), WalError> {
        let len = self.len;
        let file = self.file_mut()?;

        let result = file
            .seek(SeekFrom::Start(len))
            .and_then(|_| file.write_all(bytes))
            .and_then(|()| if fsync { file.sync_data() } else { Ok(()) });

        if let Err(e) = result {
            // Best effort: a partial segment must not become visible
            if let Err(rollback) = file.set_len(len) {
                warn!(error = %rollback, "failed to roll back partial log write");
            }
            return Err(e.into());
        }

        self.len += bytes.len() as u64;
        Ok(())
    }

    fn is_fully_applied(&self) -> bool {
        match (self.max_committed, self.applied) {
            (None, _) => true,
            (Some(committed), Some(applied)) => committed <= applied,
            (Some(_), None) => false,
        }
    }
}

/// Single-file write-ahead log
///
/// # File Layout
///
/// See [`crate::storage::wal::format`]. Writers buffer entries in memory and
/// write them together with their closing `INIT_WRITE` marker, so a segment is
/// either fully present or absent.
#[derive(Debug, Clone)]
pub struct FileWal {
    path: PathBuf,
    options: WalOptions,
    state: Arc<Mutex<LogFile>>,
}

impl FileWal {
    /// Open or create the log
    ///
    /// Returns the handle and whether committed segments above the applied
    /// watermark were found. A torn or uncommitted tail is cut off.
    ///
    /// # Errors
    ///
    /// Returns `WalError` if the file cannot be opened, read or repaired, or
    /// does not carry a log header
    pub fn open(options: WalOptions) -> Result<(Self, bool), WalError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&options.path)?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        let (state, needs_recovery) = if contents.is_empty() {
            file.write_all(&header())?;
            if options.fsync_enabled {
                file.sync_all()?;
            }
            let state = LogFile {
                file: Some(file),
                len: HEADER_SIZE as u64,
                max_committed: None,
                applied: None,
            };
            (state, false)
        } else {
            let scan = LogScan::scan(&contents).map_err(WalError::InvalidHeader)?;

            if scan.valid_len < contents.len() as u64 {
                warn!(
                    path = %options.path.display(),
                    torn = ?scan.torn,
                    uncommitted = scan.uncommitted,
                    dropped_bytes = contents.len() as u64 - scan.valid_len,
                    "truncating log tail"
                );
                file.set_len(scan.valid_len)?;
                if options.fsync_enabled {
                    file.sync_all()?;
                }
            }

            let needs_recovery = scan.needs_recovery();
            debug!(
                path = %options.path.display(),
                segments = scan.segments.len(),
                applied = ?scan.applied,
                needs_recovery,
                "opened message log"
            );

            let state = LogFile {
                file: Some(file),
                len: scan.valid_len,
                max_committed: scan.max_committed(),
                applied: scan.applied,
            };
            (state, needs_recovery)
        };

        let wal = Self {
            path: options.path.clone(),
            options,
            state: Arc::new(Mutex::new(state)),
        };
        Ok((wal, needs_recovery))
    }

    /// Log file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file length
    pub async fn len(&self) -> u64 {
        self.state.lock().await.len
    }

    /// True if the log holds no frames
    pub async fn is_empty(&self) -> bool {
        self.len().await == HEADER_SIZE as u64
    }

    /// Run blocking file work on the blocking pool while holding the state lock
    async fn with_file<T, F>(state: &Arc<Mutex<LogFile>>, f: F) -> Result<T, WalError>
    where
        T: Send + 'static,
        F: FnOnce(&mut LogFile) -> Result<T, WalError> + Send + 'static,
    {
        let mut guard = Arc::clone(state).lock_owned().await;
        tokio::task::spawn_blocking(move || f(&mut *guard))
            .await
            .map_err(|e| WalError::Other(format!("spawn_blocking failed: {e}")))?
    }

    fn read_contents(state: &mut LogFile) -> Result<Vec<u8>, WalError> {
        let len = state.len;
        let file = state.file_mut()?;
        file.seek(SeekFrom::Start(0))?;

        let mut contents = Vec::with_capacity(len as usize);
        Read::by_ref(file).take(len).read_to_end(&mut contents)?;
        Ok(contents)
    }
}

#[async_trait]
impl WriteAheadLog for FileWal {
    async fn new_writer(&self) -> Result<Box<dyn LogWriter>, WalError> {
        if self.state.lock().await.file.is_none() {
            return Err(WalError::Closed);
        }
        Ok(Box::new(FileLogWriter {
            state: Arc::clone(&self.state),
            pending: Vec::with_capacity(self.options.buffer_size),
            fsync_enabled: self.options.fsync_enabled,
        }))
    }

    async fn new_reader(&self) -> Result<Box<dyn LogReader>, WalError> {
        let contents = Self::with_file(&self.state, Self::read_contents).await?;
        let scan = LogScan::scan(&contents).map_err(WalError::InvalidHeader)?;
        Ok(Box::new(FileLogReader::new(scan.into_unapplied())))
    }

    async fn signal_log_applied(&self, epoch: i64) -> Result<(), WalError> {
        let fsync = self.options.fsync_enabled;
        let target_size = self.options.target_size;

        Self::with_file(&self.state, move |state| {
            let mut marker = Vec::with_capacity(Frame::Applied(epoch).encoded_len());
            Frame::Applied(epoch).encode_into(&mut marker)?;
            state.commit(&marker, fsync)?;
            state.applied = Some(state.applied.map_or(epoch, |a| a.max(epoch)));

            if state.is_fully_applied() && state.len > target_size {
                let reclaimed = state.len - HEADER_SIZE as u64;
                state.file_mut()?.set_len(HEADER_SIZE as u64)?;
                state.len = HEADER_SIZE as u64;
                state.max_committed = None;

                // Keep the watermark across the truncation
                let mut marker = Vec::new();
                if let Some(applied) = state.applied {
                    Frame::Applied(applied).encode_into(&mut marker)?;
                }
                state.commit(&marker, fsync)?;
                debug!(reclaimed, epoch, "reclaimed applied log segments");
            }
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<(), WalError> {
        let fsync = self.options.fsync_enabled;
        Self::with_file(&self.state, move |state| {
            if let Some(file) = state.file.take() {
                if fsync {
                    file.sync_all()?;
                }
            }
            Ok(())
        })
        .await
    }
}

/// Buffers one transaction until its `INIT_WRITE` marker
#[derive(Debug)]
pub struct FileLogWriter {
    state: Arc<Mutex<LogFile>>,
    pending: Vec<u8>,
    fsync_enabled: bool,
}

#[async_trait]
impl LogWriter for FileLogWriter {
    async fn append(&mut self, entry: &[u8]) -> Result<(), WalError> {
        encode_entry(&mut self.pending, entry).map_err(|_| WalError::EntryTooLarge(entry.len()))
    }

    async fn signal_init_write(&mut self, epoch: i64) -> Result<(), WalError> {
        Frame::InitWrite(epoch).encode_into(&mut self.pending)?;

        let mut pending = std::mem::take(&mut self.pending);
        let fsync = self.fsync_enabled;
        let (pending, result) = FileWal::with_file(&self.state, move |state| {
            let result = state.commit(&pending, fsync);
            if result.is_ok() {
                state.max_committed = Some(state.max_committed.map_or(epoch, |m| m.max(epoch)));
            }
            pending.clear();
            Ok((pending, result))
        })
        .await?;

        // Reuse the allocation for the next transaction
        self.pending = pending;
        result
    }
}
