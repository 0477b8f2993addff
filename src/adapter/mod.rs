//! Message store adapter
//!
//! Coordinates the tiny batch, the write-ahead log and the key-value engine.
//! Client writes are appended to the batch, flushed to the log one flush at a
//! time, and replayed from the log on restart. Direct put/get/delete calls go
//! straight to the engine.

mod flush;
mod recovery;

use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::batch::{EpochClock, TinyBatch};
use crate::config::{AdapterConfig, ADAPTER_NAME, MAX_RESULTS};
use crate::error::{AdapterError, AdapterResult, ConfigError};
use crate::storage::MemEngine;
use crate::traits::{MessageEngine, MessageStore, PendingWrites, WriteAheadLog};

/// Version reported while the adapter is open
pub const DB_VERSION: i32 = 1;

/// Tiny-batch write-ahead log adapter
///
/// Construct one instance, open it, run [`Adapter::recovery`] and hand it to
/// whatever selects a store; there is no process-wide registry.
pub struct Adapter {
    /// Set by `open`, cleared by `close`
    config: StdRwLock<Option<AdapterConfig>>,

    /// Primary engine; `Some` exactly while open
    engine: StdRwLock<Option<Arc<dyn MessageEngine>>>,

    /// Installed by recovery
    wal: StdRwLock<Option<Arc<dyn WriteAheadLog>>>,

    /// Writes not yet flushed to the log
    batch: TinyBatch,

    /// Write serializer: one log transaction at a time
    write_lock: Mutex<()>,

    /// Highest segment epoch seen by the last replay
    replayed_epoch: StdMutex<Option<i64>>,

    version: AtomicI32,
}

impl Default for Adapter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("open", &self.is_open())
            .field("wal_installed", &self.has_wal())
            .field("batched", &self.batch.count())
            .field("version", &self.version())
            .finish()
    }
}

impl Adapter {
    /// Closed adapter with an empty batch
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: StdRwLock::new(None),
            engine: StdRwLock::new(None),
            wal: StdRwLock::new(None),
            batch: TinyBatch::default(),
            write_lock: Mutex::new(()),
            replayed_epoch: StdMutex::new(None),
            version: AtomicI32::new(-1),
        }
    }

    /// Name the adapter is selected by
    #[must_use]
    pub fn name(&self) -> &'static str {
        ADAPTER_NAME
    }

    /// Open with the bundled in-memory engine sized by `config.size`
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if already open, the config is invalid, or the
    /// directory cannot be created
    pub fn open(&self, config: AdapterConfig) -> AdapterResult<()> {
        let engine = Arc::new(MemEngine::open(config.size));
        self.open_with_engine(config, engine)
    }

    /// Open with an injected engine
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if already open, the config is invalid, or the
    /// directory cannot be created
    pub fn open_with_engine(
        &self,
        config: AdapterConfig,
        engine: Arc<dyn MessageEngine>,
    ) -> AdapterResult<()> {
        let mut slot = self
            .engine
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return Err(AdapterError::AlreadyOpen);
        }

        config.validate()?;
        ensure_dir(&config.dir)?;
        self.batch.reserve(config.batch_capacity())?;

        info!(
            dir = %config.dir.display(),
            size = config.size,
            epoch_window_ms = config.epoch_window.as_millis() as u64,
            "opening unitdb adapter"
        );

        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(config);
        *slot = Some(engine);
        self.version.store(DB_VERSION, Ordering::Release);
        Ok(())
    }

    /// Close the engine and the log
    ///
    /// Both are closed even if the first fails; the first error is returned.
    /// Closing a closed adapter is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if the engine or the log fails to close
    pub async fn close(&self) -> AdapterResult<()> {
        let Some(engine) = self
            .engine
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        else {
            return Ok(());
        };
        let wal = self
            .wal
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        self.config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        self.version.store(-1, Ordering::Release);

        let pending = self.batch.count();
        if pending > 0 {
            warn!(pending, "closing adapter with unflushed records");
        }

        let mut result = engine.close().await.map_err(AdapterError::from);
        if let Some(wal) = wal {
            let wal_result = wal.close().await;
            if result.is_ok() {
                result = wal_result.map_err(AdapterError::from);
            }
        }
        info!("closed unitdb adapter");
        result
    }

    /// True once `open` succeeded; does not check that the engine is live
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.engine
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// True once recovery installed a log
    #[must_use]
    pub fn has_wal(&self) -> bool {
        self.wal
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Storage version while open, -1 otherwise
    #[must_use]
    pub fn version(&self) -> i32 {
        self.version.load(Ordering::Acquire)
    }

    /// Records not yet committed to the log
    #[must_use]
    pub fn batched(&self) -> u32 {
        self.batch.count()
    }

    /// Encoded bytes waiting for the next flush
    #[must_use]
    pub fn batched_bytes(&self) -> usize {
        self.batch.byte_len()
    }

    /// Buffer a write (or tombstone) for the next flush
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::Batch` if the batch cannot take the record
    pub fn append(&self, delete: bool, key: u64, payload: &[u8]) -> AdapterResult<()> {
        self.batch.append(delete, key, payload)?;
        Ok(())
    }

    /// Store a message directly in the engine
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::NotOpen` or the engine's error
    pub async fn put_message(&self, block_id: u64, key: u64, payload: &[u8]) -> AdapterResult<()> {
        self.engine()?.set(block_id, key, payload).await?;
        Ok(())
    }

    /// Fetch a message directly from the engine
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::NotOpen` or the engine's error
    pub async fn get_message(&self, block_id: u64, key: u64) -> AdapterResult<Vec<u8>> {
        Ok(self.engine()?.get(block_id, key).await?)
    }

    /// Delete a message directly from the engine
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::NotOpen` or the engine's error
    pub async fn delete_message(&self, block_id: u64, key: u64) -> AdapterResult<()> {
        self.engine()?.remove(block_id, key).await?;
        Ok(())
    }

    /// Keys stored under `block_id`, at most `MAX_RESULTS`
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::NotOpen`
    pub async fn keys(&self, block_id: u64) -> AdapterResult<Vec<u64>> {
        let mut keys = self.engine()?.keys(block_id).await;
        keys.truncate(MAX_RESULTS);
        Ok(keys)
    }

    fn engine(&self) -> AdapterResult<Arc<dyn MessageEngine>> {
        self.engine
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(AdapterError::NotOpen)
    }

    fn wal(&self) -> AdapterResult<Arc<dyn WriteAheadLog>> {
        self.wal
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(AdapterError::WalNotInstalled)
    }

    fn config(&self) -> AdapterResult<AdapterConfig> {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(AdapterError::NotOpen)
    }

    fn epoch_clock(&self) -> AdapterResult<EpochClock> {
        Ok(EpochClock::new(self.config()?.epoch_window))
    }
}

/// Create `dir` if missing
fn ensure_dir(dir: &Path) -> Result<(), ConfigError> {
    std::fs::create_dir_all(dir).map_err(|source| ConfigError::CreateDir {
        path: dir.display().to_string(),
        source,
    })
}

#[async_trait]
impl MessageStore for Adapter {
    fn name(&self) -> &'static str {
        Adapter::name(self)
    }

    async fn open(&self, config: AdapterConfig) -> AdapterResult<()> {
        Adapter::open(self, config)
    }

    async fn close(&self) -> AdapterResult<()> {
        Adapter::close(self).await
    }

    fn is_open(&self) -> bool {
        Adapter::is_open(self)
    }

    async fn put_message(&self, block_id: u64, key: u64, payload: &[u8]) -> AdapterResult<()> {
        Adapter::put_message(self, block_id, key, payload).await
    }

    async fn get_message(&self, block_id: u64, key: u64) -> AdapterResult<Vec<u8>> {
        Adapter::get_message(self, block_id, key).await
    }

    async fn delete_message(&self, block_id: u64, key: u64) -> AdapterResult<()> {
        Adapter::delete_message(self, block_id, key).await
    }

    async fn keys(&self, block_id: u64) -> AdapterResult<Vec<u64>> {
        Adapter::keys(self, block_id).await
    }

    fn append(&self, delete: bool, key: u64, payload: &[u8]) -> AdapterResult<()> {
        Adapter::append(self, delete, key, payload)
    }

    async fn write(&self) -> AdapterResult<()> {
        Adapter::write(self).await
    }

    async fn recovery(&self, reset: bool) -> AdapterResult<PendingWrites> {
        Adapter::recovery(self, reset).await
    }
}
