//! Write-ahead log replay on startup

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::adapter::{ensure_dir, Adapter};
use crate::batch::{decode_body, BODY_HEADER_SIZE};
use crate::error::AdapterResult;
use crate::storage::{FileWal, WalOptions};
use crate::traits::{PendingWrites, WriteAheadLog};

impl Adapter {
    /// Open the message log and rebuild the writes it holds that were not
    /// yet applied
    ///
    /// With `reset` pending log contents are discarded: every committed
    /// segment is marked applied and an empty map is returned.
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if the adapter is not open, the directory or log
    /// cannot be opened, or replay fails
    pub async fn recovery(&self, reset: bool) -> AdapterResult<PendingWrites> {
        let config = self.config()?;
        ensure_dir(&config.dir)?;

        let options = WalOptions {
            path: config.wal_path(),
            target_size: config.size,
            buffer_size: config.batch_capacity(),
            fsync_enabled: config.fsync_enabled,
        };
        let (wal, needs_recovery) = FileWal::open(options)?;

        self.recover_with(Arc::new(wal), needs_recovery, reset).await
    }

    /// Replay (or with `reset`, discard) an already opened log and install
    /// it for flushing
    ///
    /// The log is only installed once this succeeds; on failure it is closed
    /// and no partial map is returned.
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if the adapter is not open or replay fails
    pub async fn recover_with(
        &self,
        wal: Arc<dyn WriteAheadLog>,
        needs_recovery: bool,
        reset: bool,
    ) -> AdapterResult<PendingWrites> {
        self.config()?;
        let _serializer = self.write_lock.lock().await;

        let outcome = if !needs_recovery {
            info!(reset, "log is clean, nothing to recover");
            Ok(PendingWrites::new())
        } else if reset {
            discard(wal.as_ref()).await.map(|()| PendingWrites::new())
        } else {
            replay(wal.as_ref()).await.map(|(pending, last_epoch)| {
                *self
                    .replayed_epoch
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = last_epoch;
                pending
            })
        };

        let pending = match outcome {
            Ok(pending) => pending,
            Err(e) => {
                if let Err(close_err) = wal.close().await {
                    warn!(error = %close_err, "failed to close log after recovery error");
                }
                return Err(e);
            }
        };

        let previous = self
            .wal
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(wal);
        if let Some(previous) = previous {
            if let Err(e) = previous.close().await {
                warn!(error = %e, "failed to close replaced log");
            }
        }
        Ok(pending)
    }

    /// Write recovered messages to the engine under `block_id`, then mark
    /// the replayed segments applied
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if an engine write or the apply signal fails
    pub async fn apply_pending(&self, block_id: u64, pending: &PendingWrites) -> AdapterResult<()> {
        let mut keys: Vec<u64> = pending.keys().copied().collect();
        keys.sort_unstable();
        for key in keys {
            self.put_message(block_id, key, &pending[&key]).await?;
        }

        let wal = self.wal()?;
        let current = self.epoch_clock()?.current();
        let replayed = self
            .replayed_epoch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let epoch = replayed.map_or(current, |r| r.max(current));

        wal.signal_log_applied(epoch).await?;
        info!(block_id, applied = pending.len(), epoch, "applied recovered messages");
        Ok(())
    }
}

/// Mark every unapplied segment applied without reading its entries
async fn discard(wal: &dyn WriteAheadLog) -> AdapterResult<()> {
    let mut reader = wal.new_reader().await?;
    let mut last_epoch: Option<i64> = None;
    let mut segments = 0usize;

    while let Some(epoch) = reader.next_segment()? {
        segments += 1;
        last_epoch = Some(last_epoch.map_or(epoch, |e| e.max(epoch)));
    }

    if let Some(epoch) = last_epoch {
        wal.signal_log_applied(epoch).await?;
    }
    info!(segments, epoch = ?last_epoch, "log reset, pending segments discarded");
    Ok(())
}

/// Walk every unapplied segment oldest to newest, folding records into the
/// pending map
///
/// A tombstone removes its key; a value overwrites it. Returns the map and the
/// highest segment epoch seen.
async fn replay(wal: &dyn WriteAheadLog) -> AdapterResult<(PendingWrites, Option<i64>)> {
    let mut reader = wal.new_reader().await?;
    let mut pending = PendingWrites::new();
    let mut last_epoch = None;
    let mut segments = 0usize;
    let mut entries = 0usize;

    while let Some(epoch) = reader.next_segment()? {
        segments += 1;
        last_epoch = Some(last_epoch.map_or(epoch, |e: i64| e.max(epoch)));

        let count = reader.count();
        for _ in 0..count {
            let Some(mut entry) = reader.next()? else {
                break;
            };
            entries += 1;

            let record = decode_body(&entry)?;
            let (delete, key) = (record.delete, record.key);
            if delete {
                pending.remove(&key);
            } else {
                pending.insert(key, entry.split_off(BODY_HEADER_SIZE));
            }
        }
        debug!(epoch, count, "replayed log segment");
    }

    info!(
        segments,
        entries,
        pending = pending.len(),
        "log recovery complete"
    );
    Ok((pending, last_epoch))
}

