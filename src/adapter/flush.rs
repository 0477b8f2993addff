//! Tiny batch flush to the write-ahead log

use chrono::Utc;
use tracing::{debug, warn};

use crate::adapter::Adapter;
use crate::batch::{DrainedBatch, RecordIter};
use crate::error::AdapterResult;
use crate::traits::LogWriter;

impl Adapter {
    /// Flush every batched record to the log
    ///
    /// Flushes are serialized. The records of one flush are appended as a
    /// single log transaction closed with the NEXT epoch, after which the
    /// CURRENT epoch is acknowledged as applied. If the transaction fails the
    /// records go back to the front of the batch so a retry writes them again.
    ///
    /// Returns only once every record appended before the call is committed:
    /// a caller whose records were taken by a concurrent flush waits for that
    /// flush behind the write serializer.
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::NotOpen` on a closed adapter with pending
    /// records, `AdapterError::WalNotInstalled` before recovery, or the log's
    /// error if opening the writer, appending or signaling fails
    pub async fn write(&self) -> AdapterResult<()> {
        if self.batch.count() == 0 {
            return Ok(());
        }

        let clock = self.epoch_clock()?;
        let wal = self.wal()?;
        let mut writer = wal.new_writer().await?;

        let _serializer = self.write_lock.lock().await;

        let drained = self.batch.drain();
        if drained.is_empty() {
            // A concurrent flush committed these records while we waited
            return Ok(());
        }

        let now = Utc::now();
        let next_epoch = clock.next_epoch_at(now);
        if let Err(e) = append_transaction(writer.as_mut(), &drained, next_epoch).await {
            warn!(
                entries = drained.count,
                error = %e,
                "flush failed, records kept in batch"
            );
            self.batch.restore(drained);
            return Err(e);
        }

        debug!(
            entries = drained.count,
            bytes = drained.bytes.len(),
            epoch = next_epoch,
            "flushed tiny batch"
        );
        self.batch.complete(drained);

        // Older segments are acknowledged or timed out by now
        wal.signal_log_applied(clock.epoch_at(now)).await?;
        Ok(())
    }
}

/// Append each record body, then close the transaction with `epoch`
async fn append_transaction(
    writer: &mut dyn LogWriter,
    drained: &DrainedBatch,
    epoch: i64,
) -> AdapterResult<()> {
    for body in RecordIter::new(&drained.bytes) {
        writer.append(body?).await?;
    }
    writer.signal_init_write(epoch).await?;
    Ok(())
}
