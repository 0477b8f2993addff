//! Common test utilities
//!
//! - `MockWal`: recording write-ahead log with injectable failures
//! - Record body builders for scripting reader segments

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};

use unitdb_adapter::batch::LogRecord;
use unitdb_adapter::error::WalError;
use unitdb_adapter::{AdapterConfig, LogReader, LogWriter, WriteAheadLog};

/// One call observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    NewWriter,
    NewReader,
    Append(Vec<u8>),
    InitWrite(i64),
    Applied(i64),
    Close,
}

/// Which calls should fail
#[derive(Debug, Default, Clone)]
pub struct Failures {
    pub new_writer: bool,
    pub new_reader: bool,
    /// Fail the Nth append (0-based, counted across all writers)
    pub append_at: Option<usize>,
    pub init_write: bool,
    pub applied: bool,
    /// Fail the Nth `next` on the reader
    pub read_at: Option<usize>,
}

#[derive(Debug, Default)]
struct Inner {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<Failures>,
    segments: Mutex<Vec<(i64, Vec<Vec<u8>>)>>,
    appends: AtomicUsize,
    in_flight: AtomicUsize,
    overlapped: AtomicBool,
    closed: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    entered: Notify,
}

/// Recording log
#[derive(Debug, Clone, Default)]
pub struct MockWal {
    inner: Arc<Inner>,
}

impl MockWal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log whose reader yields `segments`
    pub fn with_segments(segments: Vec<(i64, Vec<Vec<u8>>)>) -> Self {
        let wal = Self::new();
        *wal.inner.segments.lock().unwrap() = segments;
        wal
    }

    pub fn set_failures(&self, failures: Failures) {
        *self.inner.failures.lock().unwrap() = failures;
    }

    pub fn clear_failures(&self) {
        self.set_failures(Failures::default());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.inner.calls.lock().unwrap().clear();
    }

    /// Bodies appended, in order
    pub fn appended(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Append(body) => Some(body),
                _ => None,
            })
            .collect()
    }

    /// True if two writers ever had open transactions at the same time
    pub fn overlapped(&self) -> bool {
        self.inner.overlapped.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Park every append until a permit is added to the returned gate
    pub fn gate_appends(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.inner.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Resolves once an append is parked at the gate
    pub async fn append_parked(&self) {
        self.inner.entered.notified().await;
    }

    /// True once a transaction was closed with `INIT_WRITE`
    pub fn committed(&self) -> bool {
        self.calls().iter().any(|c| matches!(c, Call::InitWrite(_)))
    }

    fn record(&self, call: Call) {
        self.inner.calls.lock().unwrap().push(call);
    }

    fn failures(&self) -> Failures {
        self.inner.failures.lock().unwrap().clone()
    }
}

#[async_trait]
impl WriteAheadLog for MockWal {
    async fn new_writer(&self) -> Result<Box<dyn LogWriter>, WalError> {
        self.record(Call::NewWriter);
        if self.failures().new_writer {
            return Err(WalError::Other("new_writer failed".into()));
        }
        Ok(Box::new(MockWriter {
            wal: self.clone(),
            started: false,
        }))
    }

    async fn new_reader(&self) -> Result<Box<dyn LogReader>, WalError> {
        self.record(Call::NewReader);
        if self.failures().new_reader {
            return Err(WalError::Other("new_reader failed".into()));
        }
        Ok(Box::new(MockReader {
            segments: self.inner.segments.lock().unwrap().clone().into(),
            current: VecDeque::new(),
            count: 0,
            reads: 0,
            fail_at: self.failures().read_at,
        }))
    }

    async fn signal_log_applied(&self, epoch: i64) -> Result<(), WalError> {
        self.record(Call::Applied(epoch));
        if self.failures().applied {
            return Err(WalError::Other("applied failed".into()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), WalError> {
        self.record(Call::Close);
        self.inner.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Writer that flags overlapping transactions
struct MockWriter {
    wal: MockWal,
    started: bool,
}

impl MockWriter {
    fn finish(&mut self) {
        if self.started {
            self.started = false;
            self.wal.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockWriter {
    fn drop(&mut self) {
        self.finish();
    }
}

#[async_trait]
impl LogWriter for MockWriter {
    async fn append(&mut self, entry: &[u8]) -> Result<(), WalError> {
        if !self.started {
            self.started = true;
            if self.wal.inner.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.wal.inner.overlapped.store(true, Ordering::SeqCst);
            }
        }

        let gate = self.wal.inner.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.wal.inner.entered.notify_one();
            gate.acquire()
                .await
                .map_err(|e| WalError::Other(e.to_string()))?
                .forget();
        }

        let n = self.wal.inner.appends.fetch_add(1, Ordering::SeqCst);
        if self.wal.failures().append_at == Some(n) {
            return Err(WalError::Other(format!("append {n} failed")));
        }
        self.wal.record(Call::Append(entry.to_vec()));

        // Give other flushes a chance to interleave
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn signal_init_write(&mut self, epoch: i64) -> Result<(), WalError> {
        self.wal.record(Call::InitWrite(epoch));
        let result = if self.wal.failures().init_write {
            Err(WalError::Other("init_write failed".into()))
        } else {
            Ok(())
        };
        self.finish();
        result
    }
}

struct MockReader {
    segments: VecDeque<(i64, Vec<Vec<u8>>)>,
    current: VecDeque<Vec<u8>>,
    count: u32,
    reads: usize,
    fail_at: Option<usize>,
}

impl LogReader for MockReader {
    fn next_segment(&mut self) -> Result<Option<i64>, WalError> {
        match self.segments.pop_front() {
            Some((epoch, entries)) => {
                self.count = entries.len() as u32;
                self.current = entries.into();
                Ok(Some(epoch))
            }
            None => {
                self.count = 0;
                Ok(None)
            }
        }
    }

    fn count(&self) -> u32 {
        self.count
    }

    fn next(&mut self) -> Result<Option<Vec<u8>>, WalError> {
        let n = self.reads;
        self.reads += 1;
        if self.fail_at == Some(n) {
            return Err(WalError::Other(format!("read {n} failed")));
        }
        Ok(self.current.pop_front())
    }
}

// ========== Fixtures ==========

/// Body of a value record
pub fn set_body(key: u64, payload: &[u8]) -> Vec<u8> {
    LogRecord::set(key, payload.to_vec()).body()
}

/// Body of a tombstone
pub fn del_body(key: u64) -> Vec<u8> {
    LogRecord::delete(key).body()
}

/// Config under `dir` with the given epoch window
pub fn config_in(dir: &TempDir, window: Duration) -> AdapterConfig {
    AdapterConfig {
        dir: dir.path().join("db"),
        size: 1 << 20,
        epoch_window: window,
        fsync_enabled: false,
    }
}
