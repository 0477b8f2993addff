//! Replay tests against scripted log segments

mod common;

use std::sync::Arc;

use tempfile::{tempdir, TempDir};

use common::{config_in, del_body, set_body, Call, Failures, MockWal};
use unitdb_adapter::config::MAX_TTL;
use unitdb_adapter::error::{CodecError, EngineError};
use unitdb_adapter::storage::MemEngine;
use unitdb_adapter::{Adapter, AdapterError};

fn open_adapter() -> (Adapter, TempDir) {
    let dir = tempdir().unwrap();
    let adapter = Adapter::new();
    adapter.open(config_in(&dir, MAX_TTL)).unwrap();
    (adapter, dir)
}

#[tokio::test]
async fn test_tombstone_removes_earlier_value() {
    let (adapter, _dir) = open_adapter();
    let wal = MockWal::with_segments(vec![
        (1_000, vec![set_body(1, b"a"), set_body(2, b"b")]),
        (2_000, vec![del_body(1)]),
    ]);

    let pending = adapter
        .recover_with(Arc::new(wal.clone()), true, false)
        .await
        .unwrap();

    assert_eq!(pending.len(), 1);
    assert_eq!(pending[&2], b"b".to_vec());
    assert!(adapter.has_wal());
    assert!(!wal.is_closed());
}

#[tokio::test]
async fn test_last_value_wins() {
    let (adapter, _dir) = open_adapter();
    let wal = MockWal::with_segments(vec![(1_000, vec![set_body(5, b"x"), set_body(5, b"y")])]);

    let pending = adapter
        .recover_with(Arc::new(wal), true, false)
        .await
        .unwrap();

    assert_eq!(pending.len(), 1);
    assert_eq!(pending[&5], b"y".to_vec());
}

#[tokio::test]
async fn test_value_after_tombstone_is_restored() {
    let (adapter, _dir) = open_adapter();
    let wal = MockWal::with_segments(vec![
        (1_000, vec![set_body(1, b"old"), del_body(1)]),
        (2_000, vec![set_body(1, b"new")]),
    ]);

    let pending = adapter
        .recover_with(Arc::new(wal), true, false)
        .await
        .unwrap();

    assert_eq!(pending[&1], b"new".to_vec());
}

#[tokio::test]
async fn test_delete_of_absent_key_is_ignored() {
    let (adapter, _dir) = open_adapter();
    let wal = MockWal::with_segments(vec![(1_000, vec![del_body(42), set_body(7, b"z")])]);

    let pending = adapter
        .recover_with(Arc::new(wal), true, false)
        .await
        .unwrap();

    assert_eq!(pending.len(), 1);
    assert!(pending.contains_key(&7));
}

#[tokio::test]
async fn test_clean_log_skips_reader() {
    let (adapter, _dir) = open_adapter();
    let wal = MockWal::with_segments(vec![(1_000, vec![set_body(1, b"a")])]);

    let pending = adapter
        .recover_with(Arc::new(wal.clone()), false, false)
        .await
        .unwrap();

    assert!(pending.is_empty());
    assert!(!wal.calls().contains(&Call::NewReader));
    assert!(adapter.has_wal());
}

#[tokio::test]
async fn test_reset_marks_pending_segments_applied() {
    let (adapter, _dir) = open_adapter();
    let wal = MockWal::with_segments(vec![
        (1_000, vec![set_body(1, b"a")]),
        (3_000, vec![set_body(2, b"b")]),
    ]);

    let pending = adapter
        .recover_with(Arc::new(wal.clone()), true, true)
        .await
        .unwrap();

    assert!(pending.is_empty());
    assert_eq!(wal.calls(), vec![Call::NewReader, Call::Applied(3_000)]);
    assert!(adapter.has_wal());
}

#[tokio::test]
async fn test_reset_on_clean_log_touches_nothing() {
    let (adapter, _dir) = open_adapter();
    let wal = MockWal::new();

    let pending = adapter
        .recover_with(Arc::new(wal.clone()), false, true)
        .await
        .unwrap();

    assert!(pending.is_empty());
    assert!(wal.calls().is_empty());
}

#[tokio::test]
async fn test_failed_reset_is_not_installed() {
    let (adapter, _dir) = open_adapter();
    let wal = MockWal::with_segments(vec![(1_000, vec![set_body(1, b"a")])]);
    wal.set_failures(Failures {
        applied: true,
        ..Default::default()
    });

    let err = adapter
        .recover_with(Arc::new(wal.clone()), true, true)
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::Wal(_)));
    assert!(wal.is_closed());
    assert!(!adapter.has_wal());
}

#[tokio::test]
async fn test_undecodable_entry_aborts_recovery() {
    let (adapter, _dir) = open_adapter();
    let wal = MockWal::with_segments(vec![(1_000, vec![set_body(1, b"a"), vec![0u8; 3]])]);

    let err = adapter
        .recover_with(Arc::new(wal.clone()), true, false)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AdapterError::Codec(CodecError::BodyTooShort { len: 3 })
    ));
    assert!(wal.is_closed());
    assert!(!adapter.has_wal());
}

#[tokio::test]
async fn test_invalid_flag_aborts_recovery() {
    let (adapter, _dir) = open_adapter();
    let mut body = set_body(1, b"a");
    body[0] = 9;
    let wal = MockWal::with_segments(vec![(1_000, vec![body])]);

    let err = adapter
        .recover_with(Arc::new(wal.clone()), true, false)
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::Codec(CodecError::InvalidFlag(9))));
    assert!(wal.is_closed());
}

#[tokio::test]
async fn test_read_failure_aborts_recovery() {
    let (adapter, _dir) = open_adapter();
    let wal = MockWal::with_segments(vec![(1_000, vec![set_body(1, b"a"), set_body(2, b"b")])]);
    wal.set_failures(Failures {
        read_at: Some(1),
        ..Default::default()
    });

    let err = adapter
        .recover_with(Arc::new(wal.clone()), true, false)
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::Wal(_)));
    assert!(wal.is_closed());
    assert!(!adapter.has_wal());
}

#[tokio::test]
async fn test_recovery_requires_open_adapter() {
    let adapter = Adapter::new();
    let wal = MockWal::new();

    let err = adapter
        .recover_with(Arc::new(wal.clone()), true, false)
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::NotOpen));
    assert!(wal.calls().is_empty());
}

#[tokio::test]
async fn test_second_recovery_closes_previous_log() {
    let (adapter, _dir) = open_adapter();
    let first = MockWal::new();
    let second = MockWal::new();

    adapter
        .recover_with(Arc::new(first.clone()), false, false)
        .await
        .unwrap();
    adapter
        .recover_with(Arc::new(second.clone()), false, false)
        .await
        .unwrap();

    assert!(first.is_closed());
    assert!(!second.is_closed());
}

#[tokio::test]
async fn test_apply_pending_signals_replayed_epoch() {
    let (adapter, _dir) = open_adapter();
    // Segment stamped far in the future, as a clock step back would leave it
    let future = i64::MAX / 2;
    let wal = MockWal::with_segments(vec![(future, vec![set_body(3, b"c")])]);

    let pending = adapter
        .recover_with(Arc::new(wal.clone()), true, false)
        .await
        .unwrap();
    adapter.apply_pending(11, &pending).await.unwrap();

    assert_eq!(adapter.get_message(11, 3).await.unwrap(), b"c".to_vec());
    assert_eq!(wal.calls().last(), Some(&Call::Applied(future)));
}

#[tokio::test]
async fn test_apply_pending_surfaces_engine_errors() {
    let dir = tempdir().unwrap();
    let adapter = Adapter::new();
    adapter
        .open_with_engine(config_in(&dir, MAX_TTL), Arc::new(MemEngine::open(4)))
        .unwrap();
    let wal = MockWal::with_segments(vec![(1_000, vec![set_body(1, b"too large")])]);

    let pending = adapter
        .recover_with(Arc::new(wal.clone()), true, false)
        .await
        .unwrap();
    let err = adapter.apply_pending(0, &pending).await.unwrap_err();

    assert!(matches!(
        err,
        AdapterError::Engine(EngineError::CapacityExceeded { capacity: 4 })
    ));
    assert!(!wal.calls().iter().any(|c| matches!(c, Call::Applied(_))));
}
