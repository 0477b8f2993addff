//! Adapter error types

use std::collections::TryReserveError;

use thiserror::Error;

/// Main adapter error type
#[derive(Debug, Error)]
pub enum AdapterError {
    // ========== Connection Errors ==========
    /// `open` called on an adapter that already holds an engine
    #[error("unitdb adapter is already connected")]
    AlreadyOpen,

    /// Operation requires an open adapter
    #[error("unitdb adapter is not connected")]
    NotOpen,

    /// `write` called before recovery installed a WAL handle
    #[error("write-ahead log not installed, run recovery first")]
    WalNotInstalled,

    // ========== Configuration Errors ==========
    /// Invalid or unusable configuration (fatal at startup)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    // ========== Core Errors ==========
    /// Tiny batch could not accept a record
    #[error("batch error: {0}")]
    Batch(#[from] BatchError),

    /// Record bytes could not be decoded
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    // ========== Collaborator Errors ==========
    /// Write-ahead log failure (open, append, signal, read)
    #[error("wal error: {0}")]
    Wal(#[from] WalError),

    /// Key-value engine failure, forwarded verbatim
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Directory missing and could not be created
    #[error("unable to create db dir {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Epoch window outside (0, MAX_TTL]
    #[error("epoch window {0:?} must be non-zero and at most 24h")]
    InvalidEpochWindow(std::time::Duration),

    /// Size of zero leaves no room for buffers or engine storage
    #[error("size must be greater than zero")]
    ZeroSize,
}

/// Tiny batch errors
#[derive(Debug, Error)]
pub enum BatchError {
    /// Backing buffer could not grow
    #[error("batch buffer allocation failed: {0}")]
    Alloc(#[from] TryReserveError),

    /// Batch already holds `u32::MAX` records
    #[error("batch entry count overflow")]
    CountOverflow,

    /// Record could not be encoded
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Record codec errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Body shorter than flag + key
    #[error("record body too short: {len} bytes")]
    BodyTooShort { len: usize },

    /// Delete flag byte was neither 0 nor 1
    #[error("invalid delete flag byte: {0:#04x}")]
    InvalidFlag(u8),

    /// Length prefix smaller than the fixed record overhead
    #[error("record length {len} at offset {offset} is below the minimum")]
    LengthTooSmall { offset: usize, len: u32 },

    /// Length prefix points past the end of the buffer
    #[error("record at offset {offset} with length {len} overruns buffer of {available} bytes")]
    Overrun {
        offset: usize,
        len: u32,
        available: usize,
    },

    /// Payload too large for the u32 length prefix
    #[error("payload of {0} bytes does not fit a record")]
    PayloadTooLarge(usize),
}

/// Write-ahead log errors
#[derive(Debug, Error)]
pub enum WalError {
    /// I/O error from the log file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File does not start with the expected header
    #[error("invalid log header: {0}")]
    InvalidHeader(String),

    /// Handle was closed
    #[error("log is closed")]
    Closed,

    /// Entry larger than the frame length field allows
    #[error("entry of {0} bytes is too large")]
    EntryTooLarge(usize),

    /// Any other failure reported by a log implementation
    #[error("{0}")]
    Other(String),
}

/// Key-value engine errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Key absent under block id
    #[error("key {key} not found in block {block_id}")]
    NotFound { block_id: u64, key: u64 },

    /// Storing the payload would exceed the engine's capacity
    #[error("capacity of {capacity} bytes exceeded")]
    CapacityExceeded { capacity: u64 },

    /// Engine was closed
    #[error("engine is closed")]
    Closed,

    /// Any other failure reported by an engine implementation
    #[error("{0}")]
    Other(String),
}

/// Result type for adapter operations
pub type AdapterResult<T> = Result<T, AdapterError>;
