//! Record wire format for the tiny batch
//!
//! Each logical write is encoded as:
//! - length (4 bytes, little-endian): full encoded span INCLUDING these 4 bytes
//! - delete flag (1 byte): 0 = set, 1 = delete
//! - key (8 bytes, little-endian)
//! - payload (variable, empty for deletes)
//!
//! The stored length is `len(payload) + 13`. A record body, as handed to the
//! write-ahead log, is the span `[offset + 4, offset + length)`: flag, key and
//! payload without the length prefix.

use crate::error::CodecError;

/// Size of the length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of flag + key at the start of every body
pub const BODY_HEADER_SIZE: usize = 1 + 8;

/// Fixed bytes per record on top of the payload
pub const RECORD_OVERHEAD: usize = LENGTH_PREFIX_SIZE + BODY_HEADER_SIZE;

/// Flag byte for a value write
pub const SET_FLAG: u8 = 0;

/// Flag byte for a tombstone
pub const DELETE_FLAG: u8 = 1;

/// Owned logical write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// True for a tombstone
    pub delete: bool,

    /// Message key, unique within a block id
    pub key: u64,

    /// Message bytes (empty for deletes)
    pub payload: Vec<u8>,
}

impl LogRecord {
    /// Value write
    #[must_use]
    pub fn set(key: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            delete: false,
            key,
            payload: payload.into(),
        }
    }

    /// Tombstone
    #[must_use]
    pub fn delete(key: u64) -> Self {
        Self {
            delete: true,
            key,
            payload: Vec::new(),
        }
    }

    /// Encode with length prefix
    ///
    /// # Errors
    ///
    /// Returns `CodecError::PayloadTooLarge` if the record span does not fit in a u32
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(RECORD_OVERHEAD + self.payload.len());
        encode_into(&mut buf, self.delete, self.key, &self.payload)?;
        Ok(buf)
    }

    /// Body bytes (no length prefix), the form stored in the write-ahead log
    #[must_use]
    pub fn body(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BODY_HEADER_SIZE + self.payload.len());
        buf.push(if self.delete { DELETE_FLAG } else { SET_FLAG });
        buf.extend_from_slice(&self.key.to_le_bytes());
        if !self.delete {
            buf.extend_from_slice(&self.payload);
        }
        buf
    }
}

/// Borrowed view of a decoded body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRef<'a> {
    pub delete: bool,
    pub key: u64,
    pub payload: &'a [u8],
}

impl RecordRef<'_> {
    #[must_use]
    pub fn to_record(&self) -> LogRecord {
        LogRecord {
            delete: self.delete,
            key: self.key,
            payload: self.payload.to_vec(),
        }
    }
}

/// Total encoded span for a payload of `payload_len` bytes
///
/// # Errors
///
/// Returns `CodecError::PayloadTooLarge` if the span does not fit in a u32
pub fn encoded_len(payload_len: usize) -> Result<u32, CodecError> {
    payload_len
        .checked_add(RECORD_OVERHEAD)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or(CodecError::PayloadTooLarge(payload_len))
}

/// Append one encoded record to `buf`
///
/// Deletes never carry a payload; any bytes passed with `delete = true` are dropped.
///
/// # Errors
///
/// Returns `CodecError::PayloadTooLarge` if the record span does not fit in a u32
pub fn encode_into(
    buf: &mut Vec<u8>,
    delete: bool,
    key: u64,
    payload: &[u8],
) -> Result<(), CodecError> {
    let payload = if delete { &[][..] } else { payload };
    let len = encoded_len(payload.len())?;

    buf.extend_from_slice(&len.to_le_bytes());
    buf.push(if delete { DELETE_FLAG } else { SET_FLAG });
    buf.extend_from_slice(&key.to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(())
}

/// Decode a body (flag, key, payload) without length prefix
///
/// The payload is whatever follows the key; the slice boundary is the caller's.
///
/// # Errors
///
/// Returns `CodecError` if the body is shorter than flag + key or the flag byte is invalid
pub fn decode_body(body: &[u8]) -> Result<RecordRef<'_>, CodecError> {
    if body.len() < BODY_HEADER_SIZE {
        return Err(CodecError::BodyTooShort { len: body.len() });
    }

    let delete = match body[0] {
        SET_FLAG => false,
        DELETE_FLAG => true,
        other => return Err(CodecError::InvalidFlag(other)),
    };

    let mut key_bytes = [0u8; 8];
    key_bytes.copy_from_slice(&body[1..BODY_HEADER_SIZE]);

    Ok(RecordRef {
        delete,
        key: u64::from_le_bytes(key_bytes),
        payload: &body[BODY_HEADER_SIZE..],
    })
}

/// Sequential scan over a buffer of length-prefixed records, yielding bodies
pub struct RecordIter<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> RecordIter<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<&'a [u8], CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.buf.len() - self.offset;
        if remaining == 0 {
            return None;
        }

        let offset = self.offset;
        if remaining < LENGTH_PREFIX_SIZE {
            self.offset = self.buf.len();
            return Some(Err(CodecError::Overrun {
                offset,
                len: remaining as u32,
                available: remaining,
            }));
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&self.buf[offset..offset + LENGTH_PREFIX_SIZE]);
        let len = u32::from_le_bytes(len_bytes);

        // Stop the scan after any framing error
        self.offset = self.buf.len();
        if (len as usize) < RECORD_OVERHEAD {
            return Some(Err(CodecError::LengthTooSmall { offset, len }));
        }
        if len as usize > remaining {
            return Some(Err(CodecError::Overrun {
                offset,
                len,
                available: remaining,
            }));
        }

        self.offset = offset + len as usize;
        Some(Ok(&self.buf[offset + LENGTH_PREFIX_SIZE..offset + len as usize]))
    }
}
