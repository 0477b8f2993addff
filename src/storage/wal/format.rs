//! Message log file format
//!
//! - Header (5 bytes): magic "UDBW", version
//! - Frames (variable), appended in commit order:
//!   - `ENTRY`: tag, len (u32), crc (u32), body
//!   - `INIT_WRITE`: tag, epoch (i64), crc (u32); closes the entries before it
//!   - `APPLIED`: tag, epoch (i64), crc (u32); raises the applied watermark
//!
//! All integers are little-endian. Each crc is CRC32 over the tag and every
//! field that precedes it in the frame.

use std::io;

/// Log file magic bytes "UDBW"
pub const LOG_MAGIC: [u8; 4] = *b"UDBW";

/// Current log format version
pub const LOG_VERSION: u8 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 5;

pub const TAG_ENTRY: u8 = 0x01;
pub const TAG_INIT_WRITE: u8 = 0x02;
pub const TAG_APPLIED: u8 = 0x03;

/// CRC32 algorithm for log frames
const CRC_ALGORITHM: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISCSI);

const ENTRY_PREFIX_SIZE: usize = 1 + 4 + 4;
const MARKER_SIZE: usize = 1 + 8 + 4;

/// Encoded file header
#[must_use]
pub fn header() -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[..4].copy_from_slice(&LOG_MAGIC);
    buf[4] = LOG_VERSION;
    buf
}

/// Validate the file header
///
/// # Errors
///
/// Returns a description of the mismatch
pub fn check_header(buf: &[u8]) -> Result<(), String> {
    if buf.len() < HEADER_SIZE {
        return Err(format!("file is {} bytes, shorter than header", buf.len()));
    }
    if buf[..4] != LOG_MAGIC {
        return Err(format!("bad magic {:02x?}", &buf[..4]));
    }
    if buf[4] != LOG_VERSION {
        return Err(format!("unsupported version {}", buf[4]));
    }
    Ok(())
}

/// One log frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Record body appended by a writer
    Entry(Vec<u8>),

    /// End of a write transaction tagged with its epoch
    InitWrite(i64),

    /// Every segment up to this epoch is applied
    Applied(i64),
}

/// Why a frame could not be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer ends inside the frame
    Truncated,

    /// Unknown tag or checksum mismatch
    Corrupt(String),
}

impl Frame {
    /// Serialized size
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Frame::Entry(body) => ENTRY_PREFIX_SIZE + body.len(),
            Frame::InitWrite(_) | Frame::Applied(_) => MARKER_SIZE,
        }
    }

    /// Serialize frame onto `buf`
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if an entry body is larger than a u32 length allows
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        match self {
            Frame::Entry(body) => encode_entry(buf, body),
            Frame::InitWrite(epoch) => {
                encode_marker(buf, TAG_INIT_WRITE, *epoch);
                Ok(())
            }
            Frame::Applied(epoch) => {
                encode_marker(buf, TAG_APPLIED, *epoch);
                Ok(())
            }
        }
    }

    /// Decode the frame at the start of `buf`
    ///
    /// Returns the frame and the number of bytes it occupies, or `None` when
    /// `buf` is empty.
    ///
    /// # Errors
    ///
    /// Returns `FrameError` if the frame is cut short or fails its checksum
    pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
        let Some(&tag) = buf.first() else {
            return Ok(None);
        };

        match tag {
            TAG_ENTRY => {
                if buf.len() < ENTRY_PREFIX_SIZE {
                    return Err(FrameError::Truncated);
                }
                let len = u32::from_le_bytes(read_array(&buf[1..5])) as usize;
                let crc = u32::from_le_bytes(read_array(&buf[5..9]));
                let end = ENTRY_PREFIX_SIZE
                    .checked_add(len)
                    .ok_or(FrameError::Truncated)?;
                if buf.len() < end {
                    return Err(FrameError::Truncated);
                }
                let body = &buf[ENTRY_PREFIX_SIZE..end];
                if entry_crc(&buf[..5], body) != crc {
                    return Err(FrameError::Corrupt("entry checksum mismatch".into()));
                }
                Ok(Some((Frame::Entry(body.to_vec()), end)))
            }
            TAG_INIT_WRITE | TAG_APPLIED => {
                if buf.len() < MARKER_SIZE {
                    return Err(FrameError::Truncated);
                }
                let crc = u32::from_le_bytes(read_array(&buf[9..13]));
                if CRC_ALGORITHM.checksum(&buf[..9]) != crc {
                    return Err(FrameError::Corrupt("marker checksum mismatch".into()));
                }
                let epoch = i64::from_le_bytes(read_array(&buf[1..9]));
                let frame = if tag == TAG_INIT_WRITE {
                    Frame::InitWrite(epoch)
                } else {
                    Frame::Applied(epoch)
                };
                Ok(Some((frame, MARKER_SIZE)))
            }
            other => Err(FrameError::Corrupt(format!("unknown frame tag {other:#04x}"))),
        }
    }
}

/// Serialize an entry frame without copying the body into a `Frame`
///
/// # Errors
///
/// Returns `io::Error` if the body is larger than a u32 length allows
pub fn encode_entry(buf: &mut Vec<u8>, body: &[u8]) -> io::Result<()> {
    let len = u32::try_from(body.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "entry too large"))?;

    let start = buf.len();
    buf.push(TAG_ENTRY);
    buf.extend_from_slice(&len.to_le_bytes());
    let crc = entry_crc(&buf[start..start + 5], body);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf.extend_from_slice(body);
    Ok(())
}

fn encode_marker(buf: &mut Vec<u8>, tag: u8, epoch: i64) {
    let start = buf.len();
    buf.push(tag);
    buf.extend_from_slice(&epoch.to_le_bytes());
    let crc = CRC_ALGORITHM.checksum(&buf[start..start + 9]);
    buf.extend_from_slice(&crc.to_le_bytes());
}

fn entry_crc(prefix: &[u8], body: &[u8]) -> u32 {
    let mut digest = CRC_ALGORITHM.digest();
    digest.update(prefix);
    digest.update(body);
    digest.finalize()
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(frame: &Frame) -> Vec<u8> {
        let mut buf = Vec::new();
        frame.encode_into(&mut buf).unwrap();
        assert_eq!(buf.len(), frame.encoded_len());
        buf
    }

    #[test]
    fn test_header_check() {
        assert!(check_header(&header()).is_ok());
        assert!(check_header(b"UDBW").is_err());
        assert!(check_header(b"ATLW\x01").is_err());
        assert!(check_header(b"UDBW\x09").is_err());
    }

    #[test]
    fn test_frame_sequence_decodes() {
        let frames = vec![
            Frame::Entry(b"first body".to_vec()),
            Frame::Entry(Vec::new()),
            Frame::InitWrite(1_700_000_001_000),
            Frame::Applied(-5),
        ];
        let mut buf = Vec::new();
        for f in &frames {
            f.encode_into(&mut buf).unwrap();
        }

        let mut offset = 0;
        let mut decoded = Vec::new();
        while let Some((frame, used)) = Frame::decode(&buf[offset..]).unwrap() {
            decoded.push(frame);
            offset += used;
        }
        assert_eq!(decoded, frames);
        assert_eq!(offset, buf.len());
    }

    #[test]
    fn test_truncated_entry() {
        let buf = encode(&Frame::Entry(b"abcdef".to_vec()));
        for cut in 1..buf.len() {
            assert_eq!(
                Frame::decode(&buf[..cut]),
                Err(FrameError::Truncated),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn test_corrupted_entry_body() {
        let mut buf = encode(&Frame::Entry(b"abcdef".to_vec()));
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        assert!(matches!(Frame::decode(&buf), Err(FrameError::Corrupt(_))));
    }

    #[test]
    fn test_corrupted_marker() {
        let mut buf = encode(&Frame::InitWrite(42));
        buf[3] ^= 0x01;
        assert!(matches!(Frame::decode(&buf), Err(FrameError::Corrupt(_))));
    }

    #[test]
    fn test_unknown_tag() {
        assert!(matches!(
            Frame::decode(&[0x7F, 0, 0]),
            Err(FrameError::Corrupt(_))
        ));
    }
}
