//! Journal file format for [`FileQueue`](crate::FileQueue).
//!
//! # File Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ Header (8 bytes): "EVQJ" + ver u32 │
//! ├────────────────────────────────────┤
//! │ Frame 1                            │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! └────────────────────────────────────┘
//! ```
//!
//! # Frame Layout
//!
//! ```text
//! ┌─────────────────┬──────────┬─────────────────────┬──────────┐
//! │ Length (4 bytes)│ Tag (1)  │ Payload (variable)  │ CRC32 (4)│
//! └─────────────────┴──────────┴─────────────────────┴──────────┘
//! ```
//!
//! The length covers tag, payload and CRC. The CRC covers tag and payload.
//! All integers are little-endian.

use crc32fast::Hasher;

/// Magic bytes identifying a journal file
pub const JOURNAL_MAGIC: [u8; 4] = *b"EVQJ";

/// Current journal layout version
pub const JOURNAL_FORMAT_VERSION: u32 = 1;

/// Size of the file header
pub const JOURNAL_HEADER_SIZE: usize = 8;

/// Upper bound on a single frame's length field; anything larger is treated
/// as garbage on read and refused on write
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Length taken by an append frame before any record: tag, count and CRC
const APPEND_FRAME_OVERHEAD: usize = 1 + 4 + 4;

/// Length prefix of each record inside an append frame
const RECORD_PREFIX_LEN: usize = 4;

const TAG_APPEND: u8 = 0x01;
const TAG_REMOVE_TAIL: u8 = 0x02;
const TAG_CLEAR: u8 = 0x03;
const TAG_SET_VERSION: u8 = 0x04;

/// One journaled queue mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalOp {
    /// Records appended at the head, oldest first
    Append(Vec<String>),
    /// Records removed from the tail
    RemoveTail(u64),
    /// All records removed
    Clear,
    /// Encoding version marker replaced
    SetVersion(String),
}

/// Frame decoding failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Not enough bytes for a complete frame (torn write)
    #[error("insufficient data")]
    InsufficientData,
    /// Stored checksum does not match
    #[error("checksum mismatch: expected {expected:#x}, computed {computed:#x}")]
    ChecksumMismatch {
        /// CRC stored in the frame
        expected: u32,
        /// CRC computed over the frame
        computed: u32,
    },
    /// Structurally invalid frame
    #[error("invalid frame: {0}")]
    InvalidFormat(String),
    /// Frame would exceed [`MAX_FRAME_LEN`]
    #[error("frame length {len} exceeds limit {max}")]
    TooLarge {
        /// Length the frame would need
        len: usize,
        /// Largest length accepted
        max: usize,
    },
}

/// Encode the file header
pub fn header_bytes() -> [u8; JOURNAL_HEADER_SIZE] {
    let mut bytes = [0u8; JOURNAL_HEADER_SIZE];
    bytes[0..4].copy_from_slice(&JOURNAL_MAGIC);
    bytes[4..8].copy_from_slice(&JOURNAL_FORMAT_VERSION.to_le_bytes());
    bytes
}

/// Validate the file header
pub fn check_header(bytes: &[u8]) -> Result<(), FrameError> {
    if bytes.len() < JOURNAL_HEADER_SIZE {
        return Err(FrameError::InsufficientData);
    }
    if bytes[0..4] != JOURNAL_MAGIC {
        return Err(FrameError::InvalidFormat("bad journal magic".to_string()));
    }
    let version = read_u32(&bytes[4..8]);
    if version != JOURNAL_FORMAT_VERSION {
        return Err(FrameError::InvalidFormat(format!(
            "unsupported journal version {}",
            version
        )));
    }
    Ok(())
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

impl JournalOp {
    /// Serialize to a complete frame.
    ///
    /// Fails with [`FrameError::TooLarge`] instead of producing a frame that
    /// [`JournalOp::from_frame`] would reject.
    pub fn to_frame(&self) -> Result<Vec<u8>, FrameError> {
        match self {
            JournalOp::Append(records) => append_frame(records),
            JournalOp::RemoveTail(count) => {
                let mut body = vec![TAG_REMOVE_TAIL];
                body.extend_from_slice(&count.to_le_bytes());
                seal(body)
            }
            JournalOp::Clear => seal(vec![TAG_CLEAR]),
            JournalOp::SetVersion(version) => {
                let mut body = vec![TAG_SET_VERSION];
                body.extend_from_slice(version.as_bytes());
                seal(body)
            }
        }
    }

    /// Parse one frame from the start of `bytes`.
    ///
    /// Returns the operation and the number of bytes consumed.
    pub fn from_frame(bytes: &[u8]) -> Result<(Self, usize), FrameError> {
        if bytes.len() < 4 {
            return Err(FrameError::InsufficientData);
        }
        let length = read_u32(&bytes[0..4]) as usize;
        if length < 5 || length > MAX_FRAME_LEN {
            return Err(FrameError::InvalidFormat(format!("frame length {}", length)));
        }
        if bytes.len() < 4 + length {
            return Err(FrameError::InsufficientData);
        }

        let body = &bytes[4..4 + length - 4];
        let expected = read_u32(&bytes[4 + length - 4..4 + length]);
        let computed = compute_crc(body);
        if expected != computed {
            return Err(FrameError::ChecksumMismatch { expected, computed });
        }

        let payload = &body[1..];
        let op = match body[0] {
            TAG_APPEND => JournalOp::Append(decode_records(payload)?),
            TAG_REMOVE_TAIL => {
                if payload.len() != 8 {
                    return Err(FrameError::InvalidFormat("remove-tail payload".to_string()));
                }
                JournalOp::RemoveTail(read_u64(payload))
            }
            TAG_CLEAR => JournalOp::Clear,
            TAG_SET_VERSION => JournalOp::SetVersion(
                String::from_utf8(payload.to_vec())
                    .map_err(|e| FrameError::InvalidFormat(e.to_string()))?,
            ),
            tag => return Err(FrameError::InvalidFormat(format!("unknown tag {:#x}", tag))),
        };
        Ok((op, 4 + length))
    }
}

/// Frame an append of `records` without cloning them
pub fn append_frame(records: &[String]) -> Result<Vec<u8>, FrameError> {
    let payload: usize = records.iter().map(|r| RECORD_PREFIX_LEN + r.len()).sum();
    let mut body = Vec::with_capacity(1 + 4 + payload);
    body.push(TAG_APPEND);
    body.extend_from_slice(&(records.len() as u32).to_le_bytes());
    for record in records {
        body.extend_from_slice(&(record.len() as u32).to_le_bytes());
        body.extend_from_slice(record.as_bytes());
    }
    seal(body)
}

/// Split `records` into runs that each fit in one append frame of at most
/// `max_frame_len`. Order is preserved; a record that cannot fit on its own
/// is an error.
pub fn append_chunks(
    records: &[String],
    max_frame_len: usize,
) -> Result<Vec<&[String]>, FrameError> {
    let budget = max_frame_len.saturating_sub(APPEND_FRAME_OVERHEAD);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut used = 0;
    for (i, record) in records.iter().enumerate() {
        let cost = RECORD_PREFIX_LEN + record.len();
        if cost > budget {
            return Err(FrameError::TooLarge {
                len: APPEND_FRAME_OVERHEAD + cost,
                max: max_frame_len,
            });
        }
        if used + cost > budget {
            chunks.push(&records[start..i]);
            start = i;
            used = 0;
        }
        used += cost;
    }
    if start < records.len() {
        chunks.push(&records[start..]);
    }
    Ok(chunks)
}

fn seal(body: Vec<u8>) -> Result<Vec<u8>, FrameError> {
    let total_len = body.len() + 4;
    if total_len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            len: total_len,
            max: MAX_FRAME_LEN,
        });
    }
    let crc = compute_crc(&body);
    let mut frame = Vec::with_capacity(4 + total_len);
    frame.extend_from_slice(&(total_len as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

fn decode_records(payload: &[u8]) -> Result<Vec<String>, FrameError> {
    let truncated = || FrameError::InvalidFormat("append payload truncated".to_string());
    if payload.len() < 4 {
        return Err(truncated());
    }
    let count = read_u32(&payload[0..4]) as usize;
    let mut records = Vec::with_capacity(count.min(1 << 16));
    let mut cursor = 4;
    for _ in 0..count {
        if payload.len() < cursor + 4 {
            return Err(truncated());
        }
        let len = read_u32(&payload[cursor..cursor + 4]) as usize;
        cursor += 4;
        if payload.len() < cursor + len {
            return Err(truncated());
        }
        let record = String::from_utf8(payload[cursor..cursor + len].to_vec())
            .map_err(|e| FrameError::InvalidFormat(e.to_string()))?;
        records.push(record);
        cursor += len;
    }
    if cursor != payload.len() {
        return Err(FrameError::InvalidFormat("trailing bytes in append".to_string()));
    }
    Ok(records)
}
