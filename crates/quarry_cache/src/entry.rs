//! On-disk cache entry layout.
//!
//! Every cache file (state and fingerprint alike) starts with a small
//! bincode-encoded header carrying magic bytes, a format version, the
//! tool version, and a checksum of the payload. The payload itself is a
//! sealed codec stream. Header validation on read is fail-safe: a
//! missing, foreign, stale, or corrupt entry is a cache miss, never an
//! error.

use crate::error::CacheError;
use quarry_codec::WriteContext;
use quarry_common::ContentHash;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Magic bytes identifying a Quarry cache entry.
const ENTRY_MAGIC: [u8; 4] = *b"QRRY";

/// Current entry format version. Increment on breaking changes to the
/// header or payload layout.
const ENTRY_FORMAT_VERSION: u32 = 1;

/// Header prepended to every cache entry for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryHeader {
    /// Magic bytes: must be `b"QRRY"`.
    magic: [u8; 4],

    /// Entry format version.
    format_version: u32,

    /// Quarry version that produced this entry.
    tool_version: String,

    /// Content hash of the payload (for corruption detection).
    checksum: ContentHash,
}

/// Writes a cache entry: header, then the sealed payload produced by
/// `body`.
///
/// The payload is assembled in memory first so the checksum can be
/// computed and nothing touches the filesystem until encoding has run
/// to completion; an encoder failure therefore creates no file at all.
/// The caller is responsible for the parent directory existing.
pub fn write_entry(
    path: &Path,
    tool_version: &str,
    body: impl FnOnce(&mut WriteContext<'_>) -> Result<(), CacheError>,
) -> Result<(), CacheError> {
    let mut payload = Vec::new();
    {
        let mut ctx = WriteContext::new(&mut payload);
        body(&mut ctx)?;
        ctx.seal()?;
    }

    let header = EntryHeader {
        magic: ENTRY_MAGIC,
        format_version: ENTRY_FORMAT_VERSION,
        tool_version: tool_version.to_string(),
        checksum: ContentHash::from_bytes(&payload),
    };
    let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
        .map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;

    // Layout: 4-byte header length (little-endian) + header + payload
    let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    output.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(&payload);

    std::fs::write(path, &output).map_err(|e| CacheError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Reads a cache entry's payload, validating its header.
///
/// Returns `None` if the file does not exist, the header is invalid,
/// the format or tool version does not match, or the checksum does not
/// verify. This is fail-safe: corruption results in a cache miss.
pub fn read_entry(path: &Path, tool_version: &str) -> Option<Vec<u8>> {
    let raw = std::fs::read(path).ok()?;

    if raw.len() < 4 {
        return None;
    }
    let header_len = u32::from_le_bytes(raw[..4].try_into().ok()?) as usize;
    if raw.len() < 4 + header_len {
        return None;
    }

    let header: EntryHeader =
        bincode::serde::decode_from_slice(&raw[4..4 + header_len], bincode::config::standard())
            .ok()?
            .0;

    if header.magic != ENTRY_MAGIC {
        return None;
    }
    if header.format_version != ENTRY_FORMAT_VERSION {
        return None;
    }
    if header.tool_version != tool_version {
        return None;
    }

    let payload = &raw[4 + header_len..];
    if ContentHash::from_bytes(payload) != header.checksum {
        return None;
    }

    Some(payload.to_vec())
}
