//! Chunk-file codec: a small fixed header followed by a zstd frame of
//! little-endian columnar `f64` arrays. Writes are atomic at file
//! granularity (write temp, then rename); a partially written temp file is
//! never visible under the final name.

use crate::domain::{CacheError, CacheResult};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

pub(super) const CHUNK_MAGIC: &[u8; 4] = b"SPCH";
pub(super) const CHUNK_FORMAT_VERSION: u32 = 1;
pub(super) const ZSTD_LEVEL: i32 = 3;

pub fn encode_columns(path: &Path, columns: &[&[f64]]) -> CacheResult<Vec<u8>> {
    let Some(first) = columns.first() else {
        return Err(CacheError::CorruptChunk {
            path: path.to_path_buf(),
            reason: "cannot encode zero columns".to_string(),
        });
    };
    let sample_count = first.len();
    if columns.iter().any(|column| column.len() != sample_count) {
        return Err(CacheError::CorruptChunk {
            path: path.to_path_buf(),
            reason: "column lengths disagree".to_string(),
        });
    }

    let mut payload = Vec::with_capacity(columns.len() * sample_count * 8);
    for column in columns {
        for value in *column {
            payload.extend_from_slice(&value.to_le_bytes());
        }
    }
    let compressed = zstd::encode_all(payload.as_slice(), ZSTD_LEVEL).map_err(|source| {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let mut bytes = Vec::with_capacity(16 + compressed.len());
    bytes.extend_from_slice(CHUNK_MAGIC);
    push_u32(&mut bytes, CHUNK_FORMAT_VERSION);
    push_u32(&mut bytes, columns.len() as u32);
    push_u32(&mut bytes, sample_count as u32);
    bytes.extend_from_slice(&compressed);
    Ok(bytes)
}

pub fn decode_columns(path: &Path, bytes: &[u8]) -> CacheResult<Vec<Vec<f64>>> {
    let corrupt = |reason: &str| CacheError::CorruptChunk {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if !bytes.starts_with(CHUNK_MAGIC) {
        return Err(corrupt("missing chunk magic"));
    }
    let mut offset = CHUNK_MAGIC.len();
    let version = take_u32(bytes, &mut offset).ok_or_else(|| corrupt("truncated header"))?;
    if version != CHUNK_FORMAT_VERSION {
        return Err(corrupt(&format!("unsupported chunk format version {version}")));
    }
    let column_count =
        take_u32(bytes, &mut offset).ok_or_else(|| corrupt("truncated header"))? as usize;
    let sample_count =
        take_u32(bytes, &mut offset).ok_or_else(|| corrupt("truncated header"))? as usize;

    let payload = zstd::decode_all(&bytes[offset..]).map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if payload.len() != column_count * sample_count * 8 {
        return Err(corrupt("payload length disagrees with header"));
    }

    let mut columns = Vec::with_capacity(column_count);
    for column_index in 0..column_count {
        let start = column_index * sample_count * 8;
        let mut column = Vec::with_capacity(sample_count);
        for sample in payload[start..start + sample_count * 8].chunks_exact(8) {
            column.push(f64::from_le_bytes([
                sample[0], sample[1], sample[2], sample[3], sample[4], sample[5], sample[6],
                sample[7],
            ]));
        }
        columns.push(column);
    }
    Ok(columns)
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> CacheResult<()> {
    // Temp names are unique per writer so concurrent re-ingests of the
    // same source never interleave inside one temp file; the rename stays
    // the only point where data becomes visible.
    static WRITE_SEQUENCE: AtomicU64 = AtomicU64::new(0);
    let sequence = WRITE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(
        "{file_name}.part-{}-{sequence}",
        std::process::id()
    ));

    fs::write(&temp, bytes).map_err(|source| CacheError::Io {
        path: temp.clone(),
        source,
    })?;
    fs::rename(&temp, path).map_err(|source| CacheError::AtomicWrite {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_file(path: &Path) -> CacheResult<Vec<u8>> {
    fs::read(path).map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn push_u32(target: &mut Vec<u8>, value: u32) {
    target.extend_from_slice(&value.to_le_bytes());
}

fn take_u32(bytes: &[u8], offset: &mut usize) -> Option<u32> {
    let end = offset.checked_add(std::mem::size_of::<u32>())?;
    let slice = bytes.get(*offset..end)?;
    let value = u32::from_le_bytes(slice.try_into().ok()?);
    *offset = end;
    Some(value)
}
