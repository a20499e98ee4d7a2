//! Format parsers: raw bytes in, raw sample arrays + header metadata out.
//! No unit conversion happens here; that is owned by the normalization
//! engine.

mod archive;
mod ascii;
mod fits;
mod jcamp;

pub use archive::parse_zip_archive;
pub use ascii::parse_ascii;
pub use fits::parse_fits;
pub use jcamp::parse_jcamp;

use crate::domain::{FormatHint, IngestResult, RawTable};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const FITS_MAGIC: &[u8] = b"SIMPLE  =";

/// Sniffs the format from leading bytes; the fallback is the tolerant
/// ASCII parser.
pub fn detect_format(bytes: &[u8]) -> FormatHint {
    if bytes.starts_with(ZIP_MAGIC) {
        return FormatHint::ZipArchive;
    }
    if bytes.starts_with(FITS_MAGIC) {
        return FormatHint::Fits;
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]);
    if head.lines().any(|line| line.trim_start().starts_with("##")) {
        return FormatHint::Jcamp;
    }
    FormatHint::Ascii
}

/// Parses raw bytes with the declared format, auto-detecting on `Unknown`.
pub fn parse_bytes(source_name: &str, bytes: &[u8], hint: FormatHint) -> IngestResult<RawTable> {
    let format = match hint {
        FormatHint::Unknown => detect_format(bytes),
        declared => declared,
    };
    match format {
        FormatHint::ZipArchive => parse_zip_archive(source_name, bytes),
        _ => parse_member(source_name, bytes, format),
    }
}

/// Non-archive dispatch; archive members route through here so nested
/// archives cannot recurse.
pub(crate) fn parse_member(
    source_name: &str,
    bytes: &[u8],
    format: FormatHint,
) -> IngestResult<RawTable> {
    match format {
        FormatHint::Ascii => parse_ascii(source_name, bytes),
        FormatHint::Jcamp => parse_jcamp(source_name, bytes),
        FormatHint::Fits => parse_fits(source_name, bytes),
        FormatHint::ZipArchive | FormatHint::Unknown => parse_ascii(source_name, bytes),
    }
}
