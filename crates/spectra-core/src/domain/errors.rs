use crate::domain::AxisKind;
use std::path::PathBuf;

pub type IngestResult<T> = Result<T, IngestError>;
pub type CacheResult<T> = Result<T, CacheError>;
pub type LedgerResult<T> = Result<T, LedgerError>;
pub type MathResult<T> = Result<T, MathError>;
pub type SpectraResult<T> = Result<T, SpectraError>;

/// Format-level and normalization-level failures that abort ingestion of a
/// single file. Row-level issues (blank lines, dropped samples) are recovered
/// locally and surfaced only as counters in provenance, never through here.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("cannot determine axis kind for '{source_name}': {reason}")]
    UnresolvedAxis { source_name: String, reason: String },

    #[error(
        "'{source_name}' has {rows} data rows; a spectrum requires at least {minimum} \
         (smaller tables are metadata, not spectra)"
    )]
    InsufficientSamples {
        source_name: String,
        rows: usize,
        minimum: usize,
    },

    #[error("unit string '{unit}' in '{source_name}' does not resolve to a known unit")]
    UnknownUnit { source_name: String, unit: String },

    #[error(
        "absorption-coefficient input '{source_name}' is missing required physical \
         parameter '{parameter}'"
    )]
    MissingPhysicalParameter {
        source_name: String,
        parameter: &'static str,
    },

    #[error("malformed {format} input '{source_name}': {reason}")]
    Malformed {
        format: &'static str,
        source_name: String,
        reason: String,
    },

    #[error("archive '{source_name}' contains no parseable spectral members")]
    EmptyArchive { source_name: String },
}

/// Cache I/O failures are always surfaced, never swallowed; a silent cache
/// failure risks silent data loss downstream.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache i/o failure at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cache index '{}': {reason}", path.display())]
    CorruptIndex { path: PathBuf, reason: String },

    #[error("corrupt chunk file '{}': {reason}", path.display())]
    CorruptChunk { path: PathBuf, reason: String },

    #[error("atomic rename into '{}' failed: {source}", path.display())]
    AtomicWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no cached data for source hash {source_hash}")]
    UnknownSource { source_hash: String },

    #[error("cache index for {source_hash} has no tier {tier_index}")]
    UnknownTier {
        source_hash: String,
        tier_index: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger store '{}' is unreachable: {source}", path.display())]
    StoreUnreachable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger store '{}' is corrupt: {reason}", path.display())]
    CorruptStore { path: PathBuf, reason: String },

    #[error(
        "content {content_hash} was already recorded ({scope} scope, first seen \
         {first_seen_at}); re-ingestion requires an explicit override"
    )]
    DuplicateLocked {
        content_hash: String,
        scope: String,
        first_seen_at: String,
    },

    #[error("ledger lock is poisoned; a concurrent ingestion panicked mid-update")]
    LockPoisoned,
}

#[derive(Debug, thiserror::Error)]
pub enum MathError {
    #[error("cannot combine a {left} spectrum with a {right} spectrum")]
    IncompatibleAxes { left: AxisKind, right: AxisKind },

    #[error("operand y conventions differ ({left} vs {right}); normalize both first")]
    IncompatibleConventions { left: String, right: String },

    #[error("operand x ranges do not overlap; nothing to combine")]
    EmptyOverlap,
}

/// Unified error for callers that drive the whole pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SpectraError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Math(#[from] MathError),
}

#[cfg(test)]
mod tests {
    use super::{IngestError, LedgerError, MathError, SpectraError};
    use crate::domain::AxisKind;

    #[test]
    fn ingest_errors_render_source_context() {
        let error = IngestError::InsufficientSamples {
            source_name: "tiny.txt".to_string(),
            rows: 2,
            minimum: 3,
        };
        let rendered = error.to_string();
        assert!(rendered.contains("tiny.txt"));
        assert!(rendered.contains("2 data rows"));
    }

    #[test]
    fn unified_error_wraps_each_family() {
        let ingest: SpectraError = IngestError::UnknownUnit {
            source_name: "a.txt".to_string(),
            unit: "furlong".to_string(),
        }
        .into();
        assert!(matches!(ingest, SpectraError::Ingest(_)));

        let ledger: SpectraError = LedgerError::LockPoisoned.into();
        assert!(matches!(ledger, SpectraError::Ledger(_)));

        let math: SpectraError = MathError::IncompatibleAxes {
            left: AxisKind::Wavelength,
            right: AxisKind::Time,
        }
        .into();
        assert!(math.to_string().contains("wavelength"));
    }
}
