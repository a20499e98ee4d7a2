//! Spectral ingestion, unit-normalization, and tiered-cache core.
//!
//! Raw bytes flow through the duplicate ledger gate, a format parser, the
//! unit normalization engine, and the tiered cache engine; every displayed
//! sample traces back to its origin through an append-only provenance
//! record keyed by the content hash of the original bytes.

pub mod cache;
pub mod domain;
pub mod ledger;
pub mod math;
pub mod numerics;
pub mod parsers;
pub mod pipeline;
pub mod provenance;
pub mod units;

pub use cache::{CacheConfig, CacheEngine, CacheHandle};
pub use domain::{
    AxisKind, CanonicalSpectrum, FormatHint, IngestError, IrMeta, SpectraError, SpectraResult,
    YConvention,
};
pub use ledger::{DuplicateLedger, LedgerEntry, LedgerScope, content_hash};
pub use math::{CombineOp, CombineOptions, DerivedTrace, combine};
pub use pipeline::{
    BatchItemReport, BatchReport, BatchStatus, IngestOptions, IngestOutcome, ingest_batch,
    ingest_bytes,
};
pub use provenance::{ProvenanceStage, ProvenanceStep, merge_provenance};
