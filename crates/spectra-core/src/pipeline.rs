//! The single-file ingestion pipeline and the batch driver.
//!
//! One file moves through hash -> duplicate gate -> parse -> normalize ->
//! cache -> provenance merge as a sequential pipeline. Independent files
//! may run concurrently: each operates under its own `source_hash`
//! namespace and the ledger serializes its own check-then-record.

use crate::cache::{CacheEngine, CacheHandle};
use crate::domain::{
    CanonicalSpectrum, FormatHint, IngestError, IrMeta, RawTable, SpectraError, SpectraResult,
    SpectrumSummary,
};
use crate::ledger::{DuplicateLedger, GateDecision, LedgerEntry, LedgerScope, content_hash};
use crate::parsers::parse_bytes;
use crate::provenance::{ProvenanceStep, merge_provenance};
use crate::units::{
    NormalizeOptions, NormalizeRequest, XUnit, YInputKind, normalize, parse_x_unit, parse_y_kind,
};
use serde::Serialize;
use tracing::{info, warn};

/// Header keys consulted (in order) when the caller did not declare an
/// x unit explicitly.
const X_UNIT_HEADER_KEYS: &[&str] = &["xunits", "xunit", "x_unit", "cunit1", "units", "unit"];
const Y_UNIT_HEADER_KEYS: &[&str] = &["yunits", "yunit", "y_unit", "bunit"];

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub format: FormatHint,
    /// Explicit x-unit label; wins over anything the header declares.
    pub x_unit: Option<String>,
    /// Explicit y-unit label; wins over anything the header declares.
    pub y_unit: Option<String>,
    pub ir_meta: Option<IrMeta>,
    pub scope: Option<LedgerScope>,
    pub label: Option<String>,
    pub override_duplicate_lock: bool,
    pub aux_is_uncertainty: bool,
    /// Lineage produced by an upstream fetch collaborator, merged ahead of
    /// the parse fragment so no lineage is lost.
    pub fetch_provenance: Vec<ProvenanceStep>,
}

#[derive(Debug)]
pub struct IngestOutcome {
    pub handle: CacheHandle,
    pub spectrum: CanonicalSpectrum,
    pub summary: SpectrumSummary,
    /// Present when the ledger had already seen this content and the gate
    /// allowed re-ingestion.
    pub duplicate_of: Option<LedgerEntry>,
}

/// Ingests one file's raw bytes end to end. Raw bytes arrive already
/// fetched; nothing here blocks on network I/O.
pub fn ingest_bytes(
    source_name: &str,
    bytes: &[u8],
    options: &IngestOptions,
    ledger: &DuplicateLedger,
    cache: &CacheEngine,
) -> SpectraResult<IngestOutcome> {
    let source_hash = content_hash(bytes);
    let scope = options.scope.unwrap_or(LedgerScope::Session);

    // Fast-path duplicate gate on the raw hash. The authoritative atomic
    // check-and-set happens at record time below; this read-only probe
    // just avoids parsing content a locked ledger will reject anyway.
    if ledger.is_locked()
        && !options.override_duplicate_lock
        && let Some(existing) = ledger.check(&source_hash)?
    {
        return Err(crate::domain::LedgerError::DuplicateLocked {
            content_hash: source_hash,
            scope: existing.scope.to_string(),
            first_seen_at: existing.first_seen_at.to_rfc3339(),
        }
        .into());
    }

    let mut table = parse_bytes(source_name, bytes, options.format)?;
    for warning in &table.warnings {
        warn!(source = source_name, "{warning}");
    }
    if !options.fetch_provenance.is_empty() {
        table.parse_provenance =
            merge_provenance(&options.fetch_provenance, &table.parse_provenance);
    }

    let x_unit = resolve_x_unit(&table, options)?;
    let y_kind = resolve_y_kind(&table, options, x_unit)?;

    let spectrum = normalize(NormalizeRequest {
        table,
        x_unit,
        y_kind,
        ir_meta: options.ir_meta,
        source_hash: source_hash.clone(),
        options: NormalizeOptions {
            aux_is_uncertainty: options.aux_is_uncertainty,
        },
    })?;

    // An entry exists only after a successful parse of novel content; the
    // single-lock check-and-record here is the race guard for concurrent
    // ingestions of identical bytes.
    let label = options.label.as_deref().unwrap_or(source_name);
    let decision = ledger.check_and_record(
        &source_hash,
        scope,
        label,
        options.override_duplicate_lock,
    )?;
    let duplicate_of = match decision {
        GateDecision::Fresh(_) => None,
        GateDecision::Duplicate(entry) => Some(entry),
    };

    let handle = cache.store(&spectrum)?;
    // The engine appended its cache step into the persisted index; adopt
    // that as the spectrum's consolidated lineage.
    let spectrum = CanonicalSpectrum {
        provenance: handle.index().provenance.clone(),
        ..spectrum
    };

    let summary = spectrum.summary();
    info!(
        source = source_name,
        source_hash = %summary.source_hash,
        samples = summary.sample_count,
        axis = %summary.axis_kind,
        "ingested spectrum"
    );

    Ok(IngestOutcome {
        handle,
        spectrum,
        summary,
        duplicate_of,
    })
}

fn resolve_x_unit(table: &RawTable, options: &IngestOptions) -> Result<XUnit, IngestError> {
    if let Some(label) = &options.x_unit {
        return parse_x_unit(label).ok_or_else(|| IngestError::UnknownUnit {
            source_name: table.source_name.clone(),
            unit: label.clone(),
        });
    }

    if let Some(label) = table.header_value(X_UNIT_HEADER_KEYS) {
        // An explicit unit string that fails to resolve is a hard error,
        // not a silent fallback to a default unit.
        return parse_x_unit(label).ok_or_else(|| IngestError::UnknownUnit {
            source_name: table.source_name.clone(),
            unit: label.to_string(),
        });
    }

    Err(IngestError::UnresolvedAxis {
        source_name: table.source_name.clone(),
        reason: "no x unit declared in the header and none provided by the caller".to_string(),
    })
}

fn resolve_y_kind(
    table: &RawTable,
    options: &IngestOptions,
    x_unit: XUnit,
) -> Result<YInputKind, IngestError> {
    if let Some(label) = &options.y_unit {
        return parse_y_kind(label).ok_or_else(|| IngestError::UnknownUnit {
            source_name: table.source_name.clone(),
            unit: label.clone(),
        });
    }

    if let Some(label) = table.header_value(Y_UNIT_HEADER_KEYS) {
        return parse_y_kind(label).ok_or_else(|| IngestError::UnknownUnit {
            source_name: table.source_name.clone(),
            unit: label.to_string(),
        });
    }

    // Nothing declared anywhere: wavenumber axes are IR-style data already
    // on the absorbance convention; everything else stays radiometric.
    Ok(match x_unit.axis_kind() {
        crate::domain::AxisKind::Wavenumber => YInputKind::AbsorbanceA10,
        _ => YInputKind::Radiometric,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchStatus {
    Ingested,
    DuplicateSkipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemReport {
    pub source_name: String,
    pub status: BatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub items: Vec<BatchItemReport>,
    pub ingested: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Drives multiple files through the pipeline, continuing past a single
/// file's hard failure. A locked-duplicate rejection counts as a skip, not
/// a failure.
pub fn ingest_batch<I>(
    items: I,
    options: &IngestOptions,
    ledger: &DuplicateLedger,
    cache: &CacheEngine,
) -> BatchReport
where
    I: IntoIterator<Item = (String, Vec<u8>)>,
{
    let mut reports = Vec::new();
    let mut ingested = 0_usize;
    let mut skipped = 0_usize;
    let mut failed = 0_usize;

    for (source_name, bytes) in items {
        match ingest_bytes(&source_name, &bytes, options, ledger, cache) {
            Ok(outcome) => {
                ingested += 1;
                reports.push(BatchItemReport {
                    source_name,
                    status: BatchStatus::Ingested,
                    source_hash: Some(outcome.summary.source_hash.clone()),
                    sample_count: Some(outcome.summary.sample_count),
                    message: None,
                });
            }
            Err(SpectraError::Ledger(
                error @ crate::domain::LedgerError::DuplicateLocked { .. },
            )) => {
                skipped += 1;
                reports.push(BatchItemReport {
                    source_name,
                    status: BatchStatus::DuplicateSkipped,
                    source_hash: None,
                    sample_count: None,
                    message: Some(error.to_string()),
                });
            }
            Err(error) => {
                warn!(source = %source_name, "ingest failed: {error}");
                failed += 1;
                reports.push(BatchItemReport {
                    source_name,
                    status: BatchStatus::Failed,
                    source_hash: None,
                    sample_count: None,
                    message: Some(error.to_string()),
                });
            }
        }
    }

    BatchReport {
        items: reports,
        ingested,
        skipped,
        failed,
    }
}

#[cfg(test)]
mod tests {
    use super::{BatchStatus, IngestOptions, ingest_batch, ingest_bytes};
    use crate::cache::{CacheConfig, CacheEngine};
    use crate::domain::{IngestError, SpectraError};
    use crate::ledger::DuplicateLedger;
    use tempfile::TempDir;

    fn engine(temp: &TempDir) -> CacheEngine {
        CacheEngine::new(CacheConfig::new(temp.path().join("cache")))
    }

    const ASCII: &[u8] = b"# xunits: nm\n400.0 1.0\n500.0 2.0\n600.0 3.0\n";

    #[test]
    fn header_units_drive_normalization() {
        let temp = TempDir::new().expect("tempdir should be created");
        let ledger = DuplicateLedger::in_memory();

        let outcome = ingest_bytes(
            "scan.txt",
            ASCII,
            &IngestOptions::default(),
            &ledger,
            &engine(&temp),
        )
        .expect("ingest should succeed");

        assert_eq!(outcome.summary.sample_count, 3);
        assert_eq!(outcome.spectrum.x_values, vec![400.0, 500.0, 600.0]);
        assert!(outcome.duplicate_of.is_none());
        // parse step + cache step in the consolidated lineage
        assert!(outcome.spectrum.provenance.len() >= 2);
    }

    #[test]
    fn missing_unit_declarations_are_an_unresolved_axis() {
        let temp = TempDir::new().expect("tempdir should be created");
        let ledger = DuplicateLedger::in_memory();

        let error = ingest_bytes(
            "bare.txt",
            b"400.0 1.0\n500.0 2.0\n600.0 3.0\n",
            &IngestOptions::default(),
            &ledger,
            &engine(&temp),
        )
        .expect_err("missing units must fail");
        assert!(matches!(
            error,
            SpectraError::Ingest(IngestError::UnresolvedAxis { .. })
        ));
    }

    #[test]
    fn declared_but_unknown_unit_fails_closed() {
        let temp = TempDir::new().expect("tempdir should be created");
        let ledger = DuplicateLedger::in_memory();

        let error = ingest_bytes(
            "weird.txt",
            b"# xunits: cubits\n1.0 1.0\n2.0 2.0\n3.0 3.0\n",
            &IngestOptions::default(),
            &ledger,
            &engine(&temp),
        )
        .expect_err("unknown unit must fail");
        assert!(matches!(
            error,
            SpectraError::Ingest(IngestError::UnknownUnit { .. })
        ));
    }

    #[test]
    fn batch_continues_past_hard_failures() {
        let temp = TempDir::new().expect("tempdir should be created");
        let ledger = DuplicateLedger::in_memory();
        let cache = engine(&temp);

        let report = ingest_batch(
            [
                ("good.txt".to_string(), ASCII.to_vec()),
                ("tiny.txt".to_string(), b"# xunits: nm\n1.0 1.0\n".to_vec()),
                (
                    "late.txt".to_string(),
                    b"# xunits: angstrom\n4000.0 1.0\n5000.0 2.0\n6000.0 3.0\n".to_vec(),
                ),
            ],
            &IngestOptions::default(),
            &ledger,
            &cache,
        );

        assert_eq!(report.ingested, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.items.len(), 3);
        assert_eq!(report.items[1].status, BatchStatus::Failed);
        assert!(!report.all_succeeded());
    }
}
