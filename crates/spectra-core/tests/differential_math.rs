use spectra_core::cache::{CacheConfig, CacheEngine};
use spectra_core::domain::{AxisKind, CanonicalSpectrum, MathError, YConvention};
use spectra_core::ledger::DuplicateLedger;
use spectra_core::math::{CombineOp, CombineOptions, combine};
use spectra_core::pipeline::{IngestOptions, ingest_bytes};
use tempfile::TempDir;

fn spectrum(axis: AxisKind, x: Vec<f64>, y: Vec<f64>, hash: &str) -> CanonicalSpectrum {
    CanonicalSpectrum {
        axis_kind: axis,
        x_values: x,
        y_values: y,
        y_convention: YConvention::Radiometric,
        y_uncertainty: None,
        auxiliary_columns: Vec::new(),
        provenance: Vec::new(),
        source_hash: hash.to_string(),
        ir_meta: None,
    }
}

#[test]
fn wavelength_minus_time_is_rejected_without_coercion() {
    let wavelength = spectrum(
        AxisKind::Wavelength,
        vec![400.0, 500.0, 600.0],
        vec![1.0, 2.0, 3.0],
        "wl",
    );
    let time = spectrum(
        AxisKind::Time,
        vec![400.0, 500.0, 600.0],
        vec![1.0, 2.0, 3.0],
        "t",
    );

    let error = combine(&wavelength, &time, CombineOp::Subtract, CombineOptions::default())
        .expect_err("axis kinds must match");
    assert!(matches!(error, MathError::IncompatibleAxes { .. }));
}

#[test]
fn ratio_with_near_zero_denominator_never_produces_infinities() {
    let numerator = spectrum(
        AxisKind::Wavelength,
        (0..100).map(|i| 400.0 + i as f64).collect(),
        vec![1.0; 100],
        "num",
    );
    let mut denominator_y = vec![2.0; 100];
    denominator_y[40] = 0.0;
    denominator_y[41] = 1.0e-15;
    let denominator = spectrum(
        AxisKind::Wavelength,
        (0..100).map(|i| 400.0 + i as f64).collect(),
        denominator_y,
        "den",
    );

    let trace = combine(
        &numerator,
        &denominator,
        CombineOp::Ratio,
        CombineOptions::default(),
    )
    .expect("ratio should succeed");

    assert_eq!(trace.suppressed_samples, 2);
    assert!(
        trace
            .spectrum
            .y_values
            .iter()
            .all(|y| y.is_finite()),
        "suppressed samples must be omitted, not emitted as inf/nan"
    );
    assert_eq!(trace.spectrum.y_values.len(), 98);
}

#[test]
fn derived_trace_provenance_names_both_operands_and_the_grid() {
    let a = spectrum(
        AxisKind::Wavenumber,
        vec![1000.0, 1001.0, 1002.0, 1003.0],
        vec![4.0, 5.0, 6.0, 7.0],
        "hash-a",
    );
    let b = spectrum(
        AxisKind::Wavenumber,
        vec![1000.0, 1002.0, 1003.0],
        vec![1.0, 1.0, 1.0],
        "hash-b",
    );

    let trace = combine(&a, &b, CombineOp::Subtract, CombineOptions::default())
        .expect("subtract should succeed");

    let step = trace
        .spectrum
        .provenance
        .last()
        .expect("derived step recorded");
    assert!(step.description.contains("hash-a"));
    assert!(step.description.contains("hash-b"));
    let formula = step.formula_or_method.as_deref().expect("grid recorded");
    assert!(formula.contains("4-point"));
}

#[test]
fn differential_reads_full_resolution_from_the_cache() {
    let temp = TempDir::new().expect("tempdir should be created");
    let cache = CacheEngine::new(CacheConfig::new(temp.path().join("cache")));
    let ledger = DuplicateLedger::in_memory();

    let sample = ingest_bytes(
        "sample.txt",
        b"# xunits: nm\n400.0 2.0\n500.0 4.0\n600.0 8.0\n",
        &IngestOptions::default(),
        &ledger,
        &cache,
    )
    .expect("sample should ingest");
    let reference = ingest_bytes(
        "reference.txt",
        b"# xunits: nm\n400.0 1.0\n500.0 2.0\n600.0 4.0\n",
        &IngestOptions::default(),
        &ledger,
        &cache,
    )
    .expect("reference should ingest");

    let a = cache
        .open(&sample.summary.source_hash)
        .and_then(|handle| handle.load_spectrum())
        .expect("sample reloads at full resolution");
    let b = cache
        .open(&reference.summary.source_hash)
        .and_then(|handle| handle.load_spectrum())
        .expect("reference reloads at full resolution");

    let trace = combine(&a, &b, CombineOp::Ratio, CombineOptions::default())
        .expect("ratio should succeed");
    assert_eq!(trace.spectrum.y_values, vec![2.0, 2.0, 2.0]);
    assert_eq!(trace.suppressed_samples, 0);

    // Both operands' cached lineage is carried into the derived trace.
    let cache_steps = trace
        .spectrum
        .provenance
        .iter()
        .filter(|step| step.stage == spectra_core::provenance::ProvenanceStage::Cache)
        .count();
    assert_eq!(cache_steps, 2);
}
