//! Unit normalization engine: owns the transformation from raw parsed
//! samples to the canonical spectrum, appending one provenance step per
//! conversion actually applied. Re-normalizing an already-canonical
//! spectrum applies zero conversions and leaves y bit-identical.

mod axis;
mod flux;

pub use axis::{
    AxisConversion, XUnit, angstrom_to_micrometre, canonical_unit, convert_to_canonical,
    micrometre_to_wavenumber, nanometre_to_angstrom, nanometre_to_wavenumber, parse_x_unit,
    wavenumber_to_nanometre,
};
pub use flux::{FluxConversion, FluxOutcome, YInputKind, convert_to_canonical_flux, parse_y_kind};

use crate::domain::{
    AuxiliaryColumn, CanonicalSpectrum, IngestError, IngestResult, IrMeta, RawTable,
};
use crate::numerics::{deterministic_argsort, monotonic_direction};
use crate::provenance::{ProvenanceStage, ProvenanceStep, merge_provenance};

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    /// Treat the auxiliary third column as per-sample y uncertainty instead
    /// of an opaque metadata column.
    pub aux_is_uncertainty: bool,
}

pub struct NormalizeRequest {
    pub table: RawTable,
    pub x_unit: XUnit,
    pub y_kind: YInputKind,
    pub ir_meta: Option<IrMeta>,
    pub source_hash: String,
    pub options: NormalizeOptions,
}

/// `(raw samples, header-resolved units) -> canonical spectrum`.
///
/// The provenance of the result is the parse fragment carried by the raw
/// table plus one step per conversion applied here, merged append-only.
pub fn normalize(request: NormalizeRequest) -> IngestResult<CanonicalSpectrum> {
    let NormalizeRequest {
        table,
        x_unit,
        y_kind,
        ir_meta,
        source_hash,
        options,
    } = request;

    let axis_kind = x_unit.axis_kind();
    let source_name = table.source_name.clone();
    let mut x = table.x;
    let mut y = table.y;
    let mut steps: Vec<ProvenanceStep> = Vec::new();

    let (aux, mut uncertainty) = match (table.aux, options.aux_is_uncertainty) {
        (Some(column), true) => (None, Some(column.values)),
        (aux, _) => (aux, None),
    };
    let mut aux_values = aux.map(|column| (column.name, column.values));

    if let Some(conversion) = convert_to_canonical(&mut x, x_unit) {
        steps.push(
            ProvenanceStep::new(
                ProvenanceStage::Normalize,
                format!("converted x axis from {} to {}", conversion.from, conversion.to),
            )
            .with_formula(conversion.formula)
            .with_units(conversion.from.as_str(), conversion.to.as_str()),
        );
    }

    let outcome = convert_to_canonical_flux(&mut y, y_kind, ir_meta, &source_name)?;
    if let Some(mask) = &outcome.keep_mask {
        apply_keep_mask(&mut x, mask);
        if let Some(unc) = uncertainty.as_mut() {
            apply_keep_mask(unc, mask);
        }
        if let Some((_, values)) = aux_values.as_mut() {
            apply_keep_mask(values, mask);
        }
    }
    if let Some(conversion) = outcome.conversion {
        let mut step = ProvenanceStep::new(
            ProvenanceStage::Normalize,
            format!("converted y values from {} to {}", conversion.from, conversion.to),
        )
        .with_formula(conversion.formula.clone())
        .with_units(conversion.from.as_str(), conversion.to.as_str());
        if conversion.dropped_samples > 0 {
            step = step.with_dropped_rows(conversion.dropped_samples);
        }
        steps.push(step);
    }

    // Monotonicity is required after ingestion; either direction is kept
    // as-is, anything else is sorted ascending deterministically.
    if monotonic_direction(&x).is_none() {
        let order = deterministic_argsort(&x);
        x = reorder(&x, &order);
        y = reorder(&y, &order);
        if let Some(unc) = uncertainty.as_mut() {
            *unc = reorder(unc, &order);
        }
        if let Some((_, values)) = aux_values.as_mut() {
            *values = reorder(values, &order);
        }

        let duplicates = dedupe_adjacent_x(&mut x, &mut y, &mut uncertainty, &mut aux_values);
        let mut step = ProvenanceStep::new(
            ProvenanceStage::Normalize,
            "sorted samples into ascending x order",
        )
        .with_formula("deterministic argsort by x, ties by input index");
        if duplicates > 0 {
            step = step.with_dropped_rows(duplicates);
        }
        steps.push(step);
    }

    if x.len() < crate::domain::MIN_SPECTRUM_ROWS {
        return Err(IngestError::InsufficientSamples {
            source_name,
            rows: x.len(),
            minimum: crate::domain::MIN_SPECTRUM_ROWS,
        });
    }

    let provenance = merge_provenance(&table.parse_provenance, &steps);
    let auxiliary_columns = aux_values
        .map(|(name, values)| vec![AuxiliaryColumn { name, values }])
        .unwrap_or_default();

    Ok(CanonicalSpectrum {
        axis_kind,
        x_values: x,
        y_values: y,
        y_convention: y_kind.target_convention(),
        y_uncertainty: uncertainty,
        auxiliary_columns,
        provenance,
        source_hash,
        ir_meta,
    })
}

/// Runs an already-canonical spectrum back through normalization. By
/// construction this applies zero conversions: the x unit is canonical for
/// its axis kind and the y values already carry their target convention.
pub fn renormalize(spectrum: CanonicalSpectrum) -> IngestResult<CanonicalSpectrum> {
    let y_kind = match spectrum.y_convention {
        crate::domain::YConvention::Radiometric => YInputKind::Radiometric,
        crate::domain::YConvention::AbsorbanceA10 => YInputKind::AbsorbanceA10,
        crate::domain::YConvention::Transmittance => YInputKind::Transmittance,
    };

    let aux = spectrum.auxiliary_columns.into_iter().next();
    let had_uncertainty = spectrum.y_uncertainty.is_some();
    let table = RawTable {
        source_name: format!("renormalize:{}", spectrum.source_hash),
        format: crate::domain::FormatHint::Unknown,
        x: spectrum.x_values,
        y: spectrum.y_values,
        aux: spectrum
            .y_uncertainty
            .map(|values| AuxiliaryColumn {
                name: "uncertainty".to_string(),
                values,
            })
            .or(aux),
        header: Default::default(),
        dropped_rows: 0,
        warnings: Vec::new(),
        parse_provenance: spectrum.provenance,
    };

    normalize(NormalizeRequest {
        table,
        x_unit: canonical_unit(spectrum.axis_kind),
        y_kind,
        ir_meta: spectrum.ir_meta,
        source_hash: spectrum.source_hash,
        options: NormalizeOptions {
            aux_is_uncertainty: had_uncertainty,
        },
    })
}

fn apply_keep_mask(values: &mut Vec<f64>, mask: &[bool]) {
    let mut kept = Vec::with_capacity(values.len());
    for (value, keep) in values.iter().zip(mask) {
        if *keep {
            kept.push(*value);
        }
    }
    *values = kept;
}

fn reorder(values: &[f64], order: &[usize]) -> Vec<f64> {
    order.iter().map(|&index| values[index]).collect()
}

/// Drops rows whose x exactly repeats the previous row (archive members can
/// overlap at segment boundaries). Returns the number of rows removed.
fn dedupe_adjacent_x(
    x: &mut Vec<f64>,
    y: &mut Vec<f64>,
    uncertainty: &mut Option<Vec<f64>>,
    aux: &mut Option<(String, Vec<f64>)>,
) -> usize {
    let mut keep = Vec::with_capacity(x.len());
    let mut previous: Option<f64> = None;
    for &value in x.iter() {
        let duplicate = previous.is_some_and(|prior| prior == value);
        keep.push(!duplicate);
        previous = Some(value);
    }

    let dropped = keep.iter().filter(|kept| !**kept).count();
    if dropped == 0 {
        return 0;
    }

    apply_keep_mask(x, &keep);
    apply_keep_mask(y, &keep);
    if let Some(unc) = uncertainty.as_mut() {
        apply_keep_mask(unc, &keep);
    }
    if let Some((_, values)) = aux.as_mut() {
        apply_keep_mask(values, &keep);
    }
    dropped
}
