//! Differential math over canonical spectra: difference and ratio traces
//! on a common grid. Read-only over its inputs and safe to call from
//! multiple consumers concurrently.

use crate::domain::{CanonicalSpectrum, MathError, MathResult};
use crate::ledger::content_hash;
use crate::numerics::interpolate_linear;
use crate::provenance::{ProvenanceStage, ProvenanceStep, merge_provenance};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CombineOp {
    Subtract,
    Ratio,
}

impl CombineOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subtract => "subtract",
            Self::Ratio => "ratio",
        }
    }
}

impl Display for CombineOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CombineOptions {
    /// Denominator magnitudes below this suppress the output sample
    /// instead of producing an unbounded spike.
    pub ratio_epsilon: f64,
    /// Keep suppressed samples in the output (as NaN) instead of omitting
    /// them.
    pub include_suppressed: bool,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            ratio_epsilon: 1.0e-12,
            include_suppressed: false,
        }
    }
}

/// A derived trace plus how many samples the epsilon guard suppressed.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedTrace {
    pub spectrum: CanonicalSpectrum,
    pub suppressed_samples: usize,
}

/// Combines two canonical spectra over their overlap range, resampled onto
/// the finer operand's grid. Mismatched axis kinds are rejected outright;
/// there is no implicit coercion between, say, wavelength and time series.
pub fn combine(
    a: &CanonicalSpectrum,
    b: &CanonicalSpectrum,
    op: CombineOp,
    options: CombineOptions,
) -> MathResult<DerivedTrace> {
    if a.axis_kind != b.axis_kind {
        return Err(MathError::IncompatibleAxes {
            left: a.axis_kind,
            right: b.axis_kind,
        });
    }
    if a.y_convention != b.y_convention {
        return Err(MathError::IncompatibleConventions {
            left: a.y_convention.to_string(),
            right: b.y_convention.to_string(),
        });
    }

    let (a_x, a_y) = ascending_view(a);
    let (b_x, b_y) = ascending_view(b);

    let (Some((a_lo, a_hi)), Some((b_lo, b_hi))) = (extent(&a_x), extent(&b_x)) else {
        return Err(MathError::EmptyOverlap);
    };
    let low = a_lo.max(b_lo);
    let high = a_hi.min(b_hi);
    if low >= high {
        return Err(MathError::EmptyOverlap);
    }

    // The finer operand (more samples inside the overlap) donates the
    // grid; the coarser one is interpolated onto it, never up-resolved
    // beyond its own native resolution by synthesizing extra points.
    let a_in_overlap = count_in_range(&a_x, low, high);
    let b_in_overlap = count_in_range(&b_x, low, high);
    let grid: Vec<f64> = if a_in_overlap >= b_in_overlap {
        a_x.iter().copied().filter(|&x| x >= low && x <= high).collect()
    } else {
        b_x.iter().copied().filter(|&x| x >= low && x <= high).collect()
    };
    if grid.is_empty() {
        return Err(MathError::EmptyOverlap);
    }

    let mut x_values = Vec::with_capacity(grid.len());
    let mut y_values = Vec::with_capacity(grid.len());
    let mut suppressed_samples = 0_usize;

    for &x in &grid {
        let (Some(ya), Some(yb)) = (
            interpolate_linear(x, &a_x, &a_y),
            interpolate_linear(x, &b_x, &b_y),
        ) else {
            continue;
        };

        let value = match op {
            CombineOp::Subtract => ya - yb,
            CombineOp::Ratio => {
                if yb.abs() < options.ratio_epsilon {
                    suppressed_samples += 1;
                    if options.include_suppressed {
                        x_values.push(x);
                        y_values.push(f64::NAN);
                    }
                    continue;
                }
                ya / yb
            }
        };
        x_values.push(x);
        y_values.push(value);
    }

    let step = ProvenanceStep::new(
        ProvenanceStage::Export,
        format!(
            "{op} of {} and {} over [{low}, {high}]",
            a.source_hash, b.source_hash
        ),
    )
    .with_formula(format!(
        "resampled both operands onto the finer {}-point overlap grid; {}",
        grid.len(),
        match op {
            CombineOp::Subtract => "y = a - b".to_string(),
            CombineOp::Ratio => format!(
                "y = a / b, suppressed where |b| < {:e}",
                options.ratio_epsilon
            ),
        }
    ));
    let mut provenance = merge_provenance(&a.provenance, &b.provenance);
    provenance.push(step);

    let source_hash = content_hash(
        format!("{}:{}:{}:{}", op, a.source_hash, b.source_hash, grid.len()).as_bytes(),
    );

    Ok(DerivedTrace {
        spectrum: CanonicalSpectrum {
            axis_kind: a.axis_kind,
            x_values,
            y_values,
            y_convention: a.y_convention,
            y_uncertainty: None,
            auxiliary_columns: Vec::new(),
            provenance,
            source_hash,
            ir_meta: None,
        },
        suppressed_samples,
    })
}

fn ascending_view(spectrum: &CanonicalSpectrum) -> (Vec<f64>, Vec<f64>) {
    match spectrum.direction() {
        crate::domain::AxisDirection::Ascending => {
            (spectrum.x_values.clone(), spectrum.y_values.clone())
        }
        crate::domain::AxisDirection::Descending => (
            spectrum.x_values.iter().rev().copied().collect(),
            spectrum.y_values.iter().rev().copied().collect(),
        ),
    }
}

fn extent(x: &[f64]) -> Option<(f64, f64)> {
    Some((*x.first()?, *x.last()?))
}

fn count_in_range(x: &[f64], low: f64, high: f64) -> usize {
    x.iter().filter(|&&value| value >= low && value <= high).count()
}
