//! Flux/absorbance conventions and the conversions to decadic absorbance.

use crate::domain::{IngestError, IngestResult, IrMeta, YConvention};
use std::fmt::{Display, Formatter};

/// Declared (or inferred) meaning of the raw y column before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum YInputKind {
    Radiometric,
    AbsorbanceA10,
    Transmittance,
    TransmittancePercent,
    AbsorptionCoefficient,
}

impl YInputKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Radiometric => "radiometric",
            Self::AbsorbanceA10 => "absorbance-a10",
            Self::Transmittance => "transmittance",
            Self::TransmittancePercent => "percent-transmittance",
            Self::AbsorptionCoefficient => "absorption-coefficient",
        }
    }

    pub const fn target_convention(self) -> YConvention {
        match self {
            Self::Radiometric => YConvention::Radiometric,
            _ => YConvention::AbsorbanceA10,
        }
    }
}

impl Display for YInputKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Resolves a declared y-unit label; `None` means unknown and the caller
/// must fail rather than guess.
pub fn parse_y_kind(label: &str) -> Option<YInputKind> {
    let normalized = label.trim().to_lowercase();
    let kind = match normalized.as_str() {
        "absorbance" | "a10" | "decadic absorbance" | "au" | "absorbance units" => {
            YInputKind::AbsorbanceA10
        }
        "transmittance" | "transmission" | "t" => YInputKind::Transmittance,
        "%t" | "percent transmittance" | "percent transmission" | "transmittance (%)" => {
            YInputKind::TransmittancePercent
        }
        "absorption coefficient" | "absorption-coefficient" | "alpha" => {
            YInputKind::AbsorptionCoefficient
        }
        "flux" | "counts" | "adu" | "arbitrary units" | "arbitrary" | "arb" | "intensity"
        | "relative intensity" | "erg/s/cm^2/a" | "w/m^2/nm" | "jy" => YInputKind::Radiometric,
        _ => return None,
    };
    Some(kind)
}

/// One applied flux conversion with its provenance bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxConversion {
    pub from: YInputKind,
    pub to: YConvention,
    pub formula: String,
    /// Samples that could not survive the conversion (non-positive
    /// transmittance has no finite absorbance) and were removed.
    pub dropped_samples: usize,
}

/// Outcome of converting a raw y column to the canonical convention.
/// `keep_mask` marks the rows that survive; the caller applies it to every
/// aligned column so x/y/uncertainty stay 1:1.
#[derive(Debug)]
pub struct FluxOutcome {
    pub conversion: Option<FluxConversion>,
    pub keep_mask: Option<Vec<bool>>,
}

const LN_10: f64 = std::f64::consts::LN_10;

/// Converts `y` in place to the canonical convention for `kind`.
///
/// Already-canonical inputs (A10 in, radiometric in) return a `None`
/// conversion and leave every bit of `y` untouched, which is what makes
/// re-normalization idempotent.
pub fn convert_to_canonical_flux(
    y: &mut Vec<f64>,
    kind: YInputKind,
    ir_meta: Option<IrMeta>,
    source_name: &str,
) -> IngestResult<FluxOutcome> {
    match kind {
        YInputKind::Radiometric | YInputKind::AbsorbanceA10 => Ok(FluxOutcome {
            conversion: None,
            keep_mask: None,
        }),
        YInputKind::Transmittance => Ok(transmittance_to_a10(y, kind, 1.0)),
        YInputKind::TransmittancePercent => Ok(transmittance_to_a10(y, kind, 100.0)),
        YInputKind::AbsorptionCoefficient => {
            let meta = ir_meta.ok_or_else(|| IngestError::MissingPhysicalParameter {
                source_name: source_name.to_string(),
                parameter: "path_length and mole_fraction",
            })?;
            if !meta.path_length.is_finite() || meta.path_length <= 0.0 {
                return Err(IngestError::MissingPhysicalParameter {
                    source_name: source_name.to_string(),
                    parameter: "path_length",
                });
            }
            if !meta.mole_fraction.is_finite() || meta.mole_fraction <= 0.0 {
                return Err(IngestError::MissingPhysicalParameter {
                    source_name: source_name.to_string(),
                    parameter: "mole_fraction",
                });
            }

            let scale = meta.path_length * meta.mole_fraction / LN_10;
            for value in y.iter_mut() {
                *value *= scale;
            }

            Ok(FluxOutcome {
                conversion: Some(FluxConversion {
                    from: kind,
                    to: YConvention::AbsorbanceA10,
                    formula: format!(
                        "A10 = alpha * L * x / ln(10), L = {}, x = {}",
                        meta.path_length, meta.mole_fraction
                    ),
                    dropped_samples: 0,
                }),
                keep_mask: None,
            })
        }
    }
}

fn transmittance_to_a10(y: &mut Vec<f64>, kind: YInputKind, divisor: f64) -> FluxOutcome {
    let mut keep_mask = Vec::with_capacity(y.len());
    let mut dropped = 0_usize;
    let mut converted = Vec::with_capacity(y.len());

    for &value in y.iter() {
        let transmittance = value / divisor;
        if !(transmittance > 0.0) || !transmittance.is_finite() {
            keep_mask.push(false);
            dropped += 1;
            continue;
        }
        keep_mask.push(true);
        converted.push(-transmittance.log10());
    }

    *y = converted;

    let formula = if divisor == 1.0 {
        "A10 = -log10(T)".to_string()
    } else {
        "A10 = -log10(%T / 100)".to_string()
    };

    FluxOutcome {
        conversion: Some(FluxConversion {
            from: kind,
            to: YConvention::AbsorbanceA10,
            formula,
            dropped_samples: dropped,
        }),
        keep_mask: (dropped > 0).then_some(keep_mask),
    }
}

#[cfg(test)]
mod tests {
    use super::{YInputKind, convert_to_canonical_flux, parse_y_kind};
    use crate::domain::{IngestError, IrMeta, YConvention};

    #[test]
    fn y_labels_resolve_and_fail_closed() {
        assert_eq!(parse_y_kind("Absorbance"), Some(YInputKind::AbsorbanceA10));
        assert_eq!(
            parse_y_kind("TRANSMITTANCE"),
            Some(YInputKind::Transmittance)
        );
        assert_eq!(parse_y_kind("%T"), Some(YInputKind::TransmittancePercent));
        assert_eq!(parse_y_kind("counts"), Some(YInputKind::Radiometric));
        assert_eq!(parse_y_kind("zorkmids"), None);
    }

    #[test]
    fn transmittance_converts_with_negative_log() {
        let mut y = vec![1.0, 0.1, 0.01];
        let outcome =
            convert_to_canonical_flux(&mut y, YInputKind::Transmittance, None, "t.jdx")
                .expect("conversion should succeed");

        let conversion = outcome.conversion.expect("a step applies");
        assert_eq!(conversion.formula, "A10 = -log10(T)");
        assert_eq!(conversion.to, YConvention::AbsorbanceA10);
        assert!((y[0] - 0.0).abs() < 1.0e-12);
        assert!((y[1] - 1.0).abs() < 1.0e-12);
        assert!((y[2] - 2.0).abs() < 1.0e-12);
        assert!(outcome.keep_mask.is_none());
    }

    #[test]
    fn non_positive_transmittance_rows_are_masked_not_fatal() {
        let mut y = vec![0.5, 0.0, -0.25, 0.1];
        let outcome =
            convert_to_canonical_flux(&mut y, YInputKind::Transmittance, None, "t.jdx")
                .expect("conversion should succeed");

        assert_eq!(y.len(), 2);
        let mask = outcome.keep_mask.expect("mask marks dropped rows");
        assert_eq!(mask, vec![true, false, false, true]);
        assert_eq!(outcome.conversion.expect("step").dropped_samples, 2);
    }

    #[test]
    fn coefficient_without_parameters_is_a_hard_error() {
        let mut y = vec![1.0, 2.0];
        let error =
            convert_to_canonical_flux(&mut y, YInputKind::AbsorptionCoefficient, None, "ir.dat")
                .expect_err("missing parameters must fail");
        assert!(matches!(
            error,
            IngestError::MissingPhysicalParameter { .. }
        ));
        assert_eq!(y, vec![1.0, 2.0]);
    }

    #[test]
    fn coefficient_with_parameters_applies_beer_lambert() {
        let mut y = vec![std::f64::consts::LN_10];
        let outcome = convert_to_canonical_flux(
            &mut y,
            YInputKind::AbsorptionCoefficient,
            Some(IrMeta {
                path_length: 2.0,
                mole_fraction: 0.5,
            }),
            "ir.dat",
        )
        .expect("conversion should succeed");

        assert!((y[0] - 1.0).abs() < 1.0e-12);
        let conversion = outcome.conversion.expect("step");
        assert!(conversion.formula.starts_with("A10 = alpha * L * x / ln(10)"));
    }

    #[test]
    fn already_canonical_inputs_touch_nothing() {
        let original = vec![0.25, 0.5, 0.75];
        let mut y = original.clone();
        let outcome =
            convert_to_canonical_flux(&mut y, YInputKind::AbsorbanceA10, None, "a.dat")
                .expect("no-op should succeed");

        assert!(outcome.conversion.is_none());
        for (before, after) in original.iter().zip(&y) {
            assert_eq!(before.to_bits(), after.to_bits());
        }
    }
}
