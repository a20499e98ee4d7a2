//! X-axis unit vocabulary and the length/wavenumber/time algebra.
//!
//! Unit strings fail closed: an explicit label that does not resolve is a
//! hard error at the call site, never a silent fallback to a default unit.

use crate::domain::AxisKind;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum XUnit {
    Angstrom,
    Nanometre,
    Micrometre,
    ReciprocalCentimetre,
    Second,
    Millisecond,
}

impl XUnit {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Angstrom => "angstrom",
            Self::Nanometre => "nm",
            Self::Micrometre => "um",
            Self::ReciprocalCentimetre => "cm^-1",
            Self::Second => "s",
            Self::Millisecond => "ms",
        }
    }

    pub const fn axis_kind(self) -> AxisKind {
        match self {
            Self::Angstrom | Self::Nanometre | Self::Micrometre => AxisKind::Wavelength,
            Self::ReciprocalCentimetre => AxisKind::Wavenumber,
            Self::Second | Self::Millisecond => AxisKind::Time,
        }
    }

    pub const fn is_canonical(self) -> bool {
        matches!(
            self,
            Self::Nanometre | Self::ReciprocalCentimetre | Self::Second
        )
    }
}

impl Display for XUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// The canonical unit for an axis kind: nm for wavelength, cm^-1 for
/// wavenumber (explicitly retained), seconds for time series.
pub const fn canonical_unit(axis: AxisKind) -> XUnit {
    match axis {
        AxisKind::Wavelength => XUnit::Nanometre,
        AxisKind::Wavenumber => XUnit::ReciprocalCentimetre,
        AxisKind::Time => XUnit::Second,
    }
}

/// Resolves common aliases and pluralizations to one unit. Comparison is
/// case-insensitive after trimming; `None` means the label is unknown and
/// the caller must fail.
pub fn parse_x_unit(label: &str) -> Option<XUnit> {
    let normalized = label.trim().to_lowercase();
    let unit = match normalized.as_str() {
        "a" | "aa" | "ang" | "angstrom" | "angstroms" | "angstroem" | "angstroems" | "\u{212b}"
        | "\u{e5}" => XUnit::Angstrom,
        "nm" | "nanometer" | "nanometers" | "nanometre" | "nanometres" => XUnit::Nanometre,
        "um" | "\u{b5}m" | "\u{3bc}m" | "micron" | "microns" | "micrometer" | "micrometers"
        | "micrometre" | "micrometres" => XUnit::Micrometre,
        "1/cm" | "cm-1" | "cm^-1" | "cm**-1" | "1/centimeter" | "wavenumber" | "wavenumbers"
        | "reciprocal cm" | "reciprocal centimeter" | "reciprocal centimetre" | "kayser" => {
            XUnit::ReciprocalCentimetre
        }
        "s" | "sec" | "secs" | "second" | "seconds" => XUnit::Second,
        "ms" | "msec" | "millisecond" | "milliseconds" => XUnit::Millisecond,
        _ => return None,
    };
    Some(unit)
}

/// One applied x-axis conversion, carrying the exact formula recorded in
/// provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisConversion {
    pub from: XUnit,
    pub to: XUnit,
    pub formula: &'static str,
}

/// Converts `values` in place to the canonical unit for the unit's axis
/// kind. Returns `None` when the input is already canonical (the no-op that
/// keeps normalization idempotent: no values are touched, no step is
/// recorded).
pub fn convert_to_canonical(values: &mut [f64], from: XUnit) -> Option<AxisConversion> {
    let to = canonical_unit(from.axis_kind());
    if from == to {
        return None;
    }

    let formula = match from {
        XUnit::Angstrom => {
            for value in values.iter_mut() {
                *value /= 10.0;
            }
            "nm = angstrom / 10"
        }
        XUnit::Micrometre => {
            for value in values.iter_mut() {
                *value *= 1000.0;
            }
            "nm = um * 1000"
        }
        XUnit::Millisecond => {
            for value in values.iter_mut() {
                *value /= 1000.0;
            }
            "s = ms / 1000"
        }
        XUnit::Nanometre | XUnit::ReciprocalCentimetre | XUnit::Second => unreachable!(),
    };

    Some(AxisConversion { from, to, formula })
}

/// nm -> cm^-1 (`k = 1e7 / nm`); used when callers cross between the
/// wavelength and wavenumber views of the same data.
pub fn nanometre_to_wavenumber(nm: f64) -> f64 {
    1.0e7 / nm
}

/// cm^-1 -> nm; the same relation inverted.
pub fn wavenumber_to_nanometre(k: f64) -> f64 {
    1.0e7 / k
}

pub fn nanometre_to_angstrom(nm: f64) -> f64 {
    nm * 10.0
}

pub fn angstrom_to_micrometre(angstrom: f64) -> f64 {
    angstrom * 1.0e-4
}

pub fn micrometre_to_wavenumber(um: f64) -> f64 {
    1.0e4 / um
}
