pub mod errors;

pub use errors::{
    CacheError, CacheResult, IngestError, IngestResult, LedgerError, LedgerResult, MathError,
    MathResult, SpectraError, SpectraResult,
};

use crate::provenance::ProvenanceStep;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Tables with fewer data rows are treated as metadata, not spectra.
pub const MIN_SPECTRUM_ROWS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AxisKind {
    Wavelength,
    Wavenumber,
    Time,
}

impl AxisKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wavelength => "wavelength",
            Self::Wavenumber => "wavenumber",
            Self::Time => "time",
        }
    }

    /// Wavenumber axes are physically constrained to positive values;
    /// non-positive rows on such an axis are dropped during parsing.
    pub const fn requires_positive_values(self) -> bool {
        matches!(self, Self::Wavenumber)
    }
}

impl Display for AxisKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum YConvention {
    Radiometric,
    Transmittance,
    AbsorbanceA10,
}

impl YConvention {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Radiometric => "radiometric",
            Self::Transmittance => "transmittance",
            Self::AbsorbanceA10 => "absorbance-a10",
        }
    }
}

impl Display for YConvention {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Direction is always inferred from the data, never assumed from file
/// convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisDirection {
    Ascending,
    Descending,
}

/// Physical parameters required to convert an IR absorption coefficient to
/// decadic absorbance via Beer-Lambert. Absence with a coefficient-typed
/// input is a hard ingestion error, never a silent default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IrMeta {
    pub path_length: f64,
    pub mole_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuxiliaryColumn {
    pub name: String,
    pub values: Vec<f64>,
}

/// Format declared by the caller, or `Unknown` to trigger auto-detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FormatHint {
    Ascii,
    Jcamp,
    Fits,
    ZipArchive,
    #[default]
    Unknown,
}

impl FormatHint {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::Jcamp => "jcamp-dx",
            Self::Fits => "fits",
            Self::ZipArchive => "zip",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "ascii" | "txt" | "text" => Some(Self::Ascii),
            "jcamp" | "jcamp-dx" | "jdx" | "dx" => Some(Self::Jcamp),
            "fits" | "fit" => Some(Self::Fits),
            "zip" | "archive" => Some(Self::ZipArchive),
            "unknown" | "auto" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl Display for FormatHint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Raw parser output: sample arrays plus header metadata, before any unit
/// conversion. Header keys are normalized to lowercase by every parser so
/// downstream lookups are format-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub source_name: String,
    pub format: FormatHint,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub aux: Option<AuxiliaryColumn>,
    pub header: BTreeMap<String, String>,
    pub dropped_rows: usize,
    pub warnings: Vec<String>,
    pub parse_provenance: Vec<ProvenanceStep>,
}

impl RawTable {
    pub fn header_value(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|key| self.header.get(*key).map(String::as_str))
    }
}

/// The canonical in-memory representation all downstream components consume.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalSpectrum {
    pub axis_kind: AxisKind,
    pub x_values: Vec<f64>,
    pub y_values: Vec<f64>,
    pub y_convention: YConvention,
    pub y_uncertainty: Option<Vec<f64>>,
    pub auxiliary_columns: Vec<AuxiliaryColumn>,
    pub provenance: Vec<ProvenanceStep>,
    pub source_hash: String,
    pub ir_meta: Option<IrMeta>,
}

impl CanonicalSpectrum {
    pub fn len(&self) -> usize {
        self.x_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x_values.is_empty()
    }

    pub fn direction(&self) -> AxisDirection {
        match (self.x_values.first(), self.x_values.last()) {
            (Some(first), Some(last)) if last < first => AxisDirection::Descending,
            _ => AxisDirection::Ascending,
        }
    }

    /// Inclusive x extent as (low, high) regardless of direction.
    pub fn x_range(&self) -> Option<(f64, f64)> {
        let first = *self.x_values.first()?;
        let last = *self.x_values.last()?;
        Some((first.min(last), first.max(last)))
    }

    pub fn summary(&self) -> SpectrumSummary {
        SpectrumSummary {
            source_hash: self.source_hash.clone(),
            axis_kind: self.axis_kind,
            y_convention: self.y_convention,
            sample_count: self.len(),
            provenance_steps: self.provenance.len(),
        }
    }

    /// The ordered lineage block handed to the export collaborator.
    pub fn provenance_block(&self) -> ProvenanceBlock {
        ProvenanceBlock {
            source_hash: self.source_hash.clone(),
            steps: self.provenance.clone(),
        }
    }
}

/// Metadata handed to UI/differential collaborators; never the raw arrays
/// unless tier 0 is explicitly requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectrumSummary {
    pub source_hash: String,
    pub axis_kind: AxisKind,
    pub y_convention: YConvention,
    pub sample_count: usize,
    pub provenance_steps: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceBlock {
    pub source_hash: String,
    pub steps: Vec<ProvenanceStep>,
}
