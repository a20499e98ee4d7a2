//! Per-source JSON index persisted alongside the chunk files: chunk
//! boundaries, tier definitions, canonical units, and the provenance block
//! needed to rebuild a spectrum without re-ingesting.

use super::chunk::write_atomic;
use super::tier::TierMethod;
use crate::domain::{AxisKind, CacheError, CacheResult, IrMeta, YConvention};
use crate::provenance::ProvenanceStep;
use crate::units::XUnit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const INDEX_FILE_NAME: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceIndex {
    pub source_hash: String,
    pub axis_kind: AxisKind,
    pub x_unit: XUnit,
    pub y_convention: YConvention,
    pub sample_count: usize,
    pub chunk_max_samples: usize,
    pub x_min: f64,
    pub x_max: f64,
    pub has_uncertainty: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auxiliary_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ir_meta: Option<IrMeta>,
    pub chunks: Vec<ChunkRecord>,
    pub tiers: Vec<TierRecord>,
    pub provenance: Vec<ProvenanceStep>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub index: usize,
    pub file_name: String,
    pub sample_count: usize,
    pub x_first: f64,
    pub x_last: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierRecord {
    pub tier_index: usize,
    pub target_point_budget: usize,
    pub method: TierMethod,
    pub file_name: String,
    pub point_count: usize,
}

pub fn write_index(dir: &Path, index: &SourceIndex) -> CacheResult<()> {
    let path = dir.join(INDEX_FILE_NAME);
    let json = serde_json::to_vec_pretty(index).map_err(|error| CacheError::CorruptIndex {
        path: path.clone(),
        reason: error.to_string(),
    })?;
    write_atomic(&path, &json)
}

pub fn read_index(dir: &Path) -> CacheResult<SourceIndex> {
    let path = dir.join(INDEX_FILE_NAME);
    let bytes = fs::read(&path).map_err(|source| CacheError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|error| CacheError::CorruptIndex {
        path,
        reason: error.to_string(),
    })
}
