//! Tiered cache engine: owns chunk/tier lifecycle keyed by `source_hash`.
//!
//! Tier-0 data is partitioned into bounded chunks; coarser tiers are
//! derived deterministically from tier 0. The engine never auto-invalidates
//! on disk; if chunks are deleted externally, a fresh ingest rebuilds
//! them. Writes are atomic at chunk-file granularity and ordered within a
//! source, so an interrupted ingest leaves at most an abandoned temp file.

mod chunk;
mod index;
pub mod tier;

pub use index::{ChunkRecord, INDEX_FILE_NAME, SourceIndex, TierRecord};
pub use tier::{
    DEFAULT_VIEWPORT_BUDGET, LTTB_MIN_BUDGET, MAX_TIERS, MIN_TIER_POINTS, TIER_DECIMATION,
    TierData, TierMethod, TierPoints, TierSpec, TierValues, plan_tiers, select_tier,
};

use crate::domain::{CacheError, CacheResult, CanonicalSpectrum};
use crate::provenance::{ProvenanceStage, ProvenanceStep};
use crate::units::canonical_unit;
use chunk::{decode_columns, encode_columns, read_file, write_atomic};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding the cache root path.
pub const CACHE_ROOT_ENV: &str = "SPECTRA_CACHE_DIR";
pub const DEFAULT_CACHE_ROOT: &str = "spectra-cache";
pub const DEFAULT_MAX_CHUNK_SAMPLES: usize = 262_144;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub root: PathBuf,
    pub max_chunk_samples: usize,
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_chunk_samples: DEFAULT_MAX_CHUNK_SAMPLES,
        }
    }

    /// Root from `SPECTRA_CACHE_DIR`, falling back to the default relative
    /// directory. The whole cache relocates with this single path.
    pub fn from_env() -> Self {
        let root = std::env::var_os(CACHE_ROOT_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_ROOT));
        Self::new(root)
    }

    pub fn with_max_chunk_samples(mut self, max_chunk_samples: usize) -> Self {
        self.max_chunk_samples = max_chunk_samples.max(1);
        self
    }

    fn source_dir(&self, source_hash: &str) -> PathBuf {
        self.root.join(source_hash)
    }
}

pub struct CacheEngine {
    config: CacheConfig,
}

impl CacheEngine {
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Persists tier-0 chunks and downsample tiers for a canonical
    /// spectrum, returning a handle over the written index. Chunks are
    /// written in order; the index goes last so a partially written source
    /// directory is never indexed.
    pub fn store(&self, spectrum: &CanonicalSpectrum) -> CacheResult<CacheHandle> {
        let dir = self.config.source_dir(&spectrum.source_hash);
        fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;

        let sample_count = spectrum.len();
        let max_samples = self.config.max_chunk_samples;

        let mut chunk_records = Vec::new();
        let mut start = 0_usize;
        while start < sample_count {
            let end = (start + max_samples).min(sample_count);
            let chunk_index = chunk_records.len();
            let file_name = format!("chunk-{chunk_index:05}.szc");
            let path = dir.join(&file_name);

            let mut columns: Vec<&[f64]> = vec![
                &spectrum.x_values[start..end],
                &spectrum.y_values[start..end],
            ];
            if let Some(uncertainty) = &spectrum.y_uncertainty {
                columns.push(&uncertainty[start..end]);
            }
            for auxiliary in &spectrum.auxiliary_columns {
                columns.push(&auxiliary.values[start..end]);
            }

            let bytes = encode_columns(&path, &columns)?;
            write_atomic(&path, &bytes)?;
            debug!(
                source_hash = %spectrum.source_hash,
                chunk = chunk_index,
                samples = end - start,
                "wrote cache chunk"
            );

            chunk_records.push(ChunkRecord {
                index: chunk_index,
                file_name,
                sample_count: end - start,
                x_first: spectrum.x_values[start],
                x_last: spectrum.x_values[end - 1],
            });
            start = end;
        }

        let mut tier_records = Vec::new();
        for spec in plan_tiers(sample_count) {
            let data = tier::build_tier(&spectrum.x_values, &spectrum.y_values, &spec);
            let file_name = format!("tier-{}.szc", spec.tier_index);
            let path = dir.join(&file_name);

            let bytes = match &data.values {
                TierValues::Line(y) => encode_columns(&path, &[&data.x, y])?,
                TierValues::Envelope { min, max } => {
                    encode_columns(&path, &[&data.x, min, max])?
                }
            };
            write_atomic(&path, &bytes)?;

            tier_records.push(TierRecord {
                tier_index: spec.tier_index,
                target_point_budget: spec.target_points,
                method: spec.method,
                file_name,
                point_count: data.point_count(),
            });
        }

        let cache_step = ProvenanceStep::new(
            ProvenanceStage::Cache,
            format!(
                "partitioned {sample_count} samples into {} chunks and built {} downsample tiers",
                chunk_records.len(),
                tier_records.len()
            ),
        )
        .with_formula(format!(
            "max {max_samples} samples per chunk; lttb >= {LTTB_MIN_BUDGET} target points, \
             min/max envelope below"
        ));

        let (x_min, x_max) = spectrum.x_range().unwrap_or((0.0, 0.0));
        let index = SourceIndex {
            source_hash: spectrum.source_hash.clone(),
            axis_kind: spectrum.axis_kind,
            x_unit: canonical_unit(spectrum.axis_kind),
            y_convention: spectrum.y_convention,
            sample_count,
            chunk_max_samples: max_samples,
            x_min,
            x_max,
            has_uncertainty: spectrum.y_uncertainty.is_some(),
            auxiliary_names: spectrum
                .auxiliary_columns
                .iter()
                .map(|column| column.name.clone())
                .collect(),
            ir_meta: spectrum.ir_meta,
            chunks: chunk_records,
            tiers: tier_records,
            provenance: crate::provenance::merge_provenance(&spectrum.provenance, &[cache_step]),
            created_at: chrono::Utc::now(),
        };
        index::write_index(&dir, &index)?;

        info!(
            source_hash = %spectrum.source_hash,
            samples = sample_count,
            chunks = index.chunks.len(),
            tiers = index.tiers.len(),
            "cached spectrum"
        );

        Ok(CacheHandle { dir, index })
    }

    /// Opens the handle for previously cached content.
    pub fn open(&self, source_hash: &str) -> CacheResult<CacheHandle> {
        let dir = self.config.source_dir(source_hash);
        if !dir.join(INDEX_FILE_NAME).is_file() {
            return Err(CacheError::UnknownSource {
                source_hash: source_hash.to_string(),
            });
        }
        let index = index::read_index(&dir)?;
        Ok(CacheHandle { dir, index })
    }
}

/// Full-resolution columns reconstructed from the ordered chunk files.
#[derive(Debug, Clone, PartialEq)]
pub struct TierZero {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub uncertainty: Option<Vec<f64>>,
    pub auxiliary: Vec<(String, Vec<f64>)>,
}

/// Reference to one cached source: its directory plus the parsed index.
#[derive(Debug, Clone)]
pub struct CacheHandle {
    dir: PathBuf,
    index: SourceIndex,
}

impl CacheHandle {
    pub fn source_hash(&self) -> &str {
        &self.index.source_hash
    }

    pub fn index(&self) -> &SourceIndex {
        &self.index
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Concatenates all chunks in order; the result reproduces tier 0
    /// exactly.
    pub fn load_tier0(&self) -> CacheResult<TierZero> {
        let aux_count = self.index.auxiliary_names.len();
        let expected_columns = 2 + usize::from(self.index.has_uncertainty) + aux_count;

        let mut x = Vec::with_capacity(self.index.sample_count);
        let mut y = Vec::with_capacity(self.index.sample_count);
        let mut uncertainty = self
            .index
            .has_uncertainty
            .then(|| Vec::with_capacity(self.index.sample_count));
        let mut auxiliary: Vec<(String, Vec<f64>)> = self
            .index
            .auxiliary_names
            .iter()
            .map(|name| (name.clone(), Vec::new()))
            .collect();

        for record in &self.index.chunks {
            let path = self.dir.join(&record.file_name);
            let columns = decode_columns(&path, &read_file(&path)?)?;
            if columns.len() != expected_columns
                || columns.first().is_none_or(|c| c.len() != record.sample_count)
            {
                return Err(CacheError::CorruptChunk {
                    path,
                    reason: "chunk layout disagrees with index".to_string(),
                });
            }

            let mut columns = columns.into_iter();
            x.extend(columns.next().unwrap_or_default());
            y.extend(columns.next().unwrap_or_default());
            if let Some(uncertainty) = uncertainty.as_mut() {
                uncertainty.extend(columns.next().unwrap_or_default());
            }
            for (_, values) in auxiliary.iter_mut() {
                values.extend(columns.next().unwrap_or_default());
            }
        }

        Ok(TierZero {
            x,
            y,
            uncertainty,
            auxiliary,
        })
    }

    pub fn load_tier(&self, tier_index: usize) -> CacheResult<TierData> {
        if tier_index == 0 {
            let tier0 = self.load_tier0()?;
            return Ok(TierData {
                x: tier0.x,
                values: TierValues::Line(tier0.y),
            });
        }

        let record = self
            .index
            .tiers
            .iter()
            .find(|tier| tier.tier_index == tier_index)
            .ok_or_else(|| CacheError::UnknownTier {
                source_hash: self.index.source_hash.clone(),
                tier_index,
            })?;

        let path = self.dir.join(&record.file_name);
        let columns = decode_columns(&path, &read_file(&path)?)?;
        match (record.method, columns.len()) {
            (TierMethod::Lttb, 2) => {
                let mut columns = columns.into_iter();
                Ok(TierData {
                    x: columns.next().unwrap_or_default(),
                    values: TierValues::Line(columns.next().unwrap_or_default()),
                })
            }
            (TierMethod::Envelope, 3) => {
                let mut columns = columns.into_iter();
                Ok(TierData {
                    x: columns.next().unwrap_or_default(),
                    values: TierValues::Envelope {
                        min: columns.next().unwrap_or_default(),
                        max: columns.next().unwrap_or_default(),
                    },
                })
            }
            _ => Err(CacheError::CorruptChunk {
                path,
                reason: "tier column layout disagrees with index".to_string(),
            }),
        }
    }

    /// Viewport tier selection over this source's tier ladder.
    pub fn select_tier(&self, viewport: (f64, f64), budget: usize) -> usize {
        let mut tiers = vec![TierPoints {
            tier_index: 0,
            point_count: self.index.sample_count,
        }];
        tiers.extend(self.index.tiers.iter().map(|tier| TierPoints {
            tier_index: tier.tier_index,
            point_count: tier.point_count,
        }));
        select_tier(
            &tiers,
            (self.index.x_min, self.index.x_max),
            viewport,
            budget,
        )
    }

    /// Rebuilds the canonical spectrum from tier 0 plus the index metadata;
    /// used by exports and differential math, which always need full
    /// resolution. The cache step below is already part of the persisted
    /// provenance, so nothing is appended here.
    pub fn load_spectrum(&self) -> CacheResult<CanonicalSpectrum> {
        let tier0 = self.load_tier0()?;
        Ok(CanonicalSpectrum {
            axis_kind: self.index.axis_kind,
            x_values: tier0.x,
            y_values: tier0.y,
            y_convention: self.index.y_convention,
            y_uncertainty: tier0.uncertainty,
            auxiliary_columns: tier0
                .auxiliary
                .into_iter()
                .map(|(name, values)| crate::domain::AuxiliaryColumn { name, values })
                .collect(),
            provenance: self.index.provenance.clone(),
            source_hash: self.index.source_hash.clone(),
            ir_meta: self.index.ir_meta,
        })
    }
}
