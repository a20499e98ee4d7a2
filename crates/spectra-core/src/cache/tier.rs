//! Downsample tiers and viewport tier selection.
//!
//! Fine and intermediate tiers use largest-triangle-three-buckets, which
//! keeps perceptually significant points; coarse tiers use a min/max
//! envelope (two points per bucket) that preserves visual extrema. The
//! selection threshold between the two, the per-level decimation factor,
//! and the ladder bounds are fixed constants so regeneration from the same
//! tier-0 data is reproducible bit-for-bit.

use crate::numerics::stable_mean;
use serde::{Deserialize, Serialize};

/// Tiers targeting at least this many points use LTTB; coarser tiers use
/// the min/max envelope.
pub const LTTB_MIN_BUDGET: usize = 4096;
/// Each tier divides the previous tier's target point count by this.
pub const TIER_DECIMATION: usize = 4;
/// No tier is built below this target.
pub const MIN_TIER_POINTS: usize = 64;
/// Ladder depth bound, excluding tier 0.
pub const MAX_TIERS: usize = 8;
/// Default on-screen point budget for viewport tier selection.
pub const DEFAULT_VIEWPORT_BUDGET: usize = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TierMethod {
    Lttb,
    Envelope,
}

impl TierMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lttb => "lttb",
            Self::Envelope => "min-max-envelope",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierSpec {
    pub tier_index: usize,
    pub target_points: usize,
    pub method: TierMethod,
}

/// Downsampled payload of one tier. Envelope tiers carry two y values per
/// bucket; line tiers carry one per selected sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TierData {
    pub x: Vec<f64>,
    pub values: TierValues,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TierValues {
    Line(Vec<f64>),
    Envelope { min: Vec<f64>, max: Vec<f64> },
}

impl TierData {
    pub fn point_count(&self) -> usize {
        match &self.values {
            TierValues::Line(y) => y.len(),
            TierValues::Envelope { min, .. } => min.len() * 2,
        }
    }
}

/// The deterministic tier ladder for a tier-0 sample count, excluding
/// tier 0 itself.
pub fn plan_tiers(sample_count: usize) -> Vec<TierSpec> {
    let mut specs = Vec::new();
    let mut target = sample_count / TIER_DECIMATION;
    let mut tier_index = 1;

    while target >= MIN_TIER_POINTS && tier_index <= MAX_TIERS {
        let method = if target >= LTTB_MIN_BUDGET {
            TierMethod::Lttb
        } else {
            TierMethod::Envelope
        };
        specs.push(TierSpec {
            tier_index,
            target_points: target,
            method,
        });
        target /= TIER_DECIMATION;
        tier_index += 1;
    }

    specs
}

pub fn build_tier(x: &[f64], y: &[f64], spec: &TierSpec) -> TierData {
    match spec.method {
        TierMethod::Lttb => {
            let (tier_x, tier_y) = lttb(x, y, spec.target_points);
            TierData {
                x: tier_x,
                values: TierValues::Line(tier_y),
            }
        }
        TierMethod::Envelope => envelope(x, y, spec.target_points / 2),
    }
}

/// Largest-triangle-three-buckets. Always keeps the first and last sample;
/// each interior bucket keeps the point forming the largest triangle with
/// the previously selected point and the next bucket's mean.
fn lttb(x: &[f64], y: &[f64], target: usize) -> (Vec<f64>, Vec<f64>) {
    let n = x.len();
    if target >= n || target < 3 {
        return (x.to_vec(), y.to_vec());
    }

    let mut out_x = Vec::with_capacity(target);
    let mut out_y = Vec::with_capacity(target);
    out_x.push(x[0]);
    out_y.push(y[0]);

    let every = (n - 2) as f64 / (target - 2) as f64;
    let mut selected = 0_usize;

    for bucket in 0..target - 2 {
        let start = (bucket as f64 * every) as usize + 1;
        let end = (((bucket + 1) as f64) * every) as usize + 1;
        let end = end.min(n - 1);

        let next_start = end;
        let next_end = ((((bucket + 2) as f64) * every) as usize + 1).min(n);
        let (avg_x, avg_y) = if next_start < next_end {
            (
                stable_mean(&x[next_start..next_end]).unwrap_or(x[n - 1]),
                stable_mean(&y[next_start..next_end]).unwrap_or(y[n - 1]),
            )
        } else {
            (x[n - 1], y[n - 1])
        };

        let anchor_x = x[selected];
        let anchor_y = y[selected];
        let mut best_index = start;
        let mut best_area = -1.0_f64;
        for index in start..end.max(start + 1) {
            let area = ((anchor_x - avg_x) * (y[index] - anchor_y)
                - (anchor_x - x[index]) * (avg_y - anchor_y))
                .abs();
            if area > best_area {
                best_area = area;
                best_index = index;
            }
        }

        out_x.push(x[best_index]);
        out_y.push(y[best_index]);
        selected = best_index;
    }

    out_x.push(x[n - 1]);
    out_y.push(y[n - 1]);
    (out_x, out_y)
}

/// Min/max reduction: one representative x per bucket plus the y extrema
/// observed inside it.
fn envelope(x: &[f64], y: &[f64], bucket_count: usize) -> TierData {
    let n = x.len();
    let bucket_count = bucket_count.max(1).min(n);

    let mut out_x = Vec::with_capacity(bucket_count);
    let mut out_min = Vec::with_capacity(bucket_count);
    let mut out_max = Vec::with_capacity(bucket_count);

    for bucket in 0..bucket_count {
        let start = bucket * n / bucket_count;
        let end = ((bucket + 1) * n / bucket_count).max(start + 1);

        let mut bucket_min = f64::INFINITY;
        let mut bucket_max = f64::NEG_INFINITY;
        for &value in &y[start..end] {
            bucket_min = bucket_min.min(value);
            bucket_max = bucket_max.max(value);
        }
        let mid = start + (end - start) / 2;
        out_x.push(x[mid]);
        out_min.push(bucket_min);
        out_max.push(bucket_max);
    }

    TierData {
        x: out_x,
        values: TierValues::Envelope {
            min: out_min,
            max: out_max,
        },
    }
}

/// Point counts per tier as recorded in the cache index, tier 0 first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPoints {
    pub tier_index: usize,
    pub point_count: usize,
}

/// Picks the coarsest tier whose point density over the viewport still
/// exceeds the budget. Exports and differential math bypass this and read
/// tier 0 directly.
pub fn select_tier(
    tiers: &[TierPoints],
    full_range: (f64, f64),
    viewport: (f64, f64),
    budget: usize,
) -> usize {
    let (full_low, full_high) = (full_range.0.min(full_range.1), full_range.0.max(full_range.1));
    let (view_low, view_high) = (viewport.0.min(viewport.1), viewport.0.max(viewport.1));

    let full_span = full_high - full_low;
    let overlap = (view_high.min(full_high) - view_low.max(full_low)).max(0.0);
    let fraction = if full_span > 0.0 {
        (overlap / full_span).clamp(0.0, 1.0)
    } else {
        1.0
    };

    let mut ordered: Vec<TierPoints> = tiers.to_vec();
    ordered.sort_by(|a, b| b.tier_index.cmp(&a.tier_index));
    for tier in &ordered {
        let estimated = tier.point_count as f64 * fraction;
        if estimated >= budget as f64 {
            return tier.tier_index;
        }
    }
    0
}
