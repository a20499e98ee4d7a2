//! Provenance records and the append-only merge used at every component
//! boundary. Steps are never removed or overwritten; merging only appends.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum ProvenanceStage {
    Fetch,
    Parse,
    Normalize,
    Cache,
    Export,
}

impl ProvenanceStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Parse => "parse",
            Self::Normalize => "normalize",
            Self::Cache => "cache",
            Self::Export => "export",
        }
    }
}

impl Display for ProvenanceStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// One recorded transformation applied to a spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceStep {
    pub stage: ProvenanceStage,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_or_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropped_row_count: Option<usize>,
}

impl ProvenanceStep {
    pub fn new(stage: ProvenanceStage, description: impl Into<String>) -> Self {
        Self {
            stage,
            description: description.into(),
            formula_or_method: None,
            input_unit: None,
            output_unit: None,
            dropped_row_count: None,
        }
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula_or_method = Some(formula.into());
        self
    }

    pub fn with_units(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.input_unit = Some(input.into());
        self.output_unit = Some(output.into());
        self
    }

    pub fn with_dropped_rows(mut self, count: usize) -> Self {
        self.dropped_row_count = Some(count);
        self
    }
}

/// Appends `fragment` to `existing` without deleting or reordering any prior
/// entry. The fragment itself is concatenated in stage order (fetch, parse,
/// normalize, cache, export); ties keep their original relative order.
pub fn merge_provenance(
    existing: &[ProvenanceStep],
    fragment: &[ProvenanceStep],
) -> Vec<ProvenanceStep> {
    let mut merged = existing.to_vec();
    let mut ordered: Vec<ProvenanceStep> = fragment.to_vec();
    ordered.sort_by_key(|step| step.stage);
    merged.extend(ordered);
    merged
}

#[cfg(test)]
mod tests {
    use super::{ProvenanceStage, ProvenanceStep, merge_provenance};

    fn step(stage: ProvenanceStage, description: &str) -> ProvenanceStep {
        ProvenanceStep::new(stage, description)
    }

    #[test]
    fn merge_never_reorders_existing_entries() {
        let existing = vec![
            step(ProvenanceStage::Normalize, "angstrom to nm"),
            step(ProvenanceStage::Parse, "late parse note"),
        ];
        let fragment = vec![step(ProvenanceStage::Cache, "chunked")];

        let merged = merge_provenance(&existing, &fragment);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].description, "angstrom to nm");
        assert_eq!(merged[1].description, "late parse note");
        assert_eq!(merged[2].stage, ProvenanceStage::Cache);
    }

    #[test]
    fn merge_orders_fragment_by_stage_and_keeps_ties_stable() {
        let fragment = vec![
            step(ProvenanceStage::Normalize, "second"),
            step(ProvenanceStage::Fetch, "archive download"),
            step(ProvenanceStage::Parse, "first"),
            step(ProvenanceStage::Parse, "also first stage"),
        ];

        let merged = merge_provenance(&[], &fragment);
        let stages: Vec<ProvenanceStage> = merged.iter().map(|s| s.stage).collect();
        assert_eq!(
            stages,
            vec![
                ProvenanceStage::Fetch,
                ProvenanceStage::Parse,
                ProvenanceStage::Parse,
                ProvenanceStage::Normalize,
            ]
        );
        assert_eq!(merged[1].description, "first");
        assert_eq!(merged[2].description, "also first stage");
    }

    #[test]
    fn step_serialization_omits_absent_optionals() {
        let step = ProvenanceStep::new(ProvenanceStage::Parse, "parsed ascii table")
            .with_dropped_rows(2);
        let json = serde_json::to_value(&step).expect("step should serialize");

        assert_eq!(json["stage"], "parse");
        assert_eq!(json["droppedRowCount"], 2);
        assert!(json.get("formulaOrMethod").is_none());
        assert!(json.get("inputUnit").is_none());
    }
}
