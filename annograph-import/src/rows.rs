//! Staged input rows
//!
//! Rows arrive already flattened by the corpus readers: one batch per tier per
//! partition. Field names follow the staged row files (`previous_id`,
//! `begin_word_id`, `vowel_id`, `break`, ...).

use annograph_common::{AnnotationId, Error, Partition, Result, Tier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One annotation row of a tier batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRow {
    pub id: AnnotationId,
    pub begin: f64,
    pub end: f64,
    #[serde(default)]
    pub label: String,
    /// Defaults to the partition speaker when absent
    #[serde(default)]
    pub speaker: Option<String>,
    /// Defaults to the partition discourse when absent
    #[serde(default)]
    pub discourse: Option<String>,
    #[serde(default)]
    pub previous_id: Option<AnnotationId>,
    /// Id of the containing node in the batch's supertype tier
    #[serde(default, alias = "supertype_id")]
    pub container_id: Option<AnnotationId>,
}

impl AnnotationRow {
    pub fn new(id: impl Into<AnnotationId>, begin: f64, end: f64, label: &str) -> Self {
        Self {
            id: id.into(),
            begin,
            end,
            label: label.to_string(),
            speaker: None,
            discourse: None,
            previous_id: None,
            container_id: None,
        }
    }

    pub fn after(mut self, previous_id: impl Into<AnnotationId>) -> Self {
        self.previous_id = Some(previous_id.into());
        self
    }

    pub fn within(mut self, container_id: impl Into<AnnotationId>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }
}

/// Rows of one tier, plus the tier they are contained by (if any)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierBatch {
    pub tier: Tier,
    #[serde(default)]
    pub supertype: Option<Tier>,
    pub rows: Vec<AnnotationRow>,
}

impl TierBatch {
    pub fn new(tier: Tier, supertype: Option<Tier>, rows: Vec<AnnotationRow>) -> Self {
        Self {
            tier,
            supertype,
            rows,
        }
    }
}

/// Utterance row: a span of the word chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtteranceRow {
    pub id: AnnotationId,
    pub begin_word_id: AnnotationId,
    pub end_word_id: AnnotationId,
    #[serde(default)]
    pub prev_id: Option<AnnotationId>,
}

/// Syllable row. Rows with a nucleus are syllabic; rows without one are
/// degenerate and are split at `break`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyllableRow {
    pub id: AnnotationId,
    #[serde(default)]
    pub label: String,
    pub begin: f64,
    pub end: f64,
    #[serde(default, alias = "vowel_id")]
    pub nucleus_id: Option<AnnotationId>,
    #[serde(default)]
    pub onset_id: Option<AnnotationId>,
    #[serde(default)]
    pub coda_id: Option<AnnotationId>,
    #[serde(default, rename = "break")]
    pub break_index: Option<usize>,
    #[serde(default)]
    pub prev_id: Option<AnnotationId>,
}

impl SyllableRow {
    pub fn is_degenerate(&self) -> bool {
        self.nucleus_id.is_none()
    }
}

/// Sub-annotation row (e.g. a burst inside a phone)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubannotationRow {
    pub id: AnnotationId,
    pub annotated_id: AnnotationId,
    pub begin: f64,
    pub end: f64,
    #[serde(default)]
    pub label: Option<String>,
    /// Any further columns, stored as node properties
    #[serde(flatten)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// Sub-annotations of one type attached to one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubannotationBatch {
    pub subannotation_type: String,
    pub annotated_tier: Tier,
    pub rows: Vec<SubannotationRow>,
}

/// Everything staged for one speaker × discourse partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionInput {
    pub speaker: String,
    pub discourse: String,
    #[serde(default)]
    pub tiers: Vec<TierBatch>,
    #[serde(default)]
    pub subannotations: Vec<SubannotationBatch>,
    #[serde(default)]
    pub utterances: Vec<UtteranceRow>,
    #[serde(default)]
    pub syllables: Vec<SyllableRow>,
}

impl PartitionInput {
    pub fn new(speaker: impl Into<String>, discourse: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            discourse: discourse.into(),
            tiers: Vec::new(),
            subannotations: Vec::new(),
            utterances: Vec::new(),
            syllables: Vec::new(),
        }
    }

    pub fn partition(&self) -> Partition {
        Partition::new(self.speaker.clone(), self.discourse.clone())
    }

    /// Total rows across every stage, used for progress totals
    pub fn row_count(&self) -> usize {
        self.tiers.iter().map(|b| b.rows.len()).sum::<usize>()
            + self.subannotations.iter().map(|b| b.rows.len()).sum::<usize>()
            + self.utterances.len()
            + self.syllables.len()
    }
}

/// Import input: partitions ordered by discourse
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportManifest {
    #[serde(default)]
    pub corpus: Option<String>,
    pub partitions: Vec<PartitionInput>,
}

impl ImportManifest {
    pub fn from_json_str(content: &str) -> Result<Self> {
        let mut manifest: Self = serde_json::from_str(content)?;
        manifest.sort_by_discourse();
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidInput(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_json_str(&content)
    }

    /// Order partitions by discourse, then speaker. Stable for equal keys.
    pub fn sort_by_discourse(&mut self) {
        self.partitions.sort_by(|a, b| {
            (a.discourse.as_str(), a.speaker.as_str()).cmp(&(b.discourse.as_str(), b.speaker.as_str()))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syllable_row_reads_staged_field_names() {
        let row: SyllableRow = serde_json::from_str(
            r#"{"id": 200, "begin": 0.1, "end": 0.4, "onset_id": 20, "coda_id": 22, "break": 1}"#,
        )
        .unwrap();
        assert!(row.is_degenerate());
        assert_eq!(row.break_index, Some(1));
        assert_eq!(row.onset_id, Some(AnnotationId::from(20)));

        let row: SyllableRow =
            serde_json::from_str(r#"{"id": "s1", "begin": 0, "end": 1, "vowel_id": 11}"#).unwrap();
        assert_eq!(row.nucleus_id, Some(AnnotationId::from(11)));
        assert!(!row.is_degenerate());
    }

    #[test]
    fn test_subannotation_row_keeps_extra_columns() {
        let row: SubannotationRow = serde_json::from_str(
            r#"{"id": 1, "annotated_id": 10, "begin": 0.05, "end": 0.06, "vot": 0.012, "voiced": false}"#,
        )
        .unwrap();
        assert_eq!(row.label, None);
        assert_eq!(row.properties.len(), 2);
        assert_eq!(row.properties["vot"], serde_json::json!(0.012));
        assert_eq!(row.properties["voiced"], serde_json::json!(false));
        assert!(!row.properties.contains_key("annotated_id"));
    }

    #[test]
    fn test_manifest_orders_partitions_by_discourse() {
        let manifest = ImportManifest::from_json_str(
            r#"{"partitions": [
                {"speaker": "s01", "discourse": "d02"},
                {"speaker": "s02", "discourse": "d01"},
                {"speaker": "s01", "discourse": "d01"}
            ]}"#,
        )
        .unwrap();
        let keys: Vec<_> = manifest
            .partitions
            .iter()
            .map(|p| (p.discourse.as_str(), p.speaker.as_str()))
            .collect();
        assert_eq!(keys, vec![("d01", "s01"), ("d01", "s02"), ("d02", "s01")]);
    }

    #[test]
    fn test_annotation_row_accepts_supertype_alias() {
        let row: AnnotationRow = serde_json::from_str(
            r#"{"id": 10, "begin": 0.0, "end": 0.1, "label": "k", "supertype_id": 1, "previous_id": 9}"#,
        )
        .unwrap();
        assert_eq!(row.container_id, Some(AnnotationId::from(1)));
        assert_eq!(row.previous_id, Some(AnnotationId::from(9)));
    }
}
