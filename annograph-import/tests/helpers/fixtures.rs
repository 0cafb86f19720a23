//! Row and partition builders

use annograph_common::config::ImportConfig;
use annograph_common::events::StopFn;
use annograph_common::{AnnotationId, RoleTag, Tier};
use annograph_import::rows::{AnnotationRow, PartitionInput, SyllableRow, TierBatch, UtteranceRow};
use annograph_import::{AnnotationGraph, GraphMutation, ImportOrchestrator, MemorySink, PartitionReport};
use std::sync::Arc;

/// Word batch chained in the given order
pub fn words(rows: &[(u64, f64, f64, &str)]) -> TierBatch {
    let mut previous: Option<u64> = None;
    let rows = rows
        .iter()
        .map(|&(id, begin, end, label)| {
            let mut row = AnnotationRow::new(id, begin, end, label);
            if let Some(prev) = previous {
                row = row.after(prev);
            }
            previous = Some(id);
            row
        })
        .collect();
    TierBatch::new(Tier::Word, None, rows)
}

/// Phone batch `(id, word, begin, end, label)` chained in the given order
pub fn phones(rows: &[(u64, u64, f64, f64, &str)]) -> TierBatch {
    let mut previous: Option<u64> = None;
    let rows = rows
        .iter()
        .map(|&(id, word, begin, end, label)| {
            let mut row = AnnotationRow::new(id, begin, end, label).within(word);
            if let Some(prev) = previous {
                row = row.after(prev);
            }
            previous = Some(id);
            row
        })
        .collect();
    TierBatch::new(Tier::Phone, Some(Tier::Word), rows)
}

pub fn syllable(id: u64, nucleus: u64, begin: f64, end: f64) -> SyllableRow {
    SyllableRow {
        id: id.into(),
        label: String::new(),
        begin,
        end,
        nucleus_id: Some(nucleus.into()),
        onset_id: None,
        coda_id: None,
        break_index: None,
        prev_id: None,
    }
}

pub fn degenerate(id: u64, onset: u64, coda: u64, break_index: usize, begin: f64, end: f64) -> SyllableRow {
    SyllableRow {
        nucleus_id: None,
        onset_id: Some(onset.into()),
        coda_id: Some(coda.into()),
        break_index: Some(break_index),
        ..syllable(id, 0, begin, end)
    }
}

pub fn utterance(id: &str, first: u64, last: u64, prev: Option<&str>) -> UtteranceRow {
    UtteranceRow {
        id: id.into(),
        begin_word_id: first.into(),
        end_word_id: last.into(),
        prev_id: prev.map(AnnotationId::from),
    }
}

/// Word 1 "cat" = k(10) ae(11) t(12), one syllable 100 on ae
pub fn cat_input() -> PartitionInput {
    let mut input = PartitionInput::new("s01", "d01");
    input.tiers.push(words(&[(1, 0.0, 0.3, "cat")]));
    input.tiers.push(phones(&[
        (10, 1, 0.0, 0.1, "K"),
        (11, 1, 0.1, 0.2, "AE"),
        (12, 1, 0.2, 0.3, "T"),
    ]));
    input.syllables.push(syllable(100, 11, 0.0, 0.3));
    input
}

/// Result of importing one partition through the orchestrator
pub struct Imported {
    pub graph: AnnotationGraph,
    pub report: PartitionReport,
    pub sink: Arc<MemorySink>,
}

impl Imported {
    pub fn node(&self, tier: &Tier, id: impl Into<AnnotationId>) -> usize {
        self.graph
            .lookup(tier, &id.into())
            .unwrap_or_else(|| panic!("no {} node", tier))
    }

    pub fn committed(&self) -> Vec<GraphMutation> {
        self.sink.mutations_for(&self.report.partition)
    }
}

pub fn import(input: &PartitionInput) -> Imported {
    import_with(ImportConfig::default(), input)
}

pub fn import_with(config: ImportConfig, input: &PartitionInput) -> Imported {
    let sink = Arc::new(MemorySink::new());
    let orchestrator = ImportOrchestrator::new(config, sink.clone());
    let outcome = orchestrator.run_partition(input, &StopFn(|| false));
    Imported {
        graph: outcome.graph,
        report: outcome.report,
        sink,
    }
}

pub fn phone_role(imported: &Imported, id: u64) -> Option<RoleTag> {
    let index = imported.node(&Tier::Phone, id);
    imported.graph.node(index).role
}
