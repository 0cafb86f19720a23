//! Utterance Segmenter
//!
//! An utterance row names its first and last word. The words in between are
//! found by a bounded shortest-path search along the word `precedes` chain and
//! become children of the new utterance node.

use crate::error::{ImportError, ImportResult};
use crate::graph::{AnnotationGraph, NodeIndex};
use crate::registry::Registries;
use crate::report::{Stage, StageReport};
use crate::rows::UtteranceRow;
use annograph_common::{Interval, Tier};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Words and interval of one utterance, computed before any mutation
struct UtterancePlan {
    words: Vec<NodeIndex>,
    interval: Interval,
}

pub struct UtteranceSegmenter<'a> {
    registries: &'a Registries,
}

impl<'a> UtteranceSegmenter<'a> {
    pub fn new(registries: &'a Registries) -> Self {
        Self { registries }
    }

    pub fn segment(&self, graph: &mut AnnotationGraph, rows: &[UtteranceRow]) -> StageReport {
        let mut report = StageReport::new(Stage::Utterances);
        if rows.is_empty() {
            return report;
        }

        let tier = Tier::Utterance;
        let mut seen = HashSet::with_capacity(rows.len());
        if let Some(row) = rows
            .iter()
            .find(|row| !seen.insert(&row.id) || graph.contains(&tier, &row.id))
        {
            let error = ImportError::DuplicateIdentifier {
                tier: tier.clone(),
                id: row.id.clone(),
            };
            warn!(error = %error, "Utterance batch aborted");
            report.abort(&tier, &error);
            return report;
        }

        // A path never needs more hops than there are words
        let bound = graph.tier_nodes(&Tier::Word).count();
        info!(
            speaker = %graph.partition().speaker,
            discourse = %graph.partition().discourse,
            rows = rows.len(),
            "Segmenting utterances"
        );

        self.registries.prepare_tier(graph, &tier);
        for row in rows {
            let plan = match plan_utterance(graph, row, bound) {
                Ok(plan) => plan,
                Err(e) => {
                    debug!(row_id = %row.id, error = %e, "Utterance skipped");
                    report.fail_at(&tier, &row.id, &e);
                    continue;
                }
            };

            match apply_utterance(self.registries, graph, row, &plan) {
                Ok(()) => report.created += 1,
                Err(e) => report.fail_at(&tier, &row.id, &e),
            }
        }

        if !report.is_clean() {
            warn!(failed = report.failures.len(), "Some utterances could not be segmented");
        }
        report
    }
}

fn plan_utterance(graph: &AnnotationGraph, row: &UtteranceRow, bound: usize) -> ImportResult<UtterancePlan> {
    let not_found = |reason: String| ImportError::PathNotFound {
        tier: Tier::Utterance,
        id: row.id.clone(),
        reason,
    };

    let first = graph
        .lookup(&Tier::Word, &row.begin_word_id)
        .ok_or_else(|| not_found(format!("first word {} not found", row.begin_word_id)))?;
    let last = graph
        .lookup(&Tier::Word, &row.end_word_id)
        .ok_or_else(|| not_found(format!("last word {} not found", row.end_word_id)))?;
    let words = graph.shortest_path(first, last, bound).ok_or_else(|| {
        not_found(format!(
            "no precedes path from word {} to word {}",
            row.begin_word_id, row.end_word_id
        ))
    })?;

    if let Some(&taken) = words
        .iter()
        .find(|&&w| graph.parent_in_tier(w, &Tier::Utterance).is_some())
    {
        return Err(ImportError::InvariantViolation(format!(
            "word {} already belongs to an utterance",
            graph.node(taken).id
        )));
    }

    let interval = Interval::new(graph.node(first).interval.begin, graph.node(last).interval.end).map_err(|e| {
        ImportError::InvalidRow {
            tier: Tier::Utterance,
            id: row.id.clone(),
            reason: e.to_string(),
        }
    })?;

    Ok(UtterancePlan { words, interval })
}

fn apply_utterance(
    registries: &Registries,
    graph: &mut AnnotationGraph,
    row: &UtteranceRow,
    plan: &UtterancePlan,
) -> ImportResult<()> {
    let utterance = graph.insert_node(Tier::Utterance, row.id.clone(), plan.interval, String::new())?;
    registries.classify(graph, utterance);
    graph.link_partition(utterance);
    graph.link_previous(utterance, row.prev_id.as_ref());
    for &word in &plan.words {
        graph.add_containment(word, utterance)?;
    }
    debug!(row_id = %row.id, words = plan.words.len(), "Created utterance");
    Ok(())
}
