//! Hierarchy Builder
//!
//! Turns tier batches into annotation nodes, type links, precedence chains and
//! containment edges. Every batch is validated as a whole before any of its
//! rows touches the graph; containers are resolved by id across all batches of
//! the partition, so batches may arrive in any order.

use crate::error::{ImportError, ImportResult};
use crate::graph::{AnnotationGraph, NodeIndex};
use crate::registry::Registries;
use crate::report::{Stage, StageReport};
use crate::rows::{AnnotationRow, TierBatch};
use annograph_common::{AnnotationId, Interval, Tier};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Batch that passed pre-validation, with its well-formed rows
struct Candidate<'b> {
    batch: &'b TierBatch,
    rows: Vec<(&'b AnnotationRow, Interval)>,
    invalid: Vec<ImportError>,
}

/// Builds tier nodes and their edges from row batches
pub struct HierarchyBuilder<'a> {
    registries: &'a Registries,
}

impl<'a> HierarchyBuilder<'a> {
    pub fn new(registries: &'a Registries) -> Self {
        Self { registries }
    }

    /// Import every batch of one partition
    pub fn build(&self, graph: &mut AnnotationGraph, batches: &[TierBatch]) -> StageReport {
        let mut report = StageReport::new(Stage::Hierarchy);
        info!(
            speaker = %graph.partition().speaker,
            discourse = %graph.partition().discourse,
            batches = batches.len(),
            "Building tier hierarchy"
        );

        let candidates = validate_batches(graph, batches, &mut report);
        let accepted = resolve_containers(graph, candidates, &mut report);

        // All nodes first: containment and precedence then resolve by lookup
        let mut created: Vec<Vec<(&AnnotationRow, NodeIndex)>> = Vec::with_capacity(accepted.len());
        for candidate in &accepted {
            let tier = &candidate.batch.tier;
            for error in &candidate.invalid {
                report.fail(tier, error);
            }

            self.registries.prepare_tier(graph, tier);
            let mut nodes = Vec::with_capacity(candidate.rows.len());
            for &(row, interval) in &candidate.rows {
                match graph.insert_node(tier.clone(), row.id.clone(), interval, row.label.clone()) {
                    Ok(index) => {
                        self.registries.classify(graph, index);
                        nodes.push((row, index));
                        report.created += 1;
                    }
                    Err(e) => report.fail(tier, &e),
                }
            }
            debug!(tier = %tier, rows = nodes.len(), "Created tier nodes");
            created.push(nodes);
        }

        for (candidate, nodes) in accepted.iter().zip(&created) {
            for &(row, index) in nodes {
                graph.link_partition(index);
                if let Some(supertype) = &candidate.batch.supertype {
                    link_container(graph, index, row, supertype, &mut report);
                }
                graph.link_previous(index, row.previous_id.as_ref());
            }
        }

        let unresolved = graph.pending_predecessor_count();
        if unresolved > 0 {
            debug!(unresolved, "Rows left as chain heads with unresolved previous_id");
        }

        report
    }
}

fn validate_batches<'b>(
    graph: &AnnotationGraph,
    batches: &'b [TierBatch],
    report: &mut StageReport,
) -> Vec<Candidate<'b>> {
    let mut claimed: HashMap<Tier, HashSet<AnnotationId>> = HashMap::new();
    let mut candidates = Vec::with_capacity(batches.len());

    for batch in batches {
        match validate_batch(graph, batch, claimed.get(&batch.tier)) {
            Ok(candidate) => {
                claimed
                    .entry(batch.tier.clone())
                    .or_default()
                    .extend(candidate.rows.iter().map(|(row, _)| row.id.clone()));
                candidates.push(candidate);
            }
            Err(e) => {
                warn!(tier = %batch.tier, error = %e, "Batch aborted");
                report.abort(&batch.tier, &e);
            }
        }
    }

    candidates
}

fn validate_batch<'b>(
    graph: &AnnotationGraph,
    batch: &'b TierBatch,
    claimed: Option<&HashSet<AnnotationId>>,
) -> ImportResult<Candidate<'b>> {
    let partition = graph.partition();
    let mut seen = HashSet::with_capacity(batch.rows.len());
    let mut rows = Vec::with_capacity(batch.rows.len());
    let mut invalid = Vec::new();

    for row in &batch.rows {
        let duplicate = !seen.insert(&row.id)
            || graph.contains(&batch.tier, &row.id)
            || claimed.is_some_and(|ids| ids.contains(&row.id));
        if duplicate {
            return Err(ImportError::DuplicateIdentifier {
                tier: batch.tier.clone(),
                id: row.id.clone(),
            });
        }

        check_partition_key(batch, row, "speaker", row.speaker.as_deref(), &partition.speaker)?;
        check_partition_key(batch, row, "discourse", row.discourse.as_deref(), &partition.discourse)?;

        if batch.supertype.is_some() && row.container_id.is_none() {
            return Err(ImportError::DanglingReference {
                tier: batch.tier.clone(),
                id: row.id.clone(),
                field: "container_id",
                target: "<none>".to_string(),
            });
        }

        match Interval::new(row.begin, row.end) {
            Ok(interval) => rows.push((row, interval)),
            Err(e) => invalid.push(ImportError::InvalidRow {
                tier: batch.tier.clone(),
                id: row.id.clone(),
                reason: e.to_string(),
            }),
        }
    }

    Ok(Candidate { batch, rows, invalid })
}

fn check_partition_key(
    batch: &TierBatch,
    row: &AnnotationRow,
    field: &'static str,
    given: Option<&str>,
    expected: &str,
) -> ImportResult<()> {
    match given {
        Some(value) if value != expected => Err(ImportError::DanglingReference {
            tier: batch.tier.clone(),
            id: row.id.clone(),
            field,
            target: value.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Drop batches whose containers are neither in the graph nor in another
/// accepted batch, repeating until no further batch falls
fn resolve_containers<'b>(
    graph: &AnnotationGraph,
    mut candidates: Vec<Candidate<'b>>,
    report: &mut StageReport,
) -> Vec<Candidate<'b>> {
    loop {
        let failed = {
            let available = available_ids(&candidates);
            candidates
                .iter()
                .enumerate()
                .find_map(|(i, c)| missing_container(graph, c, &available).map(|e| (i, e)))
        };

        match failed {
            Some((i, error)) => {
                let dropped = candidates.remove(i);
                warn!(tier = %dropped.batch.tier, error = %error, "Batch aborted");
                report.abort(&dropped.batch.tier, &error);
            }
            None => return candidates,
        }
    }
}

fn available_ids(candidates: &[Candidate<'_>]) -> HashMap<Tier, HashSet<AnnotationId>> {
    let mut available: HashMap<Tier, HashSet<AnnotationId>> = HashMap::new();
    for candidate in candidates {
        available
            .entry(candidate.batch.tier.clone())
            .or_default()
            .extend(candidate.rows.iter().map(|(row, _)| row.id.clone()));
    }
    available
}

fn missing_container(
    graph: &AnnotationGraph,
    candidate: &Candidate<'_>,
    available: &HashMap<Tier, HashSet<AnnotationId>>,
) -> Option<ImportError> {
    let supertype = candidate.batch.supertype.as_ref()?;
    candidate.rows.iter().find_map(|(row, _)| {
        let container = row.container_id.as_ref()?;
        let present = graph.contains(supertype, container)
            || available.get(supertype).is_some_and(|ids| ids.contains(container));
        (!present).then(|| ImportError::DanglingReference {
            tier: candidate.batch.tier.clone(),
            id: row.id.clone(),
            field: "container_id",
            target: container.to_string(),
        })
    })
}

fn link_container(
    graph: &mut AnnotationGraph,
    index: NodeIndex,
    row: &AnnotationRow,
    supertype: &Tier,
    report: &mut StageReport,
) {
    let tier = graph.node(index).tier.clone();
    let Some(container_id) = row.container_id.as_ref() else {
        return;
    };
    let Some(parent) = graph.lookup(supertype, container_id) else {
        report.fail(
            &tier,
            &ImportError::DanglingReference {
                tier: tier.clone(),
                id: row.id.clone(),
                field: "container_id",
                target: container_id.to_string(),
            },
        );
        return;
    };

    if let Err(e) = graph.add_containment(index, parent) {
        report.fail_at(&tier, &row.id, &e);
        return;
    }

    // Kept as given; the nesting fault is reported, never repaired
    let (child_interval, parent_interval) = (graph.node(index).interval, graph.node(parent).interval);
    if !parent_interval.contains(&child_interval) {
        let error = ImportError::InvariantViolation(format!(
            "{} {} {} is not nested in {} {} {}",
            tier, row.id, child_interval, supertype, container_id, parent_interval
        ));
        warn!(tier = %tier, row_id = %row.id, "Interval not nested in container");
        report.fail_at(&tier, &row.id, &error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::graph::GraphMutation;
    use annograph_common::Partition;

    fn words() -> TierBatch {
        TierBatch::new(
            Tier::Word,
            None,
            vec![
                AnnotationRow::new(1, 0.0, 0.3, "cat"),
                AnnotationRow::new(2, 0.3, 0.6, "sat").after(1),
            ],
        )
    }

    fn phones() -> TierBatch {
        TierBatch::new(
            Tier::Phone,
            Some(Tier::Word),
            vec![
                AnnotationRow::new(10, 0.0, 0.1, "k").within(1),
                AnnotationRow::new(11, 0.1, 0.2, "ae").within(1).after(10),
                AnnotationRow::new(12, 0.2, 0.3, "t").within(1).after(11),
            ],
        )
    }

    fn build(batches: &[TierBatch]) -> (AnnotationGraph, StageReport) {
        let registries = Registries::new();
        let mut graph = AnnotationGraph::new(Partition::new("s01", "d01"));
        let report = HierarchyBuilder::new(&registries).build(&mut graph, batches);
        (graph, report)
    }

    #[test]
    fn test_containment_independent_of_batch_order() {
        let (graph, report) = build(&[phones(), words()]);
        assert!(report.is_clean(), "{:?}", report.failures);
        assert_eq!(report.created, 5);

        let word = graph.lookup(&Tier::Word, &1.into()).unwrap();
        let ae = graph.lookup(&Tier::Phone, &11.into()).unwrap();
        assert_eq!(graph.parent_in_tier(ae, &Tier::Word), Some(word));
        assert_eq!(graph.children(word).len(), 3);
    }

    #[test]
    fn test_precedes_from_previous_id_not_row_order() {
        let batch = TierBatch::new(
            Tier::Word,
            None,
            vec![
                AnnotationRow::new(3, 0.6, 0.9, "on").after(2),
                AnnotationRow::new(1, 0.0, 0.3, "the"),
                AnnotationRow::new(2, 0.3, 0.6, "cat").after(1),
            ],
        );
        let (graph, _) = build(&[batch]);
        let w1 = graph.lookup(&Tier::Word, &1.into()).unwrap();
        let w2 = graph.lookup(&Tier::Word, &2.into()).unwrap();
        let w3 = graph.lookup(&Tier::Word, &3.into()).unwrap();
        assert_eq!(graph.successors(w1), &[w2]);
        assert_eq!(graph.successors(w2), &[w3]);
        assert!(graph.predecessors(w1).is_empty());
    }

    #[test]
    fn test_duplicate_aborts_batch_and_dependents() {
        let mut bad_words = words();
        bad_words.rows.push(AnnotationRow::new(1, 0.6, 0.9, "on"));

        let (graph, report) = build(&[bad_words, phones()]);
        assert!(graph.is_empty());
        assert_eq!(report.aborted_batches, 2);
        assert_eq!(report.failures[0].kind, ErrorKind::DuplicateIdentifier);
        assert_eq!(report.failures[1].kind, ErrorKind::DanglingReference);
    }

    #[test]
    fn test_speaker_mismatch_is_dangling() {
        let mut batch = words();
        batch.rows[1].speaker = Some("s99".to_string());
        let (graph, report) = build(&[batch]);
        assert!(graph.is_empty());
        assert_eq!(report.failures[0].kind, ErrorKind::DanglingReference);
    }

    #[test]
    fn test_inverted_interval_skips_row_only() {
        let mut batch = words();
        batch.rows.push(AnnotationRow::new(3, 0.9, 0.6, "on").after(2));
        let (graph, report) = build(&[batch]);
        assert_eq!(graph.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, ErrorKind::InvalidRow);
        assert_eq!(report.aborted_batches, 0);
    }

    #[test]
    fn test_unnested_child_reported_but_linked() {
        let mut batch = phones();
        batch.rows[2].end = 0.45;
        let (graph, report) = build(&[words(), batch]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, ErrorKind::InvariantViolation);
        assert_eq!(report.failures[0].row_id, Some(12.into()));

        let t = graph.lookup(&Tier::Phone, &12.into()).unwrap();
        assert!(graph.parent_in_tier(t, &Tier::Word).is_some());
    }

    #[test]
    fn test_schema_registered_before_first_node() {
        let (graph, _) = build(&[words()]);
        let log = graph.mutations();
        assert_eq!(log[0], GraphMutation::RegisterSchema { tier: Tier::Word });
        assert!(log[1].is_node_create());
    }
}
