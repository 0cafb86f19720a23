//! Subannotation Attacher
//!
//! Sub-annotations (bursts, closures, voicing onsets, ...) are nodes of their
//! own tier, named after the subannotation type, that point at the annotated
//! node through an `annotates` edge. They carry no type node and take no part
//! in precedence or containment.

use crate::error::ImportError;
use crate::graph::AnnotationGraph;
use crate::registry::Registries;
use crate::report::{Stage, StageReport};
use crate::rows::SubannotationBatch;
use annograph_common::{Interval, Tier};
use std::collections::HashSet;
use tracing::{debug, warn};

pub struct SubannotationAttacher<'a> {
    registries: &'a Registries,
}

impl<'a> SubannotationAttacher<'a> {
    pub fn new(registries: &'a Registries) -> Self {
        Self { registries }
    }

    pub fn attach(&self, graph: &mut AnnotationGraph, batches: &[SubannotationBatch]) -> StageReport {
        let mut report = StageReport::new(Stage::Subannotations);
        for batch in batches {
            self.attach_batch(graph, batch, &mut report);
        }
        report
    }

    fn attach_batch(&self, graph: &mut AnnotationGraph, batch: &SubannotationBatch, report: &mut StageReport) {
        let tier = Tier::from(batch.subannotation_type.as_str());

        let mut seen = HashSet::with_capacity(batch.rows.len());
        if let Some(row) = batch
            .rows
            .iter()
            .find(|row| !seen.insert(&row.id) || graph.contains(&tier, &row.id))
        {
            let error = ImportError::DuplicateIdentifier {
                tier: tier.clone(),
                id: row.id.clone(),
            };
            warn!(tier = %tier, error = %error, "Subannotation batch aborted");
            report.abort(&tier, &error);
            return;
        }

        if batch.rows.is_empty() {
            return;
        }
        self.registries.prepare_tier(graph, &tier);

        for row in &batch.rows {
            let Some(target) = graph.lookup(&batch.annotated_tier, &row.annotated_id) else {
                report.fail(
                    &tier,
                    &ImportError::DanglingReference {
                        tier: tier.clone(),
                        id: row.id.clone(),
                        field: "annotated_id",
                        target: row.annotated_id.to_string(),
                    },
                );
                continue;
            };

            let interval = match Interval::new(row.begin, row.end) {
                Ok(interval) => interval,
                Err(e) => {
                    report.fail(
                        &tier,
                        &ImportError::InvalidRow {
                            tier: tier.clone(),
                            id: row.id.clone(),
                            reason: e.to_string(),
                        },
                    );
                    continue;
                }
            };

            let label = row.label.clone().unwrap_or_default();
            match graph.insert_node(tier.clone(), row.id.clone(), interval, label) {
                Ok(index) => {
                    for (key, value) in &row.properties {
                        graph.set_property(index, key, value.clone());
                    }
                    graph.add_annotates(index, target);
                    report.created += 1;
                }
                Err(e) => report.fail(&tier, &e),
            }
        }

        debug!(
            tier = %tier,
            annotated_tier = %batch.annotated_tier,
            created = report.created,
            "Attached subannotations"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::rows::SubannotationRow;
    use crate::graph::{GraphMutation, NodeRef};
    use annograph_common::Partition;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn graph_with_phone() -> AnnotationGraph {
        let mut graph = AnnotationGraph::new(Partition::new("s01", "d01"));
        graph
            .insert_node(Tier::Phone, 10.into(), Interval::new(0.0, 0.1).unwrap(), "k".to_string())
            .unwrap();
        graph
    }

    fn burst(id: u64, annotated: u64, label: Option<&str>) -> SubannotationRow {
        SubannotationRow {
            id: id.into(),
            annotated_id: annotated.into(),
            begin: 0.05,
            end: 0.06,
            label: label.map(str::to_string),
            properties: BTreeMap::new(),
        }
    }

    #[test]
    fn test_attaches_with_default_label() {
        let registries = Registries::new();
        let mut graph = graph_with_phone();
        let batch = SubannotationBatch {
            subannotation_type: "burst".to_string(),
            annotated_tier: Tier::Phone,
            rows: vec![burst(1, 10, None)],
        };

        let report = SubannotationAttacher::new(&registries).attach(&mut graph, &[batch]);
        assert!(report.is_clean());

        let tier = Tier::from("burst");
        let sub = graph.lookup(&tier, &1.into()).unwrap();
        let phone = graph.lookup(&Tier::Phone, &10.into()).unwrap();
        assert_eq!(graph.annotated_by(sub), Some(phone));
        assert_eq!(graph.node(sub).label, "");
        assert!(registries.schema.is_registered(&tier));
    }

    #[test]
    fn test_extra_columns_become_properties() {
        let registries = Registries::new();
        let mut graph = graph_with_phone();
        graph.take_mutations();
        let mut row = burst(1, 10, Some("b"));
        row.properties.insert("vot".to_string(), json!(0.012));
        let batch = SubannotationBatch {
            subannotation_type: "burst".to_string(),
            annotated_tier: Tier::Phone,
            rows: vec![row],
        };

        let report = SubannotationAttacher::new(&registries).attach(&mut graph, &[batch]);
        assert!(report.is_clean());

        let props: Vec<_> = graph
            .mutations()
            .iter()
            .filter_map(|m| match m {
                GraphMutation::SetProperty { node, key, value } => Some((node.clone(), key.as_str(), value.clone())),
                _ => None,
            })
            .collect();
        let sub = NodeRef::annotation(&Tier::from("burst"), &1.into());
        assert_eq!(props, vec![(sub, "vot", json!(0.012))]);
    }

    #[test]
    fn test_unknown_target_fails_row_only() {
        let registries = Registries::new();
        let mut graph = graph_with_phone();
        let batch = SubannotationBatch {
            subannotation_type: "burst".to_string(),
            annotated_tier: Tier::Phone,
            rows: vec![burst(1, 99, Some("b")), burst(2, 10, Some("b"))],
        };

        let report = SubannotationAttacher::new(&registries).attach(&mut graph, &[batch]);
        assert_eq!(report.created, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, ErrorKind::DanglingReference);
        assert_eq!(report.aborted_batches, 0);
    }

    #[test]
    fn test_duplicate_id_aborts_batch() {
        let registries = Registries::new();
        let mut graph = graph_with_phone();
        let batch = SubannotationBatch {
            subannotation_type: "burst".to_string(),
            annotated_tier: Tier::Phone,
            rows: vec![burst(1, 10, None), burst(1, 10, None)],
        };

        let report = SubannotationAttacher::new(&registries).attach(&mut graph, &[batch]);
        assert_eq!(report.aborted_batches, 1);
        assert_eq!(report.created, 0);
        assert_eq!(graph.len(), 1);
    }
}
