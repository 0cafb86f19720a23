//! Invariant Checker
//!
//! Read-only validation of an assembled partition graph. Findings are
//! reported, never repaired.

use crate::graph::{AnnotationGraph, NodeIndex};
use annograph_common::{AnnotationId, Role, Tier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// One broken invariant
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum InvariantViolation {
    #[error("Tier {tier} has {} chain heads", .heads.len())]
    MultipleChainHeads { tier: Tier, heads: Vec<AnnotationId> },

    #[error("Tier {tier} has {} chain tails", .tails.len())]
    MultipleChainTails { tier: Tier, tails: Vec<AnnotationId> },

    #[error("{tier} {id} has {successors} successors and {predecessors} predecessors")]
    Branching {
        tier: Tier,
        id: AnnotationId,
        successors: usize,
        predecessors: usize,
    },

    /// Chain contains a cycle or does not reach every node
    #[error("Tier {tier} chain reaches {reached} of {total} nodes")]
    BrokenChain { tier: Tier, reached: usize, total: usize },

    #[error("{from_tier} {from} precedes {to_tier} {to}")]
    CrossTierPrecedes {
        from_tier: Tier,
        from: AnnotationId,
        to_tier: Tier,
        to: AnnotationId,
    },

    #[error("{tier} {id} is not nested in {parent_tier} {parent}")]
    IntervalNotNested {
        tier: Tier,
        id: AnnotationId,
        parent_tier: Tier,
        parent: AnnotationId,
    },

    #[error("{tier} {id} has {count} containers in tier {parent_tier}")]
    MultipleContainers {
        tier: Tier,
        id: AnnotationId,
        parent_tier: Tier,
        count: usize,
    },

    #[error("Nucleus {id} is contained by {syllables} syllables")]
    NucleusContainment { id: AnnotationId, syllables: usize },

    #[error("Syllable {id} has {nuclei} nuclei")]
    MultipleNuclei { id: AnnotationId, nuclei: usize },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InvariantChecker;

impl InvariantChecker {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, graph: &AnnotationGraph) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();
        check_precedence(graph, &mut violations);
        check_containment(graph, &mut violations);
        check_nuclei(graph, &mut violations);
        violations
    }
}

fn check_precedence(graph: &AnnotationGraph, violations: &mut Vec<InvariantViolation>) {
    for tier in graph.tiers() {
        // Sub-annotations are not chained
        let nodes: Vec<NodeIndex> = graph
            .tier_nodes(&tier)
            .filter(|&n| graph.annotated_by(n).is_none())
            .collect();
        if nodes.is_empty() {
            continue;
        }

        let same_tier = |list: &[NodeIndex]| -> Vec<NodeIndex> {
            list.iter().copied().filter(|&m| graph.node(m).tier == tier).collect()
        };

        let mut heads = Vec::new();
        let mut tails = Vec::new();
        for &n in &nodes {
            for &next in graph.successors(n) {
                let target = graph.node(next);
                if target.tier != tier {
                    violations.push(InvariantViolation::CrossTierPrecedes {
                        from_tier: tier.clone(),
                        from: graph.node(n).id.clone(),
                        to_tier: target.tier.clone(),
                        to: target.id.clone(),
                    });
                }
            }

            let successors = same_tier(graph.successors(n)).len();
            let predecessors = same_tier(graph.predecessors(n)).len();
            if successors > 1 || predecessors > 1 {
                violations.push(InvariantViolation::Branching {
                    tier: tier.clone(),
                    id: graph.node(n).id.clone(),
                    successors,
                    predecessors,
                });
            }
            if predecessors == 0 {
                heads.push(n);
            }
            if successors == 0 {
                tails.push(n);
            }
        }

        if heads.len() > 1 {
            violations.push(InvariantViolation::MultipleChainHeads {
                tier: tier.clone(),
                heads: heads.iter().map(|&n| graph.node(n).id.clone()).collect(),
            });
        }
        if tails.len() > 1 {
            violations.push(InvariantViolation::MultipleChainTails {
                tier: tier.clone(),
                tails: tails.iter().map(|&n| graph.node(n).id.clone()).collect(),
            });
        }

        // Walk from the (first) head; anything unreached is in a cycle or a second chain
        let mut reached = HashSet::new();
        if let Some(&head) = heads.first() {
            let mut current = Some(head);
            while let Some(n) = current {
                if !reached.insert(n) {
                    break;
                }
                current = same_tier(graph.successors(n)).first().copied();
            }
        }
        if reached.len() < nodes.len() && heads.len() <= 1 {
            violations.push(InvariantViolation::BrokenChain {
                tier: tier.clone(),
                reached: reached.len(),
                total: nodes.len(),
            });
        }
    }
}

fn check_containment(graph: &AnnotationGraph, violations: &mut Vec<InvariantViolation>) {
    for child in 0..graph.len() {
        let node = graph.node(child);
        let mut per_tier: BTreeMap<&Tier, usize> = BTreeMap::new();

        for &parent in graph.parents(child) {
            let container = graph.node(parent);
            *per_tier.entry(&container.tier).or_default() += 1;
            if !container.interval.contains(&node.interval) {
                violations.push(InvariantViolation::IntervalNotNested {
                    tier: node.tier.clone(),
                    id: node.id.clone(),
                    parent_tier: container.tier.clone(),
                    parent: container.id.clone(),
                });
            }
        }

        for (parent_tier, count) in per_tier {
            if count > 1 {
                violations.push(InvariantViolation::MultipleContainers {
                    tier: node.tier.clone(),
                    id: node.id.clone(),
                    parent_tier: parent_tier.clone(),
                    count,
                });
            }
        }
    }
}

fn check_nuclei(graph: &AnnotationGraph, violations: &mut Vec<InvariantViolation>) {
    let is_nucleus = |n: NodeIndex| graph.node(n).role.is_some_and(|tag| tag.role == Role::Nucleus);

    for phone in graph.tier_nodes(&Tier::Phone).filter(|&n| is_nucleus(n)) {
        let syllables = graph
            .parents(phone)
            .iter()
            .filter(|&&p| graph.node(p).tier == Tier::Syllable)
            .count();
        if syllables != 1 {
            violations.push(InvariantViolation::NucleusContainment {
                id: graph.node(phone).id.clone(),
                syllables,
            });
        }
    }

    for syllable in graph.tier_nodes(&Tier::Syllable) {
        let nuclei = graph.children(syllable).iter().filter(|&&c| is_nucleus(c)).count();
        if nuclei > 1 {
            violations.push(InvariantViolation::MultipleNuclei {
                id: graph.node(syllable).id.clone(),
                nuclei,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annograph_common::{Interval, Partition, RoleTag};

    fn graph() -> AnnotationGraph {
        AnnotationGraph::new(Partition::new("s01", "d01"))
    }

    fn add(graph: &mut AnnotationGraph, tier: Tier, id: u64, begin: f64, end: f64) -> NodeIndex {
        graph
            .insert_node(tier, id.into(), Interval::new(begin, end).unwrap(), String::new())
            .unwrap()
    }

    #[test]
    fn test_simple_chain_is_clean() {
        let mut g = graph();
        let a = add(&mut g, Tier::Word, 1, 0.0, 0.5);
        let b = add(&mut g, Tier::Word, 2, 0.5, 1.0);
        g.add_precedes(a, b);
        assert!(InvariantChecker::new().check(&g).is_empty());
    }

    #[test]
    fn test_two_chains_reported() {
        let mut g = graph();
        add(&mut g, Tier::Word, 1, 0.0, 0.5);
        add(&mut g, Tier::Word, 2, 0.5, 1.0);
        let violations = InvariantChecker::new().check(&g);
        assert!(violations
            .iter()
            .any(|v| matches!(v, InvariantViolation::MultipleChainHeads { heads, .. } if heads.len() == 2)));
    }

    #[test]
    fn test_cycle_reported() {
        let mut g = graph();
        let a = add(&mut g, Tier::Phone, 1, 0.0, 0.1);
        let b = add(&mut g, Tier::Phone, 2, 0.1, 0.2);
        let c = add(&mut g, Tier::Phone, 3, 0.2, 0.3);
        g.add_precedes(a, b);
        g.add_precedes(b, c);
        g.add_precedes(c, b);
        let violations = InvariantChecker::new().check(&g);
        assert!(violations.iter().any(|v| matches!(v, InvariantViolation::Branching { .. })));
    }

    #[test]
    fn test_headless_cycle_is_broken_chain() {
        let mut g = graph();
        let a = add(&mut g, Tier::Phone, 1, 0.0, 0.1);
        let b = add(&mut g, Tier::Phone, 2, 0.1, 0.2);
        g.add_precedes(a, b);
        g.add_precedes(b, a);
        let violations = InvariantChecker::new().check(&g);
        assert_eq!(
            violations,
            vec![InvariantViolation::BrokenChain {
                tier: Tier::Phone,
                reached: 0,
                total: 2
            }]
        );
    }

    #[test]
    fn test_unnested_and_cross_tier_reported() {
        let mut g = graph();
        let w = add(&mut g, Tier::Word, 1, 0.0, 0.3);
        let p = add(&mut g, Tier::Phone, 10, 0.2, 0.4);
        g.add_containment(p, w).unwrap();
        g.add_precedes(w, p);

        let violations = InvariantChecker::new().check(&g);
        assert!(violations
            .iter()
            .any(|v| matches!(v, InvariantViolation::IntervalNotNested { .. })));
        assert!(violations
            .iter()
            .any(|v| matches!(v, InvariantViolation::CrossTierPrecedes { .. })));
    }

    #[test]
    fn test_nucleus_outside_syllable_reported() {
        let mut g = graph();
        let p = add(&mut g, Tier::Phone, 11, 0.0, 0.1);
        g.set_role(p, RoleTag::nucleus()).unwrap();
        let violations = InvariantChecker::new().check(&g);
        assert_eq!(
            violations,
            vec![InvariantViolation::NucleusContainment {
                id: 11.into(),
                syllables: 0
            }]
        );
    }

    #[test]
    fn test_syllable_with_two_nuclei_reported() {
        let mut g = graph();
        let s = add(&mut g, Tier::Syllable, 100, 0.0, 0.2);
        let a = add(&mut g, Tier::Phone, 11, 0.0, 0.1);
        let b = add(&mut g, Tier::Phone, 12, 0.1, 0.2);
        g.add_precedes(a, b);
        for p in [a, b] {
            g.set_role(p, RoleTag::nucleus()).unwrap();
            g.add_containment(p, s).unwrap();
        }

        let violations = InvariantChecker::new().check(&g);
        assert_eq!(
            violations,
            vec![InvariantViolation::MultipleNuclei {
                id: 100.into(),
                nuclei: 2
            }]
        );
    }
}
