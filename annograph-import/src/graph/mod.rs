//! Partition-local annotation graph
//!
//! Nodes live in an arena indexed by `(tier, id)`. Edges are adjacency lists
//! of arena indices, so reparenting edits two lists and never invalidates
//! another reference. Every structural change is mirrored into the mutation
//! log that is later flushed to the receiving store.

pub mod mutation;
pub mod search;

pub use mutation::{EdgeKind, GraphMutation, NodeRef};
pub use search::Direction;

use crate::error::{ImportError, ImportResult};
use annograph_common::{AnnotationId, Interval, Partition, RoleTag, Tier, TypeKey};
use serde_json::json;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Arena index of a node
pub type NodeIndex = usize;

/// One annotation row materialized as a node
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationNode {
    pub id: AnnotationId,
    pub tier: Tier,
    pub interval: Interval,
    pub label: String,
    pub partition: Partition,
    pub role: Option<RoleTag>,
}

impl AnnotationNode {
    pub fn type_key(&self) -> TypeKey {
        TypeKey::new(self.tier.clone(), self.label.clone())
    }

    pub fn node_ref(&self) -> NodeRef {
        NodeRef::annotation(&self.tier, &self.id)
    }
}

/// Annotation graph of a single speaker × discourse partition
#[derive(Debug)]
pub struct AnnotationGraph {
    partition: Partition,
    nodes: Vec<AnnotationNode>,
    index: HashMap<(Tier, AnnotationId), NodeIndex>,
    successors: Vec<Vec<NodeIndex>>,
    predecessors: Vec<Vec<NodeIndex>>,
    parents: Vec<Vec<NodeIndex>>,
    children: Vec<Vec<NodeIndex>>,
    annotates: Vec<Option<NodeIndex>>,
    /// Rows whose predecessor has not been created yet, keyed by that predecessor
    pending_successors: HashMap<(Tier, AnnotationId), Vec<NodeIndex>>,
    merged_types: HashSet<TypeKey>,
    partition_nodes_merged: bool,
    log: Vec<GraphMutation>,
}

impl AnnotationGraph {
    pub fn new(partition: Partition) -> Self {
        Self {
            partition,
            nodes: Vec::new(),
            index: HashMap::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
            parents: Vec::new(),
            children: Vec::new(),
            annotates: Vec::new(),
            pending_successors: HashMap::new(),
            merged_types: HashSet::new(),
            partition_nodes_merged: false,
            log: Vec::new(),
        }
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: NodeIndex) -> &AnnotationNode {
        &self.nodes[index]
    }

    pub fn lookup(&self, tier: &Tier, id: &AnnotationId) -> Option<NodeIndex> {
        self.index.get(&(tier.clone(), id.clone())).copied()
    }

    pub fn contains(&self, tier: &Tier, id: &AnnotationId) -> bool {
        self.lookup(tier, id).is_some()
    }

    /// Node indices of one tier, in creation order
    pub fn tier_nodes<'a>(&'a self, tier: &'a Tier) -> impl Iterator<Item = NodeIndex> + 'a {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| &n.tier == tier)
            .map(|(i, _)| i)
    }

    pub fn tiers(&self) -> BTreeSet<Tier> {
        self.nodes.iter().map(|n| n.tier.clone()).collect()
    }

    pub fn successors(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.successors[index]
    }

    pub fn predecessors(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.predecessors[index]
    }

    /// Live `contained_by` targets of a node
    pub fn parents(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.parents[index]
    }

    pub fn children(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.children[index]
    }

    /// The live container of `index` in `tier`, if any
    pub fn parent_in_tier(&self, index: NodeIndex, tier: &Tier) -> Option<NodeIndex> {
        self.parents[index]
            .iter()
            .copied()
            .find(|&p| &self.nodes[p].tier == tier)
    }

    pub fn annotated_by(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.annotates[index]
    }

    /// Mutations recorded so far, in order
    pub fn mutations(&self) -> &[GraphMutation] {
        &self.log
    }

    /// Drain the mutation log
    pub fn take_mutations(&mut self) -> Vec<GraphMutation> {
        std::mem::take(&mut self.log)
    }

    pub fn record(&mut self, mutation: GraphMutation) {
        self.log.push(mutation);
    }

    /// Emit the speaker and discourse nodes once per partition
    pub fn ensure_partition_nodes(&mut self) {
        if self.partition_nodes_merged {
            return;
        }
        self.partition_nodes_merged = true;
        self.log.push(GraphMutation::MergeSpeaker {
            name: self.partition.speaker.clone(),
        });
        self.log.push(GraphMutation::MergeDiscourse {
            name: self.partition.discourse.clone(),
        });
    }

    /// Create a node. Fails without side effects when `(tier, id)` exists.
    pub fn insert_node(
        &mut self,
        tier: Tier,
        id: AnnotationId,
        interval: Interval,
        label: String,
    ) -> ImportResult<NodeIndex> {
        let key = (tier.clone(), id.clone());
        if self.index.contains_key(&key) {
            return Err(ImportError::DuplicateIdentifier { tier, id });
        }

        let index = self.nodes.len();
        self.log.push(GraphMutation::CreateNode {
            tier: tier.clone(),
            id: id.clone(),
            interval,
            label_insensitive: label.to_lowercase(),
            label: label.clone(),
        });
        self.nodes.push(AnnotationNode {
            id,
            tier,
            interval,
            label,
            partition: self.partition.clone(),
            role: None,
        });
        self.successors.push(Vec::new());
        self.predecessors.push(Vec::new());
        self.parents.push(Vec::new());
        self.children.push(Vec::new());
        self.annotates.push(None);
        self.index.insert(key.clone(), index);

        // Rows that named this node as their predecessor before it existed
        if let Some(waiting) = self.pending_successors.remove(&key) {
            for successor in waiting {
                self.add_precedes(index, successor);
            }
        }

        Ok(index)
    }

    /// Link a node to its type node, merging the type node on first sight
    pub fn link_type(&mut self, index: NodeIndex) -> TypeKey {
        let key = self.nodes[index].type_key();
        if self.merged_types.insert(key.clone()) {
            self.log.push(GraphMutation::MergeTypeNode { key: key.clone() });
        }
        self.log.push(GraphMutation::CreateEdge {
            kind: EdgeKind::IsA,
            from: self.nodes[index].node_ref(),
            to: NodeRef::Type { key: key.clone() },
        });
        key
    }

    /// `spoken_by` / `spoken_in` edges to the partition nodes
    pub fn link_partition(&mut self, index: NodeIndex) {
        self.ensure_partition_nodes();
        let from = self.nodes[index].node_ref();
        self.log.push(GraphMutation::CreateEdge {
            kind: EdgeKind::SpokenBy,
            from: from.clone(),
            to: NodeRef::Speaker {
                name: self.partition.speaker.clone(),
            },
        });
        self.log.push(GraphMutation::CreateEdge {
            kind: EdgeKind::SpokenIn,
            from,
            to: NodeRef::Discourse {
                name: self.partition.discourse.clone(),
            },
        });
    }

    /// Add `from -[precedes]-> to`. Re-adding an existing edge is a no-op.
    pub fn add_precedes(&mut self, from: NodeIndex, to: NodeIndex) {
        if self.successors[from].contains(&to) {
            return;
        }
        self.successors[from].push(to);
        self.predecessors[to].push(from);
        self.log.push(GraphMutation::CreateEdge {
            kind: EdgeKind::Precedes,
            from: self.nodes[from].node_ref(),
            to: self.nodes[to].node_ref(),
        });
    }

    /// Resolve a `previous_id` foreign key.
    ///
    /// When the predecessor already exists the edge is created now; otherwise
    /// the node waits until a node with that id is inserted. A predecessor
    /// that never arrives leaves the node as a chain head.
    pub fn link_previous(&mut self, index: NodeIndex, previous_id: Option<&AnnotationId>) -> bool {
        let Some(previous_id) = previous_id else {
            return false;
        };
        let tier = self.nodes[index].tier.clone();
        match self.lookup(&tier, previous_id) {
            Some(previous) => {
                self.add_precedes(previous, index);
                true
            }
            None => {
                self.pending_successors
                    .entry((tier, previous_id.clone()))
                    .or_default()
                    .push(index);
                false
            }
        }
    }

    /// Number of `previous_id` references still unresolved
    pub fn pending_predecessor_count(&self) -> usize {
        self.pending_successors.values().map(Vec::len).sum()
    }

    /// Add `child -[contained_by]-> parent`.
    ///
    /// A node holds at most one live container per ancestor tier: adding a
    /// second, different container of the same tier is refused.
    pub fn add_containment(&mut self, child: NodeIndex, parent: NodeIndex) -> ImportResult<()> {
        let parent_tier = self.nodes[parent].tier.clone();
        if let Some(existing) = self.parent_in_tier(child, &parent_tier) {
            if existing == parent {
                return Ok(());
            }
            return Err(ImportError::InvariantViolation(format!(
                "{} {} is already contained by {} {}",
                self.nodes[child].tier,
                self.nodes[child].id,
                parent_tier,
                self.nodes[existing].id
            )));
        }

        self.parents[child].push(parent);
        self.children[parent].push(child);
        self.log.push(GraphMutation::CreateEdge {
            kind: EdgeKind::ContainedBy,
            from: self.nodes[child].node_ref(),
            to: self.nodes[parent].node_ref(),
        });
        Ok(())
    }

    /// Delete `child -[contained_by]-> parent`. Returns false if absent.
    pub fn remove_containment(&mut self, child: NodeIndex, parent: NodeIndex) -> bool {
        let Some(pos) = self.parents[child].iter().position(|&p| p == parent) else {
            return false;
        };
        self.parents[child].remove(pos);
        self.children[parent].retain(|&c| c != child);
        self.log.push(GraphMutation::DeleteEdge {
            kind: EdgeKind::ContainedBy,
            from: self.nodes[child].node_ref(),
            to: self.nodes[parent].node_ref(),
        });
        true
    }

    /// Move `child` from container `from` to container `to`
    pub fn reparent(&mut self, child: NodeIndex, from: NodeIndex, to: NodeIndex) -> ImportResult<()> {
        self.remove_containment(child, from);
        self.add_containment(child, to)
    }

    /// Tag a node with a role. A node is tagged at most once.
    pub fn set_role(&mut self, index: NodeIndex, tag: RoleTag) -> ImportResult<()> {
        if let Some(existing) = self.nodes[index].role {
            return Err(ImportError::RoleConflict {
                id: self.nodes[index].id.clone(),
                existing: existing.role,
            });
        }
        self.nodes[index].role = Some(tag);
        let node = self.nodes[index].node_ref();
        self.log.push(GraphMutation::SetProperty {
            node: node.clone(),
            key: tag.role.as_str().to_string(),
            value: json!(true),
        });
        self.log.push(GraphMutation::SetProperty {
            node,
            key: "syllable_position".to_string(),
            value: json!(tag.syllable_position),
        });
        Ok(())
    }

    /// Record a plain property on a node
    pub fn set_property(&mut self, index: NodeIndex, key: &str, value: serde_json::Value) {
        let node = self.nodes[index].node_ref();
        self.log.push(GraphMutation::SetProperty {
            node,
            key: key.to_string(),
            value,
        });
    }

    /// Add `sub -[annotates]-> target`
    pub fn add_annotates(&mut self, sub: NodeIndex, target: NodeIndex) {
        self.annotates[sub] = Some(target);
        self.log.push(GraphMutation::CreateEdge {
            kind: EdgeKind::Annotates,
            from: self.nodes[sub].node_ref(),
            to: self.nodes[target].node_ref(),
        });
    }
}
