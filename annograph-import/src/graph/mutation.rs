//! Graph mutations handed to the receiving store
//!
//! Every change to a partition graph is appended to its log in the order it
//! was made. The store replays the log; it never sees the arena itself.

use annograph_common::{AnnotationId, Interval, Tier, TypeKey};
use serde::{Deserialize, Serialize};

/// Relationship kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    IsA,
    Precedes,
    ContainedBy,
    SpokenBy,
    SpokenIn,
    Annotates,
}

/// Endpoint of an edge or target of a property
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum NodeRef {
    Annotation { tier: Tier, id: AnnotationId },
    Type { key: TypeKey },
    Speaker { name: String },
    Discourse { name: String },
}

impl NodeRef {
    pub fn annotation(tier: &Tier, id: &AnnotationId) -> Self {
        Self::Annotation {
            tier: tier.clone(),
            id: id.clone(),
        }
    }
}

/// One store operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GraphMutation {
    /// Per-tier uniqueness constraint and indexes (idempotent at the store)
    RegisterSchema { tier: Tier },

    /// Create the type node if absent
    MergeTypeNode { key: TypeKey },

    /// Create the speaker node if absent
    MergeSpeaker { name: String },

    /// Create the discourse node if absent
    MergeDiscourse { name: String },

    CreateNode {
        tier: Tier,
        id: AnnotationId,
        interval: Interval,
        label: String,
        label_insensitive: String,
    },

    CreateEdge {
        kind: EdgeKind,
        from: NodeRef,
        to: NodeRef,
    },

    DeleteEdge {
        kind: EdgeKind,
        from: NodeRef,
        to: NodeRef,
    },

    SetProperty {
        node: NodeRef,
        key: String,
        value: serde_json::Value,
    },
}

impl GraphMutation {
    pub fn is_node_create(&self) -> bool {
        matches!(self, Self::CreateNode { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_mutation_serializes_with_op_tag() {
        let mutation = GraphMutation::CreateEdge {
            kind: EdgeKind::ContainedBy,
            from: NodeRef::annotation(&Tier::Phone, &AnnotationId::from(10)),
            to: NodeRef::annotation(&Tier::Syllable, &AnnotationId::from(100)),
        };
        let json = serde_json::to_value(&mutation).unwrap();
        assert_eq!(json["op"], "create_edge");
        assert_eq!(json["kind"], "contained_by");
        assert_eq!(json["from"]["node"], "annotation");
        assert_eq!(json["from"]["tier"], "phone");
        assert_eq!(json["to"]["id"], "100");
    }
}
