//! Process-wide dictionaries shared by every partition worker
//!
//! Both are append-only. Concurrent creation of one key is first-writer-wins:
//! a later writer sees the existing entry and does not overwrite it.

use crate::graph::{AnnotationGraph, GraphMutation, NodeIndex};
use annograph_common::{Partition, Tier, TypeKey};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

/// Type dictionary entry
#[derive(Debug, Clone, PartialEq)]
pub struct TypeNode {
    pub key: TypeKey,
    /// Partition that created the entry
    pub first_seen_in: Partition,
}

/// Dictionary of (tier, label) type nodes
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<TypeKey, TypeNode>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure the type exists. Returns true if this call created it.
    pub fn ensure(&self, key: &TypeKey, partition: &Partition) -> bool {
        {
            let types = self.types.read().unwrap_or_else(|e| e.into_inner());
            if types.contains_key(key) {
                return false;
            }
        }

        let mut types = self.types.write().unwrap_or_else(|e| e.into_inner());
        if types.contains_key(key) {
            return false;
        }
        types.insert(
            key.clone(),
            TypeNode {
                key: key.clone(),
                first_seen_in: partition.clone(),
            },
        );
        true
    }

    pub fn get(&self, key: &TypeKey) -> Option<TypeNode> {
        self.types
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.types.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct types in one tier
    pub fn count_in_tier(&self, tier: &Tier) -> usize {
        self.types
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .filter(|k| &k.tier == tier)
            .count()
    }
}

/// Per-tier schema registration (uniqueness constraint and indexes)
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    registered: Mutex<HashSet<Tier>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tier. Returns true only for the first call per tier.
    pub fn register(&self, tier: &Tier) -> bool {
        self.registered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tier.clone())
    }

    pub fn is_registered(&self, tier: &Tier) -> bool {
        self.registered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(tier)
    }
}

/// Shared dictionaries handed to every stage
#[derive(Debug, Default)]
pub struct Registries {
    pub types: TypeRegistry,
    pub schema: SchemaRegistry,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tier` before its first row; emits the schema mutation once per process
    pub fn prepare_tier(&self, graph: &mut AnnotationGraph, tier: &Tier) {
        if self.schema.register(tier) {
            tracing::debug!(tier = %tier, "Registering tier schema");
            graph.record(GraphMutation::RegisterSchema { tier: tier.clone() });
        }
    }

    /// Link a node to its type node and record the type in the shared dictionary.
    ///
    /// The `MergeTypeNode` mutation is emitted per partition graph (the store
    /// merges it idempotently); the dictionary only tracks which partition saw
    /// each type first and is surfaced as the session's type count.
    pub fn classify(&self, graph: &mut AnnotationGraph, index: NodeIndex) {
        let key = graph.link_type(index);
        if self.types.ensure(&key, graph.partition()) {
            tracing::trace!(type_key = %key, partition = %graph.partition(), "New type");
        }
    }
}
