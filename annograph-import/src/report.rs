//! Import reports
//!
//! The caller receives, per partition, a status plus the (row id, error kind)
//! pairs of every partial failure. Nothing here is retried.

use crate::checker::InvariantViolation;
use crate::error::{ImportError, RowFailure};
use annograph_common::{AnnotationId, Partition, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline stage within a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Hierarchy,
    Subannotations,
    Utterances,
    Syllables,
}

impl Stage {
    pub fn description(self) -> &'static str {
        match self {
            Self::Hierarchy => "Importing tier hierarchy",
            Self::Subannotations => "Importing subannotations",
            Self::Utterances => "Importing utterances",
            Self::Syllables => "Importing syllables",
        }
    }
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    /// Nodes created by the stage
    pub created: usize,
    /// Batches rejected as a whole
    pub aborted_batches: usize,
    pub failures: Vec<RowFailure>,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            created: 0,
            aborted_batches: 0,
            failures: Vec::new(),
        }
    }

    pub fn fail(&mut self, tier: &Tier, error: &ImportError) {
        self.failures.push(RowFailure::new(Some(tier.clone()), error));
    }

    /// Record a fault against the row that raised it. The error may name
    /// another node (e.g. the phone of a role conflict) or none at all.
    pub fn fail_at(&mut self, tier: &Tier, id: &AnnotationId, error: &ImportError) {
        let mut failure = RowFailure::new(Some(tier.clone()), error);
        failure.row_id = Some(id.clone());
        self.failures.push(failure);
    }

    /// Record a batch-aborting fault
    pub fn abort(&mut self, tier: &Tier, error: &ImportError) {
        self.aborted_batches += 1;
        self.fail(tier, error);
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Final state of a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStatus {
    Completed,
    CompletedWithErrors,
    Failed,
    Cancelled,
}

impl PartitionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Outcome of one speaker × discourse partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionReport {
    pub partition: Partition,
    pub status: PartitionStatus,
    pub stages: Vec<StageReport>,
    pub violations: Vec<InvariantViolation>,
    pub mutations_total: usize,
    pub mutations_committed: usize,
    pub sink_error: Option<String>,
}

impl PartitionReport {
    pub fn new(partition: Partition) -> Self {
        Self {
            partition,
            status: PartitionStatus::Completed,
            stages: Vec::new(),
            violations: Vec::new(),
            mutations_total: 0,
            mutations_committed: 0,
            sink_error: None,
        }
    }

    /// Report for a partition that was never started
    pub fn not_started(partition: Partition, status: PartitionStatus) -> Self {
        Self {
            status,
            ..Self::new(partition)
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &RowFailure> {
        self.stages.iter().flat_map(|s| s.failures.iter())
    }

    pub fn failure_count(&self) -> usize {
        self.stages.iter().map(|s| s.failures.len()).sum()
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Derive the status from what was recorded
    pub fn settle(&mut self, cancelled: bool) {
        self.status = if self.sink_error.is_some() {
            PartitionStatus::Failed
        } else if cancelled {
            PartitionStatus::Cancelled
        } else if self.failure_count() > 0 || !self.violations.is_empty() {
            PartitionStatus::CompletedWithErrors
        } else {
            PartitionStatus::Completed
        };
    }
}

/// Outcome of a whole import session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Distinct (tier, label) types in the shared dictionary when the session ended
    pub type_nodes: usize,
    pub partitions: Vec<PartitionReport>,
}

impl ImportReport {
    pub fn count(&self, status: PartitionStatus) -> usize {
        self.partitions.iter().filter(|p| p.status == status).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(PartitionStatus::Failed) > 0
    }

    pub fn partition(&self, speaker: &str, discourse: &str) -> Option<&PartitionReport> {
        self.partitions
            .iter()
            .find(|p| p.partition.speaker == speaker && p.partition.discourse == discourse)
    }
}
