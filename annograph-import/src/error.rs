//! Error types for annograph-import
//!
//! Row-level faults are collected into [`RowFailure`]s and reported per
//! partition. Identifier collisions and partition-resolution faults abort the
//! enclosing batch before any of its rows is applied.

use annograph_common::{AnnotationId, Role, Tier};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Import fault
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ImportError {
    /// Two rows of one tier share an id, or a row reuses an existing id
    #[error("Duplicate identifier {id} in tier {tier}")]
    DuplicateIdentifier { tier: Tier, id: AnnotationId },

    /// A foreign key names a node that does not exist
    #[error("Dangling reference from {tier} {id}: {field} = {target}")]
    DanglingReference {
        tier: Tier,
        id: AnnotationId,
        field: &'static str,
        target: String,
    },

    /// A bounded search found no path (or no anchoring word)
    #[error("No path for {tier} {id}: {reason}")]
    PathNotFound {
        tier: Tier,
        id: AnnotationId,
        reason: String,
    },

    /// A phone already carries a role tag
    #[error("Phone {id} already tagged {existing}")]
    RoleConflict { id: AnnotationId, existing: Role },

    /// Malformed row (e.g. inverted interval)
    #[error("Invalid {tier} row {id}: {reason}")]
    InvalidRow {
        tier: Tier,
        id: AnnotationId,
        reason: String,
    },

    /// Graph invariant broken
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Receiving store rejected a batch
    #[error("Sink error: {0}")]
    Sink(String),
}

pub type ImportResult<T> = Result<T, ImportError>;

/// Error category reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DuplicateIdentifier,
    DanglingReference,
    PathNotFound,
    RoleConflict,
    InvalidRow,
    InvariantViolation,
    Sink,
}

impl ImportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateIdentifier { .. } => ErrorKind::DuplicateIdentifier,
            Self::DanglingReference { .. } => ErrorKind::DanglingReference,
            Self::PathNotFound { .. } => ErrorKind::PathNotFound,
            Self::RoleConflict { .. } => ErrorKind::RoleConflict,
            Self::InvalidRow { .. } => ErrorKind::InvalidRow,
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Self::Sink(_) => ErrorKind::Sink,
        }
    }

    /// Id of the row that raised the fault, when there is one
    pub fn row_id(&self) -> Option<&AnnotationId> {
        match self {
            Self::DuplicateIdentifier { id, .. }
            | Self::DanglingReference { id, .. }
            | Self::PathNotFound { id, .. }
            | Self::RoleConflict { id, .. }
            | Self::InvalidRow { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// One (row id, error kind) pair in a partition report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFailure {
    pub row_id: Option<AnnotationId>,
    pub tier: Option<Tier>,
    pub kind: ErrorKind,
    pub message: String,
}

impl RowFailure {
    pub fn new(tier: Option<Tier>, error: &ImportError) -> Self {
        Self {
            row_id: error.row_id().cloned(),
            tier,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}
