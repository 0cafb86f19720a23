//! annograph-import library interface
//!
//! Builds partition-local annotation graphs from staged rows and hands the
//! resulting mutations to a receiving store.

pub mod checker;
pub mod error;
pub mod graph;
pub mod hierarchy;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod rows;
pub mod segmenter;
pub mod sink;
pub mod subannotation;
pub mod syllabification;

pub use crate::checker::{InvariantChecker, InvariantViolation};
pub use crate::error::{ErrorKind, ImportError, ImportResult, RowFailure};
pub use crate::graph::{AnnotationGraph, AnnotationNode, GraphMutation, NodeIndex};
pub use crate::orchestrator::{ImportOrchestrator, PartitionOutcome};
pub use crate::registry::Registries;
pub use crate::report::{ImportReport, PartitionReport, PartitionStatus, Stage, StageReport};
pub use crate::rows::{ImportManifest, PartitionInput};
pub use crate::sink::{GraphSink, JsonLinesSink, MemorySink};
