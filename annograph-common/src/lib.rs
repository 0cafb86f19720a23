//! # Annograph Common Library
//!
//! Shared code for the annotation graph importer:
//! - Identifier, interval, tier and role value types
//! - Import event and progress types
//! - Configuration loading
//! - Common error type

pub mod annotation;
pub mod config;
pub mod error;
pub mod events;

pub use annotation::{AnnotationId, Interval, Partition, Role, RoleTag, Tier, TypeKey};
pub use error::{Error, Result};
