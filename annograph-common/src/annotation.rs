//! Identifier, interval and tag value types shared by every stage
//!
//! A node is described by orthogonal fields rather than a label set:
//! its [`Tier`], an optional [`RoleTag`], and its [`Partition`] keys.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Stable row identifier, unique within its tier.
///
/// Staged rows carry ids either as strings or as integers; both deserialize
/// to the same textual form so `11` and `"11"` name the same node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AnnotationId(String);

impl AnnotationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnnotationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AnnotationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for AnnotationId {
                fn from(value: $t) -> Self {
                    Self(value.to_string())
                }
            }
        )*
    };
}

impl_from_integer!(i32, i64, u32, u64, usize);

impl<'de> Deserialize<'de> for AnnotationId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => Self(s),
            RawId::Unsigned(n) => Self(n.to_string()),
            RawId::Signed(n) => Self(n.to_string()),
        })
    }
}

/// Closed temporal interval `[begin, end]` in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub begin: f64,
    pub end: f64,
}

impl Interval {
    /// Create an interval, rejecting NaN bounds and `begin > end`
    pub fn new(begin: f64, end: f64) -> Result<Self> {
        if begin.is_nan() || end.is_nan() {
            return Err(Error::InvalidInput(format!(
                "interval bounds must be numbers (begin={}, end={})",
                begin, end
            )));
        }
        if begin > end {
            return Err(Error::InvalidInput(format!(
                "interval begin {} is after end {}",
                begin, end
            )));
        }
        Ok(Self { begin, end })
    }

    /// True when `other` lies entirely within `self`
    pub fn contains(&self, other: &Interval) -> bool {
        other.begin >= self.begin && other.end <= self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.4}, {:.4}]", self.begin, self.end)
    }
}

/// Annotation layer
///
/// The four layers the syllabification and segmentation stages reason about
/// are named; corpus-specific layers (e.g. `surface_transcription`) are kept
/// as [`Tier::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Tier {
    Utterance,
    Word,
    Syllable,
    Phone,
    Other(String),
}

impl Tier {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Utterance => "utterance",
            Self::Word => "word",
            Self::Syllable => "syllable",
            Self::Phone => "phone",
            Self::Other(name) => name,
        }
    }

    /// Name of the type dictionary for this tier (e.g. `phone_type`)
    pub fn type_label(&self) -> String {
        format!("{}_type", self.as_str())
    }
}

impl From<String> for Tier {
    fn from(value: String) -> Self {
        match value.as_str() {
            "utterance" => Self::Utterance,
            "word" => Self::Word,
            "syllable" => Self::Syllable,
            "phone" => Self::Phone,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for Tier {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Tier> for String {
    fn from(value: Tier) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phonological position of a phone within its syllable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Nucleus,
    Onset,
    Coda,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nucleus => "nucleus",
            Self::Onset => "onset",
            Self::Coda => "coda",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role plus its ordinal. Nuclei sit at position 0; onset and coda phones
/// count outward from the nucleus (or from the break in degenerate syllables).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTag {
    pub role: Role,
    pub syllable_position: u32,
}

impl RoleTag {
    pub fn nucleus() -> Self {
        Self {
            role: Role::Nucleus,
            syllable_position: 0,
        }
    }

    pub fn onset(position: u32) -> Self {
        Self {
            role: Role::Onset,
            syllable_position: position,
        }
    }

    pub fn coda(position: u32) -> Self {
        Self {
            role: Role::Coda,
            syllable_position: position,
        }
    }
}

/// Speaker × discourse partition key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Partition {
    pub speaker: String,
    pub discourse: String,
}

impl Partition {
    pub fn new(speaker: impl Into<String>, discourse: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            discourse: discourse.into(),
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.speaker, self.discourse)
    }
}

/// Key of a type node: one per distinct (tier, label)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeKey {
    pub tier: Tier,
    pub label: String,
}

impl TypeKey {
    pub fn new(tier: Tier, label: impl Into<String>) -> Self {
        Self {
            tier,
            label: label.into(),
        }
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tier.type_label(), self.label)
    }
}
