//! Annotation (tag set) model.
//!
//! # Invariants
//! - One annotation refers to exactly one entry per target.
//! - `tags` never contains duplicates after a merge write.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entry reference for one annotated target object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationTarget {
    pub entry_id: String,
}

impl AnnotationTarget {
    pub fn new(entry_id: impl Into<String>) -> Self {
        Self {
            entry_id: entry_id.into(),
        }
    }
}

/// Tag set attached to one or more targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationPayload {
    /// Target keystring -> referenced entry.
    #[serde(default)]
    pub targets: BTreeMap<String, AnnotationTarget>,
    /// Tag ids, insertion ordered.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl AnnotationPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper for one target.
    pub fn with_target(
        mut self,
        target_id: impl Into<String>,
        entry_id: impl Into<String>,
    ) -> Self {
        self.targets
            .insert(target_id.into(), AnnotationTarget::new(entry_id));
        self
    }

    /// Builder-style helper for tag ids.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|current| current == tag)
    }
}
