//! Persisted record envelope.
//!
//! # Responsibility
//! - Carry identity, type, revision and payload for one stored object.
//! - Map store-level type keys to the merge strategy (`RecordKind`).
//! - Apply typed field-path writes.
//!
//! # Invariants
//! - `identifier` never changes for the lifetime of a record.
//! - `mark_saved` strictly increases `revision` and never moves `modified`
//!   backwards.
//! - Notebook section and page keys of a storable record are addressable by
//!   a field path.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::model::annotation::AnnotationPayload;
use crate::model::field_path::{is_addressable_key, FieldPath, FieldPathError};
use crate::model::notebook::{Entry, EntryMap, NotebookConfiguration};

/// Type key for notebook objects.
pub const TYPE_NOTEBOOK: &str = "notebook";
/// Type key for notebooks with restricted editing.
pub const TYPE_RESTRICTED_NOTEBOOK: &str = "restricted-notebook";
/// Type key for tag annotations.
pub const TYPE_ANNOTATION: &str = "annotation";

/// Stable, globally unique record identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub namespace: String,
    pub key: String,
}

impl RecordId {
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }

    /// Creates an identifier with a random v4 key.
    pub fn generate(namespace: impl Into<String>) -> Self {
        Self::new(namespace, Uuid::new_v4().to_string())
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "{}:{}", self.namespace, self.key)
        }
    }
}

/// Merge strategy selected from a record's type key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    /// Sectioned, paged entry lists (notebooks).
    EntryCollection,
    /// Tags attached to shared targets (annotations).
    TagSet,
    /// Any other type; bypasses conflict handling.
    Unmanaged(String),
}

impl RecordKind {
    pub fn from_type_key(type_key: &str) -> Self {
        match type_key {
            TYPE_NOTEBOOK | TYPE_RESTRICTED_NOTEBOOK => Self::EntryCollection,
            TYPE_ANNOTATION => Self::TagSet,
            other => Self::Unmanaged(other.to_string()),
        }
    }

    pub fn is_managed(&self) -> bool {
        !matches!(self, Self::Unmanaged(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::EntryCollection => "entry-collection",
            Self::TagSet => "tag-set",
            Self::Unmanaged(type_key) => type_key.as_str(),
        }
    }
}

/// Kind-specific record body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "data", rename_all = "snake_case")]
pub enum RecordPayload {
    Notebook(NotebookConfiguration),
    Annotation(AnnotationPayload),
    /// Payload of unmanaged types, stored verbatim.
    Opaque(serde_json::Value),
}

/// One persisted, versioned object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub identifier: RecordId,
    /// Serialized as `type` to match store schema naming.
    #[serde(rename = "type")]
    pub type_key: String,
    pub name: String,
    /// Unix epoch milliseconds of the last successful save.
    pub modified: i64,
    /// Store revision this copy was read at. `0` means never persisted.
    pub revision: u64,
    pub payload: RecordPayload,
}

impl Record {
    /// Creates an unsaved notebook record.
    pub fn notebook(
        identifier: RecordId,
        name: impl Into<String>,
        configuration: NotebookConfiguration,
    ) -> Self {
        Self::new(
            identifier,
            TYPE_NOTEBOOK,
            name,
            RecordPayload::Notebook(configuration),
        )
    }

    /// Creates an unsaved annotation record.
    pub fn annotation(
        identifier: RecordId,
        name: impl Into<String>,
        payload: AnnotationPayload,
    ) -> Self {
        Self::new(
            identifier,
            TYPE_ANNOTATION,
            name,
            RecordPayload::Annotation(payload),
        )
    }

    /// Creates an unsaved record of an arbitrary (usually unmanaged) type.
    pub fn opaque(
        identifier: RecordId,
        type_key: impl Into<String>,
        name: impl Into<String>,
        body: serde_json::Value,
    ) -> Self {
        Self::new(identifier, type_key, name, RecordPayload::Opaque(body))
    }

    fn new(
        identifier: RecordId,
        type_key: impl Into<String>,
        name: impl Into<String>,
        payload: RecordPayload,
    ) -> Self {
        Self {
            identifier,
            type_key: type_key.into(),
            name: name.into(),
            modified: now_epoch_ms(),
            revision: 0,
            payload,
        }
    }

    pub fn kind(&self) -> RecordKind {
        RecordKind::from_type_key(&self.type_key)
    }

    pub fn notebook_configuration(&self) -> Option<&NotebookConfiguration> {
        match &self.payload {
            RecordPayload::Notebook(configuration) => Some(configuration),
            _ => None,
        }
    }

    pub fn notebook_configuration_mut(&mut self) -> Option<&mut NotebookConfiguration> {
        match &mut self.payload {
            RecordPayload::Notebook(configuration) => Some(configuration),
            _ => None,
        }
    }

    /// Shortcut for `configuration.entries`.
    pub fn entries(&self) -> Option<&EntryMap> {
        self.notebook_configuration()
            .map(|configuration| &configuration.entries)
    }

    pub fn annotation_payload(&self) -> Option<&AnnotationPayload> {
        match &self.payload {
            RecordPayload::Annotation(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn annotation_payload_mut(&mut self) -> Option<&mut AnnotationPayload> {
        match &mut self.payload {
            RecordPayload::Annotation(payload) => Some(payload),
            _ => None,
        }
    }

    /// Applies one typed field write to the payload.
    ///
    /// Does not touch `revision`/`modified`; stores call `mark_saved`.
    pub fn apply_field(
        &mut self,
        path: &FieldPath,
        value: serde_json::Value,
    ) -> Result<(), FieldPathError> {
        path.validate()?;
        let type_key = self.type_key.clone();
        match (path, &mut self.payload) {
            (FieldPath::Tags, RecordPayload::Annotation(payload)) => {
                payload.tags = decode_field(path, value)?;
                Ok(())
            }
            (FieldPath::PageEntries { section, page }, RecordPayload::Notebook(configuration)) => {
                let entries: Vec<Entry> = decode_field(path, value)?;
                configuration.set_page(section, page, entries);
                Ok(())
            }
            _ => Err(FieldPathError::PayloadMismatch {
                path: path.to_string(),
                type_key,
            }),
        }
    }

    /// Rejects notebooks whose section or page keys no field path can name.
    pub fn validate_field_keys(&self) -> Result<(), FieldPathError> {
        let Some(entries) = self.entries() else {
            return Ok(());
        };
        for (section, pages) in entries {
            if !is_addressable_key(section) {
                return Err(FieldPathError::InvalidKey(section.clone()));
            }
            if let Some(page) = pages.keys().find(|page| !is_addressable_key(page)) {
                return Err(FieldPathError::InvalidKey(page.clone()));
            }
        }
        Ok(())
    }

    /// Stamps a successful store write.
    pub fn mark_saved(&mut self) {
        self.revision += 1;
        self.modified = now_epoch_ms().max(self.modified.saturating_add(1));
    }
}

fn decode_field<T>(path: &FieldPath, value: serde_json::Value) -> Result<T, FieldPathError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(value).map_err(|err| FieldPathError::InvalidValue {
        path: path.to_string(),
        message: err.to_string(),
    })
}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
