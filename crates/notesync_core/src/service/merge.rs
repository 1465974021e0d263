//! Shared merge result and error types.

use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::model::field_path::FieldPathError;
use crate::model::record::{Record, RecordId};
use crate::repo::gateway::GatewayError;

pub type MergeResult<T> = Result<T, MergeError>;

/// Result of one successful merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Canonical record after the merge.
    pub record: Record,
    /// Number of field-path writes issued against the canonical copy.
    pub writes: usize,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.writes > 0
    }
}

/// Annotation targets that do not refer to the same logical entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetIntegrityError {
    /// Local target absent from the canonical annotation.
    MissingTarget { target_id: String },
    /// Both sides annotate the target but reference different entries.
    DivergentEntryId {
        target_id: String,
        remote_entry_id: String,
        local_entry_id: String,
    },
}

impl Display for TargetIntegrityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTarget { target_id } => {
                write!(f, "conflict on annotation: target is missing `{target_id}`")
            }
            Self::DivergentEntryId {
                target_id,
                remote_entry_id,
                local_entry_id,
            } => write!(
                f,
                "conflict on annotation target `{target_id}`: entry id `{remote_entry_id}` has a different entry id `{local_entry_id}`"
            ),
        }
    }
}

impl Error for TargetIntegrityError {}

/// Merge failures. All are fatal for the surrounding save.
#[derive(Debug)]
pub enum MergeError {
    /// Record kind has no merge strategy.
    UnmanagedKind(String),
    /// Payload shape does not match the record kind.
    PayloadMismatch {
        identifier: RecordId,
        expected: &'static str,
    },
    TargetIntegrity(TargetIntegrityError),
    /// Merged value has no addressable field path. Nothing was written.
    FieldPath(FieldPathError),
    Gateway(GatewayError),
    Encode(serde_json::Error),
}

impl Display for MergeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnmanagedKind(type_key) => {
                write!(f, "no conflict merge strategy for record type `{type_key}`")
            }
            Self::PayloadMismatch {
                identifier,
                expected,
            } => write!(f, "record {identifier} does not carry a {expected} payload"),
            Self::TargetIntegrity(err) => write!(f, "{err}"),
            Self::FieldPath(err) => write!(f, "cannot address merged value: {err}"),
            Self::Gateway(err) => write!(f, "{err}"),
            Self::Encode(err) => write!(f, "failed to encode merged value: {err}"),
        }
    }
}

impl Error for MergeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::TargetIntegrity(err) => Some(err),
            Self::FieldPath(err) => Some(err),
            Self::Gateway(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::UnmanagedKind(_) | Self::PayloadMismatch { .. } => None,
        }
    }
}

impl From<TargetIntegrityError> for MergeError {
    fn from(value: TargetIntegrityError) -> Self {
        Self::TargetIntegrity(value)
    }
}

impl From<FieldPathError> for MergeError {
    fn from(value: FieldPathError) -> Self {
        Self::FieldPath(value)
    }
}

impl From<GatewayError> for MergeError {
    fn from(value: GatewayError) -> Self {
        Self::Gateway(value)
    }
}

impl From<serde_json::Error> for MergeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}
