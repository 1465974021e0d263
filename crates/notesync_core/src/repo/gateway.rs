//! Persistence gateway contracts.
//!
//! # Responsibility
//! - Define `SaveRecord`, the save contract shared by stores and the
//!   conflict-aware pipeline.
//! - Define `ObjectGateway`, the working-copy surface merges rely on.
//! - Provide `MutableGuard` so acquired handles are released on every path.
//!
//! # Invariants
//! - `GatewayError::Conflict` is the only recoverable save failure.
//! - `destroy_mutable` never fails and tolerates repeated calls.

use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::ops::Deref;

use crate::db::DbError;
use crate::model::field_path::{FieldPath, FieldPathError};
use crate::model::record::{Record, RecordId};
use crate::repo::handle::MutableHandle;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway failure taxonomy.
#[derive(Debug)]
pub enum GatewayError {
    /// Stored revision differs from the revision the writer started from.
    Conflict {
        identifier: RecordId,
        expected_revision: u64,
        actual_revision: u64,
    },
    NotFound(RecordId),
    FieldPath(FieldPathError),
    Db(DbError),
    InvalidData(String),
    /// Store unreachable or rejected the request for a non-version reason.
    Transport(String),
}

impl GatewayError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Stable short code for log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "conflict",
            Self::NotFound(_) => "not_found",
            Self::FieldPath(_) => "field_path",
            Self::Db(_) => "db",
            Self::InvalidData(_) => "invalid_data",
            Self::Transport(_) => "transport",
        }
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict {
                identifier,
                expected_revision,
                actual_revision,
            } => write!(
                f,
                "conflict saving {identifier}: expected revision {expected_revision}, stored revision {actual_revision}"
            ),
            Self::NotFound(identifier) => write!(f, "object not found: {identifier}"),
            Self::FieldPath(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid stored object data: {message}"),
            Self::Transport(message) => write!(f, "object store transport failure: {message}"),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::FieldPath(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FieldPathError> for GatewayError {
    fn from(value: FieldPathError) -> Self {
        Self::FieldPath(value)
    }
}

impl From<DbError> for GatewayError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}

/// Save contract shared by raw stores and wrapping pipelines.
#[async_trait]
pub trait SaveRecord: Send + Sync {
    type Error: Error + Send + Sync + 'static;

    /// Persists `record` and returns the stored version.
    async fn save(&self, record: &Record) -> Result<Record, Self::Error>;
}

/// Object access surface consumed by the save pipeline and mergers.
#[async_trait]
pub trait ObjectGateway: SaveRecord<Error = GatewayError> {
    /// Fetches the current stored record as a live working copy.
    async fn get_mutable(&self, identifier: &RecordId) -> GatewayResult<MutableHandle>;

    /// Wraps an in-memory record as a live working copy without a round trip.
    fn to_mutable(&self, record: &Record) -> MutableHandle;

    /// Detaches `handle` from change notifications.
    fn destroy_mutable(&self, handle: &MutableHandle);

    /// Writes `value` at `path`, persisting it and notifying every live
    /// handle bound to the same identifier.
    fn mutate(
        &self,
        handle: &MutableHandle,
        path: &FieldPath,
        value: serde_json::Value,
    ) -> GatewayResult<()>;
}

/// Owns one handle and releases it through its gateway on drop.
pub struct MutableGuard<'g, G: ObjectGateway + ?Sized> {
    gateway: &'g G,
    handle: MutableHandle,
}

impl<'g, G: ObjectGateway + ?Sized> MutableGuard<'g, G> {
    pub fn new(gateway: &'g G, handle: MutableHandle) -> Self {
        Self { gateway, handle }
    }

    pub fn handle(&self) -> &MutableHandle {
        &self.handle
    }
}

impl<G: ObjectGateway + ?Sized> Deref for MutableGuard<'_, G> {
    type Target = MutableHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<G: ObjectGateway + ?Sized> Drop for MutableGuard<'_, G> {
    fn drop(&mut self) {
        self.gateway.destroy_mutable(&self.handle);
    }
}
