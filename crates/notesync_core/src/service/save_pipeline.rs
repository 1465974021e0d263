//! Conflict-aware save entry point.
//!
//! # Responsibility
//! - Wrap `ObjectGateway::save` with the same calling convention.
//! - Turn notebook/annotation save conflicts into structural merges.
//! - Own the lifecycle of working copies it creates.
//!
//! # Invariants
//! - Unmanaged kinds are delegated to the gateway unchanged.
//! - One gateway save per call; merges write the canonical copy directly.
//! - A handle created here is released exactly once, including on error,
//!   panic unwind and future cancellation.
//! - With `serialize_per_identifier`, managed saves of one identifier run one
//!   at a time within this process.

use async_trait::async_trait;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::config::SavePipelineConfig;
use crate::logging::sanitize_message;
use crate::model::record::{Record, RecordId};
use crate::repo::gateway::{GatewayError, MutableGuard, ObjectGateway, SaveRecord};
use crate::repo::handle::MutableHandle;
use crate::service::conflict_resolver::ConflictResolver;
use crate::service::identifier_lock::{IdentifierLease, IdentifierLocks};
use crate::service::merge::MergeError;

const MAX_LOGGED_ERROR_CHARS: usize = 200;

pub type SaveResult<T> = Result<T, SaveError>;

/// Fatal save failures surfaced to callers.
#[derive(Debug)]
pub enum SaveError {
    /// Non-conflict gateway failure, passed through with its cause.
    Gateway(GatewayError),
    /// Conflict detected but the merge could not complete.
    Merge(MergeError),
}

impl Display for SaveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gateway(err) => write!(f, "save failed: {err}"),
            Self::Merge(err) => write!(f, "save conflict could not be merged: {err}"),
        }
    }
}

impl Error for SaveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Gateway(err) => Some(err),
            Self::Merge(err) => Some(err),
        }
    }
}

impl From<GatewayError> for SaveError {
    fn from(value: GatewayError) -> Self {
        Self::Gateway(value)
    }
}

impl From<MergeError> for SaveError {
    fn from(value: MergeError) -> Self {
        Self::Merge(value)
    }
}

/// Save decorator over an `ObjectGateway`.
pub struct SavePipeline<G: ObjectGateway + ?Sized> {
    gateway: Arc<G>,
    resolver: ConflictResolver<G>,
    config: SavePipelineConfig,
    identifier_locks: IdentifierLocks,
}

impl<G: ObjectGateway + ?Sized> SavePipeline<G> {
    /// Creates a pipeline with default configuration.
    pub fn new(gateway: Arc<G>) -> Self {
        Self::with_config(gateway, SavePipelineConfig::default())
    }

    pub fn with_config(gateway: Arc<G>, config: SavePipelineConfig) -> Self {
        Self {
            resolver: ConflictResolver::new(Arc::clone(&gateway)),
            gateway,
            config,
            identifier_locks: IdentifierLocks::new(),
        }
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn config(&self) -> SavePipelineConfig {
        self.config
    }

    /// Saves a plain record, merging on conflict.
    ///
    /// A working copy is created for the attempt and always released before
    /// returning.
    pub async fn save(&self, record: &Record) -> SaveResult<Record> {
        if !record.kind().is_managed() {
            return self.gateway.save(record).await.map_err(SaveError::from);
        }

        let _lease = self.lease(&record.identifier).await;
        let gateway = self.gateway.as_ref();
        let local = MutableGuard::new(gateway, gateway.to_mutable(record));
        self.save_with_handle(record, &local).await
    }

    /// Saves the state of a caller-owned working copy, merging on conflict.
    ///
    /// The handle is not released; it stays owned by the caller.
    pub async fn save_mutable(&self, handle: &MutableHandle) -> SaveResult<Record> {
        if !handle.kind().is_managed() {
            return self
                .gateway
                .save(&handle.snapshot())
                .await
                .map_err(SaveError::from);
        }

        let _lease = self.lease(handle.identifier()).await;
        let record = handle.snapshot();
        self.save_with_handle(&record, handle).await
    }

    async fn lease(&self, identifier: &RecordId) -> Option<IdentifierLease<'_>> {
        if self.config.serialize_per_identifier {
            Some(self.identifier_locks.acquire(identifier).await)
        } else {
            None
        }
    }

    async fn save_with_handle(
        &self,
        original: &Record,
        local: &MutableHandle,
    ) -> SaveResult<Record> {
        let attempt = local.snapshot();
        let conflict = match self.gateway.save(&attempt).await {
            Ok(saved) => return Ok(saved),
            Err(err @ GatewayError::Conflict { .. }) => err,
            Err(err) => {
                error!(
                    "event=pipeline_save module=service status=error id={} error_code={} error={}",
                    original.identifier,
                    err.code(),
                    sanitize_message(&err.to_string(), MAX_LOGGED_ERROR_CHARS)
                );
                return Err(SaveError::Gateway(err));
            }
        };

        info!(
            "event=pipeline_save module=service status=conflict id={} kind={} detail={}",
            original.identifier,
            original.kind().as_str(),
            sanitize_message(&conflict.to_string(), MAX_LOGGED_ERROR_CHARS)
        );

        match self.resolver.resolve(original, local).await {
            Ok(outcome) => {
                info!(
                    "event=pipeline_save module=service status=merged id={} writes={} revision={}",
                    original.identifier,
                    outcome.writes,
                    outcome.record.revision
                );
                Ok(outcome.record)
            }
            Err(err) => {
                warn!(
                    "event=pipeline_save module=service status=error id={} error_code=merge_failed error={}",
                    original.identifier,
                    sanitize_message(&err.to_string(), MAX_LOGGED_ERROR_CHARS)
                );
                Err(SaveError::Merge(err))
            }
        }
    }
}

#[async_trait]
impl<G: ObjectGateway + ?Sized> SaveRecord for SavePipeline<G> {
    type Error = SaveError;

    async fn save(&self, record: &Record) -> SaveResult<Record> {
        SavePipeline::save(self, record).await
    }
}
