//! Annotation tag merge.
//!
//! # Responsibility
//! - Union locally added tags into the canonical annotation after a save
//!   conflict.
//! - Refuse to merge annotations that point at different entries.
//!
//! # Invariants
//! - Target validation completes before any write.
//! - No write happens when the local side adds no new tag.

use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;

use crate::model::annotation::AnnotationPayload;
use crate::model::field_path::FieldPath;
use crate::model::record::Record;
use crate::repo::gateway::{MutableGuard, ObjectGateway};
use crate::repo::handle::MutableHandle;
use crate::service::merge::{MergeError, MergeOutcome, MergeResult, TargetIntegrityError};

/// Checks that every local target exists remotely with the same entry id.
pub fn validate_targets(
    local: &AnnotationPayload,
    remote: &AnnotationPayload,
) -> Result<(), TargetIntegrityError> {
    for (target_id, local_target) in &local.targets {
        let remote_target =
            remote
                .targets
                .get(target_id)
                .ok_or_else(|| TargetIntegrityError::MissingTarget {
                    target_id: target_id.clone(),
                })?;
        if remote_target.entry_id != local_target.entry_id {
            return Err(TargetIntegrityError::DivergentEntryId {
                target_id: target_id.clone(),
                remote_entry_id: remote_target.entry_id.clone(),
                local_entry_id: local_target.entry_id.clone(),
            });
        }
    }
    Ok(())
}

/// Returns the duplicate-free union (remote order first) and how many tags
/// only the local side contributed.
pub fn union_tags(remote: &[String], local: &[String]) -> (Vec<String>, usize) {
    let remote_tags: HashSet<&str> = remote.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(remote.len() + local.len());
    let mut contributed = 0;

    for tag in remote {
        if seen.insert(tag.as_str()) {
            merged.push(tag.clone());
        }
    }
    for tag in local {
        if seen.insert(tag.as_str()) {
            merged.push(tag.clone());
            if !remote_tags.contains(tag.as_str()) {
                contributed += 1;
            }
        }
    }

    (merged, contributed)
}

/// Applies local annotation tags onto the canonical stored annotation.
pub struct TagMerger<G: ObjectGateway + ?Sized> {
    gateway: Arc<G>,
}

impl<G: ObjectGateway + ?Sized> TagMerger<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// Merges tags of `local` into a fresh canonical copy.
    ///
    /// # Errors
    /// - `TargetIntegrity` when a local target is missing remotely or refers
    ///   to a different entry. Nothing is written in that case.
    /// - `PayloadMismatch` when either side is not an annotation payload.
    /// - `Gateway` when fetching or writing the canonical copy fails.
    pub async fn merge_tags(
        &self,
        original: &Record,
        local: &MutableHandle,
    ) -> MergeResult<MergeOutcome> {
        let local_snapshot = local.snapshot();
        let local_payload = local_snapshot.annotation_payload().ok_or_else(|| {
            MergeError::PayloadMismatch {
                identifier: local_snapshot.identifier.clone(),
                expected: "annotation",
            }
        })?;

        let gateway = self.gateway.as_ref();
        let remote = MutableGuard::new(gateway, gateway.get_mutable(local.identifier()).await?);
        let remote_snapshot = remote.snapshot();
        let remote_payload = remote_snapshot.annotation_payload().ok_or_else(|| {
            MergeError::PayloadMismatch {
                identifier: remote_snapshot.identifier.clone(),
                expected: "annotation",
            }
        })?;

        if let Err(err) = validate_targets(local_payload, remote_payload) {
            warn!(
                "event=tag_merge module=service status=error id={} type={} error_code=target_integrity",
                original.identifier, original.type_key
            );
            return Err(err.into());
        }

        let (merged, contributed) = union_tags(&remote_payload.tags, &local_payload.tags);
        let mut writes = 0;
        if contributed > 0 {
            let value = serde_json::to_value(&merged)?;
            gateway.mutate(&remote, &FieldPath::Tags, value)?;
            writes += 1;
        }

        info!(
            "event=tag_merge module=service status=ok id={} tags_added={} writes={}",
            remote.identifier(),
            contributed,
            writes
        );

        Ok(MergeOutcome {
            record: remote.snapshot(),
            writes,
        })
    }
}
