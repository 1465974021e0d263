//! Notebook entry merge.
//!
//! # Responsibility
//! - Fold locally added entries and local text edits into the canonical
//!   notebook after a save conflict.
//!
//! # Invariants
//! - Canonical entry order is preserved; local additions are appended.
//! - Every entry id appears once per merged page.
//! - A blank local text never overwrites canonical text.
//! - Each changed page is written with one field-path mutation.
//! - Every page write is computed and addressed before the first mutation,
//!   so an unaddressable key fails the merge with nothing written.

use log::{debug, info};
use std::collections::HashSet;
use std::sync::Arc;

use crate::model::field_path::FieldPath;
use crate::model::notebook::Entry;
use crate::model::record::RecordPayload;
use crate::repo::gateway::{MutableGuard, ObjectGateway};
use crate::repo::handle::MutableHandle;
use crate::service::merge::{MergeError, MergeOutcome, MergeResult};

/// Merged entry list for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMerge {
    pub entries: Vec<Entry>,
    /// Local entries appended because their id was unknown remotely.
    pub added: usize,
    /// Canonical entries whose text was replaced by a local edit.
    pub edited: usize,
}

impl PageMerge {
    pub fn changed(&self) -> bool {
        self.added > 0 || self.edited > 0
    }
}

/// Merges one page of local entries into the canonical page.
pub fn merge_page(remote: &[Entry], local: &[Entry]) -> PageMerge {
    let remote_ids: HashSet<&str> = remote.iter().map(|entry| entry.id.as_str()).collect();
    let mut entries = remote.to_vec();

    let mut appended = HashSet::new();
    for entry in local {
        if !remote_ids.contains(entry.id.as_str()) && appended.insert(entry.id.as_str()) {
            entries.push(entry.clone());
        }
    }
    let added = appended.len();

    let mut edited = 0;
    let locally_modified = local.iter().filter(|local_entry| {
        !remote.iter().any(|remote_entry| {
            remote_entry.id == local_entry.id && remote_entry.text == local_entry.text
        })
    });
    for local_entry in locally_modified {
        if !remote_ids.contains(local_entry.id.as_str()) || !local_entry.has_meaningful_text() {
            continue;
        }
        if let Some(merged) = entries.iter_mut().find(|entry| entry.id == local_entry.id) {
            if merged.text != local_entry.text {
                merged.text = local_entry.text.clone();
                edited += 1;
            }
        }
    }

    PageMerge {
        entries,
        added,
        edited,
    }
}

/// Applies local notebook entries onto the canonical stored notebook.
pub struct EntryMerger<G: ObjectGateway + ?Sized> {
    gateway: Arc<G>,
}

impl<G: ObjectGateway + ?Sized> EntryMerger<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// Merges entries of `local` into a fresh canonical copy.
    ///
    /// A local notebook without sections returns the canonical copy as is.
    ///
    /// # Errors
    /// - `PayloadMismatch` when either side is not a notebook payload.
    /// - `FieldPath` when a changed page has a key no field path can name.
    /// - `Gateway` when fetching or writing the canonical copy fails.
    pub async fn merge_entries(&self, local: &MutableHandle) -> MergeResult<MergeOutcome> {
        let local_snapshot = local.snapshot();
        let local_configuration = match &local_snapshot.payload {
            RecordPayload::Notebook(configuration) => configuration,
            _ => {
                return Err(MergeError::PayloadMismatch {
                    identifier: local_snapshot.identifier.clone(),
                    expected: "notebook",
                })
            }
        };

        let gateway = self.gateway.as_ref();
        let remote = MutableGuard::new(gateway, gateway.get_mutable(local.identifier()).await?);
        let remote_snapshot = remote.snapshot();
        let remote_configuration = remote_snapshot.notebook_configuration().ok_or_else(|| {
            MergeError::PayloadMismatch {
                identifier: remote_snapshot.identifier.clone(),
                expected: "notebook",
            }
        })?;
        if !local_configuration.has_entries() {
            debug!(
                "event=entry_merge module=service status=skipped reason=no_entries id={}",
                remote.identifier()
            );
            return Ok(MergeOutcome {
                record: remote_snapshot.clone(),
                writes: 0,
            });
        }

        let mut pending = Vec::new();
        let mut added = 0;
        let mut edited = 0;
        for (section, pages) in &local_configuration.entries {
            for (page, local_page) in pages {
                let remote_page = remote_configuration.page(section, page).unwrap_or(&[]);
                let merged = merge_page(remote_page, local_page);
                if !merged.changed() {
                    continue;
                }

                let path = FieldPath::page_entries(section.as_str(), page.as_str())?;
                let value = serde_json::to_value(&merged.entries)?;
                added += merged.added;
                edited += merged.edited;
                pending.push((path, value));
            }
        }

        let writes = pending.len();
        for (path, value) in pending {
            gateway.mutate(&remote, &path, value)?;
        }

        info!(
            "event=entry_merge module=service status=ok id={} pages_written={} entries_added={} entries_edited={}",
            remote.identifier(),
            writes,
            added,
            edited
        );

        Ok(MergeOutcome {
            record: remote.snapshot(),
            writes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::merge_page;
    use crate::model::notebook::Entry;

    fn entry(id: &str, text: &str) -> Entry {
        Entry::with_id(id, text, 0)
    }

    fn ids(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|entry| entry.id.as_str()).collect()
    }

    #[test]
    fn additions_append_after_remote_order() {
        let remote = [entry("r1", "x"), entry("s", "shared"), entry("r2", "y")];
        let local = [entry("l1", "new"), entry("s", "shared"), entry("l2", "newer")];

        let merged = merge_page(&remote, &local);
        assert_eq!(ids(&merged.entries), vec!["r1", "s", "r2", "l1", "l2"]);
        assert_eq!(merged.added, 2);
        assert_eq!(merged.edited, 0);
    }

    #[test]
    fn duplicate_local_ids_are_appended_once() {
        let merged = merge_page(&[], &[entry("a", "one"), entry("a", "two")]);
        assert_eq!(ids(&merged.entries), vec!["a"]);
        assert_eq!(merged.entries[0].text, "one");
    }

    #[test]
    fn non_blank_edit_replaces_text_in_place() {
        let remote = [entry("1", "old"), entry("2", "keep")];
        let local = [entry("1", "new text")];

        let merged = merge_page(&remote, &local);
        assert_eq!(ids(&merged.entries), vec!["1", "2"]);
        assert_eq!(merged.entries[0].text, "new text");
        assert_eq!(merged.edited, 1);
        assert!(merged.changed());
    }

    #[test]
    fn blank_edit_never_erases_remote_text() {
        for blank in ["", "   ", "\n\t"] {
            let merged = merge_page(&[entry("1", "hello")], &[entry("1", blank)]);
            assert_eq!(merged.entries[0].text, "hello");
            assert!(!merged.changed());
        }
    }

    #[test]
    fn edit_keeps_remote_metadata() {
        let mut remote_entry = entry("1", "old");
        remote_entry.created_on = 55;
        remote_entry.created_by = Some("remote".to_string());
        let merged = merge_page(&[remote_entry], &[entry("1", "new")]);
        assert_eq!(merged.entries[0].created_on, 55);
        assert_eq!(merged.entries[0].created_by.as_deref(), Some("remote"));
    }

    #[test]
    fn identical_pages_produce_no_change() {
        let page = [entry("1", "a"), entry("2", "b")];
        let merged = merge_page(&page, &page);
        assert_eq!(merged.entries, page.to_vec());
        assert!(!merged.changed());
    }

    #[test]
    fn remote_only_entries_survive() {
        let merged = merge_page(&[entry("r", "remote")], &[]);
        assert_eq!(ids(&merged.entries), vec!["r"]);
        assert!(!merged.changed());
    }
}
