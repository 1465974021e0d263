//! Notebook entry model.
//!
//! # Responsibility
//! - Define the sectioned, paged entry layout stored under
//!   `configuration.entries`.
//!
//! # Invariants
//! - Entry `id` is assigned once at creation and never reused.
//! - Entry order inside a page is chronological and meaningful.
//! - Blank or whitespace-only text is not a meaningful edit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::model::record::now_epoch_ms;

/// Pages keyed by page id, each holding an ordered entry list.
pub type PageMap = BTreeMap<String, Vec<Entry>>;

/// Sections keyed by section id.
pub type EntryMap = BTreeMap<String, PageMap>;

/// One timestamped notebook entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Unique within its page.
    pub id: String,
    /// Free-form entry body.
    pub text: String,
    /// Unix epoch milliseconds.
    pub created_on: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Unix epoch milliseconds of the last local edit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<i64>,
}

impl Entry {
    /// Creates an entry with a generated id and the current timestamp.
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_id(
            format!("entry-{}", Uuid::new_v4()),
            text,
            now_epoch_ms(),
        )
    }

    /// Creates an entry with a caller-provided id.
    ///
    /// Used by import paths and tests where identity already exists.
    pub fn with_id(id: impl Into<String>, text: impl Into<String>, created_on: i64) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            created_on,
            created_by: None,
            modified: None,
        }
    }

    /// Returns whether the entry text carries any non-whitespace content.
    pub fn has_meaningful_text(&self) -> bool {
        !is_blank_text(&self.text)
    }
}

/// Returns `true` for empty or whitespace-only text.
pub fn is_blank_text(text: &str) -> bool {
    text.trim().is_empty()
}

/// Notebook payload, addressed as `configuration` by field paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookConfiguration {
    #[serde(default)]
    pub entries: EntryMap,
}

impl NotebookConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether any section has been configured.
    pub fn has_entries(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Returns the entry list for one page, if the page exists.
    pub fn page(&self, section: &str, page: &str) -> Option<&[Entry]> {
        self.entries
            .get(section)
            .and_then(|pages| pages.get(page))
            .map(Vec::as_slice)
    }

    /// Replaces the entry list for one page, creating section/page on demand.
    pub fn set_page(&mut self, section: &str, page: &str, entries: Vec<Entry>) {
        self.entries
            .entry(section.to_string())
            .or_default()
            .insert(page.to_string(), entries);
    }

    /// Appends one entry to the end of a page.
    pub fn push_entry(&mut self, section: &str, page: &str, entry: Entry) {
        self.entries
            .entry(section.to_string())
            .or_default()
            .entry(page.to_string())
            .or_default()
            .push(entry);
    }

    /// Returns a mutable reference to one entry by id.
    pub fn entry_mut(&mut self, section: &str, page: &str, entry_id: &str) -> Option<&mut Entry> {
        self.entries
            .get_mut(section)?
            .get_mut(page)?
            .iter_mut()
            .find(|entry| entry.id == entry_id)
    }
}
