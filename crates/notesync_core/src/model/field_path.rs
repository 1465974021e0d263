//! Dotted field paths accepted by gateway `mutate` calls.
//!
//! # Invariants
//! - Only `tags` and `configuration.entries.<section>.<page>` are writable.
//! - Section and page keys are non-empty, contain no `.` and do not start
//!   with whitespace. Every `FieldPath` built through `parse` or
//!   `page_entries` displays back to a string `parse` accepts.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Field path for the annotation tag list.
const TAGS_PATH: &str = "tags";
const ENTRIES_PATH_PREFIX: &str = "configuration.entries";

static PAGE_ENTRIES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^configuration\.entries\.([^.\s][^.]*)\.([^.\s][^.]*)$")
        .expect("valid page entries path regex")
});

/// Parsed, typed field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldPath {
    /// `tags`
    Tags,
    /// `configuration.entries.<section>.<page>`
    PageEntries { section: String, page: String },
}

impl FieldPath {
    /// Parses a dotted field path.
    pub fn parse(path: &str) -> Result<Self, FieldPathError> {
        if path == TAGS_PATH {
            return Ok(Self::Tags);
        }

        let caps = PAGE_ENTRIES_RE
            .captures(path)
            .ok_or_else(|| FieldPathError::Unsupported(path.to_string()))?;
        Ok(Self::PageEntries {
            section: caps[1].to_string(),
            page: caps[2].to_string(),
        })
    }

    /// Builds the entries path for one page, rejecting keys the dotted form
    /// cannot address.
    pub fn page_entries(
        section: impl Into<String>,
        page: impl Into<String>,
    ) -> Result<Self, FieldPathError> {
        let path = Self::PageEntries {
            section: section.into(),
            page: page.into(),
        };
        path.validate()?;
        Ok(path)
    }

    /// Checks that the path survives a display/parse cycle.
    pub fn validate(&self) -> Result<(), FieldPathError> {
        match self {
            Self::Tags => Ok(()),
            Self::PageEntries { section, page } => {
                for key in [section, page] {
                    if !is_addressable_key(key) {
                        return Err(FieldPathError::InvalidKey(key.clone()));
                    }
                }
                Ok(())
            }
        }
    }
}

/// True when `key` can appear as one segment of a dotted entries path.
pub fn is_addressable_key(key: &str) -> bool {
    match key.chars().next() {
        Some(first) => !first.is_whitespace() && !key.contains('.'),
        None => false,
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tags => write!(f, "{TAGS_PATH}"),
            Self::PageEntries { section, page } => {
                write!(f, "{ENTRIES_PATH_PREFIX}.{section}.{page}")
            }
        }
    }
}

/// Field path parse/apply errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPathError {
    /// Path is not one of the writable shapes.
    Unsupported(String),
    /// Section or page key cannot be written as a path segment.
    InvalidKey(String),
    /// Path is valid but the record payload has a different shape.
    PayloadMismatch { path: String, type_key: String },
    /// Written value does not deserialize into the field type.
    InvalidValue { path: String, message: String },
}

impl Display for FieldPathError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported(path) => write!(f, "unsupported field path: `{path}`"),
            Self::InvalidKey(key) => write!(f, "key `{key}` is not addressable by a field path"),
            Self::PayloadMismatch { path, type_key } => {
                write!(f, "field path `{path}` does not apply to `{type_key}` records")
            }
            Self::InvalidValue { path, message } => {
                write!(f, "invalid value for field path `{path}`: {message}")
            }
        }
    }
}

impl Error for FieldPathError {}
