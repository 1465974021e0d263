//! Shared record model for notebook and annotation objects.
//!
//! # Responsibility
//! - Define the persisted record envelope and its kind-specific payloads.
//! - Define the dotted field paths the merge layer writes through.
//!
//! # Invariants
//! - Every record is identified by a stable `RecordId`.
//! - `revision` is the optimistic-concurrency base; stores bump it on write.
//! - Cloning a record is a full structural copy.

pub mod annotation;
pub mod field_path;
pub mod notebook;
pub mod record;
