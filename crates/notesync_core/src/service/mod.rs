//! Conflict-aware save orchestration.
//!
//! # Responsibility
//! - Wrap gateway saves so notebook and annotation conflicts are merged
//!   instead of surfaced.
//! - Keep merge rules (entries, tags) independent from storage details.
//!
//! # Invariants
//! - Unmanaged record kinds pass through untouched.
//! - Exactly one gateway save is attempted per pipeline call.
//! - Handles acquired here are released on every exit path.

pub mod conflict_resolver;
pub mod entry_merge;
pub mod merge;
pub mod identifier_lock;
pub mod save_pipeline;
pub mod tag_merge;
