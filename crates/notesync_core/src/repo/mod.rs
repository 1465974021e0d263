//! Persistence gateway contracts and reference store implementations.
//!
//! # Responsibility
//! - Define the gateway surface the save pipeline consumes.
//! - Own live working-copy (`MutableHandle`) bookkeeping.
//! - Provide in-memory and SQLite stores with revision-based optimistic
//!   concurrency.
//!
//! # Invariants
//! - `save` of a stale revision fails with `GatewayError::Conflict`.
//! - Every store write is published to all live handles of that identifier.
//! - A handle is released at most once.

pub mod gateway;
pub mod handle;
pub mod memory_store;
pub mod sqlite_store;
