//! Conflict-aware save pipeline for shared notebook records.
//!
//! Notebook and annotation saves that lose an optimistic-concurrency race are
//! merged structurally into the stored copy instead of being rejected.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, SavePipelineConfig};
pub use logging::{
    default_log_level, init_logging, logging_status, LoggingConfig, LoggingError, LOG_DIR_ENV,
    LOG_LEVEL_ENV,
};
pub use model::annotation::{AnnotationPayload, AnnotationTarget};
pub use model::field_path::{FieldPath, FieldPathError};
pub use model::notebook::{is_blank_text, Entry, EntryMap, NotebookConfiguration};
pub use model::record::{
    Record, RecordId, RecordKind, RecordPayload, TYPE_ANNOTATION, TYPE_NOTEBOOK,
    TYPE_RESTRICTED_NOTEBOOK,
};
pub use repo::gateway::{GatewayError, GatewayResult, MutableGuard, ObjectGateway, SaveRecord};
pub use repo::handle::{HandleId, HandleRegistry, MutableHandle};
pub use repo::memory_store::InMemoryObjectStore;
pub use repo::sqlite_store::SqliteObjectStore;
pub use service::conflict_resolver::ConflictResolver;
pub use service::entry_merge::{merge_page, EntryMerger, PageMerge};
pub use service::merge::{MergeError, MergeOutcome, MergeResult, TargetIntegrityError};
pub use service::save_pipeline::{SaveError, SavePipeline, SaveResult};
pub use service::tag_merge::{union_tags, validate_targets, TagMerger};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
