//! Demo binary for the save pipeline.
//!
//! # Responsibility
//! - Verify `notesync_core` linkage and print its version.
//! - Replay two-writer notebook and annotation conflicts against an
//!   in-memory SQLite store and print the merged results.
//!
//! Set `NOTESYNC_LOG_DIR` (and optionally `NOTESYNC_LOG_LEVEL`) to also write
//! core logs to files.

use log::{error, info};
use notesync_core::{
    core_version, init_logging, AnnotationPayload, Entry, LoggingConfig, NotebookConfiguration,
    Record, RecordId, SavePipeline, SaveRecord, SqliteObjectStore,
};
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    println!("notesync_core version={}", core_version());

    match LoggingConfig::from_env() {
        Ok(Some(config)) => {
            if let Err(err) = init_logging(config) {
                eprintln!("logging disabled: {err}");
            }
        }
        Ok(None) => {}
        Err(err) => eprintln!("logging disabled: {err}"),
    }

    match run_demo().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_demo module=cli status=error error={err}");
            eprintln!("demo failed: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run_demo() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(SqliteObjectStore::open_in_memory()?);
    let pipeline = SavePipeline::new(Arc::clone(&store));

    let mut configuration = NotebookConfiguration::new();
    configuration.push_entry("s", "p", Entry::with_id("1", "first", 0));
    let seeded = store
        .save(&Record::notebook(
            RecordId::new("demo", "notebook"),
            "demo",
            configuration,
        ))
        .await?;

    let mut remote = seeded.clone();
    let mut local = seeded;
    if let Some(configuration) = remote.notebook_configuration_mut() {
        configuration.push_entry("s", "p", Entry::with_id("remote", "from remote", 0));
    }
    if let Some(configuration) = local.notebook_configuration_mut() {
        configuration.push_entry("s", "p", Entry::with_id("local", "from local", 0));
    }

    pipeline.save(&remote).await?;
    let merged = pipeline.save(&local).await?;
    let ids: Vec<&str> = merged
        .notebook_configuration()
        .and_then(|configuration| configuration.page("s", "p"))
        .map(|entries| entries.iter().map(|entry| entry.id.as_str()).collect())
        .unwrap_or_default();
    println!("merged entries={}", ids.join(","));

    let annotation = store
        .save(&Record::annotation(
            RecordId::new("demo", "annotation"),
            "demo",
            AnnotationPayload::new()
                .with_target("obj", "1")
                .with_tags(["t1"]),
        ))
        .await?;
    let mut remote = annotation.clone();
    let mut local = annotation;
    if let Some(payload) = remote.annotation_payload_mut() {
        payload.tags.push("t2".to_string());
    }
    if let Some(payload) = local.annotation_payload_mut() {
        payload.tags.push("t3".to_string());
    }
    pipeline.save(&remote).await?;
    let merged = pipeline.save(&local).await?;
    let tags = merged
        .annotation_payload()
        .map(|payload| payload.tags.join(","))
        .unwrap_or_default();
    println!("merged tags={tags}");

    info!("event=cli_demo module=cli status=ok");
    Ok(())
}
