mod common;

use common::{annotation, entry, notebook, page_ids, stale_after_competing_save, tags_of};
use notesync_core::{
    FieldPath, FieldPathError, GatewayError, ObjectGateway, Record, RecordId, RecordPayload, SavePipeline, SaveRecord,
    SqliteObjectStore,
};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn stale_revision_is_reported_as_conflict() {
    let store = SqliteObjectStore::open_in_memory().unwrap();
    let first = store
        .save(&notebook("nb", &[("s", "p", vec![entry("1", "a")])]))
        .await
        .unwrap();
    assert_eq!(first.revision, 1);

    let second = store.save(&first).await.unwrap();
    assert_eq!(second.revision, 2);
    assert!(second.modified > first.modified);

    let err = store.save(&first).await.unwrap_err();
    match err {
        GatewayError::Conflict {
            expected_revision,
            actual_revision,
            ..
        } => {
            assert_eq!(expected_revision, 1);
            assert_eq!(actual_revision, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn saving_unknown_persisted_revision_is_not_found() {
    let store = SqliteObjectStore::open_in_memory().unwrap();
    let mut orphan = annotation("ann", &[("A", "5")], &["t1"]);
    orphan.revision = 3;

    let err = store.save(&orphan).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn mutate_rewrites_one_field_and_refreshes_live_handles() {
    let store = SqliteObjectStore::open_in_memory().unwrap();
    let saved = store
        .save(&annotation("ann", &[("A", "5")], &["t1"]))
        .await
        .unwrap();

    let handle = store.get_mutable(&saved.identifier).await.unwrap();
    store
        .mutate(&handle, &FieldPath::Tags, json!(["t1", "t2"]))
        .unwrap();

    assert_eq!(tags_of(&handle.snapshot()), vec!["t1", "t2"]);
    assert_eq!(handle.revision(), saved.revision + 1);
    let stored = store.get(&saved.identifier).unwrap().unwrap();
    assert_eq!(tags_of(&stored), vec!["t1", "t2"]);

    store.destroy_mutable(&handle);
    assert_eq!(store.live_handle_count(), 0);
}

#[tokio::test]
async fn mutate_rejects_field_of_another_payload() {
    let store = SqliteObjectStore::open_in_memory().unwrap();
    let saved = store
        .save(&annotation("ann", &[("A", "5")], &["t1"]))
        .await
        .unwrap();

    let handle = store.get_mutable(&saved.identifier).await.unwrap();
    let err = store
        .mutate(
            &handle,
            &FieldPath::page_entries("s", "p").unwrap(),
            json!([]),
        )
        .unwrap_err();
    store.destroy_mutable(&handle);

    assert!(matches!(
        err,
        GatewayError::FieldPath(FieldPathError::PayloadMismatch { .. })
    ));
    assert_eq!(store.get(&saved.identifier).unwrap().unwrap(), saved);
}

#[tokio::test]
async fn save_and_insert_reject_dotted_page_keys() {
    let store = SqliteObjectStore::open_in_memory().unwrap();
    let record = notebook("nb", &[("s", "v1.2", vec![entry("1", "a")])]);

    let err = store.save(&record).await.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::FieldPath(FieldPathError::InvalidKey(key)) if key == "v1.2"
    ));
    assert!(matches!(
        store.insert(&record),
        Err(GatewayError::FieldPath(FieldPathError::InvalidKey(_)))
    ));
    assert_eq!(store.get(&record.identifier).unwrap(), None);
}

#[tokio::test]
async fn pipeline_merges_conflicting_notebook_over_sqlite() {
    let store = Arc::new(SqliteObjectStore::open_in_memory().unwrap());
    let seeded = notebook("nb", &[("s", "p", vec![entry("1", "a")])]);
    let mut stale = stale_after_competing_save(store.as_ref(), &seeded, |winner| {
        if let Some(configuration) = winner.notebook_configuration_mut() {
            configuration.push_entry("s", "p", entry("remote", "from remote"));
        }
    })
    .await;
    if let Some(configuration) = stale.notebook_configuration_mut() {
        configuration.push_entry("s", "p", entry("local", "from local"));
    }

    let pipeline = SavePipeline::new(Arc::clone(&store));
    let merged = pipeline.save(&stale).await.unwrap();

    assert_eq!(page_ids(&merged, "s", "p"), vec!["1", "remote", "local"]);
    let stored = store.get(&stale.identifier).unwrap().unwrap();
    assert_eq!(stored, merged);
    assert_eq!(store.live_handle_count(), 0);
}

#[tokio::test]
async fn records_survive_reopening_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("objects.db");
    let identifier = RecordId::new("test", "folder-1");

    {
        let store = SqliteObjectStore::open(&path).unwrap();
        let folder = Record::opaque(
            identifier.clone(),
            "folder",
            "Folder",
            json!({"color": "red"}),
        );
        store.save(&folder).await.unwrap();
    }

    let reopened = SqliteObjectStore::open(&path).unwrap();
    let stored = reopened.get(&identifier).unwrap().unwrap();
    assert_eq!(stored.type_key, "folder");
    assert_eq!(stored.revision, 1);
    assert_eq!(stored.payload, RecordPayload::Opaque(json!({"color": "red"})));
}

#[test]
fn store_refuses_an_unmigrated_connection() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    let err = match SqliteObjectStore::try_new(conn) {
        Ok(_) => panic!("unmigrated connection should be rejected"),
        Err(err) => err,
    };
    assert!(matches!(
        err,
        GatewayError::Db(notesync_core::db::DbError::MissingTable("objects"))
    ));
}
