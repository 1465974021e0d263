mod common;

use common::{annotation, notebook, tags_of, RecordingGateway};
use notesync_core::{
    ConflictResolver, MergeError, ObjectGateway, Record, RecordId, TagMerger, TargetIntegrityError,
};
use serde_json::json;
use std::sync::Arc;

fn seeded(remote: &Record) -> Arc<RecordingGateway> {
    let gateway = Arc::new(RecordingGateway::new());
    gateway.store.insert(remote.clone());
    gateway
}

#[tokio::test]
async fn subset_of_remote_tags_is_a_no_op() {
    let remote = annotation("ann", &[("A", "5")], &["t1", "t2"]);
    let local = annotation("ann", &[("A", "5")], &["t1"]);
    let gateway = seeded(&remote);
    let merger = TagMerger::new(Arc::clone(&gateway));

    let handle = gateway.to_mutable(&local);
    let outcome = merger.merge_tags(&local, &handle).await.unwrap();
    gateway.destroy_mutable(&handle);

    assert_eq!(tags_of(&outcome.record), vec!["t1", "t2"]);
    assert!(!outcome.changed());
    assert_eq!(gateway.mutation_count(), 0);
    gateway.assert_handles_balanced();
}

#[tokio::test]
async fn superset_writes_exact_union_once() {
    let remote = annotation("ann", &[("A", "5")], &["t1", "t2"]);
    let local = annotation("ann", &[("A", "5")], &["t3", "t1", "t4", "t3"]);
    let gateway = seeded(&remote);
    let merger = TagMerger::new(Arc::clone(&gateway));

    let handle = gateway.to_mutable(&local);
    let outcome = merger.merge_tags(&local, &handle).await.unwrap();
    gateway.destroy_mutable(&handle);

    assert_eq!(tags_of(&outcome.record), vec!["t1", "t2", "t3", "t4"]);
    assert_eq!(
        gateway.mutations(),
        vec![("tags".to_string(), json!(["t1", "t2", "t3", "t4"]))]
    );
    gateway.assert_handles_balanced();
}

#[tokio::test]
async fn divergent_entry_id_is_rejected_through_resolver() {
    let remote = annotation("ann", &[("A", "6")], &["t1"]);
    let local = annotation("ann", &[("A", "5")], &["t1", "t2"]);
    let gateway = seeded(&remote);
    let resolver = ConflictResolver::new(Arc::clone(&gateway));
    let stored_before = gateway.store.get(&remote.identifier).unwrap();

    let handle = gateway.to_mutable(&local);
    let err = resolver.resolve(&local, &handle).await.unwrap_err();
    gateway.destroy_mutable(&handle);

    assert!(matches!(
        err,
        MergeError::TargetIntegrity(TargetIntegrityError::DivergentEntryId { .. })
    ));
    assert_eq!(gateway.mutation_count(), 0);
    assert_eq!(gateway.store.get(&remote.identifier).unwrap(), stored_before);
    gateway.assert_handles_balanced();
}

#[tokio::test]
async fn missing_remote_target_is_rejected() {
    let remote = annotation("ann", &[("B", "5")], &["t1"]);
    let local = annotation("ann", &[("A", "5")], &["t2"]);
    let gateway = seeded(&remote);
    let merger = TagMerger::new(Arc::clone(&gateway));

    let handle = gateway.to_mutable(&local);
    let err = merger.merge_tags(&local, &handle).await.unwrap_err();
    gateway.destroy_mutable(&handle);

    match err {
        MergeError::TargetIntegrity(TargetIntegrityError::MissingTarget { target_id }) => {
            assert_eq!(target_id, "A")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(gateway.mutation_count(), 0);
    gateway.assert_handles_balanced();
}

#[tokio::test]
async fn resolver_dispatches_notebooks_and_rejects_unmanaged_kinds() {
    let remote = notebook("nb", &[("s", "p", vec![])]);
    let gateway = seeded(&remote);
    let resolver = ConflictResolver::new(Arc::clone(&gateway));

    let handle = gateway.to_mutable(&remote);
    let outcome = resolver.resolve(&remote, &handle).await.unwrap();
    assert_eq!(outcome.writes, 0);

    let folder = Record::opaque(RecordId::new("test", "nb"), "folder", "nb", json!({}));
    let err = resolver.resolve(&folder, &handle).await.unwrap_err();
    assert!(matches!(err, MergeError::UnmanagedKind(ref type_key) if type_key == "folder"));

    gateway.destroy_mutable(&handle);
    gateway.assert_handles_balanced();
}
