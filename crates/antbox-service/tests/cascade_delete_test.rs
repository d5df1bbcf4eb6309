//! Cascading folder deletion.

mod helpers;

use antbox_core::builtins::ROOT_FOLDER_UUID;
use antbox_core::{Error, FilePayload, NodeMetadata, StorageProvider, NODE_DELETED_EVENT};
use helpers::{bare_service, create_folder, root, EventLog};

#[tokio::test]
async fn test_folder_delete_cascades_depth_first() {
    let service = bare_service();
    let log = EventLog::attach(service.bus());
    let ctx = root();

    let p = create_folder(&service, &ctx, "P", ROOT_FOLDER_UUID).await;
    let c1 = create_folder(&service, &ctx, "C1", &p.uuid).await;
    let c2 = create_folder(&service, &ctx, "C2", &p.uuid).await;

    let mut files = Vec::new();
    for (folder, name) in [(&c1, "a"), (&c1, "b"), (&c2, "c"), (&c2, "d")] {
        let file = FilePayload::new(format!("{}.txt", name), "text/plain", b"x".to_vec());
        let node = service
            .create_file(&ctx, file, NodeMetadata::new(name, folder.uuid.clone()))
            .await
            .unwrap();
        files.push(node);
    }
    log.clear();

    service.delete(&ctx, &p.uuid).await.unwrap();

    // 7 deletions: P, C1, C2, and the 4 files.
    let deleted = log.of_kind(NODE_DELETED_EVENT);
    assert_eq!(deleted.len(), 7);

    let mut deleted_uuids: Vec<_> = deleted.iter().map(|e| e.node_uuid().to_string()).collect();
    deleted_uuids.sort();
    let mut expected: Vec<String> = vec![p.uuid.clone(), c1.uuid.clone(), c2.uuid.clone()];
    expected.extend(files.iter().map(|f| f.uuid.clone()));
    expected.sort();
    assert_eq!(deleted_uuids, expected);

    // Children always go before their folder.
    let position = |uuid: &str| {
        deleted
            .iter()
            .position(|e| e.node_uuid() == uuid)
            .expect("missing deletion event")
    };
    assert!(position(&files[0].uuid) < position(&c1.uuid));
    assert!(position(&files[2].uuid) < position(&c2.uuid));
    assert!(position(&c1.uuid) < position(&p.uuid));
    assert!(position(&c2.uuid) < position(&p.uuid));

    // No orphan remains.
    for uuid in expected {
        let err = service.get(&ctx, &uuid).await.unwrap_err();
        assert!(matches!(err, Error::NodeNotFound(_)));
    }
}

#[tokio::test]
async fn test_cascade_removes_binaries() {
    let service = bare_service();
    let ctx = root();
    let folder = create_folder(&service, &ctx, "Files", ROOT_FOLDER_UUID).await;
    let file = service
        .create_file(
            &ctx,
            FilePayload::new("doc.txt", "text/plain", b"hello".to_vec()),
            NodeMetadata::new("doc", folder.uuid.clone()),
        )
        .await
        .unwrap();

    assert!(service.storage().read(&file.uuid).await.is_ok());
    service.delete(&ctx, &folder.uuid).await.unwrap();

    let err = service.storage().read(&file.uuid).await.unwrap_err();
    assert!(matches!(err, Error::NodeFileNotFound(_)));
}

#[tokio::test]
async fn test_empty_folder_delete_emits_single_event() {
    let service = bare_service();
    let log = EventLog::attach(service.bus());
    let ctx = root();
    let folder = create_folder(&service, &ctx, "Empty", ROOT_FOLDER_UUID).await;
    log.clear();

    service.delete(&ctx, &folder.uuid).await.unwrap();
    assert_eq!(log.of_kind(NODE_DELETED_EVENT).len(), 1);
}
