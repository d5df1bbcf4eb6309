//! Permission decisions and permission-aware query rewriting.

mod helpers;

use antbox_core::builtins::ROOT_FOLDER_UUID;
use antbox_core::{Error, Filter, FilterOperator, FolderPermissions, NodeFilters, Permission};
use antbox_service::AuthenticationContext;
use helpers::{bare_service, create_meta, root};

fn group_read_permissions() -> FolderPermissions {
    FolderPermissions {
        anonymous: vec![],
        authenticated: vec![],
        group: vec![Permission::Read],
        advanced: Default::default(),
    }
}

#[tokio::test]
async fn test_group_visibility_on_list() {
    let service = bare_service();
    let admin = root();

    let sec = service
        .create(
            &admin,
            helpers::folder_metadata("Sec", ROOT_FOLDER_UUID)
                .with_permissions(group_read_permissions())
                .with_group("g1"),
        )
        .await
        .unwrap();
    let doc = create_meta(&service, &admin, "Inside", &sec.uuid).await;

    // Member of g1 sees the children.
    let member = AuthenticationContext::authenticated("m@example.com", vec!["g1".to_string()]);
    let listed = service.list(&member, Some(&sec.uuid)).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].uuid, doc.uuid);

    // Member of g2 is Forbidden.
    let outsider = AuthenticationContext::authenticated("o@example.com", vec!["g2".to_string()]);
    let err = service.list(&outsider, Some(&sec.uuid)).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    // Anonymous is Unauthorized.
    let err = service
        .list(&AuthenticationContext::anonymous(), Some(&sec.uuid))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));
}

#[tokio::test]
async fn test_owner_bypasses_buckets() {
    let service = bare_service();
    let admin = root();
    let sec = service
        .create(
            &admin,
            helpers::folder_metadata("Private", ROOT_FOLDER_UUID)
                .with_permissions(FolderPermissions::restricted()),
        )
        .await
        .unwrap();

    service
        .update(
            &admin,
            &sec.uuid,
            antbox_core::NodeMetadata {
                owner: Some("owner@example.com".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let owner = AuthenticationContext::authenticated("owner@example.com", vec![]);
    assert!(service.list(&owner, Some(&sec.uuid)).await.is_ok());

    let stranger = AuthenticationContext::authenticated("stranger@example.com", vec![]);
    assert!(service.list(&stranger, Some(&sec.uuid)).await.is_err());
}

#[tokio::test]
async fn test_find_only_returns_permitted_nodes() {
    let service = bare_service();
    let admin = root();

    let open = service
        .create(
            &admin,
            helpers::folder_metadata("Open", ROOT_FOLDER_UUID).with_permissions(
                FolderPermissions {
                    anonymous: vec![],
                    authenticated: vec![Permission::Read],
                    group: vec![],
                    advanced: Default::default(),
                },
            ),
        )
        .await
        .unwrap();
    let sec = service
        .create(
            &admin,
            helpers::folder_metadata("Sec", ROOT_FOLDER_UUID)
                .with_permissions(group_read_permissions())
                .with_group("g1"),
        )
        .await
        .unwrap();

    let visible = create_meta(&service, &admin, "Visible Doc", &open.uuid).await;
    let hidden = create_meta(&service, &admin, "Hidden Doc", &sec.uuid).await;

    let user = AuthenticationContext::authenticated("u@example.com", vec!["g9".to_string()]);
    let found = service
        .find(
            &user,
            NodeFilters::single(Filter::new("mimetype", FilterOperator::Equal,
                antbox_core::builtins::mimetypes::META_NODE)),
            20,
            1,
        )
        .await
        .unwrap();

    let uuids: Vec<_> = found.nodes.iter().map(|n| n.uuid.as_str()).collect();
    assert!(uuids.contains(&visible.uuid.as_str()));
    assert!(!uuids.contains(&hidden.uuid.as_str()));

    // The same query as a g1 member sees both.
    let member = AuthenticationContext::authenticated("m@example.com", vec!["g1".to_string()]);
    let found = service
        .find(
            &member,
            NodeFilters::single(Filter::new("mimetype", FilterOperator::Equal,
                antbox_core::builtins::mimetypes::META_NODE)),
            20,
            1,
        )
        .await
        .unwrap();
    assert_eq!(found.nodes.len(), 2);
}

#[tokio::test]
async fn test_find_admin_filter_passes_through() {
    let service = bare_service();
    let admin = root();
    let sec = service
        .create(
            &admin,
            helpers::folder_metadata("Sec", ROOT_FOLDER_UUID)
                .with_permissions(FolderPermissions::restricted()),
        )
        .await
        .unwrap();
    create_meta(&service, &admin, "Locked", &sec.uuid).await;

    let found = service
        .find(
            &admin,
            NodeFilters::single(Filter::new("title", FilterOperator::Equal, "Locked")),
            20,
            1,
        )
        .await
        .unwrap();
    assert_eq!(found.nodes.len(), 1);
}

#[tokio::test]
async fn test_advanced_bucket_grants_visibility() {
    let service = bare_service();
    let admin = root();

    let mut permissions = FolderPermissions::restricted();
    permissions
        .advanced
        .insert("auditors".to_string(), vec![Permission::Read]);
    let vault = service
        .create(
            &admin,
            helpers::folder_metadata("Vault", ROOT_FOLDER_UUID).with_permissions(permissions),
        )
        .await
        .unwrap();
    let doc = create_meta(&service, &admin, "Audit Trail", &vault.uuid).await;

    let auditor =
        AuthenticationContext::authenticated("aud@example.com", vec!["auditors".to_string()]);
    let found = service
        .find(
            &auditor,
            NodeFilters::single(Filter::new("title", FilterOperator::Equal, "Audit Trail")),
            20,
            1,
        )
        .await
        .unwrap();
    assert_eq!(found.nodes.len(), 1);
    assert_eq!(found.nodes[0].uuid, doc.uuid);
}

#[tokio::test]
async fn test_create_denied_without_write() {
    let service = bare_service();
    let admin = root();
    let sec = service
        .create(
            &admin,
            helpers::folder_metadata("ReadOnly", ROOT_FOLDER_UUID).with_permissions(
                FolderPermissions {
                    anonymous: vec![],
                    authenticated: vec![Permission::Read],
                    group: vec![],
                    advanced: Default::default(),
                },
            ),
        )
        .await
        .unwrap();

    let user = AuthenticationContext::authenticated("u@example.com", vec![]);
    let err = service
        .create(&user, antbox_core::NodeMetadata::new("Nope", sec.uuid.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
}
