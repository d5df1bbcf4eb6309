//! Listing order, system folder injection, and ancestry walks.

mod helpers;

use antbox_core::builtins::{
    mimetypes, ROOT_FOLDER_UUID, SYSTEM_FOLDER_UUID,
};
use antbox_core::Error;
use antbox_service::Breadcrumb;
use helpers::{bare_service, create_folder, create_meta, root};

#[tokio::test]
async fn test_list_root_injects_system_folder() {
    let service = bare_service();
    let ctx = root();
    create_meta(&service, &ctx, "Loose Doc", ROOT_FOLDER_UUID).await;

    let listed = service.list(&ctx, None).await.unwrap();
    assert!(listed.iter().any(|n| n.uuid == SYSTEM_FOLDER_UUID));
    assert!(listed.iter().any(|n| n.title == "Loose Doc"));
}

#[tokio::test]
async fn test_list_sorts_folders_first_then_title() {
    let service = bare_service();
    let ctx = root();
    create_meta(&service, &ctx, "Aardvark Doc", ROOT_FOLDER_UUID).await;
    create_folder(&service, &ctx, "Zebra Folder", ROOT_FOLDER_UUID).await;
    create_folder(&service, &ctx, "Alpha Folder", ROOT_FOLDER_UUID).await;

    let listed = service.list(&ctx, None).await.unwrap();
    let titles: Vec<_> = listed.iter().map(|n| n.title.as_str()).collect();
    // Folders (System included) come before any document.
    assert_eq!(
        titles,
        ["Alpha Folder", "System", "Zebra Folder", "Aardvark Doc"]
    );
}

#[tokio::test]
async fn test_list_system_folder_shows_builtin_subfolders() {
    let service = bare_service();
    let listed = service.list(&root(), Some(SYSTEM_FOLDER_UUID)).await.unwrap();

    let titles: Vec<_> = listed.iter().map(|n| n.title.as_str()).collect();
    for expected in ["API Keys", "Aspects", "Features", "Users", "Groups", "Agents"] {
        assert!(titles.contains(&expected), "missing {expected}");
    }
    assert!(listed.iter().all(|n| n.mimetype == mimetypes::FOLDER));
}

#[tokio::test]
async fn test_list_non_folder_is_folder_not_found() {
    let service = bare_service();
    let ctx = root();
    let meta = create_meta(&service, &ctx, "Doc", ROOT_FOLDER_UUID).await;

    let err = service.list(&ctx, Some(&meta.uuid)).await.unwrap_err();
    assert!(matches!(err, Error::FolderNotFound(_)));

    let err = service.list(&ctx, Some("missing")).await.unwrap_err();
    assert!(matches!(err, Error::FolderNotFound(_)));
}

#[tokio::test]
async fn test_breadcrumbs_start_at_root() {
    let service = bare_service();
    let ctx = root();
    let a = create_folder(&service, &ctx, "A", ROOT_FOLDER_UUID).await;
    let b = create_folder(&service, &ctx, "B", &a.uuid).await;
    let doc = create_meta(&service, &ctx, "Deep Doc", &b.uuid).await;

    let crumbs = service.breadcrumbs(&ctx, &doc.uuid).await.unwrap();
    assert_eq!(
        crumbs,
        vec![
            Breadcrumb {
                uuid: ROOT_FOLDER_UUID.to_string(),
                title: "Root".to_string(),
            },
            Breadcrumb {
                uuid: a.uuid.clone(),
                title: "A".to_string(),
            },
            Breadcrumb {
                uuid: b.uuid.clone(),
                title: "B".to_string(),
            },
            Breadcrumb {
                uuid: doc.uuid.clone(),
                title: "Deep Doc".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn test_breadcrumbs_of_root_is_single_crumb() {
    let service = bare_service();
    let crumbs = service.breadcrumbs(&root(), ROOT_FOLDER_UUID).await.unwrap();
    assert_eq!(crumbs.len(), 1);
    assert_eq!(crumbs[0].uuid, ROOT_FOLDER_UUID);
}

#[tokio::test]
async fn test_breadcrumbs_under_system_folder() {
    let service = bare_service();
    let crumbs = service
        .breadcrumbs(&root(), antbox_core::builtins::ASPECTS_FOLDER_UUID)
        .await
        .unwrap();
    let titles: Vec<_> = crumbs.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, ["Root", "System", "Aspects"]);
}
