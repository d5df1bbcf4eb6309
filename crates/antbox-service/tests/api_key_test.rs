//! Api-key nodes: secret generation, redaction, and the dedicated
//! disclosure path.

mod helpers;

use antbox_core::builtins::{mimetypes, API_KEYS_FOLDER_UUID, ROOT_FOLDER_UUID};
use antbox_core::{Error, NodeMetadata, SECRET_HIDDEN};
use antbox_service::AuthenticationContext;
use helpers::{bare_service, root};

fn api_key_metadata() -> NodeMetadata {
    NodeMetadata::new("Integration Key", API_KEYS_FOLDER_UUID)
        .with_mimetype(mimetypes::API_KEY)
}

#[tokio::test]
async fn test_create_generates_secret_and_hides_it() {
    let service = bare_service();
    let ctx = root();

    let node = service.create(&ctx, api_key_metadata()).await.unwrap();
    // The creation response already conceals the secret.
    assert_eq!(node.api_key_secret(), Some(SECRET_HIDDEN));

    let fetched = service.get(&ctx, &node.uuid).await.unwrap();
    assert_eq!(fetched.api_key_secret(), Some(SECRET_HIDDEN));
}

#[tokio::test]
async fn test_api_key_with_secret_is_the_only_disclosure_path() {
    let service = bare_service();
    let ctx = root();
    let node = service.create(&ctx, api_key_metadata()).await.unwrap();

    let disclosed = service.api_key_with_secret(&ctx, &node.uuid).await.unwrap();
    let secret = disclosed.api_key_secret().unwrap();
    assert_ne!(secret, SECRET_HIDDEN);
    assert_eq!(secret.len(), 32);

    // Non-admins get Forbidden even with the uuid in hand.
    let user = AuthenticationContext::authenticated("u@example.com", vec![]);
    let err = service.api_key_with_secret(&user, &node.uuid).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
}

#[tokio::test]
async fn test_api_key_with_secret_on_other_nodes_fails() {
    let service = bare_service();
    let ctx = root();
    let meta = service
        .create(&ctx, NodeMetadata::new("Plain", ROOT_FOLDER_UUID))
        .await
        .unwrap();

    let err = service.api_key_with_secret(&ctx, &meta.uuid).await.unwrap_err();
    assert!(matches!(err, Error::ApiKeyNotFound(_)));

    let err = service.api_key_with_secret(&ctx, "missing").await.unwrap_err();
    assert!(matches!(err, Error::ApiKeyNotFound(_)));
}

#[tokio::test]
async fn test_api_keys_cannot_be_updated() {
    let service = bare_service();
    let ctx = root();
    let node = service.create(&ctx, api_key_metadata()).await.unwrap();

    let err = service
        .update(
            &ctx,
            &node.uuid,
            NodeMetadata {
                title: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn test_api_keys_must_live_in_the_system_folder() {
    let service = bare_service();
    let err = service
        .create(
            &root(),
            NodeMetadata::new("Misplaced", ROOT_FOLDER_UUID).with_mimetype(mimetypes::API_KEY),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn test_supplied_secret_is_kept() {
    let service = bare_service();
    let ctx = root();
    let node = service
        .create(
            &ctx,
            NodeMetadata {
                secret: Some("pinned-secret".to_string()),
                ..api_key_metadata()
            },
        )
        .await
        .unwrap();

    let disclosed = service.api_key_with_secret(&ctx, &node.uuid).await.unwrap();
    assert_eq!(disclosed.api_key_secret(), Some("pinned-secret"));
}
