//! Shared fixtures for the node service integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use antbox_core::builtins::mimetypes;
use antbox_core::{
    DomainEvent, EventBus, Node, NodeMetadata, NODE_CREATED_EVENT, NODE_DELETED_EVENT,
    NODE_UPDATED_EVENT,
};
use antbox_service::{AuthenticationContext, NodeService};

/// Collects every lifecycle event published on a bus.
#[derive(Clone)]
pub struct EventLog {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl EventLog {
    pub fn attach(bus: &EventBus) -> Self {
        let log = Self {
            events: Arc::new(Mutex::new(Vec::new())),
        };
        for event_id in [NODE_CREATED_EVENT, NODE_UPDATED_EVENT, NODE_DELETED_EVENT] {
            let sink = Arc::clone(&log.events);
            bus.subscribe(event_id, move |event: &DomainEvent| {
                sink.lock().unwrap().push(event.clone());
                Ok(())
            });
        }
        log
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn of_kind(&self, event_id: &str) -> Vec<DomainEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.event_id == event_id)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

/// Route subscriber logs to the test output when `RUST_LOG` is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// A service with in-memory backends and default subscribers.
pub fn service() -> Arc<NodeService> {
    NodeService::builder().build()
}

/// A service without subscribers, for tests that pin vector contents
/// or count raw events.
pub fn bare_service() -> Arc<NodeService> {
    NodeService::builder().without_default_subscribers().build()
}

pub fn root() -> AuthenticationContext {
    AuthenticationContext::root()
}

pub fn folder_metadata(title: &str, parent: &str) -> NodeMetadata {
    NodeMetadata::new(title, parent).with_mimetype(mimetypes::FOLDER)
}

pub async fn create_folder(
    service: &NodeService,
    ctx: &AuthenticationContext,
    title: &str,
    parent: &str,
) -> Node {
    service
        .create(ctx, folder_metadata(title, parent))
        .await
        .expect("folder creation failed")
}

pub async fn create_meta(
    service: &NodeService,
    ctx: &AuthenticationContext,
    title: &str,
    parent: &str,
) -> Node {
    service
        .create(ctx, NodeMetadata::new(title, parent))
        .await
        .expect("meta node creation failed")
}
