//! Event-bus subscribers for derived side-effects.
//!
//! None of these sit on the synchronous write path: handlers clone
//! what they need and spawn onto the runtime, so subscriber latency
//! never contaminates the caller. Failures are logged, never retried.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use antbox_core::builtins::mimetypes;
use antbox_core::defaults::SCAN_PAGE_SIZE;
use antbox_core::{
    is_builtin_uuid, DomainEvent, EventBus, EventHandler, Filter, FilterOperator, Node,
    NodeFilters, NodeRepository, Result, SubscriptionId, NODE_CREATED_EVENT, NODE_DELETED_EVENT,
    NODE_UPDATED_EVENT,
};

// =============================================================================
// PARENT MTIME UPDATER
// =============================================================================

/// Bumps the parent folder's `modifiedTime` whenever a child is
/// created, updated, or deleted.
///
/// Writes go straight to the repository: built-in folders are skipped
/// and no further events are published, so the cascade terminates.
#[derive(Clone)]
pub struct ParentMtimeUpdater {
    repository: Arc<dyn NodeRepository>,
}

impl ParentMtimeUpdater {
    pub fn new(repository: Arc<dyn NodeRepository>) -> Self {
        Self { repository }
    }

    /// Subscribe to the three lifecycle events.
    pub fn register(&self, bus: &EventBus) -> Vec<SubscriptionId> {
        vec![
            bus.subscribe(NODE_CREATED_EVENT, self.clone()),
            bus.subscribe(NODE_UPDATED_EVENT, self.clone()),
            bus.subscribe(NODE_DELETED_EVENT, self.clone()),
        ]
    }

    async fn touch_parent_of(&self, uuid: String, parent: Option<String>) {
        let parent = match parent {
            Some(parent) => parent,
            // Update events carry a diff; fetch the record for its
            // parent edge.
            None => match self.repository.get_by_id(&uuid).await {
                Ok(node) => node.parent,
                Err(error) => {
                    debug!(node_id = %uuid, error = %error, "node fetch failed");
                    return;
                }
            },
        };
        if is_builtin_uuid(&parent) {
            return;
        }
        match self.repository.get_by_id(&parent).await {
            Ok(mut folder) => {
                folder.modified_time = chrono::Utc::now();
                if let Err(error) = self.repository.update(folder).await {
                    warn!(node_id = %parent, error = %error, "parent mtime update failed");
                }
            }
            Err(error) => debug!(node_id = %parent, error = %error, "parent fetch failed"),
        }
    }
}

impl EventHandler for ParentMtimeUpdater {
    fn handle(&self, event: &DomainEvent) -> Result<()> {
        let updater = self.clone();
        let uuid = event.node_uuid().to_string();
        let parent = event.node().map(|node| node.parent.clone());
        tokio::spawn(async move { updater.touch_parent_of(uuid, parent).await });
        Ok(())
    }
}

// =============================================================================
// AUTOMATION DISPATCHER
// =============================================================================

/// Executes a feature against a batch of node uuids.
///
/// Script sandboxing is out of scope; the default runner only logs.
#[async_trait]
pub trait FeatureRunner: Send + Sync {
    async fn run(&self, feature: &Node, uuids: &[String]) -> Result<JsonValue>;
}

/// Default [`FeatureRunner`] that records the invocation and returns
/// nothing.
#[derive(Default)]
pub struct LoggingFeatureRunner;

#[async_trait]
impl FeatureRunner for LoggingFeatureRunner {
    async fn run(&self, feature: &Node, uuids: &[String]) -> Result<JsonValue> {
        info!(
            node_id = %feature.uuid,
            target_count = uuids.len(),
            "feature invoked"
        );
        Ok(JsonValue::Null)
    }
}

/// Fan-out of lifecycle events to action features.
///
/// Features flagged `exposeAction` with the matching `runOn*` flag and
/// satisfied `filters` are invoked for each event, best-effort.
#[derive(Clone)]
pub struct AutomationDispatcher {
    repository: Arc<dyn NodeRepository>,
    runner: Arc<dyn FeatureRunner>,
}

impl AutomationDispatcher {
    pub fn new(repository: Arc<dyn NodeRepository>, runner: Arc<dyn FeatureRunner>) -> Self {
        Self { repository, runner }
    }

    /// Subscribe to the three lifecycle events.
    pub fn register(&self, bus: &EventBus) -> Vec<SubscriptionId> {
        vec![
            bus.subscribe(NODE_CREATED_EVENT, self.clone()),
            bus.subscribe(NODE_UPDATED_EVENT, self.clone()),
            bus.subscribe(NODE_DELETED_EVENT, self.clone()),
        ]
    }

    async fn payload_node(&self, event: &DomainEvent) -> Option<Node> {
        match event.node() {
            Some(node) => Some(node.clone()),
            None => self.repository.get_by_id(event.node_uuid()).await.ok(),
        }
    }

    async fn features(&self) -> Vec<Node> {
        let filters = NodeFilters::single(Filter::new(
            "mimetype",
            FilterOperator::Equal,
            mimetypes::FEATURE,
        ));
        let mut features = Vec::new();
        let mut page_token = 1;
        loop {
            match self.repository.filter(&filters, SCAN_PAGE_SIZE, page_token).await {
                Ok(page) => {
                    features.extend(page.nodes);
                    if page_token >= page.page_count {
                        break;
                    }
                    page_token += 1;
                }
                Err(error) => {
                    warn!(error = %error, "feature listing failed");
                    break;
                }
            }
        }
        features
    }

    async fn dispatch(&self, event_id: String, event: DomainEvent) {
        let Some(payload) = self.payload_node(&event).await else {
            return;
        };
        let candidates: Vec<Node> = self
            .features()
            .await
            .into_iter()
            .filter(|feature| {
                let Some(spec) = feature.feature_spec() else {
                    return false;
                };
                let flagged = match event_id.as_str() {
                    NODE_CREATED_EVENT => spec.run_on_creates,
                    NODE_UPDATED_EVENT => spec.run_on_updates,
                    NODE_DELETED_EVENT => spec.run_on_deletes,
                    _ => false,
                };
                spec.expose_action && flagged && spec.filters.matches(&payload)
            })
            .collect();

        let runs = candidates.iter().map(|feature| {
            let uuids = vec![payload.uuid.clone()];
            let runner = Arc::clone(&self.runner);
            async move {
                if let Err(error) = runner.run(feature, &uuids).await {
                    warn!(node_id = %feature.uuid, error = %error, "feature run failed");
                }
            }
        });
        join_all(runs).await;
    }
}

impl EventHandler for AutomationDispatcher {
    fn handle(&self, event: &DomainEvent) -> Result<()> {
        let dispatcher = self.clone();
        let event = event.clone();
        let event_id = event.event_id.clone();
        tokio::spawn(async move { dispatcher.dispatch(event_id, event).await });
        Ok(())
    }
}
