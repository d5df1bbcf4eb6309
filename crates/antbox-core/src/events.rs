//! Node lifecycle events and the in-process event bus.
//!
//! Publishing dispatches synchronously to every handler subscribed to
//! the event id. Handler errors are logged and never propagate to the
//! publisher; handlers doing heavy work (embedding, OCR) spawn onto the
//! runtime and return immediately so the write path is never blocked.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::Node;

/// Event id of [`DomainEvent`] carrying a created node.
pub const NODE_CREATED_EVENT: &str = "NodeCreatedEvent";
/// Event id of [`DomainEvent`] carrying an update diff.
pub const NODE_UPDATED_EVENT: &str = "NodeUpdatedEvent";
/// Event id of [`DomainEvent`] carrying a deleted node.
pub const NODE_DELETED_EVENT: &str = "NodeDeletedEvent";

/// Old and new values of the fields touched by an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDiff {
    pub uuid: String,
    pub old_values: BTreeMap<String, JsonValue>,
    pub new_values: BTreeMap<String, JsonValue>,
}

/// Payload of a lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Diff(UpdateDiff),
    Node(Box<Node>),
}

/// A node lifecycle event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub event_id: String,
    pub principal: String,
    pub tenant: String,
    pub payload: EventPayload,
}

impl DomainEvent {
    pub fn node_created(principal: impl Into<String>, tenant: impl Into<String>, node: Node) -> Self {
        Self {
            event_id: NODE_CREATED_EVENT.to_string(),
            principal: principal.into(),
            tenant: tenant.into(),
            payload: EventPayload::Node(Box::new(node)),
        }
    }

    pub fn node_updated(
        principal: impl Into<String>,
        tenant: impl Into<String>,
        diff: UpdateDiff,
    ) -> Self {
        Self {
            event_id: NODE_UPDATED_EVENT.to_string(),
            principal: principal.into(),
            tenant: tenant.into(),
            payload: EventPayload::Diff(diff),
        }
    }

    pub fn node_deleted(principal: impl Into<String>, tenant: impl Into<String>, node: Node) -> Self {
        Self {
            event_id: NODE_DELETED_EVENT.to_string(),
            principal: principal.into(),
            tenant: tenant.into(),
            payload: EventPayload::Node(Box::new(node)),
        }
    }

    /// The node carried by created/deleted events.
    pub fn node(&self) -> Option<&Node> {
        match &self.payload {
            EventPayload::Node(node) => Some(node),
            EventPayload::Diff(_) => None,
        }
    }

    /// The diff carried by updated events.
    pub fn diff(&self) -> Option<&UpdateDiff> {
        match &self.payload {
            EventPayload::Diff(diff) => Some(diff),
            EventPayload::Node(_) => None,
        }
    }

    /// The uuid of the affected node, whatever the payload shape.
    pub fn node_uuid(&self) -> &str {
        match &self.payload {
            EventPayload::Node(node) => &node.uuid,
            EventPayload::Diff(diff) => &diff.uuid,
        }
    }
}

/// A subscriber callback.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &DomainEvent) -> Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&DomainEvent) -> Result<()> + Send + Sync,
{
    fn handle(&self, event: &DomainEvent) -> Result<()> {
        self(event)
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionId {
    event_id: String,
    token: u64,
}

/// In-process publish/subscribe bus keyed by event id.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<(u64, Arc<dyn EventHandler>)>>>,
    next_token: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `event_id`. Handlers run in registration
    /// order on the publisher's task.
    pub fn subscribe<H: EventHandler + 'static>(
        &self,
        event_id: &str,
        handler: H,
    ) -> SubscriptionId {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers
            .entry(event_id.to_string())
            .or_default()
            .push((token, Arc::new(handler)));
        SubscriptionId {
            event_id: event_id.to_string(),
            token,
        }
    }

    /// Remove a previously registered handler. Returns whether a
    /// handler was actually removed.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let Some(entries) = handlers.get_mut(&id.event_id) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(token, _)| *token != id.token);
        before != entries.len()
    }

    /// Synchronously dispatch `event` to every matching handler.
    /// Handler errors are logged and swallowed.
    pub fn publish(&self, event: &DomainEvent) {
        let snapshot: Vec<Arc<dyn EventHandler>> = {
            let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            handlers
                .get(&event.event_id)
                .map(|entries| entries.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        debug!(
            event_id = %event.event_id,
            subscriber_count = snapshot.len(),
            node_id = %event.node_uuid(),
            "publishing event"
        );
        for handler in snapshot {
            if let Err(error) = handler.handle(event) {
                warn!(
                    event_id = %event.event_id,
                    node_id = %event.node_uuid(),
                    error = %error,
                    "event handler failed"
                );
            }
        }
    }

    /// Number of handlers registered for `event_id`.
    pub fn handler_count(&self, event_id: &str) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(event_id).map(Vec::len).unwrap_or(0)
    }
}
