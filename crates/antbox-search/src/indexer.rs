//! Embedding indexer: the event-bus subscriber that keeps the vector
//! database in sync with node writes.
//!
//! Embedding and OCR are slow; the handler clones what it needs and
//! spawns the work onto the runtime, returning to the publisher
//! immediately. Failures are logged and never retried. Must be
//! subscribed from within a tokio runtime.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use antbox_core::{
    DomainEvent, EmbeddingModel, EventBus, EventHandler, Node, NodeRepository, OcrModel, Result,
    StorageProvider, SubscriptionId, VectorDatabase, VectorEntry, NODE_CREATED_EVENT,
    NODE_DELETED_EVENT, NODE_UPDATED_EVENT,
};

/// Bus subscriber maintaining one embedding per node.
#[derive(Clone)]
pub struct EmbeddingIndexer {
    embedder: Arc<dyn EmbeddingModel>,
    vectors: Arc<dyn VectorDatabase>,
    repository: Arc<dyn NodeRepository>,
    ocr: Option<Arc<dyn OcrModel>>,
    storage: Option<Arc<dyn StorageProvider>>,
}

impl EmbeddingIndexer {
    pub fn new(
        embedder: Arc<dyn EmbeddingModel>,
        vectors: Arc<dyn VectorDatabase>,
        repository: Arc<dyn NodeRepository>,
    ) -> Self {
        Self {
            embedder,
            vectors,
            repository,
            ocr: None,
            storage: None,
        }
    }

    /// Enable OCR-derived text for file nodes. Needs the binary store
    /// to read the content back.
    pub fn with_ocr(mut self, ocr: Arc<dyn OcrModel>, storage: Arc<dyn StorageProvider>) -> Self {
        self.ocr = Some(ocr);
        self.storage = Some(storage);
        self
    }

    /// Subscribe to the three lifecycle events.
    pub fn register(&self, bus: &EventBus) -> Vec<SubscriptionId> {
        vec![
            bus.subscribe(NODE_CREATED_EVENT, self.clone()),
            bus.subscribe(NODE_UPDATED_EVENT, self.clone()),
            bus.subscribe(NODE_DELETED_EVENT, self.clone()),
        ]
    }

    /// Text the node is indexed under: derived fulltext plus OCR
    /// output for file-like nodes.
    async fn index_text(&self, node: &Node) -> String {
        let mut text = node.fulltext.clone();
        if node.is_file_like() {
            if let (Some(ocr), Some(storage)) = (&self.ocr, &self.storage) {
                match storage.read(&node.uuid).await {
                    Ok(content) => match ocr.ocr(&content, &node.mimetype).await {
                        Ok(extracted) if !extracted.is_empty() => {
                            text.push(' ');
                            text.push_str(&extracted);
                        }
                        Ok(_) => {}
                        Err(error) => {
                            warn!(node_id = %node.uuid, error = %error, "ocr failed");
                        }
                    },
                    Err(error) => {
                        warn!(node_id = %node.uuid, error = %error, "binary read failed");
                    }
                }
            }
        }
        text
    }

    async fn index_node(&self, node: Node) {
        let text = self.index_text(&node).await;
        let vectors = match self.embedder.embed(&[text]).await {
            Ok(vectors) => vectors,
            Err(error) => {
                warn!(node_id = %node.uuid, error = %error, "embedding failed");
                return;
            }
        };
        let Some(vector) = vectors.into_iter().next() else {
            return;
        };
        let entry = VectorEntry {
            node_uuid: node.uuid.clone(),
            vector,
            metadata: json!({
                "mimetype": node.mimetype,
                "parent": node.parent,
                "title": node.title,
            }),
        };
        if let Err(error) = self.vectors.upsert(entry).await {
            warn!(node_id = %node.uuid, error = %error, "vector upsert failed");
        } else {
            debug!(node_id = %node.uuid, "node indexed");
        }
    }
}

impl EventHandler for EmbeddingIndexer {
    fn handle(&self, event: &DomainEvent) -> Result<()> {
        match event.event_id.as_str() {
            NODE_CREATED_EVENT => {
                if let Some(node) = event.node() {
                    let indexer = self.clone();
                    let node = node.clone();
                    tokio::spawn(async move { indexer.index_node(node).await });
                }
            }
            NODE_UPDATED_EVENT => {
                // The payload is a diff; fetch the current record.
                let indexer = self.clone();
                let uuid = event.node_uuid().to_string();
                tokio::spawn(async move {
                    match indexer.repository.get_by_id(&uuid).await {
                        Ok(node) => indexer.index_node(node).await,
                        Err(error) => {
                            warn!(node_id = %uuid, error = %error, "node fetch failed")
                        }
                    }
                });
            }
            NODE_DELETED_EVENT => {
                let vectors = Arc::clone(&self.vectors);
                let uuid = event.node_uuid().to_string();
                tokio::spawn(async move {
                    if let Err(error) = vectors.delete_by_node_uuid(&uuid).await {
                        warn!(node_id = %uuid, error = %error, "vector delete failed");
                    }
                });
            }
            _ => {}
        }
        Ok(())
    }
}
