//! In-memory node repository.
//!
//! A `RwLock`-guarded map keyed by uuid with a secondary fid index.
//! Writes take the exclusive lock, so per-uuid operations are
//! serialized; reads evaluate filters against a consistent snapshot.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;

use antbox_core::defaults;
use antbox_core::{Error, Node, NodeFilterResult, NodeFilters, NodeRepository, Result};

#[derive(Default)]
struct State {
    by_uuid: BTreeMap<String, Node>,
    fid_index: HashMap<String, String>,
}

/// In-memory [`NodeRepository`] implementation.
#[derive(Default)]
pub struct InMemoryNodeRepository {
    state: RwLock<State>,
}

impl InMemoryNodeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes.
    pub async fn len(&self) -> usize {
        self.state.read().await.by_uuid.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.by_uuid.is_empty()
    }
}

#[async_trait]
impl NodeRepository for InMemoryNodeRepository {
    async fn add(&self, node: Node) -> Result<()> {
        let mut state = self.state.write().await;
        if state.by_uuid.contains_key(&node.uuid) {
            return Err(Error::BadRequest(format!(
                "uuid already exists: {}",
                node.uuid
            )));
        }
        if state.fid_index.contains_key(&node.fid) {
            return Err(Error::BadRequest(format!("fid already exists: {}", node.fid)));
        }
        state.fid_index.insert(node.fid.clone(), node.uuid.clone());
        state.by_uuid.insert(node.uuid.clone(), node);
        Ok(())
    }

    async fn update(&self, node: Node) -> Result<()> {
        let mut state = self.state.write().await;
        let Some(previous) = state.by_uuid.get(&node.uuid).cloned() else {
            return Err(Error::NodeNotFound(node.uuid.clone()));
        };
        if previous.fid != node.fid {
            if state.fid_index.contains_key(&node.fid) {
                return Err(Error::BadRequest(format!("fid already exists: {}", node.fid)));
            }
            state.fid_index.remove(&previous.fid);
            state.fid_index.insert(node.fid.clone(), node.uuid.clone());
        }
        state.by_uuid.insert(node.uuid.clone(), node);
        Ok(())
    }

    async fn delete(&self, uuid: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let Some(node) = state.by_uuid.remove(uuid) else {
            return Err(Error::NodeNotFound(uuid.to_string()));
        };
        state.fid_index.remove(&node.fid);
        Ok(())
    }

    async fn get_by_id(&self, uuid: &str) -> Result<Node> {
        let state = self.state.read().await;
        state
            .by_uuid
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::NodeNotFound(uuid.to_string()))
    }

    async fn get_by_fid(&self, fid: &str) -> Result<Node> {
        let state = self.state.read().await;
        let uuid = state
            .fid_index
            .get(fid)
            .ok_or_else(|| Error::NodeNotFound(fid.to_string()))?;
        state
            .by_uuid
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::NodeNotFound(fid.to_string()))
    }

    async fn filter(
        &self,
        filters: &NodeFilters,
        page_size: usize,
        page_token: usize,
    ) -> Result<NodeFilterResult> {
        let page_size = if page_size == 0 {
            defaults::PAGE_SIZE
        } else {
            page_size
        };
        let page_token = page_token.max(defaults::FIRST_PAGE_TOKEN);

        let state = self.state.read().await;
        let mut matches: Vec<&Node> = state
            .by_uuid
            .values()
            .filter(|node| filters.matches(node))
            .collect();
        matches.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.uuid.cmp(&b.uuid)));
        trace!(result_count = matches.len(), "filter evaluated");

        let page_count = matches.len().div_ceil(page_size);
        let nodes = matches
            .into_iter()
            .skip((page_token - 1) * page_size)
            .take(page_size)
            .cloned()
            .collect();

        Ok(NodeFilterResult {
            nodes,
            page_size,
            page_count,
            page_token,
        })
    }
}
