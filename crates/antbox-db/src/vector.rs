//! In-memory vector database.
//!
//! Brute-force cosine similarity over the stored entries. Scores map
//! cosine similarity from `[-1, 1]` into `[0, 1]`, descending, tie
//! broken by node uuid for deterministic ordering.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use antbox_core::{Result, VectorDatabase, VectorEntry, VectorHit};

/// In-memory [`VectorDatabase`] implementation.
#[derive(Default)]
pub struct InMemoryVectorDb {
    entries: RwLock<HashMap<String, VectorEntry>>,
}

impl InMemoryVectorDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored embeddings.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl VectorDatabase for InMemoryVectorDb {
    async fn upsert(&self, entry: VectorEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(entry.node_uuid.clone(), entry);
        Ok(())
    }

    async fn delete_by_node_uuid(&self, uuid: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(uuid);
        Ok(())
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorHit>> {
        let entries = self.entries.read().await;
        let mut hits: Vec<VectorHit> = entries
            .values()
            .map(|entry| VectorHit {
                node_uuid: entry.node_uuid.clone(),
                score: ((cosine_similarity(&entry.vector, vector) + 1.0) / 2.0).clamp(0.0, 1.0),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.node_uuid.cmp(&b.node_uuid))
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}
