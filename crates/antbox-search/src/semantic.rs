//! Semantic query extraction and rewrite.
//!
//! `find` control flow: detect `:content ~=` predicates, embed the
//! query text, search the vector database, and replace the predicates
//! with a `uuid in […]` clause the repository can execute without
//! callbacks. When either the embedding model or the vector database
//! is absent, the plane is inactive and the predicates fall through to
//! the repository's folded fulltext matching.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use antbox_core::defaults;
use antbox_core::{
    EmbeddingModel, Filter, FilterOperator, NodeFilters, Result, VectorDatabase, VectorHit,
};

/// The optional embedding + vector-search plane.
#[derive(Clone, Default)]
pub struct SemanticPlane {
    embedder: Option<Arc<dyn EmbeddingModel>>,
    vectors: Option<Arc<dyn VectorDatabase>>,
    top_k: usize,
}

impl SemanticPlane {
    /// An inactive plane; semantic predicates fall through.
    pub fn inactive() -> Self {
        Self {
            embedder: None,
            vectors: None,
            top_k: defaults::SEMANTIC_TOP_K,
        }
    }

    pub fn new(embedder: Arc<dyn EmbeddingModel>, vectors: Arc<dyn VectorDatabase>) -> Self {
        Self {
            embedder: Some(embedder),
            vectors: Some(vectors),
            top_k: defaults::SEMANTIC_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Whether both halves of the plane are configured.
    pub fn is_active(&self) -> bool {
        self.embedder.is_some() && self.vectors.is_some()
    }

    pub fn embedder(&self) -> Option<&Arc<dyn EmbeddingModel>> {
        self.embedder.as_ref()
    }

    pub fn vectors(&self) -> Option<&Arc<dyn VectorDatabase>> {
        self.vectors.as_ref()
    }

    /// Embed `text` and return the top-k nearest nodes, or `None` when
    /// the plane is inactive.
    pub async fn query(&self, text: &str) -> Result<Option<Vec<VectorHit>>> {
        let (Some(embedder), Some(vectors)) = (&self.embedder, &self.vectors) else {
            return Ok(None);
        };
        let embeddings = embedder.embed(&[text.to_string()]).await?;
        let Some(vector) = embeddings.first() else {
            return Ok(Some(vec![]));
        };
        let hits = vectors.search(vector, self.top_k).await?;
        debug!(result_count = hits.len(), "semantic query executed");
        Ok(Some(hits))
    }
}

/// Outcome of the semantic rewrite.
#[derive(Debug, Clone)]
pub struct SemanticRewrite {
    /// Repository-executable filters.
    pub filters: NodeFilters,
    /// uuid → similarity score, present only when the plane fired.
    pub scores: Option<HashMap<String, f32>>,
}

/// Pull the `:content ~=` query text out of every conjunction.
///
/// Returns the stripped filters, the indices of the conjunctions that
/// carried a content predicate, and the concatenated query text.
fn extract_content_query(filters: &NodeFilters) -> (NodeFilters, Vec<usize>, Option<String>) {
    let mut residual = NodeFilters::default();
    let mut flagged = Vec::new();
    let mut terms: Vec<String> = Vec::new();

    for (index, group) in filters.groups.iter().enumerate() {
        let mut kept = Vec::new();
        let mut carried = false;
        for filter in &group.0 {
            if filter.is_content_match() {
                carried = true;
                if let Some(term) = filter.value.as_str() {
                    if !terms.iter().any(|t| t == term) {
                        terms.push(term.to_string());
                    }
                }
            } else {
                kept.push(filter.clone());
            }
        }
        if carried {
            flagged.push(index);
        }
        residual.groups.push(antbox_core::FilterGroup(kept));
    }

    let query = if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    };
    (residual, flagged, query)
}

/// Rewrite `:content ~=` predicates through the semantic plane.
///
/// Inactive plane or no content predicate: the filters pass through
/// unchanged and `scores` is `None`.
pub async fn rewrite_semantic(
    plane: &SemanticPlane,
    filters: NodeFilters,
) -> Result<SemanticRewrite> {
    let (residual, flagged, query) = extract_content_query(&filters);
    let Some(query) = query else {
        return Ok(SemanticRewrite {
            filters,
            scores: None,
        });
    };

    let Some(hits) = plane.query(&query).await? else {
        warn!("semantic plane not configured; content match falls through to fulltext");
        return Ok(SemanticRewrite {
            filters,
            scores: None,
        });
    };

    let uuids: Vec<serde_json::Value> = hits
        .iter()
        .map(|hit| serde_json::Value::String(hit.node_uuid.clone()))
        .collect();
    let scores: HashMap<String, f32> = hits
        .into_iter()
        .map(|hit| (hit.node_uuid, hit.score))
        .collect();

    let mut rewritten = residual;
    for index in flagged {
        rewritten.groups[index].push(Filter::new(
            "uuid",
            FilterOperator::In,
            serde_json::Value::Array(uuids.clone()),
        ));
    }

    Ok(SemanticRewrite {
        filters: rewritten,
        scores: Some(scores),
    })
}
