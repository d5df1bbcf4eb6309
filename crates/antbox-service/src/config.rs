//! Node service tuning knobs.

use antbox_core::defaults;

/// Configuration for the node service.
#[derive(Debug, Clone)]
pub struct NodeServiceConfig {
    /// Default page size for `find`.
    pub page_size: usize,
    /// Nearest-neighbour count requested from the vector database.
    pub semantic_top_k: usize,
}

impl Default for NodeServiceConfig {
    fn default() -> Self {
        Self {
            page_size: defaults::PAGE_SIZE,
            semantic_top_k: defaults::SEMANTIC_TOP_K,
        }
    }
}

impl NodeServiceConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `ANTBOX_PAGE_SIZE` | `20` | Default `find` page size |
    /// | `ANTBOX_SEMANTIC_TOP_K` | `25` | Vector search depth |
    pub fn from_env() -> Self {
        let page_size = std::env::var("ANTBOX_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::PAGE_SIZE)
            .max(1);

        let semantic_top_k = std::env::var("ANTBOX_SEMANTIC_TOP_K")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::SEMANTIC_TOP_K)
            .max(1);

        Self {
            page_size,
            semantic_top_k,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_semantic_top_k(mut self, top_k: usize) -> Self {
        self.semantic_top_k = top_k.max(1);
        self
    }
}
