//! Default values shared across the antbox crates.
//!
//! Environment-variable overrides live next to the consumer
//! (`NodeServiceConfig::from_env`, `OllamaEmbedding::from_env`); the
//! constants here are the single source for the fallback values.

/// Default page size for `filter`/`find` pagination.
pub const PAGE_SIZE: usize = 20;

/// First page token (pagination is 1-based).
pub const FIRST_PAGE_TOKEN: usize = 1;

/// Page size used for internal exhaustive scans (cascade delete,
/// child revalidation, `@` sub-queries).
pub const SCAN_PAGE_SIZE: usize = 1_000;

/// Number of nearest neighbours requested from the vector database.
pub const SEMANTIC_TOP_K: usize = 25;

/// Minimum token length kept by fulltext derivation.
pub const FULLTEXT_MIN_TOKEN_LEN: usize = 3;

/// Generated api-key secret length (alphanumeric chars).
pub const API_KEY_SECRET_LEN: usize = 32;

/// Suffix length appended to a fid slug on collision.
pub const FID_SUFFIX_LEN: usize = 4;

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://localhost:11434";

/// Default embedding model.
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Timeout for embedding requests (seconds).
pub const EMBED_TIMEOUT_SECS: u64 = 120;
