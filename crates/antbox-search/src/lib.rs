//! # antbox-search
//!
//! The semantic half of `find`: extraction of `:content ~=` predicates
//! from a filter AST, embedding + k-NN execution against the optional
//! vector plane, and the rewrite back into a repository-executable
//! `uuid in […]` clause with similarity scores attached.
//!
//! Also hosts the embedding indexer, the event-bus subscriber that
//! keeps the vector database in sync with node writes.

pub mod indexer;
pub mod semantic;

pub use indexer::EmbeddingIndexer;
pub use semantic::{rewrite_semantic, SemanticPlane, SemanticRewrite};
