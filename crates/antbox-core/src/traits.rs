//! Core traits for the antbox abstractions.
//!
//! These traits define the interfaces that concrete backends must
//! satisfy, enabling pluggable implementations and testability. The
//! node repository and binary store are process-wide and mutable;
//! mutual exclusion lives inside the implementations, never with the
//! callers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::filters::NodeFilters;
use crate::models::{
    AspectDefinition, Group, Node, NodeFilterResult, UserRecord, WorkflowDefinition,
    WorkflowInstance,
};

// =============================================================================
// NODE REPOSITORY
// =============================================================================

/// Persistent mapping of uuid to node record with indexed filter
/// evaluation.
#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// Insert a new node. Fails with `BadRequest` when the uuid or the
    /// fid collides with a stored node.
    async fn add(&self, node: Node) -> Result<()>;

    /// Replace the full record atomically. Fails with `NodeNotFound`
    /// when the uuid is absent.
    async fn update(&self, node: Node) -> Result<()>;

    /// Remove a node. Deleting an absent uuid is `NodeNotFound`, not a
    /// silent success.
    async fn delete(&self, uuid: &str) -> Result<()>;

    /// Fetch by uuid.
    async fn get_by_id(&self, uuid: &str) -> Result<Node>;

    /// Fetch by fid slug.
    async fn get_by_fid(&self, fid: &str) -> Result<Node>;

    /// Evaluate a filter AST with deterministic pagination: stable
    /// `(title ASC, uuid ASC)` ordering, 1-based page tokens.
    async fn filter(
        &self,
        filters: &NodeFilters,
        page_size: usize,
        page_token: usize,
    ) -> Result<NodeFilterResult>;
}

// =============================================================================
// BINARY STORE
// =============================================================================

/// Advisory routing metadata for a binary write. Backends may use it
/// to derive a path; the store is otherwise opaque.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOptions {
    pub title: String,
    pub parent: String,
    pub mimetype: String,
}

/// uuid-keyed opaque byte stream store.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Store content under `uuid`, replacing any previous content.
    async fn write(&self, uuid: &str, content: &[u8], options: WriteOptions) -> Result<()>;

    /// Read content. Fails with `NodeFileNotFound` when absent.
    async fn read(&self, uuid: &str) -> Result<Vec<u8>>;

    /// Delete content. Fails with `NodeFileNotFound` when absent.
    async fn delete(&self, uuid: &str) -> Result<()>;
}

// =============================================================================
// CONFIGURATION REPOSITORY
// =============================================================================

/// Multi-collection typed store for aspects, identity, and workflow
/// state. Built-in aspects/groups/users are merged into list results;
/// saving or deleting a reserved uuid fails with `BadRequest`.
#[async_trait]
pub trait ConfigurationRepository: Send + Sync {
    async fn save_aspect(&self, aspect: AspectDefinition) -> Result<()>;
    async fn get_aspect(&self, uuid: &str) -> Result<Option<AspectDefinition>>;
    async fn list_aspects(&self) -> Result<Vec<AspectDefinition>>;
    async fn delete_aspect(&self, uuid: &str) -> Result<()>;

    async fn save_group(&self, group: Group) -> Result<()>;
    async fn get_group(&self, uuid: &str) -> Result<Option<Group>>;
    async fn list_groups(&self) -> Result<Vec<Group>>;
    async fn delete_group(&self, uuid: &str) -> Result<()>;

    async fn save_user(&self, user: UserRecord) -> Result<()>;
    async fn get_user(&self, email: &str) -> Result<Option<UserRecord>>;
    async fn list_users(&self) -> Result<Vec<UserRecord>>;
    async fn delete_user(&self, email: &str) -> Result<()>;

    async fn save_workflow_definition(&self, definition: WorkflowDefinition) -> Result<()>;
    async fn get_workflow_definition(&self, uuid: &str) -> Result<Option<WorkflowDefinition>>;
    async fn list_workflow_definitions(&self) -> Result<Vec<WorkflowDefinition>>;
    async fn delete_workflow_definition(&self, uuid: &str) -> Result<()>;

    async fn save_workflow_instance(&self, instance: WorkflowInstance) -> Result<()>;
    async fn get_workflow_instance(&self, uuid: &str) -> Result<Option<WorkflowInstance>>;
    async fn list_workflow_instances(&self) -> Result<Vec<WorkflowInstance>>;
    async fn delete_workflow_instance(&self, uuid: &str) -> Result<()>;
}

// =============================================================================
// VECTOR DATABASE
// =============================================================================

/// A stored embedding keyed by node uuid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorEntry {
    pub node_uuid: String,
    pub vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

/// A nearest-neighbour hit. Scores are normalized to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorHit {
    pub node_uuid: String,
    pub score: f32,
}

/// k-nearest vector search keyed by node uuid.
#[async_trait]
pub trait VectorDatabase: Send + Sync {
    /// Insert or replace the embedding for a node.
    async fn upsert(&self, entry: VectorEntry) -> Result<()>;

    /// Remove the embedding for a node. Absent uuids are a no-op.
    async fn delete_by_node_uuid(&self, uuid: &str) -> Result<()>;

    /// Top-k nearest neighbours by cosine similarity, descending score.
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorHit>>;
}

// =============================================================================
// MODELS
// =============================================================================

/// Text-to-vector embedding model.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed a batch of texts, one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimensionality of the produced vectors.
    fn dimension(&self) -> usize;
}

/// File-to-text extraction model.
#[async_trait]
pub trait OcrModel: Send + Sync {
    /// Extract text from a binary.
    async fn ocr(&self, content: &[u8], mimetype: &str) -> Result<String>;
}
