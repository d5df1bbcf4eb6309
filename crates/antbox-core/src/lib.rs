//! # antbox-core
//!
//! Core types, traits, and abstractions for the antbox content
//! repository.
//!
//! This crate provides the domain model (nodes, aspects, permissions),
//! the filter AST with in-memory evaluation, fulltext derivation, the
//! lifecycle event bus, the reserved built-ins, and the backend traits
//! that the other antbox crates implement and compose.

pub mod builtins;
pub mod defaults;
pub mod error;
pub mod events;
pub mod filters;
pub mod fulltext;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, PropertyError, Result};
pub use events::{
    DomainEvent, EventBus, EventHandler, EventPayload, SubscriptionId, UpdateDiff,
    NODE_CREATED_EVENT, NODE_DELETED_EVENT, NODE_UPDATED_EVENT,
};
pub use filters::{Filter, FilterGroup, FilterOperator, NodeFilters, CONTENT_FIELD};
pub use fulltext::{derive_fulltext, fold_text};
pub use models::*;
pub use traits::*;
pub use uuid_utils::{
    fid_from_alias, fid_to_alias, is_builtin_uuid, is_fid_alias, new_node_uuid, slugify,
};
