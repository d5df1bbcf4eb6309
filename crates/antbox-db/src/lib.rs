//! # antbox-db
//!
//! Backend implementations for the antbox repository traits: the node
//! repository, the binary content store (in-memory and filesystem),
//! the configuration repository, and the vector database.
//!
//! All backends are process-wide and safe under concurrent callers;
//! mutual exclusion lives inside each implementation.

pub mod config_repository;
pub mod node_repository;
pub mod storage;
pub mod vector;

pub use config_repository::InMemoryConfigurationRepository;
pub use node_repository::InMemoryNodeRepository;
pub use storage::{FsStorageProvider, InMemoryStorageProvider};
pub use vector::InMemoryVectorDb;
