//! Structured logging field name constants for antbox.
//!
//! All crates use these constants for consistent structured logging
//! fields so log aggregation tools can query by standardized names
//! across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Storage/repository failure requiring operator attention |
//! | WARN  | Recoverable issue, fallback applied (subscriber error, absent semantic plane) |
//! | INFO  | Lifecycle events, operation completions |
//! | DEBUG | Decision points, rewrite outcomes, config choices |
//! | TRACE | Per-item iteration (filter hits, cascade children) |

/// Node uuid being operated on.
pub const NODE_ID: &str = "node_id";

/// Tenant tag carried by the operation context.
pub const TENANT: &str = "tenant";

/// Principal email carried by the operation context.
pub const PRINCIPAL: &str = "principal";

/// Logical operation name.
/// Examples: "create", "find", "cascade_delete", "publish"
pub const OPERATION: &str = "op";

/// Event id being published or handled.
pub const EVENT_ID: &str = "event_id";

/// Number of handlers a publish dispatched to.
pub const SUBSCRIBER_COUNT: &str = "subscriber_count";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a filter or search.
pub const RESULT_COUNT: &str = "result_count";

/// Number of texts sent to an embedding model.
pub const INPUT_COUNT: &str = "input_count";

/// Model name used for embedding or OCR.
pub const MODEL: &str = "model";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
