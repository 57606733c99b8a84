//! # session-checkpoint - State Persistence for Resumable Sessions
//!
//! **Checkpoint abstractions and a reference in-memory store** for
//! long-running conversational sessions. A session's state is recorded as a
//! chain of versioned snapshots; a caller can resume at the latest snapshot,
//! fetch any historical one, and enumerate history newest-first - without the
//! store ever knowing what the state represents.
//!
//! ## Core Concepts
//!
//! ### 1. The payload codec
//!
//! [`StateValue`] is the closed value model a store accepts: primitives,
//! containers, and raw binary (immutable [`StateValue::Bytes`] or mutable
//! [`StateValue::ByteArray`]). [`JsonBinarySerializer`] converts a value into
//! a tagged [`EncodedValue`] and back; raw binary passes through verbatim,
//! structured data becomes JSON with hex reconstruction hints for any binary
//! nested inside. Decoding an unknown tag is a fatal
//! [`CheckpointError::UnsupportedEncodingKind`].
//!
//! ### 2. The store trait
//!
//! [`CheckpointStore`] is the capability interface backends implement:
//!
//! - **`put()`** - upsert one snapshot keyed by `(session_id, version)`
//! - **`get_tuple()`** - fetch by exact version, or the latest for a session
//! - **`list()`** - stream history, newest version first
//!
//! Versions are caller-minted strings ordered by plain string comparison;
//! [`Checkpoint::next_version`] mints a wall-clock marker with that property.
//! The returned config from `put` carries the stored version, ready to be the
//! next put's parent.
//!
//! ### 3. Backends
//!
//! This crate ships [`InMemoryCheckpointStore`] for tests and development.
//! The `session-checkpoint-postgres` crate implements the same trait over a
//! pooled Postgres connection for durable deployments.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use session_checkpoint::{
//!     Checkpoint, CheckpointConfig, CheckpointStore, InMemoryCheckpointStore, StateValue,
//! };
//!
//! #[tokio::main]
//! async fn main() -> session_checkpoint::Result<()> {
//!     let store = InMemoryCheckpointStore::new();
//!
//!     // First checkpoint of a fresh session.
//!     let config = CheckpointConfig::new("session-123");
//!     let ack = store
//!         .put(
//!             &config,
//!             Checkpoint::new(
//!                 Checkpoint::next_version(),
//!                 StateValue::from(serde_json::json!({"messages": ["hello"]})),
//!             ),
//!             StateValue::from(serde_json::json!({"source": "input"})),
//!         )
//!         .await?;
//!
//!     // The ack chains the next put's parent pointer.
//!     store
//!         .put(
//!             &ack,
//!             Checkpoint::new(
//!                 Checkpoint::next_version(),
//!                 StateValue::from(serde_json::json!({"messages": ["hello", "hi"]})),
//!             ),
//!             StateValue::from(serde_json::json!({"source": "loop"})),
//!         )
//!         .await?;
//!
//!     // Resume at the latest checkpoint.
//!     let resumed = store.get_tuple(&config).await?.expect("history exists");
//!     assert!(resumed.parent_config.is_some());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`serializer`] - [`StateValue`], [`EncodedValue`], [`SerializerProtocol`]
//! - [`checkpoint`] - [`Checkpoint`], [`CheckpointConfig`], [`CheckpointTuple`]
//! - [`traits`] - [`CheckpointStore`] trait and [`CheckpointStream`]
//! - [`memory`] - [`InMemoryCheckpointStore`] reference implementation
//! - [`error`] - [`CheckpointError`] taxonomy

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod serializer;
pub mod traits;

// Re-export main types
pub use checkpoint::{Checkpoint, CheckpointConfig, CheckpointTuple};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointStore;
pub use serializer::{
    EncodedKind, EncodedValue, JsonBinarySerializer, SerializerProtocol, StateValue,
};
pub use traits::{CheckpointStore, CheckpointStream};
