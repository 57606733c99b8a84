//! Checkpoint storage trait for pluggable persistence backends
//!
//! This module defines [`CheckpointStore`] - the capability interface every
//! persistence backend implements. The store is a passive library: it imposes
//! no scheduling of its own and is driven entirely by the host process's
//! concurrency model. Implementations must therefore be `Send + Sync` and
//! safe under concurrent calls, with each operation acquiring whatever
//! resources it needs for its own duration only.
//!
//! # Contract
//!
//! - **`put`** - encode the checkpoint and metadata payloads, upsert the row
//!   keyed by `(session_id, version)`, and return the ack config carrying the
//!   stored version so the caller can chain it as the next put's parent.
//!   Re-applying an identical put leaves exactly one row; a put with a new
//!   payload at an existing key overwrites in place.
//! - **`get_tuple`** - resolve the config to a row (exact version when set,
//!   otherwise the greatest version for the session), decode, and return it.
//!   A session with no rows is a normal initial state: `Ok(None)`, never an
//!   error. Backend failures still raise.
//! - **`list`** - stream matching rows ordered by version descending, newest
//!   first, decoding each row as the caller consumes it. The stream is
//!   forward-only and non-restartable. Metadata predicates are rejected with
//!   [`FilterNotSupported`](crate::CheckpointError::FilterNotSupported)
//!   before any work happens.
//!
//! # Implementing a backend
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use session_checkpoint::{
//!     Checkpoint, CheckpointConfig, CheckpointStore, CheckpointStream,
//!     CheckpointTuple, Result, StateValue,
//! };
//!
//! struct RedisCheckpointStore { /* client, serializer */ }
//!
//! #[async_trait]
//! impl CheckpointStore for RedisCheckpointStore {
//!     async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
//!         // Resolve exact-or-latest, decode payload + metadata, build the
//!         // parent config from the stored parent version.
//!         todo!()
//!     }
//!
//!     async fn list(
//!         &self,
//!         config: Option<&CheckpointConfig>,
//!         filter: Option<std::collections::HashMap<String, serde_json::Value>>,
//!         before: Option<&CheckpointConfig>,
//!         limit: Option<usize>,
//!     ) -> Result<CheckpointStream> {
//!         todo!()
//!     }
//!
//!     async fn put(
//!         &self,
//!         config: &CheckpointConfig,
//!         checkpoint: Checkpoint,
//!         metadata: StateValue,
//!     ) -> Result<CheckpointConfig> {
//!         todo!()
//!     }
//! }
//! ```

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointTuple},
    error::Result,
    serializer::StateValue,
};
use async_trait::async_trait;
use futures::stream::Stream;
use std::collections::HashMap;
use std::pin::Pin;

/// Lazy, forward-only sequence of decoded checkpoint tuples
pub type CheckpointStream =
    Pin<Box<dyn Stream<Item = Result<CheckpointTuple>> + Send + 'static>>;

/// Durable put/get/list access to a session's checkpoint history
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Fetch just the checkpoint for the given config.
    ///
    /// Convenience over [`get_tuple`](Self::get_tuple) for callers that do
    /// not need metadata or the parent pointer.
    async fn get(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>> {
        Ok(self.get_tuple(config).await?.map(|tuple| tuple.checkpoint))
    }

    /// Fetch the full checkpoint tuple for the given config.
    ///
    /// With `config.version` set, looks up that exact row; otherwise the row
    /// with the greatest version for the session. Returns `Ok(None)` when no
    /// row matches.
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>>;

    /// Enumerate checkpoints, most recent version first.
    ///
    /// `config` restricts to one session; `before` (its `version`) excludes
    /// that version and everything greater; `limit` truncates the result.
    /// A non-empty `filter` fails fast with
    /// [`FilterNotSupported`](crate::CheckpointError::FilterNotSupported) -
    /// metadata predicates are deliberately unsupported.
    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, serde_json::Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream>;

    /// Persist one checkpoint, overwriting any row with the same key.
    ///
    /// `config.session_id` names the session; `config.version` (if set) is
    /// recorded as the new row's parent version on first insert. An overwrite
    /// replaces payload and metadata only - the stored parent never changes.
    /// Returns the config of the stored checkpoint, ready to be passed back
    /// as the next put's config.
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: StateValue,
    ) -> Result<CheckpointConfig>;
}
