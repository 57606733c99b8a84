//! In-memory checkpoint storage for development and testing
//!
//! [`InMemoryCheckpointStore`] is the reference implementation of
//! [`CheckpointStore`]: all rows live in a thread-safe map, with each
//! session's checkpoints keyed by version in a `BTreeMap` so "latest" and
//! descending enumeration fall out of the key order. Payload and metadata
//! pass through the same codec and storage framing as the relational
//! backend, so a payload that round-trips here round-trips there.
//!
//! Use it for unit tests, prototypes, and short-lived single-process
//! workflows. Nothing survives a restart; production deployments want a
//! database-backed implementation of the same trait.
//!
//! # Example
//!
//! ```rust
//! use session_checkpoint::{
//!     Checkpoint, CheckpointConfig, CheckpointStore, InMemoryCheckpointStore, StateValue,
//! };
//!
//! #[tokio::main]
//! async fn main() -> session_checkpoint::Result<()> {
//!     let store = InMemoryCheckpointStore::new();
//!     let config = CheckpointConfig::new("session-1");
//!
//!     let ack = store
//!         .put(
//!             &config,
//!             Checkpoint::new("v1", StateValue::from(serde_json::json!({"turn": 1}))),
//!             StateValue::Null,
//!         )
//!         .await?;
//!     assert_eq!(ack.version.as_deref(), Some("v1"));
//!
//!     let resumed = store.get_tuple(&config).await?.unwrap();
//!     assert_eq!(resumed.checkpoint.version, "v1");
//!     Ok(())
//! }
//! ```

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointTuple},
    error::{CheckpointError, Result},
    serializer::{EncodedValue, JsonBinarySerializer, SerializerProtocol, StateValue},
    traits::{CheckpointStore, CheckpointStream},
};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::collections::{btree_map, BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One stored row, in the same framed form the relational backend persists.
#[derive(Debug, Clone)]
struct StoredCheckpoint {
    parent_version: Option<String>,
    payload: Vec<u8>,
    metadata: Vec<u8>,
}

/// An owned row lifted out of the map, decoded when the stream is consumed.
#[derive(Debug)]
struct RawRow {
    session_id: String,
    version: String,
    stored: StoredCheckpoint,
}

type SessionMap = HashMap<String, BTreeMap<String, StoredCheckpoint>>;

/// Thread-safe in-memory checkpoint store
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    sessions: Arc<RwLock<SessionMap>>,
    serializer: JsonBinarySerializer,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions holding at least one checkpoint.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Total checkpoints across all sessions.
    pub async fn checkpoint_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .map(|rows| rows.len())
            .sum()
    }

    /// Drop every row (test isolation).
    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }

    fn decode_row(&self, row: RawRow) -> Result<CheckpointTuple> {
        let payload = EncodedValue::from_storage_bytes(&row.stored.payload)?;
        let metadata = EncodedValue::from_storage_bytes(&row.stored.metadata)?;
        let state = self.serializer.loads(&payload)?;
        let metadata = self.serializer.loads(&metadata)?;

        let mut tuple = CheckpointTuple::new(
            CheckpointConfig::new(&row.session_id).with_version(&row.version),
            Checkpoint::new(&row.version, state),
            metadata,
        );
        if let Some(parent) = row.stored.parent_version {
            tuple = tuple
                .with_parent_config(CheckpointConfig::new(&row.session_id).with_version(parent));
        }
        Ok(tuple)
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let sessions = self.sessions.read().await;
        let Some(rows) = sessions.get(&config.session_id) else {
            return Ok(None);
        };

        let found = match &config.version {
            Some(version) => rows.get_key_value(version),
            None => rows.iter().next_back(),
        };
        let Some((version, stored)) = found else {
            return Ok(None);
        };

        let row = RawRow {
            session_id: config.session_id.clone(),
            version: version.clone(),
            stored: stored.clone(),
        };
        drop(sessions);

        self.decode_row(row).map(Some)
    }

    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, serde_json::Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream> {
        if filter.as_ref().is_some_and(|f| !f.is_empty()) {
            return Err(CheckpointError::FilterNotSupported);
        }
        let before_version = before.and_then(|cfg| cfg.version.as_deref());

        let sessions = self.sessions.read().await;
        let mut rows: Vec<RawRow> = Vec::new();
        let mut collect = |session_id: &str, checkpoints: &BTreeMap<String, StoredCheckpoint>| {
            for (version, stored) in checkpoints.iter().rev() {
                if let Some(cutoff) = before_version {
                    if version.as_str() >= cutoff {
                        continue;
                    }
                }
                rows.push(RawRow {
                    session_id: session_id.to_string(),
                    version: version.clone(),
                    stored: stored.clone(),
                });
            }
        };
        match config {
            Some(cfg) => {
                if let Some(checkpoints) = sessions.get(&cfg.session_id) {
                    collect(&cfg.session_id, checkpoints);
                }
            }
            None => {
                for (session_id, checkpoints) in sessions.iter() {
                    collect(session_id, checkpoints);
                }
            }
        }
        drop(sessions);

        rows.sort_by(|a, b| {
            b.version
                .cmp(&a.version)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        if let Some(limit) = limit {
            rows.truncate(limit);
        }

        let store = self.clone();
        let stream = stream::iter(rows).map(move |row| store.decode_row(row));
        Ok(Box::pin(stream))
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: StateValue,
    ) -> Result<CheckpointConfig> {
        let payload = self
            .serializer
            .dumps(&checkpoint.state)?
            .into_storage_bytes();
        let metadata = self.serializer.dumps(&metadata)?.into_storage_bytes();

        let mut sessions = self.sessions.write().await;
        let rows = sessions.entry(config.session_id.clone()).or_default();
        match rows.entry(checkpoint.version.clone()) {
            // Conflict path mirrors the relational upsert: payload and
            // metadata change, the stored parent does not.
            btree_map::Entry::Occupied(mut entry) => {
                let row = entry.get_mut();
                row.payload = payload;
                row.metadata = metadata;
            }
            btree_map::Entry::Vacant(entry) => {
                entry.insert(StoredCheckpoint {
                    parent_version: config.version.clone(),
                    payload,
                    metadata,
                });
            }
        }

        Ok(CheckpointConfig::new(&config.session_id).with_version(checkpoint.version))
    }
}
