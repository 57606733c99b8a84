//! Core checkpoint data structures
//!
//! A **session** is a logical conversation identified by an opaque
//! `session_id`. Its state evolves through **checkpoints**: durable snapshots
//! keyed by a caller-minted `version` string that is unique within the
//! session and totally ordered by plain string comparison. Each checkpoint
//! may record the version it was derived from, forming a parent chain that a
//! caller can walk to reconstruct or branch history.
//!
//! # Types
//!
//! - [`CheckpointConfig`] - addressing: which session, and optionally which
//!   version. On writes the config's version becomes the new row's parent;
//!   on reads it selects an exact version (absent means "latest").
//! - [`Checkpoint`] - one snapshot: its version marker plus the opaque
//!   [`StateValue`] payload.
//! - [`CheckpointTuple`] - the retrieval-time view: resolved config, decoded
//!   checkpoint and metadata, and the parent config if a parent was recorded.
//!
//! # Versions
//!
//! The store orders versions by string comparison, so any scheme where later
//! markers compare greater works: wall-clock timestamps, zero-padded
//! counters, or anything the caller mints. [`Checkpoint::next_version`]
//! produces an RFC 3339 UTC timestamp with fixed nanosecond precision, which
//! sorts chronologically as a string and is strictly increasing within the
//! process even when minted faster than the clock ticks.
//!
//! ```rust
//! use session_checkpoint::{Checkpoint, CheckpointConfig, StateValue};
//!
//! let config = CheckpointConfig::new("conversation-42");
//! let snapshot = Checkpoint::new(
//!     Checkpoint::next_version(),
//!     StateValue::from(serde_json::json!({"turn": 1})),
//! );
//! assert!(config.version.is_none());
//! assert!(!snapshot.version.is_empty());
//! ```

use crate::serializer::StateValue;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// Addresses a checkpoint: a session, and optionally a version within it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Opaque session identifier; not unique across checkpoints on its own
    pub session_id: String,

    /// Specific version within the session
    ///
    /// Absent on a read means "the latest version". Present on a write, it is
    /// recorded as the new checkpoint's parent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl CheckpointConfig {
    /// Address a session with no specific version.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            version: None,
        }
    }

    /// Pin the config to a specific version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// One durable snapshot of session state.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    /// Ordering and lookup key, unique within the session
    pub version: String,

    /// The state being checkpointed; opaque to every store
    pub state: StateValue,
}

impl Checkpoint {
    pub fn new(version: impl Into<String>, state: StateValue) -> Self {
        Self {
            version: version.into(),
            state,
        }
    }

    /// Mint a version marker from the wall clock.
    ///
    /// RFC 3339 UTC with fixed nanosecond width, so lexicographic order
    /// matches chronological order. Strictly monotonic within the process:
    /// when the clock has not advanced past the last minted marker, the new
    /// marker is bumped one nanosecond beyond it. Uniqueness across processes
    /// writing to the same session is the caller's concern.
    pub fn next_version() -> String {
        static LAST_MINTED_NANOS: AtomicI64 = AtomicI64::new(0);

        let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let mut last = LAST_MINTED_NANOS.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match LAST_MINTED_NANOS.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return DateTime::from_timestamp_nanos(next)
                        .to_rfc3339_opts(SecondsFormat::Nanos, true)
                }
                Err(observed) => last = observed,
            }
        }
    }
}

/// A checkpoint together with everything retrieved alongside it.
///
/// Read-side projection only; nothing stores this shape directly.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointTuple {
    /// The resolved address of this checkpoint (session + concrete version)
    pub config: CheckpointConfig,

    /// The decoded checkpoint
    pub checkpoint: Checkpoint,

    /// The decoded metadata side channel
    pub metadata: StateValue,

    /// Address of the parent checkpoint, if one was recorded
    pub parent_config: Option<CheckpointConfig>,
}

impl CheckpointTuple {
    pub fn new(config: CheckpointConfig, checkpoint: Checkpoint, metadata: StateValue) -> Self {
        Self {
            config,
            checkpoint,
            metadata,
            parent_config: None,
        }
    }

    pub fn with_parent_config(mut self, parent_config: CheckpointConfig) -> Self {
        self.parent_config = Some(parent_config);
        self
    }
}
