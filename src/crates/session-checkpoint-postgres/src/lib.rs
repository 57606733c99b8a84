//! # session-checkpoint-postgres - Durable Session Checkpoints on Postgres
//!
//! Relational backend for the
//! [`CheckpointStore`](session_checkpoint::CheckpointStore) trait. One
//! `checkpoints` table holds every session's history; writes are single
//! upsert statements keyed by `(session_id, version)`, reads resolve either
//! an exact version or the lexicographically greatest one for a session, and
//! history enumeration streams rows newest-first, decoding each as it is
//! consumed.
//!
//! The store accepts either a connection pool or a single pre-opened
//! connection ([`ConnectionSource`]), acquires scoped connections per
//! operation, and leaves retry policy, cancellation, and pool lifecycle to
//! the host process.
//!
//! ```rust,no_run
//! use session_checkpoint_postgres::PostgresCheckpointStore;
//! use sqlx::postgres::PgPoolOptions;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPoolOptions::new()
//!     .max_connections(20)
//!     .connect("postgres://localhost/sessions")
//!     .await?;
//!
//! let store = PostgresCheckpointStore::with_pool(pool);
//! store.ensure_schema().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod store;

// Re-export main types
pub use connection::{ConnectionSource, ScopedConnection};
pub use store::PostgresCheckpointStore;
