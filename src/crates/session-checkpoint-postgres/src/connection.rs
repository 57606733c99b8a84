//! Connection sources and scoped acquisition
//!
//! The store works against either a single pre-opened connection or a pool,
//! transparently. [`ConnectionSource`] is the closed set of shapes a caller
//! can supply; [`ScopedConnection`] is what an operation holds while it runs.
//! Acquisition is scoped on every path: a pool checkout returns to the pool
//! when the guard drops (success or error), and a single connection is
//! released when its mutex guard drops. No operation holds a connection
//! across two logically separate calls.

use session_checkpoint::{CheckpointError, Result};
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Where the store gets its connections from.
///
/// A `Pool` supports concurrent operations; a single `Connection` serializes
/// them behind an async mutex. The caller owns the lifetime of both: open at
/// process start, close at process shutdown.
#[derive(Debug, Clone)]
pub enum ConnectionSource {
    /// One caller-managed connection, shared behind a mutex
    Connection(Arc<Mutex<PgConnection>>),
    /// A pool; connections are borrowed per call and returned on drop
    Pool(PgPool),
}

impl ConnectionSource {
    /// Check a connection out of the source for the duration of one
    /// operation.
    pub async fn acquire(&self) -> Result<ScopedConnection> {
        match self {
            ConnectionSource::Connection(conn) => {
                Ok(ScopedConnection::Single(Arc::clone(conn).lock_owned().await))
            }
            ConnectionSource::Pool(pool) => pool
                .acquire()
                .await
                .map(ScopedConnection::Pooled)
                .map_err(|e| CheckpointError::BackendUnavailable(e.to_string())),
        }
    }
}

impl From<PgPool> for ConnectionSource {
    fn from(pool: PgPool) -> Self {
        ConnectionSource::Pool(pool)
    }
}

impl From<PgConnection> for ConnectionSource {
    fn from(conn: PgConnection) -> Self {
        ConnectionSource::Connection(Arc::new(Mutex::new(conn)))
    }
}

/// A connection checked out for one operation (or one `list` stream).
///
/// Owned guards, so a stream can carry its connection until the caller drops
/// it.
#[derive(Debug)]
pub enum ScopedConnection {
    Single(OwnedMutexGuard<PgConnection>),
    Pooled(PoolConnection<Postgres>),
}

impl Deref for ScopedConnection {
    type Target = PgConnection;

    fn deref(&self) -> &Self::Target {
        match self {
            ScopedConnection::Single(guard) => guard,
            ScopedConnection::Pooled(conn) => conn,
        }
    }
}

impl DerefMut for ScopedConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            ScopedConnection::Single(guard) => &mut *guard,
            ScopedConnection::Pooled(conn) => &mut *conn,
        }
    }
}
