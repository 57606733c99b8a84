//! Postgres-backed checkpoint store
//!
//! [`PostgresCheckpointStore`] implements
//! [`CheckpointStore`](session_checkpoint::CheckpointStore) over a single
//! `checkpoints` table. The store owns nothing but a reference to its
//! [`ConnectionSource`]; it is safe to share across tasks, relies on the
//! backend's per-statement atomicity (upsert conflict resolution on the
//! `(session_id, version)` primary key) instead of its own locking, and never
//! retries internally - backend failures propagate to the caller as
//! [`BackendUnavailable`](session_checkpoint::CheckpointError::BackendUnavailable).
//!
//! # Schema
//!
//! ```text
//! CREATE TABLE IF NOT EXISTS checkpoints (
//!     session_id      TEXT NOT NULL,
//!     version         TEXT NOT NULL,
//!     parent_version  TEXT,
//!     payload         BYTEA NOT NULL,
//!     metadata        BYTEA NOT NULL,
//!     PRIMARY KEY (session_id, version)
//! );
//! ```
//!
//! [`ensure_schema`](PostgresCheckpointStore::ensure_schema) is idempotent
//! and safe to race; [`drop_schema`](PostgresCheckpointStore::drop_schema)
//! exists for test teardown only. Rows are written by a single upsert
//! statement, so a retried `put` after a communication failure can never
//! create duplicate history.
//!
//! # Example
//!
//! ```rust,no_run
//! use session_checkpoint::{Checkpoint, CheckpointConfig, CheckpointStore, StateValue};
//! use session_checkpoint_postgres::PostgresCheckpointStore;
//! use sqlx::postgres::PgPoolOptions;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = PgPoolOptions::new()
//!         .max_connections(20)
//!         .connect("postgres://localhost/sessions")
//!         .await?;
//!
//!     let store = PostgresCheckpointStore::with_pool(pool);
//!     store.ensure_schema().await?;
//!
//!     let config = CheckpointConfig::new("session-123");
//!     let ack = store
//!         .put(
//!             &config,
//!             Checkpoint::new(
//!                 Checkpoint::next_version(),
//!                 StateValue::from(serde_json::json!({"messages": []})),
//!             ),
//!             StateValue::Null,
//!         )
//!         .await?;
//!
//!     // Resume later at the latest checkpoint.
//!     let resumed = store.get_tuple(&config).await?;
//!     assert!(resumed.is_some());
//!     # let _ = ack;
//!     Ok(())
//! }
//! ```

use crate::connection::{ConnectionSource, ScopedConnection};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::TryStreamExt;
use session_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointError, CheckpointStore, CheckpointStream,
    CheckpointTuple, EncodedValue, JsonBinarySerializer, Result, SerializerProtocol, StateValue,
};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Checkpoint store backed by a Postgres `checkpoints` table.
#[derive(Debug, Clone, Default)]
pub struct PostgresCheckpointStore {
    source: Option<ConnectionSource>,
    serializer: JsonBinarySerializer,
}

impl PostgresCheckpointStore {
    const CREATE_TABLE_QUERY: &'static str = "
    CREATE TABLE IF NOT EXISTS checkpoints (
        session_id      TEXT NOT NULL,
        version         TEXT NOT NULL,
        parent_version  TEXT,
        payload         BYTEA NOT NULL,
        metadata        BYTEA NOT NULL,
        PRIMARY KEY (session_id, version)
    );
    ";

    const DROP_TABLE_QUERY: &'static str = "DROP TABLE IF EXISTS checkpoints;";

    const UPSERT_CHECKPOINT_QUERY: &'static str = "
    INSERT INTO checkpoints
        (session_id, version, parent_version, payload, metadata)
    VALUES
        ($1, $2, $3, $4, $5)
    ON CONFLICT (session_id, version)
    DO UPDATE SET payload = EXCLUDED.payload,
                  metadata = EXCLUDED.metadata;
    ";

    const GET_CHECKPOINT_BY_VERSION_QUERY: &'static str = "
    SELECT session_id, version, parent_version, payload, metadata
    FROM checkpoints
    WHERE session_id = $1 AND version = $2
    ";

    const GET_LATEST_CHECKPOINT_QUERY: &'static str = "
    SELECT session_id, version, parent_version, payload, metadata
    FROM checkpoints
    WHERE session_id = $1
    ORDER BY version DESC LIMIT 1
    ";

    const LIST_CHECKPOINTS_QUERY_STR: &'static str = "
    SELECT session_id, version, parent_version, payload, metadata
    FROM checkpoints
    {where}
    ORDER BY version DESC
    ";

    /// A store with no connection source; every operation fails with
    /// [`CheckpointError::InvalidConnectionSource`] until one is supplied.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store borrowing connections from a pool, one per operation.
    pub fn with_pool(pool: PgPool) -> Self {
        Self::from_source(pool.into())
    }

    /// A store over one caller-managed connection.
    ///
    /// The connection stays open for the store's lifetime; operations are
    /// serialized over it.
    pub fn with_connection(conn: PgConnection) -> Self {
        Self::from_source(conn.into())
    }

    pub fn from_source(source: ConnectionSource) -> Self {
        Self {
            source: Some(source),
            serializer: JsonBinarySerializer::new(),
        }
    }

    async fn acquire(&self) -> Result<ScopedConnection> {
        match &self.source {
            Some(source) => source.acquire().await,
            None => Err(CheckpointError::InvalidConnectionSource(
                "no connection or pool was supplied; initialize the store with \
                 with_connection or with_pool"
                    .to_string(),
            )),
        }
    }

    /// Create the `checkpoints` table if it does not exist.
    ///
    /// Safe to call repeatedly and concurrently; a racing creation is
    /// absorbed by `IF NOT EXISTS`.
    pub async fn ensure_schema(&self) -> Result<()> {
        let mut conn = self.acquire().await?;
        sqlx::query(Self::CREATE_TABLE_QUERY)
            .execute(&mut *conn)
            .await
            .map_err(backend_err)?;
        debug!("checkpoint schema ensured");
        Ok(())
    }

    /// Drop the `checkpoints` table. Test teardown only.
    pub async fn drop_schema(&self) -> Result<()> {
        let mut conn = self.acquire().await?;
        sqlx::query(Self::DROP_TABLE_QUERY)
            .execute(&mut *conn)
            .await
            .map_err(backend_err)?;
        debug!("checkpoint schema dropped");
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let mut conn = self.acquire().await?;
        let row = match &config.version {
            Some(version) => {
                sqlx::query(Self::GET_CHECKPOINT_BY_VERSION_QUERY)
                    .bind(&config.session_id)
                    .bind(version)
                    .fetch_optional(&mut *conn)
                    .await
            }
            None => {
                sqlx::query(Self::GET_LATEST_CHECKPOINT_QUERY)
                    .bind(&config.session_id)
                    .fetch_optional(&mut *conn)
                    .await
            }
        }
        .map_err(backend_err)?;

        row.as_ref()
            .map(|row| row_to_tuple(&self.serializer, row))
            .transpose()
    }

    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, serde_json::Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream> {
        // Rejected before any connection is acquired.
        if filter.as_ref().is_some_and(|f| !f.is_empty()) {
            return Err(CheckpointError::FilterNotSupported);
        }

        let (where_clause, params) = search_where(config, before);
        let mut query = Self::LIST_CHECKPOINTS_QUERY_STR.replace("{where}", &where_clause);
        if let Some(limit) = limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let mut conn = self.acquire().await?;
        let serializer = self.serializer.clone();

        // The scoped connection lives inside the stream, held until the
        // caller finishes consuming it; rows decode on demand.
        let stream = try_stream! {
            let mut q = sqlx::query(&query);
            for param in &params {
                q = q.bind(param);
            }
            let mut rows = q.fetch(&mut *conn);
            while let Some(row) = rows.try_next().await.map_err(backend_err)? {
                yield row_to_tuple(&serializer, &row)?;
            }
        };
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

        let mut conn = self.acquire().await?;
        sqlx::query(Self::UPSERT_CHECKPOINT_QUERY)
            .bind(&config.session_id)
            .bind(&checkpoint.version)
            .bind(config.version.as_deref())
            .bind(&payload)
            .bind(&metadata)
            .execute(&mut *conn)
            .await
            .map_err(backend_err)?;
        trace!(
            session_id = %config.session_id,
            version = %checkpoint.version,
            "stored checkpoint"
        );

        Ok(CheckpointConfig::new(&config.session_id).with_version(checkpoint.version))
    }
}

fn backend_err(err: sqlx::Error) -> CheckpointError {
    CheckpointError::BackendUnavailable(err.to_string())
}

/// WHERE clause and bind parameters for a `list` query.
fn search_where(
    config: Option<&CheckpointConfig>,
    before: Option<&CheckpointConfig>,
) -> (String, Vec<String>) {
    let mut wheres = Vec::new();
    let mut params = Vec::new();

    if let Some(config) = config {
        params.push(config.session_id.clone());
        wheres.push(format!("session_id = ${}", params.len()));
    }

    if let Some(version) = before.and_then(|cfg| cfg.version.as_ref()) {
        params.push(version.clone());
        wheres.push(format!("version < ${}", params.len()));
    }

    let clause = if wheres.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", wheres.join(" AND "))
    };
    (clause, params)
}

fn row_to_tuple(serializer: &JsonBinarySerializer, row: &PgRow) -> Result<CheckpointTuple> {
    let session_id: String = row.try_get("session_id").map_err(backend_err)?;
    let version: String = row.try_get("version").map_err(backend_err)?;
    let parent_version: Option<String> = row.try_get("parent_version").map_err(backend_err)?;
    let payload: Vec<u8> = row.try_get("payload").map_err(backend_err)?;
    let metadata: Vec<u8> = row.try_get("metadata").map_err(backend_err)?;

    let state = serializer.loads(&EncodedValue::from_storage_bytes(&payload)?)?;
    let metadata = serializer.loads(&EncodedValue::from_storage_bytes(&metadata)?)?;

    let mut tuple = CheckpointTuple::new(
        CheckpointConfig::new(&session_id).with_version(&version),
        Checkpoint::new(&version, state),
        metadata,
    );
    // The parent pointer always comes from the stored column, on the
    // by-version path as well as the latest path.
    if let Some(parent) = parent_version {
        tuple = tuple.with_parent_config(CheckpointConfig::new(&session_id).with_version(parent));
    }
    Ok(tuple)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_where_session_only() {
        let config = CheckpointConfig::new("s1");
        let (clause, params) = search_where(Some(&config), None);
        assert_eq!(clause, "WHERE session_id = $1");
        assert_eq!(params, vec!["s1"]);
    }

    #[test]
    fn test_search_where_session_and_before() {
        let config = CheckpointConfig::new("s1");
        let before = CheckpointConfig::new("s1").with_version("v3");
        let (clause, params) = search_where(Some(&config), Some(&before));
        assert_eq!(clause, "WHERE session_id = $1 AND version < $2");
        assert_eq!(params, vec!["s1", "v3"]);
    }

    #[test]
    fn test_search_where_unfiltered() {
        let (clause, params) = search_where(None, None);
        assert_eq!(clause, "");
        assert!(params.is_empty());
    }

    #[test]
    fn test_search_where_before_without_version_is_ignored() {
        let before = CheckpointConfig::new("s1");
        let (clause, params) = search_where(None, Some(&before));
        assert_eq!(clause, "");
        assert!(params.is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_store_rejects_operations() {
        let store = PostgresCheckpointStore::new();
        let err = store
            .get_tuple(&CheckpointConfig::new("s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidConnectionSource(_)));

        let err = store
            .put(
                &CheckpointConfig::new("s1"),
                Checkpoint::new("v1", StateValue::Null),
                StateValue::Null,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidConnectionSource(_)));
    }

    #[tokio::test]
    async fn test_filter_rejected_before_any_connection_work() {
        // Even an unconfigured store rejects the filter first: no connection
        // is touched.
        let store = PostgresCheckpointStore::new();
        let mut filter = HashMap::new();
        filter.insert("step".to_string(), serde_json::json!(3));

        let err = match store
            .list(Some(&CheckpointConfig::new("s1")), Some(filter), None, None)
            .await
        {
            Ok(_) => panic!("expected list() to reject unsupported metadata filter"),
            Err(e) => e,
        };
        assert!(matches!(err, CheckpointError::FilterNotSupported));
    }
}
