use super::{error::Result, error::StorageError, FlowGraphStore};
use crate::core::{deserialize_value, serialize_value, Predicate};
use crate::graph::{FlowEdge, FlowGraph, FlowSlug};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default pool size for SQLite connection pool.
const DEFAULT_POOL_SIZE: u32 = 10;

/// Default connection timeout in seconds.
const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Configuration for the SQLite connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_size: u32,
    /// Minimum number of idle connections to maintain.
    pub min_idle: Option<u32>,
    /// Maximum time to wait for a connection from the pool.
    pub connection_timeout: Duration,
    /// Maximum lifetime of a connection.
    pub max_lifetime: Option<Duration>,
    /// Idle timeout for connections.
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_POOL_SIZE,
            min_idle: Some(2),
            connection_timeout: Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS),
            max_lifetime: None,
            idle_timeout: Some(Duration::from_secs(600)), // 10 minutes
        }
    }
}

/// SQLite-backed flow graph store with connection pooling.
///
/// Flows live in `client_flows` and edges in `client_flow_edges`, with each
/// edge predicate stored as JSON text. [`load_graph`](FlowGraphStore::load_graph)
/// reads both tables inside one transaction, which in WAL mode gives a
/// consistent snapshot even while another connection is writing.
pub struct SqliteFlowStore {
    pool: SqlitePool,
    db_path: String,
}

impl SqliteFlowStore {
    /// Opens (or creates) a store at the specified database path.
    ///
    /// Uses default pool configuration.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(db_path, PoolConfig::default()).await
    }

    /// Opens a store with custom pool configuration.
    pub async fn with_config(db_path: impl AsRef<Path>, config: PoolConfig) -> Result<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        let connect_options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path_str))
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = Self::build_pool(connect_options, &config).await?;

        let store = Self {
            pool,
            db_path: db_path_str,
        };

        store.initialize().await?;

        Ok(store)
    }

    /// Creates an in-memory store.
    ///
    /// In-memory databases are private to one connection, so the pool is
    /// pinned to a single connection.
    pub async fn in_memory() -> Result<Self> {
        let config = PoolConfig {
            max_size: 1,
            min_idle: Some(0),
            ..PoolConfig::default()
        };

        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .journal_mode(SqliteJournalMode::Memory)
            .synchronous(SqliteSynchronous::Normal);

        let pool = Self::build_pool(connect_options, &config).await?;

        let store = Self {
            pool,
            db_path: ":memory:".to_string(),
        };

        store.initialize().await?;

        Ok(store)
    }

    /// Builds the connection pool with the given configuration.
    async fn build_pool(
        connect_options: SqliteConnectOptions,
        config: &PoolConfig,
    ) -> Result<Pool<Sqlite>> {
        let mut builder = SqlitePoolOptions::new()
            .max_connections(config.max_size)
            .acquire_timeout(config.connection_timeout);

        if let Some(min_idle) = config.min_idle {
            builder = builder.min_connections(min_idle);
        }

        if let Some(max_lifetime) = config.max_lifetime {
            builder = builder.max_lifetime(max_lifetime);
        }

        if let Some(idle_timeout) = config.idle_timeout {
            builder = builder.idle_timeout(idle_timeout);
        }

        let pool = builder
            .connect_with(connect_options)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(pool)
    }

    /// Creates the schema if it does not exist yet.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS client_flows (
                slug TEXT PRIMARY KEY NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS client_flow_edges (
                source TEXT NOT NULL REFERENCES client_flows(slug),
                target TEXT NOT NULL REFERENCES client_flows(slug),
                predicate TEXT NOT NULL,
                PRIMARY KEY (source, target)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_client_flow_edges_target ON client_flow_edges(target)",
        )
        .execute(&self.pool)
        .await?;

        debug!(path = %self.db_path, "Initialized flow graph schema");
        Ok(())
    }

    /// Returns the database path this store was opened on.
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Inserts a flow; inserting an existing slug is a no-op.
    pub async fn insert_flow(&self, slug: &FlowSlug) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO client_flows (slug) VALUES (?)")
            .bind(slug.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Inserts or replaces the edge between `edge.source` and `edge.target`.
    ///
    /// Self-loops and malformed predicate paths are rejected before anything
    /// is written.
    pub async fn upsert_edge(&self, edge: &FlowEdge) -> Result<()> {
        edge.validate()?;
        let predicate = serialize_value(&edge.predicate)?;
        let predicate = String::from_utf8(predicate)
            .map_err(|e| StorageError::corrupt("client_flow_edges", e.to_string()))?;

        sqlx::query(
            "INSERT INTO client_flow_edges (source, target, predicate) VALUES (?, ?, ?)
             ON CONFLICT(source, target) DO UPDATE SET predicate = excluded.predicate",
        )
        .bind(edge.source.as_str())
        .bind(edge.target.as_str())
        .bind(predicate)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deletes every flow and edge.
    pub async fn reset(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM client_flow_edges")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM client_flows")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!("Reset flow graph store");
        Ok(())
    }

    /// Closes the connection pool.
    pub async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

fn parse_slug(raw: String, table: &str) -> Result<FlowSlug> {
    FlowSlug::parse(raw).map_err(|e| StorageError::corrupt(table, e.to_string()))
}

#[async_trait]
impl FlowGraphStore for SqliteFlowStore {
    async fn load_graph(&self) -> Result<FlowGraph> {
        let mut tx = self.pool.begin().await?;

        let flow_rows = sqlx::query("SELECT slug FROM client_flows ORDER BY slug")
            .fetch_all(&mut *tx)
            .await?;
        let edge_rows = sqlx::query(
            "SELECT source, target, predicate FROM client_flow_edges ORDER BY source, target",
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let flows = flow_rows
            .into_iter()
            .map(|row| parse_slug(row.get("slug"), "client_flows"))
            .collect::<Result<Vec<_>>>()?;

        let mut edges = Vec::with_capacity(edge_rows.len());
        for row in edge_rows {
            let predicate: String = row.get("predicate");
            let predicate: Predicate = deserialize_value(predicate.as_bytes())?;
            let edge = FlowEdge::new(
                parse_slug(row.get("source"), "client_flow_edges")?,
                parse_slug(row.get("target"), "client_flow_edges")?,
                predicate,
            );
            // Rows written by other tools skip upsert_edge validation.
            if let Err(e) = edge.validate() {
                warn!(error = %e, "Skipping invalid flow edge row");
                continue;
            }
            edges.push(edge);
        }

        debug!(
            flows = flows.len(),
            edges = edges.len(),
            "Loaded flow graph snapshot"
        );
        Ok(FlowGraph::from_parts(flows, edges)?)
    }
}
