//! Storage layer for the flowreach engine.
//!
//! This module provides two trait-based interfaces with multiple backend
//! implementations:
//!
//! - [`FlowGraphStore`]: the source of truth for flows, edges and predicates
//!   - [`InMemoryFlowStore`]: in-process graph for tests and embedding
//!   - [`SqliteFlowStore`]: relational store with connection pooling
//! - [`CoordinationStore`]: shared leases, version counters, cached entries and
//!   pub/sub wakeups
//!   - [`InMemoryCoordinationStore`]: single-process store built on DashMap and
//!     broadcast channels
//!   - [`RedisCoordinationStore`]: multi-process store built on Lua scripts and
//!     Redis pub/sub
//!
//! # Example
//!
//! ```no_run
//! use flowreach::storage::{CoordinationStore, InMemoryCoordinationStore};
//! use flowreach::core::GraphKey;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryCoordinationStore::new();
//! let version = store.bump_version(&GraphKey::from("00ff")).await?;
//! assert_eq!(version, 1);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

mod error;
mod keys;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "redis")]
pub mod redis;

pub mod memory;

// Re-export public types
pub use error::{Result, StorageError};
pub use keys::{EntryKey, KeySpace, DEFAULT_KEY_PREFIX};
pub use memory::{InMemoryCoordinationStore, InMemoryFlowStore};

#[cfg(feature = "sqlite")]
pub use sqlite::{PoolConfig, SqliteFlowStore};

#[cfg(feature = "redis")]
pub use redis::{RedisConfig, RedisCoordinationStore};

use crate::core::GraphKey;
use crate::graph::FlowGraph;
use crate::lock::{
    AcquireOutcome, LockEvent, LockKind, LockRecord, LockToken, ReleaseOutcome, StoreOutcome,
};

/// Stream of events published on one graph key's channel.
pub type LockEventStream = BoxStream<'static, LockEvent>;

/// Read access to the flow graph.
///
/// Implementations must return flows and edges from one consistent snapshot:
/// a concurrent writer may not leave an edge visible without its endpoints.
#[async_trait]
pub trait FlowGraphStore: Send + Sync {
    /// Loads every flow and edge as a validated graph.
    async fn load_graph(&self) -> Result<FlowGraph>;
}

/// Shared state the lock and cache coordinate through.
///
/// Every mutating lease operation is atomic with respect to other callers of
/// the same store, and publishes a [`LockEvent::StateChanged`] on the key's
/// channel after the transition.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Attempts to take the lease for `graph_key` in `kind` mode.
    ///
    /// Readers never create a record: a missing record yields
    /// [`AcquireOutcome::NotFound`]. Writers create it on first use.
    async fn acquire_lease(
        &self,
        graph_key: &GraphKey,
        kind: LockKind,
        ttl: Duration,
    ) -> Result<AcquireOutcome>;

    /// Gives up a lease. Returns [`ReleaseOutcome::LockLost`] if `token` is no
    /// longer the holder.
    async fn release_lease(&self, token: &LockToken) -> Result<ReleaseOutcome>;

    /// Returns true if `token` holds an unexpired lease.
    async fn is_lease_valid(&self, token: &LockToken) -> Result<bool>;

    /// Reads the current lease record, if any.
    async fn lock_record(&self, graph_key: &GraphKey) -> Result<Option<LockRecord>>;

    /// Subscribes to the key's event channel.
    ///
    /// Events published after this call returns are delivered on the stream.
    async fn subscribe(&self, graph_key: &GraphKey) -> Result<LockEventStream>;

    /// Current value of the key's version counter (0 if never bumped).
    async fn current_version(&self, graph_key: &GraphKey) -> Result<u64>;

    /// Advances the key's version counter, records the key as known and
    /// publishes [`LockEvent::Invalidated`]. Returns the new version.
    async fn bump_version(&self, graph_key: &GraphKey) -> Result<u64>;

    /// Every graph key that has been locked or invalidated.
    async fn known_graph_keys(&self) -> Result<Vec<GraphKey>>;

    /// Loads a cached entry's bytes. Expired entries read as missing.
    async fn load_entry(&self, key: &EntryKey) -> Result<Option<Vec<u8>>>;

    /// Writes a cached entry if `token` is still the unexpired writer.
    ///
    /// The holder check and the write happen atomically.
    async fn store_entry(
        &self,
        token: &LockToken,
        key: &EntryKey,
        bytes: Vec<u8>,
        ttl: Duration,
    ) -> Result<StoreOutcome>;

    /// The store's notion of the current time, in Unix milliseconds.
    ///
    /// Lease expiry is judged against this clock.
    fn now_millis(&self) -> i64;
}

pub(crate) fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
