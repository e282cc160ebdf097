//! flowreach: Reachability Analysis over Conditional Flow Graphs
//!
//! `flowreach` answers "what can a user reach from flow X" over a directed
//! graph of client flows whose edges are gated by predicates on caller
//! settings, and enumerates the concrete transition paths between two flows.
//! Every distinct settings object yields its own graph view, so computed
//! results are cached per view and shared between instances.
//!
//! # Features
//!
//! - **Predicate-gated edges**: And/Or/Not/Leaf guards evaluated against opaque JSON settings
//! - **Bounded path enumeration**: all simple paths up to a depth, deterministically ordered
//! - **Natural and inverted queries**: from one stored edge set
//! - **Shared cache**: versioned entries with explicit invalidation and TTL collection
//! - **Reader/writer lease lock**: fencing tokens, crash tolerance, event-driven waits
//! - **Load shedding**: contention past a small bound becomes one retryable response
//!
//! # Quick Start
//!
//! ```no_run
//! use flowreach::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let flows = Arc::new(InMemoryFlowStore::new());
//!     for slug in ["welcome", "signup", "dashboard"] {
//!         flows.add_flow(FlowSlug::new(slug)).await?;
//!     }
//!     flows.add_edge(FlowEdge::unconditional(FlowSlug::new("welcome"), FlowSlug::new("signup"))).await?;
//!     flows.add_edge(FlowEdge::new(
//!         FlowSlug::new("signup"),
//!         FlowSlug::new("dashboard"),
//!         Predicate::truthy("features.onboarding"),
//!     )).await?;
//!
//!     let coordinator = RequestCoordinator::new(Arc::new(InMemoryCoordinationStore::new()), flows);
//!     let settings = Environment::new(json!({"features": {"onboarding": true}}));
//!
//!     let outcome = coordinator
//!         .analyze_reachable(AnalyzeRequest::targets(settings, FlowSlug::new("welcome")))
//!         .await?;
//!     if let AnalyzeOutcome::Items(response) = outcome {
//!         for (target, item) in &response.items {
//!             println!("{}: {}", target, item.paths[0]);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! Following Parnas's information hiding principles, each module hides specific design
//! decisions that are likely to change:
//!
//! - [`core`]: Settings, predicates, clock and retry bounds (hides hashing and encoding)
//! - [`graph`]: Flow graph and traversal (hides graph representation)
//! - [`storage`]: Flow store and coordination store backends (hides database choice and key layout)
//! - [`lock`]: Lease lock protocol (hides transition rules and wakeup mechanism)
//! - [`cache`]: Versioned reachability entries (hides entry format and invalidation)
//! - [`coordinator`]: Per-request protocol (hides lock escalation and fill ordering)
//!
//! # Design Principles
//!
//! This library follows Dave Cheney's practical programming wisdom:
//! - **Simplicity**: Simple, focused APIs that do one thing well
//! - **Clarity**: Explicit over implicit, readable over clever
//! - **Safety**: Hard to misuse, defaults prevent common mistakes

pub mod cache;
pub mod coordinator;
pub mod core;
pub mod graph;
pub mod lock;
pub mod storage;

// Re-export commonly used types for convenience
pub use core::{
    AcquirePolicy, Clock, CoreError, Environment, GraphKey, ManualClock, Predicate,
    Result as CoreResult, SystemClock,
};

pub use graph::{Direction, FlowEdge, FlowGraph, FlowPath, FlowSlug, GraphError, GraphResult};

pub use lock::{
    AcquireOutcome, DistributedLock, LeaseConfig, LockError, LockKind, LockToken, ReleaseOutcome,
};

pub use cache::{CacheConfig, CacheError, Invalidator, ReachabilityCache, ReachabilityEntry};

pub use coordinator::{
    AnalyzeOutcome, AnalyzeRequest, AnalyzeResponse, CoordinatorConfig, CoordinatorError,
    PathsItem, RequestCoordinator,
};

pub use storage::{
    CoordinationStore, FlowGraphStore, InMemoryCoordinationStore, InMemoryFlowStore,
    Result as StorageResult, StorageError,
};

#[cfg(feature = "sqlite")]
pub use storage::{PoolConfig, SqliteFlowStore};

#[cfg(feature = "redis")]
pub use storage::{RedisConfig, RedisCoordinationStore};

// Re-export dependencies used in public API
// This ensures users don't have version mismatch errors (Effective Rust Item 24)
pub use serde_json; // Users build Environment values from JSON
pub use tokio;

/// Prelude module for convenient glob imports
///
/// # Example
///
/// ```
/// use flowreach::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        AcquirePolicy, Clock, CoreError, Environment, GraphKey, ManualClock, Predicate,
        SystemClock,
    };

    pub use crate::graph::{Direction, FlowEdge, FlowGraph, FlowPath, FlowSlug, GraphError};

    pub use crate::lock::{DistributedLock, LeaseConfig, LockError, LockKind, LockToken};

    pub use crate::cache::{CacheConfig, CacheError, Invalidator, ReachabilityCache};

    pub use crate::coordinator::{
        AnalyzeOutcome, AnalyzeRequest, AnalyzeResponse, CoordinatorConfig, CoordinatorError,
        PathsItem, RequestCoordinator,
    };

    pub use crate::storage::{
        CoordinationStore, FlowGraphStore, InMemoryCoordinationStore, InMemoryFlowStore,
        StorageError,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::storage::SqliteFlowStore;

    #[cfg(feature = "redis")]
    pub use crate::storage::RedisCoordinationStore;

    pub use std::sync::Arc;
}
