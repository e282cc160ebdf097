//! Core types and utilities for the flowreach engine.
//!
//! # Settings
//! - [`Environment`]: Opaque caller settings that edge predicates read
//! - [`GraphKey`]: Stable hash of the canonical settings, partitioning the cache
//!
//! # Predicates
//! - [`Predicate`]: Tagged And/Or/Not/Leaf guard attached to each flow edge
//! - [`Condition`]: Primitive leaf conditions over settings paths
//!
//! # Serialization
//! - [`serialize_value`] / [`deserialize_value`]: JSON encoding for stored values
//! - [`canonical_json`] / [`hash_bytes`]: Stable encoding and hashing of settings
//!
//! # Time and retries
//! - [`Clock`]: Injectable wall clock ([`SystemClock`], [`ManualClock`])
//! - [`AcquirePolicy`]: Bounds on lock acquisition retries
//!
//! # Example
//!
//! ```
//! use flowreach::core::{Environment, Predicate};
//! use serde_json::json;
//!
//! let env = Environment::new(json!({"plan": "pro"}));
//! let guard = Predicate::equals("plan", "pro");
//!
//! assert!(guard.evaluate(&env));
//! let key = env.graph_key().unwrap();
//! assert_eq!(key.as_str().len(), 16);
//! ```

mod clock;
mod environment;
mod error;
mod predicate;
pub mod retry;
mod serialization;

pub use clock::{Clock, ManualClock, SystemClock};
pub use environment::{Environment, GraphKey};
pub use error::{CoreError, Result};
pub use predicate::{Condition, Predicate};
pub use retry::AcquirePolicy;
pub use serialization::{canonical_json, deserialize_value, hash_bytes, serialize_value};
