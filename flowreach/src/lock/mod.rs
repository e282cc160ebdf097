//! Distributed reader/writer lease lock.
//!
//! One lease exists per graph key. Any number of readers may share it, or a
//! single writer may hold it alone. Leases expire after
//! [`LeaseConfig::lease_ttl`] so a crashed holder cannot wedge a key; an
//! expired lease is taken over by the next acquirer, which receives a new,
//! strictly larger fencing token. The store rejects writes and releases from
//! any token that is no longer the holder.
//!
//! Contended acquisitions wait for a state-change event on the key's channel
//! rather than polling, bounded by an [`AcquirePolicy`].
//!
//! # Example
//!
//! ```no_run
//! use flowreach::core::GraphKey;
//! use flowreach::lock::{AcquireOutcome, DistributedLock, LockKind, ReleaseOutcome};
//! use flowreach::storage::InMemoryCoordinationStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let lock = DistributedLock::new(Arc::new(InMemoryCoordinationStore::new()));
//! let key = GraphKey::from("00ff");
//!
//! // No reader can lock a key that was never written.
//! assert_eq!(lock.try_acquire_read(&key).await?, AcquireOutcome::NotFound);
//!
//! if let AcquireOutcome::Acquired(token) = lock.acquire(&key, LockKind::Writer).await? {
//!     assert_eq!(lock.try_release(&token).await?, ReleaseOutcome::Released);
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod record;
pub mod state;

pub use error::{LockError, LockResult};
pub use record::{
    AcquireOutcome, LockEvent, LockFilter, LockKind, LockRecord, LockToken, ReleaseOutcome,
    StoreOutcome,
};

use crate::core::{AcquirePolicy, GraphKey};
use crate::storage::{self, CoordinationStore, LockEventStream, StorageError};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default lease lifetime.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);

/// Lease settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// How long a lease stays valid after it is taken or joined.
    pub lease_ttl: Duration,
}

impl LeaseConfig {
    pub const fn with_lease_ttl(self, lease_ttl: Duration) -> Self {
        Self { lease_ttl }
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }
}

/// Reader/writer lease lock over a [`CoordinationStore`].
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn CoordinationStore>,
    lease: LeaseConfig,
    policy: AcquirePolicy,
}

impl DistributedLock {
    /// Creates a lock with default lease and retry settings.
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            store,
            lease: LeaseConfig::default(),
            policy: AcquirePolicy::default(),
        }
    }

    pub fn with_lease(mut self, lease: LeaseConfig) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_policy(mut self, policy: AcquirePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> AcquirePolicy {
        self.policy
    }

    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    /// Single attempt at a shared lease. Never creates a record.
    pub async fn try_acquire_read(&self, graph_key: &GraphKey) -> storage::Result<AcquireOutcome> {
        self.try_acquire(graph_key, LockKind::Reader).await
    }

    /// Single attempt at the exclusive lease. Creates the record on first use.
    pub async fn try_acquire_write(&self, graph_key: &GraphKey) -> storage::Result<AcquireOutcome> {
        self.try_acquire(graph_key, LockKind::Writer).await
    }

    async fn try_acquire(
        &self,
        graph_key: &GraphKey,
        kind: LockKind,
    ) -> storage::Result<AcquireOutcome> {
        let outcome = self
            .store
            .acquire_lease(graph_key, kind, self.lease.lease_ttl)
            .await?;
        match &outcome {
            AcquireOutcome::Acquired(token) => debug!(%token, "Lease acquired"),
            AcquireOutcome::AlreadyLocked => debug!(%graph_key, %kind, "Lease contended"),
            AcquireOutcome::NotFound => debug!(%graph_key, "No lease record"),
        }
        Ok(outcome)
    }

    /// Releases a lease.
    pub async fn try_release(&self, token: &LockToken) -> storage::Result<ReleaseOutcome> {
        let outcome = self.store.release_lease(token).await?;
        match outcome {
            ReleaseOutcome::Released => debug!(%token, "Lease released"),
            ReleaseOutcome::LockLost => warn!(%token, "Lease lost before release"),
        }
        Ok(outcome)
    }

    /// Returns true if `token` still holds an unexpired lease.
    pub async fn is_valid(&self, token: &LockToken) -> storage::Result<bool> {
        self.store.is_lease_valid(token).await
    }

    /// Waits until the key's state moves past `known_version` into a state
    /// `filter` admits, or `timeout` elapses.
    ///
    /// Subscribes before re-checking the current record, so a transition
    /// between the caller's last observation and the subscription is seen.
    pub async fn wait_for_state_change(
        &self,
        graph_key: &GraphKey,
        known_version: u64,
        filter: LockFilter,
        timeout: Duration,
    ) -> LockResult<()> {
        let mut events = self.store.subscribe(graph_key).await?;

        let current = self.store.lock_record(graph_key).await?;
        let seq = current.as_ref().map_or(0, |r| r.seq);
        let now = self.now_millis();
        if seq != known_version && filter.admits(current.as_ref(), now) {
            return Ok(());
        }

        self.await_event(&mut events, graph_key, known_version, filter, timeout)
            .await
    }

    /// Acquires a lease with bounded, event-driven retries.
    ///
    /// Returns the first non-contended outcome (for readers this may be
    /// [`AcquireOutcome::NotFound`]). Fails with [`LockError::Timeout`] once
    /// the policy's attempts are used up.
    pub async fn acquire(&self, graph_key: &GraphKey, kind: LockKind) -> LockResult<AcquireOutcome> {
        let attempts = self.policy.attempts();
        let filter = LockFilter::for_kind(kind);

        for attempt in 1..=attempts {
            let outcome = self.try_acquire(graph_key, kind).await?;
            if outcome != AcquireOutcome::AlreadyLocked {
                return Ok(outcome);
            }
            if self.policy.is_last_attempt(attempt) {
                break;
            }

            let known = self
                .store
                .lock_record(graph_key)
                .await?
                .map_or(0, |r| r.seq);
            let mut events = self.store.subscribe(graph_key).await?;

            // The holder may have released between the failed try and the
            // subscription.
            let outcome = self.try_acquire(graph_key, kind).await?;
            if outcome != AcquireOutcome::AlreadyLocked {
                return Ok(outcome);
            }

            debug!(%graph_key, %kind, attempt, "Waiting for lease state change");
            self.await_event(&mut events, graph_key, known, filter, self.policy.wait_timeout)
                .await?;
        }

        warn!(%graph_key, %kind, attempts, "Lease acquisition exhausted");
        Err(LockError::Timeout {
            graph_key: graph_key.clone(),
            attempts,
        })
    }

    async fn await_event(
        &self,
        events: &mut LockEventStream,
        graph_key: &GraphKey,
        known_version: u64,
        filter: LockFilter,
        timeout: Duration,
    ) -> LockResult<()> {
        let wait = async {
            while let Some(event) = events.next().await {
                if let LockEvent::StateChanged { record } = event {
                    if record.seq > known_version && filter.admits(Some(&record), self.now_millis())
                    {
                        return Ok(());
                    }
                }
            }
            Err(LockError::Storage(StorageError::SubscriptionClosed {
                channel: graph_key.to_string(),
            }))
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(LockError::Timeout {
                graph_key: graph_key.clone(),
                attempts: 1,
            }),
        }
    }

    fn now_millis(&self) -> i64 {
        self.store.now_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::storage::InMemoryCoordinationStore;

    fn key() -> GraphKey {
        GraphKey::from("00000000000000aa")
    }

    fn fast_policy() -> AcquirePolicy {
        AcquirePolicy::STANDARD.with_wait_timeout(Duration::from_millis(50))
    }

    fn lock_with_clock() -> (DistributedLock, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(InMemoryCoordinationStore::with_clock(clock.clone()));
        (DistributedLock::new(store).with_policy(fast_policy()), clock)
    }

    async fn write_token(lock: &DistributedLock) -> LockToken {
        lock.try_acquire_write(&key())
            .await
            .unwrap()
            .token()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn test_readers_share_writers_exclude() {
        let (lock, _) = lock_with_clock();
        let w = write_token(&lock).await;
        lock.try_release(&w).await.unwrap();

        let r1 = lock.try_acquire_read(&key()).await.unwrap();
        let r2 = lock.try_acquire_read(&key()).await.unwrap();
        assert_eq!(r1.token(), r2.token());
        assert_eq!(
            lock.try_acquire_write(&key()).await.unwrap(),
            AcquireOutcome::AlreadyLocked
        );
    }

    #[tokio::test]
    async fn test_acquire_times_out_under_held_writer() {
        let (lock, _) = lock_with_clock();
        let _held = write_token(&lock).await;

        let err = lock.acquire(&key(), LockKind::Writer).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_acquire_wakes_on_release() {
        let (lock, _) = lock_with_clock();
        let lock = lock.with_policy(AcquirePolicy::STANDARD.with_wait_timeout(Duration::from_secs(5)));
        let held = write_token(&lock).await;

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.acquire(&key(), LockKind::Reader).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        lock.try_release(&held).await.unwrap();

        let outcome = waiter.await.unwrap().unwrap();
        assert!(matches!(outcome, AcquireOutcome::Acquired(t) if t.kind == LockKind::Reader));
    }

    #[tokio::test]
    async fn test_expired_lease_is_taken_over() {
        let (lock, clock) = lock_with_clock();
        let x = write_token(&lock).await;

        clock.advance(DEFAULT_LEASE_TTL);
        assert!(!lock.is_valid(&x).await.unwrap());

        let y = write_token(&lock).await;
        assert!(y.token > x.token);
        assert_eq!(lock.try_release(&x).await.unwrap(), ReleaseOutcome::LockLost);
        assert_eq!(lock.try_release(&y).await.unwrap(), ReleaseOutcome::Released);
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_state_already_moved() {
        let (lock, _) = lock_with_clock();
        let w = write_token(&lock).await;
        let seen = lock.store().lock_record(&key()).await.unwrap().unwrap().seq;
        lock.try_release(&w).await.unwrap();

        lock.wait_for_state_change(&key(), seen, LockFilter::WriterLockable, Duration::from_millis(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_times_out_without_events() {
        let (lock, _) = lock_with_clock();
        let _w = write_token(&lock).await;
        let seen = lock.store().lock_record(&key()).await.unwrap().unwrap().seq;

        let err = lock
            .wait_for_state_change(&key(), seen, LockFilter::ReaderLockable, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
