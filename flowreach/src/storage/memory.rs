use super::{
    duration_millis, error::Result, CoordinationStore, EntryKey, FlowGraphStore, LockEventStream,
};
use crate::core::{Clock, GraphKey, SystemClock};
use crate::graph::{FlowEdge, FlowGraph, FlowSlug};
use crate::lock::state::{self, AcquireDecision};
use crate::lock::{
    AcquireOutcome, LockEvent, LockKind, LockRecord, LockToken, ReleaseOutcome, StoreOutcome,
};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Capacity of each key's event channel. Slow subscribers skip missed events
/// and re-check state on their next attempt.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// In-memory flow graph store.
///
/// The graph is kept behind a single async `RwLock`, so `load_graph` always
/// observes a state between two complete writes.
#[derive(Debug, Default)]
pub struct InMemoryFlowStore {
    graph: RwLock<FlowGraph>,
}

impl InMemoryFlowStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `graph`.
    pub fn with_graph(graph: FlowGraph) -> Self {
        Self {
            graph: RwLock::new(graph),
        }
    }

    /// Adds a flow node.
    pub async fn add_flow(&self, slug: FlowSlug) -> Result<()> {
        self.graph.write().await.add_flow(slug)?;
        Ok(())
    }

    /// Adds an edge between existing flows.
    pub async fn add_edge(&self, edge: FlowEdge) -> Result<()> {
        self.graph.write().await.add_edge(edge)?;
        Ok(())
    }

    /// Replaces the whole graph.
    pub async fn replace(&self, graph: FlowGraph) {
        *self.graph.write().await = graph;
    }
}

#[async_trait]
impl FlowGraphStore for InMemoryFlowStore {
    async fn load_graph(&self) -> Result<FlowGraph> {
        Ok(self.graph.read().await.clone())
    }
}

/// Per-graph-key coordination state.
struct KeySlot {
    record: Option<LockRecord>,
    /// Last fencing token issued for the key.
    fence: u64,
    version: u64,
    events: broadcast::Sender<LockEvent>,
}

impl KeySlot {
    fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            record: None,
            fence: 0,
            version: 0,
            events,
        }
    }

    fn publish(&self, event: LockEvent) {
        // No receivers is fine: nobody is waiting.
        let _ = self.events.send(event);
    }
}

struct StoredEntry {
    bytes: Vec<u8>,
    expires_at: i64,
}

/// In-memory coordination store using DashMap for concurrent access.
///
/// Each graph key's lease, counters and event channel live in one map slot,
/// so every lease transition runs under that slot's shard lock and is atomic
/// with respect to other callers. Fenced entry writes check the holder while
/// holding the same slot lock.
///
/// This backend only coordinates tasks inside one process. Use the Redis
/// backend to coordinate multiple instances.
pub struct InMemoryCoordinationStore {
    slots: DashMap<GraphKey, KeySlot>,
    entries: DashMap<EntryKey, StoredEntry>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCoordinationStore {
    /// Creates a store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a store whose lease and entry expiry follow `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: DashMap::new(),
            entries: DashMap::new(),
            clock,
        }
    }

    /// Drops every cached entry whose TTL has passed. Returns how many were
    /// removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Purged expired reachability entries");
        }
        removed
    }

    /// Number of entries currently held, including expired ones not yet purged.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for InMemoryCoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn acquire_lease(
        &self,
        graph_key: &GraphKey,
        kind: LockKind,
        ttl: Duration,
    ) -> Result<AcquireOutcome> {
        let now = self.clock.now_millis();
        let ttl_ms = duration_millis(ttl);

        // Readers must not create a slot for an unknown key.
        if kind == LockKind::Reader && !self.slots.contains_key(graph_key) {
            return Ok(AcquireOutcome::NotFound);
        }

        let mut slot = self
            .slots
            .entry(graph_key.clone())
            .or_insert_with(KeySlot::new);

        let next = match state::decide_acquire(slot.record.as_ref(), kind, now) {
            AcquireDecision::NotFound => return Ok(AcquireOutcome::NotFound),
            AcquireDecision::AlreadyLocked => return Ok(AcquireOutcome::AlreadyLocked),
            AcquireDecision::StartRegime => {
                slot.fence += 1;
                state::start_regime(graph_key, slot.record.as_ref(), kind, slot.fence, now, ttl_ms)
            }
            AcquireDecision::JoinReaders => match slot.record.as_ref() {
                Some(record) => state::join_readers(record, now, ttl_ms),
                None => return Ok(AcquireOutcome::NotFound),
            },
        };

        let token = LockToken::new(graph_key.clone(), kind, next.holder_token);
        slot.record = Some(next.clone());
        slot.publish(LockEvent::StateChanged { record: next });
        Ok(AcquireOutcome::Acquired(token))
    }

    async fn release_lease(&self, token: &LockToken) -> Result<ReleaseOutcome> {
        let Some(mut slot) = self.slots.get_mut(&token.graph_key) else {
            return Ok(ReleaseOutcome::LockLost);
        };

        match state::release(slot.record.as_ref(), token) {
            Some(next) => {
                slot.record = Some(next.clone());
                slot.publish(LockEvent::StateChanged { record: next });
                Ok(ReleaseOutcome::Released)
            }
            None => Ok(ReleaseOutcome::LockLost),
        }
    }

    async fn is_lease_valid(&self, token: &LockToken) -> Result<bool> {
        let now = self.clock.now_millis();
        Ok(self
            .slots
            .get(&token.graph_key)
            .and_then(|slot| slot.record.as_ref().map(|r| r.is_held_by(token, now)))
            .unwrap_or(false))
    }

    async fn lock_record(&self, graph_key: &GraphKey) -> Result<Option<LockRecord>> {
        Ok(self
            .slots
            .get(graph_key)
            .and_then(|slot| slot.record.clone()))
    }

    async fn subscribe(&self, graph_key: &GraphKey) -> Result<LockEventStream> {
        let receiver = self
            .slots
            .entry(graph_key.clone())
            .or_insert_with(KeySlot::new)
            .events
            .subscribe();

        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((event, receiver)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn current_version(&self, graph_key: &GraphKey) -> Result<u64> {
        Ok(self.slots.get(graph_key).map_or(0, |slot| slot.version))
    }

    async fn bump_version(&self, graph_key: &GraphKey) -> Result<u64> {
        let mut slot = self
            .slots
            .entry(graph_key.clone())
            .or_insert_with(KeySlot::new);
        slot.version += 1;
        let version = slot.version;
        slot.publish(LockEvent::Invalidated {
            graph_key: graph_key.clone(),
            version,
        });
        Ok(version)
    }

    async fn known_graph_keys(&self) -> Result<Vec<GraphKey>> {
        // Slots created only by a subscriber have seen neither a lease nor a bump.
        let mut keys: Vec<GraphKey> = self
            .slots
            .iter()
            .filter(|slot| slot.record.is_some() || slot.version > 0)
            .map(|slot| slot.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn load_entry(&self, key: &EntryKey) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now_millis();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.bytes.clone()))
    }

    async fn store_entry(
        &self,
        token: &LockToken,
        key: &EntryKey,
        bytes: Vec<u8>,
        ttl: Duration,
    ) -> Result<StoreOutcome> {
        let now = self.clock.now_millis();

        // Hold the slot lock across the check and the write.
        let Some(slot) = self.slots.get(&token.graph_key) else {
            return Ok(StoreOutcome::LockLost);
        };
        if !state::admits_write(slot.record.as_ref(), token, now) {
            return Ok(StoreOutcome::LockLost);
        }

        self.entries.insert(
            key.clone(),
            StoredEntry {
                bytes,
                expires_at: now.saturating_add(duration_millis(ttl)),
            },
        );
        drop(slot);
        Ok(StoreOutcome::Stored)
    }

    fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }
}
