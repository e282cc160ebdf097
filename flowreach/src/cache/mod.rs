//! Versioned reachability cache.
//!
//! Entries are keyed by (graph key, source, direction) and hold every path
//! from the source up to the depth they were filled with. Reads need a held
//! lease token of either kind; fills need the writer token and are written
//! with a fenced store operation, so a writer whose lease expired mid-fill
//! cannot overwrite a newer holder's data.
//!
//! An entry is usable only while its version stamp equals the key's current
//! version counter (see [`Invalidator`]) and it covers the requested depth.
//! Anything else reads as not initialized, which tells the caller to take
//! the write lease and fill.

mod entry;
mod error;
mod invalidator;

pub use entry::{PathPage, PathsSummary, ReachabilityEntry, TargetsPage};
pub use error::{CacheError, CacheResult};
pub use invalidator::Invalidator;

use crate::core::{deserialize_value, serialize_value, Environment};
use crate::graph::{Direction, FlowSlug, ReachabilityComputer};
use crate::lock::{LockToken, StoreOutcome};
use crate::storage::{CoordinationStore, EntryKey, FlowGraphStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Depth used when the caller does not ask for one, and the minimum depth
/// every entry is filled with.
pub const DEFAULT_MAX_STEPS: usize = 4;

/// Upper bound on any requested depth.
pub const MAX_STEPS_LIMIT: usize = 8;

/// Targets returned per page.
pub const DEFAULT_TARGETS_PAGE_SIZE: usize = 50;

/// Lifetime of an idle entry.
pub const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache sizing and depth settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub default_max_steps: usize,
    pub max_steps_limit: usize,
    pub targets_page_size: usize,
    pub entry_ttl: Duration,
}

impl CacheConfig {
    pub const fn with_default_max_steps(self, default_max_steps: usize) -> Self {
        Self {
            default_max_steps,
            ..self
        }
    }

    pub const fn with_max_steps_limit(self, max_steps_limit: usize) -> Self {
        Self {
            max_steps_limit,
            ..self
        }
    }

    pub const fn with_targets_page_size(self, targets_page_size: usize) -> Self {
        Self {
            targets_page_size,
            ..self
        }
    }

    pub const fn with_entry_ttl(self, entry_ttl: Duration) -> Self {
        Self { entry_ttl, ..self }
    }

    /// Depth a read is answered with.
    pub fn requested_steps(&self, max_steps: Option<usize>) -> usize {
        max_steps
            .unwrap_or(self.default_max_steps)
            .min(self.max_steps_limit)
    }

    /// Depth an entry is filled with for a given request.
    pub fn fill_steps(&self, max_steps: Option<usize>) -> usize {
        self.requested_steps(max_steps)
            .max(self.default_max_steps)
            .min(self.max_steps_limit)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_max_steps: DEFAULT_MAX_STEPS,
            max_steps_limit: MAX_STEPS_LIMIT,
            targets_page_size: DEFAULT_TARGETS_PAGE_SIZE,
            entry_ttl: DEFAULT_ENTRY_TTL,
        }
    }
}

/// Result of [`ReachabilityCache::read_targets_page`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetsRead {
    Page(TargetsPage),
    LockLost,
    /// No usable entry for the current version; fill under a write lease.
    NotInitialized,
}

/// Result of [`ReachabilityCache::read_paths_page`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathsRead {
    Page(PathPage),
    /// The entry is current and holds no path to the target within the bound.
    NoPaths,
    LockLost,
    /// No usable entry for the current version; fill under a write lease.
    NotFound,
}

/// Result of [`ReachabilityCache::fill_from_db`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    Filled,
    LockLost,
}

/// Reads and fills cached reachability entries.
#[derive(Clone)]
pub struct ReachabilityCache {
    store: Arc<dyn CoordinationStore>,
    flows: Arc<dyn FlowGraphStore>,
    computer: ReachabilityComputer,
    config: CacheConfig,
}

impl ReachabilityCache {
    pub fn new(store: Arc<dyn CoordinationStore>, flows: Arc<dyn FlowGraphStore>) -> Self {
        Self {
            store,
            flows,
            computer: ReachabilityComputer::new(),
            config: CacheConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Lists reachable targets in slug order, starting after `cursor`.
    pub async fn read_targets_page(
        &self,
        token: &LockToken,
        source: &FlowSlug,
        inverted: bool,
        max_steps: Option<usize>,
        cursor: Option<&FlowSlug>,
    ) -> CacheResult<TargetsRead> {
        if !self.store.is_lease_valid(token).await? {
            return Ok(TargetsRead::LockLost);
        }

        let steps = self.config.requested_steps(max_steps);
        let Some(entry) = self.load_current(token, source, inverted, steps).await? else {
            return Ok(TargetsRead::NotInitialized);
        };

        let page_size = self.config.targets_page_size.max(1);
        let mut remaining = entry
            .summaries(steps)
            .into_iter()
            .filter(|(target, _)| cursor.map_or(true, |c| target > c))
            .peekable();

        let mut items = std::collections::BTreeMap::new();
        while items.len() < page_size {
            match remaining.next() {
                Some((target, summary)) => {
                    items.insert(target, summary);
                }
                None => break,
            }
        }
        let next_cursor = if remaining.peek().is_some() {
            items.keys().next_back().cloned()
        } else {
            None
        };

        debug!(
            graph_key = %token.graph_key,
            %source,
            inverted,
            targets = items.len(),
            "Targets cache hit"
        );
        Ok(TargetsRead::Page(TargetsPage { items, next_cursor }))
    }

    /// Reads one page of paths from `source` to `target`.
    ///
    /// Paths are returned in natural orientation; callers present them.
    #[allow(clippy::too_many_arguments)]
    pub async fn read_paths_page(
        &self,
        token: &LockToken,
        source: &FlowSlug,
        target: &FlowSlug,
        inverted: bool,
        max_steps: Option<usize>,
        offset: usize,
        limit: usize,
    ) -> CacheResult<PathsRead> {
        if !self.store.is_lease_valid(token).await? {
            return Ok(PathsRead::LockLost);
        }

        let steps = self.config.requested_steps(max_steps);
        let Some(entry) = self.load_current(token, source, inverted, steps).await? else {
            return Ok(PathsRead::NotFound);
        };

        let paths = entry.paths_within(target, steps);
        if paths.is_empty() {
            debug!(graph_key = %token.graph_key, %source, %target, inverted, "No paths");
            return Ok(PathsRead::NoPaths);
        }

        let page = PathPage::slice(paths, offset, limit);
        debug!(
            graph_key = %token.graph_key,
            %source,
            %target,
            inverted,
            offset,
            returned = page.paths.len(),
            total = paths.len(),
            "Paths cache hit"
        );
        Ok(PathsRead::Page(page))
    }

    /// Computes every path from `source` and stores it under the writer lease.
    ///
    /// `env` must be the settings `token.graph_key` was derived from.
    pub async fn fill_from_db(
        &self,
        token: &LockToken,
        env: &Environment,
        source: &FlowSlug,
        inverted: bool,
        max_steps: Option<usize>,
    ) -> CacheResult<FillOutcome> {
        let actual = env.graph_key()?;
        if actual != token.graph_key {
            return Err(CacheError::KeyMismatch {
                expected: token.graph_key.clone(),
                actual,
            });
        }
        if !token.is_writer() || !self.store.is_lease_valid(token).await? {
            warn!(%token, "Fill refused: not the current writer");
            return Ok(FillOutcome::LockLost);
        }

        let steps = self.config.fill_steps(max_steps);
        // Stamp with the version observed before loading, so an invalidation
        // racing with the fill leaves the new entry stale.
        let version = self.store.current_version(&token.graph_key).await?;
        let graph = self.flows.load_graph().await?;
        let targets = self.computer.compute(
            &graph,
            env,
            source,
            Direction::from_inverted(inverted),
            steps,
        )?;

        let entry = ReachabilityEntry {
            graph_key: token.graph_key.clone(),
            source: source.clone(),
            inverted,
            version,
            max_steps: steps,
            targets,
        };
        let bytes = serialize_value(&entry)?;
        let key = EntryKey::new(token.graph_key.clone(), source.clone(), inverted);

        match self
            .store
            .store_entry(token, &key, bytes, self.config.entry_ttl)
            .await?
        {
            StoreOutcome::Stored => {
                info!(
                    graph_key = %token.graph_key,
                    %source,
                    inverted,
                    version,
                    max_steps = steps,
                    targets = entry.targets.len(),
                    "Filled reachability cache"
                );
                Ok(FillOutcome::Filled)
            }
            StoreOutcome::LockLost => {
                warn!(%token, "Fill rejected by fencing check");
                Ok(FillOutcome::LockLost)
            }
        }
    }

    /// Loads the raw entry, current or not.
    pub async fn load_entry(
        &self,
        token: &LockToken,
        source: &FlowSlug,
        inverted: bool,
    ) -> CacheResult<Option<ReachabilityEntry>> {
        let key = EntryKey::new(token.graph_key.clone(), source.clone(), inverted);
        match self.store.load_entry(&key).await? {
            Some(bytes) => Ok(Some(deserialize_value(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn load_current(
        &self,
        token: &LockToken,
        source: &FlowSlug,
        inverted: bool,
        steps: usize,
    ) -> CacheResult<Option<ReachabilityEntry>> {
        let version = self.store.current_version(&token.graph_key).await?;
        let entry = self.load_entry(token, source, inverted).await?;
        Ok(entry.filter(|e| e.is_current(version, steps)))
    }
}
