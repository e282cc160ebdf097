//! Request coordination: locking, cache reads and fills for one query.
//!
//! Each request runs the same protocol:
//!
//! 1. Take a shared lease and read the cache. A hit is returned after the
//!    lease is released.
//! 2. On a miss (or when the key has never been written), release and take
//!    the exclusive lease.
//! 3. Re-check the cache: another instance may have filled it meanwhile.
//! 4. Fill from the flow store if still missing, read again, release.
//!
//! Contention past the acquire policy, any lost lease and an invalidation
//! landing mid-fill turn the whole request into a single
//! [`AnalyzeOutcome::ShedLoad`]. Partial results are
//! never returned.

mod error;
mod request;

pub use error::{CoordinatorError, CoordinatorResult};
pub use request::{AnalyzeOutcome, AnalyzeRequest, AnalyzeResponse, PathsItem};

use crate::cache::{
    CacheConfig, FillOutcome, Invalidator, PathsRead, ReachabilityCache, TargetsRead,
};
use crate::core::{AcquirePolicy, GraphKey};
use crate::graph::FlowPath;
use crate::lock::{
    AcquireOutcome, DistributedLock, LeaseConfig, LockError, LockKind, LockToken, ReleaseOutcome,
};
use crate::storage::{CoordinationStore, FlowGraphStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info_span, warn, Instrument};

/// Suggested client back-off after a shed-load response.
pub const DEFAULT_SHED_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Paths per page when the request does not say.
pub const DEFAULT_LIMIT_PATHS: usize = 10;

/// Coordinator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub acquire: AcquirePolicy,
    pub shed_retry_after: Duration,
    pub default_limit_paths: usize,
}

impl CoordinatorConfig {
    pub const fn with_acquire(self, acquire: AcquirePolicy) -> Self {
        Self { acquire, ..self }
    }

    pub const fn with_shed_retry_after(self, shed_retry_after: Duration) -> Self {
        Self {
            shed_retry_after,
            ..self
        }
    }

    pub const fn with_default_limit_paths(self, default_limit_paths: usize) -> Self {
        Self {
            default_limit_paths,
            ..self
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            acquire: AcquirePolicy::default(),
            shed_retry_after: DEFAULT_SHED_RETRY_AFTER,
            default_limit_paths: DEFAULT_LIMIT_PATHS,
        }
    }
}

/// What a cache read under some lease produced.
enum Read {
    Hit(AnalyzeOutcome),
    Miss,
    LockLost,
}

/// Runs reachability queries against the shared cache.
#[derive(Clone)]
pub struct RequestCoordinator {
    lock: DistributedLock,
    cache: ReachabilityCache,
    invalidator: Invalidator,
    config: CoordinatorConfig,
}

impl RequestCoordinator {
    /// Builds a coordinator with default lease, cache and retry settings.
    pub fn new(store: Arc<dyn CoordinationStore>, flows: Arc<dyn FlowGraphStore>) -> Self {
        let config = CoordinatorConfig::default();
        Self {
            lock: DistributedLock::new(store.clone()).with_policy(config.acquire),
            cache: ReachabilityCache::new(store.clone(), flows),
            invalidator: Invalidator::new(store),
            config,
        }
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.lock = self.lock.with_policy(config.acquire);
        self.config = config;
        self
    }

    pub fn with_lease(mut self, lease: LeaseConfig) -> Self {
        self.lock = self.lock.with_lease(lease);
        self
    }

    pub fn with_cache_config(mut self, config: CacheConfig) -> Self {
        self.cache = self.cache.with_config(config);
        self
    }

    pub fn lock(&self) -> &DistributedLock {
        &self.lock
    }

    pub fn cache(&self) -> &ReachabilityCache {
        &self.cache
    }

    pub fn invalidator(&self) -> &Invalidator {
        &self.invalidator
    }

    /// Answers one reachability query.
    pub async fn analyze_reachable(
        &self,
        request: AnalyzeRequest,
    ) -> CoordinatorResult<AnalyzeOutcome> {
        let graph_key = request.settings.graph_key()?;
        let span = info_span!(
            "analyze_reachable",
            graph_key = %graph_key,
            source = %request.source,
            target = request.target.as_ref().map(|t| t.as_str()),
            inverted = request.inverted,
        );

        async move {
            let outcome = self.run(&graph_key, &request).await?;
            if outcome.is_shed() {
                warn!("Shedding load");
            }
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        graph_key: &GraphKey,
        request: &AnalyzeRequest,
    ) -> CoordinatorResult<AnalyzeOutcome> {
        // Read phase.
        match self.lock.acquire(graph_key, LockKind::Reader).await {
            Ok(AcquireOutcome::Acquired(token)) => {
                let read = self.read(&token, request).await;
                match self.release_on_error(&token, read).await? {
                    Read::Hit(outcome) => return self.finish(&token, outcome).await,
                    Read::LockLost => return Ok(self.shed()),
                    Read::Miss => {
                        debug!("Cache miss, escalating to write lease");
                        if self.lock.try_release(&token).await? == ReleaseOutcome::LockLost {
                            return Ok(self.shed());
                        }
                    }
                }
            }
            Ok(AcquireOutcome::NotFound) => debug!("No lease record, escalating to write lease"),
            Ok(AcquireOutcome::AlreadyLocked) => return Ok(self.shed()),
            Err(e) => return self.lock_failure(e),
        }

        // Write phase.
        let token = match self.lock.acquire(graph_key, LockKind::Writer).await {
            Ok(AcquireOutcome::Acquired(token)) => token,
            Ok(_) => return Ok(self.shed()),
            Err(e) => return self.lock_failure(e),
        };

        // Another instance may have filled while we waited for the lease.
        let read = self.read(&token, request).await;
        match self.release_on_error(&token, read).await? {
            Read::Hit(outcome) => return self.finish(&token, outcome).await,
            Read::LockLost => return Ok(self.shed()),
            Read::Miss => {}
        }

        let filled = self
            .cache
            .fill_from_db(
                &token,
                &request.settings,
                &request.source,
                request.inverted,
                request.max_steps,
            )
            .await
            .map_err(CoordinatorError::from);
        if self.release_on_error(&token, filled).await? == FillOutcome::LockLost {
            return Ok(self.shed());
        }

        let read = self.read(&token, request).await;
        match self.release_on_error(&token, read).await? {
            Read::Hit(outcome) => self.finish(&token, outcome).await,
            Read::LockLost => Ok(self.shed()),
            Read::Miss => {
                // The version moved while filling; the entry was stamped stale.
                debug!("Invalidated during fill, shedding");
                self.finish(&token, self.shed()).await
            }
        }
    }

    /// Reads whichever view the request asks for.
    async fn read(&self, token: &LockToken, request: &AnalyzeRequest) -> CoordinatorResult<Read> {
        match &request.target {
            None => {
                let read = self
                    .cache
                    .read_targets_page(
                        token,
                        &request.source,
                        request.inverted,
                        request.max_steps,
                        request.targets_cursor.as_ref(),
                    )
                    .await?;
                Ok(match read {
                    TargetsRead::Page(page) => {
                        let items = page
                            .items
                            .into_iter()
                            .map(|(target, summary)| {
                                let item = PathsItem {
                                    source: request.source.clone(),
                                    target: target.clone(),
                                    paths: vec![present(summary.first_path, request.inverted)],
                                    offset: 0,
                                    next_offset: (summary.total_count > 1).then_some(1),
                                };
                                (target, item)
                            })
                            .collect::<BTreeMap<_, _>>();
                        Read::Hit(AnalyzeOutcome::Items(AnalyzeResponse {
                            items,
                            next_targets_cursor: page.next_cursor,
                        }))
                    }
                    TargetsRead::LockLost => Read::LockLost,
                    TargetsRead::NotInitialized => Read::Miss,
                })
            }
            Some(target) => {
                let limit = request
                    .limit_paths
                    .unwrap_or(self.config.default_limit_paths);
                let read = self
                    .cache
                    .read_paths_page(
                        token,
                        &request.source,
                        target,
                        request.inverted,
                        request.max_steps,
                        request.offset_paths,
                        limit,
                    )
                    .await?;
                Ok(match read {
                    PathsRead::Page(page) => {
                        let next_offset = page.next_offset();
                        let item = PathsItem {
                            source: request.source.clone(),
                            target: target.clone(),
                            paths: page
                                .paths
                                .into_iter()
                                .map(|p| present(p, request.inverted))
                                .collect(),
                            offset: page.offset,
                            next_offset,
                        };
                        Read::Hit(AnalyzeOutcome::Items(AnalyzeResponse {
                            items: BTreeMap::from([(target.clone(), item)]),
                            next_targets_cursor: None,
                        }))
                    }
                    PathsRead::NoPaths => Read::Hit(AnalyzeOutcome::NoContent),
                    PathsRead::LockLost => Read::LockLost,
                    PathsRead::NotFound => Read::Miss,
                })
            }
        }
    }

    /// Releases the lease and returns `outcome`, or sheds if the lease was
    /// lost before release.
    async fn finish(
        &self,
        token: &LockToken,
        outcome: AnalyzeOutcome,
    ) -> CoordinatorResult<AnalyzeOutcome> {
        match self.lock.try_release(token).await? {
            ReleaseOutcome::Released => Ok(outcome),
            ReleaseOutcome::LockLost => Ok(self.shed()),
        }
    }

    /// Passes `result` through, releasing the lease first if it is an error.
    async fn release_on_error<T>(
        &self,
        token: &LockToken,
        result: CoordinatorResult<T>,
    ) -> CoordinatorResult<T> {
        if result.is_err() {
            self.release_best_effort(token).await;
        }
        result
    }

    async fn release_best_effort(&self, token: &LockToken) {
        if let Err(e) = self.lock.try_release(token).await {
            warn!(%token, error = %e, "Failed to release lease after error");
        }
    }

    fn lock_failure(&self, error: LockError) -> CoordinatorResult<AnalyzeOutcome> {
        match error {
            LockError::Timeout { .. } => Ok(self.shed()),
            LockError::Storage(e) => Err(CoordinatorError::Storage(e)),
        }
    }

    fn shed(&self) -> AnalyzeOutcome {
        AnalyzeOutcome::ShedLoad {
            retry_after: self.config.shed_retry_after,
        }
    }
}

/// Orients a stored path from the declared source to the declared target.
fn present(path: FlowPath, inverted: bool) -> FlowPath {
    if inverted {
        path.reversed()
    } else {
        path
    }
}
