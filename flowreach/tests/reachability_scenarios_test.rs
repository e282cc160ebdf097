//! End-to-end reachability scenarios
//!
//! These tests drive the full request protocol against the in-memory
//! backends and verify that:
//! 1. Forward and inverted queries return paths oriented from the declared source
//! 2. Lease expiry hands the lock to a new holder and the old one sees lock_lost
//! 3. Pagination, invalidation and idempotent fills behave as documented
//! 4. Contention and missing paths map to ShedLoad and NoContent
//! 5. An invalidation landing mid-fill sheds instead of failing the request

use flowreach::cache::{FillOutcome, PathsRead};
use flowreach::coordinator::DEFAULT_SHED_RETRY_AFTER;
use flowreach::graph::ReachabilityComputer;
use flowreach::lock::DEFAULT_LEASE_TTL;
use flowreach::prelude::*;
use flowreach::storage::EntryKey;
use flowreach::{AcquireOutcome, ReleaseOutcome, StorageResult};
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;

fn slug(s: &str) -> FlowSlug {
    FlowSlug::new(s)
}

fn path(nodes: &[&str]) -> FlowPath {
    nodes.iter().copied().map(FlowSlug::new).collect()
}

fn graph(edges: &[(&str, &str)]) -> FlowGraph {
    let mut graph = FlowGraph::new();
    for (a, b) in edges {
        for s in [*a, *b] {
            if !graph.contains_flow(&slug(s)) {
                graph.add_flow(slug(s)).unwrap();
            }
        }
        graph.add_edge(FlowEdge::unconditional(slug(a), slug(b))).unwrap();
    }
    graph
}

struct Harness {
    store: Arc<InMemoryCoordinationStore>,
    clock: Arc<ManualClock>,
    coordinator: RequestCoordinator,
}

fn harness(graph: FlowGraph) -> Harness {
    init_tracing();
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(InMemoryCoordinationStore::with_clock(clock.clone()));
    let flows = Arc::new(InMemoryFlowStore::with_graph(graph));
    let config = CoordinatorConfig::default()
        .with_acquire(AcquirePolicy::STANDARD.with_wait_timeout(Duration::from_millis(50)));
    let coordinator = RequestCoordinator::new(store.clone(), flows).with_config(config);
    Harness {
        store,
        clock,
        coordinator,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn settings() -> Environment {
    Environment::new(json!({"locale": "en"}))
}

#[tokio::test]
async fn test_forward_path_page_is_done_after_single_path() {
    let h = harness(graph(&[("A", "B"), ("B", "C")]));
    let gk = settings().graph_key().unwrap();
    let lock = h.coordinator.lock();
    let cache = h.coordinator.cache();

    let token = lock
        .try_acquire_write(&gk)
        .await
        .unwrap()
        .token()
        .cloned()
        .unwrap();
    let filled = cache
        .fill_from_db(&token, &settings(), &slug("A"), false, Some(2))
        .await
        .unwrap();
    assert_eq!(filled, FillOutcome::Filled);

    let read = cache
        .read_paths_page(&token, &slug("A"), &slug("C"), false, Some(2), 0, 10)
        .await
        .unwrap();
    let PathsRead::Page(page) = read else {
        panic!("expected a page, got {:?}", read);
    };
    assert_eq!(page.paths, vec![path(&["A", "B", "C"])]);
    assert!(page.exhausted);
    assert_eq!(page.next_offset(), None);
    assert_eq!(lock.try_release(&token).await.unwrap(), ReleaseOutcome::Released);

    // Same answer through the coordinator.
    let outcome = h
        .coordinator
        .analyze_reachable(
            AnalyzeRequest::paths(settings(), slug("A"), slug("C"))
                .with_max_steps(2)
                .with_page(0, 10),
        )
        .await
        .unwrap();
    let response = outcome.items().unwrap();
    let item = &response.items[&slug("C")];
    assert_eq!(item.paths, vec![path(&["A", "B", "C"])]);
    assert_eq!(item.next_offset, None);
}

#[tokio::test]
async fn test_inverted_query_presents_declared_orientation() {
    let h = harness(graph(&[("A", "B"), ("B", "C")]));

    let outcome = h
        .coordinator
        .analyze_reachable(
            AnalyzeRequest::paths(settings(), slug("C"), slug("A"))
                .inverted(true)
                .with_max_steps(2),
        )
        .await
        .unwrap();
    let item = &outcome.items().unwrap().items[&slug("A")];
    assert_eq!(item.source, slug("C"));
    assert_eq!(item.target, slug("A"));
    assert_eq!(item.paths, vec![path(&["C", "B", "A"])]);

    // The stored entry keeps natural orientation.
    let gk = settings().graph_key().unwrap();
    let token = h
        .coordinator
        .lock()
        .try_acquire_read(&gk)
        .await
        .unwrap()
        .token()
        .cloned()
        .unwrap();
    let entry = h
        .coordinator
        .cache()
        .load_entry(&token, &slug("C"), true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.targets[&slug("A")], vec![path(&["A", "B", "C"])]);
}

#[tokio::test]
async fn test_expired_lease_is_stolen_and_release_reports_lost() {
    let h = harness(graph(&[("A", "B")]));
    let gk = settings().graph_key().unwrap();
    let lock = h.coordinator.lock();

    let x = lock.try_acquire_write(&gk).await.unwrap();
    let AcquireOutcome::Acquired(x) = x else {
        panic!("X should acquire a free key");
    };

    h.clock.advance(DEFAULT_LEASE_TTL + Duration::from_millis(1));

    let y = lock.try_acquire_write(&gk).await.unwrap();
    let AcquireOutcome::Acquired(y) = y else {
        panic!("Y should take over the expired lease");
    };
    assert!(y.token > x.token);

    assert_eq!(lock.try_release(&x).await.unwrap(), ReleaseOutcome::LockLost);
    assert_eq!(lock.try_release(&y).await.unwrap(), ReleaseOutcome::Released);
}

#[tokio::test]
async fn test_listing_targets_returns_first_path_and_count() {
    let h = harness(graph(&[("A", "B"), ("B", "D"), ("A", "C"), ("C", "D")]));

    let outcome = h
        .coordinator
        .analyze_reachable(AnalyzeRequest::targets(settings(), slug("A")))
        .await
        .unwrap();
    let response = outcome.items().unwrap();

    assert_eq!(
        response.items.keys().cloned().collect::<Vec<_>>(),
        vec![slug("B"), slug("C"), slug("D")]
    );
    let d = &response.items[&slug("D")];
    assert_eq!(d.paths, vec![path(&["A", "B", "D"])]);
    assert_eq!(d.next_offset, Some(1));
    assert_eq!(response.items[&slug("B")].next_offset, None);
    assert_eq!(response.next_targets_cursor, None);
}

#[tokio::test]
async fn test_unconnected_target_is_no_content() {
    let mut g = graph(&[("A", "B")]);
    g.add_flow(slug("Z")).unwrap();
    let h = harness(g);

    let outcome = h
        .coordinator
        .analyze_reachable(AnalyzeRequest::paths(settings(), slug("A"), slug("Z")))
        .await
        .unwrap();
    assert_eq!(outcome, AnalyzeOutcome::NoContent);
}

#[tokio::test]
async fn test_zero_hop_is_not_a_path() {
    // A cycle back to the source still never yields a path to itself.
    let h = harness(graph(&[("A", "B"), ("B", "A")]));

    let outcome = h
        .coordinator
        .analyze_reachable(AnalyzeRequest::paths(settings(), slug("A"), slug("A")))
        .await
        .unwrap();
    assert_eq!(outcome, AnalyzeOutcome::NoContent);

    let listing = h
        .coordinator
        .analyze_reachable(AnalyzeRequest::targets(settings(), slug("A")))
        .await
        .unwrap();
    assert!(!listing.items().unwrap().items.contains_key(&slug("A")));
}

#[tokio::test]
async fn test_held_write_lease_sheds_load() {
    let h = harness(graph(&[("A", "B")]));
    let gk = settings().graph_key().unwrap();
    let held = h.coordinator.lock().try_acquire_write(&gk).await.unwrap();
    assert!(held.token().is_some());

    let outcome = h
        .coordinator
        .analyze_reachable(AnalyzeRequest::targets(settings(), slug("A")))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        AnalyzeOutcome::ShedLoad {
            retry_after: DEFAULT_SHED_RETRY_AFTER
        }
    );
}

#[tokio::test]
async fn test_unknown_source_errors_and_releases_lease() {
    let h = harness(graph(&[("A", "B")]));

    let result = h
        .coordinator
        .analyze_reachable(AnalyzeRequest::targets(settings(), slug("nope")))
        .await;
    assert!(matches!(
        result,
        Err(CoordinatorError::Graph(GraphError::FlowNotFound { .. }))
    ));

    let gk = settings().graph_key().unwrap();
    let after = h.coordinator.lock().try_acquire_write(&gk).await.unwrap();
    assert!(after.token().is_some(), "lease must be free after the error");
}

#[tokio::test]
async fn test_invalidation_forces_refill_with_new_graph() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(InMemoryCoordinationStore::with_clock(clock));
    let flows = Arc::new(InMemoryFlowStore::with_graph(graph(&[("A", "B")])));
    let coordinator = RequestCoordinator::new(store.clone(), flows.clone());

    let before = coordinator
        .analyze_reachable(AnalyzeRequest::targets(settings(), slug("A")))
        .await
        .unwrap();
    assert_eq!(before.items().unwrap().items.len(), 1);

    flows.add_flow(slug("C")).await.unwrap();
    flows
        .add_edge(FlowEdge::unconditional(slug("B"), slug("C")))
        .await
        .unwrap();

    // Cached data is served until the view is invalidated.
    let stale = coordinator
        .analyze_reachable(AnalyzeRequest::targets(settings(), slug("A")))
        .await
        .unwrap();
    assert_eq!(stale.items().unwrap().items.len(), 1);

    assert_eq!(coordinator.invalidator().invalidate_all().await.unwrap(), 1);

    let fresh = coordinator
        .analyze_reachable(AnalyzeRequest::targets(settings(), slug("A")))
        .await
        .unwrap();
    assert_eq!(fresh.items().unwrap().items.len(), 2);
}

#[tokio::test]
async fn test_repeated_fills_are_byte_identical() {
    let h = harness(graph(&[
        ("A", "B"),
        ("A", "C"),
        ("B", "D"),
        ("C", "D"),
        ("D", "E"),
        ("B", "E"),
    ]));
    let gk = settings().graph_key().unwrap();
    let lock = h.coordinator.lock();
    let cache = h.coordinator.cache();
    let key = EntryKey::new(gk.clone(), slug("A"), false);

    let mut snapshots = Vec::new();
    for _ in 0..3 {
        let token = lock
            .try_acquire_write(&gk)
            .await
            .unwrap()
            .token()
            .cloned()
            .unwrap();
        cache
            .fill_from_db(&token, &settings(), &slug("A"), false, None)
            .await
            .unwrap();
        snapshots.push(h.store.load_entry(&key).await.unwrap().unwrap());
        lock.try_release(&token).await.unwrap();
    }

    assert_eq!(snapshots[0], snapshots[1]);
    assert_eq!(snapshots[1], snapshots[2]);
}

#[tokio::test]
async fn test_paging_with_limit_ten_enumerates_every_path_once() {
    // Three layers of four nodes, fully connected layer to layer: 64 paths
    // from S to T within four steps.
    let mut edges = Vec::new();
    let layers: Vec<Vec<String>> = (0..3)
        .map(|l| (0..4).map(|i| format!("L{}N{}", l, i)).collect())
        .collect();
    for n in &layers[0] {
        edges.push(("S".to_string(), n.clone()));
    }
    for pair in layers.windows(2) {
        for a in &pair[0] {
            for b in &pair[1] {
                edges.push((a.clone(), b.clone()));
            }
        }
    }
    for n in &layers[2] {
        edges.push((n.clone(), "T".to_string()));
    }
    let edge_refs: Vec<(&str, &str)> = edges.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
    let g = graph(&edge_refs);
    let h = harness(g.clone());

    let mut collected = Vec::new();
    let mut offset = 0;
    let mut pages = 0;
    loop {
        let outcome = h
            .coordinator
            .analyze_reachable(
                AnalyzeRequest::paths(settings(), slug("S"), slug("T"))
                    .with_max_steps(4)
                    .with_page(offset, 10),
            )
            .await
            .unwrap();
        let item = outcome.items().unwrap().items[&slug("T")].clone();
        assert_eq!(item.offset, offset);
        assert!(!item.paths.is_empty());
        collected.extend(item.paths);
        pages += 1;
        match item.next_offset {
            Some(next) => offset = next,
            None => break,
        }
    }

    assert_eq!(pages, 7);
    assert_eq!(collected.len(), 64);
    let unique: HashSet<String> = collected.iter().map(|p| p.to_string()).collect();
    assert_eq!(unique.len(), 64);

    let expected = ReachabilityComputer::new()
        .compute(&g, &settings(), &slug("S"), Direction::Natural, 4)
        .unwrap();
    assert_eq!(collected, expected[&slug("T")]);
}

#[tokio::test]
async fn test_concurrent_requests_never_return_partial_results() {
    let g = graph(&[("A", "B"), ("B", "C"), ("A", "C"), ("C", "D")]);
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(InMemoryCoordinationStore::with_clock(clock));
    let flows = Arc::new(InMemoryFlowStore::with_graph(g));
    let coordinator = RequestCoordinator::new(store, flows);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .analyze_reachable(AnalyzeRequest::targets(settings(), slug("A")))
                .await
        }));
    }

    let mut served = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            AnalyzeOutcome::Items(response) => {
                served += 1;
                assert_eq!(
                    response.items.keys().cloned().collect::<Vec<_>>(),
                    vec![slug("B"), slug("C"), slug("D")]
                );
            }
            AnalyzeOutcome::ShedLoad { .. } => {}
            AnalyzeOutcome::NoContent => panic!("listing never yields NoContent"),
        }
    }
    assert!(served >= 1);
}

#[tokio::test]
async fn test_predicates_partition_the_cache() {
    let mut g = FlowGraph::new();
    for s in ["home", "beta", "stable"] {
        g.add_flow(slug(s)).unwrap();
    }
    g.add_edge(FlowEdge::new(slug("home"), slug("beta"), Predicate::truthy("flags.beta")))
        .unwrap();
    g.add_edge(FlowEdge::new(
        slug("home"),
        slug("stable"),
        Predicate::negate(Predicate::truthy("flags.beta")),
    ))
    .unwrap();
    let h = harness(g);

    let beta = Environment::new(json!({"flags": {"beta": true}}));
    let stable = Environment::new(json!({"flags": {"beta": false}}));

    let a = h
        .coordinator
        .analyze_reachable(AnalyzeRequest::targets(beta, slug("home")))
        .await
        .unwrap();
    let b = h
        .coordinator
        .analyze_reachable(AnalyzeRequest::targets(stable, slug("home")))
        .await
        .unwrap();

    assert!(a.items().unwrap().items.contains_key(&slug("beta")));
    assert!(b.items().unwrap().items.contains_key(&slug("stable")));
    assert_eq!(h.store.known_graph_keys().await.unwrap().len(), 2);
}

/// Flow store that invalidates the graph key every time the graph is loaded,
/// as a flow-definition edit racing a fill would.
struct InvalidatingFlowStore {
    inner: InMemoryFlowStore,
    store: Arc<InMemoryCoordinationStore>,
    graph_key: GraphKey,
}

#[async_trait::async_trait]
impl FlowGraphStore for InvalidatingFlowStore {
    async fn load_graph(&self) -> StorageResult<FlowGraph> {
        self.store.bump_version(&self.graph_key).await?;
        self.inner.load_graph().await
    }
}

#[tokio::test]
async fn test_invalidation_during_fill_sheds_load() {
    init_tracing();
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(InMemoryCoordinationStore::with_clock(clock));
    let gk = settings().graph_key().unwrap();
    let flows = Arc::new(InvalidatingFlowStore {
        inner: InMemoryFlowStore::with_graph(graph(&[("a", "b")])),
        store: store.clone(),
        graph_key: gk.clone(),
    });
    let coordinator = RequestCoordinator::new(store.clone(), flows);

    let outcome = coordinator
        .analyze_reachable(AnalyzeRequest::targets(settings(), slug("a")))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        AnalyzeOutcome::ShedLoad {
            retry_after: DEFAULT_SHED_RETRY_AFTER
        }
    );

    // The write lease was released on the way out.
    let after = coordinator.lock().try_acquire_write(&gk).await.unwrap();
    assert!(after.token().is_some());
}
