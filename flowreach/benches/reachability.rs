use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flowreach::graph::ReachabilityComputer;
use flowreach::prelude::*;
use serde_json::json;

// =============================================================================
// Fixtures
// =============================================================================

/// `layers` layers of `width` flows, fully connected layer to layer, with a
/// single entry flow `root` in front.
fn layered_graph(layers: usize, width: usize) -> FlowGraph {
    let mut graph = FlowGraph::new();
    graph.add_flow(FlowSlug::new("root")).unwrap();
    for l in 0..layers {
        for i in 0..width {
            graph.add_flow(FlowSlug::new(format!("l{}n{}", l, i))).unwrap();
        }
    }
    for i in 0..width {
        graph
            .add_edge(FlowEdge::unconditional(
                FlowSlug::new("root"),
                FlowSlug::new(format!("l0n{}", i)),
            ))
            .unwrap();
    }
    for l in 1..layers {
        for a in 0..width {
            for b in 0..width {
                graph
                    .add_edge(FlowEdge::new(
                        FlowSlug::new(format!("l{}n{}", l - 1, a)),
                        FlowSlug::new(format!("l{}n{}", l, b)),
                        Predicate::truthy("enabled"),
                    ))
                    .unwrap();
            }
        }
    }
    graph
}

fn settings() -> Environment {
    Environment::new(json!({"enabled": true}))
}

// =============================================================================
// Computation Benchmarks
// =============================================================================

fn bench_computation(c: &mut Criterion) {
    let graph = layered_graph(4, 5);
    let env = settings();
    let computer = ReachabilityComputer::new();
    let root = FlowSlug::new("root");
    let mut group = c.benchmark_group("computation");

    group.bench_function("build_view", |b| {
        b.iter(|| black_box(graph.view(&env, Direction::Natural)))
    });

    let view = graph.view(&env, Direction::Natural);
    group.bench_function("reachable_targets_bfs", |b| {
        b.iter(|| black_box(computer.reachable_targets(&view, &root, 4).unwrap()))
    });

    for steps in [2usize, 3, 4] {
        group.bench_with_input(
            BenchmarkId::new("enumerate_paths", steps),
            &steps,
            |b, &steps| b.iter(|| black_box(computer.enumerate_paths(&view, &root, steps).unwrap())),
        );
    }

    group.finish();
}

// =============================================================================
// Request Benchmarks
// =============================================================================

fn bench_requests(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("requests");

    let store = Arc::new(InMemoryCoordinationStore::new());
    let flows = Arc::new(InMemoryFlowStore::with_graph(layered_graph(4, 5)));
    let coordinator = RequestCoordinator::new(store, flows);
    let request = AnalyzeRequest::targets(settings(), FlowSlug::new("root"));

    // Warm the cache so the loop measures the read path only.
    rt.block_on(coordinator.analyze_reachable(request.clone()))
        .unwrap();

    group.bench_function("cache_hit_targets", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(
                    coordinator
                        .analyze_reachable(request.clone())
                        .await
                        .unwrap(),
                )
            })
        })
    });

    group.bench_function("cold_fill_targets", |b| {
        b.iter(|| {
            rt.block_on(async {
                coordinator.invalidator().invalidate_all().await.unwrap();
                black_box(
                    coordinator
                        .analyze_reachable(request.clone())
                        .await
                        .unwrap(),
                )
            })
        })
    });

    group.finish();
}

criterion_group!(benches, bench_computation, bench_requests);
criterion_main!(benches);
