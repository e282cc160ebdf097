//! Bounded-depth reachability over a filtered flow graph.
//!
//! Two traversals are provided:
//!
//! - [`ReachabilityComputer::reachable_targets`]: breadth-first, one shortest
//!   representative path per reachable target. Cheap; used when only the
//!   target set matters.
//! - [`ReachabilityComputer::enumerate_paths`]: depth-first enumeration of every
//!   distinct simple path within the step bound, grouped by target. This is
//!   what the cache stores, since path pagination needs the full set.
//!
//! The graph is not assumed to be acyclic. Cycle avoidance is per path: a
//! flow may appear at most once in a given path, but may be reached through
//! many different paths. A consequence is that the source never appears as
//! its own target (zero-hop paths are not paths).
//!
//! Results always use natural orientation. For an inverted view the traversal
//! runs over reversed edges and each discovered path is reversed once before
//! it is recorded, so `[a, b, c]` is stored for `c`'s inverted query just as
//! it is for `a`'s natural one.

use super::error::{GraphError, GraphResult};
use super::{Direction, FlowGraph, FlowPath, FlowSlug, GraphView};
use crate::core::Environment;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// Every path from one source, grouped by the far endpoint of the query.
///
/// For a natural query the key is each path's last node; for an inverted
/// query it is each path's first node (the flow the query source is reachable
/// from). Path lists are sorted by length, then lexicographically.
pub type PathsByTarget = BTreeMap<FlowSlug, Vec<FlowPath>>;

/// Computes reachability from a source flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReachabilityComputer;

impl ReachabilityComputer {
    /// Creates a computer.
    pub fn new() -> Self {
        Self
    }

    /// Returns each target reachable from `source` within `max_steps`, with
    /// one shortest path each (natural orientation).
    ///
    /// Returns an error if `source` is not a flow in the view.
    pub fn reachable_targets(
        &self,
        view: &GraphView,
        source: &FlowSlug,
        max_steps: usize,
    ) -> GraphResult<BTreeMap<FlowSlug, FlowPath>> {
        if !view.contains_flow(source) {
            return Err(GraphError::flow_not_found(source.clone()));
        }

        let mut parent: BTreeMap<FlowSlug, FlowSlug> = BTreeMap::new();
        let mut seen: HashSet<FlowSlug> = HashSet::from([source.clone()]);
        let mut queue: VecDeque<(FlowSlug, usize)> = VecDeque::from([(source.clone(), 0)]);

        while let Some((node, depth)) = queue.pop_front() {
            if depth == max_steps {
                continue;
            }
            for next in view.neighbours(&node) {
                if seen.insert(next.clone()) {
                    parent.insert(next.clone(), node.clone());
                    queue.push_back((next.clone(), depth + 1));
                }
            }
        }

        let mut targets = BTreeMap::new();
        for target in parent.keys() {
            let mut nodes = vec![target.clone()];
            let mut cursor = target;
            while let Some(prev) = parent.get(cursor) {
                nodes.push(prev.clone());
                cursor = prev;
            }
            // `nodes` runs target -> source in traversal orientation.
            nodes.reverse();
            let path = orient(FlowPath::new(nodes), view.direction());
            targets.insert(target.clone(), path);
        }

        Ok(targets)
    }

    /// Enumerates every distinct simple path of at most `max_steps`
    /// transitions starting from `source`, grouped by target.
    ///
    /// Returns an error if `source` is not a flow in the view.
    pub fn enumerate_paths(
        &self,
        view: &GraphView,
        source: &FlowSlug,
        max_steps: usize,
    ) -> GraphResult<PathsByTarget> {
        if !view.contains_flow(source) {
            return Err(GraphError::flow_not_found(source.clone()));
        }

        let mut found: PathsByTarget = BTreeMap::new();
        let mut current = vec![source.clone()];
        let mut on_path: BTreeSet<FlowSlug> = BTreeSet::from([source.clone()]);

        self.walk(view, max_steps, &mut current, &mut on_path, &mut found);

        for paths in found.values_mut() {
            paths.sort();
        }
        Ok(found)
    }

    /// Convenience wrapper: filters `graph` by `env` and enumerates paths.
    pub fn compute(
        &self,
        graph: &FlowGraph,
        env: &Environment,
        source: &FlowSlug,
        direction: Direction,
        max_steps: usize,
    ) -> GraphResult<PathsByTarget> {
        let view = graph.view(env, direction);
        self.enumerate_paths(&view, source, max_steps)
    }

    fn walk(
        &self,
        view: &GraphView,
        max_steps: usize,
        current: &mut Vec<FlowSlug>,
        on_path: &mut BTreeSet<FlowSlug>,
        found: &mut PathsByTarget,
    ) {
        if current.len() > max_steps {
            return;
        }
        let Some(tip) = current.last().cloned() else {
            return;
        };

        for next in view.neighbours(&tip) {
            if !on_path.insert(next.clone()) {
                continue;
            }
            current.push(next.clone());

            let path = orient(FlowPath::new(current.clone()), view.direction());
            found.entry(next.clone()).or_default().push(path);

            self.walk(view, max_steps, current, on_path, found);

            current.pop();
            on_path.remove(next);
        }
    }
}

/// Converts a path from traversal orientation to natural orientation.
fn orient(path: FlowPath, direction: Direction) -> FlowPath {
    match direction {
        Direction::Natural => path,
        Direction::Inverted => path.reversed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Predicate;
    use crate::graph::FlowEdge;

    fn slug(s: &str) -> FlowSlug {
        FlowSlug::new(s)
    }

    fn path(nodes: &[&str]) -> FlowPath {
        nodes.iter().copied().map(FlowSlug::new).collect()
    }

    fn graph(edges: &[(&str, &str)]) -> FlowGraph {
        let mut flows: BTreeSet<&str> = BTreeSet::new();
        for (a, b) in edges {
            flows.insert(a);
            flows.insert(b);
        }
        FlowGraph::from_parts(
            flows.into_iter().map(slug),
            edges
                .iter()
                .map(|(a, b)| FlowEdge::unconditional(slug(a), slug(b))),
        )
        .unwrap()
    }

    fn enumerate(g: &FlowGraph, source: &str, direction: Direction, max: usize) -> PathsByTarget {
        ReachabilityComputer::new()
            .compute(g, &Environment::default(), &slug(source), direction, max)
            .unwrap()
    }

    #[test]
    fn test_linear_chain() {
        let g = graph(&[("a", "b"), ("b", "c")]);
        let found = enumerate(&g, "a", Direction::Natural, 2);

        assert_eq!(found.len(), 2);
        assert_eq!(found[&slug("b")], vec![path(&["a", "b"])]);
        assert_eq!(found[&slug("c")], vec![path(&["a", "b", "c"])]);
    }

    #[test]
    fn test_max_steps_bounds_depth() {
        let g = graph(&[("a", "b"), ("b", "c"), ("c", "d")]);
        let found = enumerate(&g, "a", Direction::Natural, 2);

        assert!(found.contains_key(&slug("c")));
        assert!(!found.contains_key(&slug("d")));
        assert!(found.values().flatten().all(|p| p.steps() <= 2));
    }

    #[test]
    fn test_zero_steps_reaches_nothing() {
        let g = graph(&[("a", "b")]);
        assert!(enumerate(&g, "a", Direction::Natural, 0).is_empty());
    }

    #[test]
    fn test_diamond_orders_paths() {
        // a -> b -> d, a -> c -> d, a -> d
        let g = graph(&[("a", "c"), ("a", "b"), ("b", "d"), ("c", "d"), ("a", "d")]);
        let found = enumerate(&g, "a", Direction::Natural, 3);

        assert_eq!(
            found[&slug("d")],
            vec![
                path(&["a", "d"]),
                path(&["a", "b", "d"]),
                path(&["a", "c", "d"]),
            ]
        );
    }

    #[test]
    fn test_cycles_are_avoided_per_path() {
        // a <-> b, b -> c, a -> c
        let g = graph(&[("a", "b"), ("b", "a"), ("b", "c"), ("a", "c")]);
        let found = enumerate(&g, "a", Direction::Natural, 5);

        assert!(!found.contains_key(&slug("a")), "source is never its own target");
        assert_eq!(
            found[&slug("c")],
            vec![path(&["a", "c"]), path(&["a", "b", "c"])]
        );
        for paths in found.values() {
            for p in paths {
                let unique: HashSet<_> = p.nodes().iter().collect();
                assert_eq!(unique.len(), p.nodes().len(), "path revisits a node: {}", p);
            }
        }
    }

    #[test]
    fn test_inverted_stores_natural_orientation() {
        let g = graph(&[("a", "b"), ("b", "c")]);
        let found = enumerate(&g, "c", Direction::Inverted, 2);

        assert_eq!(found[&slug("a")], vec![path(&["a", "b", "c"])]);
        assert_eq!(found[&slug("b")], vec![path(&["b", "c"])]);
    }

    #[test]
    fn test_predicates_filter_paths() {
        let g = FlowGraph::from_parts(
            [slug("a"), slug("b"), slug("c")],
            [
                FlowEdge::unconditional(slug("a"), slug("b")),
                FlowEdge::new(slug("b"), slug("c"), Predicate::truthy("late_access")),
            ],
        )
        .unwrap();

        let env = Environment::new(serde_json::json!({"late_access": false}));
        let found = ReachabilityComputer::new()
            .compute(&g, &env, &slug("a"), Direction::Natural, 4)
            .unwrap();
        assert!(!found.contains_key(&slug("c")));
    }

    #[test]
    fn test_unknown_source_is_an_error() {
        let g = graph(&[("a", "b")]);
        let result = ReachabilityComputer::new().compute(
            &g,
            &Environment::default(),
            &slug("nope"),
            Direction::Natural,
            3,
        );
        assert!(matches!(result, Err(GraphError::FlowNotFound { .. })));
    }

    #[test]
    fn test_reachable_targets_matches_enumeration() {
        let g = graph(&[("a", "b"), ("b", "c"), ("a", "c"), ("c", "d"), ("d", "b")]);
        let view = g.view(&Environment::default(), Direction::Natural);
        let computer = ReachabilityComputer::new();

        let shortest = computer.reachable_targets(&view, &slug("a"), 3).unwrap();
        let all = computer.enumerate_paths(&view, &slug("a"), 3).unwrap();

        assert_eq!(
            shortest.keys().collect::<Vec<_>>(),
            all.keys().collect::<Vec<_>>()
        );
        for (target, representative) in &shortest {
            assert_eq!(representative.steps(), all[target][0].steps());
        }
        assert_eq!(shortest[&slug("c")], path(&["a", "c"]));
    }

    #[test]
    fn test_reachable_targets_inverted() {
        let g = graph(&[("a", "b"), ("b", "c")]);
        let view = g.view(&Environment::default(), Direction::Inverted);
        let shortest = ReachabilityComputer::new()
            .reachable_targets(&view, &slug("c"), 2)
            .unwrap();

        assert_eq!(shortest[&slug("a")], path(&["a", "b", "c"]));
    }
}
