//! Cached reachability data for one (graph key, source, direction).

use crate::core::GraphKey;
use crate::graph::{FlowPath, FlowSlug, PathsByTarget};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every path from one source, computed under one graph view.
///
/// `targets` maps each far endpoint to its paths, sorted by length and then
/// lexicographically, all in natural orientation. The entry is only valid
/// while the key's version counter still equals `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachabilityEntry {
    pub graph_key: GraphKey,
    pub source: FlowSlug,
    pub inverted: bool,
    pub version: u64,
    /// Depth bound the paths were enumerated with.
    pub max_steps: usize,
    pub targets: PathsByTarget,
}

impl ReachabilityEntry {
    /// Returns true if the entry was stamped with `version` and covers at
    /// least `max_steps` transitions.
    pub fn is_current(&self, version: u64, max_steps: usize) -> bool {
        self.version == version && self.max_steps >= max_steps
    }

    /// Paths to `target` of at most `max_steps` transitions, in stored order.
    pub fn paths_within(&self, target: &FlowSlug, max_steps: usize) -> &[FlowPath] {
        let Some(paths) = self.targets.get(target) else {
            return &[];
        };
        // Paths are sorted by length, so the in-bound ones form a prefix.
        let end = paths.partition_point(|p| p.steps() <= max_steps);
        &paths[..end]
    }

    /// Summary of every target reachable within `max_steps`, in slug order.
    pub fn summaries(&self, max_steps: usize) -> BTreeMap<FlowSlug, PathsSummary> {
        self.targets
            .keys()
            .filter_map(|target| {
                let paths = self.paths_within(target, max_steps);
                paths.first().map(|first| {
                    (
                        target.clone(),
                        PathsSummary {
                            first_path: first.clone(),
                            total_count: paths.len(),
                        },
                    )
                })
            })
            .collect()
    }
}

/// The first path to a target and how many exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsSummary {
    pub first_path: FlowPath,
    pub total_count: usize,
}

/// One page of reachable targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetsPage {
    pub items: BTreeMap<FlowSlug, PathsSummary>,
    /// Last target of this page, if more targets follow it.
    pub next_cursor: Option<FlowSlug>,
}

/// One page of paths to a target.
///
/// `exhausted` is set on the page that reaches the end of the path list, so
/// a caller stops without fetching an empty page. A page is only empty when
/// the requested offset is already past the end, and then it is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPage {
    pub paths: Vec<FlowPath>,
    pub offset: usize,
    pub exhausted: bool,
}

impl PathPage {
    /// Offset of the following page, or `None` once exhausted.
    pub fn next_offset(&self) -> Option<usize> {
        if self.exhausted {
            None
        } else {
            Some(self.offset + self.paths.len())
        }
    }

    pub(crate) fn slice(all: &[FlowPath], offset: usize, limit: usize) -> Self {
        let limit = limit.max(1);
        let start = offset.min(all.len());
        let end = offset.saturating_add(limit).min(all.len());
        Self {
            paths: all[start..end].to_vec(),
            offset,
            exhausted: end == all.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(nodes: &[&str]) -> FlowPath {
        nodes.iter().copied().map(FlowSlug::new).collect()
    }

    fn entry() -> ReachabilityEntry {
        let mut targets = BTreeMap::new();
        targets.insert(
            FlowSlug::new("d"),
            vec![path(&["a", "d"]), path(&["a", "b", "d"]), path(&["a", "b", "c", "d"])],
        );
        targets.insert(FlowSlug::new("c"), vec![path(&["a", "b", "c"])]);
        ReachabilityEntry {
            graph_key: GraphKey::from("k"),
            source: FlowSlug::new("a"),
            inverted: false,
            version: 2,
            max_steps: 4,
            targets,
        }
    }

    #[test]
    fn test_currency() {
        let e = entry();
        assert!(e.is_current(2, 4));
        assert!(e.is_current(2, 3));
        assert!(!e.is_current(3, 4));
        assert!(!e.is_current(2, 5));
    }

    #[test]
    fn test_bound_filters_prefix() {
        let e = entry();
        assert_eq!(e.paths_within(&FlowSlug::new("d"), 2).len(), 2);
        assert!(e.paths_within(&FlowSlug::new("c"), 1).is_empty());
        assert!(e.paths_within(&FlowSlug::new("zz"), 4).is_empty());

        let summaries = e.summaries(1);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[&FlowSlug::new("d")].total_count, 1);
    }

    #[test]
    fn test_page_sentinel() {
        let all: Vec<FlowPath> = (0..25)
            .map(|i| {
                let node = format!("n{:02}", i);
                path(&["a", node.as_str()])
            })
            .collect();

        let first = PathPage::slice(&all, 0, 10);
        assert_eq!(first.paths.len(), 10);
        assert!(!first.exhausted);
        assert_eq!(first.next_offset(), Some(10));

        let last = PathPage::slice(&all, 20, 10);
        assert_eq!(last.paths.len(), 5);
        assert!(last.exhausted);
        assert_eq!(last.next_offset(), None);

        let exact = PathPage::slice(&all[..20], 10, 10);
        assert!(exact.exhausted, "a full final page is already exhausted");

        let past = PathPage::slice(&all, 40, 10);
        assert!(past.paths.is_empty());
        assert!(past.exhausted);
    }
}
