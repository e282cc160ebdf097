//! Inbound request and outbound response shapes.

use crate::core::Environment;
use crate::graph::{FlowPath, FlowSlug};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A reachability query.
///
/// Without `target`, lists every reachable target with its first path. With
/// `target`, pages through every path from `source` to `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub settings: Environment,
    pub source: FlowSlug,
    #[serde(default)]
    pub target: Option<FlowSlug>,
    /// Follow edges backwards: find flows from which `source` is reachable.
    #[serde(default)]
    pub inverted: bool,
    #[serde(default)]
    pub max_steps: Option<usize>,
    #[serde(default)]
    pub targets_cursor: Option<FlowSlug>,
    #[serde(default)]
    pub offset_paths: usize,
    #[serde(default)]
    pub limit_paths: Option<usize>,
}

impl AnalyzeRequest {
    /// Lists every target reachable from `source`.
    pub fn targets(settings: Environment, source: FlowSlug) -> Self {
        Self {
            settings,
            source,
            target: None,
            inverted: false,
            max_steps: None,
            targets_cursor: None,
            offset_paths: 0,
            limit_paths: None,
        }
    }

    /// Pages through paths from `source` to `target`.
    pub fn paths(settings: Environment, source: FlowSlug, target: FlowSlug) -> Self {
        Self {
            target: Some(target),
            ..Self::targets(settings, source)
        }
    }

    pub fn inverted(mut self, inverted: bool) -> Self {
        self.inverted = inverted;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_targets_cursor(mut self, cursor: Option<FlowSlug>) -> Self {
        self.targets_cursor = cursor;
        self
    }

    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset_paths = offset;
        self.limit_paths = Some(limit);
        self
    }
}

/// Paths between one declared source and one target.
///
/// Paths run from `source` to `target` as the caller declared them, whatever
/// the traversal direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsItem {
    pub source: FlowSlug,
    pub target: FlowSlug,
    pub paths: Vec<FlowPath>,
    pub offset: usize,
    pub next_offset: Option<usize>,
}

/// A successful response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub items: BTreeMap<FlowSlug, PathsItem>,
    pub next_targets_cursor: Option<FlowSlug>,
}

/// Outcome of [`RequestCoordinator::analyze_reachable`](super::RequestCoordinator::analyze_reachable).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzeOutcome {
    Items(AnalyzeResponse),
    /// The requested target has no paths from the source.
    NoContent,
    /// Contention or a lost lease; retry the request after the given delay.
    ShedLoad { retry_after: Duration },
}

impl AnalyzeOutcome {
    pub fn items(&self) -> Option<&AnalyzeResponse> {
        match self {
            AnalyzeOutcome::Items(response) => Some(response),
            _ => None,
        }
    }

    pub fn is_shed(&self) -> bool {
        matches!(self, AnalyzeOutcome::ShedLoad { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults() {
        let request: AnalyzeRequest = serde_json::from_value(json!({
            "settings": {"plan": "pro"},
            "source": "login",
        }))
        .unwrap();

        assert_eq!(request.target, None);
        assert!(!request.inverted);
        assert_eq!(request.offset_paths, 0);
        assert_eq!(request, AnalyzeRequest::targets(Environment::new(json!({"plan": "pro"})), FlowSlug::new("login")));
    }

    #[test]
    fn test_invalid_slug_is_rejected() {
        let result = serde_json::from_value::<AnalyzeRequest>(json!({
            "settings": null,
            "source": "",
        }));
        assert!(result.is_err());
    }
}
