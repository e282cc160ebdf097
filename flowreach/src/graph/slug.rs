//! Flow slug type
//!
//! This module defines the FlowSlug type which identifies a client flow node
//! in the transition graph.
//!
//! # Design Decision
//!
//! Slugs appear verbatim inside storage keys (`reach:{graph_key}:{source}:...`),
//! so the separator `:` and whitespace are rejected at construction.

use crate::core::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a client flow node
///
/// # Examples
///
/// ```
/// use flowreach::FlowSlug;
///
/// let slug = FlowSlug::new("checkout");
/// assert_eq!(slug.as_str(), "checkout");
/// assert!(FlowSlug::parse("bad:slug").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlowSlug(String);

impl FlowSlug {
    /// Creates a slug, panicking on invalid input.
    ///
    /// Intended for literals in code and tests; use [`FlowSlug::parse`] for
    /// anything read from outside.
    ///
    /// # Panics
    /// Panics if the slug is empty or contains `:` or whitespace.
    pub fn new(slug: impl Into<String>) -> Self {
        match Self::parse(slug) {
            Ok(slug) => slug,
            Err(e) => panic!("{}", e),
        }
    }

    /// Validates and creates a slug.
    pub fn parse(slug: impl Into<String>) -> Result<Self, CoreError> {
        let slug = slug.into();
        if slug.is_empty() || slug.contains(':') || slug.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidSlug(slug));
        }
        Ok(Self(slug))
    }

    /// Returns the slug as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FlowSlug {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<FlowSlug> for String {
    fn from(slug: FlowSlug) -> Self {
        slug.0
    }
}

impl fmt::Display for FlowSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for FlowSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlowSlug({})", self.0)
    }
}
