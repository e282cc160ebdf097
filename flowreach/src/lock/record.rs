//! Lock record, token and event types shared by every coordination backend.

use crate::core::GraphKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access mode of a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    Reader,
    Writer,
}

impl LockKind {
    /// Returns the lowercase name used in stored records.
    pub fn as_str(&self) -> &'static str {
        match self {
            LockKind::Reader => "reader",
            LockKind::Writer => "writer",
        }
    }

    /// Parses a stored kind name. The empty string means "free".
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reader" => Some(LockKind::Reader),
            "writer" => Some(LockKind::Writer),
            _ => None,
        }
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored state of one graph key's lease.
///
/// Times are Unix milliseconds. `kind == None` means the lease is free. A
/// record whose `expires_at` has passed is treated as free by every acquirer,
/// but it keeps its holder token until someone takes it over, so the former
/// holder can still release it cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub graph_key: GraphKey,
    pub holder_token: u64,
    #[serde(default)]
    pub kind: Option<LockKind>,
    pub reader_count: u32,
    pub acquired_at: i64,
    pub expires_at: i64,
    /// Bumped on every transition.
    pub seq: u64,
}

impl LockRecord {
    /// Returns true if the lease deadline has passed.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }

    /// Returns the mode of the lease as observed at `now_ms`.
    ///
    /// An expired lease has no active mode.
    pub fn active_kind(&self, now_ms: i64) -> Option<LockKind> {
        match self.kind {
            Some(kind) if !self.is_expired(now_ms) => Some(kind),
            _ => None,
        }
    }

    /// Returns true if `token` is the current, unexpired holder.
    pub fn is_held_by(&self, token: &LockToken, now_ms: i64) -> bool {
        self.holder_token == token.token && self.active_kind(now_ms) == Some(token.kind)
    }
}

/// Proof of a held lease.
///
/// Tokens are issued from a per-key counter that only grows, so a newer
/// holder always carries a strictly larger `token` than any earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockToken {
    pub graph_key: GraphKey,
    pub kind: LockKind,
    pub token: u64,
}

impl LockToken {
    pub fn new(graph_key: GraphKey, kind: LockKind, token: u64) -> Self {
        Self {
            graph_key,
            kind,
            token,
        }
    }

    pub fn is_writer(&self) -> bool {
        self.kind == LockKind::Writer
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}({})", self.graph_key, self.token, self.kind)
    }
}

/// Message published on a graph key's event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LockEvent {
    /// The lease record changed; carries the record after the transition.
    StateChanged { record: LockRecord },
    /// The key's version counter advanced.
    Invalidated { graph_key: GraphKey, version: u64 },
}

/// Which state a waiter is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockFilter {
    /// No unexpired writer holds the lease.
    ReaderLockable,
    /// Nobody holds the lease.
    WriterLockable,
}

impl LockFilter {
    /// The filter a caller wanting `kind` should wait on.
    pub fn for_kind(kind: LockKind) -> Self {
        match kind {
            LockKind::Reader => LockFilter::ReaderLockable,
            LockKind::Writer => LockFilter::WriterLockable,
        }
    }

    /// Returns true if `record` (as seen at `now_ms`) satisfies the filter.
    ///
    /// A missing record admits both: a reader gets `NotFound` and a writer
    /// creates the record.
    pub fn admits(&self, record: Option<&LockRecord>, now_ms: i64) -> bool {
        let Some(record) = record else {
            return true;
        };
        match (self, record.active_kind(now_ms)) {
            (_, None) => true,
            (LockFilter::ReaderLockable, Some(LockKind::Reader)) => true,
            _ => false,
        }
    }
}

/// Result of a single acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired(LockToken),
    /// Held in a conflicting mode by someone else.
    AlreadyLocked,
    /// Read attempt on a key that has never been write-locked.
    NotFound,
}

impl AcquireOutcome {
    pub fn token(&self) -> Option<&LockToken> {
        match self {
            AcquireOutcome::Acquired(token) => Some(token),
            _ => None,
        }
    }
}

/// Result of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// The lease was taken over after expiry; the caller no longer holds it.
    LockLost,
}

/// Result of a fenced write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    LockLost,
}
