//! Pure lease transitions.
//!
//! These functions decide and compute every lock state change. They do no
//! I/O and take the current time as a parameter, so the in-memory store can
//! apply them under a map entry lock and tests can drive them directly. The
//! Redis backend runs the same decisions inside its Lua scripts.

use super::record::{LockKind, LockRecord, LockToken};
use crate::core::GraphKey;

/// What an acquisition attempt should do given the current record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireDecision {
    /// Reader on a key that has no record; nothing is created.
    NotFound,
    /// Held in a conflicting mode.
    AlreadyLocked,
    /// Free, expired or missing (writers only): issue a new token.
    StartRegime,
    /// Readers hold the lease: share its token and extend the deadline.
    JoinReaders,
}

/// Decides the outcome of acquiring `kind` against `current` at `now_ms`.
pub fn decide_acquire(current: Option<&LockRecord>, kind: LockKind, now_ms: i64) -> AcquireDecision {
    let Some(record) = current else {
        return match kind {
            LockKind::Reader => AcquireDecision::NotFound,
            LockKind::Writer => AcquireDecision::StartRegime,
        };
    };

    match (record.active_kind(now_ms), kind) {
        (None, _) => AcquireDecision::StartRegime,
        (Some(LockKind::Reader), LockKind::Reader) => AcquireDecision::JoinReaders,
        _ => AcquireDecision::AlreadyLocked,
    }
}

/// Builds the record for a fresh regime holding `token`.
pub fn start_regime(
    graph_key: &GraphKey,
    previous: Option<&LockRecord>,
    kind: LockKind,
    token: u64,
    now_ms: i64,
    ttl_ms: i64,
) -> LockRecord {
    LockRecord {
        graph_key: graph_key.clone(),
        holder_token: token,
        kind: Some(kind),
        reader_count: match kind {
            LockKind::Reader => 1,
            LockKind::Writer => 0,
        },
        acquired_at: now_ms,
        expires_at: now_ms.saturating_add(ttl_ms),
        seq: next_seq(previous),
    }
}

/// Adds one reader to an active read regime.
pub fn join_readers(record: &LockRecord, now_ms: i64, ttl_ms: i64) -> LockRecord {
    LockRecord {
        reader_count: record.reader_count.saturating_add(1),
        expires_at: record.expires_at.max(now_ms.saturating_add(ttl_ms)),
        seq: record.seq.saturating_add(1),
        ..record.clone()
    }
}

/// Computes the record after `token` releases, or `None` if `token` is no
/// longer the holder (the lease was lost).
///
/// Releasing an expired lease that nobody took over still succeeds.
pub fn release(current: Option<&LockRecord>, token: &LockToken) -> Option<LockRecord> {
    let record = current?;
    if record.holder_token != token.token || record.kind != Some(token.kind) {
        return None;
    }

    let mut next = record.clone();
    next.seq = record.seq.saturating_add(1);
    match token.kind {
        LockKind::Writer => {
            next.kind = None;
            next.reader_count = 0;
        }
        LockKind::Reader => {
            next.reader_count = record.reader_count.saturating_sub(1);
            if next.reader_count == 0 {
                next.kind = None;
            }
        }
    }
    Some(next)
}

/// Returns true if a fenced write by `token` must be accepted.
pub fn admits_write(current: Option<&LockRecord>, token: &LockToken, now_ms: i64) -> bool {
    token.is_writer() && current.is_some_and(|record| record.is_held_by(token, now_ms))
}

fn next_seq(previous: Option<&LockRecord>) -> u64 {
    previous.map_or(0, |r| r.seq).saturating_add(1)
}
