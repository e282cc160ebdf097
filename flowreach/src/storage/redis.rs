//! Redis-backed coordination store for multi-instance deployments.
//!
//! # Data Structures
//!
//! All keys share a configurable prefix (default `flowreach`):
//!
//! - `{prefix}:lock:{gk}` (HASH): lease record
//!   (`holder_token`, `kind`, `reader_count`, `acquired_at`, `expires_at`, `seq`)
//! - `{prefix}:fence:{gk}` (STRING/INT): last fencing token issued for the key
//! - `{prefix}:version:{gk}` (STRING/INT): version counter
//! - `{prefix}:reach:{gk}:{source}:{inverted}` (STRING): serialized entry, with TTL
//! - `{prefix}:events:{gk}` (PUB/SUB channel): JSON-encoded lock events
//! - `{prefix}:keys` (SET): every graph key seen
//!
//! # Key Features
//!
//! - **Lua scripts**: each lease transition and each fenced entry write is one
//!   script, so the holder check and the mutation are atomic
//! - **Client time**: scripts take the caller's clock as an argument, so lease
//!   expiry follows the same [`Clock`] as the in-memory backend
//! - **Pub/sub wakeups**: every transition publishes the new record; waiters
//!   subscribe on a dedicated connection
//! - **Async connection pool**: uses deadpool-redis for commands

use super::{
    duration_millis, error::Result, error::StorageError, CoordinationStore, EntryKey, KeySpace,
    LockEventStream, DEFAULT_KEY_PREFIX,
};
use crate::core::{Clock, GraphKey, SystemClock};
use crate::lock::{
    AcquireOutcome, LockEvent, LockKind, LockRecord, LockToken, ReleaseOutcome, StoreOutcome,
};
use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use futures::StreamExt;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default maximum number of pooled connections.
const DEFAULT_POOL_MAX_SIZE: usize = 16;

/// Takes or joins a lease.
///
/// KEYS: lock, fence, events, known keys. ARGV: kind, now_ms, ttl_ms, graph_key.
/// Returns `{status, token}` with status `acquired`, `locked` or `not_found`.
const ACQUIRE_SCRIPT: &str = r#"
local kind = ARGV[1]
local now = tonumber(ARGV[2])
local ttl = tonumber(ARGV[3])
local f = redis.call('HMGET', KEYS[1], 'holder_token', 'kind', 'reader_count', 'acquired_at', 'expires_at', 'seq')
local exists = f[6] ~= false

if not exists and kind == 'reader' then
    return {'not_found', 0}
end

local active = ''
local seq = 0
local expires = 0
if exists then
    active = f[2]
    seq = tonumber(f[6])
    expires = tonumber(f[5])
    if active ~= '' and now >= expires then
        active = ''
    end
end

local token, count, acquired, deadline
if active == '' then
    token = redis.call('INCR', KEYS[2])
    if kind == 'reader' then count = 1 else count = 0 end
    acquired = now
    deadline = now + ttl
elseif active == 'reader' and kind == 'reader' then
    token = tonumber(f[1])
    count = tonumber(f[3]) + 1
    acquired = tonumber(f[4])
    deadline = math.max(expires, now + ttl)
else
    return {'locked', 0}
end
seq = seq + 1

redis.call('HSET', KEYS[1],
    'holder_token', token,
    'kind', kind,
    'reader_count', count,
    'acquired_at', acquired,
    'expires_at', deadline,
    'seq', seq)
redis.call('SADD', KEYS[4], ARGV[4])
redis.call('PUBLISH', KEYS[3], cjson.encode({
    event = 'state_changed',
    record = {
        graph_key = ARGV[4], holder_token = token, kind = kind, reader_count = count,
        acquired_at = acquired, expires_at = deadline, seq = seq
    }
}))
return {'acquired', token}
"#;

/// Releases a lease held by a token.
///
/// KEYS: lock, events. ARGV: token, kind, graph_key. Returns 1 or 0 (lost).
const RELEASE_SCRIPT: &str = r#"
local f = redis.call('HMGET', KEYS[1], 'holder_token', 'kind', 'reader_count', 'acquired_at', 'expires_at', 'seq')
if f[6] == false or f[1] ~= ARGV[1] or f[2] ~= ARGV[2] then
    return 0
end

local kind = f[2]
local count = tonumber(f[3])
if kind == 'reader' then
    count = count - 1
    if count <= 0 then
        count = 0
        kind = ''
    end
else
    count = 0
    kind = ''
end
local seq = tonumber(f[6]) + 1

redis.call('HSET', KEYS[1], 'kind', kind, 'reader_count', count, 'seq', seq)
local published_kind = kind
if kind == '' then published_kind = cjson.null end
redis.call('PUBLISH', KEYS[2], cjson.encode({
    event = 'state_changed',
    record = {
        graph_key = ARGV[3], holder_token = tonumber(f[1]), kind = published_kind,
        reader_count = count, acquired_at = tonumber(f[4]), expires_at = tonumber(f[5]),
        seq = seq
    }
}))
return 1
"#;

/// Writes an entry if the caller is still the unexpired writer.
///
/// KEYS: lock, entry. ARGV: token, now_ms, ttl_ms, payload. Returns 1 or 0 (lost).
const STORE_ENTRY_SCRIPT: &str = r#"
local f = redis.call('HMGET', KEYS[1], 'holder_token', 'kind', 'expires_at')
if f[1] ~= ARGV[1] or f[2] ~= 'writer' or tonumber(ARGV[2]) >= tonumber(f[3]) then
    return 0
end
redis.call('SET', KEYS[2], ARGV[4], 'PX', ARGV[3])
return 1
"#;

/// Advances a version counter and announces it.
///
/// KEYS: version, known keys, events. ARGV: graph_key. Returns the new version.
const BUMP_VERSION_SCRIPT: &str = r#"
local version = redis.call('INCR', KEYS[1])
redis.call('SADD', KEYS[2], ARGV[1])
redis.call('PUBLISH', KEYS[3], cjson.encode({
    event = 'invalidated', graph_key = ARGV[1], version = version
}))
return version
"#;

/// Connection settings for [`RedisCoordinationStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379").
    pub url: String,
    /// Prefix for every key the store writes.
    pub key_prefix: String,
    /// Maximum number of pooled command connections.
    pub pool_max_size: usize,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            pool_max_size: DEFAULT_POOL_MAX_SIZE,
        }
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    pub fn with_pool_max_size(mut self, pool_max_size: usize) -> Self {
        self.pool_max_size = pool_max_size;
        self
    }
}

/// Redis coordination store using async connection pooling.
///
/// Commands go through a deadpool-redis pool. Subscriptions open their own
/// pub/sub connection from the underlying client, since a subscribed
/// connection cannot run other commands.
pub struct RedisCoordinationStore {
    pool: Pool,
    client: redis::Client,
    keys: KeySpace,
    clock: Arc<dyn Clock>,
    acquire_script: redis::Script,
    release_script: redis::Script,
    store_entry_script: redis::Script,
    bump_version_script: redis::Script,
}

impl RedisCoordinationStore {
    /// Connects with the default key prefix and the system clock.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use flowreach::storage::RedisCoordinationStore;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = RedisCoordinationStore::new("redis://localhost:6379").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(redis_url: &str) -> Result<Self> {
        Self::with_config(RedisConfig::new(redis_url), Arc::new(SystemClock)).await
    }

    /// Connects with explicit configuration and clock.
    pub async fn with_config(config: RedisConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut cfg = Config::from_url(config.url.clone());
        cfg.pool = Some(deadpool_redis::PoolConfig::new(config.pool_max_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let client = redis::Client::open(config.url.as_str())?;

        let store = Self {
            pool,
            client,
            keys: KeySpace::new(config.key_prefix),
            clock,
            acquire_script: redis::Script::new(ACQUIRE_SCRIPT),
            release_script: redis::Script::new(RELEASE_SCRIPT),
            store_entry_script: redis::Script::new(STORE_ENTRY_SCRIPT),
            bump_version_script: redis::Script::new(BUMP_VERSION_SCRIPT),
        };

        // Fail fast on a bad URL or unreachable server.
        let mut conn = store.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        debug!(prefix = store.keys.prefix(), "Connected to Redis coordination store");

        Ok(store)
    }

    /// Gets an async connection from the pool.
    async fn get_connection(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Returns the key layout in use.
    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    fn parse_record(
        key: &str,
        graph_key: &GraphKey,
        fields: HashMap<String, String>,
    ) -> Result<Option<LockRecord>> {
        if fields.is_empty() {
            return Ok(None);
        }

        fn int<T: std::str::FromStr>(
            key: &str,
            fields: &HashMap<String, String>,
            name: &str,
        ) -> Result<T> {
            fields
                .get(name)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| StorageError::corrupt(key, format!("missing or invalid {}", name)))
        }

        let kind = fields.get("kind").map(String::as_str).unwrap_or_default();
        Ok(Some(LockRecord {
            graph_key: graph_key.clone(),
            holder_token: int(key, &fields, "holder_token")?,
            kind: LockKind::parse(kind),
            reader_count: int(key, &fields, "reader_count")?,
            acquired_at: int(key, &fields, "acquired_at")?,
            expires_at: int(key, &fields, "expires_at")?,
            seq: int(key, &fields, "seq")?,
        }))
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn acquire_lease(
        &self,
        graph_key: &GraphKey,
        kind: LockKind,
        ttl: Duration,
    ) -> Result<AcquireOutcome> {
        let mut conn = self.get_connection().await?;

        let (status, token): (String, u64) = self
            .acquire_script
            .key(self.keys.lock(graph_key))
            .key(self.keys.fence(graph_key))
            .key(self.keys.events(graph_key))
            .key(self.keys.known_keys())
            .arg(kind.as_str())
            .arg(self.clock.now_millis())
            .arg(duration_millis(ttl))
            .arg(graph_key.as_str())
            .invoke_async(&mut *conn)
            .await?;

        match status.as_str() {
            "acquired" => Ok(AcquireOutcome::Acquired(LockToken::new(
                graph_key.clone(),
                kind,
                token,
            ))),
            "locked" => Ok(AcquireOutcome::AlreadyLocked),
            "not_found" => Ok(AcquireOutcome::NotFound),
            other => Err(StorageError::corrupt(
                self.keys.lock(graph_key),
                format!("unexpected acquire status {:?}", other),
            )),
        }
    }

    async fn release_lease(&self, token: &LockToken) -> Result<ReleaseOutcome> {
        let mut conn = self.get_connection().await?;

        let released: i32 = self
            .release_script
            .key(self.keys.lock(&token.graph_key))
            .key(self.keys.events(&token.graph_key))
            .arg(token.token.to_string())
            .arg(token.kind.as_str())
            .arg(token.graph_key.as_str())
            .invoke_async(&mut *conn)
            .await?;

        Ok(if released == 1 {
            ReleaseOutcome::Released
        } else {
            ReleaseOutcome::LockLost
        })
    }

    async fn is_lease_valid(&self, token: &LockToken) -> Result<bool> {
        let now = self.clock.now_millis();
        Ok(self
            .lock_record(&token.graph_key)
            .await?
            .is_some_and(|record| record.is_held_by(token, now)))
    }

    async fn lock_record(&self, graph_key: &GraphKey) -> Result<Option<LockRecord>> {
        let mut conn = self.get_connection().await?;
        let key = self.keys.lock(graph_key);
        let fields: HashMap<String, String> = conn.hgetall(&key).await?;
        Self::parse_record(&key, graph_key, fields)
    }

    async fn subscribe(&self, graph_key: &GraphKey) -> Result<LockEventStream> {
        let channel = self.keys.events(graph_key);
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(move |msg| {
            let channel = channel.clone();
            async move {
                let payload: String = msg.get_payload().ok()?;
                match serde_json::from_str::<LockEvent>(&payload) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "Dropping undecodable lock event");
                        None
                    }
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn current_version(&self, graph_key: &GraphKey) -> Result<u64> {
        let mut conn = self.get_connection().await?;
        let version: Option<u64> = conn.get(self.keys.version(graph_key)).await?;
        Ok(version.unwrap_or(0))
    }

    async fn bump_version(&self, graph_key: &GraphKey) -> Result<u64> {
        let mut conn = self.get_connection().await?;
        let version: u64 = self
            .bump_version_script
            .key(self.keys.version(graph_key))
            .key(self.keys.known_keys())
            .key(self.keys.events(graph_key))
            .arg(graph_key.as_str())
            .invoke_async(&mut *conn)
            .await?;
        Ok(version)
    }

    async fn known_graph_keys(&self) -> Result<Vec<GraphKey>> {
        let mut conn = self.get_connection().await?;
        let members: Vec<String> = conn.smembers(self.keys.known_keys()).await?;
        let mut keys: Vec<GraphKey> = members.iter().map(|m| GraphKey::from(m.as_str())).collect();
        keys.sort();
        Ok(keys)
    }

    async fn load_entry(&self, key: &EntryKey) -> Result<Option<Vec<u8>>> {
        let mut conn = self.get_connection().await?;
        let bytes: Option<Vec<u8>> = conn.get(self.keys.entry(key)).await?;
        Ok(bytes)
    }

    async fn store_entry(
        &self,
        token: &LockToken,
        key: &EntryKey,
        bytes: Vec<u8>,
        ttl: Duration,
    ) -> Result<StoreOutcome> {
        let mut conn = self.get_connection().await?;

        let stored: i32 = self
            .store_entry_script
            .key(self.keys.lock(&token.graph_key))
            .key(self.keys.entry(key))
            .arg(token.token.to_string())
            .arg(self.clock.now_millis())
            .arg(duration_millis(ttl).max(1))
            .arg(bytes)
            .invoke_async(&mut *conn)
            .await?;

        Ok(if stored == 1 {
            StoreOutcome::Stored
        } else {
            StoreOutcome::LockLost
        })
    }

    fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }
}
