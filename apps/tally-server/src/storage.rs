use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use thiserror::Error;

use tally_core::ClientState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("state serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Opaque revision token for compare-and-swap writes: the serialized form
/// of the entry exactly as it was read, or `Absent` for a key that did not
/// exist at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    Absent,
    Value(String),
}

/// Shared keyed persistence for per-connection state, scoped to the
/// connection's lifetime. Writes are optimistic: a `put` only lands if the
/// entry is unchanged since the paired `get`, so two processes handling
/// the same identity cannot silently overwrite each other.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, connection_id: &str)
        -> Result<Option<(ClientState, Revision)>, StoreError>;
    /// Returns false when the entry changed since `revision` was read and
    /// nothing was written.
    async fn put(
        &self,
        connection_id: &str,
        state: &ClientState,
        revision: &Revision,
    ) -> Result<bool, StoreError>;
    async fn remove(&self, connection_id: &str) -> Result<(), StoreError>;
}

// GET/compare/SET as one atomic step. An empty expected value stands for
// "the key must not exist"; serialized states are never empty.
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '' then
    if current then return 0 end
elseif current ~= ARGV[1] then
    return 0
end
redis.call('SET', KEYS[1], ARGV[2], 'EX', tonumber(ARGV[3]))
return 1
"#;

pub struct RedisStore {
    redis: ConnectionManager,
    ttl_seconds: u64,
    cas: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str, ttl_seconds: u64) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;

        Ok(Self {
            redis,
            ttl_seconds,
            cas: Script::new(CAS_SCRIPT),
        })
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn get(
        &self,
        connection_id: &str,
    ) -> Result<Option<(ClientState, Revision)>, StoreError> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(state_key(connection_id)).await?;

        match value {
            Some(json) => {
                let state = serde_json::from_str(&json)?;
                Ok(Some((state, Revision::Value(json))))
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        connection_id: &str,
        state: &ClientState,
        revision: &Revision,
    ) -> Result<bool, StoreError> {
        let mut conn = self.redis.clone();
        let expected = match revision {
            Revision::Absent => "",
            Revision::Value(json) => json.as_str(),
        };
        let next = serde_json::to_string(state)?;
        let swapped: i64 = self
            .cas
            .key(state_key(connection_id))
            .arg(expected)
            .arg(&next)
            .arg(self.ttl_seconds)
            .invoke_async(&mut conn)
            .await?;
        Ok(swapped == 1)
    }

    async fn remove(&self, connection_id: &str) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(state_key(connection_id)).await?;
        Ok(())
    }
}

/// Simple in-memory store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: parking_lot::RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(
        &self,
        connection_id: &str,
    ) -> Result<Option<(ClientState, Revision)>, StoreError> {
        let guard = self.entries.read();
        match guard.get(connection_id) {
            Some(json) => {
                let state = serde_json::from_str(json)?;
                Ok(Some((state, Revision::Value(json.clone()))))
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        connection_id: &str,
        state: &ClientState,
        revision: &Revision,
    ) -> Result<bool, StoreError> {
        let next = serde_json::to_string(state)?;
        let mut guard = self.entries.write();
        let unchanged = match (guard.get(connection_id), revision) {
            (None, Revision::Absent) => true,
            (Some(current), Revision::Value(expected)) => current == expected,
            _ => false,
        };
        if !unchanged {
            return Ok(false);
        }
        guard.insert(connection_id.to_string(), next);
        Ok(true)
    }

    async fn remove(&self, connection_id: &str) -> Result<(), StoreError> {
        self.entries.write().remove(connection_id);
        Ok(())
    }
}

fn state_key(connection_id: &str) -> String {
    format!("client:{}", connection_id)
}
