use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::Client;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use sync_bus::{Bus, BusError, BusMessage, BusResult, LocalBus};

/// Redis-backed fanout bus. Publishes go out over a dedicated connection;
/// a bridge task holds its own pub/sub connection, mirroring each Redis
/// channel into a `LocalBus` that local subscribers consume through the
/// usual broadcast surface. A message published here is observed through
/// Redis like everyone else's, so every process (this one included) sees
/// the same stream.
pub struct RedisBus {
    publisher: ConnectionManager,
    local: Arc<LocalBus>,
}

impl RedisBus {
    /// Connects and starts bridging the given Redis channels. Channels not
    /// listed here can still be published to, but have no local
    /// subscribers on this process.
    pub async fn connect(redis_url: &str, channels: &[&str]) -> BusResult<Self> {
        let client = Client::open(redis_url).map_err(transport)?;
        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(transport)?;

        let mut pubsub = client.get_async_pubsub().await.map_err(transport)?;
        for channel in channels {
            pubsub.subscribe(*channel).await.map_err(transport)?;
        }

        let local = Arc::new(LocalBus::new());
        let bridge = Arc::clone(&local);
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let channel = msg.get_channel_name().to_string();
                let payload: Vec<u8> = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(channel = %channel, error = %err, "unreadable bus payload");
                        continue;
                    }
                };
                trace!(channel = %channel, bytes = payload.len(), "bridging bus message");
                if let Err(err) = bridge.publish(&channel, Bytes::from(payload)).await {
                    // No local subscriber yet; the message is for another
                    // process's connections anyway.
                    debug!(channel = %channel, error = %err, "dropped bridged message");
                }
            }
            warn!("redis pub/sub stream ended; cross-process updates stopped");
        });

        Ok(Self { publisher, local })
    }
}

#[async_trait]
impl Bus for RedisBus {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage> {
        self.local.subscribe(topic)
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> BusResult<()> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(topic)
            .arg(payload.as_ref())
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        trace!(topic, receivers, "published bus message");
        Ok(())
    }
}

fn transport(err: redis::RedisError) -> BusError {
    BusError::Transport(err.to_string())
}
