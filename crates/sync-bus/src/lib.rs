use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus channel closed")]
    Closed,
    #[error("bus transport error: {0}")]
    Transport(String),
}

pub type BusResult<T> = Result<T, BusError>;

/// Publish/subscribe fanout shared by every process in the deployment.
/// `publish` is async because production buses sit on a network; local
/// subscribers always consume through a broadcast receiver.
#[async_trait]
pub trait Bus: Send + Sync {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage>;
    async fn publish(&self, topic: &str, payload: Bytes) -> BusResult<()>;
}

/// Simple in-memory bus for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct LocalBus {
    topics: parking_lot::RwLock<std::collections::HashMap<String, broadcast::Sender<BusMessage>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<BusMessage> {
        let mut guard = self.topics.write();
        guard
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }
}

#[async_trait]
impl Bus for LocalBus {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage> {
        self.sender_for(topic).subscribe()
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> BusResult<()> {
        let sender = self.sender_for(topic);
        sender
            .send(BusMessage {
                topic: topic.to_string(),
                payload,
            })
            .map(|_| ())
            .map_err(|_| BusError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_bus_round_trip() {
        let bus = LocalBus::new();
        let mut sub = bus.subscribe("state_updates");
        bus.publish("state_updates", Bytes::from_static(b"conn-1"))
            .await
            .expect("publish ok");
        let msg = sub.recv().await.expect("receive ok");
        assert_eq!(msg.topic, "state_updates");
        assert_eq!(msg.payload, Bytes::from_static(b"conn-1"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_reports_closed() {
        let bus = LocalBus::new();
        let result = bus.publish("state_updates", Bytes::from_static(b"conn-1")).await;
        assert!(matches!(result, Err(BusError::Closed)));
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = LocalBus::new();
        let mut a = bus.subscribe("a");
        let mut b = bus.subscribe("b");
        bus.publish("a", Bytes::from_static(b"only-a"))
            .await
            .expect("publish ok");
        let msg = a.recv().await.expect("receive ok");
        assert_eq!(msg.payload, Bytes::from_static(b"only-a"));
        assert!(b.try_recv().is_err());
    }
}
