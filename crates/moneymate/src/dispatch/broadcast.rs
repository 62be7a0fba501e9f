//! In-process job channel backed by `tokio::sync::broadcast`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{JobMessage, JobPublisher};
use crate::error::DispatchError;

/// A published payload together with the channel it was sent on.
#[derive(Debug, Clone)]
pub struct PublishedJob {
    pub channel: String,
    pub payload: String,
}

impl PublishedJob {
    pub fn decode(&self) -> Result<JobMessage, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// Broadcasts job payloads to in-process subscribers.
///
/// Same delivery semantics as a pub/sub server: a payload sent while
/// nobody is subscribed is dropped.
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: Arc<broadcast::Sender<PublishedJob>>,
}

impl BroadcastPublisher {
    /// Creates a new publisher with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Creates a new subscriber for job payloads.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedJob> {
        self.sender.subscribe()
    }

    /// Returns the current number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl JobPublisher for BroadcastPublisher {
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, DispatchError> {
        let job = PublishedJob {
            channel: channel.to_string(),
            payload: payload.to_string(),
        };
        // No active receivers is not an error; the job is simply lost.
        Ok(self.sender.send(job).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_lost() {
        let publisher = BroadcastPublisher::new(4);
        let receivers = publisher.publish("ocr:jobs", "{}").await.unwrap();
        assert_eq!(receivers, 0);

        // A late subscriber does not see earlier messages.
        let mut rx = publisher.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribers_receive_payload() {
        let publisher = BroadcastPublisher::new(4);
        let mut rx1 = publisher.subscribe();
        let mut rx2 = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 2);

        let receivers = publisher.publish("ocr:jobs", r#"{"a":1}"#).await.unwrap();
        assert_eq!(receivers, 2);

        let got1 = rx1.recv().await.unwrap();
        let got2 = rx2.recv().await.unwrap();
        assert_eq!(got1.channel, "ocr:jobs");
        assert_eq!(got1.payload, r#"{"a":1}"#);
        assert_eq!(got2.payload, got1.payload);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let publisher = BroadcastPublisher::new(0);
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
