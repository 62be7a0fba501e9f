//! OCR job dispatch.
//!
//! A job message is published once to a pub/sub channel the OCR worker
//! subscribes to. Delivery is fire-and-forget: nothing is acknowledged or
//! retried, and a message published while no worker listens is lost. The
//! slip record stays the source of truth; lost jobs are recovered by
//! re-queueing the slip.

pub mod broadcast;
pub mod redis_pubsub;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::error::DispatchError;
use crate::sanitize;

pub use self::broadcast::BroadcastPublisher;
pub use self::redis_pubsub::RedisPublisher;

/// Default channel name shared with the OCR worker.
pub const DEFAULT_CHANNEL: &str = "ocr:jobs";

/// Path of the worker callback endpoint, relative to the public base URL.
pub const CALLBACK_PATH: &str = "/api/slips/callback";

/// Message published for each OCR job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobMessage {
    /// Correlation id; the slip id.
    pub job_id: String,
    /// Absolute path of the stored image.
    pub image_path: String,
    /// Endpoint the worker must call with the result.
    pub callback_url: String,
    #[serde(rename = "slipId")]
    pub slip_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

impl JobMessage {
    pub fn new(slip_id: &str, user_id: &str, image_path: &Path, callback_url: &str) -> Self {
        Self {
            job_id: slip_id.to_string(),
            image_path: image_path.display().to_string(),
            callback_url: callback_url.to_string(),
            slip_id: slip_id.to_string(),
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Transport that carries encoded job messages to the worker.
#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Publishes `payload` on `channel`. Returns the number of subscribers
    /// that received it, as reported by the transport.
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, DispatchError>;
}

/// Builds job messages and hands them to a [`JobPublisher`].
#[derive(Clone)]
pub struct JobDispatcher {
    publisher: Arc<dyn JobPublisher>,
    channel: String,
    callback_url: String,
}

impl JobDispatcher {
    pub fn new(publisher: Arc<dyn JobPublisher>, channel: &str, public_url: &str) -> Self {
        Self {
            publisher,
            channel: channel.to_string(),
            callback_url: callback_url(public_url),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Publishes one job for a slip. Does not touch the slip record.
    pub async fn dispatch(
        &self,
        slip_id: &str,
        user_id: &str,
        image_path: &Path,
    ) -> Result<JobMessage, DispatchError> {
        let span = tracing::info_span!(
            "dispatch.publish",
            slip_id = %slip_id,
            channel = %self.channel,
            image = %sanitize::redact_path(image_path),
        );

        async {
            let job = JobMessage::new(slip_id, user_id, image_path, &self.callback_url);
            let payload = serde_json::to_string(&job)?;
            let receivers = self.publisher.publish(&self.channel, &payload).await?;

            if receivers == 0 {
                log::warn!(
                    "OCR job for slip {} published to '{}' with no subscribers; it will be lost",
                    slip_id,
                    self.channel
                );
            } else {
                log::info!(
                    "Published OCR job for slip {} to '{}' ({} subscriber(s))",
                    slip_id,
                    self.channel,
                    receivers
                );
            }

            Ok::<_, DispatchError>(job)
        }
        .instrument(span)
        .await
    }
}

/// Joins the public base URL and the callback path.
pub fn callback_url(public_url: &str) -> String {
    format!("{}{}", public_url.trim_end_matches('/'), CALLBACK_PATH)
}


#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::testing::RecordingPublisher;
    use super::*;

    #[test]
    fn test_callback_url_joins_without_double_slash() {
        assert_eq!(
            callback_url("http://api.local:3000/"),
            "http://api.local:3000/api/slips/callback"
        );
        assert_eq!(
            callback_url("http://api.local:3000"),
            "http://api.local:3000/api/slips/callback"
        );
    }

    #[test]
    fn test_job_message_wire_format() {
        let job = JobMessage::new(
            "slip-1",
            "user-1",
            &PathBuf::from("/srv/uploads/abc.jpg"),
            "http://x/api/slips/callback",
        );
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["job_id"], "slip-1");
        assert_eq!(json["image_path"], "/srv/uploads/abc.jpg");
        assert_eq!(json["callback_url"], "http://x/api/slips/callback");
        assert_eq!(json["slipId"], "slip-1");
        assert_eq!(json["userId"], "user-1");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_dispatch_publishes_once_on_channel() {
        let publisher = Arc::new(RecordingPublisher::default());
        let dispatcher = JobDispatcher::new(publisher.clone(), "ocr:test", "http://api");

        let job = dispatcher
            .dispatch("s1", "u1", Path::new("/data/s1.png"))
            .await
            .unwrap();

        let published = publisher.published.lock().unwrap().clone();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "ocr:test");
        let sent: JobMessage = serde_json::from_str(&published[0].1).unwrap();
        assert_eq!(sent, job);
        assert_eq!(sent.callback_url, "http://api/api/slips/callback");
    }

    #[tokio::test]
    async fn test_dispatch_propagates_publish_failure() {
        let dispatcher =
            JobDispatcher::new(Arc::new(RecordingPublisher::failing()), "ocr:test", "http://api");
        let err = dispatcher
            .dispatch("s1", "u1", Path::new("/data/s1.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Publish { .. }));
    }
}
