//! Redis `PUBLISH` transport for OCR jobs.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::OnceCell;

use super::JobPublisher;
use crate::error::DispatchError;

/// Publishes job payloads to a Redis pub/sub channel.
///
/// The connection is opened lazily on the first publish, so the service can
/// start while Redis is still coming up.
pub struct RedisPublisher {
    client: redis::Client,
    conn: OnceCell<MultiplexedConnection>,
}

impl RedisPublisher {
    pub fn new(redis_url: &str) -> Result<Self, DispatchError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| DispatchError::Connect(e.to_string()))?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, DispatchError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let conn = self
                    .client
                    .get_multiplexed_tokio_connection()
                    .await
                    .map_err(|e| DispatchError::Connect(e.to_string()))?;
                log::info!("Connected to Redis job channel");
                Ok::<_, DispatchError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl JobPublisher for RedisPublisher {
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, DispatchError> {
        let mut conn = self.connection().await?;
        let receivers: usize =
            conn.publish(channel, payload)
                .await
                .map_err(|e| DispatchError::Publish {
                    channel: channel.to_string(),
                    reason: e.to_string(),
                })?;
        Ok(receivers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_url() {
        let result = RedisPublisher::new("not a redis url");
        assert!(matches!(result, Err(DispatchError::Connect(_))));
    }

    #[test]
    fn test_accepts_url_without_connecting() {
        assert!(RedisPublisher::new("redis://127.0.0.1:1").is_ok());
    }
}
