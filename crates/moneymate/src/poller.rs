//! Client-side polling until a slip reaches a terminal state.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::SlipError;
use crate::slip::{Slip, SlipService};

/// Interval the web client polls at.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Anything that can report the current state of an owner's slip.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, owner_id: &str, slip_id: &str) -> Result<Slip, SlipError>;
}

#[async_trait]
impl StatusSource for SlipService {
    async fn fetch_status(&self, owner_id: &str, slip_id: &str) -> Result<Slip, SlipError> {
        self.get_status(owner_id, slip_id)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    /// `None` polls forever.
    pub max_attempts: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Slip {slip_id} still not finished after {attempts} attempts")]
    TimedOut { slip_id: String, attempts: u32 },

    #[error(transparent)]
    Source(#[from] SlipError),
}

/// Polls `source` until the slip is `completed` or `failed` and returns it.
pub async fn poll_until_terminal<S>(
    source: &S,
    owner_id: &str,
    slip_id: &str,
    config: PollConfig,
) -> Result<Slip, PollError>
where
    S: StatusSource + ?Sized,
{
    let mut attempts = 0u32;
    loop {
        let slip = source.fetch_status(owner_id, slip_id).await?;
        attempts += 1;

        if slip.status.is_terminal() {
            log::debug!("Slip {} reached {} after {} poll(s)", slip_id, slip.status, attempts);
            return Ok(slip);
        }

        if config.max_attempts.is_some_and(|max| attempts >= max) {
            return Err(PollError::TimedOut {
                slip_id: slip_id.to_string(),
                attempts,
            });
        }

        tokio::time::sleep(config.interval).await;
    }
}
