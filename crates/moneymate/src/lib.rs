pub mod callback;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod poller;
pub mod sanitize;
pub mod secrets;
pub mod slip;
pub mod storage;
pub mod upload;

pub use callback::{reconcile, CallbackError, CallbackOutcome, CallbackPayload, CallbackReport};
pub use config::{load_config, Config};
pub use db::Database;
pub use dispatch::{BroadcastPublisher, JobDispatcher, JobMessage, JobPublisher, RedisPublisher};
pub use error::{
    ConfigError, DispatchError, MoneymateError, Result, SlipError, StorageError, UploadError,
};
pub use pipeline::Pipeline;
pub use poller::{poll_until_terminal, PollConfig, PollError, StatusSource};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use slip::{Slip, SlipResult, SlipService, SlipStatus, UploadedSlip};
pub use storage::SlipStorage;
pub use upload::{ImageKind, UploadPolicy};
