//! Assembles the slip pipeline from configuration.

use std::sync::Arc;

use crate::config::{Config, DispatchBackend, DispatchConfig};
use crate::db::Database;
use crate::dispatch::{BroadcastPublisher, JobDispatcher, JobPublisher, RedisPublisher};
use crate::error::{DispatchError, Result};
use crate::slip::SlipService;
use crate::storage::SlipStorage;

/// A ready-to-use [`SlipService`] plus the handles needed around it.
#[derive(Clone)]
pub struct Pipeline {
    pub service: SlipService,
    /// Set for the in-process backend so a local worker can subscribe.
    pub broadcast: Option<BroadcastPublisher>,
}

impl Pipeline {
    /// Opens the database, prepares the uploads directory and connects the
    /// configured job channel.
    pub fn from_config(config: &Config) -> Result<Self> {
        let db = Database::open(&config.database.resolved_path()?)?;
        Self::with_database(config, db)
    }

    /// Like [`from_config`](Self::from_config) with an already-open store.
    pub fn with_database(config: &Config, db: Database) -> Result<Self> {
        let storage = SlipStorage::new(&config.uploads.directory);
        storage.ensure_directory()?;
        log::info!(
            "Storing uploads in {}",
            storage.upload_directory().display()
        );

        let (publisher, broadcast) = build_publisher(&config.dispatch)?;
        let dispatcher = JobDispatcher::new(
            publisher,
            &config.dispatch.channel,
            &config.server.public_url,
        );
        log::info!(
            "Dispatching OCR jobs on '{}' ({:?}); callbacks to {}",
            dispatcher.channel(),
            config.dispatch.backend,
            dispatcher.callback_url()
        );

        let service = SlipService::new(db, storage, dispatcher, config.uploads.policy()?);
        Ok(Self { service, broadcast })
    }
}

/// Creates the publisher for the configured backend.
pub fn build_publisher(
    dispatch: &DispatchConfig,
) -> std::result::Result<(Arc<dyn JobPublisher>, Option<BroadcastPublisher>), DispatchError> {
    match dispatch.backend {
        DispatchBackend::Redis => {
            let publisher = RedisPublisher::new(&dispatch.redis_url)?;
            Ok((Arc::new(publisher), None))
        }
        DispatchBackend::Broadcast => {
            let publisher = BroadcastPublisher::new(dispatch.broadcast_capacity);
            Ok((Arc::new(publisher.clone()), Some(publisher)))
        }
    }
}
