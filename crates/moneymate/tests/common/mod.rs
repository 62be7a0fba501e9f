//! Shared test utilities for moneymate integration tests.
//!
//! `TestHarness` wires a `SlipService` over an in-memory database, a temp
//! uploads directory and an in-process broadcast job channel.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;

use moneymate::callback::{reconcile, CallbackOutcome, CallbackPayload};
use moneymate::dispatch::broadcast::PublishedJob;
use moneymate::{
    BroadcastPublisher, Database, JobDispatcher, Slip, SlipService, SlipStorage, UploadPolicy,
};

/// Smallest JPEG header `image::guess_format` recognises.
pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
/// PNG signature plus padding.
pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

pub const CHANNEL: &str = "ocr:test";
pub const PUBLIC_URL: &str = "http://moneymate.test";

pub struct TestHarness {
    temp_dir: TempDir,
    pub service: SlipService,
    pub channel: BroadcastPublisher,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let channel = BroadcastPublisher::new(64);
        let dispatcher = JobDispatcher::new(Arc::new(channel.clone()), CHANNEL, PUBLIC_URL);
        let service = SlipService::new(
            Database::open_in_memory().expect("Failed to open test database"),
            SlipStorage::new(temp_dir.path().join("uploads")),
            dispatcher,
            UploadPolicy::default(),
        );

        Self {
            temp_dir,
            service,
            channel,
        }
    }

    pub fn uploads_dir(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("uploads")
    }

    /// Uploads a JPEG as `owner` and returns the created slip.
    pub async fn upload_jpeg(&self, owner: &str, name: &str) -> Slip {
        self.service
            .upload(owner, name, Some("image/jpeg"), JPEG)
            .await
            .expect("upload failed")
            .slip
    }

    /// Runs a worker callback body through validation and reconciliation.
    pub async fn callback(&self, body: Value) -> CallbackOutcome {
        let payload: CallbackPayload = serde_json::from_value(body).expect("bad callback body");
        let report = payload.validate().expect("callback rejected");
        reconcile(&self.service, &report)
            .await
            .expect("reconcile failed")
    }
}

/// Drains every job currently buffered on a subscription.
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<PublishedJob>) -> Vec<PublishedJob> {
    let mut jobs = Vec::new();
    while let Ok(job) = rx.try_recv() {
        jobs.push(job);
    }
    jobs
}
