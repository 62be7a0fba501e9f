//! Owner-scoped slip operations: upload, status and result queries,
//! listing, status transitions and re-queueing.

use chrono::Utc;
use serde::Serialize;
use tracing::Instrument;

use super::{format_timestamp, Slip, SlipStatus};
use crate::db::slip_repo::{self, SlipRow, StatusChange};
use crate::db::Database;
use crate::dispatch::{JobDispatcher, JobMessage};
use crate::error::SlipError;
use crate::sanitize;
use crate::storage::SlipStorage;
use crate::upload::UploadPolicy;

/// Result body returned once a slip is completed.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlipResult {
    pub ocr_result: Option<serde_json::Value>,
}

/// A freshly uploaded slip and the job published for it, if publishing
/// succeeded.
#[derive(Debug, Clone)]
pub struct UploadedSlip {
    pub slip: Slip,
    pub job: Option<JobMessage>,
}

/// The slip pipeline over an injected store, image storage and dispatcher.
#[derive(Clone)]
pub struct SlipService {
    db: Database,
    storage: SlipStorage,
    dispatcher: JobDispatcher,
    policy: UploadPolicy,
}

impl SlipService {
    pub fn new(
        db: Database,
        storage: SlipStorage,
        dispatcher: JobDispatcher,
        policy: UploadPolicy,
    ) -> Self {
        Self {
            db,
            storage,
            dispatcher,
            policy,
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub fn storage(&self) -> &SlipStorage {
        &self.storage
    }

    /// Inserts a new `pending` record. Does not dispatch.
    pub fn create(
        &self,
        owner_id: &str,
        stored_filename: &str,
        original_filename: &str,
    ) -> Result<Slip, SlipError> {
        let row = SlipRow {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            stored_filename: stored_filename.to_string(),
            original_filename: sanitize::display_filename(original_filename),
            status: SlipStatus::Pending.as_str().to_string(),
            ocr_result: None,
            created_at: format_timestamp(Utc::now()),
            processed_at: None,
        };
        slip_repo::insert(&self.db, &row)?;
        Ok(Slip::from_row(row)?)
    }

    /// Validates and stores an image, creates its record, then publishes
    /// the OCR job.
    ///
    /// Create and dispatch fail independently: if publishing fails the slip
    /// is still returned as `pending` and can be re-queued later.
    pub async fn upload(
        &self,
        owner_id: &str,
        original_filename: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<UploadedSlip, SlipError> {
        let span = tracing::info_span!("slip.upload", owner_id = %owner_id, size = bytes.len());

        async {
            let kind = self.policy.validate(content_type, bytes)?;
            let stored = self.storage.store(bytes, kind)?;
            let slip = match self.create(owner_id, &stored.filename, original_filename) {
                Ok(slip) => slip,
                Err(e) => {
                    // No record points at the image, so nothing could re-queue it.
                    if let Err(remove_err) = self.storage.remove(&stored) {
                        log::warn!(
                            "Failed to remove orphaned upload {}: {}",
                            sanitize::hash_path(&stored.path),
                            remove_err
                        );
                    }
                    return Err(e);
                }
            };

            log::info!(
                "Created slip {} for user {} (file {})",
                slip.id,
                owner_id,
                sanitize::hash_path(&stored.path)
            );

            let job = match self
                .dispatcher
                .dispatch(&slip.id, owner_id, &stored.path)
                .await
            {
                Ok(job) => Some(job),
                Err(e) => {
                    log::error!(
                        "Failed to dispatch OCR job for slip {}: {}; slip stays pending until re-queued",
                        slip.id,
                        e
                    );
                    None
                }
            };

            Ok::<_, SlipError>(UploadedSlip { slip, job })
        }
        .instrument(span)
        .await
    }

    /// Owner-scoped read: `NotFound` if the id is unknown, `Forbidden` if
    /// the slip belongs to someone else.
    pub fn get_by_id(&self, owner_id: &str, slip_id: &str) -> Result<Slip, SlipError> {
        let row = slip_repo::find_by_id(&self.db, slip_id)?.ok_or(SlipError::NotFound)?;
        if row.owner_id != owner_id {
            return Err(SlipError::Forbidden);
        }
        Ok(Slip::from_row(row)?)
    }

    /// Current lifecycle state, used for polling.
    pub fn get_status(&self, owner_id: &str, slip_id: &str) -> Result<Slip, SlipError> {
        self.get_by_id(owner_id, slip_id)
    }

    /// Parsed OCR result; only available once the slip is `completed`.
    pub fn get_result(&self, owner_id: &str, slip_id: &str) -> Result<SlipResult, SlipError> {
        let slip = self.get_by_id(owner_id, slip_id)?;
        if slip.status != SlipStatus::Completed {
            return Err(SlipError::NotCompleted {
                status: slip.status,
            });
        }
        Ok(SlipResult {
            ocr_result: slip.ocr_result,
        })
    }

    /// All slips of an owner, newest first.
    pub fn list(&self, owner_id: &str) -> Result<Vec<Slip>, SlipError> {
        slip_repo::list_by_owner(&self.db, owner_id)?
            .into_iter()
            .map(|row| Slip::from_row(row).map_err(SlipError::from))
            .collect()
    }

    /// Number of slips still waiting for a worker (`pending`), across all owners.
    pub fn pending_count(&self) -> Result<u64, SlipError> {
        Ok(slip_repo::count_by_status(
            &self.db,
            SlipStatus::Pending.as_str(),
        )?)
    }

    /// Sets the status of a slip by id alone (not owner-scoped).
    ///
    /// A terminal status stamps `processed_at`; the payload is kept only
    /// when the new status is `completed`.
    pub fn update_status(
        &self,
        slip_id: &str,
        status: SlipStatus,
        ocr_result: Option<&serde_json::Value>,
    ) -> Result<Slip, SlipError> {
        if !self.apply(slip_id, status, ocr_result, None)? {
            return Err(SlipError::NotFound);
        }
        self.reload(slip_id)
    }

    /// Like [`update_status`](Self::update_status), but only if the current
    /// status is one of `from`. Returns `None` when the slip exists but was
    /// in another state.
    pub fn transition(
        &self,
        slip_id: &str,
        from: &[SlipStatus],
        to: SlipStatus,
        ocr_result: Option<&serde_json::Value>,
    ) -> Result<Option<Slip>, SlipError> {
        if self.apply(slip_id, to, ocr_result, Some(from))? {
            return self.reload(slip_id).map(Some);
        }
        // Distinguish "no such slip" from "guard did not hold".
        slip_repo::find_by_id(&self.db, slip_id)?.ok_or(SlipError::NotFound)?;
        Ok(None)
    }

    /// Status of a slip by id alone, for the trusted callback path.
    pub fn current_status(&self, slip_id: &str) -> Result<SlipStatus, SlipError> {
        Ok(self.reload(slip_id)?.status)
    }

    /// Resets a `pending` or `failed` slip to `pending` and publishes a new
    /// job for the stored image.
    pub async fn requeue(&self, owner_id: &str, slip_id: &str) -> Result<Slip, SlipError> {
        let span = tracing::info_span!("slip.requeue", owner_id = %owner_id, slip_id = %slip_id);

        async {
            let current = self.get_by_id(owner_id, slip_id)?;
            if !current.status.is_requeueable() {
                return Err(SlipError::NotRequeueable {
                    status: current.status,
                });
            }

            let from: Vec<&str> = SlipStatus::REQUEUEABLE.iter().map(|s| s.as_str()).collect();
            let now = format_timestamp(Utc::now());
            if !slip_repo::reset_to_pending(&self.db, slip_id, &from, &now)? {
                // Lost a race with a callback.
                let current = self.get_by_id(owner_id, slip_id)?;
                return Err(SlipError::NotRequeueable {
                    status: current.status,
                });
            }
            let slip = self.reload(slip_id)?;

            let image_path = self.storage.path_for(&slip.stored_filename)?;
            self.dispatcher
                .dispatch(&slip.id, owner_id, &image_path)
                .await?;

            log::info!("Re-queued slip {} for OCR processing", slip.id);
            Ok::<_, SlipError>(slip)
        }
        .instrument(span)
        .await
    }

    fn apply(
        &self,
        slip_id: &str,
        status: SlipStatus,
        ocr_result: Option<&serde_json::Value>,
        only_if: Option<&[SlipStatus]>,
    ) -> Result<bool, SlipError> {
        if ocr_result.is_some() && status != SlipStatus::Completed {
            log::warn!(
                "Ignoring OCR payload for slip {}: status {} cannot carry a result",
                slip_id,
                status
            );
        }

        let encoded = match ocr_result {
            Some(value) if status == SlipStatus::Completed => Some(
                serde_json::to_string(value).map_err(|e| crate::db::DatabaseError::InvalidRow {
                    id: slip_id.to_string(),
                    reason: format!("ocr_result cannot be encoded: {}", e),
                })?,
            ),
            _ => None,
        };
        let guard: Option<Vec<&str>> = only_if.map(|s| s.iter().map(|st| st.as_str()).collect());
        let now = format_timestamp(Utc::now());

        let change = StatusChange {
            status: status.as_str(),
            ocr_result: encoded.as_deref(),
            now: &now,
            only_if_status: guard.as_deref(),
        };
        Ok(slip_repo::update_status(&self.db, slip_id, &change)?)
    }

    fn reload(&self, slip_id: &str) -> Result<Slip, SlipError> {
        let row = slip_repo::find_by_id(&self.db, slip_id)?.ok_or(SlipError::NotFound)?;
        Ok(Slip::from_row(row)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::dispatch::testing::RecordingPublisher;
    use crate::error::UploadError;
    use crate::upload::fixtures::{JPEG, PNG};

    struct Fixture {
        service: SlipService,
        publisher: Arc<RecordingPublisher>,
        db: Database,
        dir: tempfile::TempDir,
    }

    fn fixture_with(publisher: RecordingPublisher) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Arc::new(publisher);
        let dispatcher = JobDispatcher::new(publisher.clone(), "ocr:jobs", "http://api.test");
        let db = Database::open_in_memory().unwrap();
        let service = SlipService::new(
            db.clone(),
            SlipStorage::new(dir.path()),
            dispatcher,
            UploadPolicy::default(),
        );
        Fixture {
            service,
            publisher,
            db,
            dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingPublisher::default())
    }

    fn assert_invariants(slip: &Slip) {
        if slip.ocr_result.is_some() {
            assert_eq!(slip.status, SlipStatus::Completed);
        }
        assert_eq!(slip.processed_at.is_some(), slip.status.is_terminal());
    }

    #[test]
    fn test_create_starts_pending() {
        let f = fixture();
        let slip = f.service.create("u1", "a.jpg", "receipt.jpg").unwrap();
        assert_eq!(slip.status, SlipStatus::Pending);
        assert!(slip.ocr_result.is_none());
        assert!(slip.processed_at.is_none());
        assert_eq!(slip.owner_id, "u1");
        assert!(f.publisher.jobs().is_empty());
    }

    #[test]
    fn test_create_sanitizes_original_name() {
        let f = fixture();
        let slip = f.service.create("u1", "a.jpg", "../../x/receipt.jpg").unwrap();
        assert_eq!(slip.original_filename, "receipt.jpg");
    }

    #[tokio::test]
    async fn test_upload_stores_creates_and_dispatches() {
        let f = fixture();
        let uploaded = f
            .service
            .upload("u1", "receipt.jpg", Some("image/jpeg"), JPEG)
            .await
            .unwrap();

        let slip = uploaded.slip;
        assert_eq!(slip.status, SlipStatus::Pending);
        assert_eq!(slip.original_filename, "receipt.jpg");
        assert!(slip.stored_filename.ends_with(".jpg"));

        let jobs = f.publisher.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id, slip.id);
        assert_eq!(jobs[0].user_id, "u1");
        assert_eq!(
            jobs[0].image_path,
            f.service
                .storage()
                .path_for(&slip.stored_filename)
                .unwrap()
                .display()
                .to_string()
        );
        assert_eq!(jobs[0].callback_url, "http://api.test/api/slips/callback");
        assert_eq!(uploaded.job.unwrap(), jobs[0]);
    }

    #[tokio::test]
    async fn test_upload_rejects_invalid_file_without_record() {
        let f = fixture();
        let err = f
            .service
            .upload("u1", "doc.pdf", Some("application/pdf"), b"%PDF")
            .await
            .unwrap_err();
        assert!(matches!(err, SlipError::Upload(UploadError::UnsupportedType(_))));
        assert!(f.service.list("u1").unwrap().is_empty());
        assert!(f.publisher.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_upload_survives_dispatch_failure() {
        let f = fixture_with(RecordingPublisher::failing());
        let uploaded = f
            .service
            .upload("u1", "r.png", Some("image/png"), PNG)
            .await
            .unwrap();
        assert!(uploaded.job.is_none());
        assert_eq!(
            f.service.get_status("u1", &uploaded.slip.id).unwrap().status,
            SlipStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_upload_removes_image_when_record_insert_fails() {
        let f = fixture();
        f.db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE slips")?;
            Ok(())
        })
        .unwrap();

        let err = f
            .service
            .upload("u1", "r.jpg", Some("image/jpeg"), JPEG)
            .await
            .unwrap_err();

        assert!(matches!(err, SlipError::Database(_)));
        assert_eq!(std::fs::read_dir(f.dir.path()).unwrap().count(), 0);
        assert!(f.publisher.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_pending_count_tracks_backlog() {
        let f = fixture();
        assert_eq!(f.service.pending_count().unwrap(), 0);

        let a = f.service.upload("u1", "r.jpg", Some("image/jpeg"), JPEG).await.unwrap();
        f.service.upload("u2", "r.png", Some("image/png"), PNG).await.unwrap();
        assert_eq!(f.service.pending_count().unwrap(), 2);

        f.service
            .update_status(&a.slip.id, SlipStatus::Failed, None)
            .unwrap();
        assert_eq!(f.service.pending_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_two_uploads_are_independent() {
        let f = fixture();
        let a = f.service.upload("u1", "r.jpg", Some("image/jpeg"), JPEG).await.unwrap();
        let b = f.service.upload("u1", "r.jpg", Some("image/jpeg"), JPEG).await.unwrap();
        assert_ne!(a.slip.id, b.slip.id);
        assert_ne!(a.slip.stored_filename, b.slip.stored_filename);

        f.service
            .update_status(&a.slip.id, SlipStatus::Completed, Some(&json!({"amount": 1})))
            .unwrap();
        assert_eq!(
            f.service.get_status("u1", &b.slip.id).unwrap().status,
            SlipStatus::Pending
        );
    }

    #[test]
    fn test_get_by_id_not_found_and_forbidden() {
        let f = fixture();
        let slip = f.service.create("u1", "a.jpg", "a.jpg").unwrap();

        assert!(matches!(
            f.service.get_by_id("u1", "nonexistent-id"),
            Err(SlipError::NotFound)
        ));
        assert!(matches!(
            f.service.get_by_id("u2", &slip.id),
            Err(SlipError::Forbidden)
        ));
        assert_eq!(f.service.get_by_id("u1", &slip.id).unwrap().id, slip.id);
    }

    #[test]
    fn test_get_result_gated_on_completed() {
        let f = fixture();
        let slip = f.service.create("u1", "a.jpg", "a.jpg").unwrap();

        for status in [SlipStatus::Pending, SlipStatus::Processing, SlipStatus::Failed] {
            f.service.update_status(&slip.id, status, None).unwrap();
            match f.service.get_result("u1", &slip.id) {
                Err(SlipError::NotCompleted { status: s }) => assert_eq!(s, status),
                other => panic!("expected NotCompleted, got {:?}", other),
            }
        }

        f.service
            .update_status(&slip.id, SlipStatus::Completed, Some(&json!({"amount": 125.5})))
            .unwrap();
        let result = f.service.get_result("u1", &slip.id).unwrap();
        assert_eq!(result.ocr_result, Some(json!({"amount": 125.5})));
        assert!(matches!(
            f.service.get_result("u2", &slip.id),
            Err(SlipError::Forbidden)
        ));
    }

    #[test]
    fn test_list_is_owner_scoped_newest_first() {
        let f = fixture();
        let first = f.service.create("u1", "1.jpg", "1.jpg").unwrap();
        let second = f.service.create("u1", "2.jpg", "2.jpg").unwrap();
        f.service.create("u2", "3.jpg", "3.jpg").unwrap();

        let ids: Vec<String> = f.service.list("u1").unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert!(f.service.list("nobody").unwrap().is_empty());
    }

    #[test]
    fn test_update_status_maintains_invariants() {
        let f = fixture();
        let slip = f.service.create("u1", "a.jpg", "a.jpg").unwrap();
        let payload = json!({"amount": 10});

        let steps = [
            (SlipStatus::Processing, None),
            (SlipStatus::Completed, Some(&payload)),
            (SlipStatus::Failed, Some(&payload)),
            (SlipStatus::Pending, None),
            (SlipStatus::Failed, None),
        ];
        for (status, data) in steps {
            let updated = f.service.update_status(&slip.id, status, data).unwrap();
            assert_eq!(updated.status, status);
            assert_invariants(&updated);
        }
    }

    #[test]
    fn test_update_status_unknown_slip() {
        let f = fixture();
        assert!(matches!(
            f.service.update_status("missing", SlipStatus::Failed, None),
            Err(SlipError::NotFound)
        ));
    }

    #[test]
    fn test_transition_guard() {
        let f = fixture();
        let slip = f.service.create("u1", "a.jpg", "a.jpg").unwrap();

        let done = f
            .service
            .transition(
                &slip.id,
                &SlipStatus::NON_TERMINAL,
                SlipStatus::Completed,
                Some(&json!({"a": 1})),
            )
            .unwrap();
        assert!(done.is_some());

        let again = f
            .service
            .transition(&slip.id, &SlipStatus::NON_TERMINAL, SlipStatus::Failed, None)
            .unwrap();
        assert!(again.is_none());
        let current = f.service.get_by_id("u1", &slip.id).unwrap();
        assert_eq!(current.status, SlipStatus::Completed);
        assert_eq!(current.ocr_result, Some(json!({"a": 1})));

        assert!(matches!(
            f.service
                .transition("missing", &SlipStatus::NON_TERMINAL, SlipStatus::Failed, None),
            Err(SlipError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_requeue_failed_resets_and_redispatches() {
        let f = fixture();
        let uploaded = f.service.upload("u1", "r.jpg", Some("image/jpeg"), JPEG).await.unwrap();
        let id = uploaded.slip.id.clone();
        f.service.update_status(&id, SlipStatus::Failed, None).unwrap();

        let slip = f.service.requeue("u1", &id).await.unwrap();
        assert_eq!(slip.status, SlipStatus::Pending);
        assert!(slip.processed_at.is_none());
        assert!(slip.ocr_result.is_none());

        let jobs = f.publisher.jobs();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].job_id, id);
        assert_eq!(jobs[1].image_path, jobs[0].image_path);
    }

    #[tokio::test]
    async fn test_requeue_pending_is_allowed() {
        let f = fixture();
        let slip = f.service.create("u1", "a.jpg", "a.jpg").unwrap();
        let requeued = f.service.requeue("u1", &slip.id).await.unwrap();
        assert_eq!(requeued.status, SlipStatus::Pending);
        assert_eq!(f.publisher.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_requeue_rejects_completed_and_processing_unchanged() {
        let f = fixture();
        let slip = f.service.create("u1", "a.jpg", "a.jpg").unwrap();

        f.service.update_status(&slip.id, SlipStatus::Processing, None).unwrap();
        assert!(matches!(
            f.service.requeue("u1", &slip.id).await,
            Err(SlipError::NotRequeueable {
                status: SlipStatus::Processing
            })
        ));

        let done = f
            .service
            .update_status(&slip.id, SlipStatus::Completed, Some(&json!({"x": 1})))
            .unwrap();
        assert!(matches!(
            f.service.requeue("u1", &slip.id).await,
            Err(SlipError::NotRequeueable {
                status: SlipStatus::Completed
            })
        ));
        assert_eq!(f.service.get_by_id("u1", &slip.id).unwrap(), done);
        assert!(f.publisher.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_requeue_is_owner_scoped() {
        let f = fixture();
        let slip = f.service.create("u1", "a.jpg", "a.jpg").unwrap();
        assert!(matches!(
            f.service.requeue("u2", &slip.id).await,
            Err(SlipError::Forbidden)
        ));
        assert!(matches!(
            f.service.requeue("u1", "nonexistent-id").await,
            Err(SlipError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_requeue_dispatch_failure_leaves_pending() {
        let f = fixture_with(RecordingPublisher::failing());
        let slip = f.service.create("u1", "a.jpg", "a.jpg").unwrap();
        f.service.update_status(&slip.id, SlipStatus::Failed, None).unwrap();

        assert!(matches!(
            f.service.requeue("u1", &slip.id).await,
            Err(SlipError::Dispatch(_))
        ));
        let current = f.service.get_by_id("u1", &slip.id).unwrap();
        assert_eq!(current.status, SlipStatus::Pending);
        assert_invariants(&current);
    }
}
