//! The Facade: the externally callable surface of the engine — init,
//! submit, query, shutdown — plus the small file-probing utilities the ABI
//! exposes alongside them. `Engine` is the value the Design Notes describe
//! as replacing process-wide globals: one value owns every subsystem
//! handle, and the process-global singleton lives only at `crate::ffi`.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::warn;

use crate::codec::{self, LifecycleCode};
use crate::confirm::ConfirmationSink;
use crate::config::EngineConfig;
use crate::credentials::CredentialsSource;
use crate::model::{OperationMode, UploadId, UploadTask};
use crate::pool::Pool;
use crate::scheduler::Scheduler;
use crate::tracker::Tracker;

pub struct Engine {
    tracker: Arc<Tracker>,
    pool: Arc<Pool>,
    scheduler: Scheduler,
    initialized: AtomicBool,
}

impl Engine {
    /// Builds a fully wired engine. Subsystem values are constructed here
    /// (dependency injection of the `CredentialsSource`/`ConfirmationSink`
    /// implementations, which are out of core scope); `initialize` below is
    /// only responsible for the idempotent, ABI-facing init gate.
    pub fn new(
        config: EngineConfig,
        credentials_source: Arc<dyn CredentialsSource>,
        confirm_sink: Arc<dyn ConfirmationSink>,
    ) -> Self {
        let tracker = Arc::new(Tracker::new());
        let pool = Arc::new(Pool::new(config, credentials_source));
        let scheduler = Scheduler::new(tracker.clone(), pool.clone(), confirm_sink);

        Engine {
            tracker,
            pool,
            scheduler,
            initialized: AtomicBool::new(false),
        }
    }

    /// Idempotent: the first effective call validates `api_endpoint` and
    /// flips the init gate; every subsequent call returns the same success
    /// envelope without touching internal state again.
    pub fn initialize(&self, api_endpoint: &str) -> String {
        if self.initialized.load(Ordering::SeqCst) {
            return codec::lifecycle_envelope(LifecycleCode::SdkInitSuccess, "already initialized");
        }

        match crate::config::validate_api_endpoint(api_endpoint) {
            Ok(_) => {
                self.initialized.store(true, Ordering::SeqCst);
                codec::lifecycle_envelope(LifecycleCode::SdkInitSuccess, "initialized")
            }
            Err(err) => {
                warn!("initialize rejected endpoint {}: {}", api_endpoint, err);
                codec::submit_failure_envelope(&err.to_string())
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn submit_upload(
        &self,
        region: &str,
        bucket: &str,
        key: &str,
        local_path: &str,
        data_id: &str,
        tenant_id: &str,
        operation_mode: i32,
    ) -> String {
        if !self.is_initialized() {
            return codec::submit_failure_envelope("AWS SDK not initialized");
        }

        if region.is_empty()
            || bucket.is_empty()
            || key.is_empty()
            || local_path.is_empty()
            || data_id.is_empty()
            || tenant_id.is_empty()
        {
            return codec::submit_failure_envelope("Invalid parameters");
        }

        let mode = match codec::operation_mode_from_abi(operation_mode) {
            Some(mode) => mode,
            None => return codec::submit_failure_envelope("Invalid parameters"),
        };

        // Admission control must run before the Tracker record for this
        // submission exists, or `get_all_by_data_id(data_id)` below would
        // always see at least this one and the "queue full" rejection
        // would never trigger. See `Scheduler::check_admission`.
        if let Err(err) = self.scheduler.check_admission(data_id) {
            return codec::submit_failure_envelope(&err.to_string());
        }

        let upload_id = UploadId::new(data_id);
        self.tracker.add(
            upload_id.clone(),
            local_path.into(),
            key.to_owned(),
            tenant_id.to_owned(),
            mode,
        );

        let task = UploadTask {
            upload_id: upload_id.clone(),
            region: region.to_owned(),
            bucket: bucket.to_owned(),
            object_key: key.to_owned(),
            local_path: local_path.into(),
            tenant_id: tenant_id.to_owned(),
            operation_mode: mode,
        };

        self.scheduler.enqueue(task);
        codec::submit_success_envelope(upload_id.as_str())
    }

    /// Aggregates every sibling of `data_id` into the richer status
    /// envelope. Returns an envelope reporting zero uploads if `data_id`
    /// is unknown, rather than erroring — there is nothing unsafe about a
    /// query racing a submission.
    pub fn query_status_by_data_id(&self, data_id: &str) -> String {
        let snapshots = self.tracker.snapshot_all_by_data_id(data_id);
        codec::status_envelope(data_id, &snapshots)
    }

    /// Best-effort drain-and-detach of the worker thread. Idempotent.
    pub fn shutdown(&self) -> String {
        self.scheduler.shutdown();
        codec::lifecycle_envelope(LifecycleCode::SdkCleanSuccess, "shutdown")
    }

    pub fn queue_size(&self) -> i32 {
        self.scheduler.queue_size() as i32
    }

    /// Requests cancellation of an in-flight or not-yet-started upload.
    /// A no-op if `upload_id` is unknown.
    pub fn cancel_upload(&self, upload_id: &UploadId) {
        if let Some(record) = self.tracker.get(upload_id) {
            record.request_cancel();
        }
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

/// `FileExists`: local filesystem probe, independent of engine state.
pub fn file_exists(path: &str) -> bool {
    Path::new(path).exists()
}

/// `GetS3FileSize`: local file size in bytes, `-1` on any I/O error. Named
/// for the ABI's historical function name; it reports the size of the
/// *local* source file, not an object-store HEAD.
pub fn local_file_size(path: &str) -> i64 {
    fs::metadata(path).map(|m| m.len() as i64).unwrap_or(-1)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::confirm::test_support::RecordingConfirmationSink;
    use crate::credentials::test_support::FixedCredentialsSource;
    use chrono::Duration;

    fn engine() -> Engine {
        Engine::new(
            EngineConfig::default(),
            Arc::new(FixedCredentialsSource::new(Duration::seconds(3600))),
            Arc::new(RecordingConfirmationSink::new(true)),
        )
    }

    #[test]
    fn initialize_is_idempotent() {
        let engine = engine();
        let first = engine.initialize("https://api.example.com");
        let second = engine.initialize("https://api.example.com");
        assert_eq!(first, second);
        assert!(first.contains(r#""code":5"#));
    }

    #[test]
    fn submit_before_initialize_fails() {
        let engine = engine();
        let envelope = engine.submit_upload("us-east-1", "bucket", "k", "/tmp/f", "D1", "tenant", 0);
        assert!(envelope.contains("AWS SDK not initialized"));
    }

    #[test]
    fn submit_rejects_invalid_operation_mode() {
        let engine = engine();
        engine.initialize("https://api.example.com");
        let envelope = engine.submit_upload("us-east-1", "bucket", "k", "/tmp/f", "D1", "tenant", 99);
        assert!(envelope.contains("Invalid parameters"));
    }

    #[test]
    fn submit_rejects_when_full_and_no_sibling_but_admits_sibling_through_real_facade_path() {
        use crate::config::constants::MAX_UPLOAD_LIMIT;

        let engine = engine();
        engine.initialize("https://api.example.com");

        for i in 0..MAX_UPLOAD_LIMIT {
            let data_id = format!("D{}", i);
            let key = format!("patient/P/source_data/{}/f/f", data_id);
            let envelope = engine.submit_upload(
                "us-east-1",
                "bucket",
                &key,
                "/tmp/does-not-exist",
                &data_id,
                "tenant",
                0,
            );
            assert!(envelope.contains(r#""code":2"#));
        }

        // A brand new data-id is rejected: admission control runs before
        // this submission's own record would otherwise mask the check.
        let rejected = engine.submit_upload(
            "us-east-1",
            "bucket",
            "patient/P/source_data/NEW/f/f",
            "/tmp/does-not-exist",
            "NEW",
            "tenant",
            0,
        );
        assert!(rejected.contains("Upload queue is full"));

        // A sibling of an existing data-id is still admitted even though
        // the tracker is at capacity.
        let admitted = engine.submit_upload(
            "us-east-1",
            "bucket",
            "patient/P/source_data/D0/g/g",
            "/tmp/does-not-exist",
            "D0",
            "tenant",
            0,
        );
        assert!(admitted.contains(r#""code":2"#));
    }

    #[test]
    fn query_unknown_data_id_reports_zero_uploads() {
        let engine = engine();
        let envelope = engine.query_status_by_data_id("nope");
        assert!(envelope.contains(r#""totalUploadCount":0"#));
    }

    #[test]
    fn file_probes_operate_on_local_paths() {
        assert!(!file_exists("/definitely/not/a/real/path"));
        assert_eq!(local_file_size("/definitely/not/a/real/path"), -1);
    }
}
