//! The Upload Worker: runs on the single worker thread, executing the
//! per-task procedure described by the scheduler (`crate::scheduler`) and
//! driving the confirmation state machine once a PUT succeeds.

mod error;

pub use self::error::{Error, ErrorKind, Result};

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

use log::{debug, info, warn};
use rusoto_core::ByteStream;
use rusoto_s3::{PutObjectRequest, S3};

use crate::codec;
use crate::confirm::ConfirmationSink;
use crate::config::constants::{MAX_UPLOAD_ATTEMPTS, RETRY_BACKOFF_SECS, S3_REQUEST_TIMEOUT_SECS};
use crate::model::{OperationMode, UploadRecord, UploadStatus, UploadTask};
use crate::objectkey;
use crate::pool::Pool;
use crate::tracker::Tracker;

pub struct Worker;

impl Worker {
    /// Looks the record up by id and runs it to a terminal (or
    /// confirmation-pending) status. If the record has been removed from
    /// the Tracker since it was enqueued, the task is silently dropped.
    pub fn process_task(
        task: &UploadTask,
        tracker: &Tracker,
        pool: &Pool,
        confirm_sink: &dyn ConfirmationSink,
        initialized: bool,
    ) {
        let record = match tracker.get(&task.upload_id) {
            Some(record) => record,
            None => {
                debug!("dropping task for unknown upload id {}", task.upload_id);
                return;
            }
        };

        if let Err(err) = Self::run(&record, task, pool, initialized) {
            match err.kind() {
                ErrorKind::Cancelled => {
                    record.set_status(UploadStatus::Cancelled, None);
                }
                kind => {
                    warn!("upload {} failed: {}", task.upload_id, kind);
                    record.set_status(UploadStatus::UploadFailed, Some(kind.to_string()));
                }
            }
            return;
        }

        Self::drive_confirmation(&record, task, tracker, confirm_sink);
    }

    fn run(record: &UploadRecord, task: &UploadTask, pool: &Pool, initialized: bool) -> Result<()> {
        record.mark_started();
        record.set_status(UploadStatus::Uploading, None);

        if Self::checkpoint_cancelled(record) {
            return Err(ErrorKind::Cancelled.into());
        }

        if task.region.is_empty()
            || task.bucket.is_empty()
            || task.object_key.is_empty()
            || task.local_path.as_os_str().is_empty()
            || task.tenant_id.is_empty()
        {
            return Err(ErrorKind::InvalidArgument.into());
        }

        if !initialized {
            return Err(ErrorKind::NotInitialized.into());
        }

        if !task.local_path.exists() {
            return Err(ErrorKind::NotFound.into());
        }

        let metadata = fs::metadata(&task.local_path).map_err(|_| ErrorKind::CannotReadFileSize)?;
        record.set_total_size(metadata.len());

        if Self::checkpoint_cancelled(record) {
            return Err(ErrorKind::Cancelled.into());
        }

        let handle = pool.refreshing_handle(&task.tenant_id);

        let bytes = fs::read(&task.local_path).map_err(|_| ErrorKind::CannotOpenFile {
            path: task.local_path.to_string_lossy().into_owned(),
        })?;

        let mut last_message = String::from("unknown error");
        for attempt in 1..=MAX_UPLOAD_ATTEMPTS {
            if Self::checkpoint_cancelled(record) {
                return Err(ErrorKind::Cancelled.into());
            }

            if attempt > 1 {
                let backoff = RETRY_BACKOFF_SECS * u64::from(attempt - 1);
                debug!(
                    "retrying upload {} in {}s (attempt {})",
                    task.upload_id, backoff, attempt
                );
                thread::sleep(StdDuration::from_secs(backoff));
            }

            match Self::put_once(&handle, task, bytes.clone()) {
                Ok(()) => {
                    record.mark_ended();
                    record.set_status(UploadStatus::UploadSuccess, None);
                    info!("upload {} succeeded on attempt {}", task.upload_id, attempt);
                    return Ok(());
                }
                Err(message) => {
                    last_message = message;
                }
            }
        }

        Err(ErrorKind::RemoteRejection {
            attempt: MAX_UPLOAD_ATTEMPTS,
            provider_message: last_message,
        }
        .into())
    }

    fn checkpoint_cancelled(record: &UploadRecord) -> bool {
        record.is_cancelled()
    }

    fn put_once(
        handle: &crate::pool::RefreshingHandle<'_>,
        task: &UploadTask,
        bytes: Vec<u8>,
    ) -> std::result::Result<(), String> {
        let result = handle.with_auto_refresh(|client| {
            let request = PutObjectRequest {
                bucket: task.bucket.clone(),
                key: task.object_key.clone(),
                body: Some(ByteStream::from(bytes)),
                ..Default::default()
            };

            // A current-thread runtime, not the default multi-thread one:
            // this call already runs on the single dedicated worker thread,
            // and spinning up a background thread pool per PUT would
            // contradict that single-worker-thread design.
            let mut runtime = match tokio::runtime::Builder::new()
                .basic_scheduler()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    return Err(crate::pool::Error::client_build_failed(e.to_string()));
                }
            };

            let bounded = tokio::time::timeout(
                StdDuration::from_secs(S3_REQUEST_TIMEOUT_SECS),
                client.put_object(request),
            );

            match runtime.block_on(bounded) {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(crate::pool::Error::client_build_failed(e.to_string())),
                Err(_) => Err(crate::pool::Error::client_build_failed(format!(
                    "PUT timed out after {}s",
                    S3_REQUEST_TIMEOUT_SECS
                ))),
            }
        });

        result.map_err(|e| e.to_string())
    }

    /// Runs the confirmation state machine for a record that just reached
    /// `UploadSuccess`.
    fn drive_confirmation(
        record: &UploadRecord,
        task: &UploadTask,
        tracker: &Tracker,
        confirm_sink: &dyn ConfirmationSink,
    ) {
        match task.operation_mode {
            OperationMode::RealTimeAppend => Self::confirm_incremental(record, confirm_sink),
            OperationMode::BatchCreate => Self::confirm_batch_group(record, tracker, confirm_sink),
        }
    }

    fn confirm_incremental(record: &UploadRecord, confirm_sink: &dyn ConfirmationSink) {
        let snapshot = record.snapshot();
        let file_name = objectkey::file_name(&snapshot.object_key);
        let ok = confirm_sink.confirm_incremental(
            &snapshot.data_id,
            &file_name,
            &snapshot.patient_id,
            snapshot.total_size.unwrap_or(0),
            &snapshot.object_key,
        );
        record.set_status(
            if ok {
                UploadStatus::ConfirmSuccess
            } else {
                UploadStatus::ConfirmFailed
            },
            None,
        );
    }

    fn confirm_batch_group(record: &UploadRecord, tracker: &Tracker, confirm_sink: &dyn ConfirmationSink) {
        let data_id = record.data_id.clone();
        let siblings = tracker.get_all_by_data_id(&data_id);

        let all_done = siblings
            .iter()
            .all(|s| matches!(s.status(), UploadStatus::UploadSuccess | UploadStatus::ConfirmSuccess));
        if !all_done {
            return;
        }

        if !record.try_latch_confirmation() {
            return;
        }

        let multi_file = siblings.len() > 1;
        let any_sibling_key = siblings
            .first()
            .map(|s| s.object_key.clone())
            .unwrap_or_else(|| record.object_key.clone());
        let confirm_object_key = if multi_file {
            objectkey::parent_directory(&any_sibling_key)
        } else {
            any_sibling_key
        };

        let total_bytes: u64 = siblings.iter().map(|s| s.total_size()).sum();
        let upload_data_name = record.upload_data_name.clone();
        let patient_id = record.patient_id.clone();

        let ok = confirm_sink.confirm_batch(
            &data_id,
            &upload_data_name,
            &patient_id,
            total_bytes,
            &confirm_object_key,
        );

        let target_status = if ok {
            UploadStatus::ConfirmSuccess
        } else {
            UploadStatus::ConfirmFailed
        };

        for sibling in &siblings {
            if sibling.status() == UploadStatus::UploadSuccess {
                sibling.set_status(target_status, None);
            }
        }
    }
}

/// Reserved for parity with §4.1: builds the confirmation payloads via the
/// codec, kept separate so `ConfirmationSink` implementations that want the
/// canonical JSON shape can reuse it instead of reinventing it.
pub fn describe_batch_payload(record: &UploadRecord, total_bytes: u64) -> String {
    codec::confirm_batch_payload(
        &record.data_id,
        &record.upload_data_name,
        &record.patient_id,
        total_bytes,
    )
}

pub fn describe_incremental_payload(record: &UploadRecord, file_name: &str, file_bytes: u64) -> String {
    codec::confirm_incremental_payload(
        &record.data_id,
        &record.upload_data_name,
        file_name,
        &record.patient_id,
        file_bytes,
    )
}
