//! Encodes the JSON envelopes foreign callers parse by key. Field order and
//! escaping are owned centrally here rather than left to a generic
//! serializer, so the wire shape stays pinned even as the model types evolve.

use crate::model::{OperationMode, UploadSnapshot, UploadStatus};

/// Lifecycle-only codes, valid solely in the envelope `code` field for
/// `Initialize`/`Shutdown`-style calls; never a per-record `UploadStatus`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LifecycleCode {
    SdkInitSuccess,
    SdkCleanSuccess,
}

impl LifecycleCode {
    pub fn code(self) -> i32 {
        match self {
            LifecycleCode::SdkInitSuccess => 5,
            LifecycleCode::SdkCleanSuccess => 6,
        }
    }
}

/// Escapes a string for embedding inside a JSON string literal.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// `{"code": <int>, "message": "<string>"}` — the shape shared by the
/// submit envelope and the lifecycle (`Initialize`/`Shutdown`) envelopes.
pub fn result_envelope(code: i32, message: &str) -> String {
    format!(r#"{{"code":{},"message":"{}"}}"#, code, escape(message))
}

pub fn submit_success_envelope(upload_id: &str) -> String {
    result_envelope(UploadStatus::UploadSuccess.code(), upload_id)
}

pub fn submit_failure_envelope(message: &str) -> String {
    result_envelope(UploadStatus::UploadFailed.code(), message)
}

pub fn lifecycle_envelope(code: LifecycleCode, message: &str) -> String {
    result_envelope(code.code(), message)
}

/// The overall status reported for a data-id group, computed across its
/// siblings. `UploadStatus::UploadSuccess` is used as the "all uploaded,
/// confirmation still in flight" transitional value, matching §6.
fn overall_status(snapshots: &[UploadSnapshot]) -> UploadStatus {
    if snapshots
        .iter()
        .any(|s| matches!(s.status, UploadStatus::UploadFailed | UploadStatus::Cancelled))
    {
        return UploadStatus::UploadFailed;
    }
    if snapshots
        .iter()
        .any(|s| matches!(s.status, UploadStatus::Pending | UploadStatus::Uploading))
    {
        return UploadStatus::Uploading;
    }
    if snapshots
        .iter()
        .all(|s| s.status == UploadStatus::ConfirmSuccess)
    {
        return UploadStatus::ConfirmSuccess;
    }
    if snapshots
        .iter()
        .any(|s| s.status == UploadStatus::ConfirmFailed)
    {
        return UploadStatus::ConfirmFailed;
    }
    UploadStatus::UploadSuccess
}

fn millis(ts: Option<chrono::DateTime<chrono::Utc>>) -> i64 {
    ts.map(|t| t.timestamp_millis()).unwrap_or(0)
}

fn upload_item(s: &UploadSnapshot) -> String {
    format!(
        concat!(
            "{{",
            r#""uploadId":"{}","#,
            r#""localFilePath":"{}","#,
            r#""s3ObjectKey":"{}","#,
            r#""status":{},"#,
            r#""totalSize":{},"#,
            r#""errorMessage":"{}","#,
            r#""startTime":{},"#,
            r#""endTime":{}"#,
            "}}"
        ),
        escape(s.upload_id.as_str()),
        escape(&s.local_path.to_string_lossy()),
        escape(&s.object_key),
        s.status.code(),
        s.total_size.unwrap_or(0),
        escape(s.error_message.as_deref().unwrap_or("")),
        millis(s.start_time),
        millis(s.end_time),
    )
}

/// Builds the richer status envelope returned by `QueryStatusByDataId`,
/// aggregating over every sibling sharing `data_id`.
pub fn status_envelope(data_id: &str, snapshots: &[UploadSnapshot]) -> String {
    let uploaded = snapshots
        .iter()
        .filter(|s| s.status.is_upload_successful())
        .collect::<Vec<_>>();
    let uploaded_count = uploaded.len();
    let uploaded_size: u64 = uploaded.iter().map(|s| s.total_size.unwrap_or(0)).sum();
    let total_size: u64 = snapshots.iter().map(|s| s.total_size.unwrap_or(0)).sum();

    let error_message = snapshots
        .iter()
        .filter_map(|s| s.error_message.as_deref())
        .filter(|m| !m.is_empty())
        .collect::<Vec<_>>()
        .join("; ");

    let uploads = snapshots
        .iter()
        .map(upload_item)
        .collect::<Vec<_>>()
        .join(",");

    format!(
        concat!(
            "{{",
            r#""code":{},"#,
            r#""status":{},"#,
            r#""uploadedCount":{},"#,
            r#""uploadedSize":{},"#,
            r#""totalSize":{},"#,
            r#""totalUploadCount":{},"#,
            r#""errorMessage":"{}","#,
            r#""dataId":"{}","#,
            r#""uploads":[{}]"#,
            "}}"
        ),
        UploadStatus::UploadSuccess.code(),
        overall_status(snapshots).code(),
        uploaded_count,
        uploaded_size,
        total_size,
        snapshots.len(),
        escape(&error_message),
        escape(data_id),
        uploads,
    )
}

/// The JSON payload sent to the confirmation sink for a batch confirmation.
/// Content only — transport is the `ConfirmationSink` implementation's concern.
pub fn confirm_batch_payload(
    data_id: &str,
    data_name: &str,
    patient_id: &str,
    data_size: u64,
) -> String {
    format!(
        concat!(
            "{{",
            r#""dataId":"{}","#,
            r#""dataName":"{}","#,
            r#""dataSize":{},"#,
            r#""patientId":"{}","#,
            r#""dataType":{}"#,
            "}}"
        ),
        escape(data_id),
        escape(data_name),
        data_size,
        escape(patient_id),
        crate::config::constants::CONFIRM_BATCH_DATA_TYPE,
    )
}

/// The JSON payload sent to the confirmation sink for an incremental
/// (`RealTimeAppend`) confirmation.
pub fn confirm_incremental_payload(
    data_id: &str,
    upload_data_name: &str,
    file_name: &str,
    patient_id: &str,
    file_size: u64,
) -> String {
    format!(
        concat!(
            "{{",
            r#""dataId":"{}","#,
            r#""uploadDataName":"{}","#,
            r#""fileName":"{}","#,
            r#""dataSize":{},"#,
            r#""patientId":"{}","#,
            r#""isRawDataInternal":1,"#,
            r#""dataVersions":[0]"#,
            "}}"
        ),
        escape(data_id),
        escape(upload_data_name),
        escape(file_name),
        file_size,
        escape(patient_id),
    )
}

/// Maps an `OperationMode` as understood by the core onto the ABI integer,
/// accepting the historical `REAL_TIME_SIGNAL_APPEND` alias's value too
/// (the mapping `1 -> append` has always been stable).
pub fn operation_mode_from_abi(code: i32) -> Option<OperationMode> {
    use std::convert::TryFrom;
    OperationMode::try_from(code).ok()
}
