//! Shared data model: the types every component operates on.
//!
//! `UploadRecord` is the one type with a deliberately unusual shape: the
//! Tracker (component C) and the Worker (component G) need to share and
//! mutate the same record without either one blocking the other's lock, so
//! the mutable fields live behind their own `Mutex`, separate from the
//! `Mutex` guarding the Tracker's id -> record map. `should_cancel` is a
//! bare atomic for the same reason: it must be pollable from a foreign
//! caller's thread without contending with whatever the worker is doing.

use std::convert::TryFrom;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::config::constants::UPLOAD_ID_SEPARATOR;

/// `<dataId>_<microsecondTimestamp>`. Opaque to callers; the `data_id`
/// prefix is recoverable by splitting at the first separator.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UploadId(String);

impl UploadId {
    /// Mints a fresh id for the given `data_id` using the current time.
    /// Guarantees strict monotonicity (and therefore uniqueness) even
    /// across back-to-back calls that land within the same microsecond,
    /// by nudging the timestamp forward past the last one handed out.
    pub fn new<S: Into<String>>(data_id: S) -> Self {
        use std::sync::atomic::AtomicI64;
        static LAST_MICROS: AtomicI64 = AtomicI64::new(0);

        let now = Utc::now().timestamp_nanos() / 1_000;
        let mut micros = now;
        let _ = LAST_MICROS.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            micros = if now > last { now } else { last + 1 };
            Some(micros)
        });

        UploadId(format!(
            "{data_id}{sep}{micros}",
            data_id = data_id.into(),
            sep = UPLOAD_ID_SEPARATOR,
            micros = micros
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits at the first reserved separator, returning the `data_id`
    /// prefix. Falls back to the whole id if the separator is missing
    /// (should not happen for ids minted by `new`).
    pub fn data_id_prefix(&self) -> &str {
        self.0
            .split_once(UPLOAD_ID_SEPARATOR)
            .map(|(prefix, _)| prefix)
            .unwrap_or(&self.0)
    }

    /// Returns the microsecond timestamp suffix, if the id parses.
    pub fn timestamp_micros(&self) -> Option<i64> {
        self.0
            .split_once(UPLOAD_ID_SEPARATOR)
            .and_then(|(_, suffix)| suffix.parse::<i64>().ok())
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UploadId {
    fn from(s: String) -> Self {
        UploadId(s)
    }
}

impl<'a> From<&'a str> for UploadId {
    fn from(s: &'a str) -> Self {
        UploadId(s.to_owned())
    }
}

/// Selects the confirmation shape the Worker drives after a successful
/// upload. The ABI integer mapping (`0` = batch, `1` = append) is stable;
/// `REAL_TIME_SIGNAL_APPEND` is a historical alias for `RealTimeAppend`
/// carried by an older client language and is not otherwise represented.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OperationMode {
    BatchCreate,
    RealTimeAppend,
}

impl OperationMode {
    pub fn code(self) -> i32 {
        match self {
            OperationMode::BatchCreate => 0,
            OperationMode::RealTimeAppend => 1,
        }
    }
}

impl TryFrom<i32> for OperationMode {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OperationMode::BatchCreate),
            1 => Ok(OperationMode::RealTimeAppend),
            _ => Err(()),
        }
    }
}

/// The finite set of per-record states, with the stable integer encoding
/// preserved at the ABI boundary. `SdkInitSuccess(5)` and
/// `SdkCleanSuccess(6)` are lifecycle-only envelope codes and are
/// deliberately not members of this enum — see `crate::codec::LifecycleCode`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UploadStatus {
    Pending,
    Uploading,
    UploadSuccess,
    UploadFailed,
    Cancelled,
    ConfirmSuccess,
    ConfirmFailed,
}

impl UploadStatus {
    pub fn code(self) -> i32 {
        match self {
            UploadStatus::Pending => 0,
            UploadStatus::Uploading => 1,
            UploadStatus::UploadSuccess => 2,
            UploadStatus::UploadFailed => 3,
            UploadStatus::Cancelled => 4,
            UploadStatus::ConfirmSuccess => 7,
            UploadStatus::ConfirmFailed => 8,
        }
    }

    /// Terminal statuses that a record may never leave, per the monotone
    /// progress invariant.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadStatus::Cancelled
                | UploadStatus::UploadFailed
                | UploadStatus::ConfirmSuccess
                | UploadStatus::ConfirmFailed
        )
    }

    /// Whether this status counts as "the upload itself succeeded",
    /// independent of confirmation outcome.
    pub fn is_upload_successful(self) -> bool {
        matches!(
            self,
            UploadStatus::UploadSuccess | UploadStatus::ConfirmSuccess | UploadStatus::ConfirmFailed
        )
    }
}

/// Mutable fields of an `UploadRecord`, guarded by their own lock so the
/// Tracker's map lock need not be held while the Worker mutates a record.
#[derive(Clone, Debug)]
pub struct UploadRecordState {
    pub status: UploadStatus,
    pub total_size: Option<u64>,
    pub error_message: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Default for UploadRecordState {
    fn default() -> Self {
        Self {
            status: UploadStatus::Pending,
            total_size: None,
            error_message: None,
            start_time: None,
            end_time: None,
        }
    }
}

/// A point-in-time copy of a record's fields, suitable for handing to the
/// codec without holding any lock.
#[derive(Clone, Debug)]
pub struct UploadSnapshot {
    pub upload_id: UploadId,
    pub data_id: String,
    pub upload_data_name: String,
    pub patient_id: String,
    pub object_key: String,
    pub local_path: PathBuf,
    pub operation_mode: OperationMode,
    pub status: UploadStatus,
    pub total_size: Option<u64>,
    pub error_message: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// A single submitted upload. Cheap to clone: the mutable fields and the
/// cancellation/confirmation flags are all behind `Arc`, so every clone is
/// a handle onto the same underlying record.
#[derive(Clone, Debug)]
pub struct UploadRecord {
    pub upload_id: UploadId,
    pub data_id: String,
    pub upload_data_name: String,
    pub patient_id: String,
    pub object_key: String,
    pub local_path: PathBuf,
    pub operation_mode: OperationMode,
    pub should_cancel: Arc<AtomicBool>,
    pub confirmation_attempted: Arc<AtomicBool>,
    state: Arc<Mutex<UploadRecordState>>,
}

impl UploadRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        upload_id: UploadId,
        data_id: String,
        upload_data_name: String,
        patient_id: String,
        object_key: String,
        local_path: PathBuf,
        operation_mode: OperationMode,
    ) -> Self {
        Self {
            upload_id,
            data_id,
            upload_data_name,
            patient_id,
            object_key,
            local_path,
            operation_mode,
            should_cancel: Arc::new(AtomicBool::new(false)),
            confirmation_attempted: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(UploadRecordState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, UploadRecordState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn status(&self) -> UploadStatus {
        self.lock().status
    }

    pub fn set_status(&self, status: UploadStatus, error_message: Option<String>) {
        let mut state = self.lock();
        state.status = status;
        if error_message.is_some() {
            state.error_message = error_message;
        }
    }

    pub fn set_total_size(&self, size: u64) {
        self.lock().total_size = Some(size);
    }

    pub fn total_size(&self) -> u64 {
        self.lock().total_size.unwrap_or(0)
    }

    pub fn mark_started(&self) {
        self.lock().start_time = Some(Utc::now());
    }

    pub fn mark_ended(&self) {
        self.lock().end_time = Some(Utc::now());
    }

    pub fn is_cancelled(&self) -> bool {
        self.should_cancel.load(Ordering::SeqCst)
    }

    pub fn request_cancel(&self) {
        self.should_cancel.store(true, Ordering::SeqCst);
    }

    /// Flips `confirmation_attempted` from false to true, returning `true`
    /// only to the caller that won the race. At most one caller per record
    /// ever observes `true`.
    pub fn try_latch_confirmation(&self) -> bool {
        self.confirmation_attempted
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        let state = self.lock();
        UploadSnapshot {
            upload_id: self.upload_id.clone(),
            data_id: self.data_id.clone(),
            upload_data_name: self.upload_data_name.clone(),
            patient_id: self.patient_id.clone(),
            object_key: self.object_key.clone(),
            local_path: self.local_path.clone(),
            operation_mode: self.operation_mode,
            status: state.status,
            total_size: state.total_size,
            error_message: state.error_message.clone(),
            start_time: state.start_time,
            end_time: state.end_time,
        }
    }
}

/// Short-lived object-store credential handed back by a `CredentialsSource`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
    pub expiration: DateTime<Utc>,
}

/// A plain, resource-free value placed on the scheduler's queue. Carries
/// everything the Worker needs to look the record up and perform the
/// upload; it owns none of the record's resources, so it stays valid even
/// if the Tracker later compacts its map.
#[derive(Clone, Debug)]
pub struct UploadTask {
    pub upload_id: UploadId,
    pub region: String,
    pub bucket: String,
    pub object_key: String,
    pub local_path: PathBuf,
    pub tenant_id: String,
    pub operation_mode: OperationMode,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn upload_id_splits_at_first_separator() {
        let id = UploadId::new("folder-42");
        assert_eq!(id.data_id_prefix(), "folder-42");
        assert!(id.timestamp_micros().is_some());
    }

    #[test]
    fn upload_ids_are_unique_under_rapid_submission() {
        let ids: Vec<UploadId> = (0..500).map(|_| UploadId::new("D")).collect();
        let unique: std::collections::HashSet<_> = ids.iter().map(UploadId::as_str).collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn operation_mode_roundtrips_through_abi_code() {
        assert_eq!(OperationMode::try_from(0), Ok(OperationMode::BatchCreate));
        assert_eq!(OperationMode::try_from(1), Ok(OperationMode::RealTimeAppend));
        assert_eq!(OperationMode::BatchCreate.code(), 0);
        assert_eq!(OperationMode::RealTimeAppend.code(), 1);
    }

    #[test]
    fn upload_status_codes_match_spec() {
        assert_eq!(UploadStatus::Pending.code(), 0);
        assert_eq!(UploadStatus::Uploading.code(), 1);
        assert_eq!(UploadStatus::UploadSuccess.code(), 2);
        assert_eq!(UploadStatus::UploadFailed.code(), 3);
        assert_eq!(UploadStatus::Cancelled.code(), 4);
        assert_eq!(UploadStatus::ConfirmSuccess.code(), 7);
        assert_eq!(UploadStatus::ConfirmFailed.code(), 8);
    }

    #[test]
    fn record_clones_share_mutable_state() {
        let record = UploadRecord::new(
            UploadId::new("D"),
            "D".into(),
            "name".into(),
            "tenant".into(),
            "patient/t/source_data/D/name/".into(),
            PathBuf::from("/tmp/f"),
            OperationMode::BatchCreate,
        );
        let handle = record.clone();
        handle.set_status(UploadStatus::Uploading, None);
        assert_eq!(record.status(), UploadStatus::Uploading);
    }
}
