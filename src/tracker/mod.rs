//! Thread-safe registry of in-flight and finished uploads, keyed by
//! `uploadId` with a secondary index over the `dataId` prefix.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::model::{OperationMode, UploadId, UploadRecord, UploadSnapshot, UploadStatus};
use crate::objectkey;

#[derive(Default)]
struct Inner {
    records: HashMap<UploadId, UploadRecord>,
    by_data_id: HashMap<String, Vec<UploadId>>,
}

/// A single mutex protects both maps. Records themselves hold their
/// mutable fields behind their own lock (see `UploadRecord`), so a Worker
/// can mutate a record it has already fetched without the Tracker's lock
/// being held for the duration.
pub struct Tracker {
    inner: Mutex<Inner>,
}

impl Default for Tracker {
    fn default() -> Self {
        Tracker {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record with status `Pending`. `dataId` is derived from the
    /// `uploadId` prefix; `uploadDataName` is derived from `objectKey` via
    /// the object-key parser. If `uploadId` already exists, it is replaced.
    pub fn add(
        &self,
        upload_id: UploadId,
        local_path: PathBuf,
        object_key: String,
        patient_id: String,
        operation_mode: OperationMode,
    ) -> UploadRecord {
        let data_id = upload_id.data_id_prefix().to_owned();
        let upload_data_name = objectkey::upload_data_name(&object_key);

        let record = UploadRecord::new(
            upload_id.clone(),
            data_id.clone(),
            upload_data_name,
            patient_id,
            object_key,
            local_path,
            operation_mode,
        );

        let mut inner = self.lock();
        inner.records.insert(upload_id.clone(), record.clone());
        let siblings = inner.by_data_id.entry(data_id).or_insert_with(Vec::new);
        if !siblings.contains(&upload_id) {
            siblings.push(upload_id);
        }
        record
    }

    pub fn get(&self, upload_id: &UploadId) -> Option<UploadRecord> {
        self.lock().records.get(upload_id).cloned()
    }

    /// Returns any one record whose `uploadId` shares `dataId`.
    pub fn get_by_data_id(&self, data_id: &str) -> Option<UploadRecord> {
        let inner = self.lock();
        inner
            .by_data_id
            .get(data_id)
            .and_then(|ids| ids.first())
            .and_then(|id| inner.records.get(id))
            .cloned()
    }

    /// Returns every record sharing `dataId`, in submission order.
    pub fn get_all_by_data_id(&self, data_id: &str) -> Vec<UploadRecord> {
        let inner = self.lock();
        inner
            .by_data_id
            .get(data_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.records.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Same as `get_all_by_data_id` but copies only the fields needed for
    /// aggregation, under the lock, as the concurrency policy requires.
    pub fn snapshot_all_by_data_id(&self, data_id: &str) -> Vec<UploadSnapshot> {
        self.get_all_by_data_id(data_id)
            .iter()
            .map(UploadRecord::snapshot)
            .collect()
    }

    pub fn remove(&self, upload_id: &UploadId) {
        let mut inner = self.lock();
        if let Some(record) = inner.records.remove(upload_id) {
            if let Some(siblings) = inner.by_data_id.get_mut(&record.data_id) {
                siblings.retain(|id| id != upload_id);
                if siblings.is_empty() {
                    inner.by_data_id.remove(&record.data_id);
                }
            }
        }
    }

    pub fn update_status(
        &self,
        upload_id: &UploadId,
        status: UploadStatus,
        error_message: Option<String>,
    ) {
        if let Some(record) = self.get(upload_id) {
            record.set_status(status, error_message);
        }
    }

    pub fn count_total(&self) -> usize {
        self.lock().records.len()
    }

    pub fn count_pending(&self) -> usize {
        self.lock()
            .records
            .values()
            .filter(|r| r.status() == UploadStatus::Pending)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn add(tracker: &Tracker, data_id: &str) -> UploadRecord {
        tracker.add(
            UploadId::new(data_id),
            PathBuf::from("/tmp/f"),
            format!("patient/P/source_data/{}/f/f", data_id),
            "P".into(),
            OperationMode::BatchCreate,
        )
    }

    #[test]
    fn add_then_get_round_trips() {
        let tracker = Tracker::new();
        let record = add(&tracker, "D1");
        let fetched = tracker.get(&record.upload_id).unwrap();
        assert_eq!(fetched.upload_id, record.upload_id);
        assert_eq!(fetched.status(), UploadStatus::Pending);
    }

    #[test]
    fn get_all_by_data_id_returns_every_sibling() {
        let tracker = Tracker::new();
        let data_id = "D2";
        for _ in 0..3 {
            add(&tracker, data_id);
        }
        assert_eq!(tracker.get_all_by_data_id(data_id).len(), 3);
    }

    #[test]
    fn remove_drops_from_both_indexes() {
        let tracker = Tracker::new();
        let record = add(&tracker, "D3");
        tracker.remove(&record.upload_id);
        assert!(tracker.get(&record.upload_id).is_none());
        assert!(tracker.get_all_by_data_id("D3").is_empty());
    }

    #[test]
    fn count_total_and_pending() {
        let tracker = Tracker::new();
        let r1 = add(&tracker, "D4");
        add(&tracker, "D5");
        r1.set_status(UploadStatus::Uploading, None);
        assert_eq!(tracker.count_total(), 2);
        assert_eq!(tracker.count_pending(), 1);
    }

    #[test]
    fn adding_duplicate_upload_id_replaces_record() {
        let tracker = Tracker::new();
        let upload_id = UploadId::from("DUP_1");
        tracker.add(
            upload_id.clone(),
            PathBuf::from("/tmp/a"),
            "patient/P/source_data/DUP/f/f".into(),
            "P".into(),
            OperationMode::BatchCreate,
        );
        tracker.add(
            upload_id.clone(),
            PathBuf::from("/tmp/b"),
            "patient/P/source_data/DUP/g/g".into(),
            "P".into(),
            OperationMode::BatchCreate,
        );
        assert_eq!(tracker.get_all_by_data_id("DUP").len(), 1);
        assert_eq!(
            tracker.get(&upload_id).unwrap().local_path,
            PathBuf::from("/tmp/b")
        );
    }
}
