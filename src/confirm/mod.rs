//! `ConfirmationSink`: the pluggable boundary through which the core
//! acknowledges a completed logical data group with the clinical backend.
//! Both operations are idempotent from the sink's perspective; the core
//! guarantees at most one call per record (see the confirmation state
//! machine in `crate::worker`).

use crate::config::constants::CONFIRM_BATCH_DATA_TYPE;

pub trait ConfirmationSink: Send + Sync {
    /// `objectKey` is the parent-directory form (trailing slash, file
    /// segment stripped) for a multi-file group, or the full key for a
    /// single-file batch submission.
    fn confirm_batch(
        &self,
        data_id: &str,
        upload_data_name: &str,
        tenant_id: &str,
        total_bytes: u64,
        object_key: &str,
    ) -> bool;

    /// `objectKey` is always the full per-file key.
    fn confirm_incremental(
        &self,
        data_id: &str,
        file_name: &str,
        tenant_id: &str,
        file_bytes: u64,
        object_key: &str,
    ) -> bool;
}

/// A sink that rejects every confirmation. Used as the engine's default
/// before `Initialize` wires up a real implementation.
pub struct UnconfiguredConfirmationSink;

impl ConfirmationSink for UnconfiguredConfirmationSink {
    fn confirm_batch(&self, _: &str, _: &str, _: &str, _: u64, _: &str) -> bool {
        false
    }

    fn confirm_incremental(&self, _: &str, _: &str, _: &str, _: u64, _: &str) -> bool {
        false
    }
}

/// `dataType` fixed at 20 for batch confirmation, per the outgoing
/// protocol shape described in the external interfaces.
pub fn batch_data_type() -> i32 {
    CONFIRM_BATCH_DATA_TYPE
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingConfirmationSink {
        pub batch_calls: AtomicUsize,
        pub incremental_calls: AtomicUsize,
        pub succeed: std::sync::atomic::AtomicBool,
        pub last_batch_object_key: Mutex<Option<String>>,
        pub last_batch_total_bytes: std::sync::atomic::AtomicU64,
    }

    impl RecordingConfirmationSink {
        pub fn new(succeed: bool) -> Self {
            Self {
                succeed: std::sync::atomic::AtomicBool::new(succeed),
                ..Default::default()
            }
        }
    }

    impl ConfirmationSink for RecordingConfirmationSink {
        fn confirm_batch(
            &self,
            _data_id: &str,
            _upload_data_name: &str,
            _tenant_id: &str,
            total_bytes: u64,
            object_key: &str,
        ) -> bool {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            self.last_batch_total_bytes.store(total_bytes, Ordering::SeqCst);
            *self.last_batch_object_key.lock().unwrap() = Some(object_key.to_owned());
            self.succeed.load(Ordering::SeqCst)
        }

        fn confirm_incremental(
            &self,
            _data_id: &str,
            _file_name: &str,
            _tenant_id: &str,
            _file_bytes: u64,
            _object_key: &str,
        ) -> bool {
            self.incremental_calls.fetch_add(1, Ordering::SeqCst);
            self.succeed.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unconfigured_sink_always_fails() {
        let sink = UnconfiguredConfirmationSink;
        assert!(!sink.confirm_batch("D", "name", "tenant", 10, "key"));
        assert!(!sink.confirm_incremental("D", "file", "tenant", 10, "key"));
    }
}
