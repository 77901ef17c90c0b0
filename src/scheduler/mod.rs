//! The Scheduler & Supervisor: a FIFO queue guarded by a mutex and a
//! condition variable, drained by one supervised worker thread that
//! restarts itself on a stale heartbeat.

mod error;

pub use self::error::{Error, ErrorKind, Result};

use std::collections::VecDeque;
use std::panic;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration as StdDuration, Instant};

use log::{error, warn};

use crate::config::constants::{
    MAX_UPLOAD_LIMIT, QUEUE_WAIT_TIMEOUT_SECS, WORKER_HEARTBEAT_TIMEOUT_SECS,
};
use crate::confirm::ConfirmationSink;
use crate::model::UploadTask;
use crate::pool::Pool;
use crate::tracker::Tracker;
use crate::worker::Worker;

struct QueueState {
    tasks: VecDeque<UploadTask>,
    shutdown: bool,
}

struct SupervisorState {
    running: bool,
    last_heartbeat: Instant,
    handle: Option<JoinHandle<()>>,
}

/// Owns the task queue and supervises the single worker thread. Cheap to
/// clone: every field is an `Arc`, so a clone is a handle onto the same
/// running scheduler (used to hand the worker thread its own reference).
#[derive(Clone)]
pub struct Scheduler {
    queue: Arc<Mutex<QueueState>>,
    condvar: Arc<Condvar>,
    supervisor: Arc<Mutex<SupervisorState>>,
    tracker: Arc<Tracker>,
    pool: Arc<Pool>,
    confirm_sink: Arc<dyn ConfirmationSink>,
}

impl Scheduler {
    pub fn new(tracker: Arc<Tracker>, pool: Arc<Pool>, confirm_sink: Arc<dyn ConfirmationSink>) -> Self {
        Scheduler {
            queue: Arc::new(Mutex::new(QueueState {
                tasks: VecDeque::new(),
                shutdown: false,
            })),
            condvar: Arc::new(Condvar::new()),
            supervisor: Arc::new(Mutex::new(SupervisorState {
                running: false,
                last_heartbeat: Instant::now(),
                handle: None,
            })),
            tracker,
            pool,
            confirm_sink,
        }
    }

    /// Admission control: rejects a submission only when the tracker is at
    /// capacity *and* no sibling of `data_id` is already in flight. Callers
    /// that also register a Tracker record for this submission (the Facade)
    /// must call this *before* that registration — otherwise the
    /// just-registered record makes `get_all_by_data_id` non-empty and the
    /// rejection becomes unreachable. See `enqueue` for the second half.
    pub fn check_admission(&self, data_id: &str) -> Result<()> {
        if self.tracker.count_total() >= MAX_UPLOAD_LIMIT && self.tracker.get_all_by_data_id(data_id).is_empty() {
            return Err(Error::queue_full());
        }
        Ok(())
    }

    /// Ensures a worker is running and pushes `task` onto the queue.
    /// Carries no admission logic of its own — call `check_admission` first
    /// if the caller hasn't already.
    pub fn enqueue(&self, task: UploadTask) {
        self.ensure_worker_running();

        let mut queue = self.lock_queue();
        queue.tasks.push_back(task);
        drop(queue);
        self.condvar.notify_one();
    }

    /// `check_admission` followed by `enqueue`, as one call. Safe to use
    /// directly only when no Tracker record for `data_id` is registered
    /// between the admission check and the enqueue (see `enqueue`'s note).
    pub fn submit(&self, task: UploadTask, data_id: &str) -> Result<()> {
        self.check_admission(data_id)?;
        self.enqueue(task);
        Ok(())
    }

    pub fn queue_size(&self) -> usize {
        self.lock_queue().tasks.len()
    }

    /// Sets the shutdown flag and wakes the worker. Does not join: any
    /// task mid-flight is abandoned. Idempotent.
    pub fn shutdown(&self) {
        let mut queue = self.lock_queue();
        queue.shutdown = true;
        drop(queue);
        self.condvar.notify_all();
    }

    fn ensure_worker_running(&self) {
        let mut supervisor = self.supervisor.lock().unwrap_or_else(|p| p.into_inner());

        if !supervisor.running {
            self.spawn_worker(&mut supervisor);
            return;
        }

        if supervisor.last_heartbeat.elapsed() > StdDuration::from_secs(WORKER_HEARTBEAT_TIMEOUT_SECS) {
            warn!("worker heartbeat stale; restarting worker thread");
            supervisor.handle = None; // detach, do not join
            self.spawn_worker(&mut supervisor);
        }
    }

    fn spawn_worker(&self, supervisor: &mut SupervisorState) {
        supervisor.last_heartbeat = Instant::now();
        supervisor.running = true;

        let worker = self.clone();
        let handle = thread::Builder::new()
            .name("upload-worker".into())
            .spawn(move || worker.run_loop())
            .expect("failed to spawn upload worker thread");
        supervisor.handle = Some(handle);
    }

    fn run_loop(&self) {
        loop {
            {
                let mut supervisor = self.supervisor.lock().unwrap_or_else(|p| p.into_inner());
                supervisor.last_heartbeat = Instant::now();
            }

            let task = {
                let queue = self.lock_queue();
                let (mut queue, timeout_result) = self
                    .condvar
                    .wait_timeout_while(queue, StdDuration::from_secs(QUEUE_WAIT_TIMEOUT_SECS), |q| {
                        q.tasks.is_empty() && !q.shutdown
                    })
                    .unwrap_or_else(|p| p.into_inner());
                let _ = timeout_result;

                match queue.tasks.pop_front() {
                    Some(task) => Some(task),
                    None => {
                        if queue.shutdown {
                            None
                        } else {
                            continue;
                        }
                    }
                }
            };

            let task = match task {
                Some(task) => task,
                None => break,
            };

            log_mdc::insert("upload_id", task.upload_id.as_str().to_owned());
            log_mdc::insert("tid", format!("{:?}", thread::current().id()));

            let tracker = self.tracker.clone();
            let pool = self.pool.clone();
            let confirm_sink = self.confirm_sink.clone();

            let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
                Worker::process_task(&task, &tracker, &pool, confirm_sink.as_ref(), true);
            }));

            log_mdc::remove("upload_id");

            if let Err(payload) = result {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("worker panicked processing {}: {}", task.upload_id, message);
            }
        }

        let mut supervisor = self.supervisor.lock().unwrap_or_else(|p| p.into_inner());
        supervisor.running = false;
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::confirm::test_support::RecordingConfirmationSink;
    use crate::credentials::test_support::FixedCredentialsSource;
    use crate::model::{OperationMode, UploadId};
    use chrono::Duration;
    use std::path::PathBuf;
    use std::time::Duration as StdDur;

    fn scheduler() -> (Scheduler, Arc<Tracker>) {
        let tracker = Arc::new(Tracker::new());
        let source = Arc::new(FixedCredentialsSource::new(Duration::seconds(3600)));
        let pool = Arc::new(Pool::new(crate::config::EngineConfig::default(), source));
        let sink = Arc::new(RecordingConfirmationSink::new(true));
        (
            Scheduler::new(tracker.clone(), pool, sink),
            tracker,
        )
    }

    #[test]
    fn rejects_when_full_and_no_sibling() {
        let (scheduler, tracker) = scheduler();
        for i in 0..MAX_UPLOAD_LIMIT {
            tracker.add(
                UploadId::new(&format!("D{}", i)),
                PathBuf::from("/tmp/f"),
                format!("patient/P/source_data/D{}/f/f", i),
                "P".into(),
                OperationMode::BatchCreate,
            );
        }
        let task = UploadTask {
            upload_id: UploadId::new("NEW"),
            region: "us-east-1".into(),
            bucket: "bucket".into(),
            object_key: "patient/P/source_data/NEW/f/f".into(),
            local_path: PathBuf::from("/tmp/f"),
            tenant_id: "tenant".into(),
            operation_mode: OperationMode::BatchCreate,
        };
        assert!(scheduler.submit(task, "NEW").is_err());
    }

    #[test]
    fn admits_sibling_even_when_full() {
        let (scheduler, tracker) = scheduler();
        for i in 0..MAX_UPLOAD_LIMIT {
            tracker.add(
                UploadId::new(&format!("D{}", i)),
                PathBuf::from("/tmp/f"),
                format!("patient/P/source_data/D{}/f/f", i),
                "P".into(),
                OperationMode::BatchCreate,
            );
        }
        let sibling_data_id = "D0";
        let record = tracker.get_all_by_data_id(sibling_data_id).remove(0);
        let task = UploadTask {
            upload_id: UploadId::new(sibling_data_id),
            region: "us-east-1".into(),
            bucket: "bucket".into(),
            object_key: record.object_key.clone(),
            local_path: PathBuf::from("/tmp/f"),
            tenant_id: "tenant".into(),
            operation_mode: OperationMode::BatchCreate,
        };
        assert!(scheduler.submit(task, sibling_data_id).is_ok());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (scheduler, _tracker) = scheduler();
        scheduler.shutdown();
        scheduler.shutdown();
    }

    #[test]
    fn queue_size_reflects_pending_tasks() {
        let (scheduler, tracker) = scheduler();
        tracker.add(
            UploadId::new("D1"),
            PathBuf::from("/tmp/does-not-exist"),
            "patient/P/source_data/D1/f/f".into(),
            "P".into(),
            OperationMode::BatchCreate,
        );
        let task = UploadTask {
            upload_id: UploadId::new("D1"),
            region: "us-east-1".into(),
            bucket: "bucket".into(),
            object_key: "patient/P/source_data/D1/f/f".into(),
            local_path: PathBuf::from("/tmp/does-not-exist"),
            tenant_id: "tenant".into(),
            operation_mode: OperationMode::BatchCreate,
        };
        scheduler.submit(task, "D1").unwrap();
        thread::sleep(StdDur::from_millis(200));
        scheduler.shutdown();
        // Queue drains quickly since the file does not exist (fast failure);
        // this mainly exercises that queue_size never panics mid-drain.
        let _ = scheduler.queue_size();
    }
}
