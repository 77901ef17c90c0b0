//! Program level configuration constants live here.

/// Maximum number of attempts for a single S3 PUT, including the first try.
/// `MAX_UPLOAD_RETRIES + 1` in the spec's terms.
pub const MAX_UPLOAD_ATTEMPTS: u32 = 4;

/// Linear back-off applied before retry attempt `k` (`k` starting at 1):
/// `RETRY_BACKOFF_SECS * k` seconds.
pub const RETRY_BACKOFF_SECS: u64 = 2;

/// Admission control ceiling on total tracked uploads (`MAX_UPLOAD_LIMIT`).
pub const MAX_UPLOAD_LIMIT: usize = 100;

/// Default margin, in seconds, before credential expiration at which the
/// Refreshing Client Pool proactively refreshes a tenant's client.
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 600;

/// Default bound on the number of cached per-tenant clients.
pub const DEFAULT_MAX_CACHE_SIZE: usize = 1000;

/// Default number of pooled connections per object-store client.
pub const DEFAULT_MAX_POOL_CONNECTIONS: usize = 4;

/// How long the scheduler's worker loop waits on the queue condition
/// variable before re-checking for shutdown or a stale heartbeat.
pub const QUEUE_WAIT_TIMEOUT_SECS: u64 = 5;

/// A worker that hasn't updated its heartbeat within this window is
/// considered dead and is replaced by the supervisor.
pub const WORKER_HEARTBEAT_TIMEOUT_SECS: u64 = 30;

/// Object-store request timeout.
pub const S3_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Object-store connect timeout.
pub const S3_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Reserved separator between a `DataId` and its microsecond timestamp
/// suffix inside an `UploadId`.
pub const UPLOAD_ID_SEPARATOR: char = '_';

/// Fixed `dataType` value sent to the confirmation sink for batch
/// confirmations.
pub const CONFIRM_BATCH_DATA_TYPE: i32 = 20;
