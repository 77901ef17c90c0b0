//! Single-writer asynchronous S3 upload engine for clinical data
//! submissions: a durable in-process queue drained by one supervised
//! worker, a tenant-keyed credential-refreshing client pool, and a
//! confirmation state machine that distinguishes batch and streaming
//! (append) semantics.
//!
//! `facade::Engine` is the entry point for embedding hosts that can speak
//! Rust directly; `ffi` exposes the same surface as a C-compatible ABI for
//! foreign runtimes.

pub mod codec;
pub mod confirm;
pub mod config;
pub mod credentials;
pub mod error;
pub mod facade;
pub mod ffi;
pub mod logging;
pub mod model;
pub mod objectkey;
pub mod pool;
pub mod scheduler;
pub mod tracker;
pub mod worker;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::facade::Engine;
pub use crate::model::{
    Credential, OperationMode, UploadId, UploadRecord, UploadSnapshot, UploadStatus, UploadTask,
};
