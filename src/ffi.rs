//! The C-compatible ABI shim. Wraps the Facade's methods as
//! `#[no_mangle] pub unsafe extern "C" fn`s: `*const c_char` arguments are
//! borrowed from the caller for the duration of the call; returned strings
//! are owned by the engine and remain valid until the next call into the
//! *same* function. A panic anywhere in a wrapped call is caught here and
//! turned into a safe default rather than unwinding across the FFI
//! boundary.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use log::error;

use crate::config::EngineConfig;
use crate::confirm::UnconfiguredConfirmationSink;
use crate::credentials::UnconfiguredCredentialsSource;
use crate::facade::{self, Engine};

lazy_static! {
    static ref ENGINE: Mutex<Option<Arc<Engine>>> = Mutex::new(None);
    static ref RESPONSE_BUFFERS: Mutex<HashMap<&'static str, CString>> = Mutex::new(HashMap::new());
}

/// Returns the process-global engine, constructing it on first use with
/// the unconfigured (always-failing) `CredentialsSource`/`ConfirmationSink`
/// pair. Hosts that want a real credentials/confirmation implementation
/// should use `crate::facade::Engine::new` directly rather than the ABI.
fn engine() -> Arc<Engine> {
    let mut guard = ENGINE.lock().unwrap_or_else(|p| p.into_inner());
    if guard.is_none() {
        *guard = Some(Arc::new(Engine::new(
            EngineConfig::default(),
            Arc::new(UnconfiguredCredentialsSource),
            Arc::new(UnconfiguredConfirmationSink),
        )));
    }
    guard.as_ref().expect("just initialized").clone()
}

unsafe fn borrow_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(str::to_owned)
}

/// Stores `value` as the owned response buffer for `function`, replacing
/// whatever that function returned last time, and returns a pointer valid
/// until the next call to that same function.
fn cache_response(function: &'static str, value: String) -> *const c_char {
    let owned = CString::new(value).unwrap_or_else(|_| CString::new("<invalid response>").unwrap());
    let mut buffers = RESPONSE_BUFFERS.lock().unwrap_or_else(|p| p.into_inner());
    buffers.insert(function, owned);
    buffers.get(function).expect("just inserted").as_ptr()
}

fn guard<T, F: FnOnce() -> T>(function: &'static str, default: T, f: F) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("panic crossing FFI boundary in {}: {}", function, message);
            default
        }
    }
}

/// `SetCredential(apiEndpoint, username, password) -> envelope`. The core
/// validates `apiEndpoint` and flips the idempotent init gate; wiring a
/// real network-backed `CredentialsSource` from `username`/`password` is a
/// host concern (see §4.4 — implementations are out of core scope), so
/// those two parameters are accepted and discarded here.
#[no_mangle]
pub unsafe extern "C" fn SetCredential(
    api_endpoint: *const c_char,
    _username: *const c_char,
    _password: *const c_char,
) -> *const c_char {
    let api_endpoint = borrow_str(api_endpoint);
    guard("SetCredential", std::ptr::null(), || {
        let envelope = match api_endpoint {
            Some(endpoint) => engine().initialize(&endpoint),
            None => crate::codec::submit_failure_envelope("Invalid parameters"),
        };
        cache_response("SetCredential", envelope)
    })
}

/// `UploadFileAsync(region, bucket, key, localPath, dataId, tenantId, opMode) -> envelope`.
#[no_mangle]
pub unsafe extern "C" fn UploadFileAsync(
    region: *const c_char,
    bucket: *const c_char,
    key: *const c_char,
    local_path: *const c_char,
    data_id: *const c_char,
    tenant_id: *const c_char,
    op_mode: i32,
) -> *const c_char {
    let region = borrow_str(region).unwrap_or_default();
    let bucket = borrow_str(bucket).unwrap_or_default();
    let key = borrow_str(key).unwrap_or_default();
    let local_path = borrow_str(local_path).unwrap_or_default();
    let data_id = borrow_str(data_id).unwrap_or_default();
    let tenant_id = borrow_str(tenant_id).unwrap_or_default();

    guard("UploadFileAsync", std::ptr::null(), || {
        let envelope = engine().submit_upload(&region, &bucket, &key, &local_path, &data_id, &tenant_id, op_mode);
        cache_response("UploadFileAsync", envelope)
    })
}

/// `GetAsyncUploadStatusBytes(dataId, buffer, bufferSize) -> bytesWritten`.
/// Truncates to `buffer_size`; returns 0 only for a null or zero-size
/// buffer.
#[no_mangle]
pub unsafe extern "C" fn GetAsyncUploadStatusBytes(
    data_id: *const c_char,
    buffer: *mut c_char,
    buffer_size: usize,
) -> i32 {
    if buffer.is_null() || buffer_size == 0 {
        return 0;
    }
    let data_id = borrow_str(data_id).unwrap_or_default();

    guard("GetAsyncUploadStatusBytes", 0, || {
        let envelope = engine().query_status_by_data_id(&data_id);
        let bytes = envelope.as_bytes();
        let written = bytes.len().min(buffer_size);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), buffer as *mut u8, written);
        written as i32
    })
}

/// `ShutdownUploadWorker()`. Best-effort, idempotent.
#[no_mangle]
pub unsafe extern "C" fn ShutdownUploadWorker() {
    guard("ShutdownUploadWorker", (), || {
        let _ = engine().shutdown();
    })
}

/// `GetUploadQueueSize() -> int`.
#[no_mangle]
pub unsafe extern "C" fn GetUploadQueueSize() -> i32 {
    guard("GetUploadQueueSize", 0, || engine().queue_size())
}

/// `FileExists(path) -> 0/1`.
#[no_mangle]
pub unsafe extern "C" fn FileExists(path: *const c_char) -> i32 {
    let path = borrow_str(path);
    guard("FileExists", 0, || match path {
        Some(p) => i32::from(facade::file_exists(&p)),
        None => 0,
    })
}

/// `GetS3FileSize(path) -> long, -1 on error`. Reports the size of the
/// local source file (historical ABI name).
#[no_mangle]
pub unsafe extern "C" fn GetS3FileSize(path: *const c_char) -> i64 {
    let path = borrow_str(path);
    guard("GetS3FileSize", -1, || match path {
        Some(p) => facade::local_file_size(&p),
        None => -1,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn set_credential_then_upload_round_trips_through_raw_pointers() {
        let endpoint = CString::new("https://api.example.com").unwrap();
        let ptr = unsafe { SetCredential(endpoint.as_ptr(), std::ptr::null(), std::ptr::null()) };
        let response = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap();
        assert!(response.contains(r#""code":5"#));
    }

    #[test]
    fn file_exists_reports_false_for_missing_path() {
        let path = CString::new("/definitely/not/a/real/path").unwrap();
        assert_eq!(unsafe { FileExists(path.as_ptr()) }, 0);
    }

    #[test]
    fn get_s3_file_size_reports_negative_one_for_missing_path() {
        let path = CString::new("/definitely/not/a/real/path").unwrap();
        assert_eq!(unsafe { GetS3FileSize(path.as_ptr()) }, -1);
    }

    #[test]
    fn get_async_upload_status_bytes_rejects_null_buffer() {
        let data_id = CString::new("D1").unwrap();
        assert_eq!(
            unsafe { GetAsyncUploadStatusBytes(data_id.as_ptr(), std::ptr::null_mut(), 64) },
            0
        );
    }
}
