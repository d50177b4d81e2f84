//! FFI bindings for the risk engine
//!
//! C-compatible functions for calling the engine from mobile shells. Inputs
//! and outputs are JSON strings; returned strings must be freed with
//! `risk_free_string`. On failure a function returns NULL (or -1) and the
//! message is available from `risk_last_error`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use crate::clock::{local_time, Clock, ManualClock, SystemClock};
use crate::config::EngineConfig;
use crate::engine::RiskEngine;
use crate::error::RiskError;
use crate::store::{EventStore, MemoryStore};
use crate::types::{Event, EventType};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Pin `clock` to `now_ms`, or to the device clock when `now_ms <= 0`
fn pin_clock(clock: &ManualClock, now_ms: i64, utc_offset_minutes: i32) -> Result<(), RiskError> {
    let now = if now_ms <= 0 {
        SystemClock.now()
    } else {
        local_time(now_ms, utc_offset_minutes)
            .ok_or_else(|| RiskError::InvalidConfig(format!("timestamp out of range: {now_ms}")))?
    };
    clock.set(now);
    Ok(())
}

fn report_json(engine: &EngineHandle, now_ms: i64) -> Result<String, RiskError> {
    pin_clock(&engine.clock, now_ms, engine.engine.store().utc_offset_minutes())?;
    Ok(serde_json::to_string(&engine.engine.report())?)
}

fn build_engine(log_json: &str, config_json: Option<&str>) -> Result<EngineHandle, RiskError> {
    let store = MemoryStore::from_json(log_json)?;
    let config = match config_json {
        Some(json) => EngineConfig::from_json(json)?,
        None => EngineConfig::default(),
    };
    let clock = Arc::new(ManualClock::new(SystemClock.now()));
    let engine = RiskEngine::with_clock(store, config, Box::new(Arc::clone(&clock)))?;
    Ok(EngineHandle { engine, clock })
}

// ============================================================================
// Stateless API
// ============================================================================

/// Compute a full risk report for an event-log document.
///
/// # Safety
/// - `log_json` must be a valid null-terminated C string.
/// - `now_ms` is epoch milliseconds; pass 0 to use the device clock.
/// - Returns a newly allocated string that must be freed with `risk_free_string`.
/// - Returns NULL on error; call `risk_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn risk_report_json(log_json: *const c_char, now_ms: i64) -> *mut c_char {
    clear_last_error();

    let log_str = match cstr_to_string(log_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid event log string pointer");
            return ptr::null_mut();
        }
    };

    match build_engine(&log_str, None).and_then(|handle| report_json(&handle, now_ms)) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateful Engine API
// ============================================================================

/// Opaque handle to an engine over an in-memory event log
pub struct EngineHandle {
    engine: RiskEngine<MemoryStore>,
    clock: Arc<ManualClock>,
}

/// Create an engine from an event-log document and optional config.
///
/// # Safety
/// - `log_json` must be a valid null-terminated C string.
/// - `config_json` may be NULL for the default configuration.
/// - Must be freed with `risk_engine_free`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn risk_engine_new(
    log_json: *const c_char,
    config_json: *const c_char,
) -> *mut EngineHandle {
    clear_last_error();

    let log_str = match cstr_to_string(log_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid event log string pointer");
            return ptr::null_mut();
        }
    };

    let config_str = if config_json.is_null() {
        None
    } else {
        match cstr_to_string(config_json) {
            Some(s) => Some(s),
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        }
    };

    match build_engine(&log_str, config_str.as_deref()) {
        Ok(handle) => Box::into_raw(Box::new(handle)),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `risk_engine_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn risk_engine_free(engine: *mut EngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Compute a risk report with a stateful engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `risk_engine_new`.
/// - Returns a newly allocated string that must be freed with `risk_free_string`.
/// - Returns NULL on error; call `risk_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn risk_engine_report(engine: *mut EngineHandle, now_ms: i64) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    match report_json(&*engine, now_ms) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Append one event (`{"type": ..., "timestamp": ...}`) to the engine's log.
///
/// Logging an urge clears the cached prediction.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `risk_engine_new`.
/// - `event_json` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn risk_engine_append_event(
    engine: *mut EngineHandle,
    event_json: *const c_char,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let handle = &*engine;

    let event_str = match cstr_to_string(event_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid event string pointer");
            return -1;
        }
    };

    match serde_json::from_str::<Event>(&event_str) {
        Ok(event) => {
            let is_urge = event.event_type == EventType::UrgeLogged;
            handle.engine.store().append_event(event);
            if is_urge {
                handle.engine.invalidate_prediction();
            }
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Clear the engine's cached prediction.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `risk_engine_new`.
/// - Returns 0 on success, -1 on a NULL handle.
#[no_mangle]
pub unsafe extern "C" fn risk_engine_invalidate(engine: *mut EngineHandle) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    (*engine).engine.invalidate_prediction();
    0
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by engine functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by an engine function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn risk_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next engine call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn risk_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn risk_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
