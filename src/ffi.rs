//! FFI bindings for Engage Flux
//!
//! This module provides C-compatible functions for driving the engine from
//! other languages (typically the web layer that receives frames). Classifier
//! outputs cross the boundary as `FrameObservation` JSON; results and reports
//! come back as JSON.
//!
//! All functions use C strings (null-terminated) and return allocated memory
//! that must be freed by the caller using `engage_free_string`. The engine
//! handle may be shared between threads: every call takes it by shared
//! reference.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::pipeline::{parse_session_id, EngagementEngine};
use crate::report::ReportGenerator;
use crate::types::FrameObservation;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
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

/// Report an engine result as a C string, recording errors
fn finish(result: Result<String, EngineError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Engine Lifecycle
// ============================================================================

/// Opaque handle to an EngagementEngine
pub struct EngageEngineHandle {
    engine: EngagementEngine,
}

/// Create a new engine.
///
/// # Safety
/// - `config_json` may be NULL for the default configuration, otherwise it must
///   be a valid null-terminated C string holding an `EngineConfig` JSON object.
/// - Returns a pointer that must be freed with `engage_engine_free`.
/// - Returns NULL on error; call `engage_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn engage_engine_new(config_json: *const c_char) -> *mut EngageEngineHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        EngineConfig::default()
    } else {
        let json = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match EngineConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    match EngagementEngine::with_config(config) {
        Ok(engine) => Box::into_raw(Box::new(EngageEngineHandle { engine })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine. Live sessions are discarded without reports.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `engage_engine_new`, or NULL.
/// - No other thread may be using the handle. After this call it is invalid.
#[no_mangle]
pub unsafe extern "C" fn engage_engine_free(engine: *mut EngageEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

// ============================================================================
// Session API
// ============================================================================

/// Start a session and return its id.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `engage_engine_new`.
/// - Returns a newly allocated string that must be freed with `engage_free_string`.
/// - Returns NULL on error; call `engage_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn engage_start_session(
    engine: *const EngageEngineHandle,
    timer_minutes: i32,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &*engine;

    let timer = match u32::try_from(timer_minutes) {
        Ok(t) => t,
        Err(_) => {
            set_last_error("timer_minutes must be >= 0");
            return ptr::null_mut();
        }
    };

    let id = handle.engine.start_session(timer);
    string_to_cstr(&id.to_string())
}

/// Apply one frame's classifier outputs to a session.
///
/// Fails for an unknown or ended session and for a payload that is not an
/// observation at all. Out-of-range values inside a well-formed observation
/// degrade to "no detection" instead.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `engage_engine_new`.
/// - `session_id` and `observation_json` must be valid null-terminated C strings.
/// - Returns a newly allocated `FrameResult` JSON string that must be freed with
///   `engage_free_string`.
/// - Returns NULL on error; call `engage_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn engage_observe_frame(
    engine: *const EngageEngineHandle,
    session_id: *const c_char,
    observation_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &*engine;

    let id_str = match cstr_to_string(session_id) {
        Some(s) => s,
        None => {
            set_last_error("Invalid session_id string pointer");
            return ptr::null_mut();
        }
    };

    let json_str = match cstr_to_string(observation_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid observation string pointer");
            return ptr::null_mut();
        }
    };

    finish((|| -> Result<String, EngineError> {
        // An unknown session wins over a malformed payload
        let id = parse_session_id(&id_str)
            .filter(|id| handle.engine.is_active(id))
            .ok_or_else(|| EngineError::InvalidSession(id_str.clone()))?;
        // Out-of-range classifier values are absorbed by the engine
        let observation: FrameObservation = serde_json::from_str(&json_str)?;
        let result = handle.engine.observe(&id, &observation)?;
        Ok(serde_json::to_string(&result)?)
    })())
}

/// End a session and return its report.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `engage_engine_new`.
/// - `session_id` must be a valid null-terminated C string.
/// - Returns a newly allocated `SessionReport` JSON string that must be freed
///   with `engage_free_string`.
/// - Returns NULL if the session is unknown or already ended; call
///   `engage_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn engage_end_session(
    engine: *const EngageEngineHandle,
    session_id: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &*engine;

    let id_str = match cstr_to_string(session_id) {
        Some(s) => s,
        None => {
            set_last_error("Invalid session_id string pointer");
            return ptr::null_mut();
        }
    };

    finish((|| -> Result<String, EngineError> {
        let id = parse_session_id(&id_str)
            .ok_or_else(|| EngineError::SessionNotFound(id_str.clone()))?;
        let report = handle.engine.end_session(&id)?;
        ReportGenerator::encode_to_json(&report)
    })())
}

/// Number of live sessions, or -1 on a NULL engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `engage_engine_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn engage_session_count(engine: *const EngageEngineHandle) -> i64 {
    if engine.is_null() {
        return -1;
    }
    (*engine).engine.session_count() as i64
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Engage functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by an Engage function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn engage_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next Engage function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn engage_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Engage Flux library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn engage_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
