//! FFI bindings for the library.
//!
//! Sessions run their tasks on a private multi-thread runtime, so the host
//! may call these functions from any thread, including its UI thread.

use std::ffi::{CStr, c_char, c_void};
use std::io;
use std::ops::Deref;
use std::sync::{Arc, LazyLock};

use tokio::runtime::{Builder as RuntimeBuilder, Runtime};

use crate::{Config, Session, SessionBuilder};

static TOKIO_RUNTIME: LazyLock<Result<Runtime, io::Error>> =
    LazyLock::new(|| {
        RuntimeBuilder::new_multi_thread()
            .enable_all()
            .worker_threads(2)
            .thread_name("mirror-agent")
            .build()
    });

/// Error codes returned by the C APIs.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    /// No error occurred.
    Ok = 0,
    /// Invalid parameters or strings.
    Invalid = 1,
    /// The configuration is incomplete or invalid.
    Config = 2,
    /// The runtime hosting the tasks could not be started.
    Runtime = 3,
}

/// Callbacks for a single task.
///
/// Note that callback functions and `user_info` are assumed to be thread-safe
/// and able to send across the thread boundaries.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TaskCallbacks {
    /// User-defined data to be passed to the callbacks.
    pub user_info: *mut c_void,
    /// Callback to handle progress messages.
    ///
    /// Parameters:
    /// - `user_info`: The user-defined data.
    /// - `status`: Status string, not nul-terminated.
    /// - `status_len`: Length of the status string.
    pub on_status: Option<unsafe extern "C" fn(*mut c_void, *const c_char, usize)>,
    /// Callback invoked exactly once when the task ends.
    ///
    /// Parameters:
    /// - `user_info`: The user-defined data.
    /// - `success`: Whether the task was completed.
    /// - `reason`: Reason string, not nul-terminated.
    /// - `reason_len`: Length of the reason string.
    pub on_complete:
        Option<unsafe extern "C" fn(*mut c_void, bool, *const c_char, usize)>,
    /// Callback to free the user-defined data, invoked after the last use of
    /// it.
    pub free: Option<unsafe extern "C" fn(*mut c_void)>,
}

// SAFETY: `TaskCallbacks` is guaranteed to be thread-safe by users.
unsafe impl Send for TaskCallbacks {}
unsafe impl Sync for TaskCallbacks {}

/// Frees the user info once every callback referring to it is gone.
struct CallbacksGuard {
    callbacks: TaskCallbacks,
}

impl Deref for CallbacksGuard {
    type Target = TaskCallbacks;

    fn deref(&self) -> &Self::Target {
        &self.callbacks
    }
}

impl Drop for CallbacksGuard {
    fn drop(&mut self) {
        if let Some(free) = self.callbacks.free {
            // SAFETY: Assume the callback is valid.
            unsafe { free(self.callbacks.user_info) };
        }
    }
}

#[inline]
fn runtime() -> Option<&'static Runtime> {
    match &*TOKIO_RUNTIME {
        Ok(runtime) => Some(runtime),
        Err(err) => {
            error!("failed to start the runtime: {err}");
            None
        }
    }
}

/// Reads a nul-terminated string, where null means "not set".
///
/// # Safety
///
/// `ptr` must be null or point to a nul-terminated string.
unsafe fn optional_str<'a>(ptr: *const c_char) -> Result<Option<&'a str>, ErrorCode> {
    if ptr.is_null() {
        return Ok(None);
    }
    // SAFETY: Assume the caller has provided a valid string.
    let s = unsafe { CStr::from_ptr(ptr) };
    s.to_str().map(Some).map_err(|_| ErrorCode::Invalid)
}

#[inline]
fn write_session(out: *mut *mut c_void, session: Session) {
    let session_ptr = Box::into_raw(Box::new(session));
    // SAFETY: Assume `out` is valid and properly aligned.
    unsafe { (out as *mut *mut Session).write(session_ptr) };
}

/// Creates a session configured from the environment variables.
///
/// `out` will be set to a pointer to the session if the call succeeds. The
/// caller must free the session with `ma_session_free`.
///
/// # Safety
///
/// `out` must be a valid pointer that points to a pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ma_session_new_from_env(
    out: *mut *mut c_void,
) -> ErrorCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ErrorCode::Config;
        }
    };
    write_session(out, SessionBuilder::from_config(&config).build());
    ErrorCode::Ok
}

/// Creates a session with explicit settings.
///
/// `model` may be null to use the default model. `max_tokens` and
/// `max_messages` may be 0, and `temperature` may be negative, to use the
/// defaults.
///
/// `out` will be set to a pointer to the session if the call succeeds. The
/// caller must free the session with `ma_session_free`.
///
/// # Safety
///
/// Strings passed to this function must contain a valid nul terminator at the
/// end of the string. `out` must be a valid pointer that points to a pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ma_session_new(
    out: *mut *mut c_void,
    api_key: *const c_char,
    model: *const c_char,
    max_tokens: u32,
    temperature: f32,
    max_messages: u32,
) -> ErrorCode {
    // SAFETY: Assume the caller has provided the valid pointers.
    let (api_key, model) = unsafe {
        let Ok(Some(api_key)) = optional_str(api_key) else {
            return ErrorCode::Invalid;
        };
        let Ok(model) = optional_str(model) else {
            return ErrorCode::Invalid;
        };
        (api_key, model)
    };

    let mut config = Config::with_api_key(api_key);
    config.model = model.map(ToOwned::to_owned);
    config.max_tokens = (max_tokens > 0).then_some(max_tokens);
    config.temperature = (temperature >= 0.0).then_some(temperature);
    if max_messages > 0 {
        config.max_messages = max_messages as usize;
    }
    if let Err(err) = config.validate() {
        error!("{err}");
        return ErrorCode::Config;
    }

    write_session(out, SessionBuilder::from_config(&config).build());
    ErrorCode::Ok
}

/// Starts a task on the session.
///
/// Tasks of one session run one after another. `on_complete` is invoked
/// exactly once for every task started successfully.
///
/// # Safety
///
/// `session` must be a valid pointer returned from the creation functions.
/// String pointed by `task` must contain a valid nul terminator at the end of
/// the string. `callbacks` must be a valid pointer to `TaskCallbacks` value,
/// and all fields must be either valid pointers or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ma_session_run(
    session: *mut c_void,
    task: *const c_char,
    callbacks: *const TaskCallbacks,
) -> ErrorCode {
    // SAFETY: Assume the caller has provided the valid pointers.
    let (session, task, callbacks) = unsafe {
        let Ok(Some(task)) = optional_str(task) else {
            return ErrorCode::Invalid;
        };
        (&*(session as *mut Session), task, *callbacks)
    };
    let guard = Arc::new(CallbacksGuard { callbacks });

    let Some(runtime) = runtime() else {
        return ErrorCode::Runtime;
    };
    // Tasks are spawned, which requires entering the runtime.
    let _enter = runtime.enter();

    session.run(
        task,
        {
            let guard = Arc::clone(&guard);
            move |success, reason| {
                if let Some(on_complete) = guard.on_complete {
                    // SAFETY: Assume the callback is valid.
                    unsafe {
                        on_complete(
                            guard.user_info,
                            success,
                            reason.as_ptr() as *const _,
                            reason.len(),
                        )
                    };
                }
            }
        },
        move |status| {
            if let Some(on_status) = guard.on_status {
                // SAFETY: Assume the callback is valid.
                unsafe {
                    on_status(
                        guard.user_info,
                        status.as_ptr() as *const _,
                        status.len(),
                    )
                };
            }
        },
    );

    ErrorCode::Ok
}

/// Pauses the running task of the session, if any.
///
/// # Safety
///
/// `session` must be a valid pointer returned from the creation functions.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ma_session_pause(session: *mut c_void) {
    // SAFETY: Assume the caller has provided the valid pointer.
    unsafe { &*(session as *mut Session) }.pause();
}

/// Resumes the running task of the session, if any.
///
/// # Safety
///
/// `session` must be a valid pointer returned from the creation functions.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ma_session_resume(session: *mut c_void) {
    // SAFETY: Assume the caller has provided the valid pointer.
    unsafe { &*(session as *mut Session) }.resume();
}

/// Cancels the running task of the session, if any.
///
/// # Safety
///
/// `session` must be a valid pointer returned from the creation functions.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ma_session_cancel(session: *mut c_void) {
    // SAFETY: Assume the caller has provided the valid pointer.
    unsafe { &*(session as *mut Session) }.cancel();
}

/// Returns whether the running task of the session is paused.
///
/// # Safety
///
/// `session` must be a valid pointer returned from the creation functions.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ma_session_is_paused(session: *mut c_void) -> bool {
    // SAFETY: Assume the caller has provided the valid pointer.
    unsafe { &*(session as *mut Session) }.is_paused()
}

/// Returns whether the running task of the session is being cancelled.
///
/// # Safety
///
/// `session` must be a valid pointer returned from the creation functions.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ma_session_is_cancelled(session: *mut c_void) -> bool {
    // SAFETY: Assume the caller has provided the valid pointer.
    unsafe { &*(session as *mut Session) }.is_cancelled()
}

/// Frees a session.
///
/// A task that is still running keeps going until it ends. Cancel it first
/// to stop it.
///
/// # Safety
///
/// `session` must be a valid pointer returned from the creation functions,
/// and must not be used after this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ma_session_free(session: *mut c_void) {
    // SAFETY: Assume the caller has provided the valid pointer.
    unsafe {
        let session_ptr = session as *mut Session;
        drop(Box::from_raw(session_ptr));
    }
}
