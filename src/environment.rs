//! Shared runtime environment.
//!
//! A runtime has at most one live environment. Factories share it through an
//! `Arc`; once the last holder drops it the environment is released, and the
//! next factory creates a fresh one.
//!
//! Runtime log messages are forwarded into `tracing` under the
//! `alice_ort::runtime` target. Warnings and above always go through;
//! verbose and info messages only while debug output is enabled.

use std::ffi::{c_void, CString};
use std::fmt;
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};

use crate::config::RuntimeConfig;
use crate::error::{OrtError, OrtResult};
use crate::ffi::{LoggingLevel, OrtEnv};
use crate::handle::OwnedHandle;
use crate::runtime::{cstr_lossy, Runtime};

/// State reachable from the native logging callback.
#[derive(Debug, Default)]
struct LogSink {
    debug_output: AtomicBool,
    forwarded: AtomicU64,
}

/// Runtime environment shared by every engine of a runtime.
pub struct Environment {
    handle: OwnedHandle<OrtEnv>,
    // Released after `handle`: the runtime may log until the env is gone.
    sink: Box<LogSink>,
    log_id: String,
    log_level: LoggingLevel,
}

impl Environment {
    /// Return the runtime's live environment, creating one if none is alive.
    ///
    /// A live environment keeps its log id and level; asking for different
    /// ones is an [`OrtError::InvalidConfig`]. `debug_output` is applied to
    /// the live environment and so affects every holder.
    pub fn shared(runtime: &Arc<Runtime>, config: &RuntimeConfig) -> OrtResult<Arc<Self>> {
        let mut slot = runtime
            .environment_slot()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(environment) = slot.upgrade() {
            environment.check_compatible(config)?;
            environment.enable_debug_output(config.debug_output);
            return Ok(environment);
        }

        let environment = Arc::new(Self::create(runtime, config)?);
        *slot = Arc::downgrade(&environment);
        Ok(environment)
    }

    fn create(runtime: &Arc<Runtime>, config: &RuntimeConfig) -> OrtResult<Self> {
        let log_id = CString::new(config.log_id.as_str())
            .map_err(|_| OrtError::InvalidConfig("log_id cannot contain NUL bytes".into()))?;
        let sink = Box::new(LogSink {
            debug_output: AtomicBool::new(config.debug_output),
            forwarded: AtomicU64::new(0),
        });

        let api = runtime.api();
        let mut env: *mut OrtEnv = ptr::null_mut();
        // SAFETY: `sink` is boxed, so its address is stable, and it outlives
        // the env handle (field order).
        let status = unsafe {
            (api.create_env_with_custom_logger)(
                forward_runtime_log,
                &*sink as *const LogSink as *mut c_void,
                config.log_level,
                log_id.as_ptr(),
                &mut env,
            )
        };
        runtime.check(status, "create_env_with_custom_logger")?;
        let handle = unsafe {
            OwnedHandle::from_raw(runtime, env, api.release_env, "create_env_with_custom_logger")?
        };

        tracing::debug!(
            log_id = %config.log_id,
            log_level = ?config.log_level,
            debug_output = config.debug_output,
            "created runtime environment"
        );
        Ok(Self {
            handle,
            sink,
            log_id: config.log_id.clone(),
            log_level: config.log_level,
        })
    }

    fn check_compatible(&self, config: &RuntimeConfig) -> OrtResult<()> {
        if config.log_id != self.log_id || config.log_level != self.log_level {
            tracing::warn!(
                live_log_id = %self.log_id,
                live_log_level = ?self.log_level,
                log_id = %config.log_id,
                log_level = ?config.log_level,
                "runtime environment already live with other logging settings"
            );
            return Err(OrtError::InvalidConfig(format!(
                "runtime environment is live as {:?} at {:?}; requested {:?} at {:?}",
                self.log_id, self.log_level, config.log_id, config.log_level
            )));
        }
        Ok(())
    }

    /// Raw environment, needed by profiling calls.
    #[inline]
    pub fn as_ptr(&self) -> *mut OrtEnv {
        self.handle.as_ptr()
    }

    /// Toggle forwarding of verbose and info runtime messages.
    pub fn enable_debug_output(&self, enabled: bool) {
        self.sink.debug_output.store(enabled, Ordering::Relaxed);
    }

    /// Whether verbose and info messages are forwarded.
    pub fn debug_output(&self) -> bool {
        self.sink.debug_output.load(Ordering::Relaxed)
    }

    /// Number of runtime messages forwarded so far.
    pub fn forwarded_messages(&self) -> u64 {
        self.sink.forwarded.load(Ordering::Relaxed)
    }

    /// Identifier the runtime tags its messages with.
    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    /// Minimum severity the runtime was asked to emit.
    pub fn log_level(&self) -> LoggingLevel {
        self.log_level
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("handle", &self.handle)
            .field("log_level", &self.log_level)
            .field("debug_output", &self.debug_output())
            .finish()
    }
}

/// Native logging callback registered with every environment.
unsafe extern "C" fn forward_runtime_log(
    param: *mut c_void,
    severity: c_int,
    category: *const c_char,
    logid: *const c_char,
    code_location: *const c_char,
    message: *const c_char,
) {
    let Some(sink) = (param as *const LogSink).as_ref() else {
        return;
    };
    let level = LoggingLevel::from_raw(severity).unwrap_or(LoggingLevel::Warning);
    if level < LoggingLevel::Warning && !sink.debug_output.load(Ordering::Relaxed) {
        return;
    }
    sink.forwarded.fetch_add(1, Ordering::Relaxed);

    let category = cstr_lossy(category);
    let logid = cstr_lossy(logid);
    let location = cstr_lossy(code_location);
    let message = cstr_lossy(message);
    match level {
        LoggingLevel::Verbose => {
            tracing::trace!(target: "alice_ort::runtime", %category, %logid, %location, "{message}")
        }
        LoggingLevel::Info => {
            tracing::info!(target: "alice_ort::runtime", %category, %logid, %location, "{message}")
        }
        LoggingLevel::Warning => {
            tracing::warn!(target: "alice_ort::runtime", %category, %logid, %location, "{message}")
        }
        LoggingLevel::Error | LoggingLevel::Fatal => {
            tracing::error!(target: "alice_ort::runtime", %category, %logid, %location, "{message}")
        }
    }
}
