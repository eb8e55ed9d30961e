//! Loading the wrapped runtime and translating its status codes.
//!
//! The shared library is opened at runtime with `libloading`, so builds do
//! not depend on a particular runtime install. Both function tables live in
//! the library's static memory; [`Runtime`] keeps the library loaded for as
//! long as any wrapper holds an `Arc<Runtime>`.

use std::ffi::CStr;
use std::fmt;
use std::os::raw::c_char;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, Weak};

use libloading::Library;

use crate::config::RuntimeConfig;
use crate::environment::Environment;
use crate::error::{OrtError, OrtResult};
use crate::ffi::{
    AdapterApi, GetAdapterApiFn, GetApiBaseFn, OrtStatusPtr, RuntimeApi, GET_ADAPTER_API_SYMBOL,
    GET_API_BASE_SYMBOL,
};

/// A loaded runtime: its two function tables and the library that owns them.
pub struct Runtime {
    api: NonNull<RuntimeApi>,
    adapter: NonNull<AdapterApi>,
    version: String,
    api_version: u32,
    /// Shared environment, re-created once every holder has dropped it.
    environment: Mutex<Weak<Environment>>,
    // Declared last: the tables above point into the library.
    _library: Option<Library>,
}

impl Runtime {
    /// Open the library named by `config` and resolve its tables.
    ///
    /// # Errors
    /// * `LibraryLoad` - the library cannot be opened
    /// * `MissingSymbol` - an entry point is not exported
    /// * `UnsupportedApiVersion` - the runtime refuses `config.api_version`
    pub fn load(config: &RuntimeConfig) -> OrtResult<Arc<Self>> {
        config.validate()?;
        let path = &config.library_path;

        // SAFETY: loading a library runs its initialisers; the configured
        // library is trusted to be the runtime shim.
        let library = unsafe { Library::new(path) }.map_err(|source| OrtError::LibraryLoad {
            path: path.clone(),
            source,
        })?;

        let missing = |symbol: &[u8], source: libloading::Error| OrtError::MissingSymbol {
            path: path.clone(),
            symbol: String::from_utf8_lossy(&symbol[..symbol.len() - 1]).into_owned(),
            source,
        };

        // SAFETY: the symbol types match the header declarations.
        let get_api_base: GetApiBaseFn = unsafe {
            *library
                .get::<GetApiBaseFn>(GET_API_BASE_SYMBOL)
                .map_err(|e| missing(GET_API_BASE_SYMBOL, e))?
        };
        let get_adapter_api: GetAdapterApiFn = unsafe {
            *library
                .get::<GetAdapterApiFn>(GET_ADAPTER_API_SYMBOL)
                .map_err(|e| missing(GET_ADAPTER_API_SYMBOL, e))?
        };

        // SAFETY: both entry points come from `library`, which the runtime keeps.
        let runtime = unsafe {
            Self::from_entry_points(Some(library), get_api_base, get_adapter_api, config.api_version)?
        };
        tracing::info!(
            path = %path.display(),
            version = %runtime.version(),
            api_version = config.api_version,
            "loaded inference runtime"
        );
        Ok(runtime)
    }

    /// Build a runtime from its two entry points.
    ///
    /// # Safety
    /// The entry points and every table they return must stay valid while
    /// `library` is loaded (or for the whole process when `library` is `None`).
    pub unsafe fn from_entry_points(
        library: Option<Library>,
        get_api_base: GetApiBaseFn,
        get_adapter_api: GetAdapterApiFn,
        api_version: u32,
    ) -> OrtResult<Arc<Self>> {
        let base = get_api_base()
            .as_ref()
            .ok_or(OrtError::NullHandle("alice_ort_get_api_base"))?;

        let api = NonNull::new((base.get_api)(api_version) as *mut RuntimeApi)
            .ok_or(OrtError::UnsupportedApiVersion(api_version))?;
        let adapter = NonNull::new(get_adapter_api(api.as_ptr()) as *mut AdapterApi)
            .ok_or(OrtError::NullHandle("alice_ort_get_adapter_api"))?;
        let version = cstr_lossy((base.get_version_string)());

        Ok(Arc::new(Self {
            api,
            adapter,
            version,
            api_version,
            environment: Mutex::new(Weak::new()),
            _library: library,
        }))
    }

    /// Build a runtime over tables that live for the whole process.
    pub fn from_static(
        api: &'static RuntimeApi,
        adapter: &'static AdapterApi,
        version: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            api: NonNull::from(api),
            adapter: NonNull::from(adapter),
            version: version.into(),
            api_version: crate::config::SUPPORTED_API_VERSION,
            environment: Mutex::new(Weak::new()),
            _library: None,
        })
    }

    /// Core function table.
    #[inline]
    pub fn api(&self) -> &RuntimeApi {
        // SAFETY: the table outlives `self` (see constructors).
        unsafe { self.api.as_ref() }
    }

    /// Engine adapter function table.
    #[inline]
    pub fn adapter(&self) -> &AdapterApi {
        // SAFETY: the table outlives `self` (see constructors).
        unsafe { self.adapter.as_ref() }
    }

    /// Version string reported by the runtime.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Negotiated table version.
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    pub(crate) fn environment_slot(&self) -> &Mutex<Weak<Environment>> {
        &self.environment
    }

    /// Translate a native status.
    ///
    /// A null status is success. Anything else is read, released, and turned
    /// into [`OrtError::Runtime`].
    pub fn check(&self, status: OrtStatusPtr, operation: &'static str) -> OrtResult<()> {
        if status.is_null() {
            return Ok(());
        }
        let api = self.api();
        // SAFETY: `status` is a live status owned by us; it is released once.
        let (code, message) = unsafe {
            let code = (api.get_error_code)(status);
            let message = cstr_lossy((api.get_error_message)(status));
            (api.release_status)(status);
            (code, message)
        };
        tracing::debug!(operation, code, %message, "runtime call failed");
        Err(OrtError::Runtime {
            operation,
            code,
            message,
        })
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("version", &self.version)
            .field("api_version", &self.api_version)
            .field("dynamic", &self._library.is_some())
            .finish()
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Runtime({}, api v{})", self.version, self.api_version)
    }
}

// Safety: the tables are immutable function pointers in static memory and
// the environment slot is behind a mutex.
unsafe impl Send for Runtime {}
unsafe impl Sync for Runtime {}

/// Copy a NUL-terminated native string. Null yields an empty string.
pub(crate) fn cstr_lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: the runtime hands out NUL-terminated strings.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Copy a `(pointer, length)` native string. Null yields an empty string.
pub(crate) fn str_from_parts(ptr: *const c_char, len: usize) -> String {
    if ptr.is_null() || len == 0 {
        return String::new();
    }
    // SAFETY: the runtime guarantees `len` readable bytes at `ptr`.
    let bytes = unsafe { std::slice::from_raw_parts(ptr as *const u8, len) };
    String::from_utf8_lossy(bytes).into_owned()
}
