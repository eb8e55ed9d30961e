//! Session builders: how a session is configured for its execution provider.
//!
//! [`CpuSessionBuilder`] creates plain CPU sessions. [`DmlSessionBuilder`]
//! registers the DirectML provider on a caller-supplied device/queue pair;
//! the runtime adds its CPU fallback provider, so DirectML sessions always
//! carry two providers.

use std::ffi::{c_void, CStr};
use std::fmt;
use std::os::raw::c_int;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::environment::Environment;
use crate::error::{OrtError, OrtResult};
use crate::ffi::{GraphOptimizationLevel, OrtExecutionProvider, OrtSession, OrtSessionOptions};
use crate::handle::OwnedHandle;
use crate::runtime::Runtime;

// ============================================================================
// Provider kinds and device resources
// ============================================================================

/// Execution provider a session was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Cpu,
    DirectMl,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Cpu => write!(f, "CPU"),
            ProviderKind::DirectMl => write!(f, "DirectML"),
        }
    }
}

/// D3D12 device and command queue used by DirectML sessions.
///
/// The adapter does not take references on these objects; the caller keeps
/// them alive for as long as any engine built on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceResources {
    device: NonNull<c_void>,
    queue: NonNull<c_void>,
}

impl DeviceResources {
    /// # Safety
    /// `device` must be an `ID3D12Device*` and `queue` an
    /// `ID3D12CommandQueue*` created on it, both outliving every engine
    /// built with them.
    pub unsafe fn new(device: *mut c_void, queue: *mut c_void) -> OrtResult<Self> {
        let device = NonNull::new(device)
            .ok_or_else(|| OrtError::InvalidArgument("D3D12 device is null".into()))?;
        let queue = NonNull::new(queue)
            .ok_or_else(|| OrtError::InvalidArgument("D3D12 command queue is null".into()))?;
        Ok(Self { device, queue })
    }

    /// # Safety
    /// Same contract as [`DeviceResources::new`].
    pub const unsafe fn from_non_null(device: NonNull<c_void>, queue: NonNull<c_void>) -> Self {
        Self { device, queue }
    }

    #[inline]
    pub fn device(&self) -> *mut c_void {
        self.device.as_ptr()
    }

    #[inline]
    pub fn queue(&self) -> *mut c_void {
        self.queue.as_ptr()
    }
}

// Safety: D3D12 devices and queues are free-threaded COM objects.
unsafe impl Send for DeviceResources {}
unsafe impl Sync for DeviceResources {}

// ============================================================================
// Session options
// ============================================================================

/// Owned session options.
pub struct SessionOptions {
    handle: OwnedHandle<OrtSessionOptions>,
}

impl SessionOptions {
    pub fn new(runtime: &Arc<Runtime>) -> OrtResult<Self> {
        let api = runtime.api();
        let mut options: *mut OrtSessionOptions = ptr::null_mut();
        let status = unsafe { (api.create_session_options)(&mut options) };
        runtime.check(status, "create_session_options")?;
        let handle = unsafe {
            OwnedHandle::from_raw(
                runtime,
                options,
                api.release_session_options,
                "create_session_options",
            )?
        };
        Ok(Self { handle })
    }

    pub fn set_graph_optimization_level(&self, level: GraphOptimizationLevel) -> OrtResult<()> {
        let runtime = self.handle.runtime();
        let status = unsafe {
            (runtime.api().set_session_graph_optimization_level)(self.handle.as_ptr(), level)
        };
        runtime.check(status, "set_session_graph_optimization_level")
    }

    pub fn set_intra_op_threads(&self, threads: u32) -> OrtResult<()> {
        let threads = c_int::try_from(threads).map_err(|_| {
            OrtError::InvalidArgument(format!("intra-op thread count {threads} is out of range"))
        })?;
        let runtime = self.handle.runtime();
        let status =
            unsafe { (runtime.api().set_intra_op_num_threads)(self.handle.as_ptr(), threads) };
        runtime.check(status, "set_intra_op_num_threads")
    }

    pub fn disable_mem_pattern(&self) -> OrtResult<()> {
        let runtime = self.handle.runtime();
        let status = unsafe { (runtime.api().disable_mem_pattern)(self.handle.as_ptr()) };
        runtime.check(status, "disable_mem_pattern")
    }

    /// Pin every free dimension carrying `denotation` to `value`.
    pub fn add_free_dimension_override(&self, denotation: &CStr, value: i64) -> OrtResult<()> {
        let runtime = self.handle.runtime();
        let status = unsafe {
            (runtime.api().add_free_dimension_override)(
                self.handle.as_ptr(),
                denotation.as_ptr(),
                value,
            )
        };
        runtime.check(status, "add_free_dimension_override")
    }

    /// Register the DirectML provider on `resources`.
    pub fn append_dml(&self, resources: &DeviceResources, metacommands: bool) -> OrtResult<()> {
        let runtime = self.handle.runtime();
        let status = unsafe {
            (runtime.adapter().session_options_append_dml)(
                self.handle.as_ptr(),
                resources.device(),
                resources.queue(),
                c_int::from(metacommands),
            )
        };
        runtime.check(status, "session_options_append_dml")
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut OrtSessionOptions {
        self.handle.as_ptr()
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("handle", &self.handle)
            .finish()
    }
}

// ============================================================================
// SessionBuilder trait
// ============================================================================

/// Provider-specific session setup, kept by the engine for `initialize`.
pub trait SessionBuilder: Send + Sync + fmt::Debug {
    fn kind(&self) -> ProviderKind;

    fn create_session_options(&self) -> OrtResult<SessionOptions>;

    fn create_session(&self, options: &SessionOptions) -> OrtResult<OwnedHandle<OrtSession>>;

    fn initialize(&self, session: &OwnedHandle<OrtSession>) -> OrtResult<()>;
}

fn create_session_without_model(
    runtime: &Arc<Runtime>,
    environment: &Environment,
    options: &SessionOptions,
) -> OrtResult<OwnedHandle<OrtSession>> {
    let api = runtime.api();
    let mut session: *mut OrtSession = ptr::null_mut();
    let status = unsafe {
        (runtime.adapter().create_session_without_model)(
            environment.as_ptr(),
            options.as_ptr(),
            &mut session,
        )
    };
    runtime.check(status, "create_session_without_model")?;
    unsafe {
        OwnedHandle::from_raw(
            runtime,
            session,
            api.release_session,
            "create_session_without_model",
        )
    }
}

fn initialize_session(session: &OwnedHandle<OrtSession>) -> OrtResult<()> {
    let runtime = session.runtime();
    let status = unsafe { (runtime.adapter().session_initialize)(session.as_ptr()) };
    runtime.check(status, "session_initialize")
}

/// Execution provider `index` of `session`. Providers are owned by the session.
pub(crate) fn session_provider(
    session: &OwnedHandle<OrtSession>,
    index: usize,
) -> OrtResult<NonNull<OrtExecutionProvider>> {
    let runtime = session.runtime();
    let mut provider: *mut OrtExecutionProvider = ptr::null_mut();
    let status = unsafe {
        (runtime.adapter().session_get_execution_provider)(session.as_ptr(), index, &mut provider)
    };
    runtime.check(status, "session_get_execution_provider")?;
    NonNull::new(provider).ok_or(OrtError::NullHandle("session_get_execution_provider"))
}

// ============================================================================
// CPU
// ============================================================================

#[derive(Debug)]
pub struct CpuSessionBuilder {
    runtime: Arc<Runtime>,
    environment: Arc<Environment>,
    config: SessionConfig,
}

impl CpuSessionBuilder {
    pub fn new(runtime: Arc<Runtime>, environment: Arc<Environment>, config: SessionConfig) -> Self {
        Self {
            runtime,
            environment,
            config,
        }
    }
}

impl SessionBuilder for CpuSessionBuilder {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Cpu
    }

    fn create_session_options(&self) -> OrtResult<SessionOptions> {
        let options = SessionOptions::new(&self.runtime)?;
        options.set_graph_optimization_level(self.config.graph_optimization_level)?;
        if let Some(threads) = self.config.intra_op_threads {
            options.set_intra_op_threads(threads)?;
        }
        Ok(options)
    }

    fn create_session(&self, options: &SessionOptions) -> OrtResult<OwnedHandle<OrtSession>> {
        create_session_without_model(&self.runtime, &self.environment, options)
    }

    fn initialize(&self, session: &OwnedHandle<OrtSession>) -> OrtResult<()> {
        initialize_session(session)
    }
}

// ============================================================================
// DirectML
// ============================================================================

#[derive(Debug)]
pub struct DmlSessionBuilder {
    runtime: Arc<Runtime>,
    environment: Arc<Environment>,
    config: SessionConfig,
    resources: DeviceResources,
    metacommands: bool,
}

impl DmlSessionBuilder {
    pub fn new(
        runtime: Arc<Runtime>,
        environment: Arc<Environment>,
        config: SessionConfig,
        resources: DeviceResources,
        metacommands: bool,
    ) -> Self {
        Self {
            runtime,
            environment,
            config,
            resources,
            metacommands,
        }
    }

    pub fn resources(&self) -> &DeviceResources {
        &self.resources
    }

    fn set_rounding_mode(
        &self,
        provider: NonNull<OrtExecutionProvider>,
        enabled: bool,
    ) -> OrtResult<()> {
        let status = unsafe {
            (self.runtime.adapter().dml_set_default_rounding_mode)(
                provider.as_ptr(),
                c_int::from(enabled),
            )
        };
        self.runtime.check(status, "dml_set_default_rounding_mode")
    }
}

impl SessionBuilder for DmlSessionBuilder {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DirectMl
    }

    fn create_session_options(&self) -> OrtResult<SessionOptions> {
        let options = SessionOptions::new(&self.runtime)?;
        options.set_graph_optimization_level(self.config.dml_graph_optimization_level)?;
        options.disable_mem_pattern()?;
        options.append_dml(&self.resources, self.metacommands)?;
        Ok(options)
    }

    fn create_session(&self, options: &SessionOptions) -> OrtResult<OwnedHandle<OrtSession>> {
        create_session_without_model(&self.runtime, &self.environment, options)
    }

    /// Graph partitioning runs with default rounding enabled on the provider.
    fn initialize(&self, session: &OwnedHandle<OrtSession>) -> OrtResult<()> {
        let provider = session_provider(session, 0)?;
        self.set_rounding_mode(provider, true)?;
        let initialized = initialize_session(session);
        let reset = self.set_rounding_mode(provider, false);
        initialized?;
        reset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::testing::{self, Ledger};

    fn setup() -> (Arc<Runtime>, Arc<Environment>) {
        let runtime = testing::fake_runtime();
        let environment = Environment::shared(&runtime, &RuntimeConfig::default()).unwrap();
        (runtime, environment)
    }

    #[test]
    fn test_cpu_options_follow_config() {
        let (runtime, environment) = setup();
        let config = SessionConfig {
            graph_optimization_level: GraphOptimizationLevel::EnableExtended,
            intra_op_threads: Some(3),
            ..SessionConfig::default()
        };
        let builder = CpuSessionBuilder::new(runtime, environment, config);
        let options = builder.create_session_options().unwrap();

        let recorded = testing::options_state(options.as_ptr());
        assert_eq!(recorded.optimization_level, GraphOptimizationLevel::EnableExtended);
        assert_eq!(recorded.intra_op_threads, Some(3));
        assert!(recorded.mem_pattern);
        assert!(recorded.dml.is_none());
    }

    #[test]
    fn test_cpu_session_has_one_provider() {
        let (runtime, environment) = setup();
        let builder = CpuSessionBuilder::new(runtime, environment, SessionConfig::default());
        let options = builder.create_session_options().unwrap();
        let session = builder.create_session(&options).unwrap();
        assert_eq!(testing::provider_count(session.as_ptr()), 1);

        builder.initialize(&session).unwrap();
        assert_eq!(Ledger::calls("session_initialize"), 1);
        assert_eq!(Ledger::calls("dml_set_default_rounding_mode"), 0);

        drop(session);
        drop(options);
        assert_eq!(Ledger::live("session"), 0);
        assert_eq!(Ledger::live("session_options"), 0);
    }

    #[test]
    fn test_dml_options_register_provider() {
        let (runtime, environment) = setup();
        let resources = testing::fake_device_resources();
        let builder = DmlSessionBuilder::new(
            runtime,
            environment,
            SessionConfig::default(),
            resources,
            false,
        );
        let options = builder.create_session_options().unwrap();

        let recorded = testing::options_state(options.as_ptr());
        assert_eq!(recorded.optimization_level, GraphOptimizationLevel::DisableAll);
        assert!(!recorded.mem_pattern);
        assert_eq!(
            recorded.dml,
            Some((resources.device() as usize, resources.queue() as usize, false))
        );

        let session = builder.create_session(&options).unwrap();
        assert_eq!(testing::provider_count(session.as_ptr()), 2);
    }

    #[test]
    fn test_dml_initialize_toggles_rounding_mode() {
        let (runtime, environment) = setup();
        let builder = DmlSessionBuilder::new(
            runtime,
            environment,
            SessionConfig::default(),
            testing::fake_device_resources(),
            true,
        );
        let options = builder.create_session_options().unwrap();
        let session = builder.create_session(&options).unwrap();
        builder.initialize(&session).unwrap();

        assert_eq!(
            Ledger::events(),
            vec![
                "dml_set_default_rounding_mode(1)".to_string(),
                "session_initialize".to_string(),
                "dml_set_default_rounding_mode(0)".to_string(),
            ]
        );
    }

    fn dml_session() -> (DmlSessionBuilder, OwnedHandle<OrtSession>) {
        let (runtime, environment) = setup();
        let builder = DmlSessionBuilder::new(
            runtime,
            environment,
            SessionConfig::default(),
            testing::fake_device_resources(),
            true,
        );
        let options = builder.create_session_options().unwrap();
        let session = builder.create_session(&options).unwrap();
        (builder, session)
    }

    #[test]
    fn test_dml_failed_initialize_still_resets_rounding_mode() {
        let (builder, session) = dml_session();
        testing::fail_next("session_initialize");

        let err = builder.initialize(&session).unwrap_err();
        assert!(matches!(
            err,
            OrtError::Runtime { operation: "session_initialize", .. }
        ));
        assert_eq!(
            Ledger::events(),
            vec![
                "dml_set_default_rounding_mode(1)".to_string(),
                "dml_set_default_rounding_mode(0)".to_string(),
            ]
        );
        assert!(!testing::session_state(session.as_ptr()).initialized);
        assert_eq!(Ledger::live("status"), 0);
    }

    #[test]
    fn test_dml_initialize_error_outranks_reset_error() {
        let (builder, session) = dml_session();
        testing::fail_nth("dml_set_default_rounding_mode", 1);
        testing::fail_next("session_initialize");

        let err = builder.initialize(&session).unwrap_err();
        assert!(matches!(
            err,
            OrtError::Runtime { operation: "session_initialize", .. }
        ));
        assert_eq!(Ledger::calls("dml_set_default_rounding_mode"), 2);
        assert_eq!(Ledger::live("status"), 0);
    }

    #[test]
    fn test_dml_reset_error_reported_after_successful_initialize() {
        let (builder, session) = dml_session();
        testing::fail_nth("dml_set_default_rounding_mode", 1);

        let err = builder.initialize(&session).unwrap_err();
        assert!(matches!(
            err,
            OrtError::Runtime { operation: "dml_set_default_rounding_mode", .. }
        ));
        assert!(testing::session_state(session.as_ptr()).initialized);
    }

    #[test]
    fn test_null_device_resources_are_rejected() {
        let err = unsafe { DeviceResources::new(ptr::null_mut(), ptr::null_mut()) }.unwrap_err();
        assert!(matches!(err, OrtError::InvalidArgument(_)));
    }
}
