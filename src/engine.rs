//! Inference engine: one session bound to one execution provider.
//!
//! [`OnnxEngine`] owns the session, the custom registries handed to it, and
//! the session builder that knows how to initialise it. Values created by
//! the engine share that state, so a session is released only after its
//! last value.
//!
//! # Example
//!
//! ```no_run
//! use alice_ort::{OnnxEngineFactory, RuntimeConfig, TensorKind};
//!
//! let factory = OnnxEngineFactory::new(RuntimeConfig::default()).unwrap();
//! let model = factory.create_model_from_path("squeezenet.onnx").unwrap();
//!
//! let engine = factory.create_engine_builder().create_engine().unwrap();
//! engine.load_model(model).unwrap();
//! engine.initialize().unwrap();
//!
//! let mut input = engine.create_tensor_value(&[1, 3, 224, 224], TensorKind::Float).unwrap();
//! input.copy_from_slice(&vec![0.0f32; 3 * 224 * 224]).unwrap();
//! ```

use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::{Arc, Mutex, PoisonError};

use crate::environment::Environment;
use crate::error::{OrtError, OrtResult};
use crate::factory::OnnxEngineFactory;
use crate::ffi::{OrtAllocator, OrtExecutionProvider, OrtSession, OrtValue};
use crate::handle::OwnedHandle;
use crate::kind::TensorKind;
use crate::model::OnnxModel;
use crate::registry::CustomRegistry;
use crate::runtime::Runtime;
use crate::session_builder::{session_provider, ProviderKind, SessionBuilder};
use crate::value::OnnxValue;

/// DirectML sessions carry the DirectML provider and the CPU fallback.
const DML_PROVIDER_COUNT: usize = 2;

type ProviderFn = unsafe extern "C" fn(*mut OrtExecutionProvider) -> crate::ffi::OrtStatusPtr;

/// State shared by an engine and its values. Fields drop in declaration
/// order: the session goes before the environment held by the factory.
pub(crate) struct EngineShared {
    pub(crate) session: OwnedHandle<OrtSession>,
    registries: Mutex<Vec<CustomRegistry>>,
    builder: Box<dyn SessionBuilder>,
    factory: OnnxEngineFactory,
}

impl EngineShared {
    pub(crate) fn is_dml_session(&self) -> OrtResult<bool> {
        let runtime = self.session.runtime();
        let mut count = 0usize;
        let status = unsafe {
            (runtime.adapter().session_get_execution_providers_count)(
                self.session.as_ptr(),
                &mut count,
            )
        };
        runtime.check(status, "session_get_execution_providers_count")?;
        Ok(count == DML_PROVIDER_COUNT)
    }
}

/// An inference session ready to receive a model.
#[derive(Clone)]
pub struct OnnxEngine {
    shared: Arc<EngineShared>,
}

impl OnnxEngine {
    pub(crate) fn new(
        session: OwnedHandle<OrtSession>,
        builder: Box<dyn SessionBuilder>,
        factory: OnnxEngineFactory,
    ) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                session,
                registries: Mutex::new(Vec::new()),
                builder,
                factory,
            }),
        }
    }

    #[inline]
    fn runtime(&self) -> &Arc<Runtime> {
        self.shared.session.runtime()
    }

    // ---- Model and session lifecycle ----

    /// Hand `model` to the session.
    ///
    /// The session takes ownership only when the runtime accepts the model;
    /// on failure the model is released here.
    pub fn load_model(&self, model: OnnxModel) -> OrtResult<()> {
        if !Arc::ptr_eq(model.runtime(), self.runtime()) {
            tracing::warn!("model belongs to a different runtime");
            return Err(OrtError::InvalidArgument(
                "model was loaded by a different runtime".into(),
            ));
        }
        let runtime = self.runtime();
        let status = unsafe {
            (runtime.adapter().session_load_and_purloin_model)(
                self.shared.session.as_ptr(),
                model.as_ptr(),
            )
        };
        runtime.check(status, "session_load_and_purloin_model")?;
        // Owned by the session from here on.
        let _ = model.into_raw();
        tracing::debug!(session = ?self.shared.session, "model purloined");
        Ok(())
    }

    /// Partition and prepare the graph for the engine's provider.
    pub fn initialize(&self) -> OrtResult<()> {
        self.shared.builder.initialize(&self.shared.session)?;
        tracing::debug!(kind = %self.shared.builder.kind(), "session initialised");
        Ok(())
    }

    pub fn register_graph_transformers(&self) -> OrtResult<()> {
        let runtime = self.runtime();
        let status = unsafe {
            (runtime.adapter().session_register_graph_transformers)(self.shared.session.as_ptr())
        };
        runtime.check(status, "session_register_graph_transformers")
    }

    /// Register custom operators. The engine keeps `registry` until the
    /// session is released.
    pub fn register_custom_registry(&self, registry: CustomRegistry) -> OrtResult<()> {
        let runtime = self.runtime();
        let status = unsafe {
            (runtime.adapter().session_register_custom_registry)(
                self.shared.session.as_ptr(),
                registry.as_ptr(),
            )
        };
        runtime.check(status, "session_register_custom_registry")?;
        self.shared
            .registries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(registry);
        Ok(())
    }

    pub fn start_profiling(&self) -> OrtResult<()> {
        let runtime = self.runtime();
        let status = unsafe {
            (runtime.adapter().session_start_profiling)(
                self.shared.factory.environment().as_ptr(),
                self.shared.session.as_ptr(),
            )
        };
        runtime.check(status, "session_start_profiling")
    }

    pub fn end_profiling(&self) -> OrtResult<()> {
        let runtime = self.runtime();
        let status =
            unsafe { (runtime.adapter().session_end_profiling)(self.shared.session.as_ptr()) };
        runtime.check(status, "session_end_profiling")
    }

    // ---- Execution provider ----

    fn provider(&self) -> OrtResult<NonNull<OrtExecutionProvider>> {
        session_provider(&self.shared.session, 0)
    }

    fn provider_call(&self, call: ProviderFn, operation: &'static str) -> OrtResult<()> {
        let provider = self.provider()?;
        let status = unsafe { call(provider.as_ptr()) };
        tracing::debug!(operation, "provider call");
        self.runtime().check(status, operation)
    }

    /// Submit recorded DirectML work.
    pub fn flush_context(&self) -> OrtResult<()> {
        self.provider_call(self.runtime().adapter().dml_flush_context, "dml_flush_context")
    }

    pub fn trim_upload_heap(&self) -> OrtResult<()> {
        self.provider_call(
            self.runtime().adapter().dml_trim_upload_heap,
            "dml_trim_upload_heap",
        )
    }

    pub fn release_completed_references(&self) -> OrtResult<()> {
        self.provider_call(
            self.runtime().adapter().dml_release_completed_references,
            "dml_release_completed_references",
        )
    }

    /// Wait for the provider's outstanding work.
    pub fn sync(&self) -> OrtResult<()> {
        self.provider_call(
            self.runtime().adapter().execution_provider_sync,
            "execution_provider_sync",
        )
    }

    pub fn copy_one_input_across_devices(
        &self,
        _input_name: &str,
        _source: &OnnxValue,
    ) -> OrtResult<OnnxValue> {
        Err(OrtError::NotImplemented("copy_one_input_across_devices"))
    }

    // ---- Values ----

    /// Allocate a tensor on the engine's provider.
    pub fn create_tensor_value(&self, shape: &[i64], kind: TensorKind) -> OrtResult<OnnxValue> {
        if kind == TensorKind::Undefined {
            tracing::warn!("rejected tensor of undefined kind");
            return Err(OrtError::InvalidArgument(
                "tensor kind must not be Undefined".into(),
            ));
        }
        if let Some(dim) = shape.iter().find(|&&d| d < 0) {
            tracing::warn!(?shape, "rejected tensor with negative dimension");
            return Err(OrtError::InvalidArgument(format!(
                "tensor dimension {dim} is negative"
            )));
        }

        let runtime = self.runtime();
        let adapter = runtime.adapter();
        let api = runtime.api();
        let provider = self.provider()?;

        let mut allocator: *mut OrtAllocator = ptr::null_mut();
        let status = unsafe { (adapter.get_provider_allocator)(provider.as_ptr(), &mut allocator) };
        runtime.check(status, "get_provider_allocator")?;
        let allocator = unsafe {
            OwnedHandle::from_raw(
                runtime,
                allocator,
                adapter.free_provider_allocator,
                "get_provider_allocator",
            )?
        };

        let mut value: *mut OrtValue = ptr::null_mut();
        let status = unsafe {
            (api.create_tensor_as_ort_value)(
                allocator.as_ptr(),
                shape.as_ptr(),
                shape.len(),
                kind.into(),
                &mut value,
            )
        };
        runtime.check(status, "create_tensor_as_ort_value")?;
        let value = unsafe {
            OwnedHandle::from_raw(runtime, value, api.release_value, "create_tensor_as_ort_value")?
        };

        Ok(OnnxValue::new(value, allocator, Arc::clone(&self.shared)))
    }

    // ---- Queries ----

    /// Whether the session runs on DirectML (two providers).
    pub fn is_dml_session(&self) -> OrtResult<bool> {
        self.shared.is_dml_session()
    }

    /// Provider the engine was built for.
    pub fn kind(&self) -> ProviderKind {
        self.shared.builder.kind()
    }

    /// Raw session. The engine keeps ownership.
    #[inline]
    pub fn session_ptr(&self) -> *mut OrtSession {
        self.shared.session.as_ptr()
    }

    pub fn environment(&self) -> &Arc<Environment> {
        self.shared.factory.environment()
    }

    pub fn factory(&self) -> &OnnxEngineFactory {
        &self.shared.factory
    }
}

impl fmt::Debug for OnnxEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxEngine")
            .field("session", &self.shared.session)
            .field("kind", &self.shared.builder.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::ffi::{ORT_INVALID_ARGUMENT, ORT_INVALID_GRAPH, ORT_MODEL_LOADED};
    use crate::testing::{self, Ledger};

    fn factory() -> OnnxEngineFactory {
        OnnxEngineFactory::with_runtime(testing::fake_runtime(), RuntimeConfig::default()).unwrap()
    }

    fn dml_engine(factory: &OnnxEngineFactory) -> OnnxEngine {
        let mut builder = factory.create_engine_builder();
        builder.set_device_resources(testing::fake_device_resources());
        builder.create_engine().unwrap()
    }

    fn runtime_code(err: OrtError) -> i32 {
        match err {
            OrtError::Runtime { code, .. } => code,
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_model_transfers_ownership() {
        let factory = factory();
        let engine = factory.create_engine_builder().create_engine().unwrap();
        let model = factory.create_model_from_path("squeezenet.onnx").unwrap();

        engine.load_model(model).unwrap();
        let state = testing::session_state(engine.session_ptr());
        assert_eq!(state.model.as_deref(), Some("squeezenet"));
        assert_eq!(Ledger::calls("release_model"), 0);
        assert_eq!(Ledger::live("model"), 1);

        engine.initialize().unwrap();
        assert!(testing::session_state(engine.session_ptr()).initialized);

        drop(engine);
        assert_eq!(Ledger::live("model"), 0);
        assert_eq!(Ledger::live("session"), 0);
        assert_eq!(Ledger::double_releases(), 0);
    }

    #[test]
    fn test_rejected_model_stays_with_caller() {
        let factory = factory();
        let engine = factory.create_engine_builder().create_engine().unwrap();
        let model = factory.create_model_from_path("unsupported.onnx").unwrap();

        let err = engine.load_model(model).unwrap_err();
        assert_eq!(runtime_code(err), ORT_INVALID_GRAPH);
        assert_eq!(Ledger::live("model"), 0);
        assert_eq!(Ledger::calls("release_model"), 1);
        assert!(testing::session_state(engine.session_ptr()).model.is_none());
    }

    #[test]
    fn test_second_model_is_refused() {
        let factory = factory();
        let engine = factory.create_engine_builder().create_engine().unwrap();
        engine
            .load_model(factory.create_model_from_bytes(b"mnist").unwrap())
            .unwrap();
        let err = engine
            .load_model(factory.create_model_from_bytes(b"resnet").unwrap())
            .unwrap_err();
        assert_eq!(runtime_code(err), ORT_MODEL_LOADED);
        assert_eq!(Ledger::live("model"), 1);
    }

    #[test]
    fn test_model_from_other_runtime_is_rejected() {
        let factory = factory();
        let other = self::factory();
        let engine = factory.create_engine_builder().create_engine().unwrap();
        let model = other.create_model_from_path("squeezenet.onnx").unwrap();
        assert!(matches!(
            engine.load_model(model),
            Err(OrtError::InvalidArgument(_))
        ));
        assert_eq!(Ledger::calls("session_load_and_purloin_model"), 0);
    }

    #[test]
    fn test_registries_live_as_long_as_engine() {
        let factory = factory();
        let engine = factory.create_engine_builder().create_engine().unwrap();
        engine.register_graph_transformers().unwrap();
        engine
            .register_custom_registry(factory.create_custom_registry().unwrap())
            .unwrap();
        engine
            .register_custom_registry(factory.create_custom_registry().unwrap())
            .unwrap();

        let state = testing::session_state(engine.session_ptr());
        assert!(state.graph_transformers);
        assert_eq!(state.custom_registries, 2);
        assert_eq!(Ledger::live("registry"), 2);

        drop(engine);
        assert_eq!(Ledger::live("registry"), 0);
    }

    #[test]
    fn test_profiling_round_trip() {
        let factory = factory();
        let engine = factory.create_engine_builder().create_engine().unwrap();
        engine.start_profiling().unwrap();
        assert!(testing::session_state(engine.session_ptr()).profiling);
        engine.end_profiling().unwrap();
        assert!(!testing::session_state(engine.session_ptr()).profiling);
    }

    #[test]
    fn test_dml_provider_calls() {
        let factory = factory();
        let engine = dml_engine(&factory);
        assert!(engine.is_dml_session().unwrap());
        assert_eq!(engine.kind(), ProviderKind::DirectMl);

        engine.flush_context().unwrap();
        engine.trim_upload_heap().unwrap();
        engine.release_completed_references().unwrap();
        engine.sync().unwrap();
        assert_eq!(
            Ledger::events(),
            vec![
                "dml_flush_context".to_string(),
                "dml_trim_upload_heap".to_string(),
                "dml_release_completed_references".to_string(),
                "execution_provider_sync".to_string(),
            ]
        );
    }

    #[test]
    fn test_dml_calls_fail_on_cpu_session() {
        let factory = factory();
        let engine = factory.create_engine_builder().create_engine().unwrap();
        assert!(!engine.is_dml_session().unwrap());
        assert_eq!(runtime_code(engine.flush_context().unwrap_err()), ORT_INVALID_ARGUMENT);
        engine.sync().unwrap();
        assert_eq!(Ledger::live("status"), 0);
    }

    #[test]
    fn test_cross_device_copy_is_not_implemented() {
        let factory = factory();
        let engine = factory.create_engine_builder().create_engine().unwrap();
        let value = engine.create_tensor_value(&[1], TensorKind::Float).unwrap();
        let err = engine
            .copy_one_input_across_devices("data_0", &value)
            .unwrap_err();
        assert!(err.is_not_implemented());
    }

    #[test]
    fn test_invalid_tensor_requests_never_reach_runtime() {
        let factory = factory();
        let engine = factory.create_engine_builder().create_engine().unwrap();
        assert!(matches!(
            engine.create_tensor_value(&[1, 2], TensorKind::Undefined),
            Err(OrtError::InvalidArgument(_))
        ));
        assert!(matches!(
            engine.create_tensor_value(&[1, -1], TensorKind::Float),
            Err(OrtError::InvalidArgument(_))
        ));
        assert_eq!(Ledger::calls("get_provider_allocator"), 0);
        assert_eq!(Ledger::calls("create_tensor_as_ort_value"), 0);
    }

    #[test]
    fn test_failed_tensor_creation_frees_allocator() {
        let factory = factory();
        let engine = factory.create_engine_builder().create_engine().unwrap();
        testing::fail_next("create_tensor_as_ort_value");
        let err = engine.create_tensor_value(&[4], TensorKind::Float).unwrap_err();
        assert!(err.is_runtime());
        assert_eq!(Ledger::live("allocator"), 0);
        assert_eq!(Ledger::live("value"), 0);
    }

    #[test]
    fn test_every_kind_creates_matching_tensor() {
        let factory = factory();
        let engine = factory.create_engine_builder().create_engine().unwrap();
        for kind in TensorKind::ALL.into_iter().skip(1) {
            let value = engine.create_tensor_value(&[2], kind).unwrap();
            assert!(value.is_of_tensor_type(kind).unwrap(), "{kind}");
        }
        assert_eq!(Ledger::live("value"), 0);
    }
}
