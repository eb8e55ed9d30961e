//! Entry point: loads the runtime and hands out models, builders and
//! registries that share its environment.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::engine_builder::OnnxEngineBuilder;
use crate::environment::Environment;
use crate::error::OrtResult;
use crate::model::OnnxModel;
use crate::registry::CustomRegistry;
use crate::runtime::Runtime;

/// Factory for everything bound to one runtime. Cloning is cheap.
#[derive(Clone)]
pub struct OnnxEngineFactory {
    // The environment goes before the runtime that owns its release function.
    environment: Arc<Environment>,
    runtime: Arc<Runtime>,
    config: Arc<RuntimeConfig>,
}

impl OnnxEngineFactory {
    /// Load the runtime library named by `config`.
    pub fn new(config: RuntimeConfig) -> OrtResult<Self> {
        let runtime = Runtime::load(&config)?;
        Self::with_runtime(runtime, config)
    }

    /// Default configuration with `ALICE_ORT_*` overrides applied.
    pub fn from_env() -> OrtResult<Self> {
        Self::new(RuntimeConfig::default().with_env_overrides()?)
    }

    /// Share an already loaded runtime.
    pub fn with_runtime(runtime: Arc<Runtime>, config: RuntimeConfig) -> OrtResult<Self> {
        config.validate()?;
        let environment = Environment::shared(&runtime, &config)?;
        Ok(Self {
            environment,
            runtime,
            config: Arc::new(config),
        })
    }

    pub fn create_model_from_path(&self, path: impl AsRef<Path>) -> OrtResult<OnnxModel> {
        OnnxModel::from_path(&self.runtime, path)
    }

    pub fn create_model_from_bytes(&self, data: &[u8]) -> OrtResult<OnnxModel> {
        OnnxModel::from_bytes(&self.runtime, data)
    }

    pub fn create_engine_builder(&self) -> OnnxEngineBuilder {
        OnnxEngineBuilder::new(self.clone())
    }

    pub fn create_custom_registry(&self) -> OrtResult<CustomRegistry> {
        CustomRegistry::new(&self.runtime)
    }

    /// Forward verbose and info runtime messages to `tracing`.
    pub fn enable_debug_output(&self, enabled: bool) {
        self.environment.enable_debug_output(enabled);
    }

    #[inline]
    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    #[inline]
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

impl fmt::Debug for OnnxEngineFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxEngineFactory")
            .field("runtime", &self.runtime)
            .field("environment", &self.environment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrtError;
    use crate::testing::{self, Ledger};

    #[test]
    fn test_factories_share_environment() {
        let runtime = testing::fake_runtime();
        let first = OnnxEngineFactory::with_runtime(runtime.clone(), RuntimeConfig::default())
            .unwrap();
        let second =
            OnnxEngineFactory::with_runtime(runtime, RuntimeConfig::default()).unwrap();
        assert!(Arc::ptr_eq(first.environment(), second.environment()));
        assert_eq!(Ledger::created("env"), 1);
    }

    #[test]
    fn test_second_factory_applies_debug_output() {
        let runtime = testing::fake_runtime();
        let first = OnnxEngineFactory::with_runtime(runtime.clone(), RuntimeConfig::default())
            .unwrap();
        let config = RuntimeConfig {
            debug_output: true,
            ..RuntimeConfig::default()
        };
        let second = OnnxEngineFactory::with_runtime(runtime, config).unwrap();

        assert!(Arc::ptr_eq(first.environment(), second.environment()));
        assert_eq!(second.environment().debug_output(), second.config().debug_output);
        testing::emit_log(
            second.environment().as_ptr(),
            crate::LoggingLevel::Verbose,
            "graph partitioned",
        );
        assert_eq!(second.environment().forwarded_messages(), 1);
    }

    #[test]
    fn test_second_factory_with_other_log_settings_is_rejected() {
        let runtime = testing::fake_runtime();
        let first = OnnxEngineFactory::with_runtime(runtime.clone(), RuntimeConfig::default())
            .unwrap();

        let louder = RuntimeConfig {
            log_level: crate::LoggingLevel::Verbose,
            ..RuntimeConfig::default()
        };
        let err = OnnxEngineFactory::with_runtime(runtime.clone(), louder).unwrap_err();
        assert!(matches!(err, OrtError::InvalidConfig(_)));

        let renamed = RuntimeConfig {
            log_id: "other-engine".into(),
            ..RuntimeConfig::default()
        };
        let err = OnnxEngineFactory::with_runtime(runtime, renamed).unwrap_err();
        assert!(matches!(err, OrtError::InvalidConfig(_)));

        assert_eq!(first.environment().log_level(), crate::LoggingLevel::Warning);
        assert_eq!(Ledger::created("env"), 1);
    }

    #[test]
    fn test_debug_output_toggle() {
        let factory =
            OnnxEngineFactory::with_runtime(testing::fake_runtime(), RuntimeConfig::default())
                .unwrap();
        assert!(!factory.environment().debug_output());
        factory.enable_debug_output(true);
        assert!(factory.environment().debug_output());
    }

    #[test]
    fn test_invalid_config_creates_nothing() {
        let config = RuntimeConfig {
            api_version: 2,
            ..RuntimeConfig::default()
        };
        let err = OnnxEngineFactory::with_runtime(testing::fake_runtime(), config).unwrap_err();
        assert!(matches!(err, OrtError::InvalidConfig(_)));
        assert_eq!(Ledger::created("env"), 0);
    }

    #[test]
    fn test_everything_released_after_last_handle() {
        let factory =
            OnnxEngineFactory::with_runtime(testing::fake_runtime(), RuntimeConfig::default())
                .unwrap();
        let model = factory.create_model_from_path("squeezenet.onnx").unwrap();
        let engine = factory.create_engine_builder().create_engine().unwrap();
        engine.load_model(model).unwrap();
        let value = engine
            .create_tensor_value(&[1, 3, 224, 224], crate::TensorKind::Float)
            .unwrap();
        drop(factory);
        drop(engine);
        assert_eq!(Ledger::live("env"), 1);

        drop(value);
        for kind in ["env", "session", "model", "value", "allocator", "status"] {
            assert_eq!(Ledger::live(kind), 0, "{kind} leaked");
        }
        assert_eq!(Ledger::double_releases(), 0);
    }
}
