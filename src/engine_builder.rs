//! Engine builder: picks the execution provider and shapes the session.

use std::ffi::{c_void, CStr};
use std::fmt;

use crate::engine::OnnxEngine;
use crate::error::{OrtError, OrtResult};
use crate::factory::OnnxEngineFactory;
use crate::ffi::DATA_BATCH_DENOTATION;
use crate::session_builder::{
    CpuSessionBuilder, DeviceResources, DmlSessionBuilder, SessionBuilder,
};

/// Collects engine settings; [`create_engine`](Self::create_engine) builds
/// a DirectML engine when device resources were set, a CPU engine otherwise.
pub struct OnnxEngineBuilder {
    factory: OnnxEngineFactory,
    resources: Option<DeviceResources>,
    metacommands_enabled: bool,
    batch_size_override: Option<u32>,
}

impl OnnxEngineBuilder {
    pub(crate) fn new(factory: OnnxEngineFactory) -> Self {
        Self {
            factory,
            resources: None,
            metacommands_enabled: true,
            batch_size_override: None,
        }
    }

    /// Run on DirectML using this device and queue.
    pub fn set_device_resources(&mut self, resources: DeviceResources) -> &mut Self {
        self.resources = Some(resources);
        self
    }

    /// `ID3D12Device*` set by [`set_device_resources`](Self::set_device_resources), or null.
    pub fn device(&self) -> *mut c_void {
        self.resources
            .map_or(std::ptr::null_mut(), |resources| resources.device())
    }

    /// `ID3D12CommandQueue*` set by [`set_device_resources`](Self::set_device_resources), or null.
    pub fn queue(&self) -> *mut c_void {
        self.resources
            .map_or(std::ptr::null_mut(), |resources| resources.queue())
    }

    pub fn set_metacommands_enabled(&mut self, enabled: bool) -> &mut Self {
        self.metacommands_enabled = enabled;
        self
    }

    pub fn metacommands_enabled(&self) -> bool {
        self.metacommands_enabled
    }

    /// Pin the model's batch dimension. Zero clears the override.
    pub fn set_batch_size_override(&mut self, batch_size: u32) -> &mut Self {
        self.batch_size_override = (batch_size != 0).then_some(batch_size);
        self
    }

    pub fn batch_size_override(&self) -> Option<u32> {
        self.batch_size_override
    }

    pub fn create_engine(&self) -> OrtResult<OnnxEngine> {
        let runtime = self.factory.runtime();
        let environment = self.factory.environment();
        let session_config = self.factory.config().session.clone();

        let builder: Box<dyn SessionBuilder> = match self.resources {
            Some(resources) => Box::new(DmlSessionBuilder::new(
                runtime.clone(),
                environment.clone(),
                session_config,
                resources,
                self.metacommands_enabled,
            )),
            None => Box::new(CpuSessionBuilder::new(
                runtime.clone(),
                environment.clone(),
                session_config,
            )),
        };

        let options = builder.create_session_options()?;
        if let Some(batch_size) = self.batch_size_override {
            let denotation = CStr::from_bytes_with_nul(DATA_BATCH_DENOTATION)
                .map_err(|e| OrtError::InvalidArgument(e.to_string()))?;
            options.add_free_dimension_override(denotation, i64::from(batch_size))?;
        }
        let session = builder.create_session(&options)?;

        tracing::info!(
            kind = %builder.kind(),
            batch_size = ?self.batch_size_override,
            "created engine"
        );
        Ok(OnnxEngine::new(session, builder, self.factory.clone()))
    }
}

impl fmt::Debug for OnnxEngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxEngineBuilder")
            .field("resources", &self.resources)
            .field("metacommands_enabled", &self.metacommands_enabled)
            .field("batch_size_override", &self.batch_size_override)
            .finish()
    }
}
