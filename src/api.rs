//! Engine abstraction.
//!
//! Callers that should not depend on a particular backend program against
//! these traits. The `Onnx*` types implement them by delegating to their
//! inherent methods.

use std::ffi::c_void;
use std::path::Path;

use crate::engine::OnnxEngine;
use crate::engine_builder::OnnxEngineBuilder;
use crate::error::OrtResult;
use crate::factory::OnnxEngineFactory;
use crate::kind::TensorKind;
use crate::model::{ModelMetadata, OnnxModel};
use crate::registry::CustomRegistry;
use crate::session_builder::DeviceResources;
use crate::value::{OnnxValue, Resource};

pub trait Model: Send {
    fn metadata(&self) -> OrtResult<ModelMetadata>;
}

pub trait Value: Send {
    fn is_cpu(&self) -> OrtResult<bool>;
    fn resource(&self) -> OrtResult<Resource>;
    fn is_tensor(&self) -> OrtResult<bool>;
    fn is_of_tensor_type(&self, kind: TensorKind) -> OrtResult<bool>;
    fn tensor_shape(&self) -> OrtResult<Vec<i64>>;
    fn is_of_map_type(&self, key: TensorKind, value: TensorKind) -> OrtResult<bool>;
    fn is_of_vector_map_type(&self, key: TensorKind, value: TensorKind) -> OrtResult<bool>;
}

pub trait Engine: Send + Sync {
    type Model: Model;
    type Value: Value;
    type Registry;

    fn load_model(&self, model: Self::Model) -> OrtResult<()>;
    fn initialize(&self) -> OrtResult<()>;
    fn register_graph_transformers(&self) -> OrtResult<()>;
    fn register_custom_registry(&self, registry: Self::Registry) -> OrtResult<()>;
    fn start_profiling(&self) -> OrtResult<()>;
    fn end_profiling(&self) -> OrtResult<()>;
    fn flush_context(&self) -> OrtResult<()>;
    fn trim_upload_heap(&self) -> OrtResult<()>;
    fn release_completed_references(&self) -> OrtResult<()>;
    fn sync(&self) -> OrtResult<()>;
    fn copy_one_input_across_devices(
        &self,
        input_name: &str,
        source: &Self::Value,
    ) -> OrtResult<Self::Value>;
    fn create_tensor_value(&self, shape: &[i64], kind: TensorKind) -> OrtResult<Self::Value>;
}

pub trait EngineBuilder {
    type Engine: Engine;

    fn set_device_resources(&mut self, resources: DeviceResources) -> &mut Self;
    fn device(&self) -> *mut c_void;
    fn queue(&self) -> *mut c_void;
    fn set_metacommands_enabled(&mut self, enabled: bool) -> &mut Self;
    fn set_batch_size_override(&mut self, batch_size: u32) -> &mut Self;
    fn create_engine(&self) -> OrtResult<Self::Engine>;
}

pub trait EngineFactory {
    type Model: Model;
    type Registry;
    type Builder: EngineBuilder;

    fn create_model_from_path(&self, path: &Path) -> OrtResult<Self::Model>;
    fn create_model_from_bytes(&self, data: &[u8]) -> OrtResult<Self::Model>;
    fn create_engine_builder(&self) -> Self::Builder;
    fn enable_debug_output(&self, enabled: bool);
    fn create_custom_registry(&self) -> OrtResult<Self::Registry>;
}

// ============================================================================
// Implementations
// ============================================================================

impl Model for OnnxModel {
    fn metadata(&self) -> OrtResult<ModelMetadata> {
        OnnxModel::metadata(self)
    }
}

impl Value for OnnxValue {
    fn is_cpu(&self) -> OrtResult<bool> {
        OnnxValue::is_cpu(self)
    }

    fn resource(&self) -> OrtResult<Resource> {
        OnnxValue::resource(self)
    }

    fn is_tensor(&self) -> OrtResult<bool> {
        OnnxValue::is_tensor(self)
    }

    fn is_of_tensor_type(&self, kind: TensorKind) -> OrtResult<bool> {
        OnnxValue::is_of_tensor_type(self, kind)
    }

    fn tensor_shape(&self) -> OrtResult<Vec<i64>> {
        OnnxValue::tensor_shape(self)
    }

    fn is_of_map_type(&self, key: TensorKind, value: TensorKind) -> OrtResult<bool> {
        OnnxValue::is_of_map_type(self, key, value)
    }

    fn is_of_vector_map_type(&self, key: TensorKind, value: TensorKind) -> OrtResult<bool> {
        OnnxValue::is_of_vector_map_type(self, key, value)
    }
}

impl Engine for OnnxEngine {
    type Model = OnnxModel;
    type Value = OnnxValue;
    type Registry = CustomRegistry;

    fn load_model(&self, model: OnnxModel) -> OrtResult<()> {
        OnnxEngine::load_model(self, model)
    }

    fn initialize(&self) -> OrtResult<()> {
        OnnxEngine::initialize(self)
    }

    fn register_graph_transformers(&self) -> OrtResult<()> {
        OnnxEngine::register_graph_transformers(self)
    }

    fn register_custom_registry(&self, registry: CustomRegistry) -> OrtResult<()> {
        OnnxEngine::register_custom_registry(self, registry)
    }

    fn start_profiling(&self) -> OrtResult<()> {
        OnnxEngine::start_profiling(self)
    }

    fn end_profiling(&self) -> OrtResult<()> {
        OnnxEngine::end_profiling(self)
    }

    fn flush_context(&self) -> OrtResult<()> {
        OnnxEngine::flush_context(self)
    }

    fn trim_upload_heap(&self) -> OrtResult<()> {
        OnnxEngine::trim_upload_heap(self)
    }

    fn release_completed_references(&self) -> OrtResult<()> {
        OnnxEngine::release_completed_references(self)
    }

    fn sync(&self) -> OrtResult<()> {
        OnnxEngine::sync(self)
    }

    fn copy_one_input_across_devices(
        &self,
        input_name: &str,
        source: &OnnxValue,
    ) -> OrtResult<OnnxValue> {
        OnnxEngine::copy_one_input_across_devices(self, input_name, source)
    }

    fn create_tensor_value(&self, shape: &[i64], kind: TensorKind) -> OrtResult<OnnxValue> {
        OnnxEngine::create_tensor_value(self, shape, kind)
    }
}

impl EngineBuilder for OnnxEngineBuilder {
    type Engine = OnnxEngine;

    fn set_device_resources(&mut self, resources: DeviceResources) -> &mut Self {
        OnnxEngineBuilder::set_device_resources(self, resources)
    }

    fn device(&self) -> *mut c_void {
        OnnxEngineBuilder::device(self)
    }

    fn queue(&self) -> *mut c_void {
        OnnxEngineBuilder::queue(self)
    }

    fn set_metacommands_enabled(&mut self, enabled: bool) -> &mut Self {
        OnnxEngineBuilder::set_metacommands_enabled(self, enabled)
    }

    fn set_batch_size_override(&mut self, batch_size: u32) -> &mut Self {
        OnnxEngineBuilder::set_batch_size_override(self, batch_size)
    }

    fn create_engine(&self) -> OrtResult<OnnxEngine> {
        OnnxEngineBuilder::create_engine(self)
    }
}

impl EngineFactory for OnnxEngineFactory {
    type Model = OnnxModel;
    type Registry = CustomRegistry;
    type Builder = OnnxEngineBuilder;

    fn create_model_from_path(&self, path: &Path) -> OrtResult<OnnxModel> {
        OnnxEngineFactory::create_model_from_path(self, path)
    }

    fn create_model_from_bytes(&self, data: &[u8]) -> OrtResult<OnnxModel> {
        OnnxEngineFactory::create_model_from_bytes(self, data)
    }

    fn create_engine_builder(&self) -> OnnxEngineBuilder {
        OnnxEngineFactory::create_engine_builder(self)
    }

    fn enable_debug_output(&self, enabled: bool) {
        OnnxEngineFactory::enable_debug_output(self, enabled)
    }

    fn create_custom_registry(&self) -> OrtResult<CustomRegistry> {
        OnnxEngineFactory::create_custom_registry(self)
    }
}
