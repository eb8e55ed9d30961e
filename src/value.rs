//! Values created by an engine.
//!
//! An [`OnnxValue`] owns its native value and the provider allocator that
//! produced it, and keeps its engine alive. Dropping it releases the value
//! first, then the allocator.

use std::ffi::c_void;
use std::fmt;
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::sync::Arc;

use crate::engine::EngineShared;
use crate::error::{OrtError, OrtResult};
use crate::ffi::{
    ElementType, MemType, OrtAllocator, OrtMemoryInfo, OrtTensorTypeAndShapeInfo, OrtValue,
    ValueType, CPU_MEMORY_NAME,
};
use crate::handle::OwnedHandle;
use crate::kind::{TensorElement, TensorKind};
use crate::runtime::{cstr_lossy, Runtime};
use crate::session_builder::session_provider;

/// Backing storage of a tensor value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Host memory holding the tensor data.
    Host(*mut c_void),
    /// `ID3D12Resource*` holding the tensor data.
    Device(*mut c_void),
}

impl Resource {
    #[inline]
    pub fn as_ptr(&self) -> *mut c_void {
        match *self {
            Resource::Host(ptr) | Resource::Device(ptr) => ptr,
        }
    }

    #[inline]
    pub fn is_device(&self) -> bool {
        matches!(self, Resource::Device(_))
    }
}

pub struct OnnxValue {
    value: OwnedHandle<OrtValue>,
    allocator: OwnedHandle<OrtAllocator>,
    engine: Arc<EngineShared>,
}

impl OnnxValue {
    pub(crate) fn new(
        value: OwnedHandle<OrtValue>,
        allocator: OwnedHandle<OrtAllocator>,
        engine: Arc<EngineShared>,
    ) -> Self {
        Self {
            value,
            allocator,
            engine,
        }
    }

    #[inline]
    fn runtime(&self) -> &Arc<Runtime> {
        self.value.runtime()
    }

    /// Whether the tensor lives in CPU-accessible memory.
    pub fn is_cpu(&self) -> OrtResult<bool> {
        let runtime = self.runtime();
        let api = runtime.api();

        let mut info: *mut OrtMemoryInfo = ptr::null_mut();
        let status =
            unsafe { (runtime.adapter().get_value_memory_info)(self.value.as_ptr(), &mut info) };
        runtime.check(status, "get_value_memory_info")?;
        let info = unsafe {
            OwnedHandle::from_raw(runtime, info, api.release_memory_info, "get_value_memory_info")?
        };

        let mut name: *const c_char = ptr::null();
        let status = unsafe { (api.memory_info_get_name)(info.as_ptr(), &mut name) };
        runtime.check(status, "memory_info_get_name")?;
        // Copied while `info` still owns the string.
        let name = cstr_lossy(name);

        let mut mem_type: c_int = 0;
        let status = unsafe { (api.memory_info_get_mem_type)(info.as_ptr(), &mut mem_type) };
        runtime.check(status, "memory_info_get_mem_type")?;

        Ok(name == CPU_MEMORY_NAME
            || matches!(
                MemType::from_raw(mem_type),
                Some(MemType::CpuInput | MemType::CpuOutput)
            ))
    }

    /// Storage of the tensor: host memory for CPU sessions, the D3D12
    /// resource for DirectML sessions.
    pub fn resource(&self) -> OrtResult<Resource> {
        let data = self.mutable_data()?;
        if !self.engine.is_dml_session()? {
            return Ok(Resource::Host(data));
        }

        let runtime = self.runtime();
        let provider = session_provider(&self.engine.session, 0)?;
        let mut resource: *mut c_void = ptr::null_mut();
        let status = unsafe {
            (runtime.adapter().dml_get_d3d12_resource_from_allocation)(
                provider.as_ptr(),
                data,
                &mut resource,
            )
        };
        runtime.check(status, "dml_get_d3d12_resource_from_allocation")?;
        Ok(Resource::Device(resource))
    }

    pub fn is_tensor(&self) -> OrtResult<bool> {
        let runtime = self.runtime();
        let mut raw: c_int = ValueType::Unknown as c_int;
        let status = unsafe { (runtime.api().get_value_type)(self.value.as_ptr(), &mut raw) };
        runtime.check(status, "get_value_type")?;
        Ok(ValueType::from_raw(raw) == Some(ValueType::Tensor))
    }

    /// Element type of the tensor as reported by the runtime.
    pub fn element_type(&self) -> OrtResult<ElementType> {
        let runtime = self.runtime();
        let info = self.type_and_shape()?;
        let mut raw: c_int = ElementType::Undefined as c_int;
        let status = unsafe { (runtime.api().get_tensor_element_type)(info.as_ptr(), &mut raw) };
        runtime.check(status, "get_tensor_element_type")?;
        Ok(ElementType::from_raw(raw).unwrap_or_default())
    }

    pub fn is_of_tensor_type(&self, kind: TensorKind) -> OrtResult<bool> {
        Ok(self.element_type()? == ElementType::from(kind))
    }

    pub fn tensor_shape(&self) -> OrtResult<Vec<i64>> {
        let runtime = self.runtime();
        let api = runtime.api();
        let info = self.type_and_shape()?;

        let mut count = 0usize;
        let status = unsafe { (api.get_dimensions_count)(info.as_ptr(), &mut count) };
        runtime.check(status, "get_dimensions_count")?;

        let mut shape = vec![0i64; count];
        let status = unsafe { (api.get_dimensions)(info.as_ptr(), shape.as_mut_ptr(), count) };
        runtime.check(status, "get_dimensions")?;
        Ok(shape)
    }

    /// Number of elements (product of the dimensions).
    pub fn element_count(&self) -> OrtResult<usize> {
        let runtime = self.runtime();
        let info = self.type_and_shape()?;
        let mut count = 0usize;
        let status =
            unsafe { (runtime.api().get_tensor_shape_element_count)(info.as_ptr(), &mut count) };
        runtime.check(status, "get_tensor_shape_element_count")?;
        Ok(count)
    }

    pub fn is_of_map_type(&self, _key: TensorKind, _value: TensorKind) -> OrtResult<bool> {
        Err(OrtError::NotImplemented("is_of_map_type"))
    }

    pub fn is_of_vector_map_type(&self, _key: TensorKind, _value: TensorKind) -> OrtResult<bool> {
        Err(OrtError::NotImplemented("is_of_vector_map_type"))
    }

    // ---- Host access ----

    /// Fill a CPU tensor from `src`.
    pub fn copy_from_slice<T: TensorElement>(&mut self, src: &[T]) -> OrtResult<()> {
        let (data, count) = self.host_buffer::<T>()?;
        if src.len() != count {
            return Err(OrtError::InvalidArgument(format!(
                "expected {count} elements, got {}",
                src.len()
            )));
        }
        let len = std::mem::size_of_val(src);
        if len == 0 {
            return Ok(());
        }
        // SAFETY: the tensor holds `count` elements of `T` in host memory and
        // `&mut self` excludes other access through this value.
        let dst = unsafe { std::slice::from_raw_parts_mut(data as *mut u8, len) };
        dst.copy_from_slice(bytemuck::cast_slice(src));
        Ok(())
    }

    /// Copy a CPU tensor out.
    pub fn to_vec<T: TensorElement>(&self) -> OrtResult<Vec<T>> {
        let (data, count) = self.host_buffer::<T>()?;
        let len = count * std::mem::size_of::<T>();
        if len == 0 {
            return Ok(Vec::new());
        }
        // SAFETY: see `copy_from_slice`.
        let bytes = unsafe { std::slice::from_raw_parts(data as *const u8, len) };
        Ok(bytemuck::pod_collect_to_vec(bytes))
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut OrtValue {
        self.value.as_ptr()
    }

    /// Allocator the value was created from.
    #[inline]
    pub fn allocator_ptr(&self) -> *mut OrtAllocator {
        self.allocator.as_ptr()
    }

    fn mutable_data(&self) -> OrtResult<*mut c_void> {
        let runtime = self.runtime();
        let mut data: *mut c_void = ptr::null_mut();
        let status =
            unsafe { (runtime.api().get_tensor_mutable_data)(self.value.as_ptr(), &mut data) };
        runtime.check(status, "get_tensor_mutable_data")?;
        Ok(data)
    }

    fn type_and_shape(&self) -> OrtResult<OwnedHandle<OrtTensorTypeAndShapeInfo>> {
        let runtime = self.runtime();
        let api = runtime.api();
        let mut info: *mut OrtTensorTypeAndShapeInfo = ptr::null_mut();
        let status = unsafe { (api.get_tensor_type_and_shape)(self.value.as_ptr(), &mut info) };
        runtime.check(status, "get_tensor_type_and_shape")?;
        unsafe {
            OwnedHandle::from_raw(
                runtime,
                info,
                api.release_tensor_type_and_shape_info,
                "get_tensor_type_and_shape",
            )
        }
    }

    fn host_buffer<T: TensorElement>(&self) -> OrtResult<(*mut c_void, usize)> {
        if !self.is_cpu()? {
            return Err(OrtError::InvalidArgument(
                "value is not in CPU memory".into(),
            ));
        }
        let element_type = self.element_type()?;
        if element_type != ElementType::from(T::KIND) {
            tracing::warn!(expected = %T::KIND, actual = ?element_type, "tensor type mismatch");
            return Err(OrtError::InvalidArgument(format!(
                "tensor holds {element_type:?}, not {}",
                T::KIND
            )));
        }
        let count = self.element_count()?;
        let data = self.mutable_data()?;
        if data.is_null() && count > 0 {
            return Err(OrtError::NullHandle("get_tensor_mutable_data"));
        }
        Ok((data, count))
    }
}

impl fmt::Debug for OnnxValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxValue")
            .field("value", &self.value)
            .field("allocator", &self.allocator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::engine::OnnxEngine;
    use crate::factory::OnnxEngineFactory;
    use crate::testing::{self, Ledger};

    fn factory() -> OnnxEngineFactory {
        OnnxEngineFactory::with_runtime(testing::fake_runtime(), RuntimeConfig::default()).unwrap()
    }

    fn cpu_engine() -> OnnxEngine {
        factory().create_engine_builder().create_engine().unwrap()
    }

    fn dml_engine() -> OnnxEngine {
        let mut builder = factory().create_engine_builder();
        builder.set_device_resources(testing::fake_device_resources());
        builder.create_engine().unwrap()
    }

    #[test]
    fn test_cpu_value_queries() {
        let engine = cpu_engine();
        let value = engine.create_tensor_value(&[1, 3, 2], TensorKind::Float).unwrap();

        assert!(value.is_tensor().unwrap());
        assert!(value.is_cpu().unwrap());
        assert!(value.is_of_tensor_type(TensorKind::Float).unwrap());
        assert!(!value.is_of_tensor_type(TensorKind::Double).unwrap());
        assert_eq!(value.tensor_shape().unwrap(), vec![1, 3, 2]);
        assert_eq!(value.element_count().unwrap(), 6);
        assert_eq!(Ledger::live("memory_info"), 0);
        assert_eq!(Ledger::live("type_info"), 0);
    }

    #[test]
    fn test_cpu_resource_is_host_memory() {
        let engine = cpu_engine();
        let value = engine.create_tensor_value(&[4], TensorKind::Int32).unwrap();
        let resource = value.resource().unwrap();
        assert!(!resource.is_device());
        assert!(!resource.as_ptr().is_null());
    }

    #[test]
    fn test_dml_value_is_device_resident() {
        let engine = dml_engine();
        let value = engine.create_tensor_value(&[2, 2], TensorKind::Float).unwrap();
        assert!(!value.is_cpu().unwrap());
        assert!(value.resource().unwrap().is_device());
    }

    #[test]
    fn test_cpu_mem_type_counts_as_cpu() {
        let engine = dml_engine();
        let value = engine.create_tensor_value(&[2], TensorKind::Float).unwrap();
        testing::set_value_mem_type(value.as_ptr(), MemType::CpuOutput);
        assert!(value.is_cpu().unwrap());
    }

    #[test]
    fn test_map_queries_are_not_implemented() {
        let engine = cpu_engine();
        let value = engine.create_tensor_value(&[1], TensorKind::Int64).unwrap();
        assert!(value
            .is_of_map_type(TensorKind::String, TensorKind::Float)
            .unwrap_err()
            .is_not_implemented());
        assert!(value
            .is_of_vector_map_type(TensorKind::Int64, TensorKind::Float)
            .unwrap_err()
            .is_not_implemented());
    }

    #[test]
    fn test_host_copy_in_and_out() {
        let engine = cpu_engine();
        let mut value = engine.create_tensor_value(&[2, 3], TensorKind::Float).unwrap();
        let input = [0.5f32, 1.0, 1.5, 2.0, 2.5, 3.0];
        value.copy_from_slice(&input).unwrap();
        assert_eq!(value.to_vec::<f32>().unwrap(), input.to_vec());
    }

    #[test]
    fn test_host_copy_checks_type_and_length() {
        let engine = cpu_engine();
        let mut value = engine.create_tensor_value(&[3], TensorKind::Int64).unwrap();
        assert!(matches!(
            value.copy_from_slice(&[1i64, 2]),
            Err(OrtError::InvalidArgument(_))
        ));
        assert!(matches!(
            value.to_vec::<f32>(),
            Err(OrtError::InvalidArgument(_))
        ));
        assert_eq!(value.to_vec::<i64>().unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn test_host_copy_rejects_device_values() {
        let engine = dml_engine();
        let value = engine.create_tensor_value(&[2], TensorKind::Float).unwrap();
        assert!(matches!(
            value.to_vec::<f32>(),
            Err(OrtError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_drop_releases_value_then_allocator() {
        let engine = cpu_engine();
        let value = engine.create_tensor_value(&[8], TensorKind::UInt8).unwrap();
        assert_eq!(Ledger::live("value"), 1);
        assert_eq!(Ledger::live("allocator"), 1);

        drop(value);
        assert_eq!(Ledger::live("value"), 0);
        assert_eq!(Ledger::live("allocator"), 0);
        assert_eq!(Ledger::double_releases(), 0);

        let order: Vec<_> = Ledger::releases()
            .into_iter()
            .filter(|kind| matches!(*kind, "value" | "allocator"))
            .collect();
        assert_eq!(order, vec!["value", "allocator"]);
    }

    fn assert_query_failure<T: fmt::Debug>(result: OrtResult<T>, expected: &str) {
        match result {
            Err(OrtError::Runtime { operation, .. }) => assert_eq!(operation, expected),
            other => panic!("expected runtime error in {expected}, got {other:?}"),
        }
        assert_eq!(Ledger::live("memory_info"), 0);
        assert_eq!(Ledger::live("type_info"), 0);
        assert_eq!(Ledger::live("status"), 0);
    }

    #[test]
    fn test_memory_info_failures_are_reported() {
        let engine = cpu_engine();
        let value = engine.create_tensor_value(&[2], TensorKind::Float).unwrap();

        testing::fail_next("get_value_memory_info");
        assert_query_failure(value.is_cpu(), "get_value_memory_info");

        testing::fail_next("memory_info_get_name");
        assert_query_failure(value.is_cpu(), "memory_info_get_name");

        testing::fail_next("memory_info_get_mem_type");
        assert_query_failure(value.is_cpu(), "memory_info_get_mem_type");

        assert_eq!(Ledger::created("memory_info"), 2);
        assert!(value.is_cpu().unwrap());
    }

    #[test]
    fn test_type_and_shape_failures_are_reported() {
        let engine = cpu_engine();
        let value = engine.create_tensor_value(&[2, 5], TensorKind::Int32).unwrap();

        testing::fail_next("get_tensor_type_and_shape");
        assert_query_failure(value.tensor_shape(), "get_tensor_type_and_shape");

        testing::fail_next("get_tensor_element_type");
        assert_query_failure(value.is_of_tensor_type(TensorKind::Int32), "get_tensor_element_type");

        testing::fail_next("get_dimensions_count");
        assert_query_failure(value.tensor_shape(), "get_dimensions_count");

        testing::fail_next("get_dimensions");
        assert_query_failure(value.tensor_shape(), "get_dimensions");

        testing::fail_next("get_tensor_shape_element_count");
        assert_query_failure(value.element_count(), "get_tensor_shape_element_count");

        assert_eq!(value.tensor_shape().unwrap(), vec![2, 5]);
        assert_eq!(Ledger::double_releases(), 0);
    }

    #[test]
    fn test_host_copy_reports_query_failures() {
        let engine = cpu_engine();
        let value = engine.create_tensor_value(&[3], TensorKind::Float).unwrap();

        testing::fail_next("get_tensor_element_type");
        assert_query_failure(value.to_vec::<f32>(), "get_tensor_element_type");

        testing::fail_next("get_tensor_mutable_data");
        assert_query_failure(value.to_vec::<f32>(), "get_tensor_mutable_data");
    }

    #[test]
    fn test_value_keeps_engine_alive() {
        let engine = cpu_engine();
        let value = engine.create_tensor_value(&[1], TensorKind::Float).unwrap();
        drop(engine);
        assert_eq!(Ledger::live("session"), 1);
        assert!(value.is_tensor().unwrap());

        drop(value);
        assert_eq!(Ledger::live("session"), 0);
        assert_eq!(Ledger::live("env"), 0);
    }
}
