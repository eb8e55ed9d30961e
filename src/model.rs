//! Models loaded by the runtime but not yet bound to a session.

use std::ffi::c_void;
use std::fmt;
use std::os::raw::c_char;
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use crate::error::{OrtError, OrtResult};
use crate::ffi::{ModelIndexedStringFn, ModelStringFn, OrtModel, OrtStatusPtr};
use crate::handle::OwnedHandle;
use crate::runtime::{str_from_parts, Runtime};

type ModelCountFn = unsafe extern "C" fn(*const OrtModel, *mut usize) -> OrtStatusPtr;

/// Descriptive fields of a model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelMetadata {
    pub author: String,
    pub name: String,
    pub domain: String,
    pub description: String,
    pub version: i64,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// A model owned by the caller until an engine purloins it.
pub struct OnnxModel {
    handle: OwnedHandle<OrtModel>,
}

impl OnnxModel {
    /// Load a model file.
    pub fn from_path(runtime: &Arc<Runtime>, path: impl AsRef<Path>) -> OrtResult<Self> {
        let path = path.as_ref();
        let path_str = path.to_str().ok_or_else(|| {
            OrtError::InvalidArgument(format!("model path {} is not UTF-8", path.display()))
        })?;
        if path_str.is_empty() {
            return Err(OrtError::InvalidArgument("model path is empty".into()));
        }

        let adapter = runtime.adapter();
        let mut model: *mut OrtModel = ptr::null_mut();
        let status = unsafe {
            (adapter.create_model_from_path)(
                path_str.as_ptr() as *const c_char,
                path_str.len(),
                &mut model,
            )
        };
        runtime.check(status, "create_model_from_path")?;
        let handle = unsafe {
            OwnedHandle::from_raw(runtime, model, adapter.release_model, "create_model_from_path")?
        };
        tracing::debug!(path = %path.display(), "loaded model");
        Ok(Self { handle })
    }

    /// Load a model from an in-memory buffer. The runtime copies the bytes.
    pub fn from_bytes(runtime: &Arc<Runtime>, data: &[u8]) -> OrtResult<Self> {
        if data.is_empty() {
            return Err(OrtError::InvalidArgument("model buffer is empty".into()));
        }

        let adapter = runtime.adapter();
        let mut model: *mut OrtModel = ptr::null_mut();
        let status = unsafe {
            (adapter.create_model_from_data)(
                data.as_ptr() as *const c_void,
                data.len(),
                &mut model,
            )
        };
        runtime.check(status, "create_model_from_data")?;
        let handle = unsafe {
            OwnedHandle::from_raw(runtime, model, adapter.release_model, "create_model_from_data")?
        };
        tracing::debug!(bytes = data.len(), "loaded model from memory");
        Ok(Self { handle })
    }

    // ---- Metadata ----

    pub fn author(&self) -> OrtResult<String> {
        self.string_field(self.runtime().adapter().model_get_author, "model_get_author")
    }

    pub fn name(&self) -> OrtResult<String> {
        self.string_field(self.runtime().adapter().model_get_name, "model_get_name")
    }

    pub fn domain(&self) -> OrtResult<String> {
        self.string_field(self.runtime().adapter().model_get_domain, "model_get_domain")
    }

    pub fn description(&self) -> OrtResult<String> {
        self.string_field(
            self.runtime().adapter().model_get_description,
            "model_get_description",
        )
    }

    pub fn version(&self) -> OrtResult<i64> {
        let runtime = self.runtime();
        let mut version = 0i64;
        let status =
            unsafe { (runtime.adapter().model_get_version)(self.handle.as_ptr(), &mut version) };
        runtime.check(status, "model_get_version")?;
        Ok(version)
    }

    /// Names of the model's inputs, in declaration order.
    pub fn input_names(&self) -> OrtResult<Vec<String>> {
        let adapter = self.runtime().adapter();
        self.indexed_names(
            (adapter.model_get_input_count, "model_get_input_count"),
            (adapter.model_get_input_name, "model_get_input_name"),
        )
    }

    /// Names of the model's outputs, in declaration order.
    pub fn output_names(&self) -> OrtResult<Vec<String>> {
        let adapter = self.runtime().adapter();
        self.indexed_names(
            (adapter.model_get_output_count, "model_get_output_count"),
            (adapter.model_get_output_name, "model_get_output_name"),
        )
    }

    /// All descriptive fields at once.
    pub fn metadata(&self) -> OrtResult<ModelMetadata> {
        Ok(ModelMetadata {
            author: self.author()?,
            name: self.name()?,
            domain: self.domain()?,
            description: self.description()?,
            version: self.version()?,
            inputs: self.input_names()?,
            outputs: self.output_names()?,
        })
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut OrtModel {
        self.handle.as_ptr()
    }

    #[inline]
    pub fn runtime(&self) -> &Arc<Runtime> {
        self.handle.runtime()
    }

    /// Hand the model over to a session that has taken ownership of it.
    pub(crate) fn into_raw(self) -> *mut OrtModel {
        self.handle.into_raw()
    }

    fn string_field(&self, getter: ModelStringFn, operation: &'static str) -> OrtResult<String> {
        let mut out: *const c_char = ptr::null();
        let mut len = 0usize;
        let status = unsafe { getter(self.handle.as_ptr(), &mut out, &mut len) };
        self.runtime().check(status, operation)?;
        Ok(str_from_parts(out, len))
    }

    fn indexed_names(
        &self,
        (count, count_operation): (ModelCountFn, &'static str),
        (getter, operation): (ModelIndexedStringFn, &'static str),
    ) -> OrtResult<Vec<String>> {
        let runtime = self.runtime();
        let mut total = 0usize;
        let status = unsafe { count(self.handle.as_ptr(), &mut total) };
        runtime.check(status, count_operation)?;

        (0..total)
            .map(|index| {
                let mut out: *const c_char = ptr::null();
                let mut len = 0usize;
                let status = unsafe { getter(self.handle.as_ptr(), index, &mut out, &mut len) };
                runtime.check(status, operation)?;
                Ok(str_from_parts(out, len))
            })
            .collect()
    }
}

impl fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxModel").field("handle", &self.handle).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, Ledger};

    #[test]
    fn test_from_path_and_metadata() {
        let runtime = testing::fake_runtime();
        let model = OnnxModel::from_path(&runtime, "squeezenet.onnx").unwrap();
        assert_eq!(Ledger::live("model"), 1);

        let metadata = model.metadata().unwrap();
        assert_eq!(metadata.name, "squeezenet");
        assert_eq!(metadata.author, testing::FAKE_MODEL_AUTHOR);
        assert_eq!(metadata.domain, "ai.onnx");
        assert_eq!(metadata.version, 7);
        assert_eq!(metadata.inputs, vec!["data_0".to_string()]);
        assert_eq!(metadata.outputs, vec!["softmaxout_1".to_string()]);

        drop(model);
        assert_eq!(Ledger::live("model"), 0);
        assert_eq!(Ledger::double_releases(), 0);
    }

    #[test]
    fn test_missing_file_is_runtime_error() {
        let runtime = testing::fake_runtime();
        let err = OnnxModel::from_path(&runtime, "missing.onnx").unwrap_err();
        match err {
            OrtError::Runtime { operation, code, .. } => {
                assert_eq!(operation, "create_model_from_path");
                assert_eq!(code, crate::ffi::ORT_NO_SUCHFILE);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(Ledger::live("model"), 0);
        assert_eq!(Ledger::live("status"), 0);
    }

    #[test]
    fn test_empty_inputs_are_rejected() {
        let runtime = testing::fake_runtime();
        assert!(matches!(
            OnnxModel::from_path(&runtime, ""),
            Err(OrtError::InvalidArgument(_))
        ));
        assert!(matches!(
            OnnxModel::from_bytes(&runtime, &[]),
            Err(OrtError::InvalidArgument(_))
        ));
        assert_eq!(Ledger::calls("create_model_from_path"), 0);
        assert_eq!(Ledger::calls("create_model_from_data"), 0);
    }

    #[test]
    fn test_from_bytes() {
        let runtime = testing::fake_runtime();
        let model = OnnxModel::from_bytes(&runtime, b"mnist").unwrap();
        assert_eq!(model.name().unwrap(), "mnist");
        assert_eq!(Ledger::calls("create_model_from_data"), 1);
    }

    #[test]
    fn test_corrupt_bytes_are_runtime_error() {
        let runtime = testing::fake_runtime();
        let err = OnnxModel::from_bytes(&runtime, testing::CORRUPT_MODEL_BYTES).unwrap_err();
        assert!(err.is_runtime());
        assert_eq!(Ledger::live("model"), 0);
    }
}
