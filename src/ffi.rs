//! Raw FFI bindings to `csrc/alice_ort_c_api.h`
//!
//! The wrapped runtime is reached only through two function tables: the
//! core [`RuntimeApi`] and the engine [`AdapterApi`] extension. Both are
//! `#[repr(C)]` and must match the header field for field.
//! Use [`crate::OnnxEngineFactory`] for safe wrappers.

use std::ffi::c_void;
use std::os::raw::{c_char, c_int};

use serde::{Deserialize, Serialize};

// ============================================================================
// Opaque handles
// ============================================================================

macro_rules! opaque_handle {
    ($($(#[$meta:meta])* $name:ident;)+) => {
        $(
            $(#[$meta])*
            #[repr(C)]
            pub struct $name {
                _private: [u8; 0],
            }
        )+
    };
}

opaque_handle! {
    /// Runtime environment (logging, thread pools).
    OrtEnv;
    /// Inference session.
    OrtSession;
    /// Options used to create a session.
    OrtSessionOptions;
    /// Tensor, sequence or map value.
    OrtValue;
    /// Loaded, not yet purloined model.
    OrtModel;
    /// Allocator owned by an execution provider.
    OrtAllocator;
    /// Location and memory type of a value.
    OrtMemoryInfo;
    /// Element type and dimensions of a tensor.
    OrtTensorTypeAndShapeInfo;
    /// Hardware backend registered on a session. Borrowed, never released.
    OrtExecutionProvider;
    /// Failure detail. A null status means success.
    OrtStatus;
    /// Custom operator registry.
    OperatorRegistry;
}

/// Status pointer returned by every fallible table function.
pub type OrtStatusPtr = *mut OrtStatus;

// ============================================================================
// Enums (values must match the header exactly)
// ============================================================================

/// Tensor element data type.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ElementType {
    #[default]
    Undefined = 0,
    Float = 1,
    UInt8 = 2,
    Int8 = 3,
    UInt16 = 4,
    Int16 = 5,
    Int32 = 6,
    Int64 = 7,
    String = 8,
    Bool = 9,
    Float16 = 10,
    Double = 11,
    UInt32 = 12,
    UInt64 = 13,
    Complex64 = 14,
    Complex128 = 15,
    BFloat16 = 16,
}

/// Kind of value held by an `OrtValue`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueType {
    #[default]
    Unknown = 0,
    Tensor = 1,
    Sequence = 2,
    Map = 3,
    Opaque = 4,
    SparseTensor = 5,
}

/// Memory type of an allocation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemType {
    /// Input that lives in CPU memory while the provider runs elsewhere.
    CpuInput = -2,
    /// Output that lives in CPU memory while the provider runs elsewhere.
    CpuOutput = -1,
    #[default]
    Default = 0,
}

/// Severity used by the runtime logger.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggingLevel {
    Verbose = 0,
    Info = 1,
    #[default]
    Warning = 2,
    Error = 3,
    Fatal = 4,
}

/// Graph optimisation applied when a session is initialised.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphOptimizationLevel {
    DisableAll = 0,
    EnableBasic = 1,
    EnableExtended = 2,
    #[default]
    EnableAll = 99,
}

macro_rules! from_raw {
    ($name:ident { $($variant:ident),+ $(,)? }) => {
        impl $name {
            /// Convert a value written by the runtime. Unknown values yield `None`.
            pub fn from_raw(raw: c_int) -> Option<Self> {
                $(
                    if raw == $name::$variant as c_int {
                        return Some($name::$variant);
                    }
                )+
                None
            }
        }
    };
}

from_raw!(ElementType {
    Undefined, Float, UInt8, Int8, UInt16, Int16, Int32, Int64, String, Bool,
    Float16, Double, UInt32, UInt64, Complex64, Complex128, BFloat16,
});
from_raw!(ValueType { Unknown, Tensor, Sequence, Map, Opaque, SparseTensor });
from_raw!(MemType { CpuInput, CpuOutput, Default });
from_raw!(LoggingLevel { Verbose, Info, Warning, Error, Fatal });

/// Error codes carried by a non-null status.
pub type ErrorCode = c_int;
pub const ORT_OK: ErrorCode = 0;
pub const ORT_FAIL: ErrorCode = 1;
pub const ORT_INVALID_ARGUMENT: ErrorCode = 2;
pub const ORT_NO_SUCHFILE: ErrorCode = 3;
pub const ORT_NO_MODEL: ErrorCode = 4;
pub const ORT_ENGINE_ERROR: ErrorCode = 5;
pub const ORT_RUNTIME_EXCEPTION: ErrorCode = 6;
pub const ORT_INVALID_PROTOBUF: ErrorCode = 7;
pub const ORT_MODEL_LOADED: ErrorCode = 8;
pub const ORT_NOT_IMPLEMENTED: ErrorCode = 9;
pub const ORT_INVALID_GRAPH: ErrorCode = 10;
pub const ORT_EP_FAIL: ErrorCode = 11;

/// Name reported by CPU memory infos.
pub const CPU_MEMORY_NAME: &str = "Cpu";

/// Denotation used for the batch dimension override.
pub const DATA_BATCH_DENOTATION: &[u8] = b"DATA_BATCH\0";

/// Native logging callback.
pub type LoggingFunction = unsafe extern "C" fn(
    param: *mut c_void,
    severity: c_int,
    category: *const c_char,
    logid: *const c_char,
    code_location: *const c_char,
    message: *const c_char,
);

// ============================================================================
// Entry points
// ============================================================================

/// Symbol of `const AliceOrtApiBase* alice_ort_get_api_base(void)`.
pub const GET_API_BASE_SYMBOL: &[u8] = b"alice_ort_get_api_base\0";
/// Symbol of `const AliceOrtAdapterApi* alice_ort_get_adapter_api(const AliceOrtApi*)`.
pub const GET_ADAPTER_API_SYMBOL: &[u8] = b"alice_ort_get_adapter_api\0";

pub type GetApiBaseFn = unsafe extern "C" fn() -> *const ApiBase;
pub type GetAdapterApiFn = unsafe extern "C" fn(api: *const RuntimeApi) -> *const AdapterApi;

/// Versioned access to the core table.
#[repr(C)]
pub struct ApiBase {
    /// Returns null when `version` is not supported.
    pub get_api: unsafe extern "C" fn(version: u32) -> *const RuntimeApi,
    pub get_version_string: unsafe extern "C" fn() -> *const c_char,
}

// ============================================================================
// Core runtime table
// ============================================================================

/// Mirrors `AliceOrtApi`.
#[repr(C)]
pub struct RuntimeApi {
    // ---- Status ----
    pub get_error_code: unsafe extern "C" fn(status: *const OrtStatus) -> ErrorCode,
    pub get_error_message: unsafe extern "C" fn(status: *const OrtStatus) -> *const c_char,
    pub release_status: unsafe extern "C" fn(status: *mut OrtStatus),

    // ---- Environment ----
    pub create_env_with_custom_logger: unsafe extern "C" fn(
        logging_function: LoggingFunction,
        logger_param: *mut c_void,
        level: LoggingLevel,
        logid: *const c_char,
        out: *mut *mut OrtEnv,
    ) -> OrtStatusPtr,
    pub release_env: unsafe extern "C" fn(env: *mut OrtEnv),

    // ---- Session options ----
    pub create_session_options:
        unsafe extern "C" fn(out: *mut *mut OrtSessionOptions) -> OrtStatusPtr,
    pub set_session_graph_optimization_level: unsafe extern "C" fn(
        options: *mut OrtSessionOptions,
        level: GraphOptimizationLevel,
    ) -> OrtStatusPtr,
    pub set_intra_op_num_threads:
        unsafe extern "C" fn(options: *mut OrtSessionOptions, threads: c_int) -> OrtStatusPtr,
    pub disable_mem_pattern: unsafe extern "C" fn(options: *mut OrtSessionOptions) -> OrtStatusPtr,
    pub add_free_dimension_override: unsafe extern "C" fn(
        options: *mut OrtSessionOptions,
        denotation: *const c_char,
        value: i64,
    ) -> OrtStatusPtr,
    pub release_session_options: unsafe extern "C" fn(options: *mut OrtSessionOptions),
    pub release_session: unsafe extern "C" fn(session: *mut OrtSession),

    // ---- Values ----
    pub create_tensor_as_ort_value: unsafe extern "C" fn(
        allocator: *mut OrtAllocator,
        shape: *const i64,
        shape_len: usize,
        element_type: ElementType,
        out: *mut *mut OrtValue,
    ) -> OrtStatusPtr,
    pub get_value_type:
        unsafe extern "C" fn(value: *const OrtValue, out: *mut c_int) -> OrtStatusPtr,
    pub get_tensor_mutable_data:
        unsafe extern "C" fn(value: *mut OrtValue, out: *mut *mut c_void) -> OrtStatusPtr,
    pub get_tensor_type_and_shape: unsafe extern "C" fn(
        value: *const OrtValue,
        out: *mut *mut OrtTensorTypeAndShapeInfo,
    ) -> OrtStatusPtr,
    pub release_value: unsafe extern "C" fn(value: *mut OrtValue),

    // ---- Tensor type and shape ----
    pub get_tensor_element_type: unsafe extern "C" fn(
        info: *const OrtTensorTypeAndShapeInfo,
        out: *mut c_int,
    ) -> OrtStatusPtr,
    pub get_dimensions_count: unsafe extern "C" fn(
        info: *const OrtTensorTypeAndShapeInfo,
        out: *mut usize,
    ) -> OrtStatusPtr,
    pub get_dimensions: unsafe extern "C" fn(
        info: *const OrtTensorTypeAndShapeInfo,
        values: *mut i64,
        len: usize,
    ) -> OrtStatusPtr,
    pub get_tensor_shape_element_count: unsafe extern "C" fn(
        info: *const OrtTensorTypeAndShapeInfo,
        out: *mut usize,
    ) -> OrtStatusPtr,
    pub release_tensor_type_and_shape_info:
        unsafe extern "C" fn(info: *mut OrtTensorTypeAndShapeInfo),

    // ---- Memory info ----
    pub memory_info_get_name:
        unsafe extern "C" fn(info: *const OrtMemoryInfo, out: *mut *const c_char) -> OrtStatusPtr,
    pub memory_info_get_mem_type:
        unsafe extern "C" fn(info: *const OrtMemoryInfo, out: *mut c_int) -> OrtStatusPtr,
    pub release_memory_info: unsafe extern "C" fn(info: *mut OrtMemoryInfo),
}

// ============================================================================
// Engine adapter table
// ============================================================================

/// Mirrors `AliceOrtAdapterApi`.
#[repr(C)]
pub struct AdapterApi {
    // ---- Models ----
    pub create_model_from_path: unsafe extern "C" fn(
        path: *const c_char,
        len: usize,
        out: *mut *mut OrtModel,
    ) -> OrtStatusPtr,
    pub create_model_from_data: unsafe extern "C" fn(
        data: *const c_void,
        size: usize,
        out: *mut *mut OrtModel,
    ) -> OrtStatusPtr,
    pub model_get_author: ModelStringFn,
    pub model_get_name: ModelStringFn,
    pub model_get_domain: ModelStringFn,
    pub model_get_description: ModelStringFn,
    pub model_get_version:
        unsafe extern "C" fn(model: *const OrtModel, out: *mut i64) -> OrtStatusPtr,
    pub model_get_input_count:
        unsafe extern "C" fn(model: *const OrtModel, out: *mut usize) -> OrtStatusPtr,
    pub model_get_output_count:
        unsafe extern "C" fn(model: *const OrtModel, out: *mut usize) -> OrtStatusPtr,
    pub model_get_input_name: ModelIndexedStringFn,
    pub model_get_output_name: ModelIndexedStringFn,
    pub release_model: unsafe extern "C" fn(model: *mut OrtModel),

    // ---- Sessions ----
    pub create_session_without_model: unsafe extern "C" fn(
        env: *mut OrtEnv,
        options: *const OrtSessionOptions,
        out: *mut *mut OrtSession,
    ) -> OrtStatusPtr,
    pub session_get_execution_provider: unsafe extern "C" fn(
        session: *mut OrtSession,
        index: usize,
        out: *mut *mut OrtExecutionProvider,
    ) -> OrtStatusPtr,
    pub session_get_execution_providers_count:
        unsafe extern "C" fn(session: *mut OrtSession, out: *mut usize) -> OrtStatusPtr,
    pub session_initialize: unsafe extern "C" fn(session: *mut OrtSession) -> OrtStatusPtr,
    pub session_register_graph_transformers:
        unsafe extern "C" fn(session: *mut OrtSession) -> OrtStatusPtr,
    pub session_register_custom_registry: unsafe extern "C" fn(
        session: *mut OrtSession,
        registry: *mut OperatorRegistry,
    ) -> OrtStatusPtr,
    /// Takes ownership of `model` when it returns success.
    pub session_load_and_purloin_model:
        unsafe extern "C" fn(session: *mut OrtSession, model: *mut OrtModel) -> OrtStatusPtr,
    pub session_start_profiling:
        unsafe extern "C" fn(env: *mut OrtEnv, session: *mut OrtSession) -> OrtStatusPtr,
    pub session_end_profiling: unsafe extern "C" fn(session: *mut OrtSession) -> OrtStatusPtr,

    // ---- Providers and allocators ----
    pub get_provider_allocator: unsafe extern "C" fn(
        provider: *mut OrtExecutionProvider,
        out: *mut *mut OrtAllocator,
    ) -> OrtStatusPtr,
    pub free_provider_allocator: unsafe extern "C" fn(allocator: *mut OrtAllocator),
    pub get_value_memory_info: unsafe extern "C" fn(
        value: *const OrtValue,
        out: *mut *mut OrtMemoryInfo,
    ) -> OrtStatusPtr,
    pub execution_provider_sync:
        unsafe extern "C" fn(provider: *mut OrtExecutionProvider) -> OrtStatusPtr,

    // ---- DirectML ----
    pub session_options_append_dml: unsafe extern "C" fn(
        options: *mut OrtSessionOptions,
        device: *mut c_void,
        queue: *mut c_void,
        metacommands_enabled: c_int,
    ) -> OrtStatusPtr,
    pub dml_flush_context:
        unsafe extern "C" fn(provider: *mut OrtExecutionProvider) -> OrtStatusPtr,
    pub dml_trim_upload_heap:
        unsafe extern "C" fn(provider: *mut OrtExecutionProvider) -> OrtStatusPtr,
    pub dml_release_completed_references:
        unsafe extern "C" fn(provider: *mut OrtExecutionProvider) -> OrtStatusPtr,
    pub dml_set_default_rounding_mode:
        unsafe extern "C" fn(provider: *mut OrtExecutionProvider, enabled: c_int) -> OrtStatusPtr,
    pub dml_get_d3d12_resource_from_allocation: unsafe extern "C" fn(
        provider: *mut OrtExecutionProvider,
        allocation: *mut c_void,
        out: *mut *mut c_void,
    ) -> OrtStatusPtr,

    // ---- Custom operators ----
    pub create_custom_registry:
        unsafe extern "C" fn(out: *mut *mut OperatorRegistry) -> OrtStatusPtr,
    pub release_custom_registry: unsafe extern "C" fn(registry: *mut OperatorRegistry),
}

/// `(model, out_string, out_len)`; the string is owned by the model.
pub type ModelStringFn = unsafe extern "C" fn(
    model: *const OrtModel,
    out: *mut *const c_char,
    len: *mut usize,
) -> OrtStatusPtr;

/// `(model, index, out_string, out_len)`; the string is owned by the model.
pub type ModelIndexedStringFn = unsafe extern "C" fn(
    model: *const OrtModel,
    index: usize,
    out: *mut *const c_char,
    len: *mut usize,
) -> OrtStatusPtr;
