//! In-process fake runtime.
//!
//! Implements both function tables in Rust so every wrapper can be exercised
//! without a native install. Each handle the fake hands out is a boxed Rust
//! object registered in a per-thread [`Ledger`]; releasing an unknown or
//! already released handle is counted instead of freed, which lets tests
//! assert that every handle is released exactly once.
//!
//! Behaviour worth knowing when writing tests:
//! * model paths name the model after their file stem; `missing.onnx` fails
//!   with `ORT_NO_SUCHFILE`, `unsupported.onnx` loads but is refused by
//!   sessions with `ORT_INVALID_GRAPH`
//! * sessions get one CPU provider, plus a leading DirectML provider when the
//!   options registered one
//! * DirectML calls on the CPU provider fail with `ORT_INVALID_ARGUMENT`
//! * [`fail_next`] makes the next call of a named table function fail

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_int};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use crate::ffi::{
    AdapterApi, ApiBase, ElementType, ErrorCode, GraphOptimizationLevel, LoggingFunction,
    LoggingLevel, MemType, OperatorRegistry, OrtAllocator, OrtEnv, OrtExecutionProvider,
    OrtMemoryInfo, OrtModel, OrtSession, OrtSessionOptions, OrtStatus, OrtStatusPtr,
    OrtTensorTypeAndShapeInfo, OrtValue, RuntimeApi, ValueType, CPU_MEMORY_NAME, ORT_FAIL,
    ORT_INVALID_ARGUMENT, ORT_INVALID_GRAPH, ORT_INVALID_PROTOBUF, ORT_MODEL_LOADED,
    ORT_NO_SUCHFILE,
};
use crate::kind::TensorKind;
use crate::runtime::Runtime;
use crate::session_builder::DeviceResources;

/// Version string reported by the fake.
pub const FAKE_VERSION: &str = "1.14.0-alice-fake";
const FAKE_VERSION_C: &[u8] = b"1.14.0-alice-fake\0";

/// Author reported by every fake model.
pub const FAKE_MODEL_AUTHOR: &str = "alice-ort tests";

/// Environments created with this log id fail.
pub const FAIL_ENV_LOG_ID: &str = "fail-env";

/// Model bytes the fake refuses to parse.
pub const CORRUPT_MODEL_BYTES: &[u8] = b"\x08\xff\xffcorrupt";

/// Memory name reported by DirectML allocations.
pub const DML_MEMORY_NAME: &str = "DML";

/// Runtime over the fake tables.
pub fn fake_runtime() -> Arc<Runtime> {
    Runtime::from_static(&FAKE_API, &FAKE_ADAPTER, FAKE_VERSION)
}

/// Device/queue pair that the fake never dereferences.
pub fn fake_device_resources() -> DeviceResources {
    // SAFETY: both addresses are non-null and the fake only stores and
    // compares them.
    unsafe {
        DeviceResources::from_non_null(
            NonNull::new_unchecked(0x1000 as *mut c_void),
            NonNull::new_unchecked(0x2000 as *mut c_void),
        )
    }
}

// ============================================================================
// Ledger
// ============================================================================

#[derive(Default)]
struct LedgerState {
    live: HashMap<&'static str, HashSet<usize>>,
    created: HashMap<&'static str, usize>,
    calls: HashMap<&'static str, usize>,
    double_releases: usize,
    events: Vec<String>,
    releases: Vec<&'static str>,
    fail_next: HashMap<&'static str, usize>,
}

thread_local! {
    static LEDGER: RefCell<LedgerState> = RefCell::new(LedgerState::default());
}

/// Per-thread record of fake handles and calls.
pub struct Ledger;

impl Ledger {
    /// Handles of `kind` created and not yet released.
    pub fn live(kind: &str) -> usize {
        LEDGER.with(|l| l.borrow().live.get(kind).map_or(0, HashSet::len))
    }

    /// Handles of `kind` created so far.
    pub fn created(kind: &str) -> usize {
        LEDGER.with(|l| l.borrow().created.get(kind).copied().unwrap_or(0))
    }

    /// Calls made to the table function `name`.
    pub fn calls(name: &str) -> usize {
        LEDGER.with(|l| l.borrow().calls.get(name).copied().unwrap_or(0))
    }

    /// Releases of handles that were not live.
    pub fn double_releases() -> usize {
        LEDGER.with(|l| l.borrow().double_releases)
    }

    /// Session and provider calls, in order.
    pub fn events() -> Vec<String> {
        LEDGER.with(|l| l.borrow().events.clone())
    }

    /// Kinds of handles released, in release order.
    pub fn releases() -> Vec<&'static str> {
        LEDGER.with(|l| l.borrow().releases.clone())
    }

    fn track<T>(kind: &'static str, object: T) -> *mut T {
        let ptr = Box::into_raw(Box::new(object));
        LEDGER.with(|l| {
            let mut l = l.borrow_mut();
            l.live.entry(kind).or_default().insert(ptr as usize);
            *l.created.entry(kind).or_default() += 1;
        });
        ptr
    }

    fn is_live(kind: &'static str, ptr: usize) -> bool {
        LEDGER.with(|l| l.borrow().live.get(kind).is_some_and(|set| set.contains(&ptr)))
    }

    /// Free `ptr` if it is a live `kind` handle; count it otherwise.
    unsafe fn release<T>(kind: &'static str, ptr: *mut T) {
        if ptr.is_null() {
            return;
        }
        let was_live = LEDGER.with(|l| {
            let mut l = l.borrow_mut();
            let removed = l
                .live
                .get_mut(kind)
                .is_some_and(|set| set.remove(&(ptr as usize)));
            if removed {
                l.releases.push(kind);
            } else {
                l.double_releases += 1;
            }
            removed
        });
        if was_live {
            drop(Box::from_raw(ptr));
        }
    }

    fn record(name: &'static str) {
        LEDGER.with(|l| *l.borrow_mut().calls.entry(name).or_default() += 1);
    }

    fn event(event: String) {
        LEDGER.with(|l| l.borrow_mut().events.push(event));
    }

    /// Record a call and return the injected failure, if any.
    fn enter(name: &'static str) -> Option<OrtStatusPtr> {
        Self::record(name);
        let injected = LEDGER.with(|l| {
            let mut l = l.borrow_mut();
            let Some(skip) = l.fail_next.get(name).copied() else {
                return false;
            };
            if skip == 0 {
                l.fail_next.remove(name);
            } else {
                l.fail_next.insert(name, skip - 1);
            }
            skip == 0
        });
        injected.then(|| status(ORT_FAIL, &format!("injected failure in {name}")))
    }
}

/// Make the next call of table function `name` on this thread fail.
pub fn fail_next(name: &'static str) {
    fail_nth(name, 0);
}

/// Let `skip` calls of `name` through, then fail the one after.
pub fn fail_nth(name: &'static str, skip: usize) {
    LEDGER.with(|l| {
        l.borrow_mut().fail_next.insert(name, skip);
    });
}

macro_rules! enter {
    ($name:literal) => {
        if let Some(status) = Ledger::enter($name) {
            return status;
        }
    };
}

// ============================================================================
// Fake objects
// ============================================================================

struct FakeStatus {
    code: ErrorCode,
    message: CString,
}

struct FakeEnv {
    logger: LoggingFunction,
    param: *mut c_void,
    level: LoggingLevel,
    log_id: CString,
}

struct FakeModel {
    author: String,
    name: String,
    domain: String,
    description: String,
    version: i64,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

/// Settings recorded on fake session options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionsState {
    pub optimization_level: GraphOptimizationLevel,
    pub intra_op_threads: Option<c_int>,
    pub mem_pattern: bool,
    /// `(device, queue, metacommands)`
    pub dml: Option<(usize, usize, bool)>,
    pub free_dimension_overrides: Vec<(String, i64)>,
}

impl Default for OptionsState {
    fn default() -> Self {
        Self {
            optimization_level: GraphOptimizationLevel::EnableAll,
            intra_op_threads: None,
            mem_pattern: true,
            dml: None,
            free_dimension_overrides: Vec::new(),
        }
    }
}

struct FakeProvider {
    dml: bool,
}

/// Observable state of a fake session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub model: Option<String>,
    pub initialized: bool,
    pub graph_transformers: bool,
    pub custom_registries: usize,
    pub profiling: bool,
    pub free_dimension_overrides: Vec<(String, i64)>,
}

struct FakeSession {
    providers: Vec<Box<FakeProvider>>,
    model: *mut FakeModel,
    state: SessionState,
}

struct FakeAllocator {
    dml: bool,
}

struct FakeValue {
    element_type: ElementType,
    shape: Vec<i64>,
    data: Vec<u8>,
    dml: bool,
    mem_type: MemType,
}

struct FakeTypeInfo {
    element_type: ElementType,
    shape: Vec<i64>,
}

struct FakeMemoryInfo {
    name: CString,
    mem_type: MemType,
}

struct FakeRegistry;

fn status(code: ErrorCode, message: &str) -> OrtStatusPtr {
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    Ledger::track("status", FakeStatus { code, message }) as *mut OrtStatus
}

/// A native status as the runtime would return it.
pub fn make_status(code: ErrorCode, message: &str) -> OrtStatusPtr {
    status(code, message)
}

// ---- Test accessors ----

/// Log id and level an environment was created with.
pub fn env_logger_settings(env: *mut OrtEnv) -> (String, LoggingLevel) {
    // SAFETY: tests pass environments created by the fake.
    let env = unsafe { &*(env as *const FakeEnv) };
    (env.log_id.to_string_lossy().into_owned(), env.level)
}

/// Emit a message through an environment's logging callback.
pub fn emit_log(env: *mut OrtEnv, level: LoggingLevel, message: &str) {
    // SAFETY: tests pass environments created by the fake.
    let env = unsafe { &*(env as *const FakeEnv) };
    let message = CString::new(message).unwrap_or_default();
    // SAFETY: the callback and its parameter were registered together.
    unsafe {
        (env.logger)(
            env.param,
            level as c_int,
            b"fake\0".as_ptr() as *const c_char,
            env.log_id.as_ptr(),
            b"testing.rs\0".as_ptr() as *const c_char,
            message.as_ptr(),
        )
    }
}

/// Settings recorded on session options.
pub fn options_state(options: *mut OrtSessionOptions) -> OptionsState {
    // SAFETY: tests pass options created by the fake.
    unsafe { (*(options as *const OptionsState)).clone() }
}

/// Number of execution providers of a session.
pub fn provider_count(session: *mut OrtSession) -> usize {
    // SAFETY: tests pass sessions created by the fake.
    unsafe { (*(session as *const FakeSession)).providers.len() }
}

/// Observable state of a session.
pub fn session_state(session: *mut OrtSession) -> SessionState {
    // SAFETY: tests pass sessions created by the fake.
    unsafe { (*(session as *const FakeSession)).state.clone() }
}

/// Override the memory type a value reports.
pub fn set_value_mem_type(value: *mut OrtValue, mem_type: MemType) {
    // SAFETY: tests pass values created by the fake.
    unsafe { (*(value as *mut FakeValue)).mem_type = mem_type }
}

// ============================================================================
// Entry points
// ============================================================================

static FAKE_BASE: ApiBase = ApiBase {
    get_api: fake_get_api,
    get_version_string: fake_get_version_string,
};

pub unsafe extern "C" fn fake_get_api_base() -> *const ApiBase {
    &FAKE_BASE
}

pub unsafe extern "C" fn fake_get_adapter_api(api: *const RuntimeApi) -> *const AdapterApi {
    if api.is_null() {
        return ptr::null();
    }
    &FAKE_ADAPTER
}

unsafe extern "C" fn fake_get_api(version: u32) -> *const RuntimeApi {
    if version == crate::config::SUPPORTED_API_VERSION {
        &FAKE_API
    } else {
        ptr::null()
    }
}

unsafe extern "C" fn fake_get_version_string() -> *const c_char {
    FAKE_VERSION_C.as_ptr() as *const c_char
}

// ============================================================================
// Core table
// ============================================================================

static FAKE_API: RuntimeApi = RuntimeApi {
    get_error_code,
    get_error_message,
    release_status,
    create_env_with_custom_logger,
    release_env,
    create_session_options,
    set_session_graph_optimization_level,
    set_intra_op_num_threads,
    disable_mem_pattern,
    add_free_dimension_override,
    release_session_options,
    release_session,
    create_tensor_as_ort_value,
    get_value_type,
    get_tensor_mutable_data,
    get_tensor_type_and_shape,
    release_value,
    get_tensor_element_type,
    get_dimensions_count,
    get_dimensions,
    get_tensor_shape_element_count,
    release_tensor_type_and_shape_info,
    memory_info_get_name,
    memory_info_get_mem_type,
    release_memory_info,
};

unsafe extern "C" fn get_error_code(status: *const OrtStatus) -> ErrorCode {
    (*(status as *const FakeStatus)).code
}

unsafe extern "C" fn get_error_message(status: *const OrtStatus) -> *const c_char {
    (*(status as *const FakeStatus)).message.as_ptr()
}

unsafe extern "C" fn release_status(status: *mut OrtStatus) {
    Ledger::release("status", status as *mut FakeStatus);
}

unsafe extern "C" fn create_env_with_custom_logger(
    logging_function: LoggingFunction,
    logger_param: *mut c_void,
    level: LoggingLevel,
    logid: *const c_char,
    out: *mut *mut OrtEnv,
) -> OrtStatusPtr {
    enter!("create_env_with_custom_logger");
    let log_id = CStr::from_ptr(logid).to_owned();
    if log_id.as_bytes() == FAIL_ENV_LOG_ID.as_bytes() {
        return status(ORT_FAIL, "environment creation refused");
    }
    *out = Ledger::track(
        "env",
        FakeEnv {
            logger: logging_function,
            param: logger_param,
            level,
            log_id,
        },
    ) as *mut OrtEnv;
    ptr::null_mut()
}

unsafe extern "C" fn release_env(env: *mut OrtEnv) {
    Ledger::record("release_env");
    Ledger::release("env", env as *mut FakeEnv);
}

unsafe extern "C" fn create_session_options(out: *mut *mut OrtSessionOptions) -> OrtStatusPtr {
    enter!("create_session_options");
    *out = Ledger::track("session_options", OptionsState::default()) as *mut OrtSessionOptions;
    ptr::null_mut()
}

unsafe extern "C" fn set_session_graph_optimization_level(
    options: *mut OrtSessionOptions,
    level: GraphOptimizationLevel,
) -> OrtStatusPtr {
    enter!("set_session_graph_optimization_level");
    (*(options as *mut OptionsState)).optimization_level = level;
    ptr::null_mut()
}

unsafe extern "C" fn set_intra_op_num_threads(
    options: *mut OrtSessionOptions,
    threads: c_int,
) -> OrtStatusPtr {
    enter!("set_intra_op_num_threads");
    if threads < 0 {
        return status(ORT_INVALID_ARGUMENT, "negative thread count");
    }
    (*(options as *mut OptionsState)).intra_op_threads = Some(threads);
    ptr::null_mut()
}

unsafe extern "C" fn disable_mem_pattern(options: *mut OrtSessionOptions) -> OrtStatusPtr {
    enter!("disable_mem_pattern");
    (*(options as *mut OptionsState)).mem_pattern = false;
    ptr::null_mut()
}

unsafe extern "C" fn add_free_dimension_override(
    options: *mut OrtSessionOptions,
    denotation: *const c_char,
    value: i64,
) -> OrtStatusPtr {
    enter!("add_free_dimension_override");
    let denotation = CStr::from_ptr(denotation).to_string_lossy().into_owned();
    (*(options as *mut OptionsState))
        .free_dimension_overrides
        .push((denotation, value));
    ptr::null_mut()
}

unsafe extern "C" fn release_session_options(options: *mut OrtSessionOptions) {
    Ledger::record("release_session_options");
    Ledger::release("session_options", options as *mut OptionsState);
}

unsafe extern "C" fn release_session(session: *mut OrtSession) {
    Ledger::record("release_session");
    let fake = session as *mut FakeSession;
    if Ledger::is_live("session", fake as usize) {
        // The purloined model goes with its session.
        Ledger::release("model", (*fake).model);
    }
    Ledger::release("session", fake);
}

unsafe extern "C" fn create_tensor_as_ort_value(
    allocator: *mut OrtAllocator,
    shape: *const i64,
    shape_len: usize,
    element_type: ElementType,
    out: *mut *mut OrtValue,
) -> OrtStatusPtr {
    enter!("create_tensor_as_ort_value");
    let Ok(kind) = TensorKind::try_from(element_type) else {
        return status(ORT_INVALID_ARGUMENT, "unsupported element type");
    };
    if kind == TensorKind::Undefined {
        return status(ORT_INVALID_ARGUMENT, "undefined element type");
    }
    let shape = if shape_len == 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(shape, shape_len).to_vec()
    };
    if shape.iter().any(|&d| d < 0) {
        return status(ORT_INVALID_ARGUMENT, "negative dimension");
    }
    let count: usize = shape.iter().map(|&d| d as usize).product();
    let bytes = count * kind.element_size().unwrap_or(0);
    let dml = (*(allocator as *const FakeAllocator)).dml;

    *out = Ledger::track(
        "value",
        FakeValue {
            element_type,
            shape,
            data: vec![0u8; bytes],
            dml,
            mem_type: MemType::Default,
        },
    ) as *mut OrtValue;
    ptr::null_mut()
}

unsafe extern "C" fn get_value_type(_value: *const OrtValue, out: *mut c_int) -> OrtStatusPtr {
    enter!("get_value_type");
    *out = ValueType::Tensor as c_int;
    ptr::null_mut()
}

unsafe extern "C" fn get_tensor_mutable_data(
    value: *mut OrtValue,
    out: *mut *mut c_void,
) -> OrtStatusPtr {
    enter!("get_tensor_mutable_data");
    *out = (*(value as *mut FakeValue)).data.as_mut_ptr() as *mut c_void;
    ptr::null_mut()
}

unsafe extern "C" fn get_tensor_type_and_shape(
    value: *const OrtValue,
    out: *mut *mut OrtTensorTypeAndShapeInfo,
) -> OrtStatusPtr {
    enter!("get_tensor_type_and_shape");
    let value = &*(value as *const FakeValue);
    *out = Ledger::track(
        "type_info",
        FakeTypeInfo {
            element_type: value.element_type,
            shape: value.shape.clone(),
        },
    ) as *mut OrtTensorTypeAndShapeInfo;
    ptr::null_mut()
}

unsafe extern "C" fn release_value(value: *mut OrtValue) {
    Ledger::record("release_value");
    Ledger::release("value", value as *mut FakeValue);
}

unsafe extern "C" fn get_tensor_element_type(
    info: *const OrtTensorTypeAndShapeInfo,
    out: *mut c_int,
) -> OrtStatusPtr {
    enter!("get_tensor_element_type");
    *out = (*(info as *const FakeTypeInfo)).element_type as c_int;
    ptr::null_mut()
}

unsafe extern "C" fn get_dimensions_count(
    info: *const OrtTensorTypeAndShapeInfo,
    out: *mut usize,
) -> OrtStatusPtr {
    enter!("get_dimensions_count");
    *out = (*(info as *const FakeTypeInfo)).shape.len();
    ptr::null_mut()
}

unsafe extern "C" fn get_dimensions(
    info: *const OrtTensorTypeAndShapeInfo,
    values: *mut i64,
    len: usize,
) -> OrtStatusPtr {
    enter!("get_dimensions");
    let shape = &(*(info as *const FakeTypeInfo)).shape;
    if len < shape.len() {
        return status(ORT_INVALID_ARGUMENT, "dimension buffer too small");
    }
    ptr::copy_nonoverlapping(shape.as_ptr(), values, shape.len());
    ptr::null_mut()
}

unsafe extern "C" fn get_tensor_shape_element_count(
    info: *const OrtTensorTypeAndShapeInfo,
    out: *mut usize,
) -> OrtStatusPtr {
    enter!("get_tensor_shape_element_count");
    *out = (*(info as *const FakeTypeInfo))
        .shape
        .iter()
        .map(|&d| d as usize)
        .product();
    ptr::null_mut()
}

unsafe extern "C" fn release_tensor_type_and_shape_info(info: *mut OrtTensorTypeAndShapeInfo) {
    Ledger::record("release_tensor_type_and_shape_info");
    Ledger::release("type_info", info as *mut FakeTypeInfo);
}

unsafe extern "C" fn memory_info_get_name(
    info: *const OrtMemoryInfo,
    out: *mut *const c_char,
) -> OrtStatusPtr {
    enter!("memory_info_get_name");
    *out = (*(info as *const FakeMemoryInfo)).name.as_ptr();
    ptr::null_mut()
}

unsafe extern "C" fn memory_info_get_mem_type(
    info: *const OrtMemoryInfo,
    out: *mut c_int,
) -> OrtStatusPtr {
    enter!("memory_info_get_mem_type");
    *out = (*(info as *const FakeMemoryInfo)).mem_type as c_int;
    ptr::null_mut()
}

unsafe extern "C" fn release_memory_info(info: *mut OrtMemoryInfo) {
    Ledger::record("release_memory_info");
    Ledger::release("memory_info", info as *mut FakeMemoryInfo);
}

// ============================================================================
// Adapter table
// ============================================================================

static FAKE_ADAPTER: AdapterApi = AdapterApi {
    create_model_from_path,
    create_model_from_data,
    model_get_author,
    model_get_name,
    model_get_domain,
    model_get_description,
    model_get_version,
    model_get_input_count,
    model_get_output_count,
    model_get_input_name,
    model_get_output_name,
    release_model,
    create_session_without_model,
    session_get_execution_provider,
    session_get_execution_providers_count,
    session_initialize,
    session_register_graph_transformers,
    session_register_custom_registry,
    session_load_and_purloin_model,
    session_start_profiling,
    session_end_profiling,
    get_provider_allocator,
    free_provider_allocator,
    get_value_memory_info,
    execution_provider_sync,
    session_options_append_dml,
    dml_flush_context,
    dml_trim_upload_heap,
    dml_release_completed_references,
    dml_set_default_rounding_mode,
    dml_get_d3d12_resource_from_allocation,
    create_custom_registry,
    release_custom_registry,
};

fn fake_model(name: &str) -> FakeModel {
    FakeModel {
        author: FAKE_MODEL_AUTHOR.to_string(),
        name: name.to_string(),
        domain: "ai.onnx".to_string(),
        description: format!("fake {name} model"),
        version: 7,
        inputs: vec!["data_0".to_string()],
        outputs: vec!["softmaxout_1".to_string()],
    }
}

unsafe extern "C" fn create_model_from_path(
    path: *const c_char,
    len: usize,
    out: *mut *mut OrtModel,
) -> OrtStatusPtr {
    enter!("create_model_from_path");
    let bytes = std::slice::from_raw_parts(path as *const u8, len);
    let path = String::from_utf8_lossy(bytes).into_owned();
    let stem = Path::new(&path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if stem == "missing" {
        return status(ORT_NO_SUCHFILE, &format!("{path} does not exist"));
    }
    *out = Ledger::track("model", fake_model(&stem)) as *mut OrtModel;
    ptr::null_mut()
}

unsafe extern "C" fn create_model_from_data(
    data: *const c_void,
    size: usize,
    out: *mut *mut OrtModel,
) -> OrtStatusPtr {
    enter!("create_model_from_data");
    let bytes = std::slice::from_raw_parts(data as *const u8, size);
    if bytes == CORRUPT_MODEL_BYTES {
        return status(ORT_INVALID_PROTOBUF, "failed to parse model");
    }
    let name = String::from_utf8_lossy(bytes).into_owned();
    *out = Ledger::track("model", fake_model(&name)) as *mut OrtModel;
    ptr::null_mut()
}

unsafe fn write_str(text: &str, out: *mut *const c_char, len: *mut usize) -> OrtStatusPtr {
    *out = text.as_ptr() as *const c_char;
    *len = text.len();
    ptr::null_mut()
}

unsafe extern "C" fn model_get_author(
    model: *const OrtModel,
    out: *mut *const c_char,
    len: *mut usize,
) -> OrtStatusPtr {
    enter!("model_get_author");
    write_str(&(*(model as *const FakeModel)).author, out, len)
}

unsafe extern "C" fn model_get_name(
    model: *const OrtModel,
    out: *mut *const c_char,
    len: *mut usize,
) -> OrtStatusPtr {
    enter!("model_get_name");
    write_str(&(*(model as *const FakeModel)).name, out, len)
}

unsafe extern "C" fn model_get_domain(
    model: *const OrtModel,
    out: *mut *const c_char,
    len: *mut usize,
) -> OrtStatusPtr {
    enter!("model_get_domain");
    write_str(&(*(model as *const FakeModel)).domain, out, len)
}

unsafe extern "C" fn model_get_description(
    model: *const OrtModel,
    out: *mut *const c_char,
    len: *mut usize,
) -> OrtStatusPtr {
    enter!("model_get_description");
    write_str(&(*(model as *const FakeModel)).description, out, len)
}

unsafe extern "C" fn model_get_version(model: *const OrtModel, out: *mut i64) -> OrtStatusPtr {
    enter!("model_get_version");
    *out = (*(model as *const FakeModel)).version;
    ptr::null_mut()
}

unsafe extern "C" fn model_get_input_count(model: *const OrtModel, out: *mut usize) -> OrtStatusPtr {
    enter!("model_get_input_count");
    *out = (*(model as *const FakeModel)).inputs.len();
    ptr::null_mut()
}

unsafe extern "C" fn model_get_output_count(
    model: *const OrtModel,
    out: *mut usize,
) -> OrtStatusPtr {
    enter!("model_get_output_count");
    *out = (*(model as *const FakeModel)).outputs.len();
    ptr::null_mut()
}

unsafe extern "C" fn model_get_input_name(
    model: *const OrtModel,
    index: usize,
    out: *mut *const c_char,
    len: *mut usize,
) -> OrtStatusPtr {
    enter!("model_get_input_name");
    match (&(*(model as *const FakeModel)).inputs).get(index) {
        Some(name) => write_str(name, out, len),
        None => status(ORT_INVALID_ARGUMENT, "input index out of range"),
    }
}

unsafe extern "C" fn model_get_output_name(
    model: *const OrtModel,
    index: usize,
    out: *mut *const c_char,
    len: *mut usize,
) -> OrtStatusPtr {
    enter!("model_get_output_name");
    match (&(*(model as *const FakeModel)).outputs).get(index) {
        Some(name) => write_str(name, out, len),
        None => status(ORT_INVALID_ARGUMENT, "output index out of range"),
    }
}

unsafe extern "C" fn release_model(model: *mut OrtModel) {
    Ledger::record("release_model");
    Ledger::release("model", model as *mut FakeModel);
}

unsafe extern "C" fn create_session_without_model(
    env: *mut OrtEnv,
    options: *const OrtSessionOptions,
    out: *mut *mut OrtSession,
) -> OrtStatusPtr {
    enter!("create_session_without_model");
    if env.is_null() {
        return status(ORT_INVALID_ARGUMENT, "environment is null");
    }
    let options = &*(options as *const OptionsState);
    let mut providers = Vec::new();
    if options.dml.is_some() {
        providers.push(Box::new(FakeProvider { dml: true }));
    }
    providers.push(Box::new(FakeProvider { dml: false }));

    *out = Ledger::track(
        "session",
        FakeSession {
            providers,
            model: ptr::null_mut(),
            state: SessionState {
                free_dimension_overrides: options.free_dimension_overrides.clone(),
                ..SessionState::default()
            },
        },
    ) as *mut OrtSession;
    ptr::null_mut()
}

unsafe fn session<'a>(session: *mut OrtSession) -> &'a mut FakeSession {
    &mut *(session as *mut FakeSession)
}

unsafe fn provider<'a>(provider: *mut OrtExecutionProvider) -> &'a FakeProvider {
    &*(provider as *const FakeProvider)
}

unsafe extern "C" fn session_get_execution_provider(
    fake: *mut OrtSession,
    index: usize,
    out: *mut *mut OrtExecutionProvider,
) -> OrtStatusPtr {
    enter!("session_get_execution_provider");
    match session(fake).providers.get_mut(index) {
        Some(provider) => {
            *out = &mut **provider as *mut FakeProvider as *mut OrtExecutionProvider;
            ptr::null_mut()
        }
        None => status(ORT_INVALID_ARGUMENT, "provider index out of range"),
    }
}

unsafe extern "C" fn session_get_execution_providers_count(
    fake: *mut OrtSession,
    out: *mut usize,
) -> OrtStatusPtr {
    enter!("session_get_execution_providers_count");
    *out = session(fake).providers.len();
    ptr::null_mut()
}

unsafe extern "C" fn session_initialize(fake: *mut OrtSession) -> OrtStatusPtr {
    enter!("session_initialize");
    Ledger::event("session_initialize".into());
    session(fake).state.initialized = true;
    ptr::null_mut()
}

unsafe extern "C" fn session_register_graph_transformers(fake: *mut OrtSession) -> OrtStatusPtr {
    enter!("session_register_graph_transformers");
    Ledger::event("session_register_graph_transformers".into());
    session(fake).state.graph_transformers = true;
    ptr::null_mut()
}

unsafe extern "C" fn session_register_custom_registry(
    fake: *mut OrtSession,
    registry: *mut OperatorRegistry,
) -> OrtStatusPtr {
    enter!("session_register_custom_registry");
    if !Ledger::is_live("registry", registry as usize) {
        return status(ORT_INVALID_ARGUMENT, "unknown registry");
    }
    Ledger::event("session_register_custom_registry".into());
    session(fake).state.custom_registries += 1;
    ptr::null_mut()
}

unsafe extern "C" fn session_load_and_purloin_model(
    fake: *mut OrtSession,
    model: *mut OrtModel,
) -> OrtStatusPtr {
    enter!("session_load_and_purloin_model");
    let session = session(fake);
    if !session.model.is_null() {
        return status(ORT_MODEL_LOADED, "session already has a model");
    }
    let model = model as *mut FakeModel;
    if (*model).name == "unsupported" {
        return status(ORT_INVALID_GRAPH, "graph uses unsupported operators");
    }
    Ledger::event(format!("session_load_and_purloin_model({})", (*model).name));
    session.model = model;
    session.state.model = Some((*model).name.clone());
    ptr::null_mut()
}

unsafe extern "C" fn session_start_profiling(
    env: *mut OrtEnv,
    fake: *mut OrtSession,
) -> OrtStatusPtr {
    enter!("session_start_profiling");
    if env.is_null() {
        return status(ORT_INVALID_ARGUMENT, "environment is null");
    }
    Ledger::event("session_start_profiling".into());
    session(fake).state.profiling = true;
    ptr::null_mut()
}

unsafe extern "C" fn session_end_profiling(fake: *mut OrtSession) -> OrtStatusPtr {
    enter!("session_end_profiling");
    Ledger::event("session_end_profiling".into());
    session(fake).state.profiling = false;
    ptr::null_mut()
}

unsafe extern "C" fn get_provider_allocator(
    fake: *mut OrtExecutionProvider,
    out: *mut *mut OrtAllocator,
) -> OrtStatusPtr {
    enter!("get_provider_allocator");
    let dml = provider(fake).dml;
    *out = Ledger::track("allocator", FakeAllocator { dml }) as *mut OrtAllocator;
    ptr::null_mut()
}

unsafe extern "C" fn free_provider_allocator(allocator: *mut OrtAllocator) {
    Ledger::record("free_provider_allocator");
    Ledger::release("allocator", allocator as *mut FakeAllocator);
}

unsafe extern "C" fn get_value_memory_info(
    value: *const OrtValue,
    out: *mut *mut OrtMemoryInfo,
) -> OrtStatusPtr {
    enter!("get_value_memory_info");
    let value = &*(value as *const FakeValue);
    let name = if value.dml { DML_MEMORY_NAME } else { CPU_MEMORY_NAME };
    *out = Ledger::track(
        "memory_info",
        FakeMemoryInfo {
            name: CString::new(name).unwrap_or_default(),
            mem_type: value.mem_type,
        },
    ) as *mut OrtMemoryInfo;
    ptr::null_mut()
}

unsafe extern "C" fn execution_provider_sync(fake: *mut OrtExecutionProvider) -> OrtStatusPtr {
    enter!("execution_provider_sync");
    let _ = provider(fake);
    Ledger::event("execution_provider_sync".into());
    ptr::null_mut()
}

unsafe extern "C" fn session_options_append_dml(
    options: *mut OrtSessionOptions,
    device: *mut c_void,
    queue: *mut c_void,
    metacommands_enabled: c_int,
) -> OrtStatusPtr {
    enter!("session_options_append_dml");
    if device.is_null() || queue.is_null() {
        return status(ORT_INVALID_ARGUMENT, "device and queue are required");
    }
    (*(options as *mut OptionsState)).dml =
        Some((device as usize, queue as usize, metacommands_enabled != 0));
    ptr::null_mut()
}

unsafe fn dml_call(fake: *mut OrtExecutionProvider, event: String) -> OrtStatusPtr {
    if !provider(fake).dml {
        return status(ORT_INVALID_ARGUMENT, "not a DirectML provider");
    }
    Ledger::event(event);
    ptr::null_mut()
}

unsafe extern "C" fn dml_flush_context(fake: *mut OrtExecutionProvider) -> OrtStatusPtr {
    enter!("dml_flush_context");
    dml_call(fake, "dml_flush_context".into())
}

unsafe extern "C" fn dml_trim_upload_heap(fake: *mut OrtExecutionProvider) -> OrtStatusPtr {
    enter!("dml_trim_upload_heap");
    dml_call(fake, "dml_trim_upload_heap".into())
}

unsafe extern "C" fn dml_release_completed_references(
    fake: *mut OrtExecutionProvider,
) -> OrtStatusPtr {
    enter!("dml_release_completed_references");
    dml_call(fake, "dml_release_completed_references".into())
}

unsafe extern "C" fn dml_set_default_rounding_mode(
    fake: *mut OrtExecutionProvider,
    enabled: c_int,
) -> OrtStatusPtr {
    enter!("dml_set_default_rounding_mode");
    dml_call(fake, format!("dml_set_default_rounding_mode({enabled})"))
}

/// Allocations double as their own D3D12 resource.
unsafe extern "C" fn dml_get_d3d12_resource_from_allocation(
    fake: *mut OrtExecutionProvider,
    allocation: *mut c_void,
    out: *mut *mut c_void,
) -> OrtStatusPtr {
    enter!("dml_get_d3d12_resource_from_allocation");
    if !provider(fake).dml {
        return status(ORT_INVALID_ARGUMENT, "not a DirectML provider");
    }
    *out = allocation;
    ptr::null_mut()
}

unsafe extern "C" fn create_custom_registry(out: *mut *mut OperatorRegistry) -> OrtStatusPtr {
    enter!("create_custom_registry");
    *out = Ledger::track("registry", FakeRegistry) as *mut OperatorRegistry;
    ptr::null_mut()
}

unsafe extern "C" fn release_custom_registry(registry: *mut OperatorRegistry) {
    Ledger::record("release_custom_registry");
    Ledger::release("registry", registry as *mut FakeRegistry);
}
