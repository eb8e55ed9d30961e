//! ALICE-ORT: Engine Adapter over the ONNX Runtime C Function Tables
//!
//! > "The runtime owns the graph. We own the handles."
//!
//! A safe engine layer over a native inference runtime that is reached only
//! through two C function tables:
//! - **Core table**: environment, session options, values, tensor shapes, memory info
//! - **Adapter table**: models, sessions, execution providers, DirectML controls
//! - **Ownership**: every native handle is released exactly once, in dependency order
//! - **Errors**: every non-null status becomes an [`OrtError::Runtime`]
//!
//! # Execution Providers
//!
//! ```text
//! CPU session:       [ CPU ]                       provider count = 1
//! DirectML session:  [ DirectML ] [ CPU fallback ] provider count = 2
//!
//! Provider 0 receives every flush/trim/sync call and hands out allocators.
//! ```
//!
//! # Example
//!
//! ```no_run
//! use alice_ort::prelude::*;
//!
//! // 1. Load the runtime (library path from config or ALICE_ORT_LIBRARY)
//! let factory = OnnxEngineFactory::from_env().unwrap();
//!
//! // 2. Load a model
//! let model = factory.create_model_from_path("squeezenet.onnx").unwrap();
//!
//! // 3. Build a CPU engine with a fixed batch size
//! let engine = factory
//!     .create_engine_builder()
//!     .set_batch_size_override(1)
//!     .create_engine()
//!     .unwrap();
//!
//! // 4. Hand the model to the session and prepare the graph
//! engine.load_model(model).unwrap();
//! engine.initialize().unwrap();
//!
//! // 5. Allocate an input on the engine's provider
//! let mut input = engine
//!     .create_tensor_value(&[1, 3, 224, 224], TensorKind::Float)
//!     .unwrap();
//! input.copy_from_slice(&vec![0.5f32; 3 * 224 * 224]).unwrap();
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          ALICE-ORT                                  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  ┌──────────────────┐   ┌────────────────────┐   ┌──────────────┐  │
//! │  │ OnnxEngineFactory│──▶│ OnnxEngineBuilder  │──▶│ OnnxEngine   │  │
//! │  │ (runtime + env)  │   │ (CPU / DirectML)   │   │ (session)    │  │
//! │  └──────────────────┘   └────────────────────┘   └──────────────┘  │
//! │       │        │                  │                     │           │
//! │       ▼        ▼                  ▼                     ▼           │
//! │  ┌─────────┐ ┌───────────┐ ┌────────────────┐  ┌──────────────┐    │
//! │  │OnnxModel│ │Environment│ │ SessionBuilder │  │ OnnxValue    │    │
//! │  │(purloin)│ │(shared,   │ │ options, init, │  │ value +      │    │
//! │  │         │ │ logging)  │ │ rounding mode  │  │ allocator    │    │
//! │  └─────────┘ └───────────┘ └────────────────┘  └──────────────┘    │
//! │                          │                                          │
//! │                          ▼                                          │
//! │  ┌───────────────────────────────────────────────────────────┐     │
//! │  │            Runtime (libloading, two function tables)       │     │
//! │  │  RuntimeApi: status, env, options, values, shapes, memory  │     │
//! │  │  AdapterApi: models, sessions, providers, DirectML         │     │
//! │  └───────────────────────────────────────────────────────────┘     │
//! │                                                                     │
//! │  Release order: value → allocator → session → env → library         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod engine;
pub mod engine_builder;
pub mod environment;
pub mod error;
pub mod factory;
pub mod ffi;
pub mod handle;
pub mod kind;
pub mod model;
pub mod registry;
pub mod runtime;
pub mod session_builder;
pub mod value;

#[cfg(any(test, feature = "test-runtime"))]
pub mod testing;

// ============================================================================
// Core Re-exports
// ============================================================================

pub use api::{Engine, EngineBuilder, EngineFactory, Model, Value};
pub use config::{RuntimeConfig, SessionConfig};
pub use engine::OnnxEngine;
pub use engine_builder::OnnxEngineBuilder;
pub use environment::Environment;
pub use error::{OrtError, OrtResult};
pub use factory::OnnxEngineFactory;
pub use ffi::{GraphOptimizationLevel, LoggingLevel};
pub use kind::{TensorElement, TensorKind};
pub use model::{ModelMetadata, OnnxModel};
pub use registry::CustomRegistry;
pub use runtime::Runtime;
pub use session_builder::{DeviceResources, ProviderKind};
pub use value::{OnnxValue, Resource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Prelude
// ============================================================================

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::DeviceResources;
    pub use crate::OnnxEngine;
    pub use crate::OnnxEngineFactory;
    pub use crate::OnnxValue;
    pub use crate::RuntimeConfig;
    pub use crate::TensorKind;
    pub use crate::{OrtError, OrtResult};
}

// ============================================================================
// Tests
// ============================================================================
