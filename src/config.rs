//! Runtime configuration.
//!
//! Loaded from TOML, optionally overridden from the environment.
//!
//! ```toml
//! library_path = "/opt/alice-ort/lib/libalice_ort.so"
//! log_level = "info"
//!
//! [session]
//! graph_optimization_level = "enable_basic"
//! intra_op_threads = 4
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OrtError, OrtResult};
use crate::ffi::{GraphOptimizationLevel, LoggingLevel};

/// Only table version the adapter understands.
pub const SUPPORTED_API_VERSION: u32 = 1;

pub const ENV_LIBRARY: &str = "ALICE_ORT_LIBRARY";
pub const ENV_LOG_LEVEL: &str = "ALICE_ORT_LOG_LEVEL";
pub const ENV_DEBUG_OUTPUT: &str = "ALICE_ORT_DEBUG_OUTPUT";

#[cfg(target_os = "windows")]
const DEFAULT_LIBRARY: &str = "alice_ort.dll";
#[cfg(target_os = "macos")]
const DEFAULT_LIBRARY: &str = "libalice_ort.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const DEFAULT_LIBRARY: &str = "libalice_ort.so";

/// Top-level configuration for loading the runtime and creating engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Shared library exporting the function tables.
    pub library_path: PathBuf,
    /// Requested table version.
    pub api_version: u32,
    /// Identifier the runtime attaches to its log messages.
    pub log_id: String,
    /// Minimum severity the runtime emits.
    pub log_level: LoggingLevel,
    /// Forward verbose and info runtime messages.
    pub debug_output: bool,
    pub session: SessionConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            library_path: PathBuf::from(DEFAULT_LIBRARY),
            api_version: SUPPORTED_API_VERSION,
            log_id: "alice-ort".to_string(),
            log_level: LoggingLevel::Warning,
            debug_output: false,
            session: SessionConfig::default(),
        }
    }
}

/// Session creation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Optimisation level for CPU sessions.
    pub graph_optimization_level: GraphOptimizationLevel,
    /// Optimisation level for DirectML sessions.
    pub dml_graph_optimization_level: GraphOptimizationLevel,
    /// Intra-op thread count for CPU sessions. `None` lets the runtime pick.
    pub intra_op_threads: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            graph_optimization_level: GraphOptimizationLevel::EnableAll,
            dml_graph_optimization_level: GraphOptimizationLevel::DisableAll,
            intra_op_threads: None,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> OrtResult<Self> {
        let config: RuntimeConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> OrtResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| OrtError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Apply `ALICE_ORT_*` environment overrides.
    pub fn with_env_overrides(self) -> OrtResult<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (environment in production).
    pub fn with_overrides_from<F>(mut self, lookup: F) -> OrtResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_LIBRARY) {
            self.library_path = PathBuf::from(path);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = parse_log_level(&level)?;
        }
        if let Some(flag) = lookup(ENV_DEBUG_OUTPUT) {
            self.debug_output = parse_flag(&flag)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> OrtResult<()> {
        if self.api_version != SUPPORTED_API_VERSION {
            return Err(OrtError::InvalidConfig(format!(
                "api_version must be {SUPPORTED_API_VERSION}, got {}",
                self.api_version
            )));
        }
        if self.library_path.as_os_str().is_empty() {
            return Err(OrtError::InvalidConfig(
                "library_path cannot be empty".to_string(),
            ));
        }
        if self.log_id.contains('\0') {
            return Err(OrtError::InvalidConfig(
                "log_id cannot contain NUL bytes".to_string(),
            ));
        }
        if self.session.intra_op_threads == Some(0) {
            return Err(OrtError::InvalidConfig(
                "session.intra_op_threads must be at least 1".to_string(),
            ));
        }
        if let Some(threads) = self.session.intra_op_threads {
            if threads > i32::MAX as u32 {
                return Err(OrtError::InvalidConfig(format!(
                    "session.intra_op_threads {threads} is out of range"
                )));
            }
        }
        Ok(())
    }
}

fn parse_log_level(value: &str) -> OrtResult<LoggingLevel> {
    match value.trim().to_ascii_lowercase().as_str() {
        "verbose" => Ok(LoggingLevel::Verbose),
        "info" => Ok(LoggingLevel::Info),
        "warning" | "warn" => Ok(LoggingLevel::Warning),
        "error" => Ok(LoggingLevel::Error),
        "fatal" => Ok(LoggingLevel::Fatal),
        other => Err(OrtError::InvalidConfig(format!(
            "{ENV_LOG_LEVEL}: unknown level '{other}'"
        ))),
    }
}

fn parse_flag(value: &str) -> OrtResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(OrtError::InvalidConfig(format!(
            "{ENV_DEBUG_OUTPUT}: expected a boolean, got '{other}'"
        ))),
    }
}
