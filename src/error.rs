//! Error type for all adapter operations.
//!
//! Native failures are not classified further: every non-null status becomes
//! [`OrtError::Runtime`] carrying the operation name, the runtime's code and
//! its message.

use std::path::PathBuf;

use thiserror::Error;

use crate::ffi::{ElementType, ErrorCode};

/// Result type alias for adapter operations.
pub type OrtResult<T> = Result<T, OrtError>;

#[derive(Error, Debug)]
pub enum OrtError {
    // ========== Wrapped runtime ==========
    /// The wrapped runtime reported a failure.
    #[error("runtime error {code} in {operation}: {message}")]
    Runtime {
        operation: &'static str,
        code: ErrorCode,
        message: String,
    },

    /// The operation exists in the engine abstraction but this adapter does
    /// not provide it.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// The runtime reported success but handed back a null handle.
    #[error("runtime returned a null handle from {0}")]
    NullHandle(&'static str),

    // ========== Library loading ==========
    #[error("failed to load runtime library {path}: {source}")]
    LibraryLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("runtime library {path} does not export {symbol}")]
    MissingSymbol {
        path: PathBuf,
        symbol: String,
        #[source]
        source: libloading::Error,
    },

    #[error("runtime does not support API version {0}")]
    UnsupportedApiVersion(u32),

    // ========== Caller input ==========
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("element type {0:?} has no tensor kind")]
    UnsupportedElementType(ElementType),

    // ========== Configuration ==========
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OrtError {
    /// True for failures reported by the wrapped runtime itself.
    pub fn is_runtime(&self) -> bool {
        matches!(self, OrtError::Runtime { .. })
    }

    /// True when the operation is deliberately unavailable.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, OrtError::NotImplemented(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_display() {
        let err = OrtError::Runtime {
            operation: "create_model_from_path",
            code: crate::ffi::ORT_NO_SUCHFILE,
            message: "file not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "runtime error 3 in create_model_from_path: file not found"
        );
        assert!(err.is_runtime());
        assert!(!err.is_not_implemented());
    }

    #[test]
    fn test_not_implemented_display() {
        let err = OrtError::NotImplemented("is_of_map_type");
        assert_eq!(err.to_string(), "is_of_map_type is not implemented");
        assert!(err.is_not_implemented());
    }

    #[test]
    fn test_config_parse_from_toml() {
        let parse: Result<toml::Value, _> = toml::from_str("= broken");
        let err: OrtError = parse.unwrap_err().into();
        assert!(matches!(err, OrtError::ConfigParse(_)));
    }
}
