//! Error types for wgreduce

use crate::dtype::ScalarType;
use thiserror::Error;

/// Result type alias using wgreduce's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while generating, building or running a reduction
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration value is missing or violates an invariant.
    ///
    /// Raised before any device work and never retried.
    #[error("Invalid configuration '{field}': {reason}")]
    Configuration {
        /// The offending field
        field: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Scalar type not supported by an operation
    #[error("Unsupported scalar type {ty:?} for operation '{op}'")]
    UnsupportedType {
        /// The unsupported type
        ty: ScalarType,
        /// The operation name
        op: &'static str,
    },

    /// Scalar type of a Rust value does not match the session's element type
    #[error("Scalar type mismatch: expected {expected:?}, got {got:?}")]
    TypeMismatch {
        /// Element type the session was built for
        expected: ScalarType,
        /// Element type requested by the caller
        got: ScalarType,
    },

    /// The linker or shader compiler rejected the generated module.
    ///
    /// The message is the compiler's own diagnostic, unmodified.
    #[error("Shader compilation failed: {0}")]
    Compilation(String),

    /// The device became unusable; cached pipelines and sessions are invalid
    #[error("Device lost: {0}")]
    DeviceLost(String),

    /// No suitable GPU adapter found
    #[error("No suitable WebGPU adapter found")]
    NoAdapter,

    /// Device request failed
    #[error("WebGPU device error: {0}")]
    Device(String),

    /// Backend-specific error (buffer mapping, polling)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Backend limitation - operation valid but exceeds backend capabilities
    #[error("{backend} limitation: {operation} - {reason}")]
    BackendLimitation {
        /// The backend that has the limitation
        backend: &'static str,
        /// The operation being attempted
        operation: &'static str,
        /// Description of the limitation
        reason: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field,
            reason: reason.into(),
        }
    }

    /// Create a missing-field configuration error
    pub fn missing_field(field: &'static str) -> Self {
        Self::Configuration {
            field,
            reason: "required field is not set".to_string(),
        }
    }

    /// Create an unsupported type error
    pub fn unsupported_type(ty: ScalarType, op: &'static str) -> Self {
        Self::UnsupportedType { ty, op }
    }

    /// Create a backend limitation error
    pub fn backend_limitation(
        backend: &'static str,
        operation: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::BackendLimitation {
            backend,
            operation,
            reason: reason.into(),
        }
    }

    /// Whether the error leaves the device unusable
    pub fn is_device_lost(&self) -> bool {
        matches!(self, Self::DeviceLost(_))
    }
}
