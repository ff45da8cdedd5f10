//! Error types for scry.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`AbiError`]: Failures at the guest memory boundary
//! - [`RuntimeError`]: Engine, module and guest-call failures
//! - [`StoreError`]: Board persistence failures
//! - [`ScryError`]: The service-level taxonomy surfaced to callers

use std::io;

use thiserror::Error;

/// Errors raised while marshalling data across the guest boundary.
#[derive(Error, Debug, Clone)]
pub enum AbiError {
    /// A guest pointer/length pair falls outside the current linear memory.
    #[error("Guest memory access out of bounds: offset {offset}, length {len}, memory size {memory_size}")]
    OutOfBounds {
        /// Start offset requested.
        offset: usize,
        /// Number of bytes requested.
        len: usize,
        /// Size of the guest memory at the time of the access.
        memory_size: usize,
    },

    /// Bytes copied out of the guest were not valid UTF-8.
    #[error("Guest string at offset {offset} is not valid UTF-8: {reason}")]
    InvalidUtf8 {
        /// Start offset of the string.
        offset: usize,
        /// Decoder error description.
        reason: String,
    },

    /// The guest allocator returned a null or unusable pointer.
    #[error("Guest allocation of {size} bytes failed")]
    AllocationFailed {
        /// Requested allocation size.
        size: usize,
    },

    /// A host value is too large to be addressed by a 32-bit guest.
    #[error("Value of {len} bytes does not fit in guest address space")]
    LengthOverflow {
        /// Length of the value.
        len: usize,
    },

    /// The guest instance does not export a linear memory.
    #[error("Guest does not export a linear memory")]
    MissingMemory,

    /// A reference-table index that was never allocated or already dropped.
    #[error("Invalid reference table slot: {index}")]
    InvalidReference {
        /// The offending slot index.
        index: u32,
    },
}

/// Engine, module and guest-call errors.
///
/// These errors represent failures during the lifecycle of the evaluator
/// module, from compilation to a single guest call.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// WebAssembly compilation or instantiation failed.
    #[error("Compilation failed: {reason}")]
    CompilationFailed {
        /// Description of the compilation failure.
        reason: String,
    },

    /// The evaluator module lacks an export the host requires.
    #[error("Evaluator module is missing required export '{name}'")]
    MissingExport {
        /// Name of the missing export.
        name: String,
    },

    /// Execution exceeded the configured wall-clock deadline.
    #[error("Execution timeout after {duration_ms}ms")]
    ExecutionTimeout {
        /// The timeout duration in milliseconds.
        duration_ms: u64,
    },

    /// Execution exhausted the configured fuel limit.
    #[error("Fuel exhausted: CPU limit exceeded")]
    FuelExhausted,

    /// The guest threw a value through the reference table.
    #[error("Guest threw: {message}")]
    GuestThrow {
        /// Message recovered from the thrown value.
        message: String,
    },

    /// A WebAssembly trap occurred during execution.
    #[error("Wasm trap: {message}")]
    Trap {
        /// Description of the trap.
        message: String,
    },

    /// Marshalling data across the boundary failed.
    #[error("ABI error: {0}")]
    Abi(#[from] AbiError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

impl RuntimeError {
    /// Create a new `CompilationFailed` error.
    pub fn compilation_failed(reason: impl Into<String>) -> Self {
        Self::CompilationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `MissingExport` error.
    pub fn missing_export(name: impl Into<String>) -> Self {
        Self::MissingExport { name: name.into() }
    }

    /// Create a new `Trap` error.
    pub fn trap(message: impl Into<String>) -> Self {
        Self::Trap {
            message: message.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error indicates a resource limit was exceeded.
    pub fn is_resource_limit(&self) -> bool {
        matches!(self, Self::FuelExhausted | Self::ExecutionTimeout { .. })
    }

    /// Returns `true` if the guest itself failed (as opposed to the host).
    pub fn is_guest_fault(&self) -> bool {
        matches!(
            self,
            Self::GuestThrow { .. } | Self::Trap { .. } | Self::FuelExhausted | Self::ExecutionTimeout { .. }
        )
    }
}

/// Board persistence errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A board with this name already exists.
    #[error("Board already exists: {name}")]
    Conflict {
        /// The conflicting board name.
        name: String,
    },

    /// No board with this name exists.
    #[error("Board not found: {name}")]
    NotFound {
        /// The missing board name.
        name: String,
    },

    /// The backing store failed.
    #[error("Store backend error: {reason}")]
    Backend {
        /// Description of the backend failure.
        reason: String,
    },
}

impl StoreError {
    /// Create a new `Backend` error.
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// Service-level errors surfaced to callers.
#[derive(Error, Debug)]
pub enum ScryError {
    /// Caller input was rejected before any evaluator call or store access.
    #[error("{reason}")]
    Validation {
        /// Human-readable rejection reason.
        reason: String,
    },

    /// The guest reported a fault. Nothing was committed.
    #[error("{message}")]
    GuestExecution {
        /// Message reported by the guest, verbatim.
        message: String,
        /// Output captured before the fault.
        output: String,
    },

    /// Bytes coming back from the guest could not be decoded.
    #[error("Decode error: {reason}")]
    Decode {
        /// Description of the decoding failure.
        reason: String,
    },

    /// Internal failure, such as a malformed guest response.
    #[error("Internal error: {reason}")]
    Internal {
        /// Description of the failure (logged, never shown to callers).
        reason: String,
    },

    /// Persistence failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Requested raster dimensions exceed the ceiling.
    #[error("Dimensions {width}x{height} exceed maximum {max}x{max}")]
    TooLarge {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Inclusive per-axis ceiling.
        max: u32,
    },

    /// Unknown share identifier or absent artifact.
    #[error("Not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// Missing or invalid credential.
    #[error("Unauthorized: {reason}")]
    Unauthorized {
        /// Why the credential was rejected.
        reason: &'static str,
    },
}

impl ScryError {
    /// Create a new `Validation` error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Create a new `Internal` error.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Create a new `NotFound` error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Returns `true` for errors the caller can correct.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::GuestExecution { .. }
                | Self::TooLarge { .. }
                | Self::NotFound { .. }
                | Self::Unauthorized { .. }
        )
    }

    /// Message safe to show to a caller.
    ///
    /// Internal details (decode, store and internal failures) collapse to a
    /// generic message; they are logged where they occur.
    pub fn public_message(&self) -> String {
        match self {
            Self::Decode { .. } | Self::Internal { .. } | Self::Store(_) => {
                "Internal error while processing the request".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<RuntimeError> for ScryError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::GuestThrow { message } | RuntimeError::Trap { message } => {
                Self::GuestExecution {
                    message,
                    output: String::new(),
                }
            }
            RuntimeError::FuelExhausted | RuntimeError::ExecutionTimeout { .. } => {
                Self::GuestExecution {
                    message: err.to_string(),
                    output: String::new(),
                }
            }
            RuntimeError::Abi(abi @ AbiError::InvalidUtf8 { .. }) => Self::Decode {
                reason: abi.to_string(),
            },
            other => Self::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RuntimeError::missing_export("execute");
        assert_eq!(
            err.to_string(),
            "Evaluator module is missing required export 'execute'"
        );

        let err = RuntimeError::FuelExhausted;
        assert_eq!(err.to_string(), "Fuel exhausted: CPU limit exceeded");

        let err = ScryError::TooLarge {
            width: 5000,
            height: 100,
            max: 4096,
        };
        assert_eq!(err.to_string(), "Dimensions 5000x100 exceed maximum 4096x4096");
    }

    #[test]
    fn test_error_from_abi() {
        let abi = AbiError::MissingMemory;
        let runtime_err: RuntimeError = abi.into();

        assert!(matches!(runtime_err, RuntimeError::Abi(_)));
    }

    #[test]
    fn test_is_resource_limit() {
        assert!(RuntimeError::FuelExhausted.is_resource_limit());
        assert!(RuntimeError::ExecutionTimeout { duration_ms: 100 }.is_resource_limit());
        assert!(!RuntimeError::trap("unreachable").is_resource_limit());
    }

    #[test]
    fn test_guest_throw_becomes_guest_execution() {
        let err: ScryError = RuntimeError::GuestThrow {
            message: "boom".into(),
        }
        .into();

        match err {
            ScryError::GuestExecution { message, output } => {
                assert_eq!(message, "boom");
                assert!(output.is_empty());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_utf8_becomes_decode() {
        let err: ScryError = RuntimeError::Abi(AbiError::InvalidUtf8 {
            offset: 16,
            reason: "invalid utf-8 sequence".into(),
        })
        .into();

        assert!(matches!(err, ScryError::Decode { .. }));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_public_message_hides_internals() {
        let err = ScryError::Store(StoreError::backend("connection refused to 10.0.0.5"));
        assert!(!err.public_message().contains("10.0.0.5"));

        let err = ScryError::validation("Board name cannot be empty");
        assert_eq!(err.public_message(), "Board name cannot be empty");
    }
}
