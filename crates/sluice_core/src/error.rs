//! Recoverable error taxonomy for the marshaller.
//!
//! Every variant here is surfaced to the caller as a typed failure after the
//! call has released all of its sandbox buffers. Sandbox traps are not part
//! of this enum; they are fatal and handled by `sluice_wasm::SandboxFault`.

use thiserror::Error;

/// Result type used across the SLUICE crates
pub type SluiceResult<T> = Result<T, SluiceError>;

/// Recoverable marshalling errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SluiceError {
    /// A required argument was absent
    #[error("{call}: {argument} cannot be null or undefined")]
    MissingArgument {
        /// Call being marshalled
        call: String,
        /// Argument name from the call contract
        argument: String,
    },

    /// Argument type is not accepted for this parameter
    #[error("{call}: unsupported input type for {argument}, expected {expected}")]
    UnsupportedType {
        /// Call being marshalled
        call: String,
        /// Argument name from the call contract
        argument: String,
        /// Accepted host types
        expected: &'static str,
    },

    /// Byte length does not satisfy the declared length rule
    #[error("{context} expected {expected} but got length {actual}")]
    LengthMismatch {
        /// Call and argument, or buffer, whose length was checked
        context: String,
        /// Human readable length rule, e.g. `32-byte key`
        expected: String,
        /// Observed length
        actual: usize,
    },

    /// Malformed hex, base64 or UTF-8 text
    #[error("malformed {format} data: {reason}")]
    Format {
        /// Codec that rejected the input
        format: &'static str,
        /// What was wrong
        reason: String,
    },

    /// The sandbox heap could not satisfy an allocation
    #[error("sandbox malloc() failed for {requested} bytes")]
    Allocation {
        /// Requested size in bytes
        requested: usize,
    },

    /// The primitive returned a non-zero status
    #[error("{call} signalled an error (status {status})")]
    Primitive {
        /// Call that failed
        call: String,
        /// Raw status code returned by the sandbox export
        status: i32,
    },

    /// Encoding name is not one of the available encodings
    #[error("{0} is not a supported encoding")]
    UnsupportedEncoding(String),

    /// Call name is not part of the catalog
    #[error("unknown call: {0}")]
    UnknownCall(String),

    /// The sandbox did not become ready
    #[error("sandbox not ready: {0}")]
    NotReady(String),

    /// The sandbox module could not be loaded or instantiated
    #[error("sandbox module load failed: {0}")]
    Load(String),
}

impl SluiceError {
    /// Build a length mismatch error
    #[must_use]
    pub fn length(context: impl Into<String>, expected: impl Into<String>, actual: usize) -> Self {
        Self::LengthMismatch {
            context: context.into(),
            expected: expected.into(),
            actual,
        }
    }

    /// Build a format error
    #[must_use]
    pub fn format(format: &'static str, reason: impl Into<String>) -> Self {
        Self::Format {
            format,
            reason: reason.into(),
        }
    }

    /// Name of the error kind, stable across message changes
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingArgument { .. } => "MissingArgument",
            Self::UnsupportedType { .. } => "UnsupportedType",
            Self::LengthMismatch { .. } => "LengthMismatch",
            Self::Format { .. } => "FormatError",
            Self::Allocation { .. } => "AllocationError",
            Self::Primitive { .. } => "PrimitiveError",
            Self::UnsupportedEncoding(_) => "UnsupportedEncoding",
            Self::UnknownCall(_) => "UnknownCall",
            Self::NotReady(_) => "NotReady",
            Self::Load(_) => "LoadError",
        }
    }
}
