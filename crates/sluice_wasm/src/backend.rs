//! The capability set a sandbox exposes to the marshaller.

use serde::{Deserialize, Serialize};
use sluice_core::SluiceResult;
use std::fmt;

/// Location in sandbox linear memory
///
/// Opaque to the host. Never zero: a zero address is the sandbox's way of
/// reporting exhaustion and is turned into an error by the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SandboxAddress(u32);

impl SandboxAddress {
    /// Wrap a raw sandbox address, rejecting zero
    #[must_use]
    pub fn new(raw: u32) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    /// Raw address for passing back into the sandbox
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Address `offset` bytes further into the same region
    #[must_use]
    pub const fn offset(self, offset: u32) -> u32 {
        self.0 + offset
    }
}

impl fmt::Display for SandboxAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Argument passed to a sandbox export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallArg {
    /// Address of a buffer owned by the current call
    Address(SandboxAddress),
    /// Null pointer for optional parameters
    Null,
    /// 32-bit scalar (`size_t` on wasm32)
    U32(u32),
    /// 64-bit scalar (`unsigned long long`)
    U64(u64),
}

impl CallArg {
    /// Value as a 32-bit word, if this is a pointer or 32-bit scalar
    #[must_use]
    pub fn as_u32(self) -> Option<u32> {
        match self {
            Self::Address(address) => Some(address.raw()),
            Self::Null => Some(0),
            Self::U32(v) => Some(v),
            Self::U64(_) => None,
        }
    }

    /// Value as a 64-bit scalar
    #[must_use]
    pub fn as_u64(self) -> Option<u64> {
        match self {
            Self::U64(v) => Some(v),
            _ => None,
        }
    }
}

/// Unrecoverable sandbox failure
///
/// Raised when the sandbox traps, an access falls outside linear memory, or
/// an expected export is missing at call time. Sandbox memory can no longer
/// be trusted afterwards.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("fatal sandbox error during {operation}: {reason}")]
pub struct SandboxFault {
    /// Sandbox operation that failed
    pub operation: String,
    /// Trap or access error reported by the sandbox
    pub reason: String,
}

impl SandboxFault {
    /// Create a fault
    #[must_use]
    pub fn new(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Terminate the current computation
    ///
    /// Release builds abort the process (`panic = "abort"`).
    #[track_caller]
    pub fn abort(self) -> ! {
        tracing::error!(operation = %self.operation, reason = %self.reason, "sandbox fault");
        panic!("{self}");
    }
}

/// Capability set of a sandbox instance
///
/// Implemented by [`crate::WasmSandbox`] and by simulated sandboxes. All
/// addresses are raw `u32` values in the sandbox's linear memory.
pub trait SandboxBackend {
    /// Run the module's start-up; must succeed before any other call
    ///
    /// # Errors
    ///
    /// Returns `NotReady` if start-up fails
    fn initialize(&mut self) -> SluiceResult<()>;

    /// Sandbox `malloc`; zero means exhaustion
    ///
    /// # Errors
    ///
    /// Returns a fault if the sandbox traps
    fn malloc(&mut self, size: u32) -> Result<u32, SandboxFault>;

    /// Sandbox `free`
    ///
    /// # Errors
    ///
    /// Returns a fault if the sandbox traps
    fn free(&mut self, address: u32) -> Result<(), SandboxFault>;

    /// Invoke an export and return its status code (0 for void exports)
    ///
    /// # Errors
    ///
    /// Returns a fault if the export is missing or the sandbox traps
    fn invoke(&mut self, export: &str, args: &[CallArg]) -> Result<i32, SandboxFault>;

    /// Copy bytes out of linear memory
    ///
    /// # Errors
    ///
    /// Returns a fault if the range is out of bounds
    fn read(&mut self, address: u32, len: usize) -> Result<Vec<u8>, SandboxFault>;

    /// Copy bytes into linear memory
    ///
    /// # Errors
    ///
    /// Returns a fault if the range is out of bounds
    fn write(&mut self, address: u32, bytes: &[u8]) -> Result<(), SandboxFault>;
}

/// A sandbox whose start-up has completed
///
/// Marshallers are only constructible from this token, so no call can reach
/// a sandbox before `initialize` has succeeded.
#[derive(Debug)]
pub struct Ready<B> {
    backend: B,
}

impl<B: SandboxBackend> Ready<B> {
    /// Initialize a sandbox
    ///
    /// # Errors
    ///
    /// Returns `NotReady` if the sandbox start-up fails
    pub fn initialize(mut backend: B) -> SluiceResult<Self> {
        backend.initialize()?;
        tracing::debug!("sandbox ready");
        Ok(Self { backend })
    }

    /// Borrow the initialized sandbox
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Take the initialized sandbox
    #[must_use]
    pub fn into_inner(self) -> B {
        self.backend
    }
}
