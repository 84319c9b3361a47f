//! SLUICE WASM Sandbox
//!
//! The sandbox capability set, the fail-fast heap wrapper over the
//! sandbox's own allocator, call-scoped typed buffers, and a wasmtime
//! backend that loads the primitive module.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod buffer;
pub mod config;
pub mod heap;
pub mod runtime;

#[cfg(test)]
mod fake;

pub use backend::{CallArg, Ready, SandboxAddress, SandboxBackend, SandboxFault};
pub use buffer::{BufferId, CallScope, TypedBuffer};
pub use config::SandboxConfig;
pub use heap::{Heap, HeapStats};
pub use runtime::WasmSandbox;
