//! SLUICE Simulated Sandbox
//!
//! An in-process stand-in for the WASM primitive module. It keeps its own
//! linear memory and heap, speaks the same capability set as the wasmtime
//! backend, and can be told to exhaust its heap, report primitive failures
//! or trap at chosen points. All randomness is reproducible from a seed.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod failure;
pub mod memory;
pub mod primitives;
pub mod sandbox;
pub mod seed;

pub use failure::{FailurePlan, FaultPoint};
pub use memory::{LinearMemory, MemoryError};
pub use sandbox::{SimSandbox, SimStats};
pub use seed::SimSeed;
