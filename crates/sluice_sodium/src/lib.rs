//! SLUICE Sodium
//!
//! Host-facing calls into libsodium primitives running inside a sandbox.
//! Each call is described by a static [`CallContract`]; the [`Marshaller`]
//! validates arguments against it, copies them into sandbox buffers,
//! invokes the export, copies results out and releases every buffer before
//! returning. [`Sodium`] adds result encoding and one method per primitive.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod catalog;
pub mod contract;
pub mod input;
pub mod marshal;

pub use api::Sodium;
pub use catalog::{CATALOG, lookup};
pub use contract::{
    ArgKind, ArgSpec, CallContract, LengthRule, OutputLength, OutputSpec, Slot, Width,
};
pub use input::Input;
pub use marshal::Marshaller;
