//! SLUICE Core Types
//!
//! Pure conversions and types shared by every layer of the marshaller.
//! Nothing in this crate touches sandbox memory.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod encoding;
pub mod error;
pub mod result;

// Re-exports
pub use codec::{from_base64, from_hex, is_hex, string_to_bytes, to_base64, to_hex};
pub use encoding::{Encoding, ResultEncoder};
pub use error::{SluiceError, SluiceResult};
pub use result::{EncodedResult, Rendered};
