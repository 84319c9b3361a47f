//! Extracted call results and their caller-facing renderings.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Output of a successful call before it is rendered for the caller
///
/// The shape mirrors the primitive's declared outputs: one buffer becomes
/// `RawBytes`, several named buffers become a `Composite`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodedResult {
    /// Bytes read out of a sandbox buffer
    RawBytes(Vec<u8>),
    /// Named parts, e.g. the halves of a key pair
    Composite(IndexMap<String, EncodedResult>),
    /// Fixed text attached by the call contract, never re-encoded
    Literal(String),
}

impl EncodedResult {
    /// Raw bytes if this is a single buffer
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::RawBytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Look up a named part of a composite result
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EncodedResult> {
        match self {
            Self::Composite(parts) => parts.get(name),
            _ => None,
        }
    }
}

/// A result rendered in the caller's chosen encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rendered {
    /// `uint8array` rendering
    Bytes(Vec<u8>),
    /// `hex`, `base64` and `utf8` renderings, and literals
    Text(String),
    /// Composite rendering, key order preserved
    Map(IndexMap<String, Rendered>),
}

impl Rendered {
    /// Bytes if rendered as `uint8array`
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Text if rendered as text
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Look up a named part of a composite rendering
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Rendered> {
        match self {
            Self::Map(parts) => parts.get(name),
            _ => None,
        }
    }

    /// Consume into bytes, if rendered as `uint8array`
    #[must_use]
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Consume into text, if rendered as text
    #[must_use]
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}
