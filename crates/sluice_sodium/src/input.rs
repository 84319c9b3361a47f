//! Host values accepted as call arguments.

use sluice_core::string_to_bytes;
use std::borrow::Cow;

/// A call argument as supplied by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input<'a> {
    /// Raw bytes
    Bytes(&'a [u8]),
    /// Text, converted to its UTF-8 bytes
    Text(&'a str),
    /// Unsigned number for scalar parameters
    Number(u64),
}

impl Input<'_> {
    /// Host type name for error messages and logs
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::Text(_) => "text",
            Self::Number(_) => "number",
        }
    }

    /// Byte content of a bytes or text argument
    #[must_use]
    pub fn to_bytes(&self) -> Option<Cow<'_, [u8]>> {
        match self {
            Self::Bytes(bytes) => Some(Cow::Borrowed(bytes)),
            Self::Text(text) => Some(Cow::Owned(string_to_bytes(text))),
            Self::Number(_) => None,
        }
    }
}

impl<'a> From<&'a [u8]> for Input<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::Bytes(bytes)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Input<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Self::Bytes(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for Input<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl<'a> From<&'a str> for Input<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a String> for Input<'a> {
    fn from(text: &'a String) -> Self {
        Self::Text(text)
    }
}

impl From<u32> for Input<'_> {
    fn from(n: u32) -> Self {
        Self::Number(u64::from(n))
    }
}

impl From<u64> for Input<'_> {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}
