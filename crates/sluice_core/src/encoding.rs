//! Output encodings and the result encoder.

use crate::codec::{to_base64, to_hex};
use crate::error::{SluiceError, SluiceResult};
use crate::result::{EncodedResult, Rendered};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Caller-selectable rendering of call results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Encoding {
    /// Lower-case hex text
    #[serde(rename = "hex")]
    Hex,
    /// Standard base64 text without line breaks
    #[serde(rename = "base64")]
    Base64,
    /// UTF-8 text, read up to the first NUL byte
    #[serde(rename = "utf8")]
    Utf8,
    /// Raw bytes
    #[default]
    #[serde(rename = "uint8array")]
    Uint8Array,
}

impl Encoding {
    /// Every encoding, in the order reported by `available_encodings`
    pub const ALL: [Encoding; 4] = [Self::Hex, Self::Base64, Self::Utf8, Self::Uint8Array];

    /// Canonical name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hex => "hex",
            Self::Base64 => "base64",
            Self::Utf8 => "utf8",
            Self::Uint8Array => "uint8array",
        }
    }

    /// Names of every available encoding
    #[must_use]
    pub fn available() -> Vec<&'static str> {
        Self::ALL.iter().map(|e| e.name()).collect()
    }

    /// Render raw bytes in this encoding
    ///
    /// # Errors
    ///
    /// Returns `Format` if `Utf8` is selected and the bytes before the first
    /// NUL are not valid UTF-8
    pub fn render(self, bytes: &[u8]) -> SluiceResult<Rendered> {
        Ok(match self {
            Self::Uint8Array => Rendered::Bytes(bytes.to_vec()),
            Self::Hex => Rendered::Text(to_hex(bytes)),
            Self::Base64 => Rendered::Text(to_base64(bytes, true)),
            Self::Utf8 => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                let text = std::str::from_utf8(&bytes[..end])
                    .map_err(|e| SluiceError::format("utf8", e.to_string()))?;
                Rendered::Text(text.to_string())
            }
        })
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = SluiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.name() == s)
            .ok_or_else(|| SluiceError::UnsupportedEncoding(s.to_string()))
    }
}

/// Renders extracted results, holding the default encoding
///
/// The default only affects rendering. It never changes how a primitive is
/// invoked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultEncoder {
    default: Encoding,
}

impl ResultEncoder {
    /// Create an encoder with the `uint8array` default
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an encoder with a specific default
    #[must_use]
    pub fn with_default(default: Encoding) -> Self {
        Self { default }
    }

    /// Current default encoding
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.default
    }

    /// Change the default encoding by name
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedEncoding` for unknown names; the previous default
    /// is kept
    pub fn set_encoding(&mut self, name: &str) -> SluiceResult<()> {
        self.default = name.parse()?;
        Ok(())
    }

    /// Resolve an optional explicit encoding name against the default
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedEncoding` for unknown names
    pub fn resolve(&self, explicit: Option<&str>) -> SluiceResult<Encoding> {
        match explicit {
            Some(name) => name.parse(),
            None => Ok(self.default),
        }
    }

    /// Render a result, recursing through composites
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedEncoding` for an unknown explicit encoding, or
    /// `Format` when `utf8` rendering meets invalid text
    pub fn encode(&self, result: &EncodedResult, explicit: Option<&str>) -> SluiceResult<Rendered> {
        let encoding = self.resolve(explicit)?;
        Self::encode_with(result, encoding)
    }

    /// Render a result with an already resolved encoding
    ///
    /// # Errors
    ///
    /// Returns `Format` when `utf8` rendering meets invalid text
    pub fn encode_with(result: &EncodedResult, encoding: Encoding) -> SluiceResult<Rendered> {
        match result {
            EncodedResult::RawBytes(bytes) => encoding.render(bytes),
            EncodedResult::Literal(text) => Ok(Rendered::Text(text.clone())),
            EncodedResult::Composite(parts) => {
                let mut rendered = IndexMap::with_capacity(parts.len());
                for (name, part) in parts {
                    rendered.insert(name.clone(), Self::encode_with(part, encoding)?);
                }
                Ok(Rendered::Map(rendered))
            }
        }
    }
}
