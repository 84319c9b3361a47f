//! Static call contracts: what a primitive accepts, what it produces, and
//! how its export is invoked.

use serde::Serialize;
use sluice_wasm::CallArg;

/// C integer width of a length or scalar parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Width {
    /// `size_t`, 32 bits on wasm32
    Size,
    /// `unsigned long long`
    LongLong,
}

impl Width {
    /// Call argument carrying `value` at this width
    ///
    /// Callers only pass values already bounded by a successful sandbox
    /// allocation or a scalar limit, so `Size` never truncates.
    #[must_use]
    pub fn arg(self, value: u64) -> CallArg {
        match self {
            Self::Size => CallArg::U32(value as u32),
            Self::LongLong => CallArg::U64(value),
        }
    }
}

/// Accepted byte lengths of an input argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LengthRule {
    /// Exactly this many bytes
    Fixed(usize),
    /// This many bytes or more
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
    /// Any length, including zero
    Any,
}

impl LengthRule {
    /// Whether `len` satisfies the rule
    #[must_use]
    pub fn accepts(self, len: usize) -> bool {
        match self {
            Self::Fixed(n) => len == n,
            Self::AtLeast(n) => len >= n,
            Self::Range(min, max) => (min..=max).contains(&len),
            Self::Any => true,
        }
    }

    /// Expected length phrased for error messages, e.g. `32-byte key`
    #[must_use]
    pub fn describe(self, what: &str) -> String {
        match self {
            Self::Fixed(n) => format!("{n}-byte {what}"),
            Self::AtLeast(n) => format!("at least {n}-byte {what}"),
            Self::Range(min, max) => format!("{min} to {max}-byte {what}"),
            Self::Any => format!("any-length {what}"),
        }
    }
}

/// Host type an argument takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArgKind {
    /// Bytes or text, copied into a sandbox buffer
    Bytes(LengthRule),
    /// Unsigned number passed by value
    Scalar {
        /// Largest accepted value
        max: u64,
    },
}

/// One declared argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArgSpec {
    /// Argument name used in error messages
    pub name: &'static str,
    /// Accepted host type and length
    pub kind: ArgKind,
    /// Whether the argument may be omitted
    pub optional: bool,
}

impl ArgSpec {
    /// Required byte argument
    #[must_use]
    pub const fn bytes(name: &'static str, rule: LengthRule) -> Self {
        Self {
            name,
            kind: ArgKind::Bytes(rule),
            optional: false,
        }
    }

    /// Byte argument that may be omitted; passed as a null pointer with
    /// zero length when absent
    #[must_use]
    pub const fn optional(name: &'static str, rule: LengthRule) -> Self {
        Self {
            name,
            kind: ArgKind::Bytes(rule),
            optional: true,
        }
    }

    /// Required scalar argument
    #[must_use]
    pub const fn scalar(name: &'static str, max: u64) -> Self {
        Self {
            name,
            kind: ArgKind::Scalar { max },
            optional: false,
        }
    }
}

/// Size of an output buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutputLength {
    /// Constant size
    Fixed(usize),
    /// Length of input argument `.0` plus `.1`
    InputPlus(usize, usize),
    /// Length of input argument `.0` minus `.1`
    InputMinus(usize, usize),
    /// Value of scalar argument `.0`
    Scalar(usize),
}

/// One declared output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputSpec {
    /// Key in composite results
    pub name: &'static str,
    /// Buffer size
    pub length: OutputLength,
}

impl OutputSpec {
    /// Declare an output
    #[must_use]
    pub const fn new(name: &'static str, length: OutputLength) -> Self {
        Self { name, length }
    }
}

/// Position in the export's parameter list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Slot {
    /// Address of output buffer `i`
    Output(usize),
    /// Size of output buffer `i`
    OutputLen(usize, Width),
    /// Address of input argument `i`, or null when it is absent
    Input(usize),
    /// Byte length of input argument `i`, zero when absent
    InputLen(usize, Width),
    /// Value of scalar argument `i`
    Scalar(usize, Width),
    /// Null pointer for parameters the marshaller does not use
    Null,
}

/// Static description of one primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallContract {
    /// Host-facing name
    pub name: &'static str,
    /// Sandbox export invoked
    pub export: &'static str,
    /// Declared arguments, in call order
    pub args: &'static [ArgSpec],
    /// Declared outputs, in result order
    pub outputs: &'static [OutputSpec],
    /// Text fields appended to composite results
    pub literals: &'static [(&'static str, &'static str)],
    /// Export parameter list
    pub layout: &'static [Slot],
}

impl CallContract {
    /// Whether the call returns nothing but its status
    #[must_use]
    pub fn is_verification(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Whether the result is a named composite
    #[must_use]
    pub fn is_composite(&self) -> bool {
        self.outputs.len() > 1 || !self.literals.is_empty()
    }
}
