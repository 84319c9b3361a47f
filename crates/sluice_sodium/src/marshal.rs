//! The call marshaller: validate, inject, invoke, extract, release.

use crate::contract::{ArgKind, ArgSpec, CallContract, OutputLength, Slot};
use crate::input::Input;
use indexmap::IndexMap;
use sluice_core::{EncodedResult, SluiceError, SluiceResult};
use sluice_wasm::{CallArg, CallScope, Heap, HeapStats, Ready, SandboxBackend};
use std::borrow::Cow;
use tracing::{debug, warn};

/// A validated argument
#[derive(Debug)]
enum Value<'a> {
    Bytes(Cow<'a, [u8]>),
    Absent,
    Scalar(u64),
}

impl Value<'_> {
    fn len(&self) -> usize {
        match self {
            Self::Bytes(bytes) => bytes.len(),
            Self::Absent | Self::Scalar(_) => 0,
        }
    }

    fn scalar(&self) -> u64 {
        match self {
            Self::Scalar(n) => *n,
            Self::Bytes(_) | Self::Absent => 0,
        }
    }
}

/// Moves one call at a time across the sandbox boundary
///
/// Every buffer a call creates lives in a [`CallScope`] and is released
/// before `call` returns, whichever way it returns.
#[derive(Debug)]
pub struct Marshaller<B: SandboxBackend> {
    heap: Heap<B>,
}

impl<B: SandboxBackend> Marshaller<B> {
    /// Take ownership of an initialized sandbox
    #[must_use]
    pub fn new(ready: Ready<B>) -> Self {
        Self {
            heap: Heap::new(ready),
        }
    }

    /// Zero buffers before releasing them
    #[must_use]
    pub fn with_scrub(mut self, scrub: bool) -> Self {
        self.heap = self.heap.with_scrub(scrub);
        self
    }

    /// The sandbox heap
    #[must_use]
    pub fn heap(&self) -> &Heap<B> {
        &self.heap
    }

    /// Allocation counters
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Give the sandbox back
    #[must_use]
    pub fn into_backend(self) -> B {
        self.heap.into_backend()
    }

    /// Run one call
    ///
    /// All arguments are validated before the first allocation. Trailing
    /// absent arguments past the contract's arity are ignored. A sandbox
    /// trap during the call aborts rather than returning, and so does any
    /// later call on the same sandbox.
    ///
    /// # Errors
    ///
    /// Returns `MissingArgument`, `UnsupportedType` or `LengthMismatch` for
    /// invalid arguments, `Allocation` if the sandbox heap is exhausted, and
    /// `Primitive` if the export reports a non-zero status
    pub fn call(
        &mut self,
        contract: &CallContract,
        args: &[Option<Input<'_>>],
    ) -> SluiceResult<EncodedResult> {
        self.heap.ensure_sound();
        let values = validate(contract, args)?;
        debug!(call = contract.name, export = contract.export, "marshalling call");

        let mut scope = CallScope::new(&mut self.heap);

        let mut inputs = Vec::with_capacity(values.len());
        for value in &values {
            inputs.push(match value {
                Value::Bytes(bytes) => Some(scope.inject(bytes)?),
                Value::Absent | Value::Scalar(_) => None,
            });
        }

        let mut outputs = Vec::with_capacity(contract.outputs.len());
        for spec in contract.outputs {
            let length = output_length(spec.length, &values);
            outputs.push((scope.reserve(length)?, length));
        }

        let call_args: Vec<CallArg> = contract
            .layout
            .iter()
            .map(|slot| match *slot {
                Slot::Output(i) => scope.arg(outputs[i].0),
                Slot::OutputLen(i, width) => width.arg(outputs[i].1 as u64),
                Slot::Input(i) => inputs[i].map_or(CallArg::Null, |id| scope.arg(id)),
                Slot::InputLen(i, width) => width.arg(values[i].len() as u64),
                Slot::Scalar(i, width) => width.arg(values[i].scalar()),
                Slot::Null => CallArg::Null,
            })
            .collect();

        let status = scope.invoke(contract.export, &call_args);
        if status != 0 {
            warn!(call = contract.name, status, "primitive reported failure");
            return Err(SluiceError::Primitive {
                call: contract.name.to_string(),
                status,
            });
        }

        let extracted: Vec<Vec<u8>> = outputs
            .iter()
            .map(|&(id, _)| scope.read_out(id, 0))
            .collect();
        drop(scope);
        debug!(call = contract.name, outputs = extracted.len(), "call complete");
        Ok(assemble(contract, extracted))
    }
}

fn validate<'a>(
    contract: &CallContract,
    args: &'a [Option<Input<'_>>],
) -> SluiceResult<Vec<Value<'a>>> {
    let given = args.iter().rposition(Option::is_some).map_or(0, |last| last + 1);
    if given > contract.args.len() {
        return Err(SluiceError::length(
            contract.name,
            format!("at most {} arguments", contract.args.len()),
            given,
        ));
    }

    contract
        .args
        .iter()
        .enumerate()
        .map(|(i, spec)| validate_arg(contract, spec, args.get(i).and_then(Option::as_ref)))
        .collect()
}

fn validate_arg<'a>(
    contract: &CallContract,
    spec: &ArgSpec,
    arg: Option<&'a Input<'_>>,
) -> SluiceResult<Value<'a>> {
    let Some(input) = arg else {
        if spec.optional {
            return Ok(Value::Absent);
        }
        return Err(SluiceError::MissingArgument {
            call: contract.name.to_string(),
            argument: spec.name.to_string(),
        });
    };

    match spec.kind {
        ArgKind::Bytes(rule) => {
            let bytes = input
                .to_bytes()
                .ok_or_else(|| unsupported(contract, spec, "bytes or text"))?;
            if !rule.accepts(bytes.len()) {
                return Err(SluiceError::length(
                    contract.name,
                    rule.describe(spec.name),
                    bytes.len(),
                ));
            }
            Ok(Value::Bytes(bytes))
        }
        ArgKind::Scalar { max } => match *input {
            Input::Number(n) if n <= max => Ok(Value::Scalar(n)),
            Input::Number(n) => Err(SluiceError::length(
                contract.name,
                format!("{} of at most {max}", spec.name),
                usize::try_from(n).unwrap_or(usize::MAX),
            )),
            Input::Bytes(_) | Input::Text(_) => Err(unsupported(contract, spec, "number")),
        },
    }
}

fn unsupported(contract: &CallContract, spec: &ArgSpec, expected: &'static str) -> SluiceError {
    SluiceError::UnsupportedType {
        call: contract.name.to_string(),
        argument: spec.name.to_string(),
        expected,
    }
}

fn output_length(length: OutputLength, values: &[Value<'_>]) -> usize {
    match length {
        OutputLength::Fixed(n) => n,
        OutputLength::InputPlus(i, n) => values[i].len() + n,
        OutputLength::InputMinus(i, n) => values[i].len().saturating_sub(n),
        OutputLength::Scalar(i) => usize::try_from(values[i].scalar()).unwrap_or(usize::MAX),
    }
}

fn assemble(contract: &CallContract, mut extracted: Vec<Vec<u8>>) -> EncodedResult {
    if !contract.is_composite() {
        return match extracted.pop() {
            Some(bytes) => EncodedResult::RawBytes(bytes),
            None => EncodedResult::Composite(IndexMap::new()),
        };
    }

    let mut parts = IndexMap::with_capacity(contract.outputs.len() + contract.literals.len());
    for (spec, bytes) in contract.outputs.iter().zip(extracted) {
        parts.insert(spec.name.to_string(), EncodedResult::RawBytes(bytes));
    }
    for (name, value) in contract.literals {
        parts.insert((*name).to_string(), EncodedResult::Literal((*value).to_string()));
    }
    EncodedResult::Composite(parts)
}
