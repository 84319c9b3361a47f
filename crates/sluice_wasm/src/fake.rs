//! Minimal in-memory sandbox for unit tests.

use crate::backend::{CallArg, SandboxBackend, SandboxFault};
use sluice_core::SluiceResult;
use std::collections::BTreeMap;

/// Bump allocator over a flat byte vector; `fill` writes 0xAA into its
/// first argument, `fail` returns -1
pub(crate) struct FakeSandbox {
    memory: Vec<u8>,
    next: u32,
    live: BTreeMap<u32, u32>,
    calls: usize,
}

impl FakeSandbox {
    pub(crate) fn new(capacity: u32) -> Self {
        Self {
            memory: vec![0; capacity as usize],
            next: 8,
            live: BTreeMap::new(),
            calls: 0,
        }
    }

    pub(crate) fn live(&self) -> usize {
        self.live.len()
    }

    /// `malloc` and `invoke` requests that reached the sandbox
    pub(crate) fn calls(&self) -> usize {
        self.calls
    }

    pub(crate) fn peek(&self, address: u32, len: usize) -> Vec<u8> {
        self.memory[address as usize..address as usize + len].to_vec()
    }
}

impl SandboxBackend for FakeSandbox {
    fn initialize(&mut self) -> SluiceResult<()> {
        Ok(())
    }

    fn malloc(&mut self, size: u32) -> Result<u32, SandboxFault> {
        self.calls += 1;
        let end = self.next + size;
        if end as usize > self.memory.len() {
            return Ok(0);
        }
        let address = self.next;
        self.next = end;
        self.live.insert(address, size);
        Ok(address)
    }

    fn free(&mut self, address: u32) -> Result<(), SandboxFault> {
        self.live
            .remove(&address)
            .map(|_| ())
            .ok_or_else(|| SandboxFault::new("free", format!("double free of {address}")))
    }

    fn invoke(&mut self, export: &str, args: &[CallArg]) -> Result<i32, SandboxFault> {
        self.calls += 1;
        match export {
            "fill" => {
                let address = args[0].as_u32().unwrap_or(0);
                let len = self.live.get(&address).copied().unwrap_or(0);
                self.write(address, &vec![0xAA; len as usize])?;
                Ok(0)
            }
            "fail" => Ok(-1),
            other => Err(SandboxFault::new("invoke", format!("missing export {other}"))),
        }
    }

    fn read(&mut self, address: u32, len: usize) -> Result<Vec<u8>, SandboxFault> {
        let start = address as usize;
        self.memory
            .get(start..start + len)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| SandboxFault::new("read", "out of bounds"))
    }

    fn write(&mut self, address: u32, bytes: &[u8]) -> Result<(), SandboxFault> {
        let start = address as usize;
        let region = self
            .memory
            .get_mut(start..start + bytes.len())
            .ok_or_else(|| SandboxFault::new("write", "out of bounds"))?;
        region.copy_from_slice(bytes);
        Ok(())
    }
}
