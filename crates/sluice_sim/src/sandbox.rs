//! The simulated sandbox backend.

use crate::failure::{FailurePlan, FaultPoint};
use crate::memory::LinearMemory;
use crate::primitives;
use crate::seed::SimSeed;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sluice_core::{SluiceError, SluiceResult};
use sluice_wasm::{CallArg, SandboxBackend, SandboxFault};
use tracing::{debug, trace};

/// Default linear memory size (1 MiB)
pub const DEFAULT_CAPACITY: u32 = 1024 * 1024;

/// Counters for traffic seen by the simulated sandbox
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimStats {
    /// `malloc` calls, including refused ones
    pub mallocs: u64,
    /// `malloc` calls answered with zero
    pub refused_mallocs: u64,
    /// `free` calls
    pub frees: u64,
    /// Export invocations
    pub invocations: u64,
    /// Invocations that returned a non-zero status
    pub failed_invocations: u64,
}

/// In-process sandbox running stand-in primitives
#[derive(Debug)]
pub struct SimSandbox {
    memory: LinearMemory,
    rng: ChaCha8Rng,
    seed: SimSeed,
    plan: FailurePlan,
    stats: SimStats,
    initialized: bool,
    invoked: Vec<String>,
}

impl SimSandbox {
    /// Create a sandbox with default memory
    #[must_use]
    pub fn new(seed: SimSeed) -> Self {
        Self {
            memory: LinearMemory::new(DEFAULT_CAPACITY),
            rng: seed.into_rng(),
            seed,
            plan: FailurePlan::none(),
            stats: SimStats::default(),
            initialized: false,
            invoked: Vec::new(),
        }
    }

    /// Resize linear memory
    #[must_use]
    pub fn with_capacity(mut self, bytes: u32) -> Self {
        self.memory = LinearMemory::new(bytes);
        self
    }

    /// Install a failure plan
    #[must_use]
    pub fn with_plan(mut self, plan: FailurePlan) -> Self {
        self.plan = plan;
        self
    }

    /// Seed this sandbox was created with
    #[must_use]
    pub fn seed(&self) -> SimSeed {
        self.seed
    }

    /// Traffic counters
    #[must_use]
    pub fn stats(&self) -> SimStats {
        self.stats
    }

    /// Allocations the sandbox still considers live
    #[must_use]
    pub fn live_allocations(&self) -> usize {
        self.memory.live()
    }

    /// Linear memory
    #[must_use]
    pub fn memory(&self) -> &LinearMemory {
        &self.memory
    }

    /// Exports invoked so far, in order
    #[must_use]
    pub fn invoked(&self) -> &[String] {
        &self.invoked
    }

    /// Exports this sandbox implements
    #[must_use]
    pub fn exports() -> &'static [&'static str] {
        primitives::EXPORTS
    }

    fn ensure_ready(&self, operation: &str) -> Result<(), SandboxFault> {
        if self.initialized {
            Ok(())
        } else {
            Err(SandboxFault::new(operation, "sandbox not initialized"))
        }
    }

    fn trap_check(&self, point: FaultPoint, operation: &str) -> Result<(), SandboxFault> {
        if self.plan.traps_at(&point) {
            Err(SandboxFault::new(operation, "injected trap"))
        } else {
            Ok(())
        }
    }
}

impl Default for SimSandbox {
    fn default() -> Self {
        Self::new(SimSeed::default())
    }
}

impl SandboxBackend for SimSandbox {
    fn initialize(&mut self) -> SluiceResult<()> {
        if self.plan.fail_init {
            return Err(SluiceError::NotReady("sodium_init returned -1".to_string()));
        }
        if !self.initialized {
            debug!(
                seed = self.seed.value(),
                capacity = self.memory.capacity(),
                "simulated sandbox ready"
            );
        }
        self.initialized = true;
        Ok(())
    }

    fn malloc(&mut self, size: u32) -> Result<u32, SandboxFault> {
        self.ensure_ready("malloc")?;
        self.trap_check(FaultPoint::Malloc, "malloc")?;
        let index = self.stats.mallocs;
        self.stats.mallocs += 1;

        let address = if self.plan.refuses_malloc(index) {
            None
        } else {
            self.memory.alloc(size)
        };
        match address {
            Some(address) => Ok(address),
            None => {
                self.stats.refused_mallocs += 1;
                trace!(index, size, "malloc refused");
                Ok(0)
            }
        }
    }

    fn free(&mut self, address: u32) -> Result<(), SandboxFault> {
        self.ensure_ready("free")?;
        self.trap_check(FaultPoint::Free, "free")?;
        self.memory
            .free(address)
            .map_err(|e| SandboxFault::new("free", e))?;
        self.stats.frees += 1;
        Ok(())
    }

    fn invoke(&mut self, export: &str, args: &[CallArg]) -> Result<i32, SandboxFault> {
        let operation = format!("invoke {export}");
        self.ensure_ready(&operation)?;
        self.trap_check(FaultPoint::Invoke(export.to_string()), &operation)?;
        self.stats.invocations += 1;
        self.invoked.push(export.to_string());

        let status = if self.plan.rejects(export) {
            -1
        } else {
            primitives::dispatch(export, args, &mut self.memory, &mut self.rng)?
        };
        if status != 0 {
            self.stats.failed_invocations += 1;
        }
        trace!(export, status, "invoked");
        Ok(status)
    }

    fn read(&mut self, address: u32, len: usize) -> Result<Vec<u8>, SandboxFault> {
        self.memory
            .read(address, len)
            .map(<[u8]>::to_vec)
            .map_err(|e| SandboxFault::new("read", e))
    }

    fn write(&mut self, address: u32, bytes: &[u8]) -> Result<(), SandboxFault> {
        self.memory
            .write(address, bytes)
            .map_err(|e| SandboxFault::new("write", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_wasm::SandboxAddress;

    fn ready() -> SimSandbox {
        let mut sandbox = SimSandbox::default();
        sandbox.initialize().unwrap();
        sandbox
    }

    #[test]
    fn test_refuses_before_initialize() {
        let mut sandbox = SimSandbox::default();
        assert!(sandbox.malloc(8).is_err());
        assert!(sandbox.invoke("randombytes_buf", &[]).is_err());
    }

    #[test]
    fn test_failed_init() {
        let mut sandbox = SimSandbox::default().with_plan(FailurePlan::none().fail_init());
        let err = sandbox.initialize().unwrap_err();
        assert_eq!(err.kind(), "NotReady");
    }

    #[test]
    fn test_refused_malloc_returns_zero() {
        let mut sandbox = SimSandbox::default().with_plan(FailurePlan::none().refuse_malloc(1));
        sandbox.initialize().unwrap();
        assert_ne!(sandbox.malloc(8).unwrap(), 0);
        assert_eq!(sandbox.malloc(8).unwrap(), 0);
        assert_ne!(sandbox.malloc(8).unwrap(), 0);
        assert_eq!(sandbox.stats().refused_mallocs, 1);
        assert_eq!(sandbox.live_allocations(), 2);
    }

    #[test]
    fn test_double_free_is_fault() {
        let mut sandbox = ready();
        let address = sandbox.malloc(8).unwrap();
        sandbox.free(address).unwrap();
        assert!(sandbox.free(address).is_err());
    }

    #[test]
    fn test_rejected_export() {
        let plan = FailurePlan::none().reject("randombytes_buf");
        let mut sandbox = SimSandbox::default().with_plan(plan);
        sandbox.initialize().unwrap();
        assert_eq!(sandbox.invoke("randombytes_buf", &[]).unwrap(), -1);
        assert_eq!(sandbox.stats().failed_invocations, 1);
    }

    #[test]
    fn test_injected_trap() {
        let plan = FailurePlan::none().trap_at(FaultPoint::Free);
        let mut sandbox = SimSandbox::default().with_plan(plan);
        sandbox.initialize().unwrap();
        let address = sandbox.malloc(8).unwrap();
        let fault = sandbox.free(address).unwrap_err();
        assert_eq!(fault.reason, "injected trap");
    }

    #[test]
    fn test_randomness_is_reproducible() {
        let draw = |seed| {
            let mut sandbox = SimSandbox::new(SimSeed::from_literal(seed));
            sandbox.initialize().unwrap();
            let raw = sandbox.malloc(16).unwrap();
            let buf = CallArg::Address(SandboxAddress::new(raw).unwrap());
            assert_eq!(sandbox.invoke("randombytes_buf", &[buf, CallArg::U32(16)]).unwrap(), 0);
            sandbox.read(raw, 16).unwrap()
        };
        assert_eq!(draw(1), draw(1));
        assert_ne!(draw(1), draw(2));
    }

    #[test]
    fn test_invocation_log() {
        let mut sandbox = ready();
        let raw = sandbox.malloc(4).unwrap();
        let buf = CallArg::Address(SandboxAddress::new(raw).unwrap());
        sandbox.invoke("randombytes_buf", &[buf, CallArg::U32(4)]).unwrap();
        assert_eq!(sandbox.invoked(), ["randombytes_buf".to_string()]);
    }
}
