//! Fail-fast wrapper over the sandbox's own allocator.

use crate::backend::{CallArg, Ready, SandboxAddress, SandboxBackend, SandboxFault};
use serde::{Deserialize, Serialize};
use sluice_core::{SluiceError, SluiceResult};
use tracing::{debug, trace};

/// Allocation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapStats {
    /// Successful allocations
    pub allocations: u64,
    /// Releases
    pub releases: u64,
    /// Allocation requests the sandbox refused
    pub failed_allocations: u64,
    /// Total bytes handed out by successful allocations
    pub bytes_allocated: u64,
}

impl HeapStats {
    /// Allocations not yet released
    #[must_use]
    pub fn live(&self) -> u64 {
        self.allocations - self.releases
    }
}

/// Owner of an initialized sandbox and its heap
///
/// All traffic with the sandbox goes through here. Exhaustion becomes
/// `SluiceError::Allocation`; faults poison the heap and abort. A poisoned
/// heap re-raises its fault on every later operation, so unwinding past the
/// first panic never yields a usable sandbox.
#[derive(Debug)]
pub struct Heap<B> {
    backend: B,
    stats: HeapStats,
    scrub: bool,
    fault: Option<SandboxFault>,
}

impl<B: SandboxBackend> Heap<B> {
    /// Take ownership of an initialized sandbox
    #[must_use]
    pub fn new(ready: Ready<B>) -> Self {
        Self {
            backend: ready.into_inner(),
            stats: HeapStats::default(),
            scrub: false,
            fault: None,
        }
    }

    /// Zero buffers before releasing them
    #[must_use]
    pub fn with_scrub(mut self, scrub: bool) -> Self {
        self.scrub = scrub;
        self
    }

    /// Allocation counters
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// Whether a fault has been raised
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.fault.is_some()
    }

    /// Whether released buffers are zeroed first
    #[must_use]
    pub fn scrubs(&self) -> bool {
        self.scrub
    }

    /// Borrow the underlying sandbox
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Give the sandbox back
    #[must_use]
    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Request `n` bytes from the sandbox heap
    ///
    /// Zero-length requests reserve one byte so that a successful allocation
    /// always has a distinct non-zero address.
    ///
    /// # Errors
    ///
    /// Returns `Allocation` if the sandbox reports exhaustion or `n` does not
    /// fit the 32-bit address space
    pub fn allocate(&mut self, n: usize) -> SluiceResult<SandboxAddress> {
        self.ensure_sound();
        let Ok(size) = u32::try_from(n.max(1)) else {
            self.stats.failed_allocations += 1;
            return Err(SluiceError::Allocation { requested: n });
        };

        let raw = match self.backend.malloc(size) {
            Ok(raw) => raw,
            Err(fault) => self.fault(fault),
        };

        match SandboxAddress::new(raw) {
            Some(address) => {
                self.stats.allocations += 1;
                self.stats.bytes_allocated += u64::from(size);
                trace!(%address, size, "allocated");
                Ok(address)
            }
            None => {
                self.stats.failed_allocations += 1;
                debug!(requested = n, "sandbox heap exhausted");
                Err(SluiceError::Allocation { requested: n })
            }
        }
    }

    /// Return `length` bytes at `address` to the sandbox heap
    ///
    /// Each address must be released exactly once; callers go through
    /// [`crate::CallScope`] to guarantee that.
    pub fn release(&mut self, address: SandboxAddress, length: usize) {
        self.ensure_sound();
        if self.scrub && length > 0 {
            let zeros = vec![0u8; length];
            if let Err(fault) = self.backend.write(address.raw(), &zeros) {
                self.fault(fault);
            }
        }
        if let Err(fault) = self.backend.free(address.raw()) {
            self.fault(fault);
        }
        self.stats.releases += 1;
        trace!(%address, "released");
    }

    /// Copy host bytes into the sandbox
    pub fn write(&mut self, address: SandboxAddress, bytes: &[u8]) {
        self.ensure_sound();
        if let Err(fault) = self.backend.write(address.raw(), bytes) {
            self.fault(fault);
        }
    }

    /// Copy sandbox bytes out to the host
    pub fn read(&mut self, address: u32, len: usize) -> Vec<u8> {
        self.ensure_sound();
        match self.backend.read(address, len) {
            Ok(bytes) => bytes,
            Err(fault) => self.fault(fault),
        }
    }

    /// Invoke an export and return its status code
    pub fn invoke(&mut self, export: &str, args: &[CallArg]) -> i32 {
        self.ensure_sound();
        match self.backend.invoke(export, args) {
            Ok(status) => status,
            Err(fault) => self.fault(fault),
        }
    }

    /// Re-raise the fault that poisoned this heap, if any
    pub fn ensure_sound(&self) {
        if let Some(fault) = &self.fault {
            fault.clone().abort();
        }
    }

    fn fault(&mut self, fault: SandboxFault) -> ! {
        self.fault = Some(fault.clone());
        fault.abort()
    }
}
