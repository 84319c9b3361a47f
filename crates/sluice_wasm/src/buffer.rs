//! Typed buffers and the per-call release list.

use crate::backend::{CallArg, SandboxAddress, SandboxBackend};
use crate::heap::Heap;
use sluice_core::{SluiceError, SluiceResult};

/// Owned handle to a sandbox memory region of known length
///
/// Not `Clone`: exactly one owner releases it. `destroy` consumes the
/// handle, so a destroyed buffer cannot be touched again.
#[derive(Debug, PartialEq, Eq)]
pub struct TypedBuffer {
    address: SandboxAddress,
    length: usize,
}

impl TypedBuffer {
    /// Allocate `length` bytes
    ///
    /// # Errors
    ///
    /// Returns `Allocation` if the sandbox heap is exhausted
    pub fn create<B: SandboxBackend>(heap: &mut Heap<B>, length: usize) -> SluiceResult<Self> {
        let address = heap.allocate(length)?;
        Ok(Self { address, length })
    }

    /// Sandbox address of the region
    #[must_use]
    pub fn address(&self) -> SandboxAddress {
        self.address
    }

    /// Region length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether the region is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Copy host bytes into the start of the region
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` if `bytes` is longer than the region
    pub fn write_in<B: SandboxBackend>(
        &self,
        heap: &mut Heap<B>,
        bytes: &[u8],
    ) -> SluiceResult<()> {
        if bytes.len() > self.length {
            return Err(SluiceError::length(
                format!("buffer at {}", self.address),
                format!("at most {} bytes", self.length),
                bytes.len(),
            ));
        }
        if !bytes.is_empty() {
            heap.write(self.address, bytes);
        }
        Ok(())
    }

    /// Copy `len - offset` bytes out, starting `offset` bytes in
    #[must_use]
    pub fn read_out<B: SandboxBackend>(&self, heap: &mut Heap<B>, offset: usize) -> Vec<u8> {
        let count = self.length.saturating_sub(offset);
        if count == 0 {
            return Vec::new();
        }
        // offset < length <= u32::MAX, checked at allocation
        heap.read(self.address.offset(offset as u32), count)
    }

    /// Release the region
    pub fn destroy<B: SandboxBackend>(self, heap: &mut Heap<B>) {
        heap.release(self.address, self.length);
    }
}

/// Index of a buffer inside a [`CallScope`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferId(usize);

/// Ordered release list for one call
///
/// Every buffer created through the scope is released exactly once, in
/// creation order, when the scope is dropped. This covers success, early
/// returns on validation or allocation errors, and primitive failures.
/// Nothing is released once the heap is poisoned.
pub struct CallScope<'h, B: SandboxBackend> {
    heap: &'h mut Heap<B>,
    buffers: Vec<TypedBuffer>,
}

impl<'h, B: SandboxBackend> CallScope<'h, B> {
    /// Open a scope over the heap
    pub fn new(heap: &'h mut Heap<B>) -> Self {
        Self {
            heap,
            buffers: Vec::new(),
        }
    }

    /// Allocate a buffer and copy `bytes` into it
    ///
    /// # Errors
    ///
    /// Returns `Allocation` if the sandbox heap is exhausted
    pub fn inject(&mut self, bytes: &[u8]) -> SluiceResult<BufferId> {
        let id = self.reserve(bytes.len())?;
        self.buffers[id.0].write_in(self.heap, bytes)?;
        Ok(id)
    }

    /// Allocate an uninitialized buffer
    ///
    /// # Errors
    ///
    /// Returns `Allocation` if the sandbox heap is exhausted
    pub fn reserve(&mut self, length: usize) -> SluiceResult<BufferId> {
        let buffer = TypedBuffer::create(self.heap, length)?;
        self.buffers.push(buffer);
        Ok(BufferId(self.buffers.len() - 1))
    }

    /// Address argument for a buffer in this scope
    #[must_use]
    pub fn arg(&self, id: BufferId) -> CallArg {
        CallArg::Address(self.buffers[id.0].address())
    }

    /// Invoke an export, returning its status code
    pub fn invoke(&mut self, export: &str, args: &[CallArg]) -> i32 {
        self.heap.invoke(export, args)
    }

    /// Copy a buffer's contents out
    #[must_use]
    pub fn read_out(&mut self, id: BufferId, offset: usize) -> Vec<u8> {
        self.buffers[id.0].read_out(self.heap, offset)
    }

    /// Number of buffers awaiting release
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffers.len()
    }
}

impl<B: SandboxBackend> Drop for CallScope<'_, B> {
    fn drop(&mut self) {
        if self.heap.is_poisoned() {
            return;
        }
        for buffer in std::mem::take(&mut self.buffers) {
            buffer.destroy(self.heap);
        }
    }
}
