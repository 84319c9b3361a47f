//! Simulated linear memory with a first-fit heap.

use std::collections::BTreeMap;

/// Allocation alignment in bytes
pub const ALIGN: u32 = 8;

/// Lowest address handed out; the page below it stays unused so that zero
/// is never a valid allocation
pub const HEAP_BASE: u32 = 1024;

/// Linear memory and the allocations carved out of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearMemory {
    bytes: Vec<u8>,
    /// Live allocations keyed by start address, value is the size
    live: BTreeMap<u32, u32>,
    peak_live: usize,
}

/// Memory-related errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// Access outside linear memory
    #[error("access of {len} bytes at 0x{address:X} is out of bounds")]
    OutOfBounds {
        /// First byte of the access
        address: u32,
        /// Access length
        len: usize,
    },

    /// Free of an address that is not a live allocation
    #[error("free of 0x{address:X}, which is not a live allocation")]
    InvalidFree {
        /// Address passed to `free`
        address: u32,
    },
}

impl LinearMemory {
    /// Create a memory of `capacity` bytes
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        Self {
            bytes: vec![0; capacity as usize],
            live: BTreeMap::new(),
            peak_live: 0,
        }
    }

    /// Total size in bytes
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Number of live allocations
    #[must_use]
    pub fn live(&self) -> usize {
        self.live.len()
    }

    /// Highest number of simultaneously live allocations
    #[must_use]
    pub fn peak_live(&self) -> usize {
        self.peak_live
    }

    /// Bytes held by live allocations
    #[must_use]
    pub fn live_bytes(&self) -> u64 {
        self.live.values().map(|&size| u64::from(size)).sum()
    }

    /// Size of a live allocation
    #[must_use]
    pub fn size_of(&self, address: u32) -> Option<u32> {
        self.live.get(&address).copied()
    }

    /// First-fit allocation; `None` when no gap is large enough
    pub fn alloc(&mut self, size: u32) -> Option<u32> {
        let size = size.max(1);
        let mut candidate = HEAP_BASE;
        for (&start, &len) in &self.live {
            if u64::from(candidate) + u64::from(size) <= u64::from(start) {
                break;
            }
            candidate = align_up(start.checked_add(len)?)?;
        }

        let end = u64::from(candidate) + u64::from(size);
        if end > self.bytes.len() as u64 {
            return None;
        }
        self.live.insert(candidate, size);
        self.peak_live = self.peak_live.max(self.live.len());
        Some(candidate)
    }

    /// Release a live allocation, returning its size
    ///
    /// # Errors
    ///
    /// Returns `InvalidFree` for double frees and unknown addresses
    pub fn free(&mut self, address: u32) -> Result<u32, MemoryError> {
        self.live
            .remove(&address)
            .ok_or(MemoryError::InvalidFree { address })
    }

    /// Borrow a range of memory
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the range leaves linear memory
    pub fn read(&self, address: u32, len: usize) -> Result<&[u8], MemoryError> {
        let start = address as usize;
        start
            .checked_add(len)
            .and_then(|end| self.bytes.get(start..end))
            .ok_or(MemoryError::OutOfBounds { address, len })
    }

    /// Copy bytes into memory
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the range leaves linear memory
    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
        let start = address as usize;
        let region = start
            .checked_add(data.len())
            .and_then(|end| self.bytes.get_mut(start..end))
            .ok_or(MemoryError::OutOfBounds {
                address,
                len: data.len(),
            })?;
        region.copy_from_slice(data);
        Ok(())
    }
}

fn align_up(value: u32) -> Option<u32> {
    value.checked_add(ALIGN - 1).map(|v| v & !(ALIGN - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_is_aligned_and_non_zero() {
        let mut memory = LinearMemory::new(4096);
        let a = memory.alloc(3).unwrap();
        let b = memory.alloc(5).unwrap();
        assert_eq!(a, HEAP_BASE);
        assert_eq!(b % ALIGN, 0);
        assert!(b >= a + 3);
    }

    #[test]
    fn test_zero_size_allocations_are_distinct() {
        let mut memory = LinearMemory::new(4096);
        assert_ne!(memory.alloc(0), memory.alloc(0));
    }

    #[test]
    fn test_free_reuses_gap() {
        let mut memory = LinearMemory::new(4096);
        let a = memory.alloc(64).unwrap();
        let _b = memory.alloc(64).unwrap();
        memory.free(a).unwrap();
        assert_eq!(memory.alloc(32), Some(a));
    }

    #[test]
    fn test_exhaustion() {
        let mut memory = LinearMemory::new(2048);
        assert!(memory.alloc(1024).is_some());
        assert!(memory.alloc(1).is_none());
    }

    #[test]
    fn test_double_free() {
        let mut memory = LinearMemory::new(4096);
        let a = memory.alloc(8).unwrap();
        assert_eq!(memory.free(a), Ok(8));
        assert_eq!(memory.free(a), Err(MemoryError::InvalidFree { address: a }));
    }

    #[test]
    fn test_out_of_bounds() {
        let mut memory = LinearMemory::new(2048);
        assert!(memory.read(2040, 16).is_err());
        assert!(memory.write(2047, &[1, 2]).is_err());
        assert!(memory.write(2046, &[1, 2]).is_ok());
    }

    #[test]
    fn test_peak_and_live_bytes() {
        let mut memory = LinearMemory::new(4096);
        let a = memory.alloc(10).unwrap();
        let b = memory.alloc(20).unwrap();
        assert_eq!(memory.live_bytes(), 30);
        memory.free(a).unwrap();
        memory.free(b).unwrap();
        assert_eq!(memory.live(), 0);
        assert_eq!(memory.peak_live(), 2);
    }

    proptest::proptest! {
        #[test]
        fn prop_allocations_never_overlap(sizes in proptest::collection::vec(0u32..200, 1..40)) {
            let mut memory = LinearMemory::new(64 * 1024);
            let mut regions: Vec<(u32, u32)> = Vec::new();
            for (i, size) in sizes.iter().enumerate() {
                if i % 3 == 2 && !regions.is_empty() {
                    let (start, _) = regions.remove(0);
                    memory.free(start).unwrap();
                }
                let start = memory.alloc(*size).unwrap();
                let len = (*size).max(1);
                for &(other, other_len) in &regions {
                    proptest::prop_assert!(start + len <= other || other + other_len <= start);
                }
                regions.push((start, len));
            }
        }
    }
}
