//! The VM's heap allocator.
//!
//! A first-fit allocator over the heap region. Blocks are tracked outside
//! VM memory (address and size only); the memory bytes themselves live in
//! the machine's flat address space.

use std::collections::BTreeMap;

use sin_core::memmap::{HEAP_MAX, HEAP_START};

#[derive(Debug, Default)]
pub struct Heap {
    /// Live allocations: address -> size in bytes.
    blocks: BTreeMap<u16, u16>,
}

impl Heap {
    pub fn new() -> Self {
        Heap::default()
    }

    /// Allocate `size` bytes, first-fit. Returns the block address, or
    /// `None` when the heap is exhausted.
    pub fn alloc(&mut self, size: u16) -> Option<u16> {
        if size == 0 || size as u32 > (HEAP_MAX - HEAP_START + 1) as u32 {
            return None;
        }
        let mut candidate = HEAP_START;
        for (&address, &block_size) in &self.blocks {
            if candidate + size <= address {
                break;
            }
            candidate = address + block_size;
        }
        if (candidate as u32) + (size as u32) - 1 > HEAP_MAX as u32 {
            return None;
        }
        self.blocks.insert(candidate, size);
        Some(candidate)
    }

    /// Release a block. Returns false when the address is not a live
    /// allocation.
    pub fn free(&mut self, address: u16) -> bool {
        self.blocks.remove(&address).is_some()
    }

    /// Resize a block, possibly moving it. Returns the new address and
    /// whether the data must be copied from the old block.
    pub fn realloc(&mut self, address: u16, size: u16) -> Option<(u16, bool)> {
        let old_size = *self.blocks.get(&address)?;
        if size <= old_size {
            self.blocks.insert(address, size);
            return Some((address, false));
        }
        // grow in place when the gap after the block allows it
        let next = self
            .blocks
            .range((address + 1)..)
            .next()
            .map(|(&a, _)| a)
            .unwrap_or(HEAP_MAX + 1);
        if address as u32 + size as u32 <= next as u32 {
            self.blocks.insert(address, size);
            return Some((address, false));
        }
        self.blocks.remove(&address);
        let new_address = self.alloc(size)?;
        Some((new_address, true))
    }

    pub fn is_live(&self, address: u16) -> bool {
        self.blocks.contains_key(&address)
    }

    pub fn size_of(&self, address: u16) -> Option<u16> {
        self.blocks.get(&address).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_starts_at_heap_base() {
        let mut heap = Heap::new();
        assert_eq!(heap.alloc(16), Some(HEAP_START));
        assert_eq!(heap.alloc(16), Some(HEAP_START + 16));
    }

    #[test]
    fn test_free_reuses_space() {
        let mut heap = Heap::new();
        let first = heap.alloc(16).unwrap();
        let _second = heap.alloc(16).unwrap();
        assert!(heap.free(first));
        assert_eq!(heap.alloc(8), Some(first));
    }

    #[test]
    fn test_double_free_reports_failure() {
        let mut heap = Heap::new();
        let block = heap.alloc(4).unwrap();
        assert!(heap.free(block));
        assert!(!heap.free(block));
    }

    #[test]
    fn test_realloc_in_place_and_moving() {
        let mut heap = Heap::new();
        let block = heap.alloc(8).unwrap();
        // nothing after it: grows in place
        assert_eq!(heap.realloc(block, 32), Some((block, false)));

        let blocker = heap.alloc(8).unwrap();
        assert_eq!(blocker, block + 32);
        // now growth must move
        let (moved, copy) = heap.realloc(block, 64).unwrap();
        assert!(copy);
        assert_ne!(moved, block);
    }

    #[test]
    fn test_exhaustion() {
        let mut heap = Heap::new();
        assert!(heap.alloc(HEAP_MAX - HEAP_START + 1).is_some());
        assert!(heap.alloc(1).is_none());
    }
}
