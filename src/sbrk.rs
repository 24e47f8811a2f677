use crate::constants::MAX_HEAP;

/// The region-growth primitive the heap is built on.
///
/// Implementations own a contiguous byte store that only ever grows at its
/// high end. Offsets handed out by `sbrk` stay valid for the life of the store.
pub trait Sbrk {
    /// Grows the store by `increment` bytes and returns the old break, which is
    /// the offset of the first new byte. Returns `None` if the store cannot grow.
    fn sbrk(&mut self, increment: usize) -> Option<usize>;

    fn bytes(&self) -> &[u8];

    fn bytes_mut(&mut self) -> &mut [u8];

    /// Current break, in bytes.
    fn len(&self) -> usize {
        self.bytes().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An in-process memory system: a zeroed `Vec<u8>` capped at `max_heap` bytes.
#[derive(Debug, Clone)]
pub struct MemLib {
    heap: Vec<u8>,
    max_heap: usize,
}

impl Default for MemLib {
    fn default() -> Self {
        Self::new(MAX_HEAP)
    }
}

impl MemLib {
    pub fn new(max_heap: usize) -> Self {
        Self {
            heap: Vec::new(),
            max_heap,
        }
    }

    pub fn max_heap(&self) -> usize {
        self.max_heap
    }
}

impl Sbrk for MemLib {
    fn sbrk(&mut self, increment: usize) -> Option<usize> {
        let old_brk = self.heap.len();
        let new_brk = old_brk.checked_add(increment)?;

        if new_brk > self.max_heap {
            log::warn!("mem_sbrk: {increment} bytes past a break of {old_brk} exceeds {}", self.max_heap);
            return None;
        }

        self.heap.resize(new_brk, 0);

        Some(old_brk)
    }

    fn bytes(&self) -> &[u8] {
        &self.heap
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.heap
    }
}
