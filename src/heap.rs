use crate::allocator::Allocator;
use crate::block::{Block, Handle};
use crate::check::{Blocks, HeapStats};
use crate::config::HeapConfig;
use crate::constants::{DWORD, FIRST_PAYLOAD, MIN_BLOCK};
use crate::error::{AllocError, HeapCorruption};
use crate::free_list::FreeListDump;
use crate::sbrk::{MemLib, Sbrk};

/// A single-threaded heap over one growable region.
///
/// Handles returned by `allocate` and `resize` are payload offsets, double
/// word aligned relative to the start of the region. The caller owns a
/// payload until it is passed back to `deallocate` or `resize`.
///
/// Freeing a handle twice, freeing a handle this heap never returned, or
/// using a handle after freeing it are not detected and leave the heap in an
/// unspecified state. If any operation finds the heap's structure corrupted,
/// it returns `AllocError::Corrupted` and the heap refuses all later requests
/// with `AllocError::Poisoned`.
pub struct Heap<S: Sbrk = MemLib> {
    allocator: Allocator<S>,
    poisoned: bool,
}

impl Heap {
    pub fn new() -> Result<Self, AllocError> {
        Self::with_config(HeapConfig::default())
    }

    pub fn with_config(config: HeapConfig) -> Result<Self, AllocError> {
        Self::with_source(MemLib::new(config.max_heap), config)
    }
}

impl<S: Sbrk> Heap<S> {
    /// Lays out the region over `source` and creates the initial free block.
    pub fn with_source(source: S, config: HeapConfig) -> Result<Self, AllocError> {
        let allocator = Allocator::new(source, config)?;

        Ok(Self {
            allocator,
            poisoned: false,
        })
    }

    /// Returns `None` for a zero-byte request.
    pub fn allocate(&mut self, size: usize) -> Result<Option<Handle>, AllocError> {
        self.healthy()?;

        let result = self.allocator.allocate(size);

        self.poison_on_corruption(result).map(|block| block.map(Handle::from))
    }

    /// Accepts `None` as a no-op.
    pub fn deallocate(&mut self, handle: Option<Handle>) -> Result<(), AllocError> {
        self.healthy()?;

        let result = self
            .allocator
            .free(handle.map(Block::from))
            .map_err(AllocError::from);

        self.poison_on_corruption(result)
    }

    /// `resize(None, n)` is `allocate(n)`; `resize(h, 0)` is `deallocate(h)`
    /// and returns `None`. When the payload has to move, the first
    /// `min(old capacity, size)` bytes are copied and the old block is freed;
    /// if that move fails for lack of memory the old block is left intact.
    pub fn resize(&mut self, handle: Option<Handle>, size: usize) -> Result<Option<Handle>, AllocError> {
        self.healthy()?;

        let result = self.allocator.resize(handle.map(Block::from), size);

        self.poison_on_corruption(result).map(|block| block.map(Handle::from))
    }

    /// The usable bytes of an allocated block.
    pub fn payload(&self, handle: Handle) -> Result<&[u8], AllocError> {
        let len = self.capacity(handle)?;

        Ok(self.allocator.region.bytes(handle.offset(), len)?)
    }

    pub fn payload_mut(&mut self, handle: Handle) -> Result<&mut [u8], AllocError> {
        let len = self.capacity(handle)?;

        Ok(self.allocator.region.bytes_mut(handle.offset(), len)?)
    }

    /// Size of the block behind `handle`, including its tags.
    pub fn block_size(&self, handle: Handle) -> Result<usize, AllocError> {
        Ok(self.capacity(handle)? + DWORD)
    }

    // payload capacity, after checking that `handle` names an allocated block
    fn capacity(&self, handle: Handle) -> Result<usize, AllocError> {
        self.healthy()?;

        let region = &self.allocator.region;
        let offset = handle.offset();

        if offset < FIRST_PAYLOAD || offset % DWORD != 0 || offset >= region.epilogue() {
            return Err(AllocError::InvalidHandle(handle));
        }

        let block = Block::from(handle);
        let header = block.tag(region)?;

        if !header.allocated || header.size < MIN_BLOCK || block.footer_tag(region)? != header {
            return Err(AllocError::InvalidHandle(handle));
        }

        Ok(header.size - DWORD)
    }

    /// Current extent of the region, sentinels included.
    pub fn region_size(&self) -> usize {
        self.allocator.region.len()
    }

    pub fn config(&self) -> &HeapConfig {
        self.allocator.config()
    }

    pub fn stats(&self) -> HeapStats {
        self.allocator.stats()
    }

    pub fn blocks(&self) -> Blocks<'_, S> {
        self.allocator.blocks()
    }

    pub fn free_lists(&self) -> FreeListDump<'_, S> {
        self.allocator.free_lists.dump(&self.allocator.region)
    }

    pub fn verify(&self) -> Result<(), HeapCorruption> {
        self.allocator.verify()
    }

    pub fn check_consistency(&self) -> bool {
        self.allocator.check_consistency()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn healthy(&self) -> Result<(), AllocError> {
        if self.poisoned {
            Err(AllocError::Poisoned)
        } else {
            Ok(())
        }
    }

    fn poison_on_corruption<T>(&mut self, result: Result<T, AllocError>) -> Result<T, AllocError> {
        if let Err(AllocError::Corrupted(corruption)) = &result {
            log::error!("heap poisoned: {corruption}");
            self.poisoned = true;
        }

        result
    }
}
