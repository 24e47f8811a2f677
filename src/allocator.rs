use super::block::{payload_words, Block, Tag};
use super::config::HeapConfig;
use super::constants::{DWORD, MIN_BLOCK, WORD};
use super::error::{AllocError, HeapCorruption};
use super::free_list::FreeLists;
use super::region::Region;
use super::sbrk::Sbrk;
use super::size_class::SizeClass;

/// The allocation engine: one region, its segregated free lists, and the
/// fit, split, coalesce and resize logic that ties them together.
pub struct Allocator<S> {
    pub(crate) region: Region<S>,
    pub(crate) free_lists: FreeLists,
    config: HeapConfig,
}

/// Block size for a request of `size` bytes: room for the tags, rounded up to
/// a whole number of double words, never below `MIN_BLOCK`.
pub fn adjust_size(size: usize) -> Result<usize, AllocError> {
    if size <= DWORD {
        return Ok(MIN_BLOCK);
    }

    let padded = size
        .checked_add(2 * DWORD - 1)
        .ok_or(AllocError::AllocOverflow)?;

    Ok(DWORD * (padded / DWORD))
}

impl<S: Sbrk> Allocator<S> {
    pub fn new(source: S, config: HeapConfig) -> Result<Self, AllocError> {
        let config = config.normalized()?;
        let (region, block) =
            Region::init(source, config.initial_free_words).ok_or(AllocError::OOM)?;

        let mut allocator = Self {
            region,
            free_lists: FreeLists::new(),
            config,
        };

        allocator.free_lists.clear();
        allocator.free_lists.insert(&mut allocator.region, block)?;

        log::debug!(
            "heap initialized: {} bytes, first block {} bytes",
            allocator.region.len(),
            block.size(&allocator.region)?
        );

        Ok(allocator)
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// `None` for a zero-byte request.
    pub fn allocate(&mut self, size: usize) -> Result<Option<Block>, AllocError> {
        if size == 0 {
            return Ok(None);
        }

        self.allocate_nonzero(size).map(Some)
    }

    fn allocate_nonzero(&mut self, size: usize) -> Result<Block, AllocError> {
        let asize = adjust_size(size)?;

        let block = match self.find_fit(asize)? {
            Some(block) => block,
            None => {
                let words = asize.max(self.config.growth_chunk) / WORD;

                self.extend(words)?.ok_or_else(|| {
                    log::warn!("malloc({size}): region cannot grow by {words} words");
                    AllocError::OOM
                })?
            }
        };

        let block_size = block.size(&self.region)?;
        let leftover = block_size
            .checked_sub(asize)
            .ok_or(HeapCorruption::BadBlockSize {
                offset: block.offset(),
                size: block_size,
            })?;

        let placed = match leftover {
            0 => asize,
            // a lone double word cannot hold a free block
            DWORD => block_size,
            _ => {
                let rest = Block::from_offset(block.offset() + asize);

                rest.write_tags(&mut self.region, Tag::free(leftover))?;
                self.free_lists.insert(&mut self.region, rest)?;

                asize
            }
        };

        block.place(&mut self.region, placed)?;

        log::trace!("malloc({size}) -> {:#x} ({placed} byte block)", block.offset());

        Ok(block)
    }

    /// Best fit within the first bucket, starting from `asize`'s own class,
    /// that has any block large enough. The chosen block is unlinked.
    pub fn find_fit(&mut self, asize: usize) -> Result<Option<Block>, HeapCorruption> {
        let start = SizeClass::for_payload_words(payload_words(asize))?;

        for class in start.and_larger() {
            let mut best: Option<(Block, usize)> = None;

            for entry in self.free_lists.iter(&self.region, class) {
                let block = entry?;
                let size = block.size(&self.region)?;

                if size == asize {
                    best = Some((block, size));
                    break;
                }

                if size > asize && best.map_or(true, |(_, best_size)| size < best_size) {
                    best = Some((block, size));
                }
            }

            if let Some((block, size)) = best {
                log::trace!(
                    "fit for {asize}: {:#x} ({size} bytes) in bucket {}",
                    block.offset(),
                    class.index()
                );

                self.free_lists.unlink(&mut self.region, block)?;

                return Ok(Some(block));
            }
        }

        Ok(None)
    }

    /// Grows the region by `words` and coalesces the new space with a free
    /// tail. The result is free but not in any free list.
    pub fn extend(&mut self, words: usize) -> Result<Option<Block>, HeapCorruption> {
        match self.region.extend(words)? {
            Some(block) => self.coalesce(block).map(Some),
            None => Ok(None),
        }
    }

    /// Returns a block to its free list after merging it with free neighbours.
    ///
    /// Freeing a block twice, or freeing something that was never allocated
    /// here, is not detected.
    pub fn free(&mut self, block: Option<Block>) -> Result<(), HeapCorruption> {
        let Some(block) = block else {
            return Ok(());
        };

        let size = block.size(&self.region)?;
        block.write_tags(&mut self.region, Tag::free(size))?;

        let merged = self.coalesce(block)?;
        self.free_lists.insert(&mut self.region, merged)?;

        log::trace!("free({:#x}) -> {:#x} free", block.offset(), merged.offset());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GROWTH_CHUNK;
    use crate::sbrk::MemLib;

    fn allocator() -> Allocator<MemLib> {
        Allocator::new(MemLib::default(), HeapConfig::default()).unwrap()
    }

    #[test]
    fn adjust_size_rounds_to_double_words() {
        assert_eq!(adjust_size(1).unwrap(), 32);
        assert_eq!(adjust_size(16).unwrap(), 32);
        assert_eq!(adjust_size(17).unwrap(), 48);
        assert_eq!(adjust_size(32).unwrap(), 48);
        assert_eq!(adjust_size(100).unwrap(), 128);
        assert_eq!(adjust_size(usize::MAX), Err(AllocError::AllocOverflow));
    }

    #[test]
    fn zero_sized_request_is_none() {
        let mut alloc = allocator();
        let len = alloc.region.len();

        assert_eq!(alloc.allocate(0).unwrap(), None);
        assert_eq!(alloc.region.len(), len);
    }

    #[test]
    fn allocate_splits_initial_block() {
        let mut alloc = allocator();
        let first = alloc.region.first_block();
        let total = first.size(&alloc.region).unwrap();

        let block = alloc.allocate(100).unwrap().unwrap();

        assert_eq!(block, first);
        assert_eq!(block.tag(&alloc.region).unwrap(), Tag::allocated(128));

        let rest = block.next(&alloc.region).unwrap();
        assert_eq!(rest.tag(&alloc.region).unwrap(), Tag::free(total - 128));
        assert_eq!(rest.footer_tag(&alloc.region).unwrap(), Tag::free(total - 128));
    }

    #[test]
    fn one_double_word_leftover_is_folded_in() {
        let mut alloc = Allocator::new(MemLib::default(), HeapConfig::default().with_initial_free_words(4)).unwrap();
        let first = alloc.region.first_block();

        // the 48 byte block would leave a 16 byte sliver after a 32 byte fit
        let block = alloc.allocate(8).unwrap().unwrap();

        assert_eq!(block, first);
        assert_eq!(block.size(&alloc.region).unwrap(), 48);
        assert_eq!(block.next(&alloc.region).unwrap().offset(), alloc.region.epilogue());
    }

    #[test]
    fn find_fit_prefers_exact_then_smallest() {
        let mut alloc = allocator();

        let a = alloc.allocate(80).unwrap().unwrap(); // 96
        let _ = alloc.allocate(8).unwrap().unwrap();
        let b = alloc.allocate(64).unwrap().unwrap(); // 80
        let _ = alloc.allocate(8).unwrap().unwrap();
        let c = alloc.allocate(90).unwrap().unwrap(); // 112
        let _ = alloc.allocate(8).unwrap().unwrap();

        for block in [a, b, c] {
            alloc.free(Some(block)).unwrap();
        }

        // 96 and 112 share bucket 4, 96 is the exact fit
        assert_eq!(alloc.find_fit(96).unwrap(), Some(a));
        // 80 sits in bucket 3 and is never considered
        assert_eq!(alloc.find_fit(96).unwrap(), Some(c));
        assert_eq!(alloc.find_fit(80).unwrap(), Some(b));
    }

    #[test]
    fn find_fit_moves_up_buckets() {
        let mut alloc = allocator();

        // the initial block is the only free block
        assert_eq!(alloc.find_fit(32).unwrap(), Some(alloc.region.first_block()));
        assert_eq!(alloc.find_fit(32).unwrap(), None);
    }

    #[test]
    fn allocation_larger_than_heap_grows_region() {
        let mut alloc = allocator();
        let len = alloc.region.len();
        let request = 2 * (len + GROWTH_CHUNK);

        let block = alloc.allocate(request).unwrap().unwrap();

        assert!(alloc.region.len() > len);
        // the old free tail was folded into the growth
        assert_eq!(block, alloc.region.first_block());
        assert!(block.size(&alloc.region).unwrap() >= request + DWORD);
    }

    #[test]
    fn exhaustion_is_oom() {
        let config = HeapConfig::default().with_initial_free_words(16);
        let mut alloc = Allocator::new(MemLib::new(1024), config).unwrap();

        assert_eq!(alloc.allocate(4096), Err(AllocError::OOM));
        assert!(alloc.allocate(64).unwrap().is_some());
    }

    #[test]
    fn free_of_none_is_noop() {
        let mut alloc = allocator();

        alloc.free(None).unwrap();
    }

    #[test]
    fn free_reinserts_merged_block() {
        let mut alloc = allocator();
        let first = alloc.region.first_block();
        let total = first.size(&alloc.region).unwrap();

        let a = alloc.allocate(100).unwrap().unwrap();
        alloc.free(Some(a)).unwrap();

        assert_eq!(a.tag(&alloc.region).unwrap(), Tag::free(total));
        let class = FreeLists::class_of(&alloc.region, first).unwrap();
        assert_eq!(alloc.free_lists.head(class), Some(first));
    }
}
