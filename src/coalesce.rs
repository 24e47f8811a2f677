use crate::allocator::Allocator;
use crate::block::{Block, Tag};
use crate::constants::DWORD;
use crate::error::HeapCorruption;
use crate::sbrk::Sbrk;

impl<S: Sbrk> Allocator<S> {
    /// Merges the free block `block` with whichever address neighbours are
    /// free, unlinking them from their buckets. Returns the merged block,
    /// which is left out of every free list.
    ///
    /// A neighbour that is free but missing from its bucket is corruption.
    pub fn coalesce(&mut self, block: Block) -> Result<Block, HeapCorruption> {
        let region = &self.region;

        // the first block's "previous footer" is the prologue
        let prev_alloc = block == region.first_block()
            || Tag::decode(region.word(block.offset() - DWORD)?).allocated;
        let next = block.next(region)?;
        let next_alloc = next.is_allocated(region)?;
        let mut size = block.size(region)?;

        let merged = match (prev_alloc, next_alloc) {
            (true, true) => block,
            (true, false) => {
                self.free_lists.unlink(&mut self.region, next)?;

                size += next.size(&self.region)?;
                block.write_tags(&mut self.region, Tag::free(size))?;

                block
            }
            (false, true) => {
                let prev = block.prev(&self.region)?;
                self.free_lists.unlink(&mut self.region, prev)?;

                size += prev.size(&self.region)?;
                prev.write_tags(&mut self.region, Tag::free(size))?;

                prev
            }
            (false, false) => {
                let prev = block.prev(&self.region)?;
                self.free_lists.unlink(&mut self.region, prev)?;
                self.free_lists.unlink(&mut self.region, next)?;

                size += prev.size(&self.region)? + next.size(&self.region)?;
                prev.write_tags(&mut self.region, Tag::free(size))?;

                prev
            }
        };

        if !(prev_alloc && next_alloc) {
            log::trace!("coalesced {:#x} into {:#x} ({size} bytes)", block.offset(), merged.offset());
        }

        Ok(merged)
    }
}
