use crate::allocator::{adjust_size, Allocator};
use crate::block::{Block, Tag};
use crate::constants::{DWORD, MIN_BLOCK};
use crate::error::AllocError;
use crate::sbrk::Sbrk;

impl<S: Sbrk> Allocator<S> {
    /// Resizes `block` to hold `size` bytes.
    ///
    /// Shrinks and grows in place when it can; otherwise moves the payload to
    /// a new block. If that allocation fails the original block is untouched.
    pub fn resize(&mut self, block: Option<Block>, size: usize) -> Result<Option<Block>, AllocError> {
        let Some(block) = block else {
            return self.allocate(size);
        };

        if size == 0 {
            self.free(Some(block))?;
            return Ok(None);
        }

        let new_size = adjust_size(size)?;
        let old_size = block.size(&self.region)?;

        if new_size == old_size {
            return Ok(Some(block));
        }

        if new_size < old_size {
            self.shrink(block, old_size, new_size)?;
            return Ok(Some(block));
        }

        let next = block.next(&self.region)?;
        let next_tag = next.tag(&self.region)?;

        if !next_tag.allocated && old_size + next_tag.size >= new_size {
            self.free_lists.unlink(&mut self.region, next)?;

            let combined = old_size + next_tag.size;
            block.write_tags(&mut self.region, Tag::allocated(combined))?;

            log::trace!("realloc({:#x}, {size}) grew in place to {combined}", block.offset());

            return Ok(Some(block));
        }

        let Some(moved) = self.allocate(size)? else {
            return Ok(None);
        };

        let keep = (old_size - DWORD).min(size);
        self.region.copy(block.offset(), moved.offset(), keep)?;
        self.free(Some(block))?;

        log::trace!("realloc({:#x}, {size}) moved to {:#x}", block.offset(), moved.offset());

        Ok(Some(moved))
    }

    // the remainder is not merged with a free block that may follow it
    fn shrink(&mut self, block: Block, old_size: usize, new_size: usize) -> Result<(), AllocError> {
        if old_size - new_size < MIN_BLOCK {
            return Ok(());
        }

        block.write_tags(&mut self.region, Tag::allocated(new_size))?;

        let rest = Block::from_offset(block.offset() + new_size);
        rest.write_tags(&mut self.region, Tag::free(old_size - new_size))?;
        self.free_lists.insert(&mut self.region, rest)?;

        log::trace!("realloc({:#x}) shrank {old_size} -> {new_size}", block.offset());

        Ok(())
    }
}
