use crate::allocator::Allocator;
use crate::block::Block;
use crate::constants::{DWORD, MIN_BLOCK, SENTINEL, WORD};
use crate::error::HeapCorruption;
use crate::free_list::FreeLists;
use crate::region::Region;
use crate::sbrk::Sbrk;
use crate::size_class::SizeClass;

/// One block seen by an address-order walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Payload offset.
    pub offset: usize,
    /// Size including header and footer.
    pub size: usize,
    pub allocated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub region_bytes: usize,
    pub allocated_blocks: usize,
    pub allocated_bytes: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
    pub largest_free: usize,
}

/// Walks blocks by address from the first block up to the epilogue. Stops
/// early at a block whose size would not move the walk forward or would
/// carry it past the end of the address space.
pub struct Blocks<'a, S> {
    region: &'a Region<S>,
    cur: Block,
}

impl<'a, S: Sbrk> Iterator for Blocks<'a, S> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        if self.cur.offset() >= self.region.epilogue() {
            return None;
        }

        let tag = self.cur.tag(self.region).ok()?;

        if tag.size < DWORD {
            return None;
        }

        let info = BlockInfo {
            offset: self.cur.offset(),
            size: tag.size,
            allocated: tag.allocated,
        };

        self.cur = Block::from_offset(self.cur.offset().checked_add(tag.size).unwrap_or(usize::MAX));

        Some(info)
    }
}

impl<S: Sbrk> Allocator<S> {
    pub fn blocks(&self) -> Blocks<'_, S> {
        Blocks {
            region: &self.region,
            cur: self.region.first_block(),
        }
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            region_bytes: self.region.len(),
            ..HeapStats::default()
        };

        for block in self.blocks() {
            if block.allocated {
                stats.allocated_blocks += 1;
                stats.allocated_bytes += block.size;
            } else {
                stats.free_blocks += 1;
                stats.free_bytes += block.size;
                stats.largest_free = stats.largest_free.max(block.size);
            }
        }

        stats
    }

    /// Full heap walk. Checks that every block's tags agree and are well
    /// formed, that the walk lands exactly on the epilogue, that every free
    /// block is linked in the bucket its size selects, and that every bucket
    /// holds only free blocks of its own class.
    pub fn verify(&self) -> Result<(), HeapCorruption> {
        let region = &self.region;
        let mut block = region.first_block();
        let mut free_blocks = 0;

        if region.word(0)? != SENTINEL {
            return Err(HeapCorruption::BadPrologue);
        }

        while block.offset() < region.epilogue() {
            let header = block.tag(region)?;

            if header.size < MIN_BLOCK || header.size % DWORD != 0 {
                return Err(HeapCorruption::BadBlockSize {
                    offset: block.offset(),
                    size: header.size,
                });
            }

            let footer = block.footer_tag(region)?;

            if header != footer {
                return Err(HeapCorruption::TagMismatch {
                    offset: block.offset(),
                    header_size: header.size,
                    header_alloc: header.allocated,
                    footer_size: footer.size,
                    footer_alloc: footer.allocated,
                });
            }

            log::trace!("block {:#x}: size = {}, allocated = {}", block.offset(), header.size, header.allocated);

            if !header.allocated {
                free_blocks += 1;

                let class = FreeLists::class_of(region, block)?;

                if !self.free_lists.contains(region, class, block)? {
                    return Err(HeapCorruption::MissingFromFreeList {
                        offset: block.offset(),
                        bucket: class.index(),
                    });
                }
            }

            block = Block::from_offset(block.offset() + header.size);
        }

        if block.offset() != region.epilogue() || region.word(region.len() - WORD)? != SENTINEL {
            return Err(HeapCorruption::BadEpilogue {
                offset: block.offset(),
            });
        }

        self.verify_buckets(free_blocks)
    }

    fn verify_buckets(&self, free_blocks: usize) -> Result<(), HeapCorruption> {
        let region = &self.region;
        let mut linked = 0;

        for class in SizeClass::all() {
            for entry in self.free_lists.iter(region, class) {
                let block = entry?;

                linked += 1;

                if linked > free_blocks {
                    return Err(HeapCorruption::FreeListCycle {
                        bucket: class.index(),
                    });
                }

                if block.is_allocated(region)? {
                    return Err(HeapCorruption::AllocatedInFreeList {
                        offset: block.offset(),
                        bucket: class.index(),
                    });
                }

                let expected = FreeLists::class_of(region, block)?;

                if expected != class {
                    return Err(HeapCorruption::WrongBucket {
                        offset: block.offset(),
                        expected: expected.index(),
                        found: class.index(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn check_consistency(&self) -> bool {
        self.verify().is_ok()
    }
}
