use core::fmt;

use crate::block::{payload_words, Block};
use crate::constants::{FREE_LIST_COUNT, MIN_BLOCK};
use crate::error::HeapCorruption;
use crate::region::Region;
use crate::sbrk::Sbrk;
use crate::size_class::SizeClass;

/// Segregated free lists. Each bucket is a singly linked LIFO list threaded
/// through the first payload word of its free blocks.
#[derive(Debug, Clone, Default)]
pub struct FreeLists {
    heads: [Option<Block>; FREE_LIST_COUNT],
}

impl FreeLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.heads = [None; FREE_LIST_COUNT];
    }

    pub fn head(&self, class: SizeClass) -> Option<Block> {
        self.heads[class.index()]
    }

    pub fn class_of<S: Sbrk>(region: &Region<S>, block: Block) -> Result<SizeClass, HeapCorruption> {
        SizeClass::for_payload_words(payload_words(block.size(region)?))
    }

    /// Pushes a free block onto the head of the bucket its size selects.
    pub fn insert<S: Sbrk>(&mut self, region: &mut Region<S>, block: Block) -> Result<(), HeapCorruption> {
        let class = Self::class_of(region, block)?;

        debug_assert!(!block.is_allocated(region)?);
        debug_assert_ne!(self.heads[class.index()], Some(block));

        block.set_link(region, self.heads[class.index()])?;
        self.heads[class.index()] = Some(block);

        Ok(())
    }

    /// Unlinks `block` from the bucket its current size selects.
    ///
    /// Returns `Ok(false)` if it is not there, which means its size tag no
    /// longer matches the bucket it was inserted under.
    pub fn remove<S: Sbrk>(&mut self, region: &mut Region<S>, block: Block) -> Result<bool, HeapCorruption> {
        let class = Self::class_of(region, block)?;
        let mut prev: Option<Block> = None;
        let mut cur = self.heads[class.index()];
        let mut remaining = max_entries(region);

        while let Some(candidate) = cur {
            if remaining == 0 {
                return Err(HeapCorruption::FreeListCycle {
                    bucket: class.index(),
                });
            }

            remaining -= 1;

            if candidate == block {
                let next = candidate.link(region)?;

                match prev {
                    Some(prev) => prev.set_link(region, next)?,
                    None => self.heads[class.index()] = next,
                }

                return Ok(true);
            }

            prev = cur;
            cur = candidate.link(region)?;
        }

        Ok(false)
    }

    /// Like `remove`, but a miss is reported as corruption.
    pub fn unlink<S: Sbrk>(&mut self, region: &mut Region<S>, block: Block) -> Result<(), HeapCorruption> {
        if self.remove(region, block)? {
            Ok(())
        } else {
            Err(HeapCorruption::MissingFromFreeList {
                offset: block.offset(),
                bucket: Self::class_of(region, block)?.index(),
            })
        }
    }

    /// Walks one bucket, following links from its head. A bucket longer than
    /// the region could hold ends with `FreeListCycle`.
    pub fn iter<'a, S: Sbrk>(&self, region: &'a Region<S>, class: SizeClass) -> Bucket<'a, S> {
        Bucket {
            region,
            class,
            cur: self.head(class),
            remaining: max_entries(region),
        }
    }

    pub fn contains<S: Sbrk>(&self, region: &Region<S>, class: SizeClass, block: Block) -> Result<bool, HeapCorruption> {
        for entry in self.iter(region, class) {
            if entry? == block {
                return Ok(true);
            }
        }

        Ok(false)
    }

    pub fn dump<'a, S: Sbrk>(&'a self, region: &'a Region<S>) -> FreeListDump<'a, S> {
        FreeListDump { lists: self, region }
    }
}

// most free blocks a region of this length can hold
fn max_entries<S: Sbrk>(region: &Region<S>) -> usize {
    region.len() / MIN_BLOCK + 1
}

pub struct Bucket<'a, S> {
    region: &'a Region<S>,
    class: SizeClass,
    cur: Option<Block>,
    remaining: usize,
}

impl<'a, S: Sbrk> Iterator for Bucket<'a, S> {
    type Item = Result<Block, HeapCorruption>;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.cur?;

        if self.remaining == 0 {
            self.cur = None;

            return Some(Err(HeapCorruption::FreeListCycle {
                bucket: self.class.index(),
            }));
        }

        self.remaining -= 1;

        match block.link(self.region) {
            Ok(next) => {
                self.cur = next;
                Some(Ok(block))
            }
            Err(err) => {
                self.cur = None;
                Some(Err(err))
            }
        }
    }
}

/// Debug rendering of every bucket, one line each. A cyclic bucket prints
/// until the walk gives up on it.
pub struct FreeListDump<'a, S> {
    lists: &'a FreeLists,
    region: &'a Region<S>,
}

impl<S: Sbrk> fmt::Display for FreeListDump<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for class in SizeClass::all() {
            write!(f, "free_list[{}]: ", class.index())?;

            for entry in self.lists.iter(self.region, class) {
                let block = match entry {
                    Ok(block) => block,
                    Err(err) => {
                        write!(f, "<{err}>")?;
                        break;
                    }
                };

                match (block.tag(self.region), block.link(self.region)) {
                    (Ok(tag), Ok(next)) => {
                        let next = next.map_or(0, Block::offset);

                        write!(f, "[off = {:#x}, size = {}, next = {next:#x}]", block.offset(), tag.size)?;

                        if tag.allocated {
                            write!(f, ", ERROR: ALLOCATED!!")?;
                        }
                    }
                    (Err(err), _) | (_, Err(err)) => write!(f, "[off = {:#x}, <{err}>]", block.offset())?,
                }

                write!(f, "-->")?;
            }

            writeln!(f)?;
        }

        Ok(())
    }
}
