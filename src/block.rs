use core::fmt;

use crate::constants::{ALLOCATED_BIT, DWORD, SIZE_MASK, WORD};
use crate::error::HeapCorruption;
use crate::region::Region;
use crate::sbrk::Sbrk;

/// A boundary tag: one word holding a block's size and allocated bit,
/// written identically in the header and the footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub size: usize,
    pub allocated: bool,
}

impl Tag {
    pub const fn free(size: usize) -> Self {
        Self {
            size,
            allocated: false,
        }
    }

    pub const fn allocated(size: usize) -> Self {
        Self {
            size,
            allocated: true,
        }
    }

    pub fn encode(self) -> u64 {
        let bit = if self.allocated { ALLOCATED_BIT } else { 0 };

        (self.size as u64 & SIZE_MASK) | bit
    }

    pub fn decode(word: u64) -> Self {
        Self {
            size: (word & SIZE_MASK) as usize,
            allocated: word & ALLOCATED_BIT != 0,
        }
    }
}

/// Caller-facing reference to an allocated payload: its offset in the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(usize);

impl Handle {
    pub fn offset(self) -> usize {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<Block> for Handle {
    fn from(block: Block) -> Self {
        Self(block.offset())
    }
}

impl From<Handle> for Block {
    fn from(handle: Handle) -> Self {
        Self(handle.0)
    }
}

/// A block named by its payload offset.
///
/// ```text
///        header          payload / free link          footer
///   | size | a |  ..........................  | size | a |
///              ^ offset                        ^ offset + size - DWORD
/// ```
///
/// Free and allocated blocks both keep an accurate footer so `prev` works
/// from any block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(usize);

impl Block {
    pub const fn from_offset(offset: usize) -> Self {
        Self(offset)
    }

    pub const fn offset(self) -> usize {
        self.0
    }

    // wraps for bogus offsets so the bounds check rejects them
    pub fn header(self) -> usize {
        self.0.wrapping_sub(WORD)
    }

    pub fn tag<S: Sbrk>(self, region: &Region<S>) -> Result<Tag, HeapCorruption> {
        Ok(Tag::decode(region.word(self.header())?))
    }

    pub fn size<S: Sbrk>(self, region: &Region<S>) -> Result<usize, HeapCorruption> {
        Ok(self.tag(region)?.size)
    }

    pub fn is_allocated<S: Sbrk>(self, region: &Region<S>) -> Result<bool, HeapCorruption> {
        Ok(self.tag(region)?.allocated)
    }

    /// The footer offset implied by the header's size.
    pub fn footer<S: Sbrk>(self, region: &Region<S>) -> Result<usize, HeapCorruption> {
        let size = self.size(region)?;

        self.0
            .checked_add(size)
            .and_then(|end| end.checked_sub(DWORD))
            .ok_or(HeapCorruption::BadBlockSize {
                offset: self.0,
                size,
            })
    }

    pub fn footer_tag<S: Sbrk>(self, region: &Region<S>) -> Result<Tag, HeapCorruption> {
        Ok(Tag::decode(region.word(self.footer(region)?)?))
    }

    /// Writes the header, then the footer at the position `tag.size` implies.
    pub fn write_tags<S: Sbrk>(self, region: &mut Region<S>, tag: Tag) -> Result<(), HeapCorruption> {
        region.set_word(self.header(), tag.encode())?;

        let footer = self.footer(region)?;
        region.set_word(footer, tag.encode())
    }

    /// Marks the block allocated at `size` and clears the word that served as
    /// its free-list link.
    pub fn place<S: Sbrk>(self, region: &mut Region<S>, size: usize) -> Result<(), HeapCorruption> {
        self.write_tags(region, Tag::allocated(size))?;
        self.set_link(region, None)
    }

    pub fn next<S: Sbrk>(self, region: &Region<S>) -> Result<Block, HeapCorruption> {
        let size = self.size(region)?;

        self.0
            .checked_add(size)
            .filter(|_| size >= DWORD)
            .map(Self)
            .ok_or(HeapCorruption::BadBlockSize {
                offset: self.0,
                size,
            })
    }

    /// The block that ends right before this one, found through its footer.
    pub fn prev<S: Sbrk>(self, region: &Region<S>) -> Result<Block, HeapCorruption> {
        let prev_footer = Tag::decode(region.word(self.0.wrapping_sub(DWORD))?);

        self.0
            .checked_sub(prev_footer.size)
            .filter(|_| prev_footer.size >= DWORD)
            .map(Self)
            .ok_or(HeapCorruption::BadBlockSize {
                offset: self.0,
                size: prev_footer.size,
            })
    }

    pub fn link<S: Sbrk>(self, region: &Region<S>) -> Result<Option<Block>, HeapCorruption> {
        let next = region.word(self.0)? as usize;

        Ok((next != 0).then_some(Self(next)))
    }

    pub fn set_link<S: Sbrk>(self, region: &mut Region<S>, next: Option<Block>) -> Result<(), HeapCorruption> {
        let word = next.map_or(0, |block| block.0 as u64);

        region.set_word(self.0, word)
    }
}

/// Payload words of a block of `size` bytes, as used for bucket lookup.
pub const fn payload_words(size: usize) -> usize {
    size.saturating_sub(DWORD) / WORD
}
