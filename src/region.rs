use super::block::{Block, Tag};
use super::constants::{DWORD, FIRST_PAYLOAD, SENTINEL, WORD};
use super::error::HeapCorruption;
use super::sbrk::Sbrk;

/// The single contiguous region, bounded by a prologue word at offset 0 and an
/// epilogue word in its last `WORD` bytes.
///
/// All tag and link traffic goes through `word`/`set_word`, which are bounds
/// checked against the current break.
pub struct Region<S> {
    source: S,
}

impl<S: Sbrk> Region<S> {
    /// Lays out `prologue | header | payload_words | footer | epilogue` over a
    /// freshly grown source. Returns the initial free block, not yet in any
    /// free list.
    pub fn init(mut source: S, payload_words: usize) -> Option<(Self, Block)> {
        let bytes = payload_words.checked_add(4)?.checked_mul(WORD)?;
        let base = source.sbrk(bytes)?;

        // block offsets are measured from the start of the source
        if base != 0 {
            log::warn!("region source already holds {base} bytes");
            return None;
        }

        let mut region = Self { source };
        let size = payload_words * WORD + DWORD;
        let block = Block::from_offset(FIRST_PAYLOAD);

        region.set_word(0, SENTINEL).ok()?;
        block.write_tags(&mut region, Tag::free(size)).ok()?;
        region.write_epilogue().ok()?;

        Some((region, block))
    }

    /// Grows the region by `words` (rounded up to an even count), minus the
    /// size of a free block already sitting before the epilogue. The old
    /// epilogue becomes the header of the returned free block.
    ///
    /// `Ok(None)` means the source refused to grow.
    pub fn extend(&mut self, words: usize) -> Result<Option<Block>, HeapCorruption> {
        let words = words + words % 2;
        let mut size = words * WORD;

        let tail = Tag::decode(self.word(self.len() - DWORD)?);
        if !tail.allocated {
            size = size.saturating_sub(tail.size).max(DWORD);
        }

        let Some(old_brk) = self.source.sbrk(size) else {
            return Ok(None);
        };

        let block = Block::from_offset(old_brk);

        block.write_tags(self, Tag::free(size))?;
        self.write_epilogue()?;

        log::debug!("region grew by {size} bytes to {}", self.len());

        Ok(Some(block))
    }

    fn write_epilogue(&mut self) -> Result<(), HeapCorruption> {
        let end = self.len() - WORD;

        self.set_word(end, SENTINEL)
    }

    pub fn first_block(&self) -> Block {
        Block::from_offset(FIRST_PAYLOAD)
    }

    /// Offset one past the payload of the last possible block: a block whose
    /// payload starts here is the epilogue.
    pub fn epilogue(&self) -> usize {
        self.len()
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn word(&self, offset: usize) -> Result<u64, HeapCorruption> {
        let bytes = self.bytes(offset, WORD)?;

        let mut word = [0; WORD];
        word.copy_from_slice(bytes);

        Ok(u64::from_le_bytes(word))
    }

    pub fn set_word(&mut self, offset: usize, value: u64) -> Result<(), HeapCorruption> {
        let bytes = self.bytes_mut(offset, WORD)?;

        bytes.copy_from_slice(&value.to_le_bytes());

        Ok(())
    }

    pub fn bytes(&self, offset: usize, len: usize) -> Result<&[u8], HeapCorruption> {
        let region_len = self.len();

        offset
            .checked_add(len)
            .and_then(|end| self.source.bytes().get(offset..end))
            .ok_or(HeapCorruption::OutOfBounds {
                offset,
                len: region_len,
            })
    }

    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8], HeapCorruption> {
        let region_len = self.len();

        offset
            .checked_add(len)
            .and_then(|end| self.source.bytes_mut().get_mut(offset..end))
            .ok_or(HeapCorruption::OutOfBounds {
                offset,
                len: region_len,
            })
    }

    /// Copies `len` bytes from `src` to `dest`; the ranges may overlap.
    pub fn copy(&mut self, src: usize, dest: usize, len: usize) -> Result<(), HeapCorruption> {
        let region_len = self.len();

        if src.max(dest).saturating_add(len) > region_len {
            return Err(HeapCorruption::OutOfBounds {
                offset: src.max(dest),
                len: region_len,
            });
        }

        self.source.bytes_mut().copy_within(src..src + len, dest);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sbrk::MemLib;

    #[test]
    fn init_lays_out_sentinels_and_one_free_block() {
        let (region, block) = Region::init(MemLib::default(), 8).unwrap();

        assert_eq!(region.len(), 12 * WORD);
        assert_eq!(region.word(0).unwrap(), SENTINEL);
        assert_eq!(region.word(region.len() - WORD).unwrap(), SENTINEL);

        let tag = block.tag(&region).unwrap();
        assert_eq!(tag, Tag::free(8 * WORD + DWORD));
        assert_eq!(block.next(&region).unwrap().offset(), region.epilogue());
    }

    #[test]
    fn init_fails_when_source_is_too_small() {
        assert!(Region::init(MemLib::new(64), 8).is_none());
    }

    #[test]
    fn init_fails_when_layout_overflows() {
        assert!(Region::init(MemLib::default(), usize::MAX / 4).is_none());
        assert!(Region::init(MemLib::default(), usize::MAX - 2).is_none());
    }

    #[test]
    fn extend_reuses_old_epilogue_slot() {
        let (mut region, first) = Region::init(MemLib::default(), 8).unwrap();
        first.write_tags(&mut region, Tag::allocated(8 * WORD + DWORD)).unwrap();

        let old_len = region.len();
        let block = region.extend(5).unwrap().unwrap();

        assert_eq!(block.offset(), old_len);
        assert_eq!(block.tag(&region).unwrap(), Tag::free(6 * WORD));
        assert_eq!(region.len(), old_len + 6 * WORD);
        assert_eq!(region.word(region.len() - WORD).unwrap(), SENTINEL);
    }

    #[test]
    fn extend_discounts_free_tail() {
        let (mut region, _) = Region::init(MemLib::default(), 8).unwrap();
        let old_len = region.len();

        // tail block is free and 80 bytes, so only 48 of the 128 are requested
        let block = region.extend(16).unwrap().unwrap();

        assert_eq!(region.len(), old_len + 48);
        assert_eq!(block.tag(&region).unwrap(), Tag::free(48));
    }

    #[test]
    fn extend_reports_exhaustion() {
        let (mut region, first) = Region::init(MemLib::new(12 * WORD), 8).unwrap();
        first.write_tags(&mut region, Tag::allocated(8 * WORD + DWORD)).unwrap();

        assert_eq!(region.extend(2).unwrap(), None);
        assert_eq!(region.len(), 12 * WORD);
    }

    #[test]
    fn word_access_is_bounds_checked() {
        let (mut region, _) = Region::init(MemLib::default(), 2).unwrap();
        let len = region.len();

        assert_eq!(
            region.word(len - 4),
            Err(HeapCorruption::OutOfBounds {
                offset: len - 4,
                len
            })
        );
        assert!(region.set_word(len, 7).is_err());
    }
}
