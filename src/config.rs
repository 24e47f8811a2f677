#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::{DWORD, GROWTH_CHUNK, INITIAL_FREE_WORDS, MAX_HEAP, MIN_BLOCK};
use crate::error::AllocError;

/// Tunables for a heap. Values are normalized when the heap is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HeapConfig {
    /// Payload words of the single free block created at initialization.
    pub initial_free_words: usize,
    /// Preferred number of bytes to grow by when no free block fits.
    pub growth_chunk: usize,
    /// Cap on the default `MemLib` source, in bytes.
    pub max_heap: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            initial_free_words: INITIAL_FREE_WORDS,
            growth_chunk: GROWTH_CHUNK,
            max_heap: MAX_HEAP,
        }
    }
}

impl HeapConfig {
    pub fn with_initial_free_words(mut self, words: usize) -> Self {
        self.initial_free_words = words;
        self
    }

    pub fn with_growth_chunk(mut self, bytes: usize) -> Self {
        self.growth_chunk = bytes;
        self
    }

    pub fn with_max_heap(mut self, bytes: usize) -> Self {
        self.max_heap = bytes;
        self
    }

    /// Initial payload rounded up to an even word count of at least two, and
    /// the growth chunk rounded up to a whole number of double words.
    ///
    /// Fails with `AllocOverflow` when rounding up does not fit a `usize`.
    pub fn normalized(self) -> Result<Self, AllocError> {
        let words = self.initial_free_words.max(2);
        let chunk = self.growth_chunk.max(MIN_BLOCK);

        Ok(Self {
            initial_free_words: words
                .checked_add(words % 2)
                .ok_or(AllocError::AllocOverflow)?,
            growth_chunk: chunk
                .checked_next_multiple_of(DWORD)
                .ok_or(AllocError::AllocOverflow)?,
            max_heap: self.max_heap,
        })
    }
}
