use crate::constants::{FREE_LIST_COUNT, LARGEST_FIT_WORDS};
use crate::error::HeapCorruption;

/// Index of a segregated free-list bucket.
///
/// Bucket `i` covers payloads of `(2^(i-1), 2^i]` words. Anything above
/// `LARGEST_FIT_WORDS` falls into the last bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SizeClass(usize);

impl SizeClass {
    pub const LAST: SizeClass = SizeClass(FREE_LIST_COUNT - 1);

    pub fn for_payload_words(words: usize) -> Result<SizeClass, HeapCorruption> {
        if words == 0 {
            return Err(HeapCorruption::ZeroPayload);
        }

        if words > LARGEST_FIT_WORDS {
            return Ok(Self::LAST);
        }

        let bits = (usize::BITS - words.leading_zeros()) as usize;

        if words.is_power_of_two() {
            Ok(SizeClass(bits - 1))
        } else {
            Ok(SizeClass(bits))
        }
    }

    pub fn index(self) -> usize {
        self.0
    }

    /// This class and every larger one, in ascending order.
    pub fn and_larger(self) -> impl Iterator<Item = SizeClass> {
        (self.0..FREE_LIST_COUNT).map(SizeClass)
    }

    pub fn all() -> impl Iterator<Item = SizeClass> {
        SizeClass(0).and_larger()
    }
}
