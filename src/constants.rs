/// Size of a tag or link word, in bytes.
pub const WORD: usize = 8;
/// The alignment unit. Also the header+footer overhead of every block.
pub const DWORD: usize = 2 * WORD;
/// Smallest block able to hold its tags plus a free-list link.
pub const MIN_BLOCK: usize = 2 * DWORD;

pub const ALLOCATED_BIT: u64 = 0x1;
pub const SIZE_MASK: u64 = !(DWORD as u64 - 1);

// bucket i holds payloads in (2^(i-1), 2^i] words, the last one holds the rest
pub const FREE_LIST_COUNT: usize = 15;
pub const LARGEST_FIT_WORDS: usize = 1 << 13;

pub const INITIAL_FREE_WORDS: usize = 1 << 13;
pub const GROWTH_CHUNK: usize = 1 << 13;
pub const MAX_HEAP: usize = 20 * (1 << 20);

/// Value of the prologue word and of the epilogue header.
pub const SENTINEL: u64 = ALLOCATED_BIT;
/// Offset of the first block's payload: prologue word + header.
pub const FIRST_PAYLOAD: usize = DWORD;
