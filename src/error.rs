use thiserror::Error;

use crate::block::Handle;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("out of memory")]
    OOM,
    #[error("allocation size overflows the address space")]
    AllocOverflow,
    #[error("handle {0} does not name an allocated block")]
    InvalidHandle(Handle),
    #[error("heap corrupted: {0}")]
    Corrupted(#[from] HeapCorruption),
    #[error("heap is poisoned by an earlier corruption")]
    Poisoned,
}

/// A broken heap invariant. Any of these means the allocator must not continue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeapCorruption {
    #[error("word at offset {offset} lies outside the {len} byte region")]
    OutOfBounds { offset: usize, len: usize },
    #[error("block {offset}: header ({header_size}, {header_alloc}) disagrees with footer ({footer_size}, {footer_alloc})")]
    TagMismatch {
        offset: usize,
        header_size: usize,
        header_alloc: bool,
        footer_size: usize,
        footer_alloc: bool,
    },
    #[error("block {offset} has invalid size {size}")]
    BadBlockSize { offset: usize, size: usize },
    #[error("free block {offset} is not linked in bucket {bucket}")]
    MissingFromFreeList { offset: usize, bucket: usize },
    #[error("allocated block {offset} is linked in bucket {bucket}")]
    AllocatedInFreeList { offset: usize, bucket: usize },
    #[error("free block {offset} is linked in bucket {found} but classifies into bucket {expected}")]
    WrongBucket {
        offset: usize,
        expected: usize,
        found: usize,
    },
    #[error("bucket {bucket} holds more entries than there are free blocks")]
    FreeListCycle { bucket: usize },
    #[error("zero payload words have no size class")]
    ZeroPayload,
    #[error("prologue word was overwritten")]
    BadPrologue,
    #[error("heap walk ended at {offset} instead of the epilogue")]
    BadEpilogue { offset: usize },
}
