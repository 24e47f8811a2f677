//! A segregated-fit heap allocator with boundary tags.
//!
//! Every block carries a header and footer word holding its size and an
//! allocated bit. Free blocks sit in one of fifteen power-of-two size classes,
//! each a singly linked list threaded through the blocks' payloads. Frees
//! coalesce eagerly with both address neighbours, and the region grows at its
//! high end through an [`Sbrk`] source when nothing fits.
//!
//! ```
//! use segheap::Heap;
//!
//! let mut heap = Heap::new().unwrap();
//! let a = heap.allocate(100).unwrap().unwrap();
//!
//! heap.payload_mut(a).unwrap()[..5].copy_from_slice(b"hello");
//!
//! let a = heap.resize(Some(a), 400).unwrap().unwrap();
//! assert_eq!(&heap.payload(a).unwrap()[..5], b"hello");
//!
//! heap.deallocate(Some(a)).unwrap();
//! assert!(heap.check_consistency());
//! ```

mod allocator;
mod block;
mod check;
mod coalesce;
mod config;
mod constants;
mod error;
mod free_list;
mod heap;
mod region;
mod resize;
mod sbrk;
mod size_class;

pub use block::Handle;
pub use check::{BlockInfo, Blocks, HeapStats};
pub use config::HeapConfig;
pub use constants::{DWORD, FREE_LIST_COUNT, GROWTH_CHUNK, INITIAL_FREE_WORDS, MIN_BLOCK, WORD};
pub use error::{AllocError, HeapCorruption};
pub use free_list::FreeListDump;
pub use heap::Heap;
pub use sbrk::{MemLib, Sbrk};
