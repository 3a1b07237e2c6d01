//! A thread-aware, segregated-fit allocator for small, fixed-size objects.
//!
//! Requests of `size <= Config::default().max_size` (a small multiple of
//! the machine word) are served from one of several size-class pools, each
//! built from fixed-capacity 255-block [`chunk::Chunk`]s; larger requests
//! fall through to the system allocator. Every thread gets affinity to its
//! own [`arena::Arena`] per size class, with a lock-free registry backing
//! cross-thread deallocation.
//!
//! ```
//! use segfit::{ObjectAllocator, Config};
//!
//! let alloc = ObjectAllocator::with_page_source(Config::default(), segfit::SystemPageSource);
//! let p = alloc.allocate(32).unwrap();
//! alloc.deallocate(p, 32);
//! ```
//!
//! Install [`SegFit`] as `#[global_allocator]` to route the process's own
//! allocations through it:
//!
//! ```ignore
//! #[global_allocator]
//! static GLOBAL: segfit::SegFit = segfit::SegFit;
//! ```

#![warn(missing_docs, clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod arena;
pub mod chunk;
pub mod config;
pub mod error;
pub mod facade;
pub mod metrics;
pub mod page;
pub mod pool;
pub mod range_map;
pub mod sync;
mod syscall;

pub use config::Config;
pub use error::AllocError;
pub use facade::{ObjectAllocator, SegFit};
pub use metrics::Metrics;
pub use page::{PageSource, SystemPageSource};

const _: () = {
    // `CHUNK_BLOCKS - 1` must fit in the free-list link's `u8` byte, and
    // `CHUNK_BLOCKS` itself is reserved as the end-of-list sentinel.
    assert!(config::CHUNK_BLOCKS == 255);
};
