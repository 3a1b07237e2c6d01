//! Raw OS memory mapping, split by platform the same way the teacher splits
//! its own page syscalls (`src/alloc/system/syscall.rs`): one module per
//! target family, re-exported under a common `allocate_region`/
//! `free_region` pair.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::{allocate_region, free_region};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::{allocate_region, free_region};

/// Platform page size. `4096` on every target this crate builds for; kept
/// as a named constant rather than queried at runtime because the
/// allocator's chunk sizing only needs a conservative alignment guarantee,
/// not the exact runtime page size.
pub const PAGE_SIZE: usize = 4096;
