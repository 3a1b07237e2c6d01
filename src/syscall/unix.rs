use super::PAGE_SIZE;
use crate::page::align_up;
use core::ptr;

/// Maps an anonymous, zeroed region of at least `size` bytes via `mmap`.
/// Returns `None` on failure (the caller turns this into `AllocError`).
pub unsafe fn allocate_region(size: usize) -> Option<*mut u8> {
    if size == 0 {
        return None;
    }
    let size = align_up(size, PAGE_SIZE);
    let ptr = libc::mmap(
        ptr::null_mut(),
        size,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANON,
        -1,
        0,
    );
    if ptr == libc::MAP_FAILED {
        None
    } else {
        Some(ptr as *mut u8)
    }
}

/// Unmaps a region previously returned by `allocate_region` with the same
/// `size`.
pub unsafe fn free_region(ptr: *mut u8, size: usize) {
    if ptr.is_null() || size == 0 {
        return;
    }
    let size = align_up(size, PAGE_SIZE);
    libc::munmap(ptr as *mut libc::c_void, size);
}
