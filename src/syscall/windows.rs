use super::PAGE_SIZE;
use crate::page::align_up;
use core::ptr;

/// Reserves and commits a region of at least `size` bytes via
/// `VirtualAlloc`. Returns `None` on failure.
pub unsafe fn allocate_region(size: usize) -> Option<*mut u8> {
    use windows_sys::Win32::System::Memory::{VirtualAlloc, MEM_COMMIT, MEM_RESERVE, PAGE_READWRITE};
    if size == 0 {
        return None;
    }
    let size = align_up(size, PAGE_SIZE);
    let ptr = VirtualAlloc(ptr::null_mut(), size, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE);
    if ptr.is_null() {
        None
    } else {
        Some(ptr as *mut u8)
    }
}

/// Releases a region previously returned by `allocate_region`.
pub unsafe fn free_region(ptr: *mut u8, _size: usize) {
    use windows_sys::Win32::System::Memory::{VirtualFree, MEM_RELEASE};
    if ptr.is_null() {
        return;
    }
    VirtualFree(ptr as *mut core::ffi::c_void, 0, MEM_RELEASE);
}
