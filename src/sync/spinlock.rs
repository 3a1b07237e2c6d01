//! An adaptive spin lock (spec §4.6): spins on a CAS for a configurable
//! number of iterations, then yields the current thread and keeps trying.
//! No fairness guarantee, matching the spec's wording exactly.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// A mutual-exclusion lock implemented with a bare `AtomicBool`, for the
/// arena's short critical sections (chunk/cursor/count mutation). Unlike
/// `std::sync::Mutex`, this never touches the OS scheduler until the spin
/// budget is exhausted, which is the right trade-off for the microsecond-
/// scale critical sections this allocator takes.
pub struct SpinLock<T> {
    locked: AtomicBool,
    spin_iterations: u32,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self::with_spin_iterations(value, 64)
    }

    pub const fn with_spin_iterations(value: T, spin_iterations: u32) -> Self {
        Self {
            locked: AtomicBool::new(false),
            spin_iterations,
            data: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, spinning then yielding until it succeeds.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let mut spins = 0u32;
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spins += 1;
            if spins >= self.spin_iterations {
                std::thread::yield_now();
                spins = 0;
            } else {
                core::hint::spin_loop();
            }
        }
        SpinLockGuard { lock: self }
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinLockGuard { lock: self })
    }

    #[inline]
    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// RAII guard releasing a [`SpinLock`] on drop.
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<'a, T> Deref for SpinLockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for SpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for SpinLockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
