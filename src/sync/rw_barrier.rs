//! A reader/writer barrier with standard shared/exclusive semantics (spec
//! §4.6). The spec is explicit that no particular writer-priority policy is
//! required, so this wraps the platform's own `std::sync::RwLock` — the
//! same choice the original source makes by deferring to `pthrrwlock`/
//! `srwlock` (POSIX rwlock / Windows SRW lock) rather than hand-rolling
//! one.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Named wrapper around `std::sync::RwLock` so call sites read as
/// `read_lock`/`write_lock` (spec §4.6's vocabulary) instead of
/// `read`/`write`.
pub struct RwBarrier<T> {
    inner: RwLock<T>,
}

impl<T> RwBarrier<T> {
    pub const fn new(value: T) -> Self {
        Self { inner: RwLock::new(value) }
    }

    /// Acquires shared (read) access.
    pub fn read_lock(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Acquires exclusive (write) access.
    pub fn write_lock(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn concurrent_readers_exclusive_writer() {
        let barrier = Arc::new(RwBarrier::new(0usize));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                let _guard = barrier.read_lock();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        *barrier.write_lock() = 42;
        assert_eq!(*barrier.read_lock(), 42);
    }
}
