//! The pool's registry of arenas: an intrusive, lock-free, singly-forward-
//! linked list with best-effort back-links for teardown (spec §4.7).
//!
//! Grounded on the teacher's Treiber stack
//! (`src/concurrency/worklist/treiber_stack.rs`): `push_front` is the same
//! CAS-retry-on-`head`loop, generalized from stack-of-indices to an
//! intrusive list over arena pointers, since the registry must support
//! forward iteration (to scan sibling arenas) in addition to push/pop.
//!
//! The registry only ever grows during normal operation (spec §4.7: "erase
//! exists for teardown symmetry"), so `erase` is not required to be as
//! contention-hardened as `push_front` — it is only ever called from the
//! owning pool's `Drop`, which by that point has exclusive access.

use core::sync::atomic::{AtomicPtr, Ordering};
use core::ptr;

/// The pair of atomic links a node embeds to take part in one [`ArenaList`].
/// Embed this as a field (not a supertrait method) so the list never needs
/// to allocate a separate node wrapper around `T`.
pub struct ListLinks<T> {
    next: AtomicPtr<T>,
    prev: AtomicPtr<T>,
}

impl<T> ListLinks<T> {
    pub const fn new() -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            prev: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl<T> Default for ListLinks<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Implemented by types that can be a node of an [`ArenaList`].
pub trait ListNode: Sized {
    fn links(&self) -> &ListLinks<Self>;
}

/// An intrusive, lock-free, singly-forward-linked list of `*mut T`.
/// Callers own the pointed-to storage (typically a `Box::leak`'d arena) and
/// are responsible for it outliving the list.
pub struct ArenaList<T: ListNode> {
    head: AtomicPtr<T>,
}

impl<T: ListNode> Default for ArenaList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ListNode> ArenaList<T> {
    pub const fn new() -> Self {
        Self { head: AtomicPtr::new(ptr::null_mut()) }
    }

    /// Wait-free up to CAS retry: links `node` in as the new head.
    pub fn push_front(&self, node: *mut T) {
        loop {
            let old_head = self.head.load(Ordering::Acquire);
            unsafe {
                (*node).links().next.store(old_head, Ordering::Relaxed);
                (*node).links().prev.store(ptr::null_mut(), Ordering::Relaxed);
            }
            if self
                .head
                .compare_exchange(old_head, node, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if !old_head.is_null() {
                    unsafe { (*old_head).links().prev.store(node, Ordering::Release) };
                }
                return;
            }
        }
    }

    /// Removes `node` from the list. Only safe to call when no other thread
    /// may be concurrently pushing or erasing — the registry's teardown
    /// path (spec §4.7: "erase exists for teardown symmetry").
    ///
    /// # Safety
    /// `node` must currently be linked into this list.
    pub unsafe fn erase(&self, node: *mut T) {
        let (prev, next) = {
            let links = (*node).links();
            (links.prev.load(Ordering::Relaxed), links.next.load(Ordering::Relaxed))
        };

        let mut backoff = 0u32;
        loop {
            if prev.is_null() {
                if self
                    .head
                    .compare_exchange(node, next, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    break;
                }
            } else {
                (*prev).links().next.store(next, Ordering::Release);
                break;
            }
            backoff += 1;
            if backoff > 16 {
                std::thread::yield_now();
            }
        }
        if !next.is_null() {
            (*next).links().prev.store(prev, Ordering::Release);
        }
    }

    /// Forward iteration from the head. Safe to call concurrently with
    /// `push_front` (may or may not observe a racing push, never observes a
    /// torn node).
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { current: self.head.load(Ordering::Acquire), _marker: core::marker::PhantomData }
    }
}

/// Forward iterator over an [`ArenaList`]'s nodes.
pub struct Iter<'a, T: ListNode> {
    current: *mut T,
    _marker: core::marker::PhantomData<&'a ArenaList<T>>,
}

impl<'a, T: ListNode> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_null() {
            return None;
        }
        let node = unsafe { &*self.current };
        self.current = node.links().next.load(Ordering::Acquire);
        Some(node)
    }
}
