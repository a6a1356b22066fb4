//! Unbounded lock-free MPMC linked queue backing [`SpinningQueue`](crate::queue::SpinningQueue).
//!
//! Michael-Scott queue with a sentinel head. Unlinked nodes are reclaimed through
//! `crossbeam_epoch`.
//!
//! Every node carries a `LockState`. Its writer bit marks the item as claimed: moved out by a pop,
//! dropped by a removal, or never present (sentinels). Threads that look at an item in place
//! (iteration, `contains`, removal predicates) hold the node's read lock, and a claimer waits for
//! them to leave before touching the item. Removing from the middle only claims the item; the node
//! stays linked until the head moves past it.

use crate::internal::state::LockState;
use core::{
    cell::UnsafeCell,
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
    mem::MaybeUninit,
    ptr,
    sync::atomic::Ordering::{Acquire, Relaxed, Release},
};
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_utils::CachePadded;

struct Node<T> {
    state: LockState,
    item:  UnsafeCell<MaybeUninit<T>>,
    next:  Atomic<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> Self {
        Node {
            state: LockState::claimed(),
            item:  UnsafeCell::new(MaybeUninit::uninit()),
            next:  Atomic::null(),
        }
    }

    fn new(item: T) -> Self {
        Node {
            state: LockState::new(),
            item:  UnsafeCell::new(MaybeUninit::new(item)),
            next:  Atomic::null(),
        }
    }

    /// Runs `f` on the item under the node's read lock. Returns `None` if the item is claimed.
    #[inline]
    fn inspect<R, F: FnOnce(&T) -> R>(&self, f: F) -> Option<R> {
        struct ReadLock<'a>(&'a LockState);

        impl Drop for ReadLock<'_> {
            fn drop(&mut self) {
                self.0.release()
            }
        }

        if !self.state.try_acquire() {
            return None;
        }
        let _read = ReadLock(&self.state);
        // the read lock keeps any claimer from moving or dropping the item
        Some(f(unsafe { &*(*self.item.get()).as_ptr() }))
    }

    /// Claims the item, waiting for inspecting readers to leave. Returns false if someone else
    /// already claimed it.
    #[inline]
    fn claim(&self) -> bool {
        if self.state.try_claim() {
            let _ = self.state.wait_for_readers();
            true
        } else {
            false
        }
    }

    /// Moves the item out. Must only be called once, by the thread whose `claim` succeeded.
    #[inline]
    unsafe fn take(&self) -> T {
        ptr::read((*self.item.get()).as_ptr())
    }

    /// Drops the item in place. Same requirements as `take`.
    #[inline]
    unsafe fn drop_item(&self) {
        ptr::drop_in_place((*self.item.get()).as_mut_ptr())
    }
}

pub struct List<T> {
    head: CachePadded<Atomic<Node<T>>>,
    tail: CachePadded<Atomic<Node<T>>>,
}

// Items are moved between threads by pops and shared by inspection; the inspecting methods carry
// their own `T: Sync` bounds.
unsafe impl<T: Send> Send for List<T> {}
unsafe impl<T: Send> Sync for List<T> {}

impl<T> Debug for List<T> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.pad("List { .. }")
    }
}

impl<T> Default for List<T> {
    fn default() -> Self {
        List::new()
    }
}

impl<T> List<T> {
    pub fn new() -> Self {
        let list = List {
            head: CachePadded::new(Atomic::null()),
            tail: CachePadded::new(Atomic::null()),
        };
        // nothing can observe the list before it is returned
        let sentinel = Owned::new(Node::sentinel()).into_shared(unsafe { epoch::unprotected() });
        list.head.store(sentinel, Relaxed);
        list.tail.store(sentinel, Relaxed);
        list
    }

    pub fn push(&self, item: T) {
        let guard = &epoch::pin();
        let new = Owned::new(Node::new(item)).into_shared(guard);
        loop {
            let tail = self.tail.load(Acquire, guard);
            // the tail is never null, and never reclaimed before the head moves past it
            let t = unsafe { tail.deref() };
            let next = t.next.load(Acquire, guard);
            if !next.is_null() {
                // help a lagging push swing the tail
                let _ = self
                    .tail
                    .compare_exchange(tail, next, Release, Relaxed, guard);
            } else if t
                .next
                .compare_exchange(Shared::null(), new, Release, Relaxed, guard)
                .is_ok()
            {
                let _ = self
                    .tail
                    .compare_exchange(tail, new, Release, Relaxed, guard);
                return;
            }
        }
    }

    /// Advances the head by one node, retiring the old sentinel. Returns the new sentinel, whose
    /// item the caller may try to claim, or `None` if the list is empty.
    fn advance_head<'g>(&self, guard: &'g Guard) -> Option<&'g Node<T>> {
        loop {
            let head = self.head.load(Acquire, guard);
            let h = unsafe { head.deref() };
            let next = h.next.load(Acquire, guard);
            let n = unsafe { next.as_ref() }?;
            if self
                .head
                .compare_exchange(head, next, Release, Relaxed, guard)
                .is_ok()
            {
                let tail = self.tail.load(Relaxed, guard);
                if head == tail {
                    let _ = self
                        .tail
                        .compare_exchange(tail, next, Release, Relaxed, guard);
                }
                unsafe { guard.defer_destroy(head) };
                return Some(n);
            }
        }
    }

    pub fn pop(&self) -> Option<T> {
        let guard = &epoch::pin();
        loop {
            let node = self.advance_head(guard)?;
            if node.claim() {
                return Some(unsafe { node.take() });
            }
            // removed in place earlier, skip it
        }
    }

    /// Visits every node after the sentinel, in order, until `f` returns false.
    fn for_each_node<'g, F>(&self, guard: &'g Guard, mut f: F)
    where
        F: FnMut(&'g Node<T>) -> bool,
        T: 'g,
    {
        let head = self.head.load(Acquire, guard);
        let mut next = unsafe { head.deref() }.next.load(Acquire, guard);
        while let Some(node) = unsafe { next.as_ref() } {
            if !f(node) {
                return;
            }
            next = node.next.load(Acquire, guard);
        }
    }

    /// Number of unclaimed items. Linear in the length of the list, and only a snapshot.
    pub fn len(&self) -> usize {
        let guard = &epoch::pin();
        let mut len = 0;
        self.for_each_node(guard, |node| {
            if !node.state.is_write_requested() {
                len += 1;
            }
            true
        });
        len
    }

    pub fn is_empty(&self) -> bool {
        let guard = &epoch::pin();
        let mut empty = true;
        self.for_each_node(guard, |node| {
            empty = node.state.is_write_requested();
            empty
        });
        empty
    }

    /// Applies `f` to the first unclaimed item.
    pub fn first<R, F: FnOnce(&T) -> R>(&self, f: F) -> Option<R>
    where
        T: Sync,
    {
        let guard = &epoch::pin();
        let mut f = Some(f);
        let mut result = None;
        self.for_each_node(guard, |node| match node.inspect(|item| f.take().map(|f| f(item))) {
            Some(visited) => {
                result = visited;
                false
            }
            None => true,
        });
        result
    }

    /// Whether any unclaimed item satisfies `pred`.
    pub fn any<F: FnMut(&T) -> bool>(&self, mut pred: F) -> bool
    where
        T: Sync,
    {
        let guard = &epoch::pin();
        let mut found = false;
        self.for_each_node(guard, |node| {
            found = node.inspect(&mut pred).unwrap_or(false);
            !found
        });
        found
    }

    /// Removes up to `limit` unclaimed items satisfying `pred`, front to back. Returns the number
    /// removed.
    pub fn remove_where<F: FnMut(&T) -> bool>(&self, mut pred: F, limit: usize) -> usize
    where
        T: Sync,
    {
        if limit == 0 {
            return 0;
        }
        let guard = &epoch::pin();
        let mut removed = 0;
        self.for_each_node(guard, |node| {
            if node.inspect(&mut pred).unwrap_or(false) && node.claim() {
                unsafe { node.drop_item() };
                removed += 1;
            }
            removed < limit
        });
        removed
    }

    pub fn iter(&self) -> Iter<'_, T> {
        let guard = epoch::pin();
        let cursor = self.head.load(Acquire, &guard).as_raw();
        Iter {
            guard,
            cursor,
            _list: PhantomData,
        }
    }
}

impl<T> Drop for List<T> {
    fn drop(&mut self) {
        unsafe {
            // `&mut self` rules out any concurrent access
            let guard = epoch::unprotected();
            let mut current = self.head.load(Relaxed, guard);
            while let Some(node) = current.as_ref() {
                let next = node.next.load(Relaxed, guard);
                if !node.state.is_write_requested() {
                    node.drop_item();
                }
                drop(current.into_owned());
                current = next;
            }
        }
    }
}

/// Iterator over clones of the unclaimed items of a [`List`].
///
/// Keeps the calling thread pinned for as long as it lives.
pub struct Iter<'a, T> {
    guard:  Guard,
    cursor: *const Node<T>,
    _list:  PhantomData<&'a List<T>>,
}

impl<'a, T> Debug for Iter<'a, T> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.pad("Iter { .. }")
    }
}

impl<'a, T: Clone + Sync> Iterator for Iter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            // the cursor was reached while pinned by `self.guard`, so it has not been reclaimed
            let current = unsafe { &*self.cursor };
            let next = current.next.load(Acquire, &self.guard);
            let node = unsafe { next.as_ref() }?;
            self.cursor = node;
            if let Some(item) = node.inspect(T::clone) {
                return Some(item);
            }
        }
    }
}
