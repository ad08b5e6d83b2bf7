//! Singly-linked deque with a head/tail sentinel pair and a cached tail
//! pointer for O(1) append.
//!
//! Ported from `include/b6/deque.h`. Forward walking and insertion/removal
//! after a known reference are O(1); anything that needs the predecessor of
//! an arbitrary reference is O(n) by design — callers that need fast
//! backward walking should use [`crate::list`] instead.

use core::cell::Cell;
use core::ptr::NonNull;

use crate::direction::Direction;

/// A single forward link, embedded in an element to make it a member of a
/// [`Deque`].
///
/// `SRef` is never allocated by the deque: it lives inside whatever element
/// owns it, and the deque only ever manipulates pointers to it.
pub struct SRef {
    next: Cell<Option<NonNull<SRef>>>,
}

impl SRef {
    /// Creates a detached reference. It must be linked into a [`Deque`]
    /// (via [`Deque::add_after`] or one of its callers) before any deque
    /// operation may be performed on it.
    pub fn new() -> SRef {
        SRef { next: Cell::new(None) }
    }
}

impl Default for SRef {
    fn default() -> SRef {
        SRef::new()
    }
}

/// A doubly-ended queue of singly-linked references.
///
/// `head` links to the first element (or to `tail` when empty); `tail` is
/// never followed further; `last` always points to whichever reference's
/// forward link is `tail`, which is what makes [`Deque::add_last`] O(1)
/// despite the list being singly-linked.
///
/// # Safety
///
/// A `Deque` must not be moved after [`Deque::initialize`] has run: `head`
/// and `tail` are self-referential sentinels that the deque points into by
/// address.
pub struct Deque {
    head: SRef,
    tail: SRef,
    last: Cell<NonNull<SRef>>,
}

impl Deque {
    /// Creates an uninitialized deque. Call [`Deque::initialize`] in-place
    /// before using it.
    pub fn new() -> Deque {
        Deque {
            head: SRef::new(),
            tail: SRef::new(),
            last: Cell::new(NonNull::dangling()),
        }
    }

    /// Initializes or clears the deque.
    pub fn initialize(&mut self) {
        self.head.next.set(Some(NonNull::from(&self.tail)));
        self.tail.next.set(None);
        self.last.set(NonNull::from(&self.head));
    }

    #[inline]
    fn head_ptr(&self) -> NonNull<SRef> {
        NonNull::from(&self.head)
    }

    #[inline]
    fn tail_ptr(&self) -> NonNull<SRef> {
        NonNull::from(&self.tail)
    }

    /// `true` iff the deque holds no elements.
    pub fn is_empty(&self) -> bool {
        self.head.next.get() == Some(self.tail_ptr())
    }

    /// The reference after the head sentinel: the first element, or the
    /// tail sentinel if the deque is empty.
    pub fn first(&self) -> NonNull<SRef> {
        self.walk(self.head_ptr(), Direction::Next).expect("head always has a next")
    }

    /// The reference whose forward link is the tail sentinel: the last
    /// element, or the head sentinel if the deque is empty.
    pub fn last(&self) -> NonNull<SRef> {
        self.last.get()
    }

    /// Steps one reference in `direction`.
    ///
    /// `Next` is O(1). `Prev` is O(n): it walks forward from `head` until it
    /// finds whoever points at `curr`. Returns `None` when walking past the
    /// head going backwards.
    pub fn walk(&self, curr: NonNull<SRef>, direction: Direction) -> Option<NonNull<SRef>> {
        match direction {
            Direction::Next => unsafe { curr.as_ref().next.get() },
            Direction::Prev => {
                if curr == self.tail_ptr() {
                    return Some(self.last.get());
                }
                if curr == self.head_ptr() {
                    return None;
                }
                let mut prev = self.head_ptr();
                loop {
                    let next = unsafe { prev.as_ref().next.get() }.expect("walked off the deque");
                    if next == curr {
                        return Some(prev);
                    }
                    prev = next;
                }
            }
        }
    }

    /// Inserts `sref` immediately after `prev`.
    ///
    /// # Panics
    ///
    /// Panics if `prev` is the tail sentinel: nothing may be inserted after
    /// it.
    pub fn add_after(&mut self, prev: NonNull<SRef>, sref: NonNull<SRef>) -> NonNull<SRef> {
        precondition!(prev != self.tail_ptr(), "cannot insert after the tail sentinel");
        let next = unsafe { prev.as_ref().next.get() }.expect("every non-tail ref has a next");
        if prev == self.last.get() {
            self.last.set(sref);
        }
        unsafe { sref.as_ref().next.set(Some(next)) };
        unsafe { prev.as_ref().next.set(Some(sref)) };
        sref
    }

    /// Removes and returns the reference immediately after `prev`.
    ///
    /// # Panics
    ///
    /// Panics if `prev` is the tail sentinel, or if there is nothing after
    /// `prev` to remove (removing past the end).
    pub fn del_after(&mut self, prev: NonNull<SRef>) -> NonNull<SRef> {
        precondition!(prev != self.tail_ptr(), "cannot remove after the tail sentinel");
        let curr = unsafe { prev.as_ref().next.get() }.expect("every non-tail ref has a next");
        precondition!(curr != self.tail_ptr(), "cannot remove past the end of the deque");
        if curr == self.last.get() {
            self.last.set(prev);
        }
        let curr_next = unsafe { curr.as_ref().next.get() };
        unsafe { prev.as_ref().next.set(curr_next) };
        curr
    }

    /// Inserts `sref` as the first element.
    pub fn add_first(&mut self, sref: NonNull<SRef>) -> NonNull<SRef> {
        self.add_after(self.head_ptr(), sref)
    }

    /// Inserts `sref` as the last element. O(1).
    pub fn add_last(&mut self, sref: NonNull<SRef>) -> NonNull<SRef> {
        let last = self.last.get();
        self.add_after(last, sref)
    }

    /// Removes and returns the first element.
    ///
    /// # Panics
    ///
    /// Panics if the deque is empty.
    pub fn del_first(&mut self) -> NonNull<SRef> {
        self.del_after(self.head_ptr())
    }

    /// Removes and returns the last element. O(n): finding the
    /// second-to-last reference requires a full backward walk.
    ///
    /// # Panics
    ///
    /// Panics if the deque is empty.
    pub fn del_last(&mut self) -> NonNull<SRef> {
        let last = self.last.get();
        let prev = self.walk(last, Direction::Prev).expect("non-empty deque has a predecessor");
        self.del_after(prev)
    }

    /// Inserts `sref` immediately before `next` by walking backwards to
    /// find its predecessor. O(n).
    pub fn add(&mut self, next: NonNull<SRef>, sref: NonNull<SRef>) -> NonNull<SRef> {
        let prev = self.walk(next, Direction::Prev).expect("next has a predecessor");
        self.add_after(prev, sref)
    }

    /// Removes `sref` by walking backwards to find its predecessor. O(n).
    ///
    /// # Panics
    ///
    /// Panics if `sref` is the head or tail sentinel.
    pub fn del(&mut self, sref: NonNull<SRef>) -> NonNull<SRef> {
        precondition!(
            sref != self.head_ptr() && sref != self.tail_ptr(),
            "cannot remove a sentinel from the deque"
        );
        let prev = self.walk(sref, Direction::Prev).expect("sref has a predecessor");
        self.del_after(prev)
    }
}

impl Default for Deque {
    fn default() -> Deque {
        let mut deque = Deque::new();
        deque.initialize();
        deque
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Elem {
        sref: SRef,
        val: i32,
    }

    impl Elem {
        fn new(val: i32) -> Box<Elem> {
            Box::new(Elem { sref: SRef::new(), val })
        }
    }

    unsafe fn elem_of(sref: NonNull<SRef>) -> *const Elem {
        // SRef is the first (and only) field of Elem in these tests.
        sref.as_ptr() as *const Elem
    }

    #[test]
    fn deque_order() {
        let mut deque = Deque::default();
        let a = Elem::new(1);
        let b = Elem::new(2);
        let c = Elem::new(3);

        deque.add_last(NonNull::from(&a.sref));
        deque.add_last(NonNull::from(&b.sref));
        deque.add_last(NonNull::from(&c.sref));

        let tail = NonNull::from(&deque.tail);
        let head = NonNull::from(&deque.head);

        let mut forward = vec![];
        let mut cur = deque.first();
        while cur != tail {
            forward.push(unsafe { (*elem_of(cur)).val });
            cur = deque.walk(cur, Direction::Next).unwrap();
        }
        assert_eq!(forward, vec![1, 2, 3]);

        let mut backward = vec![];
        let mut cur = deque.last();
        while cur != head {
            backward.push(unsafe { (*elem_of(cur)).val });
            cur = deque.walk(cur, Direction::Prev).unwrap();
        }
        assert_eq!(backward, vec![3, 2, 1]);

        let first = deque.del_first();
        assert_eq!(unsafe { (*elem_of(first)).val }, 1);

        let mut remaining = vec![];
        let mut cur = deque.first();
        while cur != tail {
            remaining.push(unsafe { (*elem_of(cur)).val });
            cur = deque.walk(cur, Direction::Next).unwrap();
        }
        assert_eq!(remaining, vec![2, 3]);
    }

    #[test]
    fn empty_deque_invariant() {
        let mut deque = Deque::default();
        assert!(deque.is_empty());
        assert_eq!(deque.first(), NonNull::from(&deque.tail));

        let a = Elem::new(1);
        deque.add_first(NonNull::from(&a.sref));
        assert!(!deque.is_empty());
    }

    #[test]
    #[should_panic]
    fn del_after_tail_panics() {
        let mut deque = Deque::default();
        let tail = NonNull::from(&deque.tail);
        deque.del_after(tail);
    }
}
