//! Doubly-linked, circular list built around a single sentinel.
//!
//! Ported from `include/b6/list.h`. Every operation is O(1), including
//! backward walking, which is the main reason to reach for a [`List`]
//! instead of a [`crate::deque::Deque`].

use core::cell::Cell;
use core::ptr::NonNull;

use crate::direction::Direction;

/// A pair of links, embedded in an element to make it a member of a
/// [`List`].
pub struct DRef {
    link: [Cell<Option<NonNull<DRef>>>; 2],
}

impl DRef {
    /// Creates a detached reference. It must be linked into a [`List`]
    /// (via [`List::add`] or one of its callers) before any list operation
    /// may be performed on it.
    pub fn new() -> DRef {
        DRef { link: [Cell::new(None), Cell::new(None)] }
    }

    #[inline]
    fn get(&self, dir: Direction) -> Option<NonNull<DRef>> {
        self.link[dir.index()].get()
    }

    #[inline]
    fn set(&self, dir: Direction, value: Option<NonNull<DRef>>) {
        self.link[dir.index()].set(value);
    }
}

impl Default for DRef {
    fn default() -> DRef {
        DRef::new()
    }
}

/// A doubly-linked circular list. The sentinel's two links form the loop;
/// an empty list has the sentinel pointing to itself in both directions.
///
/// # Safety
///
/// A `List` must not be moved after [`List::initialize`] has run.
pub struct List {
    sentinel: DRef,
}

impl List {
    /// Creates an uninitialized list. Call [`List::initialize`] in-place
    /// before using it.
    pub fn new() -> List {
        List { sentinel: DRef::new() }
    }

    /// Initializes or clears the list.
    pub fn initialize(&mut self) {
        let sentinel = NonNull::from(&self.sentinel);
        self.sentinel.set(Direction::Next, Some(sentinel));
        self.sentinel.set(Direction::Prev, Some(sentinel));
    }

    #[inline]
    fn sentinel_ptr(&self) -> NonNull<DRef> {
        NonNull::from(&self.sentinel)
    }

    /// The sentinel reference. Walking to it is how iteration detects the
    /// end of the list; it is never associated with an element.
    pub fn sentinel(&self) -> NonNull<DRef> {
        self.sentinel_ptr()
    }

    /// `true` iff the list holds no elements.
    pub fn is_empty(&self) -> bool {
        self.sentinel.get(Direction::Next) == Some(self.sentinel_ptr())
    }

    /// Steps one reference in `direction`. Reaching the sentinel returns the
    /// sentinel itself, never an absent value.
    pub fn walk(&self, curr: NonNull<DRef>, direction: Direction) -> NonNull<DRef> {
        unsafe { curr.as_ref().get(direction) }.expect("every DRef in a list has both links set")
    }

    /// The first element, or the sentinel if the list is empty.
    pub fn first(&self) -> NonNull<DRef> {
        self.walk(self.sentinel_ptr(), Direction::Next)
    }

    /// The last element, or the sentinel if the list is empty.
    pub fn last(&self) -> NonNull<DRef> {
        self.walk(self.sentinel_ptr(), Direction::Prev)
    }

    /// Inserts `node` immediately before `next`.
    pub fn add(&mut self, next: NonNull<DRef>, node: NonNull<DRef>) -> NonNull<DRef> {
        let prev = unsafe { next.as_ref().get(Direction::Prev) }
            .expect("every DRef in a list has a predecessor");
        unsafe { prev.as_ref().set(Direction::Next, Some(node)) };
        unsafe { next.as_ref().set(Direction::Prev, Some(node)) };
        unsafe { node.as_ref().set(Direction::Prev, Some(prev)) };
        unsafe { node.as_ref().set(Direction::Next, Some(next)) };
        node
    }

    /// Removes `node` from the list.
    ///
    /// # Panics
    ///
    /// Panics if `node` is the sentinel.
    pub fn del(&mut self, node: NonNull<DRef>) -> NonNull<DRef> {
        precondition!(node != self.sentinel_ptr(), "cannot remove the list sentinel");
        let prev = unsafe { node.as_ref().get(Direction::Prev) }.expect("linked node has a prev");
        let next = unsafe { node.as_ref().get(Direction::Next) }.expect("linked node has a next");
        unsafe { prev.as_ref().set(Direction::Next, Some(next)) };
        unsafe { next.as_ref().set(Direction::Prev, Some(prev)) };
        node
    }

    /// Inserts `node` as the first element.
    pub fn add_first(&mut self, node: NonNull<DRef>) -> NonNull<DRef> {
        let first = self.first();
        self.add(first, node)
    }

    /// Inserts `node` as the last element.
    pub fn add_last(&mut self, node: NonNull<DRef>) -> NonNull<DRef> {
        let sentinel = self.sentinel_ptr();
        self.add(sentinel, node)
    }

    /// Removes and returns the first element.
    ///
    /// # Panics
    ///
    /// Panics if the list is empty.
    pub fn del_first(&mut self) -> NonNull<DRef> {
        let first = self.first();
        precondition!(first != self.sentinel_ptr(), "cannot remove from an empty list");
        self.del(first)
    }

    /// Removes and returns the last element.
    ///
    /// # Panics
    ///
    /// Panics if the list is empty.
    pub fn del_last(&mut self) -> NonNull<DRef> {
        let last = self.last();
        precondition!(last != self.sentinel_ptr(), "cannot remove from an empty list");
        self.del(last)
    }
}

impl Default for List {
    fn default() -> List {
        let mut list = List::new();
        list.initialize();
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Elem {
        dref: DRef,
        val: i32,
    }

    impl Elem {
        fn new(val: i32) -> Box<Elem> {
            Box::new(Elem { dref: DRef::new(), val })
        }
    }

    unsafe fn elem_of(dref: NonNull<DRef>) -> *const Elem {
        dref.as_ptr() as *const Elem
    }

    #[test]
    fn list_order_and_walk_inverse() {
        let mut list = List::default();
        let a = Elem::new(1);
        let b = Elem::new(2);
        let c = Elem::new(3);

        list.add_last(NonNull::from(&a.dref));
        list.add_last(NonNull::from(&b.dref));
        list.add_last(NonNull::from(&c.dref));

        let sentinel = list.sentinel();

        let mut forward = vec![];
        let mut cur = list.first();
        let mut hops = 0;
        while cur != sentinel {
            forward.push(unsafe { (*elem_of(cur)).val });
            let next = list.walk(cur, Direction::Next);
            assert_eq!(list.walk(next, Direction::Prev), cur, "walk must be invertible");
            cur = next;
            hops += 1;
        }
        hops += 1; // the final hop onto the sentinel
        assert_eq!(forward, vec![1, 2, 3]);
        assert_eq!(hops, 4); // N + 1 hops for N == 3 elements

        let removed = list.del_first();
        assert_eq!(unsafe { (*elem_of(removed)).val }, 1);
        assert_eq!(unsafe { (*elem_of(list.first())).val }, 2);
    }

    #[test]
    #[should_panic]
    fn del_sentinel_panics() {
        let mut list = List::default();
        let sentinel = list.sentinel();
        list.del(sentinel);
    }
}
