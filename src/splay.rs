//! Top-down splay tree with threaded child pointers: no parent field, no
//! balance field, a single sentinel doing double duty as head and tail.
//!
//! Ported from `include/b6/splay.h` / `src/splay.c`. A child link whose low
//! bit is set is not a child at all but a thread to the in-order neighbor in
//! that direction; this is what lets [`Splay::walk`] move in either
//! direction without a parent pointer. Every structural operation
//! (search/add/del) performs Sleator-Tarjan top-down splaying, so the
//! accessed node ends up at the root.
//!
//! # Safety
//!
//! Thread-tagging steals the low bit of every [`SplayRef`] address, so
//! every `SplayRef` must live at a 2-byte-aligned address. `SplayRef`'s own
//! alignment (it holds two `usize`s) guarantees this on every platform this
//! crate targets; the precondition exists only to document the requirement
//! spec.md's design notes call out, not because it can realistically fail.

use core::cell::Cell;
use core::cmp::Ordering;
use core::ptr::NonNull;

use crate::direction::Direction;

/// A pair of thread-taggable links, embedded in an element to make it a
/// member of a [`Splay`] tree.
pub struct SplayRef {
    link: [Cell<usize>; 2],
}

impl SplayRef {
    /// Creates a detached reference. It must be linked into a [`Splay`]
    /// tree (via [`Splay::add`]) before any splay operation may be
    /// performed on it.
    pub fn new() -> SplayRef {
        SplayRef { link: [Cell::new(0), Cell::new(0)] }
    }
}

impl Default for SplayRef {
    fn default() -> SplayRef {
        SplayRef::new()
    }
}

#[inline]
fn addr(r: NonNull<SplayRef>) -> usize {
    let a = r.as_ptr() as usize;
    precondition!(a & 1 == 0, "SplayRef must be 2-byte aligned to carry a thread tag");
    a
}

#[inline]
fn to_thread(r: NonNull<SplayRef>) -> usize {
    addr(r) | 1
}

#[inline]
fn is_thread(raw: usize) -> bool {
    raw & 1 != 0
}

#[inline]
fn from_thread(raw: usize) -> NonNull<SplayRef> {
    unsafe { NonNull::new_unchecked((raw & !1) as *mut SplayRef) }
}

#[inline]
fn from_real(raw: usize) -> NonNull<SplayRef> {
    debug_assert!(!is_thread(raw), "from_real called on a tagged thread value");
    unsafe { NonNull::new_unchecked(raw as *mut SplayRef) }
}

#[inline]
fn link(r: NonNull<SplayRef>, dir: Direction) -> usize {
    unsafe { r.as_ref().link[dir.index()].get() }
}

#[inline]
fn set_link(r: NonNull<SplayRef>, dir: Direction, raw: usize) {
    unsafe { r.as_ref().link[dir.index()].set(raw) };
}

/// Descends from `start` in `dir` until the link in that direction is a
/// thread, returning the node at which that happens (the extreme of
/// `start`'s subtree in direction `dir`).
fn dive(start: NonNull<SplayRef>, dir: Direction) -> NonNull<SplayRef> {
    let mut r = start;
    loop {
        let raw = link(r, dir);
        if is_thread(raw) {
            return r;
        }
        r = from_real(raw);
    }
}

/// Like [`dive`] but also returns the node one step before the extreme
/// (`None` if `start` itself is already the extreme).
fn dive_with_parent(start: NonNull<SplayRef>, dir: Direction) -> (NonNull<SplayRef>, Option<NonNull<SplayRef>>) {
    let mut parent = None;
    let mut r = start;
    loop {
        let raw = link(r, dir);
        if is_thread(raw) {
            return (r, parent);
        }
        parent = Some(r);
        r = from_real(raw);
    }
}

/// The outcome of [`Splay::search`] on a non-empty tree: either the match
/// (now at the root), or the direction a new node would be attached at
/// (also relative to the root, which the search has already splayed to the
/// closest candidate).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchResult {
    /// An exact match was found; it is now the tree's root.
    Found(NonNull<SplayRef>),
    /// No match. The closest candidate is now the tree's root; a new node
    /// belongs in its `dir` child.
    Missing(Direction),
}

/// A top-down splay tree. `C` is the tree's default comparator, used by
/// [`Splay::add`].
///
/// # Safety
///
/// A `Splay` must not be moved after [`Splay::initialize`] has run: its
/// sentinel is self-referential when empty.
pub struct Splay<C: Fn(NonNull<SplayRef>, NonNull<SplayRef>) -> Ordering + Copy> {
    head: SplayRef,
    compare: C,
}

impl<C: Fn(NonNull<SplayRef>, NonNull<SplayRef>) -> Ordering + Copy> Splay<C> {
    /// Creates an uninitialized splay tree using `compare` as its default
    /// ordering. Call [`Splay::initialize`] in-place before using it.
    pub fn new(compare: C) -> Self {
        Splay { head: SplayRef::new(), compare }
    }

    /// Initializes or clears the tree.
    pub fn initialize(&mut self) {
        let head = self.head_ptr();
        set_link(head, Direction::Prev, to_thread(head));
    }

    #[inline]
    fn head_ptr(&self) -> NonNull<SplayRef> {
        NonNull::from(&self.head)
    }

    /// The sentinel. It serves as both the head and the tail of the
    /// in-order sequence and is never dereferenced as an element.
    pub fn head(&self) -> NonNull<SplayRef> {
        self.head_ptr()
    }

    /// The sentinel, again: a splay tree's head and tail coincide.
    pub fn tail(&self) -> NonNull<SplayRef> {
        self.head_ptr()
    }

    #[inline]
    fn root_raw(&self) -> usize {
        link(self.head_ptr(), Direction::Prev)
    }

    /// `true` iff the tree holds no elements.
    pub fn is_empty(&self) -> bool {
        is_thread(self.root_raw())
    }

    /// The reference most recently accessed (searched, added or deleted):
    /// the root of the tree, or `None` if it is empty.
    pub fn root(&self) -> Option<NonNull<SplayRef>> {
        let raw = self.root_raw();
        if is_thread(raw) {
            None
        } else {
            Some(from_real(raw))
        }
    }

    /// In-order step from `dref` in `dir`. Never mutates the tree. Walking
    /// off either end returns the sentinel.
    pub fn walk(&self, dref: NonNull<SplayRef>, dir: Direction) -> NonNull<SplayRef> {
        if dref == self.head_ptr() {
            let raw = self.root_raw();
            return if is_thread(raw) { dref } else { dive(from_real(raw), dir.opposite()) };
        }
        let raw = link(dref, dir);
        if is_thread(raw) {
            from_thread(raw)
        } else {
            dive(from_real(raw), dir.opposite())
        }
    }

    /// The in-order first element, or the sentinel if the tree is empty.
    pub fn first(&self) -> NonNull<SplayRef> {
        self.walk(self.head_ptr(), Direction::Next)
    }

    /// The in-order last element, or the sentinel if the tree is empty.
    pub fn last(&self) -> NonNull<SplayRef> {
        self.walk(self.head_ptr(), Direction::Prev)
    }

    /// Splays the tree around whatever `examine` locates, bringing the
    /// match (or the last candidate examined) to the root.
    ///
    /// `examine` is called the way [`crate::tree::Tree::search`]'s is:
    /// `Less` if the candidate precedes the key, `Greater` if it follows,
    /// `Equal` on a match. Returns `None` only when the tree is empty (in
    /// which case nothing is mutated).
    pub fn search<F>(&mut self, mut examine: F) -> Option<SearchResult>
    where
        F: FnMut(NonNull<SplayRef>) -> Ordering,
    {
        let root_raw = self.root_raw();
        if is_thread(root_raw) {
            return None;
        }

        let bak = SplayRef::new();
        let bak_ptr = NonNull::from(&bak);
        let mut lnk = [bak_ptr, bak_ptr];
        let mut top = from_real(root_raw);
        let mut dir = Direction::Next;
        let mut opp = Direction::Prev;
        let mut res;

        loop {
            res = examine(top);
            if res == Ordering::Equal {
                break;
            }
            dir = Direction::from_ordering(res);
            opp = dir.opposite();

            let child_raw = link(top, dir);
            if is_thread(child_raw) {
                break;
            }

            // Zig-zig shortcut: if the grandchild ranks the same way the
            // child did, rotate it up one level before continuing, instead
            // of revisiting this same pattern one node at a time.
            let child = from_real(child_raw);
            if res == examine(child) {
                let swp = child;
                let swp_opp_raw = link(swp, opp);
                if is_thread(swp_opp_raw) {
                    set_link(top, dir, to_thread(swp));
                } else {
                    set_link(top, dir, swp_opp_raw);
                }
                set_link(swp, opp, addr(top));
                top = swp;
                if is_thread(link(top, dir)) {
                    break;
                }
            }

            set_link(lnk[opp.index()], dir, addr(top));
            lnk[opp.index()] = top;
            top = from_real(link(top, dir));
        }

        let top_opp_raw = link(top, opp);
        if to_thread(lnk[opp.index()]) != top_opp_raw {
            set_link(lnk[opp.index()], dir, top_opp_raw);
        } else {
            set_link(lnk[opp.index()], dir, to_thread(top));
        }
        let top_dir_raw = link(top, dir);
        set_link(lnk[dir.index()], opp, top_dir_raw);

        set_link(top, Direction::Prev, bak.link[Direction::Next.index()].get());
        set_link(top, Direction::Next, bak.link[Direction::Prev.index()].get());

        set_link(self.head_ptr(), Direction::Prev, addr(top));

        Some(if res == Ordering::Equal { SearchResult::Found(top) } else { SearchResult::Missing(dir) })
    }

    /// Attaches `node` as the tree's new root, taking over the subtree on
    /// side `dir` of the previous root (or starting a fresh one-node tree
    /// if it was empty). `dir` is meaningless when the tree is empty.
    fn attach_as_root(&mut self, dir: Direction, node: NonNull<SplayRef>) -> NonNull<SplayRef> {
        let root_raw = self.root_raw();
        if !is_thread(root_raw) {
            let opp = dir.opposite();
            let top = from_real(root_raw);
            let tmp_raw = link(top, dir);
            set_link(node, opp, addr(top));
            set_link(node, dir, tmp_raw);
            set_link(top, dir, to_thread(node));
            if !is_thread(tmp_raw) {
                let tmp = dive(from_real(tmp_raw), opp);
                set_link(tmp, opp, to_thread(node));
            }
        } else {
            set_link(node, Direction::Next, to_thread(node));
            set_link(node, Direction::Prev, to_thread(node));
        }
        set_link(self.head_ptr(), Direction::Prev, addr(node));
        node
    }

    /// Searches using the tree's default comparator; splays to the
    /// existing duplicate unchanged, or inserts `node` as the new root.
    ///
    /// Per spec.md's resolution of the duplicate-insert ambiguity: unlike
    /// [`crate::tree::Tree::add`], this returns the *splayed root*, not
    /// explicitly "the pre-existing node" — but a search that matches
    /// always splays that exact match to the root, so the two are the same
    /// reference in the duplicate case.
    pub fn add(&mut self, node: NonNull<SplayRef>) -> NonNull<SplayRef> {
        let compare = self.compare;
        match self.search(|candidate| compare(candidate, node)) {
            Some(SearchResult::Found(existing)) => existing,
            Some(SearchResult::Missing(dir)) => self.attach_as_root(dir, node),
            None => self.attach_as_root(Direction::Next, node),
        }
    }

    /// Searches using an arbitrary `examine` closure and, on a match,
    /// removes it.
    pub fn remove<F>(&mut self, examine: F) -> Option<NonNull<SplayRef>>
    where
        F: FnMut(NonNull<SplayRef>) -> Ordering,
    {
        match self.search(examine)? {
            SearchResult::Found(_) => Some(self.del()),
            SearchResult::Missing(_) => None,
        }
    }

    /// Removes the reference currently at the root and returns it.
    ///
    /// Per spec.md §4.6: when the root has two real children, its in-order
    /// predecessor (the maximum of its left subtree) is unlinked and
    /// promoted to take its place, with every thread it leaves behind
    /// re-pointed at its new neighbor.
    ///
    /// # Panics
    ///
    /// Panics if the tree is empty.
    pub fn del(&mut self) -> NonNull<SplayRef> {
        precondition!(!self.is_empty(), "cannot delete from an empty splay tree");
        let top = from_real(self.root_raw());
        let left_raw = link(top, Direction::Prev);
        let right_raw = link(top, Direction::Next);

        let new_root_raw = if is_thread(left_raw) && is_thread(right_raw) {
            to_thread(self.head_ptr())
        } else if is_thread(left_raw) {
            if !is_thread(right_raw) {
                let new_min = dive(from_real(right_raw), Direction::Prev);
                set_link(new_min, Direction::Prev, left_raw);
            }
            right_raw
        } else if is_thread(right_raw) {
            let new_max = dive(from_real(left_raw), Direction::Next);
            set_link(new_max, Direction::Next, right_raw);
            left_raw
        } else {
            let left = from_real(left_raw);
            let (pred, pred_parent) = dive_with_parent(left, Direction::Next);
            let pred_left_raw = link(pred, Direction::Prev);

            if let Some(parent) = pred_parent {
                set_link(parent, Direction::Next, pred_left_raw);
                let new_max = if is_thread(pred_left_raw) {
                    parent
                } else {
                    dive(from_real(pred_left_raw), Direction::Next)
                };
                set_link(new_max, Direction::Next, to_thread(pred));
                set_link(pred, Direction::Prev, addr(left));
            }

            set_link(pred, Direction::Next, right_raw);
            let new_min = dive(from_real(right_raw), Direction::Prev);
            set_link(new_min, Direction::Prev, to_thread(pred));

            addr(pred)
        };

        set_link(self.head_ptr(), Direction::Prev, new_root_raw);
        top
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Elem {
        sref: SplayRef,
        key: i32,
    }

    impl Elem {
        fn new(key: i32) -> Box<Elem> {
            Box::new(Elem { sref: SplayRef::new(), key })
        }
    }

    unsafe fn key_of(r: NonNull<SplayRef>) -> i32 {
        (*(r.as_ptr() as *const Elem)).key
    }

    fn by_key(candidate: NonNull<SplayRef>, target: i32) -> Ordering {
        unsafe { key_of(candidate).cmp(&target) }
    }

    fn new_tree() -> Splay<impl Fn(NonNull<SplayRef>, NonNull<SplayRef>) -> Ordering + Copy> {
        let mut tree = Splay::new(|a: NonNull<SplayRef>, b: NonNull<SplayRef>| unsafe {
            key_of(a).cmp(&key_of(b))
        });
        tree.initialize();
        tree
    }

    fn in_order(tree: &Splay<impl Fn(NonNull<SplayRef>, NonNull<SplayRef>) -> Ordering + Copy>) -> Vec<i32> {
        let mut out = vec![];
        let mut cur = tree.first();
        while cur != tree.head() {
            out.push(unsafe { key_of(cur) });
            cur = tree.walk(cur, Direction::Next);
        }
        out
    }

    fn reverse_order(tree: &Splay<impl Fn(NonNull<SplayRef>, NonNull<SplayRef>) -> Ordering + Copy>) -> Vec<i32> {
        let mut out = vec![];
        let mut cur = tree.last();
        while cur != tree.tail() {
            out.push(unsafe { key_of(cur) });
            cur = tree.walk(cur, Direction::Prev);
        }
        out
    }

    #[test]
    fn add_search_roundtrip_splays_the_match_to_root() {
        let mut tree = new_tree();
        assert!(tree.is_empty());

        let keys = [5, 3, 8, 1, 4, 7, 9];
        let elems: Vec<_> = keys.iter().map(|&k| Elem::new(k)).collect();
        for e in &elems {
            tree.add(NonNull::from(&e.sref));
        }
        assert!(!tree.is_empty());

        assert_eq!(in_order(&tree), vec![1, 3, 4, 5, 7, 8, 9]);
        assert_eq!(reverse_order(&tree), vec![9, 8, 7, 5, 4, 3, 1]);

        match tree.search(|c| by_key(c, 4)) {
            Some(SearchResult::Found(node)) => {
                assert_eq!(unsafe { key_of(node) }, 4);
                assert_eq!(tree.root(), Some(node));
            }
            other => panic!("expected to find 4, got {:?}", other),
        }

        assert_eq!(in_order(&tree), vec![1, 3, 4, 5, 7, 8, 9]);
        assert_eq!(reverse_order(&tree), vec![9, 8, 7, 5, 4, 3, 1]);
    }

    #[test]
    fn duplicate_add_returns_the_splayed_match() {
        let mut tree = new_tree();
        let first = Elem::new(42);
        let second = Elem::new(42);

        let inserted = tree.add(NonNull::from(&first.sref));
        let duplicate = tree.add(NonNull::from(&second.sref));

        assert_eq!(inserted, duplicate);
        assert_eq!(tree.root(), Some(inserted));
    }

    #[test]
    fn del_root_keeps_remaining_elements_ordered() {
        let mut tree = new_tree();
        let elems: Vec<_> = (0..30).map(Elem::new).collect();
        for e in &elems {
            tree.add(NonNull::from(&e.sref));
        }

        for target in [15, 0, 29, 7, 22, 1, 28] {
            match tree.search(|c| by_key(c, target)) {
                Some(SearchResult::Found(_)) => {}
                other => panic!("expected to find {}, got {:?}", target, other),
            }
            let removed = tree.del();
            assert_eq!(unsafe { key_of(removed) }, target);

            let order = in_order(&tree);
            assert!(order.windows(2).all(|w| w[0] < w[1]));
            assert!(!order.contains(&target));
        }
    }

    #[test]
    fn del_last_element_empties_the_tree() {
        let mut tree = new_tree();
        let elem = Elem::new(1);
        tree.add(NonNull::from(&elem.sref));
        assert!(!tree.is_empty());
        tree.del();
        assert!(tree.is_empty());
        assert_eq!(tree.first(), tree.head());
    }

    #[test]
    fn remove_missing_key_leaves_tree_untouched() {
        let mut tree = new_tree();
        let elems: Vec<_> = [5, 3, 8].iter().map(|&k| Elem::new(k)).collect();
        for e in &elems {
            tree.add(NonNull::from(&e.sref));
        }
        assert_eq!(tree.remove(|c| by_key(c, 100)), None);
        assert_eq!(in_order(&tree), vec![3, 5, 8]);
    }
}
