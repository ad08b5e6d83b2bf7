//! Self-balancing binary search tree behind one interface, parameterized
//! over the rebalancing [`Discipline`] (AVL or red-black).
//!
//! Ported from `include/b6/tree.h` / `src/refs.c`. The tree embeds three
//! sentinels: `root` never moves and is never dereferenced as an element;
//! `head` and `tail` act as implicit -infinity/+infinity keys and fully
//! participate in the same rotations as user-inserted nodes, which is what
//! lets every walk terminate at the fringe without a null check.

pub mod avl;
pub mod rb;

use core::cell::Cell;
use core::cmp::Ordering;
use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::direction::Direction;

pub use avl::Avl;
pub use rb::Rb;

/// A link, embedded in an element to make it a member of a [`Tree`]: two
/// child links, a parent link, the direction under the parent, and a
/// balance byte reinterpreted per discipline (AVL height delta, RB color).
pub struct TRef {
    child: [Cell<Option<NonNull<TRef>>>; 2],
    top: Cell<Option<NonNull<TRef>>>,
    dir: Cell<Direction>,
    balance: Cell<i8>,
}

impl TRef {
    /// Creates a detached reference. It must be linked into a [`Tree`] (via
    /// [`Tree::insert`] or one of its callers) before any tree operation may
    /// be performed on it.
    pub fn new() -> TRef {
        TRef {
            child: [Cell::new(None), Cell::new(None)],
            top: Cell::new(None),
            dir: Cell::new(Direction::Prev),
            balance: Cell::new(0),
        }
    }

    #[inline]
    fn child(&self, dir: Direction) -> Option<NonNull<TRef>> {
        self.child[dir.index()].get()
    }

    #[inline]
    fn set_child(&self, dir: Direction, value: Option<NonNull<TRef>>) {
        self.child[dir.index()].set(value);
    }

    #[inline]
    fn has_child(&self, dir: Direction) -> bool {
        self.child(dir).is_some()
    }
}

impl Default for TRef {
    fn default() -> TRef {
        TRef::new()
    }
}

#[inline]
fn child_of(r: NonNull<TRef>, dir: Direction) -> Option<NonNull<TRef>> {
    unsafe { r.as_ref().child(dir) }
}

#[inline]
fn has_child(r: NonNull<TRef>, dir: Direction) -> bool {
    unsafe { r.as_ref().has_child(dir) }
}

#[inline]
fn set_child(r: NonNull<TRef>, dir: Direction, value: Option<NonNull<TRef>>) {
    unsafe { r.as_ref().set_child(dir, value) };
}

#[inline]
fn top_of(r: NonNull<TRef>) -> Option<NonNull<TRef>> {
    unsafe { r.as_ref().top.get() }
}

#[inline]
fn set_top(r: NonNull<TRef>, value: Option<NonNull<TRef>>) {
    unsafe { r.as_ref().top.set(value) };
}

#[inline]
fn dir_of(r: NonNull<TRef>) -> Direction {
    unsafe { r.as_ref().dir.get() }
}

#[inline]
fn set_dir(r: NonNull<TRef>, value: Direction) {
    unsafe { r.as_ref().dir.set(value) };
}

#[inline]
fn balance_of(r: NonNull<TRef>) -> i8 {
    unsafe { r.as_ref().balance.get() }
}

#[inline]
fn set_balance(r: NonNull<TRef>, value: i8) {
    unsafe { r.as_ref().balance.set(value) };
}

/// Rotates `r` down into the `dir` child slot of its own (opposite-side)
/// child, which takes `r`'s former place under `r`'s parent.
///
/// Shared by every discipline's fix-up code: rotation only ever touches
/// child/parent/direction bookkeeping, never the balance field, which is
/// the discipline's job to maintain around the call.
fn rotate(r: NonNull<TRef>, dir: Direction) {
    let opp = dir.opposite();
    let p = child_of(r, opp).expect("rotate requires a child on the opposite side");
    let q = child_of(p, dir);
    if let Some(q) = q {
        set_top(q, Some(r));
        set_dir(q, opp);
    }
    set_child(r, opp, q);

    let r_top = top_of(r).expect("rotate requires r to have a parent");
    let r_dir = dir_of(r);
    set_top(p, Some(r_top));
    set_child(r_top, r_dir, Some(p));
    set_top(r, Some(p));
    set_child(p, dir, Some(r));
    set_dir(p, r_dir);
    set_dir(r, dir);
}

/// The rebalancing policy for a [`Tree`]: how to fix up the structure after
/// an insertion or removal, and how to audit it for consistency.
///
/// Grouped as a trait, specialized per tree at the type level, rather than
/// a pair of function pointers — there is no dynamic dispatch on the hot
/// path.
pub trait Discipline {
    /// Called immediately after `node` has been attached as a leaf, with
    /// its balance field not yet meaningful. Fixes up ancestors' balance
    /// fields and performs any rotations needed to restore the discipline's
    /// invariant. `root` is the tree's fixed root sentinel, used only to
    /// know when the ancestor walk has gone far enough.
    fn fix_insert(root: NonNull<TRef>, node: NonNull<TRef>);

    /// Called immediately after a node has been detached, with `top`/`dir`
    /// identifying where the vacancy now is (the parent and the direction
    /// under it that lost a child) and `old` the node that was logically
    /// removed (its own balance field, if relevant, was already swapped
    /// with its structural replacement by [`Tree::del`]).
    fn fix_remove(root: NonNull<TRef>, top: NonNull<TRef>, dir: Direction, old: NonNull<TRef>);

    /// Recursively audits the subtree rooted at `node` (normally the tree's
    /// `head`, which is always in-bounds). Returns the subtree's height (a
    /// discipline-specific notion — AVL height, RB black-height) on
    /// success, or the first reference found violating the discipline.
    fn check(node: NonNull<TRef>, root: NonNull<TRef>) -> Result<usize, NonNull<TRef>>;
}

/// The outcome of [`Tree::search`]: either the matching reference, or the
/// attachment point (`top`, `dir`) a matching key would be inserted at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchResult {
    /// An exact match was found.
    Found(NonNull<TRef>),
    /// No match; `top.child(dir)` is the empty slot a new node belongs in.
    Missing {
        /// The reference a new node would be attached under.
        top: NonNull<TRef>,
        /// The direction under `top` a new node would be attached at.
        dir: Direction,
    },
}

/// A self-balancing binary search tree.
///
/// `C` is the tree's default comparator, used by [`Tree::add`]; arbitrary
/// one-off searches (by a key of a different type) go through
/// [`Tree::search`] directly with a closure instead.
///
/// # Safety
///
/// A `Tree` must not be moved after [`Tree::initialize`] has run: `head`,
/// `tail` and `root` are mutually self-referential by address.
pub struct Tree<D: Discipline, C: Fn(NonNull<TRef>, NonNull<TRef>) -> Ordering> {
    head: TRef,
    tail: TRef,
    root: TRef,
    compare: C,
    _discipline: PhantomData<D>,
}

/// The tree's fallback comparator: orders references by raw address. Useful
/// when elements have no natural key and identity is all that matters.
pub fn address_order(a: NonNull<TRef>, b: NonNull<TRef>) -> Ordering {
    (a.as_ptr() as usize).cmp(&(b.as_ptr() as usize))
}

impl<D: Discipline, C: Fn(NonNull<TRef>, NonNull<TRef>) -> Ordering> Tree<D, C> {
    /// Creates an uninitialized tree using `compare` as its default
    /// ordering. Call [`Tree::initialize`] in-place before using it.
    pub fn new(compare: C) -> Self {
        Tree {
            head: TRef::new(),
            tail: TRef::new(),
            root: TRef::new(),
            compare,
            _discipline: PhantomData,
        }
    }

    /// Initializes or clears the tree.
    pub fn initialize(&mut self) {
        let head = self.head_ptr();
        let tail = self.tail_ptr();
        let root = self.root_ptr();

        set_top(head, Some(root));
        set_child(head, Direction::Prev, None);
        set_child(head, Direction::Next, Some(tail));
        set_dir(head, Direction::Prev);
        set_balance(head, Direction::Next.to_weight() as i8);

        set_top(tail, Some(head));
        set_child(tail, Direction::Prev, None);
        set_child(tail, Direction::Next, None);
        set_dir(tail, Direction::Next);
        set_balance(tail, 0);

        set_top(root, None);
        set_child(root, Direction::Prev, Some(head));
        set_child(root, Direction::Next, None);
        set_dir(root, Direction::Prev);
        set_balance(root, 0);
    }

    #[inline]
    fn head_ptr(&self) -> NonNull<TRef> {
        NonNull::from(&self.head)
    }

    #[inline]
    fn tail_ptr(&self) -> NonNull<TRef> {
        NonNull::from(&self.tail)
    }

    #[inline]
    fn root_ptr(&self) -> NonNull<TRef> {
        NonNull::from(&self.root)
    }

    /// `true` iff the tree holds no elements.
    pub fn is_empty(&self) -> bool {
        child_of(self.head_ptr(), Direction::Next) == Some(self.tail_ptr())
            || child_of(self.tail_ptr(), Direction::Prev) == Some(self.head_ptr())
    }

    /// Searches for a match. `examine` is called with every real reference
    /// on the search path (never `head`/`tail`) and must return how that
    /// reference ranks relative to the sought key: `Less` if the reference
    /// precedes the key, `Greater` if it follows it, `Equal` on a match.
    pub fn search<F>(&self, mut examine: F) -> SearchResult
    where
        F: FnMut(NonNull<TRef>) -> Ordering,
    {
        let head = self.head_ptr();
        let tail = self.tail_ptr();
        let mut top = self.root_ptr();
        let mut dir = Direction::Prev;

        loop {
            let candidate =
                child_of(top, dir).expect("search always has a reference to step to");
            if candidate == head {
                dir = Direction::Next;
            } else if candidate == tail {
                dir = Direction::Prev;
            } else {
                match examine(candidate) {
                    Ordering::Equal => return SearchResult::Found(candidate),
                    ordering => dir = Direction::from_ordering(ordering),
                }
            }
            top = candidate;
            if !has_child(top, dir) {
                return SearchResult::Missing { top, dir };
            }
        }
    }

    /// Attaches `node` as `top`'s `dir` child and runs the discipline's
    /// post-insert fix-up.
    ///
    /// # Panics
    ///
    /// Panics if `top` already has a child in `dir`.
    pub fn insert(&mut self, top: NonNull<TRef>, dir: Direction, node: NonNull<TRef>) -> NonNull<TRef> {
        precondition!(!has_child(top, dir), "insert target already has a child in that direction");
        set_top(node, Some(top));
        set_child(node, Direction::Prev, None);
        set_child(node, Direction::Next, None);
        set_dir(node, dir);
        set_child(top, dir, Some(node));
        D::fix_insert(self.root_ptr(), node);
        node
    }

    /// Searches using the tree's default comparator; returns the existing
    /// duplicate unchanged, or inserts `node`.
    pub fn add(&mut self, node: NonNull<TRef>) -> NonNull<TRef> {
        let result = self.search(|candidate| (self.compare)(candidate, node));
        match result {
            SearchResult::Found(existing) => existing,
            SearchResult::Missing { top, dir } => self.insert(top, dir, node),
        }
    }

    /// Standard BST removal: splices `node` out, swapping with its
    /// in-order predecessor or successor when it has two children, then
    /// runs the discipline's post-remove fix-up.
    pub fn del(&mut self, node: NonNull<TRef>) -> NonNull<TRef> {
        let dir = dir_of(node);
        let top = top_of(node).expect("node is linked into the tree");

        if !has_child(node, Direction::Prev) {
            if let Some(next_child) = child_of(node, Direction::Next) {
                set_dir(next_child, dir);
                set_top(next_child, Some(top));
                set_child(top, dir, Some(next_child));
            } else {
                set_child(top, dir, None);
            }
            D::fix_remove(self.root_ptr(), top, dir, node);
        } else if !has_child(node, Direction::Next) {
            let prev_child = child_of(node, Direction::Prev).expect("checked above");
            set_dir(prev_child, dir);
            set_top(prev_child, Some(top));
            set_child(top, dir, Some(prev_child));
            D::fix_remove(self.root_ptr(), top, dir, node);
        } else {
            // Both children present: pull the replacement from whichever
            // side the overloaded balance field currently favors. Either
            // choice is a correct BST removal; this is purely a heuristic
            // to reduce the odds of a deep fix-up walk, mirrored from the
            // source rather than re-derived.
            let direction = if balance_of(node) <= 0 { Direction::Next } else { Direction::Prev };
            let opposite = direction.opposite();

            let mut aux =
                child_of(node, opposite).expect("two-children removal has an opposite subtree");

            if has_child(aux, direction) {
                while has_child(aux, direction) {
                    aux = child_of(aux, direction).expect("loop condition guarantees this");
                }
                let tmp = top_of(aux).expect("predecessor/successor has a parent");

                let aux_opp_child = child_of(aux, opposite);
                set_child(tmp, direction, aux_opp_child);
                if let Some(c) = aux_opp_child {
                    set_top(c, Some(tmp));
                    set_dir(c, direction);
                }

                set_child(top, dir, Some(aux));
                set_top(aux, Some(top));
                let node_opp_child = child_of(node, opposite).expect("two children present");
                let node_dir_child = child_of(node, direction).expect("two children present");
                set_child(aux, opposite, Some(node_opp_child));
                set_child(aux, direction, Some(node_dir_child));
                set_top(node_opp_child, Some(aux));
                set_top(node_dir_child, Some(aux));
                set_dir(aux, dir);
                let balance = balance_of(aux);
                set_balance(aux, balance_of(node));
                set_balance(node, balance);

                D::fix_remove(self.root_ptr(), tmp, direction, node);
            } else {
                set_child(top, dir, Some(aux));
                set_top(aux, Some(top));
                set_dir(aux, dir);
                let node_dir_child = child_of(node, direction).expect("two children present");
                set_child(aux, direction, Some(node_dir_child));
                set_top(node_dir_child, Some(aux));
                let balance = balance_of(aux);
                set_balance(aux, balance_of(node));
                set_balance(node, balance);

                D::fix_remove(self.root_ptr(), aux, opposite, node);
            }
        }

        node
    }

    /// Searches using an arbitrary `examine` closure and, on a match,
    /// removes it.
    pub fn remove<F>(&mut self, examine: F) -> Option<NonNull<TRef>>
    where
        F: FnMut(NonNull<TRef>) -> Ordering,
    {
        match self.search(examine) {
            SearchResult::Found(node) => {
                self.del(node);
                Some(node)
            }
            SearchResult::Missing { .. } => None,
        }
    }

    /// In-order step from `node` in `dir`. `O(log n)` worst case, `O(1)`
    /// amortized over a full traversal.
    pub fn walk(&self, node: NonNull<TRef>, dir: Direction) -> NonNull<TRef> {
        if has_child(node, dir) {
            let opp = dir.opposite();
            let mut cur = child_of(node, dir).expect("checked above");
            while has_child(cur, opp) {
                cur = child_of(cur, opp).expect("loop condition guarantees this");
            }
            cur
        } else {
            let mut cur = node;
            while dir_of(cur) == dir && cur != self.root_ptr() {
                cur = top_of(cur).expect("non-root node has a parent");
            }
            top_of(cur).expect("node below root has a parent")
        }
    }

    /// The in-order first element, or `tail` if the tree is empty.
    pub fn first(&self) -> NonNull<TRef> {
        self.walk(self.head_ptr(), Direction::Next)
    }

    /// The in-order last element, or `head` if the tree is empty.
    pub fn last(&self) -> NonNull<TRef> {
        self.walk(self.tail_ptr(), Direction::Prev)
    }

    /// The sentinel preceding every real element.
    pub fn head(&self) -> NonNull<TRef> {
        self.head_ptr()
    }

    /// The sentinel following every real element.
    pub fn tail(&self) -> NonNull<TRef> {
        self.tail_ptr()
    }

    /// Runs the discipline's integrity audit starting from `head`.
    pub fn check(&self) -> Result<usize, NonNull<TRef>> {
        D::check(self.head_ptr(), self.root_ptr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::avl::Avl;

    struct Elem {
        tref: TRef,
        key: i32,
    }

    impl Elem {
        fn new(key: i32) -> Box<Elem> {
            Box::new(Elem { tref: TRef::new(), key })
        }
    }

    unsafe fn elem_of(tref: NonNull<TRef>) -> *const Elem {
        tref.as_ptr() as *const Elem
    }

    unsafe fn key_of(tref: NonNull<TRef>) -> i32 {
        (*elem_of(tref)).key
    }

    fn by_key(candidate: NonNull<TRef>, target: i32) -> Ordering {
        unsafe { key_of(candidate).cmp(&target) }
    }

    #[test]
    fn search_insert_and_walk_stay_ordered() {
        let mut tree: Tree<Avl, _> = Tree::new(|a, b| unsafe { key_of(a).cmp(&key_of(b)) });
        tree.initialize();
        assert!(tree.is_empty());

        let elems: Vec<_> = [5, 3, 8, 1, 4, 7, 9].iter().map(|&k| Elem::new(k)).collect();
        for elem in &elems {
            tree.add(NonNull::from(&elem.tref));
        }
        assert!(!tree.is_empty());

        let mut sorted = vec![];
        let mut cur = tree.first();
        while cur != tree.tail() {
            sorted.push(unsafe { key_of(cur) });
            cur = tree.walk(cur, Direction::Next);
        }
        assert_eq!(sorted, vec![1, 3, 4, 5, 7, 8, 9]);

        match tree.search(|candidate| by_key(candidate, 7)) {
            SearchResult::Found(node) => assert_eq!(unsafe { key_of(node) }, 7),
            SearchResult::Missing { .. } => panic!("7 was inserted"),
        }

        assert_eq!(tree.check(), Ok(tree.check().unwrap()));
    }

    #[test]
    fn duplicate_add_returns_existing_node() {
        let mut tree: Tree<Avl, _> = Tree::new(|a, b| unsafe { key_of(a).cmp(&key_of(b)) });
        tree.initialize();

        let first = Elem::new(42);
        let second = Elem::new(42);
        let inserted = tree.add(NonNull::from(&first.tref));
        let duplicate = tree.add(NonNull::from(&second.tref));

        assert_eq!(inserted, duplicate);
        assert_eq!(unsafe { key_of(duplicate) }, 42);
    }

    #[test]
    fn del_keeps_remaining_elements_ordered() {
        let mut tree: Tree<Avl, _> = Tree::new(|a, b| unsafe { key_of(a).cmp(&key_of(b)) });
        tree.initialize();

        let elems: Vec<_> = (0..20).map(Elem::new).collect();
        for elem in &elems {
            tree.add(NonNull::from(&elem.tref));
        }

        for target in [0, 19, 10, 5, 15] {
            let removed = tree.remove(|candidate| by_key(candidate, target));
            assert!(removed.is_some());
        }

        let mut sorted = vec![];
        let mut cur = tree.first();
        while cur != tree.tail() {
            sorted.push(unsafe { key_of(cur) });
            cur = tree.walk(cur, Direction::Next);
        }
        assert_eq!(sorted, vec![1, 2, 3, 4, 6, 7, 8, 9, 11, 12, 13, 14, 16, 17, 18]);
        assert!(tree.check().is_ok());
    }
}
