//! AVL height-balance discipline.
//!
//! Ported from `rebalance_avl`/`fix_avl_insert`/`fix_avl_remove`/
//! `verify_avl` in `src/refs.c`. The balance byte is a height delta in
//! `-2..=2`, transiently touching `±2` mid fix-up before a rotation brings
//! it back within `-1..=1`.

use core::ptr::NonNull;

use super::{balance_of, child_of, has_child, rotate, set_balance, Discipline, TRef};
use crate::direction::Direction;

/// Single or double rotation restoring `r`'s balance after it reached `±2`.
/// Returns `p`'s balance at the time of the call (the same "change" value
/// `fix_avl_remove` uses to decide whether to keep walking up).
fn rebalance(r: NonNull<TRef>) -> i8 {
    precondition!(balance_of(r) == -2 || balance_of(r) == 2, "rebalance requires a ±2 balance");

    let opp = Direction::from_weight(balance_of(r) as i32 >> 1);
    let dir = opp.opposite();
    let weight = dir.to_weight();

    let p = child_of(r, opp).expect("a ±2 balance implies a child on the taller side");
    let change = balance_of(p);

    if change as i32 == weight {
        // Double rotation: p leans back towards r, so q (p's dir child)
        // becomes the new subtree root.
        let q = child_of(p, dir).expect("double rotation requires a grandchild");
        let qb = balance_of(q) as i32;
        set_balance(r, (-(((qb - weight) >> 1) & qb)) as i8);
        set_balance(p, (-(((qb + weight) >> 1) & qb)) as i8);
        set_balance(q, 0);
        rotate(p, opp);
    } else {
        // Single rotation.
        set_balance(p, (change as i32 + weight) as i8);
        set_balance(r, -(balance_of(p) as i32) as i8);
    }

    rotate(r, dir);
    change
}

fn fix_insert(root: NonNull<TRef>, node: NonNull<TRef>) {
    set_balance(node, 0);
    let mut ref_ = node;
    loop {
        let weight = super::dir_of(ref_).to_weight();
        ref_ = super::top_of(ref_).expect("node has a parent during fixup");
        if ref_ == root {
            break;
        }
        let balance = balance_of(ref_);
        set_balance(ref_, (balance as i32 + weight) as i8);
        if balance_of(ref_) == 0 {
            break;
        }
        if balance != 0 {
            rebalance(ref_);
            break;
        }
    }
}

fn fix_remove(root: NonNull<TRef>, top: NonNull<TRef>, dir: Direction, _old: NonNull<TRef>) {
    let mut ref_ = top;
    let mut dir = dir;
    loop {
        let balance = balance_of(ref_);
        let weight = dir.to_weight();
        set_balance(ref_, (balance as i32 - weight) as i8);
        dir = super::dir_of(ref_);
        let parent = super::top_of(ref_);

        if balance == 0 {
            break;
        }
        if balance_of(ref_) != 0 {
            if rebalance(ref_) == 0 {
                break;
            }
        }

        match parent {
            Some(parent) if parent != root => ref_ = parent,
            _ => break,
        }
    }
}

fn check(node: NonNull<TRef>, root: NonNull<TRef>) -> Result<usize, NonNull<TRef>> {
    let h1 = if has_child(node, Direction::Prev) {
        check(child_of(node, Direction::Prev).expect("checked above"), root)?
    } else {
        0
    };
    let h2 = if has_child(node, Direction::Next) {
        check(child_of(node, Direction::Next).expect("checked above"), root)?
    } else {
        0
    };

    if h1 > h2 {
        if h1 - h2 > 1 {
            return Err(node);
        }
        Ok(1 + h1)
    } else {
        if h2 - h1 > 1 {
            return Err(node);
        }
        Ok(1 + h2)
    }
}

/// The AVL discipline: keeps every node's subtree heights within one of
/// each other.
pub struct Avl;

impl Discipline for Avl {
    fn fix_insert(root: NonNull<TRef>, node: NonNull<TRef>) {
        fix_insert(root, node)
    }

    fn fix_remove(root: NonNull<TRef>, top: NonNull<TRef>, dir: Direction, old: NonNull<TRef>) {
        fix_remove(root, top, dir, old)
    }

    fn check(node: NonNull<TRef>, root: NonNull<TRef>) -> Result<usize, NonNull<TRef>> {
        check(node, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{SearchResult, Tree};
    use core::cmp::Ordering;

    struct Elem {
        tref: TRef,
        key: i32,
    }

    impl Elem {
        fn new(key: i32) -> Box<Elem> {
            Box::new(Elem { tref: TRef::new(), key })
        }
    }

    unsafe fn key_of(tref: NonNull<TRef>) -> i32 {
        (*(tref.as_ptr() as *const Elem)).key
    }

    #[test]
    fn insert_10_20_30_rotates_left_with_20_as_root() {
        let mut tree: Tree<Avl, _> = Tree::new(|a, b| unsafe { key_of(a).cmp(&key_of(b)) });
        tree.initialize();

        let e10 = Elem::new(10);
        let e20 = Elem::new(20);
        let e30 = Elem::new(30);

        tree.add(NonNull::from(&e10.tref));
        tree.add(NonNull::from(&e20.tref));
        tree.add(NonNull::from(&e30.tref));

        // After the single left rotation, walking in-order from the first
        // element must still yield 10, 20, 30 regardless of shape...
        let mut order = vec![];
        let mut cur = tree.first();
        while cur != tree.tail() {
            order.push(unsafe { key_of(cur) });
            cur = tree.walk(cur, Direction::Next);
        }
        assert_eq!(order, vec![10, 20, 30]);

        // ...but 20 must now be the structural root: its parent chain
        // bottoms out at head/tail in exactly two hops, and 10/30 hang
        // directly off it.
        let root_candidate = match tree.search(|c| unsafe { key_of(c).cmp(&20) }) {
            SearchResult::Found(node) => node,
            SearchResult::Missing { .. } => panic!("20 was inserted"),
        };
        assert_eq!(unsafe { key_of(tree.walk(root_candidate, Direction::Prev)) }, 10);
        assert_eq!(unsafe { key_of(tree.walk(root_candidate, Direction::Next)) }, 30);
        assert!(tree.check().is_ok());
    }

    #[test]
    fn remove_keeps_tree_balanced() {
        let mut tree: Tree<Avl, _> = Tree::new(|a, b| unsafe { key_of(a).cmp(&key_of(b)) });
        tree.initialize();

        let elems: Vec<_> = (0..50).map(Elem::new).collect();
        for e in &elems {
            tree.add(NonNull::from(&e.tref));
        }
        for target in (0..50).step_by(3) {
            assert!(tree.remove(|c| unsafe { key_of(c).cmp(&target) }).is_some());
        }

        assert!(tree.check().is_ok());
        let mut order = vec![];
        let mut cur = tree.first();
        while cur != tree.tail() {
            order.push(unsafe { key_of(cur) });
            cur = tree.walk(cur, Direction::Next);
        }
        assert!(order.windows(2).all(|w| w[0] < w[1]));
    }
}
