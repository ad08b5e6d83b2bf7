//! Red-black color discipline.
//!
//! Ported from `fix_rb_insert`/`fix_rb_remove`/`verify_rb` in `src/refs.c`.
//! The balance byte is reinterpreted as a color: [`RED`] or [`BLACK`].

use core::ptr::NonNull;

use super::{balance_of, child_of, dir_of, has_child, rotate, set_balance, top_of, Discipline, TRef};
use crate::direction::Direction;

const RED: i8 = 0;
const BLACK: i8 = 1;

fn fix_insert(root: NonNull<TRef>, node: NonNull<TRef>) {
    let mut node = node;
    let mut top = top_of(node).expect("node has a parent during fixup");

    if top == root {
        set_balance(node, BLACK);
        return;
    }
    set_balance(node, RED);

    while balance_of(top) == RED {
        let elder = top_of(top).expect("a red node always has a parent");
        let direction = dir_of(top);
        let opposite = direction.opposite();

        if has_child(elder, opposite) {
            let uncle = child_of(elder, opposite).expect("checked above");
            if balance_of(uncle) == RED {
                set_balance(top, BLACK);
                set_balance(uncle, BLACK);
                set_balance(elder, RED);
                node = elder;
                top = match top_of(node) {
                    Some(t) => t,
                    None => return,
                };
                if top != root {
                    continue;
                }
                set_balance(node, BLACK);
                return;
            }
        }

        if child_of(top, direction) != Some(node) {
            rotate(top, direction);
            core::mem::swap(&mut top, &mut node);
        }
        set_balance(top, BLACK);
        set_balance(elder, RED);
        rotate(elder, opposite);
        return;
    }
}

fn fix_remove(root: NonNull<TRef>, top: NonNull<TRef>, dir: Direction, old: NonNull<TRef>) {
    if balance_of(old) == RED {
        return;
    }
    if let Some(child) = child_of(top, dir) {
        if balance_of(child) == RED {
            set_balance(child, BLACK);
            return;
        }
    }

    let mut top = top;
    let mut dir = dir;
    loop {
        let opp = dir.opposite();
        let mut sibling = child_of(top, opp).expect("removal always leaves a sibling");

        if balance_of(sibling) == RED {
            set_balance(top, RED);
            set_balance(sibling, BLACK);
            rotate(top, dir);
            sibling = child_of(top, opp).expect("sibling persists across the rotation");
        }

        let prev_color =
            child_of(sibling, Direction::Prev).map_or(BLACK, |c| balance_of(c));
        let next_color =
            child_of(sibling, Direction::Next).map_or(BLACK, |c| balance_of(c));
        let opp_color = if opp == Direction::Prev { prev_color } else { next_color };

        if prev_color == RED || next_color == RED {
            if opp_color != RED {
                let near = child_of(sibling, dir).expect("a red nephew exists on the near side");
                set_balance(near, BLACK);
                set_balance(sibling, RED);
                rotate(sibling, opp);
                sibling = child_of(top, opp).expect("sibling persists across the rotation");
            }
            set_balance(sibling, balance_of(top));
            set_balance(top, BLACK);
            let far = child_of(sibling, opp).expect("a red nephew exists on the far side");
            set_balance(far, BLACK);
            rotate(top, dir);
            break;
        }

        set_balance(sibling, RED);
        if balance_of(top) == RED {
            set_balance(top, BLACK);
            break;
        }

        dir = dir_of(top);
        match top_of(top) {
            Some(parent) if parent != root => top = parent,
            _ => break,
        }
    }
}

fn check(node: NonNull<TRef>, root: NonNull<TRef>) -> Result<usize, NonNull<TRef>> {
    if top_of(node) == Some(root) && balance_of(node) == RED {
        return Err(node);
    }

    let h = match (has_child(node, Direction::Prev), has_child(node, Direction::Next)) {
        (true, true) => {
            let h1 = check(child_of(node, Direction::Prev).expect("checked above"), root)?;
            let h2 = check(child_of(node, Direction::Next).expect("checked above"), root)?;
            if h1 != h2 {
                return Err(node);
            }
            h1
        }
        (true, false) => check(child_of(node, Direction::Prev).expect("checked above"), root)?,
        (false, true) => check(child_of(node, Direction::Next).expect("checked above"), root)?,
        (false, false) => 0,
    };

    if balance_of(node) != RED {
        Ok(1 + h)
    } else {
        let prev_red = child_of(node, Direction::Prev).map_or(false, |c| balance_of(c) == RED);
        let next_red = child_of(node, Direction::Next).map_or(false, |c| balance_of(c) == RED);
        if !prev_red && !next_red {
            Ok(h)
        } else {
            Err(node)
        }
    }
}

/// The red-black discipline: keeps the path from root to any leaf within a
/// factor of two of the shortest such path, via a color invariant instead
/// of an explicit height.
pub struct Rb;

impl Discipline for Rb {
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
    use crate::tree::Tree;

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
    fn insert_10_20_30_40_50_recolors_and_stays_valid() {
        let mut tree: Tree<Rb, _> = Tree::new(|a, b| unsafe { key_of(a).cmp(&key_of(b)) });
        tree.initialize();

        let elems: Vec<_> = [10, 20, 30, 40, 50].iter().map(|&k| Elem::new(k)).collect();
        for e in &elems {
            tree.add(NonNull::from(&e.tref));
        }

        let mut order = vec![];
        let mut cur = tree.first();
        while cur != tree.tail() {
            order.push(unsafe { key_of(cur) });
            cur = tree.walk(cur, Direction::Next);
        }
        assert_eq!(order, vec![10, 20, 30, 40, 50]);
        assert!(tree.check().is_ok());
    }

    #[test]
    fn remove_keeps_colors_valid() {
        let mut tree: Tree<Rb, _> = Tree::new(|a, b| unsafe { key_of(a).cmp(&key_of(b)) });
        tree.initialize();

        let elems: Vec<_> = (0..60).map(Elem::new).collect();
        for e in &elems {
            tree.add(NonNull::from(&e.tref));
        }
        for target in (0..60).step_by(2) {
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
