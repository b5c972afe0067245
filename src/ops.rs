use std::cmp::Ordering;

use crate::augment::Augment;
use crate::node::{Color, Direction, NodePtr, SizeStore, TreeConfig};
use crate::order::Comparator;

// Structural operations over an externally owned root pointer. Nothing here
// allocates; the container layer owns node memory and calls down into these.
// Every function requires the handles it is given to name live nodes of the
// tree `root` points into.

/// A null child slot where a key would have to be linked: the prospective
/// parent and the side of it. A null parent names the root slot of an empty
/// tree.
pub struct Location<Cfg: TreeConfig> {
    pub parent: NodePtr<Cfg>,
    pub dir: Direction,
}

pub enum SearchResult<Cfg: TreeConfig> {
    /// A node whose key compares equal.
    Found(NodePtr<Cfg>),
    /// No match; the slot an insertion would fill.
    Miss(Location<Cfg>),
}

/// Single root-to-slot descent: either the matching node or the insertion
/// location that keeps the search order intact.
///
/// # Safety
/// `root` must be null or a live root node.
pub unsafe fn search<Cfg, Cmp>(
    root: NodePtr<Cfg>,
    cmp: &Cmp,
    ctx: &Cfg::Context,
    key: &Cfg::Key,
) -> SearchResult<Cfg>
where
    Cfg: TreeConfig,
    Cmp: Comparator<Cfg::Key, Cfg::Context>,
{
    if root.is_null() {
        return SearchResult::Miss(Location {
            parent: NodePtr::NULL,
            dir: Direction::Left,
        });
    }
    let mut node = root;
    loop {
        let dir = match cmp.compare(ctx, key, node.key()) {
            Ordering::Less => Direction::Left,
            Ordering::Greater => Direction::Right,
            Ordering::Equal => return SearchResult::Found(node),
        };
        let child = node.child(dir);
        if child.is_null() {
            return SearchResult::Miss(Location { parent: node, dir });
        }
        node = child;
    }
}

/// Links `node` as the sole node of an empty tree: black, no parent, no
/// children.
///
/// # Safety
/// `*root` must be null and `node` a live unlinked node.
pub unsafe fn attach_root<Cfg, A>(
    root: &mut NodePtr<Cfg>,
    aug: &A,
    ctx: &Cfg::Context,
    node: NodePtr<Cfg>,
) where
    Cfg: TreeConfig,
    A: Augment<Cfg>,
{
    debug_assert!(root.is_null());
    node.set_parent(NodePtr::NULL);
    node.set_child(Direction::Left, NodePtr::NULL);
    node.set_child(Direction::Right, NodePtr::NULL);
    node.set_color(Color::Black);
    node.set_subtree_size(1);
    *root = node;
    aug.after_link(ctx, node);
}

/// Links `node` (colored red) into the null slot `at`, then restores the
/// balance invariants.
///
/// # Safety
/// `at` must be a current null slot of the tree under `*root`, obtained from
/// [`search`] with `node`'s key, and `node` must be live and unlinked.
pub unsafe fn attach<Cfg, A>(
    root: &mut NodePtr<Cfg>,
    aug: &A,
    ctx: &Cfg::Context,
    node: NodePtr<Cfg>,
    at: Location<Cfg>,
) where
    Cfg: TreeConfig,
    A: Augment<Cfg>,
{
    debug_assert!(!at.parent.is_null());
    debug_assert!(at.parent.child(at.dir).is_null());
    node.set_child(Direction::Left, NodePtr::NULL);
    node.set_child(Direction::Right, NodePtr::NULL);
    node.set_color(Color::Red);
    node.set_subtree_size(1);
    connect(at.parent, node, at.dir);
    if <Cfg::Size as SizeStore>::TRACKED {
        let mut ancestor = at.parent;
        while !ancestor.is_null() {
            ancestor.set_subtree_size(ancestor.subtree_size() + 1);
            ancestor = ancestor.parent();
        }
    }
    aug.after_link(ctx, node);
    fix_attach(root, aug, ctx, node);
}

/// Red-red repair after linking `node`. Classic uncle case analysis: a red
/// uncle recolors and ascends, a black uncle resolves with one or two
/// rotations and terminates.
unsafe fn fix_attach<Cfg, A>(
    root: &mut NodePtr<Cfg>,
    aug: &A,
    ctx: &Cfg::Context,
    mut node: NodePtr<Cfg>,
) where
    Cfg: TreeConfig,
    A: Augment<Cfg>,
{
    while node.parent().is_red() {
        let mut parent = node.parent();
        let grandparent = parent.parent();
        if grandparent.is_null() {
            // Red root: blacken it and we are done.
            parent.set_color(Color::Black);
            aug.after_recolor(ctx, &[parent]);
            return;
        }
        let parent_dir = parent.direction().unwrap();
        let uncle = grandparent.child(parent_dir.invert());
        if uncle.is_red() {
            parent.set_color(Color::Black);
            uncle.set_color(Color::Black);
            grandparent.set_color(Color::Red);
            aug.after_recolor(ctx, &[parent, uncle, grandparent]);
            node = grandparent;
            continue;
        }
        if node.direction() == Some(parent_dir.invert()) {
            // Inner grandchild: straighten the kink so the terminal rotation
            // applies, with `node` and its parent trading generations.
            let pivot = rotate(root, parent, parent_dir);
            debug_assert!(pivot == node);
            aug.after_rotate(ctx, parent, pivot, parent_dir);
            node = parent;
            parent = pivot;
        }
        parent.set_color(Color::Black);
        grandparent.set_color(Color::Red);
        let pivot = rotate(root, grandparent, parent_dir.invert());
        debug_assert!(pivot == parent);
        aug.after_rotate(ctx, grandparent, pivot, parent_dir.invert());
        aug.after_recolor(ctx, &[parent, grandparent]);
        return;
    }
    let top = *root;
    if top.is_red() {
        top.set_color(Color::Black);
        aug.after_recolor(ctx, &[top]);
    }
}

/// Rotates `node` toward `dir`: its `!dir` child takes its place, `node`
/// descends to the `dir` side, and the pivot's inner subtree crosses over.
/// Subtree sizes are refreshed on the demoted node, then the pivot. Returns
/// the pivot. Callers emit `after_rotate` themselves, which lets deletion
/// repair inspect the pre-rotation state first.
///
/// # Safety
/// `node` must be live under `*root` and have a `!dir` child.
pub unsafe fn rotate<Cfg: TreeConfig>(
    root: &mut NodePtr<Cfg>,
    node: NodePtr<Cfg>,
    dir: Direction,
) -> NodePtr<Cfg> {
    let pivot = node.child(dir.invert());
    debug_assert!(!pivot.is_null());
    let inner = pivot.child(dir);
    let parent = node.parent();
    let slot = node.direction();

    connect(node, inner, dir.invert());
    connect(pivot, node, dir);
    match slot {
        Some(d) => connect(parent, pivot, d),
        None => {
            pivot.set_parent(NodePtr::NULL);
            *root = pivot;
        }
    }
    node.refresh_subtree_size();
    pivot.refresh_subtree_size();
    pivot
}

/// Exchanges the tree positions of two distinct nodes: external edge,
/// children, color, and subtree size all swap; keys, values and payloads
/// stay with their nodes. Adjacency (one being the other's parent) is
/// handled by redirecting the edge that would otherwise point at itself.
///
/// # Safety
/// `a` and `b` must be distinct live nodes under `*root`.
pub unsafe fn swap_positions<Cfg: TreeConfig>(
    root: &mut NodePtr<Cfg>,
    a: NodePtr<Cfg>,
    b: NodePtr<Cfg>,
) {
    debug_assert!(!a.is_null() && !b.is_null() && a != b);
    // Normalize adjacency so the parent of the pair is always `a`.
    let (a, b) = if a.parent() == b { (b, a) } else { (a, b) };

    let a_parent = a.parent();
    let a_slot = a.direction();
    let a_children = [a.left(), a.right()];
    let a_color = a.color();
    let a_size = a.subtree_size();
    let b_parent = b.parent();
    let b_slot = b.direction();
    let b_children = [b.left(), b.right()];
    let b_color = b.color();
    let b_size = b.subtree_size();

    if b_parent == a {
        let inner = b_slot.unwrap();
        match a_slot {
            Some(slot) => connect(a_parent, b, slot),
            None => {
                b.set_parent(NodePtr::NULL);
                *root = b;
            }
        }
        // `b` adopts `a`'s children, except that `a` itself fills the slot
        // `b` is vacating.
        for dir in [Direction::Left, Direction::Right] {
            let child = if dir == inner {
                a
            } else {
                a_children[dir as usize]
            };
            connect(b, child, dir);
        }
        for dir in [Direction::Left, Direction::Right] {
            connect(a, b_children[dir as usize], dir);
        }
    } else {
        match a_slot {
            Some(slot) => connect(a_parent, b, slot),
            None => {
                b.set_parent(NodePtr::NULL);
                *root = b;
            }
        }
        match b_slot {
            Some(slot) => connect(b_parent, a, slot),
            None => {
                a.set_parent(NodePtr::NULL);
                *root = a;
            }
        }
        for dir in [Direction::Left, Direction::Right] {
            connect(a, b_children[dir as usize], dir);
            connect(b, a_children[dir as usize], dir);
        }
    }

    a.set_color(b_color);
    b.set_color(a_color);
    if <Cfg::Size as SizeStore>::TRACKED {
        a.set_subtree_size(b_size);
        b.set_subtree_size(a_size);
    }
}

/// Unlinks `node` from the tree and restores the balance invariants. The
/// node's memory is untouched; freeing it afterward is the caller's job.
///
/// Removal first sinks the node to a leaf position by position-swaps (with
/// its in-order successor, then with a straggling red child), so the node
/// that physically leaves the tree is always a leaf.
///
/// # Safety
/// `node` must be live under `*root`.
pub unsafe fn detach<Cfg, A>(
    root: &mut NodePtr<Cfg>,
    aug: &A,
    ctx: &Cfg::Context,
    node: NodePtr<Cfg>,
) where
    Cfg: TreeConfig,
    A: Augment<Cfg>,
{
    if !node.right().is_null() {
        let successor = node.right().leftmost();
        swap_positions(root, node, successor);
        aug.after_swap(ctx, node, successor);
        let straggler = node.right();
        if !straggler.is_null() {
            // The successor's old right child; balance forces a red leaf.
            debug_assert!(straggler.is_red() && straggler.is_leaf());
            swap_positions(root, node, straggler);
            aug.after_swap(ctx, node, straggler);
        }
    } else if !node.left().is_null() {
        let child = node.left();
        debug_assert!(child.is_red() && child.is_leaf());
        swap_positions(root, node, child);
        aug.after_swap(ctx, node, child);
    }
    debug_assert!(node.is_leaf());

    aug.before_unlink(ctx, node);

    let parent = node.parent();
    if parent.is_null() {
        *root = NodePtr::NULL;
        aug.after_unlink(ctx, node);
        return;
    }
    let dir = node.direction().unwrap();
    let deficit = node.is_black();
    parent.set_child(dir, NodePtr::NULL);
    node.set_parent(NodePtr::NULL);
    if <Cfg::Size as SizeStore>::TRACKED {
        let mut ancestor = parent;
        while !ancestor.is_null() {
            ancestor.set_subtree_size(ancestor.subtree_size() - 1);
            ancestor = ancestor.parent();
        }
    }
    if deficit {
        fix_detach(root, aug, ctx, parent, dir);
    }
    aug.after_unlink(ctx, node);
}

/// Repairs the missing black on the `dir` side of `parent` after a black
/// leaf was unlinked there. Absent nephews count as black throughout.
unsafe fn fix_detach<Cfg, A>(
    root: &mut NodePtr<Cfg>,
    aug: &A,
    ctx: &Cfg::Context,
    mut parent: NodePtr<Cfg>,
    mut dir: Direction,
) where
    Cfg: TreeConfig,
    A: Augment<Cfg>,
{
    loop {
        let mut sibling = parent.child(dir.invert());
        debug_assert!(!sibling.is_null());
        if sibling.is_red() {
            // Red sibling: demote it so the deficit faces a black sibling.
            sibling.set_color(Color::Black);
            parent.set_color(Color::Red);
            let pivot = rotate(root, parent, dir);
            debug_assert!(pivot == sibling);
            aug.after_rotate(ctx, parent, sibling, dir);
            aug.after_recolor(ctx, &[sibling, parent]);
            sibling = parent.child(dir.invert());
        }

        let close = sibling.child(dir);
        let mut distant = sibling.child(dir.invert());
        if close.is_black() && distant.is_black() {
            sibling.set_color(Color::Red);
            if parent.is_red() {
                parent.set_color(Color::Black);
                aug.after_recolor(ctx, &[sibling, parent]);
                return;
            }
            aug.after_recolor(ctx, &[sibling]);
            match parent.direction() {
                // Both sides of the root lost a black level; nothing owed.
                None => return,
                Some(d) => {
                    dir = d;
                    parent = parent.parent();
                    continue;
                }
            }
        }

        if distant.is_black() {
            // Close nephew is red: surface it as the new sibling.
            sibling.set_color(Color::Red);
            close.set_color(Color::Black);
            let pivot = rotate(root, sibling, dir.invert());
            debug_assert!(pivot == close);
            aug.after_rotate(ctx, sibling, close, dir.invert());
            aug.after_recolor(ctx, &[sibling, close]);
            distant = sibling;
            sibling = close;
        }

        // Red distant nephew: one rotation pays the debt.
        sibling.set_color(parent.color());
        parent.set_color(Color::Black);
        distant.set_color(Color::Black);
        let pivot = rotate(root, parent, dir);
        debug_assert!(pivot == sibling);
        aug.after_rotate(ctx, parent, sibling, dir);
        aug.after_recolor(ctx, &[sibling, parent, distant]);
        return;
    }
}

#[inline(always)]
unsafe fn connect<Cfg: TreeConfig>(parent: NodePtr<Cfg>, child: NodePtr<Cfg>, dir: Direction) {
    if !parent.is_null() {
        parent.set_child(dir, child);
    }
    if !child.is_null() {
        child.set_parent(parent);
    }
}

#[cfg(test)]
use crate::node::{Node, Plain};

#[cfg(test)]
type TCfg = Plain<u32, ()>;

#[cfg(test)]
fn boxed(key: u32, color: Color) -> NodePtr<TCfg> {
    let node = NodePtr::from_raw(Box::into_raw(Box::new(Node::new(key, ()))));
    unsafe { node.set_color(color) };
    node
}

#[cfg(test)]
fn free(node: NodePtr<TCfg>) {
    unsafe { drop(Box::from_raw(node.as_ptr())) };
}

#[test]
/// A left rotation promotes the right child, demotes the rotated node, and
/// hands the pivot's inner subtree across; a right rotation undoes it.
fn test_rotate_reparents_inner_subtree() {
    let a = boxed(1, Color::Red);
    let b = boxed(2, Color::Black);
    let c = boxed(3, Color::Black);
    let d = boxed(4, Color::Red);
    let e = boxed(5, Color::Black);
    unsafe {
        connect(b, a, Direction::Left);
        connect(b, d, Direction::Right);
        connect(d, c, Direction::Left);
        connect(d, e, Direction::Right);
        let mut root = b;

        let pivot = rotate(&mut root, b, Direction::Left);
        assert_eq!(pivot, d);
        assert_eq!(root, d);
        assert!(d.parent().is_null());
        assert_eq!(d.left(), b);
        assert_eq!(d.right(), e);
        assert_eq!(b.parent(), d);
        assert_eq!(b.left(), a);
        assert_eq!(b.right(), c);
        assert_eq!(c.parent(), b);

        let pivot = rotate(&mut root, d, Direction::Right);
        assert_eq!(pivot, b);
        assert_eq!(root, b);
        assert_eq!(b.right(), d);
        assert_eq!(d.left(), c);
        assert_eq!(c.parent(), d);
    }
    for n in [a, b, c, d, e] {
        free(n);
    }
}

#[test]
/// Position swaps exchange edges, children and colors but never key data,
/// including the self-referential edge of a parent/child pair.
fn test_swap_positions_adjacent_and_distant() {
    let n1 = boxed(1, Color::Red);
    let n2 = boxed(2, Color::Black);
    let n3 = boxed(3, Color::Red);
    let n4 = boxed(4, Color::Red);
    unsafe {
        connect(n2, n1, Direction::Left);
        connect(n2, n4, Direction::Right);
        connect(n4, n3, Direction::Left);
        let mut root = n2;

        // Parent and child trade places; the child's vacated slot must point
        // back at the former parent, not at the child itself.
        swap_positions(&mut root, n2, n4);
        assert_eq!(root, n4);
        assert!(n4.parent().is_null());
        assert_eq!(n4.left(), n1);
        assert_eq!(n4.right(), n2);
        assert_eq!(n1.parent(), n4);
        assert_eq!(n2.parent(), n4);
        assert_eq!(n2.left(), n3);
        assert!(n2.right().is_null());
        assert_eq!(n3.parent(), n2);
        assert_eq!(n4.color(), Color::Black);
        assert_eq!(n2.color(), Color::Red);
        assert_eq!(*n2.key(), 2);
        assert_eq!(*n4.key(), 4);

        // Two unrelated leaves under different parents.
        swap_positions(&mut root, n1, n3);
        assert_eq!(n4.left(), n3);
        assert_eq!(n3.parent(), n4);
        assert_eq!(n2.left(), n1);
        assert_eq!(n1.parent(), n2);
    }
    for n in [n1, n2, n3, n4] {
        free(n);
    }
}
