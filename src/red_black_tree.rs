use colored::Colorize;
use std::alloc::Layout;
use std::cmp::Ordering;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::mem;
use std::ptr;
use std::ptr::NonNull;

use crate::alloc::{AllocError, Allocator};
use crate::augment::{Augment, NoAugment};
use crate::node::{Direction, Node, NodePtr, SizeStore, TreeConfig};
use crate::ops::{self, SearchResult};
use crate::order::{Comparator, DefaultOrder};

/// What to do when an insertion finds an equal key already stored.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Clobber {
    /// Keep the stored entry; hand the incoming pair back.
    None,
    /// Overwrite the value, keep the stored key.
    Value,
    /// Overwrite key and value both. The incoming key must compare equal to
    /// the stored one; storing a differently-ordered key is unchecked misuse.
    KeyAndValue,
}

/// What an insertion did, carrying any displaced or rejected data.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome<K, V> {
    /// A fresh node was linked.
    Inserted,
    /// An equal key was present under [`Clobber::None`]; the incoming pair
    /// comes back untouched.
    Rejected { key: K, value: V },
    /// The stored value was replaced under [`Clobber::Value`]; `value` is the
    /// displaced value and `key` the incoming key, which was not stored.
    ReplacedValue { key: K, value: V },
    /// Key and value were both replaced under [`Clobber::KeyAndValue`];
    /// the displaced pair.
    Replaced { key: K, value: V },
}

pub struct Insertion<Cfg: TreeConfig> {
    pub node: NodePtr<Cfg>,
    pub found_existing: bool,
    pub outcome: Outcome<Cfg::Key, Cfg::Value>,
}

/// An ordered map from keys to values, backed by a red-black tree of heap
/// nodes.
///
/// The tree owns its nodes but not an allocator: every operation that
/// allocates or frees takes one, and the same allocator must be used for the
/// tree's whole life. Dropping a non-empty tree without calling
/// [`RedBlackTree::clear`] leaks the nodes; the [`TreeMap`](crate::map::TreeMap)
/// wrapper packages an allocator and handles this automatically.
///
/// `Cmp` supplies the key order and `Aug` the structural-change callbacks;
/// both are stored inline and are usually zero-sized.
pub struct RedBlackTree<Cfg: TreeConfig, Cmp = DefaultOrder, Aug = NoAugment> {
    root: NodePtr<Cfg>,
    len: <Cfg::Size as SizeStore>::TreeLen,
    cmp: Cmp,
    aug: Aug,
}

impl<Cfg: TreeConfig, Cmp: Default, Aug: Default> Default for RedBlackTree<Cfg, Cmp, Aug> {
    fn default() -> Self {
        RedBlackTree {
            root: NodePtr::NULL,
            len: Default::default(),
            cmp: Cmp::default(),
            aug: Aug::default(),
        }
    }
}

impl<Cfg: TreeConfig, Cmp, Aug> RedBlackTree<Cfg, Cmp, Aug> {
    pub fn new() -> Self
    where
        Cmp: Default,
        Aug: Default,
    {
        Self::default()
    }

    pub fn with_parts(cmp: Cmp, aug: Aug) -> Self {
        RedBlackTree {
            root: NodePtr::NULL,
            len: Default::default(),
            cmp,
            aug,
        }
    }

    /// Root handle; null when empty.
    pub fn root(&self) -> NodePtr<Cfg> {
        self.root
    }

    pub fn comparator(&self) -> &Cmp {
        &self.cmp
    }

    pub fn augment(&self) -> &Aug {
        &self.aug
    }

    /// Number of stored entries. With subtree sizes enabled this reads the
    /// root's size; otherwise a stored counter.
    pub fn count(&self) -> usize {
        if <Cfg::Size as SizeStore>::TRACKED {
            self.root.subtree_size() as usize
        } else {
            <Cfg::Size as SizeStore>::stored_len(&self.len)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_null()
    }
}

impl<Cfg, Cmp, Aug> RedBlackTree<Cfg, Cmp, Aug>
where
    Cfg: TreeConfig,
    Cmp: Comparator<Cfg::Key, Cfg::Context>,
    Aug: Augment<Cfg>,
{
    /// Inserts `key`/`value`, resolving an equal-key collision per `policy`.
    /// Fails only on allocation failure, leaving the tree unchanged.
    pub fn insert<A: Allocator>(
        &mut self,
        alloc: &A,
        ctx: &Cfg::Context,
        key: Cfg::Key,
        value: Cfg::Value,
        policy: Clobber,
    ) -> Result<Insertion<Cfg>, AllocError> {
        match unsafe { ops::search(self.root, &self.cmp, ctx, &key) } {
            SearchResult::Found(node) => {
                let outcome = match policy {
                    Clobber::None => Outcome::Rejected { key, value },
                    Clobber::Value => {
                        let value = mem::replace(unsafe { node.value_mut() }, value);
                        Outcome::ReplacedValue { key, value }
                    }
                    Clobber::KeyAndValue => {
                        debug_assert!(
                            self.cmp.compare(ctx, &key, node.key_ref()) == Ordering::Equal,
                            "replacement key orders differently from the stored key"
                        );
                        let key = mem::replace(unsafe { node.key_mut() }, key);
                        let value = mem::replace(unsafe { node.value_mut() }, value);
                        Outcome::Replaced { key, value }
                    }
                };
                Ok(Insertion {
                    node,
                    found_existing: true,
                    outcome,
                })
            }
            SearchResult::Miss(at) => {
                let node = self.allocate_node(alloc, key, value)?;
                unsafe {
                    if at.parent.is_null() {
                        ops::attach_root(&mut self.root, &self.aug, ctx, node);
                    } else {
                        ops::attach(&mut self.root, &self.aug, ctx, node, at);
                    }
                }
                <Cfg::Size as SizeStore>::incr(&mut self.len);
                Ok(Insertion {
                    node,
                    found_existing: false,
                    outcome: Outcome::Inserted,
                })
            }
        }
    }

    /// Insert-or-overwrite-value; returns the displaced value.
    pub fn put<A: Allocator>(
        &mut self,
        alloc: &A,
        ctx: &Cfg::Context,
        key: Cfg::Key,
        value: Cfg::Value,
    ) -> Result<Option<Cfg::Value>, AllocError> {
        Ok(
            match self.insert(alloc, ctx, key, value, Clobber::Value)?.outcome {
                Outcome::ReplacedValue { value, .. } => Some(value),
                _ => None,
            },
        )
    }

    /// Insert under the caller's guarantee that the key is absent
    /// (debug-asserted).
    pub fn put_no_clobber<A: Allocator>(
        &mut self,
        alloc: &A,
        ctx: &Cfg::Context,
        key: Cfg::Key,
        value: Cfg::Value,
    ) -> Result<(), AllocError> {
        let inserted = self.insert(alloc, ctx, key, value, Clobber::None)?;
        debug_assert!(!inserted.found_existing, "key was already present");
        Ok(())
    }

    /// Insert-or-overwrite, dropping any displaced value.
    pub fn add<A: Allocator>(
        &mut self,
        alloc: &A,
        ctx: &Cfg::Context,
        key: Cfg::Key,
        value: Cfg::Value,
    ) -> Result<(), AllocError> {
        self.put(alloc, ctx, key, value).map(drop)
    }

    /// Insert-or-overwrite key and value; returns the displaced pair.
    pub fn fetch_put<A: Allocator>(
        &mut self,
        alloc: &A,
        ctx: &Cfg::Context,
        key: Cfg::Key,
        value: Cfg::Value,
    ) -> Result<Option<(Cfg::Key, Cfg::Value)>, AllocError> {
        Ok(
            match self
                .insert(alloc, ctx, key, value, Clobber::KeyAndValue)?
                .outcome
            {
                Outcome::Replaced { key, value } => Some((key, value)),
                _ => None,
            },
        )
    }

    /// Returns the node holding `key`, inserting `value` under it first if
    /// absent. The flag is true when the entry pre-existed (in which case the
    /// incoming pair is dropped).
    pub fn get_or_put<A: Allocator>(
        &mut self,
        alloc: &A,
        ctx: &Cfg::Context,
        key: Cfg::Key,
        value: Cfg::Value,
    ) -> Result<(NodePtr<Cfg>, bool), AllocError> {
        let inserted = self.insert(alloc, ctx, key, value, Clobber::None)?;
        Ok((inserted.node, inserted.found_existing))
    }

    /// Removes `key`'s entry if present.
    pub fn remove<A: Allocator>(&mut self, alloc: &A, ctx: &Cfg::Context, key: &Cfg::Key) -> bool {
        self.fetch_remove(alloc, ctx, key).is_some()
    }

    /// Removes `key`'s entry and returns it.
    pub fn fetch_remove<A: Allocator>(
        &mut self,
        alloc: &A,
        ctx: &Cfg::Context,
        key: &Cfg::Key,
    ) -> Option<(Cfg::Key, Cfg::Value)> {
        let node = self.find(ctx, key)?;
        Some(unsafe { self.unlink_and_free(alloc, ctx, node) })
    }
}

impl<Cfg, Cmp, Aug> RedBlackTree<Cfg, Cmp, Aug>
where
    Cfg: TreeConfig,
    Cmp: Comparator<Cfg::Key, Cfg::Context>,
{
    /// Node holding `key`, if any. The handle stays valid until that node is
    /// removed or the tree is cleared.
    pub fn find(&self, ctx: &Cfg::Context, key: &Cfg::Key) -> Option<NodePtr<Cfg>> {
        match unsafe { ops::search(self.root, &self.cmp, ctx, key) } {
            SearchResult::Found(node) => Some(node),
            SearchResult::Miss(_) => None,
        }
    }

    pub fn contains(&self, ctx: &Cfg::Context, key: &Cfg::Key) -> bool {
        self.find(ctx, key).is_some()
    }

    pub fn get(&self, ctx: &Cfg::Context, key: &Cfg::Key) -> Option<&Cfg::Value> {
        self.find(ctx, key).map(|node| node.value_ref())
    }

    pub fn get_mut(&mut self, ctx: &Cfg::Context, key: &Cfg::Key) -> Option<&mut Cfg::Value> {
        self.find(ctx, key).map(|node| unsafe { node.value_mut() })
    }

    /// The stored key equal to `key` (useful when keys carry more than their
    /// ordering).
    pub fn get_key(&self, ctx: &Cfg::Context, key: &Cfg::Key) -> Option<&Cfg::Key> {
        self.find(ctx, key).map(|node| node.key_ref())
    }

    pub fn get_entry(
        &self,
        ctx: &Cfg::Context,
        key: &Cfg::Key,
    ) -> Option<(&Cfg::Key, &Cfg::Value)> {
        self.find(ctx, key)
            .map(|node| (node.key_ref(), node.value_ref()))
    }

    /// Node with the least key that is ≥ `key`, or `None`. One descent.
    pub fn find_lower_bound(&self, ctx: &Cfg::Context, key: &Cfg::Key) -> Option<NodePtr<Cfg>> {
        let mut node = self.root;
        let mut best = NodePtr::NULL;
        while !node.is_null() {
            match self.cmp.compare(ctx, key, node.key_ref()) {
                Ordering::Equal => return Some(node),
                Ordering::Less => {
                    best = node;
                    node = node.left();
                }
                Ordering::Greater => node = node.right(),
            }
        }
        if best.is_null() {
            None
        } else {
            Some(best)
        }
    }

    /// Node with the greatest key that is ≤ `key`, or `None`. One descent.
    pub fn find_upper_bound(&self, ctx: &Cfg::Context, key: &Cfg::Key) -> Option<NodePtr<Cfg>> {
        let mut node = self.root;
        let mut best = NodePtr::NULL;
        while !node.is_null() {
            match self.cmp.compare(ctx, key, node.key_ref()) {
                Ordering::Equal => return Some(node),
                Ordering::Greater => {
                    best = node;
                    node = node.right();
                }
                Ordering::Less => node = node.left(),
            }
        }
        if best.is_null() {
            None
        } else {
            Some(best)
        }
    }
}

impl<Cfg, Cmp, Aug> RedBlackTree<Cfg, Cmp, Aug>
where
    Cfg: TreeConfig,
    Aug: Augment<Cfg>,
{
    /// Removes the node behind `node`, invalidating the handle.
    ///
    /// # Safety
    /// `node` must be a live node of this tree.
    pub unsafe fn remove_node<A: Allocator>(
        &mut self,
        alloc: &A,
        ctx: &Cfg::Context,
        node: NodePtr<Cfg>,
    ) {
        drop(self.unlink_and_free(alloc, ctx, node));
    }

    /// Removes `node` and returns its in-order successor, computed before
    /// the removal invalidates the node's links.
    ///
    /// # Safety
    /// As for [`RedBlackTree::remove_node`].
    pub unsafe fn remove_node_get_next<A: Allocator>(
        &mut self,
        alloc: &A,
        ctx: &Cfg::Context,
        node: NodePtr<Cfg>,
    ) -> Option<NodePtr<Cfg>> {
        let next = node.next();
        self.remove_node(alloc, ctx, node);
        if next.is_null() {
            None
        } else {
            Some(next)
        }
    }

    /// Removes `node` and returns its in-order predecessor, computed before
    /// the removal invalidates the node's links.
    ///
    /// # Safety
    /// As for [`RedBlackTree::remove_node`].
    pub unsafe fn remove_node_get_prev<A: Allocator>(
        &mut self,
        alloc: &A,
        ctx: &Cfg::Context,
        node: NodePtr<Cfg>,
    ) -> Option<NodePtr<Cfg>> {
        let prev = node.prev();
        self.remove_node(alloc, ctx, node);
        if prev.is_null() {
            None
        } else {
            Some(prev)
        }
    }

    unsafe fn unlink_and_free<A: Allocator>(
        &mut self,
        alloc: &A,
        ctx: &Cfg::Context,
        node: NodePtr<Cfg>,
    ) -> (Cfg::Key, Cfg::Value) {
        ops::detach(&mut self.root, &self.aug, ctx, node);
        <Cfg::Size as SizeStore>::decr(&mut self.len);
        self.free_node(alloc, node)
    }
}

impl<Cfg: TreeConfig, Cmp, Aug> RedBlackTree<Cfg, Cmp, Aug> {
    /// Node with the least key, or `None` when empty.
    pub fn find_min(&self) -> Option<NodePtr<Cfg>> {
        if self.root.is_null() {
            None
        } else {
            Some(self.root.leftmost())
        }
    }

    /// Node with the greatest key, or `None` when empty.
    pub fn find_max(&self) -> Option<NodePtr<Cfg>> {
        if self.root.is_null() {
            None
        } else {
            Some(self.root.rightmost())
        }
    }

    /// Steals the whole tree, leaving `self` empty. O(1); node handles keep
    /// pointing into the returned tree.
    pub fn take(&mut self) -> Self
    where
        Cmp: Clone,
        Aug: Clone,
    {
        RedBlackTree {
            root: mem::replace(&mut self.root, NodePtr::NULL),
            len: mem::take(&mut self.len),
            cmp: self.cmp.clone(),
            aug: self.aug.clone(),
        }
    }

    /// Structurally duplicates the tree: colors, subtree sizes and payloads
    /// are copied node for node rather than rebuilt by re-insertion. On
    /// allocation failure every node already produced is freed and the
    /// original is untouched.
    pub fn clone_in<A: Allocator>(&self, alloc: &A) -> Result<Self, AllocError>
    where
        Cfg::Key: Clone,
        Cfg::Value: Clone,
        Cfg::Payload: Clone,
        Cmp: Clone,
        Aug: Clone,
    {
        let mut clone = RedBlackTree {
            root: NodePtr::NULL,
            len: self.len,
            cmp: self.cmp.clone(),
            aug: self.aug.clone(),
        };
        if self.root.is_null() {
            return Ok(clone);
        }
        clone.root = match self.duplicate_node(alloc, self.root) {
            Ok(node) => node,
            Err(e) => return Err(e),
        };
        // Preorder lockstep walk: a null child slot on the clone side marks
        // the next subtree still to build.
        let mut src = self.root;
        let mut dst = clone.root;
        loop {
            let mut descended = false;
            for dir in [Direction::Left, Direction::Right] {
                let src_child = src.child(dir);
                if src_child.is_null() || !dst.child(dir).is_null() {
                    continue;
                }
                let copy = match self.duplicate_node(alloc, src_child) {
                    Ok(copy) => copy,
                    Err(e) => {
                        clone.clear(alloc);
                        return Err(e);
                    }
                };
                unsafe {
                    dst.set_child(dir, copy);
                    copy.set_parent(dst);
                }
                src = src_child;
                dst = copy;
                descended = true;
                break;
            }
            if descended {
                continue;
            }
            if src == self.root {
                break;
            }
            src = src.parent();
            dst = dst.parent();
        }
        Ok(clone)
    }

    fn duplicate_node<A: Allocator>(
        &self,
        alloc: &A,
        src: NodePtr<Cfg>,
    ) -> Result<NodePtr<Cfg>, AllocError>
    where
        Cfg::Key: Clone,
        Cfg::Value: Clone,
        Cfg::Payload: Clone,
    {
        let node = self.allocate_node(alloc, src.key_ref().clone(), src.value_ref().clone())?;
        unsafe {
            *node.payload_mut() = src.payload().clone();
            node.copy_metadata_from(src);
        }
        Ok(node)
    }

    /// Frees every node. Iterative postorder teardown along the parent
    /// links, so arbitrarily tall trees cost no call stack.
    pub fn clear<A: Allocator>(&mut self, alloc: &A) {
        let mut node = self.root;
        self.root = NodePtr::NULL;
        self.len = Default::default();
        while !node.is_null() {
            let left = node.left();
            if !left.is_null() {
                node = left;
                continue;
            }
            let right = node.right();
            if !right.is_null() {
                node = right;
                continue;
            }
            let parent = node.parent();
            if !parent.is_null() {
                unsafe { parent.set_child(node.direction().unwrap(), NodePtr::NULL) };
            }
            unsafe { drop(self.free_node(alloc, node)) };
            node = parent;
        }
    }

    /// In-order, double-ended iteration over `(&key, &value)`.
    pub fn iter(&self) -> Iter<'_, Cfg> {
        let (front, back) = if self.root.is_null() {
            (NodePtr::NULL, NodePtr::NULL)
        } else {
            (self.root.leftmost(), self.root.rightmost())
        };
        Iter {
            front,
            back,
            _tree: PhantomData,
        }
    }

    fn allocate_node<A: Allocator>(
        &self,
        alloc: &A,
        key: Cfg::Key,
        value: Cfg::Value,
    ) -> Result<NodePtr<Cfg>, AllocError> {
        // Forces the packed-layout alignment check for this instantiation.
        let () = Node::<Cfg>::LAYOUT_OK;
        let raw = alloc
            .allocate(Layout::new::<Node<Cfg>>())?
            .cast::<Node<Cfg>>();
        unsafe { raw.as_ptr().write(Node::new(key, value)) };
        Ok(NodePtr::from_raw(raw.as_ptr()))
    }

    unsafe fn free_node<A: Allocator>(
        &self,
        alloc: &A,
        node: NodePtr<Cfg>,
    ) -> (Cfg::Key, Cfg::Value) {
        let cell = ptr::read(node.as_ptr());
        alloc.deallocate(
            NonNull::new_unchecked(node.as_ptr().cast()),
            Layout::new::<Node<Cfg>>(),
        );
        cell.into_key_value()
    }
}

impl<Cfg, Cmp, Aug> RedBlackTree<Cfg, Cmp, Aug>
where
    Cfg: TreeConfig,
    Cmp: Comparator<Cfg::Key, Cfg::Context>,
{
    /// Full structural audit: black root, no red-red edges, equal black
    /// heights on every root-to-null path, consistent parent back-pointers
    /// and subtree sizes, a count that matches the reachable nodes, and
    /// strictly increasing in-order keys.
    pub fn is_valid_red_black_tree(&self, ctx: &Cfg::Context) -> bool {
        if self.root.is_null() {
            return self.count() == 0;
        }
        if self.root.is_red() || !self.root.parent().is_null() {
            return false;
        }

        let mut stack = vec![(self.root, 0u32)];
        let mut black_heights = vec![];
        let mut reachable = 0usize;
        while let Some((node, mut black)) = stack.pop() {
            black += node.is_black() as u32;
            reachable += 1;
            if <Cfg::Size as SizeStore>::TRACKED
                && node.subtree_size()
                    != 1 + node.left().subtree_size() + node.right().subtree_size()
            {
                return false;
            }
            for dir in [Direction::Left, Direction::Right] {
                let child = node.child(dir);
                if child.is_null() {
                    black_heights.push(black);
                    continue;
                }
                if child.parent() != node {
                    return false;
                }
                // Red nodes cannot have red children
                if node.is_red() && child.is_red() {
                    return false;
                }
                stack.push((child, black));
            }
        }
        if !black_heights.iter().all(|&b| b == black_heights[0]) {
            println!("Branch lengths not equal: {:?}", black_heights);
            return false;
        }
        if reachable != self.count() {
            return false;
        }

        let mut node = self.root.leftmost();
        loop {
            let next = node.next();
            if next.is_null() {
                return true;
            }
            if self.cmp.compare(ctx, node.key_ref(), next.key_ref()) != Ordering::Less {
                return false;
            }
            node = next;
        }
    }

    /// Dumps the tree shape to stdout, red nodes in red.
    pub fn pretty_print(&self)
    where
        Cfg::Key: Debug,
    {
        let mut s = String::new();
        let mut stack = vec![(self.root, "".to_string(), "".to_string())];
        while let Some((node, mut padding, pointer)) = stack.pop() {
            if node.is_null() {
                continue;
            }
            s.push_str(&padding);
            s.push_str(&pointer);
            let text = format!("{:?}", node.key_ref());
            if node.is_red() {
                s.push_str(&format!("{}", text.red()));
            } else {
                s.push_str(&text);
            }
            s.push('\n');
            padding.push_str("│  ");

            let right_pointer = "└──".to_string();
            let left_pointer = if !node.right().is_null() {
                "├──".to_string()
            } else {
                "└──".to_string()
            };
            stack.push((node.right(), padding.clone(), right_pointer));
            stack.push((node.left(), padding, left_pointer));
        }
        println!("{}", s);
    }
}

impl<'a, Cfg: TreeConfig, Cmp, Aug> IntoIterator for &'a RedBlackTree<Cfg, Cmp, Aug> {
    type Item = (&'a Cfg::Key, &'a Cfg::Value);
    type IntoIter = Iter<'a, Cfg>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct Iter<'a, Cfg: TreeConfig> {
    front: NodePtr<Cfg>,
    back: NodePtr<Cfg>,
    _tree: PhantomData<&'a Node<Cfg>>,
}

impl<'a, Cfg: TreeConfig> Iterator for Iter<'a, Cfg> {
    type Item = (&'a Cfg::Key, &'a Cfg::Value);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.front;
        if node.is_null() {
            return None;
        }
        if node == self.back {
            self.front = NodePtr::NULL;
            self.back = NodePtr::NULL;
        } else {
            self.front = node.next();
        }
        Some((node.key_ref(), node.value_ref()))
    }
}

impl<'a, Cfg: TreeConfig> DoubleEndedIterator for Iter<'a, Cfg> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let node = self.back;
        if node.is_null() {
            return None;
        }
        if node == self.front {
            self.front = NodePtr::NULL;
            self.back = NodePtr::NULL;
        } else {
            self.back = node.prev();
        }
        Some((node.key_ref(), node.value_ref()))
    }
}

#[cfg(test)]
use crate::alloc::Global;
#[cfg(test)]
use crate::node::{Color, Plain};

#[cfg(test)]
type IntTree = RedBlackTree<Plain<i64, u64>>;

#[cfg(test)]
fn int_node(key: i64, color: Color) -> NodePtr<Plain<i64, u64>> {
    let node = NodePtr::from_raw(Box::into_raw(Box::new(Node::new(key, 0))));
    unsafe { node.set_color(color) };
    node
}

#[cfg(test)]
fn wire(parent: NodePtr<Plain<i64, u64>>, child: NodePtr<Plain<i64, u64>>, dir: Direction) {
    unsafe {
        parent.set_child(dir, child);
        child.set_parent(parent);
    }
}

#[cfg(test)]
fn in_order_keys(tree: &IntTree) -> Vec<i64> {
    tree.iter().map(|(k, _)| *k).collect()
}

#[test]
fn test_find_after_insertions() {
    let mut tree = IntTree::new();
    for key in [2, 1, 4, 5, 9, 3, 6, 7, 15] {
        tree.put(&Global, &(), key, key as u64).unwrap();
        assert!(tree.is_valid_red_black_tree(&()));
    }
    assert_eq!(in_order_keys(&tree), vec![1, 2, 3, 4, 5, 6, 7, 9, 15]);
    assert_eq!(tree.count(), 9);

    for key in [2, 1, 4, 5, 9, 3, 6, 7, 15] {
        let node = tree.find(&(), &key).unwrap();
        assert_eq!(*node.key(), key);
        assert_eq!(*node.value(), key as u64);
    }
    for key in [-1, 0, 401, 52454225] {
        assert!(tree.find(&(), &key).is_none());
        assert!(tree.get(&(), &key).is_none());
    }
    tree.clear(&Global);
}

#[test]
/// An insertion under a red parent with a red uncle resolves by recoloring
/// alone, pushing red to the grandparent and re-checking from there.
fn test_insert_resolved_by_recoloring() {
    let mut tree = IntTree::new();
    let root = int_node(10, Color::Black);
    let n_m10 = int_node(-10, Color::Red);
    let n_m20 = int_node(-20, Color::Black);
    let n_6 = int_node(6, Color::Black);
    let n_2 = int_node(2, Color::Red);
    let n_8 = int_node(8, Color::Red);
    let n_20 = int_node(20, Color::Red);
    let n_15 = int_node(15, Color::Black);
    let n_25 = int_node(25, Color::Black);
    tree.root = root;
    tree.len = 9;
    wire(root, n_m10, Direction::Left);
    wire(root, n_20, Direction::Right);
    wire(n_m10, n_m20, Direction::Left);
    wire(n_m10, n_6, Direction::Right);
    wire(n_6, n_2, Direction::Left);
    wire(n_6, n_8, Direction::Right);
    wire(n_20, n_15, Direction::Left);
    wire(n_20, n_25, Direction::Right);
    assert!(tree.is_valid_red_black_tree(&()));

    tree.put(&Global, &(), 4, 0).unwrap();

    assert!(n_2.is_black() && n_8.is_black());
    assert!(n_6.is_red());
    assert!(n_m10.is_black() && n_20.is_black());
    assert!(root.is_black());
    let four = tree.find(&(), &4).unwrap();
    assert!(four.is_red());
    assert_eq!(four.parent(), n_2);
    assert!(tree.is_valid_red_black_tree(&()));
    assert_eq!(
        in_order_keys(&tree),
        vec![-20, -10, 2, 4, 6, 8, 10, 15, 20, 25]
    );
    tree.clear(&Global);
}

#[test]
/// A red uncle two levels in a row: the recoloring case cascades from the
/// insertion point up through the root's children.
fn test_insert_recolors_twice_up_the_tree() {
    let mut tree = IntTree::new();
    let root = int_node(10, Color::Black);
    let n_m10 = int_node(-10, Color::Red);
    let n_m20 = int_node(-20, Color::Black);
    let n_6 = int_node(6, Color::Black);
    let n_20 = int_node(20, Color::Red);
    let n_15 = int_node(15, Color::Black);
    let n_12 = int_node(12, Color::Red);
    let n_17 = int_node(17, Color::Red);
    let n_25 = int_node(25, Color::Black);
    tree.root = root;
    tree.len = 9;
    wire(root, n_m10, Direction::Left);
    wire(root, n_20, Direction::Right);
    wire(n_m10, n_m20, Direction::Left);
    wire(n_m10, n_6, Direction::Right);
    wire(n_20, n_15, Direction::Left);
    wire(n_20, n_25, Direction::Right);
    wire(n_15, n_12, Direction::Left);
    wire(n_15, n_17, Direction::Right);
    assert!(tree.is_valid_red_black_tree(&()));

    tree.put(&Global, &(), 19, 0).unwrap();

    assert_eq!(
        in_order_keys(&tree),
        vec![-20, -10, 6, 10, 12, 15, 17, 19, 20, 25]
    );
    assert!(n_17.is_black() && n_12.is_black());
    assert!(n_15.is_red());
    assert!(n_20.is_black() && n_25.is_black());
    assert!(n_m10.is_black());
    let nineteen = tree.find(&(), &19).unwrap();
    assert!(nineteen.is_red());
    assert_eq!(nineteen.parent(), n_17);
    assert_eq!(n_17.right(), nineteen);
    assert!(tree.is_valid_red_black_tree(&()));
    tree.clear(&Global);
}

#[test]
/// Bound lookups: lower bound is the least key at or above the probe, upper
/// bound the greatest key at or below it.
fn test_lower_and_upper_bounds() {
    let mut tree = IntTree::new();
    for key in [10, 20, 30, 40] {
        tree.put(&Global, &(), key, 0).unwrap();
    }
    let key_of = |node: Option<NodePtr<Plain<i64, u64>>>| node.map(|n| *n.key());

    assert_eq!(key_of(tree.find_lower_bound(&(), &25)), Some(30));
    assert_eq!(key_of(tree.find_upper_bound(&(), &25)), Some(20));
    assert_eq!(key_of(tree.find_lower_bound(&(), &40)), Some(40));
    assert_eq!(key_of(tree.find_upper_bound(&(), &40)), Some(40));
    assert_eq!(key_of(tree.find_lower_bound(&(), &5)), Some(10));
    assert_eq!(key_of(tree.find_upper_bound(&(), &5)), None);
    assert_eq!(key_of(tree.find_lower_bound(&(), &50)), None);
    assert_eq!(key_of(tree.find_upper_bound(&(), &50)), Some(40));
    tree.clear(&Global);
}

#[test]
fn test_insert_policies() {
    let mut tree = IntTree::new();
    tree.put(&Global, &(), 7, 1).unwrap();

    let rejected = tree.insert(&Global, &(), 7, 2, Clobber::None).unwrap();
    assert!(rejected.found_existing);
    assert_eq!(rejected.outcome, Outcome::Rejected { key: 7, value: 2 });
    assert_eq!(tree.get(&(), &7), Some(&1));

    let replaced = tree.insert(&Global, &(), 7, 3, Clobber::Value).unwrap();
    assert_eq!(replaced.outcome, Outcome::ReplacedValue { key: 7, value: 1 });
    assert_eq!(tree.get(&(), &7), Some(&3));

    assert_eq!(tree.fetch_put(&Global, &(), 7, 4).unwrap(), Some((7, 3)));
    assert_eq!(tree.fetch_put(&Global, &(), 8, 9).unwrap(), None);
    assert_eq!(tree.count(), 2);
    tree.clear(&Global);
}

#[test]
fn test_get_or_put() {
    let mut tree = IntTree::new();
    let (node, existed) = tree.get_or_put(&Global, &(), 5, 50).unwrap();
    assert!(!existed);
    assert_eq!((*node.key(), *node.value()), (5, 50));

    let (again, existed) = tree.get_or_put(&Global, &(), 5, 99).unwrap();
    assert!(existed);
    assert_eq!(again, node);
    assert_eq!(*again.value(), 50);
    tree.clear(&Global);
}

#[test]
fn test_remove_and_fetch_remove() {
    let mut tree = IntTree::new();
    for key in [5, 3, 8, 1, 4] {
        tree.put(&Global, &(), key, key as u64 * 10).unwrap();
    }
    assert!(!tree.remove(&Global, &(), &99));
    assert_eq!(tree.fetch_remove(&Global, &(), &3), Some((3, 30)));
    assert!(tree.fetch_remove(&Global, &(), &3).is_none());
    assert!(tree.remove(&Global, &(), &5));
    assert_eq!(in_order_keys(&tree), vec![1, 4, 8]);
    assert_eq!(tree.count(), 3);
    assert!(tree.is_valid_red_black_tree(&()));
    tree.clear(&Global);
}

#[test]
fn test_remove_node_neighbors() {
    let mut tree = IntTree::new();
    for key in [1, 2, 3, 4, 5] {
        tree.put(&Global, &(), key, 0).unwrap();
    }
    let three = tree.find(&(), &3).unwrap();
    let next = unsafe { tree.remove_node_get_next(&Global, &(), three) }.unwrap();
    assert_eq!(*next.key(), 4);

    let four = next;
    let prev = unsafe { tree.remove_node_get_prev(&Global, &(), four) }.unwrap();
    assert_eq!(*prev.key(), 2);

    let five = tree.find(&(), &5).unwrap();
    assert!(unsafe { tree.remove_node_get_next(&Global, &(), five) }.is_none());
    assert_eq!(in_order_keys(&tree), vec![1, 2]);
    assert!(tree.is_valid_red_black_tree(&()));
    tree.clear(&Global);
}

#[test]
fn test_take_steals_in_place() {
    let mut tree = IntTree::new();
    for key in [1, 2, 3] {
        tree.put(&Global, &(), key, 0).unwrap();
    }
    let node = tree.find(&(), &2).unwrap();

    let mut stolen = tree.take();
    assert!(tree.is_empty());
    assert_eq!(tree.count(), 0);
    assert_eq!(stolen.count(), 3);
    // Handles follow the nodes, which now belong to the stolen tree.
    assert_eq!(stolen.find(&(), &2), Some(node));
    stolen.clear(&Global);
}

#[test]
fn test_clear_then_reuse() {
    let mut tree = IntTree::new();
    for key in 0..64 {
        tree.put(&Global, &(), key, 0).unwrap();
    }
    tree.clear(&Global);
    assert!(tree.is_empty());
    assert_eq!(tree.count(), 0);
    assert!(tree.find_min().is_none());
    assert!(tree.find_max().is_none());

    tree.put(&Global, &(), 42, 7).unwrap();
    assert_eq!(tree.get(&(), &42), Some(&7));
    assert!(tree.is_valid_red_black_tree(&()));
    tree.clear(&Global);
}

#[test]
fn test_iter_both_ends() {
    let mut tree = IntTree::new();
    for key in [4, 1, 3, 2, 5] {
        tree.put(&Global, &(), key, (key * key) as u64).unwrap();
    }
    let forward: Vec<i64> = tree.iter().map(|(k, _)| *k).collect();
    assert_eq!(forward, vec![1, 2, 3, 4, 5]);
    let backward: Vec<i64> = tree.iter().rev().map(|(k, _)| *k).collect();
    assert_eq!(backward, vec![5, 4, 3, 2, 1]);

    let mut both = tree.iter();
    assert_eq!(both.next().map(|(k, _)| *k), Some(1));
    assert_eq!(both.next_back().map(|(k, _)| *k), Some(5));
    assert_eq!(both.next().map(|(k, _)| *k), Some(2));
    assert_eq!(both.next_back().map(|(k, _)| *k), Some(4));
    assert_eq!(both.next().map(|(k, _)| *k), Some(3));
    assert!(both.next().is_none());
    assert!(both.next_back().is_none());
    tree.clear(&Global);
}

#[test]
fn test_min_max() {
    let mut tree = IntTree::new();
    assert!(tree.find_min().is_none());
    for key in [8, 3, 11, 1, 9] {
        tree.put(&Global, &(), key, 0).unwrap();
    }
    assert_eq!(*tree.find_min().unwrap().key(), 1);
    assert_eq!(*tree.find_max().unwrap().key(), 11);
    tree.clear(&Global);
}

#[test]
/// Outer grandchild under a red parent with no uncle: a single rotation at
/// the grandparent resolves the red-red pair.
fn test_insert_outer_grandchild_single_rotation() {
    let mut tree = IntTree::new();
    for key in [40, 30, 50, 60] {
        tree.put(&Global, &(), key, 0).unwrap();
    }
    // The red-uncle insert of 60 pushed everything black below the root.
    let n40 = tree.find(&(), &40).unwrap();
    let n30 = tree.find(&(), &30).unwrap();
    let n50 = tree.find(&(), &50).unwrap();
    let n60 = tree.find(&(), &60).unwrap();
    assert!(n40.is_black() && n30.is_black() && n50.is_black() && n60.is_red());
    assert_eq!(n50.right(), n60);

    tree.put(&Global, &(), 70, 0).unwrap();
    let n70 = tree.find(&(), &70).unwrap();

    // 50 was rotated down-left under 60.
    assert_eq!(tree.root, n40);
    assert_eq!(n40.right(), n60);
    assert!(n60.is_black());
    assert_eq!(n60.left(), n50);
    assert_eq!(n60.right(), n70);
    assert!(n50.is_red() && n70.is_red());
    assert_eq!(n50.parent(), n60);
    assert_eq!(n70.parent(), n60);
    assert!(n50.is_leaf() && n70.is_leaf());
    assert!(tree.is_valid_red_black_tree(&()));
    tree.clear(&Global);
}

#[test]
/// Inner grandchild: the kink is straightened first, then the grandparent
/// rotates, leaving the middle key on top of the three.
fn test_insert_inner_grandchild_double_rotation() {
    let mut tree = IntTree::new();
    for key in [40, 60, 50] {
        tree.put(&Global, &(), key, 0).unwrap();
    }
    let n40 = tree.find(&(), &40).unwrap();
    let n50 = tree.find(&(), &50).unwrap();
    let n60 = tree.find(&(), &60).unwrap();

    assert_eq!(tree.root, n50);
    assert!(n50.is_black());
    assert_eq!(n50.left(), n40);
    assert_eq!(n50.right(), n60);
    assert!(n40.is_red() && n60.is_red());
    assert!(n40.is_leaf() && n60.is_leaf());
    assert!(tree.is_valid_red_black_tree(&()));
    tree.clear(&Global);
}

#[test]
/// Removing an inner node with two children: its red-leaf successor takes
/// over the position (and the black color), and no rebalancing is needed.
fn test_remove_swaps_with_successor() {
    let mut tree = IntTree::new();
    for key in [50, 25, 75, 10, 30, 60, 90] {
        tree.put(&Global, &(), key, 0).unwrap();
    }
    let n30 = tree.find(&(), &30).unwrap();
    let n10 = tree.find(&(), &10).unwrap();
    assert!(tree.remove(&Global, &(), &25));

    assert_eq!(*tree.root.left().key(), 30);
    assert!(n30.is_black());
    assert_eq!(n30.left(), n10);
    assert!(n30.right().is_null());
    assert!(n10.is_red());
    assert_eq!(in_order_keys(&tree), vec![10, 30, 50, 60, 75, 90]);
    assert!(tree.is_valid_red_black_tree(&()));
    tree.clear(&Global);
}

#[test]
/// Removing a black leaf whose sibling has a red distant nephew: the parent
/// rotates toward the deficit and the nephew goes black.
fn test_remove_black_leaf_rebalances_with_rotation() {
    let mut tree = IntTree::new();
    for key in [50, 25, 75, 10, 30, 60, 90] {
        tree.put(&Global, &(), key, 0).unwrap();
    }
    assert!(tree.remove(&Global, &(), &10));
    assert!(tree.remove(&Global, &(), &30));
    // 25 is now a black leaf; its sibling 75 carries two red children.
    let n25 = tree.find(&(), &25).unwrap();
    assert!(n25.is_black() && n25.is_leaf());

    assert!(tree.remove(&Global, &(), &25));

    let n75 = tree.find(&(), &75).unwrap();
    let n50 = tree.find(&(), &50).unwrap();
    let n60 = tree.find(&(), &60).unwrap();
    let n90 = tree.find(&(), &90).unwrap();
    assert_eq!(tree.root, n75);
    assert!(n75.is_black());
    assert_eq!(n75.left(), n50);
    assert_eq!(n75.right(), n90);
    assert!(n50.is_black() && n90.is_black());
    assert_eq!(n50.right(), n60);
    assert!(n60.is_red());
    assert!(tree.is_valid_red_black_tree(&()));
    tree.clear(&Global);
}

#[test]
/// Draining a tree from the minimum keeps it balanced at every size.
fn test_remove_min_drains() {
    let mut tree = IntTree::new();
    for key in 0..64 {
        tree.put(&Global, &(), key, 0).unwrap();
    }
    for expect in 0..64 {
        let min = tree.find_min().unwrap();
        assert_eq!(*min.key(), expect);
        assert_eq!(tree.fetch_remove(&Global, &(), &expect), Some((expect, 0)));
        assert!(tree.is_valid_red_black_tree(&()));
    }
    assert!(tree.is_empty());
}
