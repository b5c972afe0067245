use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::fmt;
use std::marker::PhantomData;
use std::mem::align_of;
use std::ptr;

/// Node color. The discriminants match the packed parent-word encoding:
/// bit 0 clear is red, bit 0 set is black.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub enum Color {
    Red = 0,
    Black = 1,
}

/// Child slot selector.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub enum Direction {
    Left = 0,
    Right = 1,
}

impl Direction {
    /// Exploits the fact that LEFT and RIGHT are set to 0 and 1 respectively.
    #[inline(always)]
    pub fn invert(self) -> Direction {
        Direction::from_usize(1 - self as usize).unwrap()
    }
}

/// Storage for a node's parent link and color.
///
/// Two layouts exist: [`PackedParent`] folds the color into the low bit of
/// the parent word, [`SplitParent`] keeps separate fields. The parent is held
/// as a raw address (`0` = no parent); [`NodePtr`] wraps and unwraps it.
pub trait ParentStore: Copy + Default {
    /// Whether this layout steals the low address bit for the color.
    const PACKED: bool;

    fn parent_bits(&self) -> usize;
    fn set_parent_bits(&mut self, bits: usize);
    fn color(&self) -> Color;
    fn set_color(&mut self, color: Color);
}

/// Parent word with the color packed into bit 0.
///
/// An all-zero word is a red node with no parent, which is exactly the state
/// of a freshly linked node.
#[derive(Debug, Copy, Clone, Default)]
pub struct PackedParent(usize);

impl ParentStore for PackedParent {
    const PACKED: bool = true;

    #[inline(always)]
    fn parent_bits(&self) -> usize {
        self.0 & !1
    }

    #[inline(always)]
    fn set_parent_bits(&mut self, bits: usize) {
        debug_assert!(bits & 1 == 0, "parent address collides with the color bit");
        self.0 = bits | (self.0 & 1);
    }

    #[inline(always)]
    fn color(&self) -> Color {
        Color::from_usize(self.0 & 1).unwrap()
    }

    #[inline(always)]
    fn set_color(&mut self, color: Color) {
        self.0 = (self.0 & !1) | color as usize;
    }
}

/// Parent link and color as two separate fields, for node types whose
/// alignment cannot spare the low bit.
#[derive(Debug, Copy, Clone)]
pub struct SplitParent {
    parent: usize,
    color: Color,
}

impl Default for SplitParent {
    fn default() -> Self {
        SplitParent {
            parent: 0,
            color: Color::Red,
        }
    }
}

impl ParentStore for SplitParent {
    const PACKED: bool = false;

    #[inline(always)]
    fn parent_bits(&self) -> usize {
        self.parent
    }

    #[inline(always)]
    fn set_parent_bits(&mut self, bits: usize) {
        self.parent = bits;
    }

    #[inline(always)]
    fn color(&self) -> Color {
        self.color
    }

    #[inline(always)]
    fn set_color(&mut self, color: Color) {
        self.color = color;
    }
}

/// Storage policy for per-subtree element counts.
///
/// [`SubtreeSize`] keeps a `u64` per node and drops the tree-level counter
/// (the root's subtree size is the element count). The `()` store keeps a
/// single `usize` on the tree instead and costs nothing per node.
pub trait SizeStore: Copy + Default {
    const TRACKED: bool;

    /// Tree-level counter paired with this per-node store.
    type TreeLen: Copy + Default;

    fn subtree(&self) -> u64;
    fn set_subtree(&mut self, n: u64);
    fn incr(len: &mut Self::TreeLen);
    fn decr(len: &mut Self::TreeLen);
    fn stored_len(len: &Self::TreeLen) -> usize;
}

impl SizeStore for () {
    const TRACKED: bool = false;
    type TreeLen = usize;

    #[inline(always)]
    fn subtree(&self) -> u64 {
        0
    }

    #[inline(always)]
    fn set_subtree(&mut self, _n: u64) {}

    #[inline(always)]
    fn incr(len: &mut usize) {
        *len += 1;
    }

    #[inline(always)]
    fn decr(len: &mut usize) {
        *len -= 1;
    }

    #[inline(always)]
    fn stored_len(len: &usize) -> usize {
        *len
    }
}

/// Per-node subtree size cell.
#[derive(Debug, Copy, Clone, Default)]
pub struct SubtreeSize(u64);

impl SizeStore for SubtreeSize {
    const TRACKED: bool = true;
    type TreeLen = ();

    #[inline(always)]
    fn subtree(&self) -> u64 {
        self.0
    }

    #[inline(always)]
    fn set_subtree(&mut self, n: u64) {
        self.0 = n;
    }

    #[inline(always)]
    fn incr(_len: &mut ()) {}

    #[inline(always)]
    fn decr(_len: &mut ()) {}

    #[inline(always)]
    fn stored_len(_len: &()) -> usize {
        0
    }
}

/// Compile-time bundle describing one tree instantiation: key and value
/// types, the context threaded through comparator and callbacks, the
/// augmentation payload carried per node, and the storage layouts.
pub trait TreeConfig {
    type Key;
    type Value;
    type Context;
    type Payload: Default;
    type Parent: ParentStore;
    type Size: SizeStore;
}

/// The common-case configuration: no context, no payload, packed parent
/// word, no subtree sizes.
pub struct Plain<K, V> {
    _marker: PhantomData<(K, V)>,
}

impl<K, V> TreeConfig for Plain<K, V> {
    type Key = K;
    type Value = V;
    type Context = ();
    type Payload = ();
    type Parent = PackedParent;
    type Size = ();
}

/// A heap cell of the tree. Owned by the container that allocated it;
/// parent links are raw non-owning back-references.
pub struct Node<Cfg: TreeConfig> {
    key: Cfg::Key,
    value: Cfg::Value,
    payload: Cfg::Payload,
    up: Cfg::Parent,
    children: [NodePtr<Cfg>; 2],
    size: Cfg::Size,
}

impl<Cfg: TreeConfig> Node<Cfg> {
    /// Rejects instantiations whose alignment cannot carry the packed color
    /// bit. Referenced on the allocation path so the check fires for every
    /// configuration that actually creates nodes.
    pub(crate) const LAYOUT_OK: () = assert!(
        !<Cfg::Parent as ParentStore>::PACKED || align_of::<Node<Cfg>>() >= 2,
        "packed parent/color storage requires node alignment of at least 2"
    );

    pub(crate) fn new(key: Cfg::Key, value: Cfg::Value) -> Self {
        Node {
            key,
            value,
            payload: Default::default(),
            up: Default::default(),
            children: [NodePtr::NULL; 2],
            size: Default::default(),
        }
    }

    pub(crate) fn into_key_value(self) -> (Cfg::Key, Cfg::Value) {
        let Node { key, value, .. } = self;
        (key, value)
    }
}

/// Copyable nullable handle to a [`Node`].
///
/// A null handle stands for an absent child or parent. Handles are borrows
/// of the owning tree: a handle is valid until the node it names is removed
/// or the tree is torn down, and reading through a stale or foreign handle
/// is undefined behavior. The container only vends handles to its own live
/// nodes; anything that mutates through a handle is `unsafe`.
pub struct NodePtr<Cfg: TreeConfig>(*mut Node<Cfg>);

impl<Cfg: TreeConfig> Clone for NodePtr<Cfg> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Cfg: TreeConfig> Copy for NodePtr<Cfg> {}

impl<Cfg: TreeConfig> PartialEq for NodePtr<Cfg> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<Cfg: TreeConfig> Eq for NodePtr<Cfg> {}

impl<Cfg: TreeConfig> Default for NodePtr<Cfg> {
    fn default() -> Self {
        NodePtr::NULL
    }
}

impl<Cfg: TreeConfig> fmt::Debug for NodePtr<Cfg> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodePtr({:p})", self.0)
    }
}

impl<Cfg: TreeConfig> NodePtr<Cfg> {
    pub const NULL: Self = NodePtr(ptr::null_mut());

    pub(crate) fn from_raw(raw: *mut Node<Cfg>) -> Self {
        NodePtr(raw)
    }

    pub fn as_ptr(self) -> *mut Node<Cfg> {
        self.0
    }

    #[inline(always)]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    #[inline(always)]
    fn node<'a>(self) -> &'a Node<Cfg> {
        debug_assert!(!self.is_null());
        unsafe { &*self.0 }
    }

    #[inline(always)]
    fn node_mut<'a>(self) -> &'a mut Node<Cfg> {
        debug_assert!(!self.is_null());
        unsafe { &mut *self.0 }
    }

    #[inline(always)]
    pub fn key(&self) -> &Cfg::Key {
        &self.node().key
    }

    /// Like [`NodePtr::key`] but with the lifetime of the owning tree borrow
    /// rather than of this handle. Container internals only.
    #[inline(always)]
    pub(crate) fn key_ref<'a>(self) -> &'a Cfg::Key
    where
        Cfg: 'a,
    {
        &self.node().key
    }

    #[inline(always)]
    pub(crate) fn value_ref<'a>(self) -> &'a Cfg::Value
    where
        Cfg: 'a,
    {
        &self.node().value
    }

    #[inline(always)]
    pub fn value(&self) -> &Cfg::Value {
        &self.node().value
    }

    /// Augmentation payload of this node.
    #[inline(always)]
    pub fn payload(&self) -> &Cfg::Payload {
        &self.node().payload
    }

    /// # Safety
    /// The handle must be live and no other reference to this node's value
    /// may exist for the returned lifetime.
    #[inline(always)]
    pub unsafe fn value_mut<'a>(self) -> &'a mut Cfg::Value
    where
        Cfg: 'a,
    {
        &mut self.node_mut().value
    }

    /// # Safety
    /// As for [`NodePtr::value_mut`].
    #[inline(always)]
    pub unsafe fn payload_mut<'a>(self) -> &'a mut Cfg::Payload
    where
        Cfg: 'a,
    {
        &mut self.node_mut().payload
    }

    /// # Safety
    /// Overwriting the key with one that orders differently breaks the
    /// search invariant; callers must only store an equal-ordering key.
    #[inline(always)]
    pub(crate) unsafe fn key_mut<'a>(self) -> &'a mut Cfg::Key
    where
        Cfg: 'a,
    {
        &mut self.node_mut().key
    }

    #[inline(always)]
    pub fn child(&self, dir: Direction) -> NodePtr<Cfg> {
        self.node().children[dir as usize]
    }

    #[inline(always)]
    pub fn left(&self) -> NodePtr<Cfg> {
        self.child(Direction::Left)
    }

    #[inline(always)]
    pub fn right(&self) -> NodePtr<Cfg> {
        self.child(Direction::Right)
    }

    /// # Safety
    /// Structural edit; the caller is responsible for re-establishing the
    /// tree invariants (including the child's back-pointer).
    #[inline(always)]
    pub unsafe fn set_child(self, dir: Direction, child: NodePtr<Cfg>) {
        self.node_mut().children[dir as usize] = child;
    }

    #[inline(always)]
    pub fn parent(&self) -> NodePtr<Cfg> {
        NodePtr(self.node().up.parent_bits() as *mut Node<Cfg>)
    }

    /// # Safety
    /// Structural edit; see [`NodePtr::set_child`].
    #[inline(always)]
    pub unsafe fn set_parent(self, parent: NodePtr<Cfg>) {
        self.node_mut().up.set_parent_bits(parent.0 as usize);
    }

    /// Color of a non-null node. Use [`NodePtr::is_red`] / [`NodePtr::is_black`]
    /// where an absent node should read as black.
    #[inline(always)]
    pub fn color(&self) -> Color {
        self.node().up.color()
    }

    /// # Safety
    /// The handle must be live; recoloring arbitrarily breaks the balance
    /// invariants.
    #[inline(always)]
    pub unsafe fn set_color(self, color: Color) {
        self.node_mut().up.set_color(color);
    }

    #[inline(always)]
    pub fn is_red(&self) -> bool {
        !self.is_null() && self.color() == Color::Red
    }

    #[inline(always)]
    pub fn is_black(&self) -> bool {
        !self.is_red()
    }

    /// Subtree size of this node; 0 for a null handle. Only meaningful when
    /// the configuration tracks sizes.
    #[inline(always)]
    pub fn subtree_size(&self) -> u64 {
        if self.is_null() {
            0
        } else {
            self.node().size.subtree()
        }
    }

    #[inline(always)]
    pub(crate) unsafe fn set_subtree_size(self, n: u64) {
        self.node_mut().size.set_subtree(n);
    }

    /// Recomputes this node's subtree size from its children. No-op when
    /// sizes are untracked.
    #[inline(always)]
    pub(crate) unsafe fn refresh_subtree_size(self) {
        if <Cfg::Size as SizeStore>::TRACKED {
            let n = 1 + self.left().subtree_size() + self.right().subtree_size();
            self.set_subtree_size(n);
        }
    }

    pub(crate) unsafe fn copy_metadata_from(self, other: NodePtr<Cfg>) {
        self.set_color(other.color());
        if <Cfg::Size as SizeStore>::TRACKED {
            self.set_subtree_size(other.subtree_size());
        }
    }

    /// Which child slot of its parent this node occupies, or `None` for the
    /// root.
    pub fn direction(&self) -> Option<Direction> {
        let parent = self.parent();
        if parent.is_null() {
            return None;
        }
        if parent.child(Direction::Left) == *self {
            Some(Direction::Left)
        } else {
            debug_assert!(parent.child(Direction::Right) == *self);
            Some(Direction::Right)
        }
    }

    #[inline(always)]
    pub fn is_leaf(&self) -> bool {
        self.left().is_null() && self.right().is_null()
    }

    /// Deepest node along the `dir` child chain, starting from (and possibly
    /// returning) `self`.
    pub fn extremum(self, dir: Direction) -> NodePtr<Cfg> {
        debug_assert!(!self.is_null());
        let mut node = self;
        loop {
            let child = node.child(dir);
            if child.is_null() {
                return node;
            }
            node = child;
        }
    }

    pub fn leftmost(self) -> NodePtr<Cfg> {
        self.extremum(Direction::Left)
    }

    pub fn rightmost(self) -> NodePtr<Cfg> {
        self.extremum(Direction::Right)
    }

    /// In-order neighbor toward `dir`: descend into the `dir` subtree if it
    /// exists, otherwise climb until we arrive from the far side. Null at
    /// the end of the order.
    fn step(self, dir: Direction) -> NodePtr<Cfg> {
        let child = self.child(dir);
        if !child.is_null() {
            return child.extremum(dir.invert());
        }
        let mut node = self;
        loop {
            match node.direction() {
                Some(d) if d == dir => node = node.parent(),
                Some(_) => return node.parent(),
                None => return NodePtr::NULL,
            }
        }
    }

    /// In-order successor, or null.
    pub fn next(self) -> NodePtr<Cfg> {
        self.step(Direction::Right)
    }

    /// In-order predecessor, or null.
    pub fn prev(self) -> NodePtr<Cfg> {
        self.step(Direction::Left)
    }
}

#[cfg(test)]
fn leak_node(key: u32) -> NodePtr<Plain<u32, ()>> {
    NodePtr::from_raw(Box::into_raw(Box::new(Node::new(key, ()))))
}

#[cfg(test)]
fn free_node(node: NodePtr<Plain<u32, ()>>) {
    unsafe { drop(Box::from_raw(node.as_ptr())) };
}

#[test]
fn test_packed_parent_word() {
    let mut up = PackedParent::default();
    assert_eq!(up.parent_bits(), 0);
    assert_eq!(up.color(), Color::Red);

    up.set_parent_bits(0x1000);
    up.set_color(Color::Black);
    assert_eq!(up.parent_bits(), 0x1000);
    assert_eq!(up.color(), Color::Black);

    // The two halves must not bleed into each other.
    up.set_parent_bits(0x2000);
    assert_eq!(up.color(), Color::Black);
    up.set_color(Color::Red);
    assert_eq!(up.parent_bits(), 0x2000);
}

#[test]
fn test_split_parent_word() {
    let mut up = SplitParent::default();
    assert_eq!(up.parent_bits(), 0);
    assert_eq!(up.color(), Color::Red);
    up.set_parent_bits(0x1001);
    up.set_color(Color::Black);
    assert_eq!(up.parent_bits(), 0x1001);
    assert_eq!(up.color(), Color::Black);
}

#[test]
fn test_direction_invert() {
    assert_eq!(Direction::Left.invert(), Direction::Right);
    assert_eq!(Direction::Right.invert(), Direction::Left);
}

#[test]
/// Hand-links three nodes (2 <- 1 -> 3) and walks them with the in-order
/// cursor in both directions.
fn test_in_order_steps() {
    let root = leak_node(2);
    let left = leak_node(1);
    let right = leak_node(3);
    unsafe {
        root.set_color(Color::Black);
        root.set_child(Direction::Left, left);
        root.set_child(Direction::Right, right);
        left.set_parent(root);
        right.set_parent(root);
    }

    assert_eq!(root.direction(), None);
    assert_eq!(left.direction(), Some(Direction::Left));
    assert_eq!(right.direction(), Some(Direction::Right));

    assert_eq!(root.leftmost(), left);
    assert_eq!(root.rightmost(), right);

    assert_eq!(left.next(), root);
    assert_eq!(root.next(), right);
    assert!(right.next().is_null());

    assert_eq!(right.prev(), root);
    assert_eq!(root.prev(), left);
    assert!(left.prev().is_null());

    for n in [left, right, root] {
        free_node(n);
    }
}
