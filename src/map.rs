use std::fmt;
use std::ops::Index;

use crate::alloc::{AllocError, Allocator, Global};
use crate::augment::{Augment, NoAugment};
use crate::node::{NodePtr, TreeConfig};
use crate::order::{Comparator, DefaultOrder};
use crate::red_black_tree::{Clobber, Insertion, Iter, RedBlackTree};

/// [`RedBlackTree`] packaged with its allocator and ordering context, so
/// call sites stop threading them around. Purely delegation plus `Drop`;
/// all algorithmic work lives in the tree it wraps.
pub struct TreeMap<Cfg: TreeConfig, Cmp = DefaultOrder, Aug = NoAugment, A: Allocator = Global> {
    tree: RedBlackTree<Cfg, Cmp, Aug>,
    alloc: A,
    ctx: Cfg::Context,
}

impl<Cfg, Cmp, Aug, A> Default for TreeMap<Cfg, Cmp, Aug, A>
where
    Cfg: TreeConfig,
    Cfg::Context: Default,
    Cmp: Default,
    Aug: Default,
    A: Allocator + Default,
{
    fn default() -> Self {
        TreeMap {
            tree: RedBlackTree::default(),
            alloc: A::default(),
            ctx: Default::default(),
        }
    }
}

impl<Cfg: TreeConfig, Cmp, Aug, A: Allocator> TreeMap<Cfg, Cmp, Aug, A> {
    pub fn new() -> Self
    where
        Cfg::Context: Default,
        Cmp: Default,
        Aug: Default,
        A: Default,
    {
        Self::default()
    }

    pub fn new_in(alloc: A) -> Self
    where
        Cfg::Context: Default,
        Cmp: Default,
        Aug: Default,
    {
        Self::with_parts(Cmp::default(), Aug::default(), Default::default(), alloc)
    }

    pub fn with_context(ctx: Cfg::Context) -> Self
    where
        Cmp: Default,
        Aug: Default,
        A: Default,
    {
        Self::with_parts(Cmp::default(), Aug::default(), ctx, A::default())
    }

    pub fn with_parts(cmp: Cmp, aug: Aug, ctx: Cfg::Context, alloc: A) -> Self {
        TreeMap {
            tree: RedBlackTree::with_parts(cmp, aug),
            alloc,
            ctx,
        }
    }

    /// The wrapped tree, for callers that need the full interface.
    pub fn tree(&self) -> &RedBlackTree<Cfg, Cmp, Aug> {
        &self.tree
    }

    pub fn context(&self) -> &Cfg::Context {
        &self.ctx
    }

    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    pub fn count(&self) -> usize {
        self.tree.count()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn find_min(&self) -> Option<NodePtr<Cfg>> {
        self.tree.find_min()
    }

    pub fn find_max(&self) -> Option<NodePtr<Cfg>> {
        self.tree.find_max()
    }

    pub fn iter(&self) -> Iter<'_, Cfg> {
        self.tree.iter()
    }

    pub fn clear(&mut self) {
        self.tree.clear(&self.alloc);
    }

    /// Steals the contents, leaving this map empty.
    pub fn take(&mut self) -> Self
    where
        Cmp: Clone,
        Aug: Clone,
        Cfg::Context: Clone,
        A: Clone,
    {
        TreeMap {
            tree: self.tree.take(),
            alloc: self.alloc.clone(),
            ctx: self.ctx.clone(),
        }
    }
}

impl<Cfg, Cmp, Aug, A> TreeMap<Cfg, Cmp, Aug, A>
where
    Cfg: TreeConfig,
    Cmp: Comparator<Cfg::Key, Cfg::Context>,
    Aug: Augment<Cfg>,
    A: Allocator,
{
    pub fn insert(
        &mut self,
        key: Cfg::Key,
        value: Cfg::Value,
        policy: Clobber,
    ) -> Result<Insertion<Cfg>, AllocError> {
        self.tree.insert(&self.alloc, &self.ctx, key, value, policy)
    }

    pub fn put(&mut self, key: Cfg::Key, value: Cfg::Value) -> Result<Option<Cfg::Value>, AllocError> {
        self.tree.put(&self.alloc, &self.ctx, key, value)
    }

    pub fn put_no_clobber(&mut self, key: Cfg::Key, value: Cfg::Value) -> Result<(), AllocError> {
        self.tree.put_no_clobber(&self.alloc, &self.ctx, key, value)
    }

    pub fn add(&mut self, key: Cfg::Key, value: Cfg::Value) -> Result<(), AllocError> {
        self.tree.add(&self.alloc, &self.ctx, key, value)
    }

    pub fn fetch_put(
        &mut self,
        key: Cfg::Key,
        value: Cfg::Value,
    ) -> Result<Option<(Cfg::Key, Cfg::Value)>, AllocError> {
        self.tree.fetch_put(&self.alloc, &self.ctx, key, value)
    }

    pub fn get_or_put(
        &mut self,
        key: Cfg::Key,
        value: Cfg::Value,
    ) -> Result<(NodePtr<Cfg>, bool), AllocError> {
        self.tree.get_or_put(&self.alloc, &self.ctx, key, value)
    }

    pub fn find(&self, key: &Cfg::Key) -> Option<NodePtr<Cfg>> {
        self.tree.find(&self.ctx, key)
    }

    pub fn contains(&self, key: &Cfg::Key) -> bool {
        self.tree.contains(&self.ctx, key)
    }

    pub fn get(&self, key: &Cfg::Key) -> Option<&Cfg::Value> {
        self.tree.get(&self.ctx, key)
    }

    pub fn get_mut(&mut self, key: &Cfg::Key) -> Option<&mut Cfg::Value> {
        self.tree.get_mut(&self.ctx, key)
    }

    pub fn get_key(&self, key: &Cfg::Key) -> Option<&Cfg::Key> {
        self.tree.get_key(&self.ctx, key)
    }

    pub fn get_entry(&self, key: &Cfg::Key) -> Option<(&Cfg::Key, &Cfg::Value)> {
        self.tree.get_entry(&self.ctx, key)
    }

    pub fn find_lower_bound(&self, key: &Cfg::Key) -> Option<NodePtr<Cfg>> {
        self.tree.find_lower_bound(&self.ctx, key)
    }

    pub fn find_upper_bound(&self, key: &Cfg::Key) -> Option<NodePtr<Cfg>> {
        self.tree.find_upper_bound(&self.ctx, key)
    }

    pub fn remove(&mut self, key: &Cfg::Key) -> bool {
        self.tree.remove(&self.alloc, &self.ctx, key)
    }

    pub fn fetch_remove(&mut self, key: &Cfg::Key) -> Option<(Cfg::Key, Cfg::Value)> {
        self.tree.fetch_remove(&self.alloc, &self.ctx, key)
    }

    /// # Safety
    /// `node` must be a live node of this map.
    pub unsafe fn remove_node(&mut self, node: NodePtr<Cfg>) {
        self.tree.remove_node(&self.alloc, &self.ctx, node)
    }

    /// # Safety
    /// `node` must be a live node of this map.
    pub unsafe fn remove_node_get_next(&mut self, node: NodePtr<Cfg>) -> Option<NodePtr<Cfg>> {
        self.tree.remove_node_get_next(&self.alloc, &self.ctx, node)
    }

    /// # Safety
    /// `node` must be a live node of this map.
    pub unsafe fn remove_node_get_prev(&mut self, node: NodePtr<Cfg>) -> Option<NodePtr<Cfg>> {
        self.tree.remove_node_get_prev(&self.alloc, &self.ctx, node)
    }

    pub fn is_valid_red_black_tree(&self) -> bool {
        self.tree.is_valid_red_black_tree(&self.ctx)
    }

    /// Fallible structural clone; on allocation failure nothing leaks and
    /// `self` is untouched.
    pub fn try_clone(&self) -> Result<Self, AllocError>
    where
        Cfg::Key: Clone,
        Cfg::Value: Clone,
        Cfg::Payload: Clone,
        Cfg::Context: Clone,
        Cmp: Clone,
        Aug: Clone,
        A: Clone,
    {
        Ok(TreeMap {
            tree: self.tree.clone_in(&self.alloc)?,
            alloc: self.alloc.clone(),
            ctx: self.ctx.clone(),
        })
    }
}

impl<Cfg, Cmp, Aug, A> Clone for TreeMap<Cfg, Cmp, Aug, A>
where
    Cfg: TreeConfig,
    Cfg::Key: Clone,
    Cfg::Value: Clone,
    Cfg::Payload: Clone,
    Cfg::Context: Clone,
    Cmp: Comparator<Cfg::Key, Cfg::Context> + Clone,
    Aug: Augment<Cfg> + Clone,
    A: Allocator + Clone,
{
    fn clone(&self) -> Self {
        self.try_clone().expect("allocation failed while cloning tree")
    }
}

impl<Cfg, Cmp, Aug, A> Drop for TreeMap<Cfg, Cmp, Aug, A>
where
    Cfg: TreeConfig,
    A: Allocator,
{
    fn drop(&mut self) {
        self.tree.clear(&self.alloc);
    }
}

impl<'a, Cfg, Cmp, Aug, A> Index<&'a Cfg::Key> for TreeMap<Cfg, Cmp, Aug, A>
where
    Cfg: TreeConfig,
    Cmp: Comparator<Cfg::Key, Cfg::Context>,
    Aug: Augment<Cfg>,
    A: Allocator,
{
    type Output = Cfg::Value;

    fn index(&self, key: &Cfg::Key) -> &Self::Output {
        self.get(key).unwrap()
    }
}

impl<Cfg, Cmp, Aug, A> fmt::Debug for TreeMap<Cfg, Cmp, Aug, A>
where
    Cfg: TreeConfig,
    Cfg::Key: fmt::Debug,
    Cfg::Value: fmt::Debug,
    A: Allocator,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.tree.iter()).finish()
    }
}

impl<'a, Cfg, Cmp, Aug, A> IntoIterator for &'a TreeMap<Cfg, Cmp, Aug, A>
where
    Cfg: TreeConfig,
    A: Allocator,
{
    type Item = (&'a Cfg::Key, &'a Cfg::Value);
    type IntoIter = Iter<'a, Cfg>;

    fn into_iter(self) -> Self::IntoIter {
        self.tree.iter()
    }
}

#[cfg(test)]
use crate::node::Plain;
#[cfg(test)]
use std::cell::Cell;
#[cfg(test)]
use std::rc::Rc;

#[cfg(test)]
type IntMap = TreeMap<Plain<i64, u64>>;

#[test]
/// A clone is structurally independent: removing from the original leaves
/// the clone's contents (and vice versa) untouched.
fn test_clone_independence() {
    let mut map = IntMap::new();
    for key in [5, 3, 8, 1, 4, 7, 9] {
        map.put(key, key as u64).unwrap();
    }
    let clone = map.clone();

    assert!(map.remove(&3));

    let clone_keys: Vec<i64> = clone.iter().map(|(k, _)| *k).collect();
    assert_eq!(clone_keys, vec![1, 3, 4, 5, 7, 8, 9]);
    let original_keys: Vec<i64> = map.iter().map(|(k, _)| *k).collect();
    assert_eq!(original_keys, vec![1, 4, 5, 7, 8, 9]);

    assert!(map.is_valid_red_black_tree());
    assert!(clone.is_valid_red_black_tree());
}

#[test]
fn test_index_and_debug() {
    let mut map = IntMap::new();
    map.put(1, 10).unwrap();
    map.put(2, 20).unwrap();
    assert_eq!(map[&1], 10);
    assert_eq!(map[&2], 20);
    assert_eq!(format!("{:?}", map), "{1: 10, 2: 20}");
}

#[cfg(test)]
#[derive(Clone)]
struct CountsDrops(Rc<Cell<usize>>);

#[cfg(test)]
impl Drop for CountsDrops {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

#[test]
/// Every stored value is dropped exactly once, whether it leaves through
/// `fetch_remove`, a clobbering insert, or the map's own drop.
fn test_values_drop_exactly_once() {
    let drops = Rc::new(Cell::new(0usize));
    {
        let mut map: TreeMap<Plain<u32, CountsDrops>> = TreeMap::new();
        for key in 0..10 {
            map.put(key, CountsDrops(drops.clone())).unwrap();
        }
        // Displaces one value; the displaced copy drops here.
        map.put(3, CountsDrops(drops.clone())).unwrap();
        assert_eq!(drops.get(), 1);

        let fetched = map.fetch_remove(&7).unwrap();
        drop(fetched);
        assert_eq!(drops.get(), 2);
    }
    // 9 remaining values dropped with the map.
    assert_eq!(drops.get(), 11);
}

#[test]
fn test_take_leaves_empty_reusable_map() {
    let mut map = IntMap::new();
    for key in [2, 4, 6] {
        map.put(key, 0).unwrap();
    }
    let taken = map.take();
    assert!(map.is_empty());
    assert_eq!(taken.count(), 3);

    map.put(1, 1).unwrap();
    assert_eq!(map.count(), 1);
    assert!(taken.contains(&4));
}
