use arbor::*;
use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BTreeMap;

fn in_order<Cfg, Cmp, Aug, A>(map: &TreeMap<Cfg, Cmp, Aug, A>) -> Vec<Cfg::Key>
where
    Cfg: TreeConfig,
    Cfg::Key: Clone,
    A: Allocator,
{
    map.into_iter().map(|(k, _)| k.clone()).collect()
}

fn height<Cfg: TreeConfig>(root: NodePtr<Cfg>) -> usize {
    let mut max = 0;
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        if node.is_null() {
            continue;
        }
        let depth = depth + 1;
        max = max.max(depth);
        stack.push((node.left(), depth));
        stack.push((node.right(), depth));
    }
    max
}

#[test]
fn test_randomized_against_std_btreemap() {
    let mut rng = thread_rng();
    let mut map: TreeMap<Plain<u64, u64>> = TreeMap::new();
    let mut oracle = Box::new(BTreeMap::new());
    let mut keys = vec![];

    for _ in 0..512 {
        let k = rng.gen::<u64>() % 4096;
        let v = rng.gen::<u64>();
        map.put(k, v).unwrap();
        if oracle.insert(k, v).is_none() {
            keys.push(k);
        }
        assert_eq!(map.count(), oracle.len());
        assert!(map.is_valid_red_black_tree());
    }

    for _ in 0..60 {
        let sample = rng.gen::<f64>();
        if sample < 0.4 {
            let k = rng.gen::<u64>() % 4096;
            let v = rng.gen::<u64>();
            map.put(k, v).unwrap();
            if oracle.insert(k, v).is_none() {
                keys.push(k);
            }
        } else if sample < 0.8 {
            if keys.is_empty() {
                continue;
            }
            let j = rng.gen_range(0, keys.len());
            let key = keys.swap_remove(j);
            assert!(map.remove(&key));
            oracle.remove(&key);
        } else {
            if keys.is_empty() {
                continue;
            }
            let j = rng.gen_range(0, keys.len());
            let key = keys[j];
            let v = rng.gen::<u64>();
            *map.get_mut(&key).unwrap() = v;
            oracle.insert(key, v);
        }
        assert_eq!(map.count(), oracle.len());
        assert!(map.is_valid_red_black_tree());
    }

    for ((k1, v1), (k2, v2)) in oracle.iter().zip(map.iter()) {
        assert!(*k1 == *k2);
        assert!(*v1 == *v2);
    }
    for ((k1, v1), (k2, v2)) in oracle.iter().rev().zip(map.iter().rev()) {
        assert!(*k1 == *k2);
        assert!(*v1 == *v2);
    }

    let expected: Vec<u64> = keys.iter().copied().sorted().dedup().collect();
    assert_eq!(in_order(&map), expected);
}

#[test]
/// Inserting a permutation of a key set and removing another permutation of
/// it leaves an empty tree, with every intermediate state balanced.
fn test_permutation_round_trip() {
    let mut rng = thread_rng();
    for _ in 0..4 {
        let mut keys: Vec<u32> = (0..200).collect();
        keys.shuffle(&mut rng);

        let mut map: TreeMap<Plain<u32, u32>> = TreeMap::new();
        for &k in keys.iter() {
            map.put_no_clobber(k, k).unwrap();
            assert!(map.is_valid_red_black_tree());
        }
        assert_eq!(in_order(&map), (0..200).collect::<Vec<u32>>());

        keys.shuffle(&mut rng);
        for (i, &k) in keys.iter().enumerate() {
            assert!(map.remove(&k));
            assert_eq!(map.count(), 200 - i - 1);
            assert!(map.is_valid_red_black_tree());
        }
        assert!(map.is_empty());
    }
}

#[test]
fn test_height_stays_logarithmic() {
    let mut map: TreeMap<Plain<u32, ()>> = TreeMap::new();
    for k in 0..1000u32 {
        map.put(k, ()).unwrap();
        let n = map.count();
        let bound = 2 * (((n + 1) as f64).log2().floor() as usize);
        assert!(
            height(map.tree().root()) <= bound,
            "height {} exceeds bound {} at n = {}",
            height(map.tree().root()),
            bound,
            n
        );
    }
}

// Subtree-size tracking: the per-node counters replace the stored length.

struct CountedU64;

impl TreeConfig for CountedU64 {
    type Key = u64;
    type Value = u64;
    type Context = ();
    type Payload = ();
    type Parent = PackedParent;
    type Size = SubtreeSize;
}

#[test]
fn test_subtree_sizes_drive_count() {
    let mut rng = thread_rng();
    let mut keys: Vec<u64> = (0..300).collect();
    keys.shuffle(&mut rng);

    let mut map: TreeMap<CountedU64> = TreeMap::new();
    for (i, &k) in keys.iter().enumerate() {
        map.put(k, k).unwrap();
        assert_eq!(map.count(), i + 1);
        assert_eq!(map.tree().root().subtree_size(), (i + 1) as u64);
        // The validator re-derives every node's subtree size.
        assert!(map.is_valid_red_black_tree());
    }

    keys.shuffle(&mut rng);
    for (i, &k) in keys.iter().take(150).enumerate() {
        assert!(map.remove(&k));
        assert_eq!(map.count(), 300 - i - 1);
        assert!(map.is_valid_red_black_tree());
    }
}

// The split parent layout must behave identically to the packed one.

struct SplitU32;

impl TreeConfig for SplitU32 {
    type Key = u32;
    type Value = u32;
    type Context = ();
    type Payload = ();
    type Parent = SplitParent;
    type Size = ();
}

#[test]
fn test_split_parent_layout_round_trip() {
    let mut rng = thread_rng();
    let mut keys: Vec<u32> = (0..150).collect();
    keys.shuffle(&mut rng);

    let mut map: TreeMap<SplitU32> = TreeMap::new();
    for &k in keys.iter() {
        map.put(k, !k).unwrap();
        assert!(map.is_valid_red_black_tree());
    }
    keys.shuffle(&mut rng);
    for &k in keys.iter() {
        assert_eq!(map.fetch_remove(&k), Some((k, !k)));
        assert!(map.is_valid_red_black_tree());
    }
    assert!(map.is_empty());
}

// Subtree-max augmentation: each node's payload is the maximum key in its
// subtree, maintained entirely from the callback bundle.

struct MaxCfg;

impl TreeConfig for MaxCfg {
    type Key = i64;
    type Value = ();
    type Context = ();
    type Payload = Cell<i64>;
    type Parent = PackedParent;
    type Size = ();
}

#[derive(Default, Clone)]
struct SubtreeMax;

fn refresh_max_chain(mut node: NodePtr<MaxCfg>) {
    while !node.is_null() {
        let mut max = *node.key();
        let left = node.left();
        if !left.is_null() {
            max = max.max(left.payload().get());
        }
        let right = node.right();
        if !right.is_null() {
            max = max.max(right.payload().get());
        }
        node.payload().set(max);
        node = node.parent();
    }
}

impl Augment<MaxCfg> for SubtreeMax {
    fn after_link(&self, _ctx: &(), node: NodePtr<MaxCfg>) {
        refresh_max_chain(node);
    }

    fn after_rotate(&self, _ctx: &(), old: NodePtr<MaxCfg>, _new: NodePtr<MaxCfg>, _dir: Direction) {
        // The demoted node sits below the promoted one, so one upward pass
        // refreshes both plus the ancestors.
        refresh_max_chain(old);
    }

    fn after_swap(&self, _ctx: &(), deep: NodePtr<MaxCfg>, _shallow: NodePtr<MaxCfg>) {
        refresh_max_chain(deep);
    }

    fn before_unlink(&self, _ctx: &(), node: NodePtr<MaxCfg>) {
        // Neutralize the leaf so the ancestor maxima stop counting it.
        node.payload().set(i64::MIN);
        refresh_max_chain(node.parent());
    }
}

/// Recomputes the subtree max from scratch and compares it against the
/// payload maintained by the callbacks.
fn check_subtree_max(node: NodePtr<MaxCfg>) -> i64 {
    let mut max = *node.key();
    for child in [node.left(), node.right()] {
        if !child.is_null() {
            max = max.max(check_subtree_max(child));
        }
    }
    assert_eq!(node.payload().get(), max, "stale subtree max at {}", node.key());
    max
}

#[test]
fn test_subtree_max_augmentation() {
    let mut rng = thread_rng();
    let mut keys: Vec<i64> = (-100..=100).collect();
    keys.shuffle(&mut rng);

    let mut map: TreeMap<MaxCfg, DefaultOrder, SubtreeMax> = TreeMap::new();
    for &k in keys.iter() {
        map.put(k, ()).unwrap();
        assert!(map.is_valid_red_black_tree());
        check_subtree_max(map.tree().root());
    }

    keys.shuffle(&mut rng);
    for &k in keys.iter().filter(|&&k| k != 46) {
        assert!(map.remove(&k));
        assert!(map.is_valid_red_black_tree());
        let root = map.tree().root();
        if !root.is_null() {
            check_subtree_max(root);
        }
    }
    assert_eq!(map.count(), 1);
    assert!(map.contains(&46));
    assert_eq!(map.tree().root().payload().get(), 46);
}

// Callback protocol: events arrive in mutation order, each one after the
// structural change it describes.

struct EvtCfg;

impl TreeConfig for EvtCfg {
    type Key = u32;
    type Value = ();
    type Context = ();
    type Payload = ();
    type Parent = PackedParent;
    type Size = ();
}

#[derive(Default)]
struct Recorder(std::cell::RefCell<Vec<String>>);

impl Augment<EvtCfg> for Recorder {
    fn after_rotate(&self, _ctx: &(), old: NodePtr<EvtCfg>, new: NodePtr<EvtCfg>, dir: Direction) {
        self.0
            .borrow_mut()
            .push(format!("rotate {}->{} {:?}", old.key(), new.key(), dir));
    }

    fn after_swap(&self, _ctx: &(), deep: NodePtr<EvtCfg>, shallow: NodePtr<EvtCfg>) {
        self.0
            .borrow_mut()
            .push(format!("swap {}/{}", deep.key(), shallow.key()));
    }

    fn after_link(&self, _ctx: &(), node: NodePtr<EvtCfg>) {
        self.0.borrow_mut().push(format!("link {}", node.key()));
    }

    fn after_recolor(&self, _ctx: &(), recolored: &[NodePtr<EvtCfg>]) {
        let keys: Vec<String> = recolored.iter().map(|n| n.key().to_string()).collect();
        self.0
            .borrow_mut()
            .push(format!("recolor {}", keys.join(",")));
    }

    fn before_unlink(&self, _ctx: &(), node: NodePtr<EvtCfg>) {
        self.0
            .borrow_mut()
            .push(format!("before_unlink {}", node.key()));
    }

    fn after_unlink(&self, _ctx: &(), node: NodePtr<EvtCfg>) {
        self.0
            .borrow_mut()
            .push(format!("after_unlink {}", node.key()));
    }
}

#[test]
fn test_callback_sequence() {
    let mut map: TreeMap<EvtCfg, DefaultOrder, Recorder> = TreeMap::new();
    let events = |map: &TreeMap<EvtCfg, DefaultOrder, Recorder>| -> Vec<String> {
        map.tree().augment().0.borrow_mut().drain(..).collect()
    };

    map.put(1, ()).unwrap();
    assert_eq!(events(&map), vec!["link 1"]);

    // Red child under a black root needs no repair.
    map.put(2, ()).unwrap();
    assert_eq!(events(&map), vec!["link 2"]);

    // Outer red-red pair: one rotation at the root, then the recolor.
    map.put(3, ()).unwrap();
    assert_eq!(
        events(&map),
        vec!["link 3", "rotate 1->2 Left", "recolor 2,1"]
    );

    // A red leaf detaches with no repair at all.
    assert!(map.remove(&1));
    assert_eq!(events(&map), vec!["before_unlink 1", "after_unlink 1"]);

    // Removing the root swaps it with its successor first; the swap hands
    // the node its successor's red color, so again no repair.
    assert!(map.remove(&2));
    assert_eq!(
        events(&map),
        vec!["swap 2/3", "before_unlink 2", "after_unlink 2"]
    );

    assert!(map.remove(&3));
    assert_eq!(events(&map), vec!["before_unlink 3", "after_unlink 3"]);
    assert!(map.is_empty());
}

// Ordering supplied by the context rather than the key type.

struct LabelCfg;

impl TreeConfig for LabelCfg {
    type Key = usize;
    type Value = ();
    type Context = Vec<&'static str>;
    type Payload = ();
    type Parent = PackedParent;
    type Size = ();
}

struct ByLabel;

impl Comparator<usize, Vec<&'static str>> for ByLabel {
    fn compare(&self, ctx: &Vec<&'static str>, a: &usize, b: &usize) -> Ordering {
        ctx[*a].cmp(&ctx[*b])
    }
}

#[test]
fn test_context_threaded_ordering() {
    let labels = vec!["pear", "apple", "quince", "banana"];
    let mut map: TreeMap<LabelCfg, ByLabel> =
        TreeMap::with_parts(ByLabel, NoAugment, labels, Global);
    for i in 0..4 {
        map.put(i, ()).unwrap();
    }
    assert!(map.is_valid_red_black_tree());
    // apple, banana, pear, quince
    assert_eq!(in_order(&map), vec![1, 3, 0, 2]);
}

#[test]
fn test_context_free_comparator() {
    let mut map: TreeMap<Plain<u32, ()>, _> =
        TreeMap::with_parts(context_free(|a: &u32, b: &u32| b.cmp(a)), NoAugment, (), Global);
    for k in [3, 1, 4, 1, 5, 9, 2, 6] {
        map.add(k, ()).unwrap();
    }
    assert!(map.is_valid_red_black_tree());
    assert_eq!(in_order(&map), vec![9, 6, 5, 4, 3, 2, 1]);
}

// Allocation failure injection.

#[derive(Default)]
struct TrackingAlloc {
    live: Cell<isize>,
    total: Cell<usize>,
    fail_after: Cell<Option<usize>>,
}

impl Allocator for TrackingAlloc {
    fn allocate(&self, layout: std::alloc::Layout) -> Result<std::ptr::NonNull<u8>, AllocError> {
        if let Some(limit) = self.fail_after.get() {
            if self.total.get() >= limit {
                return Err(AllocError);
            }
        }
        self.total.set(self.total.get() + 1);
        self.live.set(self.live.get() + 1);
        Global.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: std::ptr::NonNull<u8>, layout: std::alloc::Layout) {
        self.live.set(self.live.get() - 1);
        Global.deallocate(ptr, layout);
    }
}

#[test]
fn test_insert_failure_leaves_tree_unchanged() {
    let alloc = TrackingAlloc::default();
    let mut tree: RedBlackTree<Plain<u32, u32>> = RedBlackTree::new();
    for k in 0..20 {
        tree.put(&alloc, &(), k, k).unwrap();
    }
    alloc.fail_after.set(Some(alloc.total.get()));

    assert_eq!(tree.put(&alloc, &(), 99, 0), Err(AllocError));
    assert_eq!(tree.count(), 20);
    assert!(tree.is_valid_red_black_tree(&()));
    assert!(!tree.contains(&(), &99));

    // Clobbering an existing entry allocates nothing and still succeeds.
    assert_eq!(tree.put(&alloc, &(), 5, 55), Ok(Some(5)));

    tree.clear(&alloc);
    assert_eq!(alloc.live.get(), 0);
}

#[test]
fn test_clone_failure_releases_partial_copy() {
    let alloc = TrackingAlloc::default();
    let mut tree: RedBlackTree<Plain<u32, u32>> = RedBlackTree::new();
    for k in 0..50 {
        tree.put(&alloc, &(), k, k * 3).unwrap();
    }
    let live_before = alloc.live.get();

    alloc.fail_after.set(Some(alloc.total.get() + 20));
    assert!(tree.clone_in(&alloc).is_err());
    assert_eq!(alloc.live.get(), live_before);
    assert!(tree.is_valid_red_black_tree(&()));

    alloc.fail_after.set(None);
    let mut clone = tree.clone_in(&alloc).unwrap();
    assert_eq!(clone.count(), tree.count());
    assert!(structural_eq(tree.root(), clone.root()));

    clone.clear(&alloc);
    tree.clear(&alloc);
    assert_eq!(alloc.live.get(), 0);
}

/// Shape, keys and colors all equal.
fn structural_eq(a: NodePtr<Plain<u32, u32>>, b: NodePtr<Plain<u32, u32>>) -> bool {
    let mut stack = vec![(a, b)];
    while let Some((x, y)) = stack.pop() {
        match (x.is_null(), y.is_null()) {
            (true, true) => continue,
            (false, false) => {}
            _ => return false,
        }
        if x.key() != y.key() || x.value() != y.value() || x.color() != y.color() {
            return false;
        }
        stack.push((x.left(), y.left()));
        stack.push((x.right(), y.right()));
    }
    true
}

#[test]
fn test_bump_arena_backing() {
    let bump = bumpalo::Bump::new();
    let mut tree: RedBlackTree<Plain<u32, u32>> = RedBlackTree::new();
    for k in [5, 1, 9, 3, 7, 2, 8] {
        tree.put(&bump, &(), k, k * 2).unwrap();
    }
    assert!(tree.is_valid_red_black_tree(&()));
    assert!(tree.remove(&bump, &(), &3));
    assert!(tree.remove(&bump, &(), &9));
    assert!(tree.is_valid_red_black_tree(&()));
    assert_eq!(tree.count(), 5);
    tree.clear(&bump);
}
