use crate::node::{Direction, NodePtr, TreeConfig};

/// Structural-change callbacks for maintaining per-subtree aggregates
/// (subtree maxima, interval endpoints, order statistics, ...).
///
/// Every hook fires *after* the structural mutation it describes has
/// completed and all parent/child/color fields are consistent (except
/// [`Augment::before_unlink`], which fires on a still-linked leaf). Hooks
/// may read the tree and write node payloads; they must not mutate the
/// tree's structure. Each method defaults to a no-op, so a bundle only
/// implements the events it cares about.
///
/// The bundle is stored inside the container and dispatched statically; a
/// stateless bundle costs nothing.
pub trait Augment<Cfg: TreeConfig> {
    /// A rotation completed: `old` was the subtree root, `new` (its former
    /// child) has taken its place, rotating toward `dir`. Subtree sizes, when
    /// tracked, are already updated.
    fn after_rotate(&self, ctx: &Cfg::Context, old: NodePtr<Cfg>, new: NodePtr<Cfg>, dir: Direction) {
        let _ = (ctx, old, new, dir);
    }

    /// Two nodes exchanged tree positions during deletion. `deep` is the node
    /// being removed (now further from the root, possibly out of key order);
    /// `shallow` took its former place. Keys, values and payloads did not
    /// move.
    fn after_swap(&self, ctx: &Cfg::Context, deep: NodePtr<Cfg>, shallow: NodePtr<Cfg>) {
        let _ = (ctx, deep, shallow);
    }

    /// A new node was linked, as the root or as a leaf. Rebalancing may still
    /// follow.
    fn after_link(&self, ctx: &Cfg::Context, node: NodePtr<Cfg>) {
        let _ = (ctx, node);
    }

    /// One or more colors were overwritten during rebalancing (the initial
    /// red of a fresh link does not count).
    fn after_recolor(&self, ctx: &Cfg::Context, recolored: &[NodePtr<Cfg>]) {
        let _ = (ctx, recolored);
    }

    /// The node is about to be detached; it is still linked and is a leaf.
    fn before_unlink(&self, ctx: &Cfg::Context, node: NodePtr<Cfg>) {
        let _ = (ctx, node);
    }

    /// The node is no longer reachable from the tree. Fires exactly once per
    /// removal, after any repair rotations, and before the node's memory is
    /// released.
    fn after_unlink(&self, ctx: &Cfg::Context, node: NodePtr<Cfg>) {
        let _ = (ctx, node);
    }
}

/// The empty bundle.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoAugment;

impl<Cfg: TreeConfig> Augment<Cfg> for NoAugment {}
