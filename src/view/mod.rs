//! Live views: subscription state, reconciliation, and the viewport.
//!
//! A [`ViewCore`] owns the compiled query, the root [`ResultSet`] mirror,
//! and the [`ReactiveTree`] ordering engine. The engine's tracker hands it
//! every store event; the core reconciles exactly the affected tree regions
//! and reports visibility changes through the registered enter/leave
//! callbacks. Offsets reported to callbacks index the full visible sequence;
//! the viewport `{offset, limit}` is a pure projection over it.

mod resultset;
mod tree;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::index::IndexKey;
use crate::model::{EdgeId, Name, NodeId, TypeId};
use crate::query::executor::{self, ReadCtx};
use crate::query::validate::CompiledFilter;
use crate::query::{CompiledQuery, SelId};
use crate::store::Event;

use resultset::ResultSet;
use tree::{ReactiveTree, Slot, TreeIdx};

/// Construction options for a view.
#[derive(Clone, Copy, Debug)]
pub struct ViewOptions {
    /// Viewport window length. Defaults to the whole sequence.
    pub limit: usize,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self { limit: usize::MAX }
    }
}

/// One visible entry yielded by a view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewItem {
    /// Backing node.
    pub id: NodeId,
    /// Backing node's type.
    pub type_id: TypeId,
    /// Indentation depth beneath the view root (virtual hops excluded).
    pub depth: usize,
}

/// Callback invoked with a visible item and its offset in the full
/// sequence.
pub type ViewCallback = Box<dyn FnMut(&ViewItem, usize) + Send>;

/// Enter/leave hooks registered by the UI layer.
pub struct ViewCallbacks {
    /// Fired when an item becomes visible.
    pub on_enter: ViewCallback,
    /// Fired, with the pre-removal offset, when an item stops being
    /// visible.
    pub on_leave: ViewCallback,
}

/// Subscription state behind a [`View`](crate::View).
pub struct ViewCore {
    query: CompiledQuery,
    tree: ReactiveTree,
    roots: ResultSet,
    offset: usize,
    limit: usize,
    activated: bool,
    callbacks: Option<ViewCallbacks>,
    /// Selections keyed by the type they materialise.
    sels_by_target: FxHashMap<TypeId, Vec<SelId>>,
    /// Selections keyed by `(parent type, edge)`.
    sels_by_edge: FxHashMap<(TypeId, EdgeId), Vec<SelId>>,
}

impl ViewCore {
    pub(crate) fn new(query: CompiledQuery, options: ViewOptions) -> Self {
        let mut sels_by_target: FxHashMap<TypeId, Vec<SelId>> = FxHashMap::default();
        let mut sels_by_edge: FxHashMap<(TypeId, EdgeId), Vec<SelId>> = FxHashMap::default();
        for (i, sel) in query.sels.iter().enumerate() {
            sels_by_target
                .entry(sel.target_type)
                .or_default()
                .push(i as SelId);
            sels_by_edge
                .entry((sel.parent_type, sel.edge))
                .or_default()
                .push(i as SelId);
        }
        Self {
            query,
            tree: ReactiveTree::new(),
            roots: ResultSet::new(),
            offset: 0,
            limit: options.limit,
            activated: false,
            callbacks: None,
            sels_by_target,
            sels_by_edge,
        }
    }

    /// Registers the UI hooks.
    pub(crate) fn set_callbacks(&mut self, callbacks: ViewCallbacks) {
        self.callbacks = Some(callbacks);
    }

    // -- viewport ----------------------------------------------------------

    /// Visible length of the full sequence.
    pub(crate) fn total(&self) -> usize {
        self.tree.total()
    }

    /// Current window start.
    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    /// Moves the window start, clamped to `[0, total - limit]`.
    pub(crate) fn scroll_to(&mut self, offset: usize) {
        let max = self.total().saturating_sub(self.limit);
        self.offset = offset.min(max);
    }

    /// Relative scroll.
    pub(crate) fn move_by(&mut self, delta: isize) {
        let target = (self.offset as isize).saturating_add(delta);
        self.scroll_to(target.max(0) as usize);
    }

    /// Items within the current window, in visible order.
    pub(crate) fn items(&self) -> Vec<ViewItem> {
        let mut out = Vec::new();
        let mut current = self.tree.node_at_index(self.offset);
        while let Some(idx) = current {
            if out.len() == self.limit {
                break;
            }
            out.push(self.view_item(idx));
            current = self.tree.advance(idx);
        }
        out
    }

    /// Whether the first instance of a node has the named edge expanded.
    pub(crate) fn is_expanded(&self, node: NodeId, edge_name: &str) -> bool {
        let Some(&idx) = self.tree.instances(node).first() else {
            return false;
        };
        self.slot_by_edge_name(idx, edge_name)
            .map(|slot| self.tree.node(idx).slots[slot as usize].expanded)
            .unwrap_or(false)
    }

    /// Visible indentation depth of a node's first instance.
    pub(crate) fn visible_depth_of(&self, node: NodeId) -> Option<usize> {
        let &idx = self.tree.instances(node).first()?;
        Some(self.tree.visible_depth(idx))
    }

    // -- activation and expansion ------------------------------------------

    /// Materialises the root selection. With `load_nested`, every selection
    /// is expanded over existing data transitively.
    pub(crate) fn activate(&mut self, ctx: ReadCtx<'_>, load_nested: bool) {
        if self.activated {
            return;
        }
        self.activated = true;

        let ids = executor::root_candidates(ctx, &self.query);
        for id in ids {
            let key = self.root_key(ctx, id);
            let position = self.roots.insert(id, key);
            let mut path = vec![id];
            let sub = self.create_subtree(ctx, id, None, &mut path);
            self.tree.attach(self.tree.root, 0, position, sub);
        }

        if load_nested {
            let children: Vec<TreeIdx> = self.root_children();
            for child in children {
                let mut path = vec![self.tree.node(child).node];
                self.expand_deep(ctx, child, &mut path);
            }
        }

        let block: Vec<(ViewItem, usize)> = self
            .tree
            .visible_of(self.tree.root)
            .iter()
            .enumerate()
            .map(|(i, &idx)| (self.view_item(idx), i))
            .collect();
        self.emit(true, block);
    }

    /// Expands the named edge on the first instance of `node`,
    /// materialising its current children.
    pub(crate) fn expand_by_id(&mut self, ctx: ReadCtx<'_>, node: NodeId, edge_name: &str) -> bool {
        let Some(&idx) = self.tree.instances(node).first() else {
            return false;
        };
        let Some(slot_no) = self.slot_by_edge_name(idx, edge_name) else {
            return false;
        };
        if self.tree.node(idx).slots[slot_no as usize].expanded {
            return true;
        }
        let mut path = self.path_of(idx);
        self.expand_slot(ctx, idx, slot_no, &mut path);
        let block = self.slot_block(idx, slot_no);
        self.emit(true, block);
        true
    }

    /// Collapses the named edge on the first instance of `node`.
    pub(crate) fn collapse_by_id(
        &mut self,
        ctx: ReadCtx<'_>,
        node: NodeId,
        edge_name: &str,
    ) -> bool {
        let Some(&idx) = self.tree.instances(node).first() else {
            return false;
        };
        let Some(slot_no) = self.slot_by_edge_name(idx, edge_name) else {
            return false;
        };
        if !self.tree.node(idx).slots[slot_no as usize].expanded {
            return true;
        }
        let block = self.slot_block(idx, slot_no);
        self.emit(false, block);

        let children: Vec<TreeIdx> =
            self.tree.node(idx).slots[slot_no as usize].children.clone();
        for child in children {
            self.tree.detach(child);
            self.tree.release(child);
        }
        let lazy = self.candidate_count(ctx, idx, slot_no);
        let slot = &mut self.tree.node_mut(idx).slots[slot_no as usize];
        slot.expanded = false;
        slot.lazy = lazy;
        true
    }

    // -- event reconciliation ----------------------------------------------

    /// Applies one store event to the mirrored state.
    pub(crate) fn apply_event(&mut self, ctx: ReadCtx<'_>, event: &Event) {
        if !self.activated {
            return;
        }
        match event {
            Event::NodeInserted { id, type_id } => {
                if *type_id == self.query.root_type {
                    self.reconcile_root(ctx, *id);
                }
            }
            Event::NodeUpdated {
                id,
                type_id,
                changed,
            } => self.on_node_updated(ctx, *id, *type_id, changed),
            Event::NodeDeleted { id, .. } => self.on_node_deleted(*id),
            Event::EdgeLinked {
                source,
                source_type,
                edge,
                target,
            }
            | Event::EdgeUnlinked {
                source,
                source_type,
                edge,
                target,
            } => {
                self.on_edge_changed(ctx, *source, *source_type, *edge, *target);
            }
        }
    }

    fn on_node_updated(
        &mut self,
        ctx: ReadCtx<'_>,
        id: NodeId,
        type_id: TypeId,
        changed: &SmallVec<[Name; 4]>,
    ) {
        if type_id == self.query.root_type {
            self.reconcile_root(ctx, id);
        }

        // Path filters at the root: walk the hops backwards to the roots
        // whose filter value may now differ.
        let mut dependents: Vec<NodeId> = Vec::new();
        for filter in &self.query.filters {
            if filter.hops.is_empty()
                || filter.terminal_type != type_id
                || !changed.contains(filter.field.name())
            {
                continue;
            }
            dependents.extend(reverse_reach(ctx, filter, id));
        }
        dependents.sort_unstable();
        dependents.dedup();
        for root in dependents {
            self.reconcile_root(ctx, root);
        }

        // Selections materialising this type: membership and ordering.
        let sels = self
            .sels_by_target
            .get(&type_id)
            .cloned()
            .unwrap_or_default();
        for sel_id in sels {
            if self.update_touches_sel(ctx, sel_id, changed) {
                self.reconcile_sel_child(ctx, sel_id, id);
            }
        }

        // Selection-level path filters: reconcile the children whose hop
        // chain reaches the updated node.
        let with_hops: Vec<(SelId, usize)> = self
            .query
            .sels
            .iter()
            .enumerate()
            .flat_map(|(si, sel)| {
                sel.filters
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| {
                        !f.hops.is_empty()
                            && f.terminal_type == type_id
                            && changed.contains(f.field.name())
                    })
                    .map(move |(fi, _)| (si as SelId, fi))
                    .collect::<Vec<_>>()
            })
            .collect();
        for (sel_id, filter_no) in with_hops {
            let filter = &self.query.sel(sel_id).filters[filter_no];
            let children = reverse_reach(ctx, filter, id);
            for child in children {
                self.reconcile_sel_child(ctx, sel_id, child);
            }
        }
    }

    fn on_node_deleted(&mut self, id: NodeId) {
        if self.roots.contains(id) {
            self.remove_root(id);
        }
        // Linked instances were dropped by the unlink cascade; clear any
        // stragglers that remain.
        while let Some(&idx) = self.tree.instances(id).first() {
            let block = self.block_of(idx);
            self.emit(false, block);
            self.tree.detach(idx);
            self.tree.release(idx);
        }
    }

    fn on_edge_changed(
        &mut self,
        ctx: ReadCtx<'_>,
        source: NodeId,
        source_type: TypeId,
        edge: EdgeId,
        target: NodeId,
    ) {
        self.reconcile_orientation(ctx, source, source_type, edge, target);
        let edge_def = ctx.schema.type_of(source_type).edge_def(edge);
        self.reconcile_orientation(
            ctx,
            target,
            edge_def.target_type,
            edge_def.reverse_edge,
            source,
        );

        // Edge churn can shift rollup-keyed or edge-keyed root ordering.
        if source_type == self.query.root_type {
            self.reconcile_root(ctx, source);
        }
        if edge_def.target_type == self.query.root_type {
            self.reconcile_root(ctx, target);
        }
    }

    fn reconcile_orientation(
        &mut self,
        ctx: ReadCtx<'_>,
        parent: NodeId,
        parent_type: TypeId,
        edge: EdgeId,
        child: NodeId,
    ) {
        let sels = self
            .sels_by_edge
            .get(&(parent_type, edge))
            .cloned()
            .unwrap_or_default();
        for sel_id in sels {
            self.reconcile_in_parent(ctx, parent, sel_id, child);
        }
    }

    /// Re-evaluates `child`'s membership beneath every instantiated parent
    /// for one selection.
    fn reconcile_sel_child(&mut self, ctx: ReadCtx<'_>, sel_id: SelId, child: NodeId) {
        let reverse = self.query.sel(sel_id).reverse_edge;
        let parents: Vec<NodeId> = ctx
            .store
            .get(child)
            .map(|n| n.targets(reverse).to_vec())
            .unwrap_or_default();
        for parent in parents {
            self.reconcile_in_parent(ctx, parent, sel_id, child);
        }
    }

    fn reconcile_in_parent(
        &mut self,
        ctx: ReadCtx<'_>,
        parent: NodeId,
        sel_id: SelId,
        child: NodeId,
    ) {
        let instances: Vec<TreeIdx> = self.tree.instances(parent).to_vec();
        for idx in instances {
            let Some(slot_no) = self.slot_by_sel(idx, sel_id) else {
                continue;
            };
            if self.tree.node(idx).slots[slot_no as usize].expanded {
                self.reconcile_child(ctx, idx, slot_no, sel_id, child);
            } else {
                let lazy = self.candidate_count(ctx, idx, slot_no);
                self.tree.node_mut(idx).slots[slot_no as usize].lazy = lazy;
            }
        }
    }

    /// Insert/remove/move one child beneath one expanded slot.
    fn reconcile_child(
        &mut self,
        ctx: ReadCtx<'_>,
        parent_idx: TreeIdx,
        slot_no: u16,
        sel_id: SelId,
        child: NodeId,
    ) {
        let parent_node_id = self.tree.node(parent_idx).node;
        let on_path = self.path_of(parent_idx).contains(&child);
        let matches = !on_path
            && ctx.store.get(parent_node_id).is_some_and(|parent| {
                ctx.store.get(child).is_some_and(|node| {
                    executor::child_matches(ctx, parent, self.query.sel(sel_id), node)
                })
            });
        let current = self.tree.node(parent_idx).slots[slot_no as usize]
            .children
            .iter()
            .copied()
            .find(|&c| self.tree.node(c).node == child);

        match (current, matches) {
            (None, false) => {}
            (None, true) => {
                let position = self.desired_position(ctx, parent_idx, slot_no, sel_id, child);
                let mut path = self.path_of(parent_idx);
                path.push(child);
                let sub = self.create_subtree(ctx, child, Some(sel_id), &mut path);
                self.tree.attach(parent_idx, slot_no, position, sub);
                let block = self.block_of(sub);
                self.emit(true, block);
            }
            (Some(existing), false) => {
                let block = self.block_of(existing);
                self.emit(false, block);
                self.tree.detach(existing);
                self.tree.release(existing);
            }
            (Some(existing), true) => {
                let children = &self.tree.node(parent_idx).slots[slot_no as usize].children;
                let current_pos = children
                    .iter()
                    .position(|&c| c == existing)
                    .expect("present child");
                let desired = self.desired_position_excluding(
                    ctx, parent_idx, slot_no, sel_id, child, existing,
                );
                if desired == current_pos {
                    return;
                }
                let block = self.block_of(existing);
                self.emit(false, block);
                self.tree.detach(existing);
                self.tree.attach(parent_idx, slot_no, desired, existing);
                let block = self.block_of(existing);
                self.emit(true, block);
            }
        }
    }

    /// Root membership/ordering reconciliation for one node.
    fn reconcile_root(&mut self, ctx: ReadCtx<'_>, id: NodeId) {
        let matches = ctx
            .store
            .get(id)
            .is_some_and(|node| executor::root_matches(ctx, &self.query, node));
        match (self.roots.contains(id), matches) {
            (false, false) => {}
            (false, true) => {
                let key = self.root_key(ctx, id);
                let position = self.roots.insert(id, key);
                let mut path = vec![id];
                let sub = self.create_subtree(ctx, id, None, &mut path);
                self.tree.attach(self.tree.root, 0, position, sub);
                let block = self.block_of(sub);
                self.emit(true, block);
            }
            (true, false) => self.remove_root(id),
            (true, true) => {
                let key = self.root_key(ctx, id);
                if self.roots.key_of(id) == Some(&key) {
                    return;
                }
                let Some(idx) = self.root_instance(id) else {
                    return;
                };
                let block = self.block_of(idx);
                self.emit(false, block);
                self.tree.detach(idx);
                self.roots.remove(id);
                let position = self.roots.insert(id, key);
                self.tree.attach(self.tree.root, 0, position, idx);
                let block = self.block_of(idx);
                self.emit(true, block);
            }
        }
    }

    fn remove_root(&mut self, id: NodeId) {
        let Some(idx) = self.root_instance(id) else {
            self.roots.remove(id);
            return;
        };
        let block = self.block_of(idx);
        self.emit(false, block);
        self.tree.detach(idx);
        self.tree.release(idx);
        self.roots.remove(id);
    }

    // -- construction helpers ----------------------------------------------

    /// Builds a detached subtree for `node`: collapsed slots per child
    /// selection, with virtual hops transitively expanded so their items
    /// surface beneath the nearest visible ancestor. `path` carries the
    /// node ids from the attachment point to the root for cycle safety.
    fn create_subtree(
        &mut self,
        ctx: ReadCtx<'_>,
        node: NodeId,
        sel: Option<SelId>,
        path: &mut Vec<NodeId>,
    ) -> TreeIdx {
        let (child_sels, virtual_) = match sel {
            None => (self.query.top.clone(), self.query.virtual_root),
            Some(s) => {
                let compiled = self.query.sel(s);
                (compiled.children.clone(), compiled.virtual_)
            }
        };
        let type_id = ctx.store.get(node).map(|n| n.type_id).unwrap_or_default();
        let slots = child_sels
            .iter()
            .map(|&cs| {
                let lazy = ctx
                    .store
                    .get(node)
                    .map(|n| executor::child_candidates(ctx, n, self.query.sel(cs)).len())
                    .unwrap_or(0);
                Slot::collapsed(Some(cs), lazy)
            })
            .collect();
        let idx = self.tree.alloc(node, type_id, virtual_, slots);
        if virtual_ {
            for slot_no in 0..child_sels.len() {
                self.expand_slot(ctx, idx, slot_no as u16, path);
            }
        }
        idx
    }

    /// Instantiates a collapsed slot's children. Fires no callbacks; the
    /// caller reports the visibility delta.
    fn expand_slot(&mut self, ctx: ReadCtx<'_>, idx: TreeIdx, slot_no: u16, path: &mut Vec<NodeId>) {
        if self.tree.node(idx).slots[slot_no as usize].expanded {
            return;
        }
        let sel_id = self.tree.node(idx).slots[slot_no as usize]
            .sel
            .expect("item slots carry a selection");
        let parent_node_id = self.tree.node(idx).node;
        let candidates: Vec<NodeId> = ctx
            .store
            .get(parent_node_id)
            .map(|n| executor::child_candidates(ctx, n, self.query.sel(sel_id)))
            .unwrap_or_default();

        {
            let slot = &mut self.tree.node_mut(idx).slots[slot_no as usize];
            slot.expanded = true;
            slot.lazy = 0;
        }
        let mut position = 0;
        for child in candidates {
            if path.contains(&child) {
                continue;
            }
            path.push(child);
            let sub = self.create_subtree(ctx, child, Some(sel_id), path);
            path.pop();
            self.tree.attach(idx, slot_no, position, sub);
            position += 1;
        }
    }

    /// Expands every slot beneath `idx` over existing data.
    fn expand_deep(&mut self, ctx: ReadCtx<'_>, idx: TreeIdx, path: &mut Vec<NodeId>) {
        let slot_count = self.tree.node(idx).slots.len();
        for slot_no in 0..slot_count {
            self.expand_slot(ctx, idx, slot_no as u16, path);
        }
        let children: Vec<TreeIdx> = self
            .tree
            .node(idx)
            .slots
            .iter()
            .flat_map(|s| s.children.iter().copied())
            .collect();
        for child in children {
            let node = self.tree.node(child).node;
            if path.contains(&node) {
                continue;
            }
            path.push(node);
            self.expand_deep(ctx, child, path);
            path.pop();
        }
    }

    // -- positioning and lookup helpers ------------------------------------

    /// Ordering key for a root member under the covering index.
    fn root_key(&self, ctx: ReadCtx<'_>, id: NodeId) -> Option<IndexKey> {
        let coverage = self.query.coverage.as_ref()?;
        ctx.indexes
            .index(self.query.root_type, coverage.index_pos)
            .key_of(id)
            .cloned()
    }

    /// Target position for `child` among a slot's current children, by
    /// candidate order.
    fn desired_position(
        &self,
        ctx: ReadCtx<'_>,
        parent_idx: TreeIdx,
        slot_no: u16,
        sel_id: SelId,
        child: NodeId,
    ) -> usize {
        self.desired_position_excluding(ctx, parent_idx, slot_no, sel_id, child, u32::MAX)
    }

    fn desired_position_excluding(
        &self,
        ctx: ReadCtx<'_>,
        parent_idx: TreeIdx,
        slot_no: u16,
        sel_id: SelId,
        child: NodeId,
        excluded: TreeIdx,
    ) -> usize {
        let parent_node_id = self.tree.node(parent_idx).node;
        let Some(parent_node) = ctx.store.get(parent_node_id) else {
            return 0;
        };
        let candidates = executor::child_candidates(ctx, parent_node, self.query.sel(sel_id));
        let order: FxHashMap<NodeId, usize> = candidates
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();
        let Some(&child_rank) = order.get(&child) else {
            return self.tree.node(parent_idx).slots[slot_no as usize]
                .children
                .len();
        };
        self.tree.node(parent_idx).slots[slot_no as usize]
            .children
            .iter()
            .filter(|&&c| c != excluded)
            .filter(|&&c| {
                order
                    .get(&self.tree.node(c).node)
                    .is_some_and(|&rank| rank < child_rank)
            })
            .count()
    }

    /// Matching-target count for a collapsed slot.
    fn candidate_count(&self, ctx: ReadCtx<'_>, idx: TreeIdx, slot_no: u16) -> usize {
        let Some(sel_id) = self.tree.node(idx).slots[slot_no as usize].sel else {
            return 0;
        };
        ctx.store
            .get(self.tree.node(idx).node)
            .map(|n| executor::child_candidates(ctx, n, self.query.sel(sel_id)).len())
            .unwrap_or(0)
    }

    /// Whether this update can affect the node's membership or position
    /// under one selection.
    fn update_touches_sel(
        &self,
        ctx: ReadCtx<'_>,
        sel_id: SelId,
        changed: &SmallVec<[Name; 4]>,
    ) -> bool {
        let sel = self.query.sel(sel_id);
        if sel.sorts.iter().any(|s| changed.contains(&s.field)) {
            return true;
        }
        if sel
            .filters
            .iter()
            .any(|f| f.hops.is_empty() && changed.contains(f.field.name()))
        {
            return true;
        }
        // Trailing index fields beyond the sort prefix still break ties.
        if let Some(coverage) = &sel.coverage {
            let index = ctx.indexes.index(sel.target_type, coverage.index_pos);
            if index
                .fields()
                .iter()
                .any(|field| changed.contains(&field.name))
            {
                return true;
            }
        }
        false
    }

    /// Node ids from `idx` (inclusive) up to the container.
    fn path_of(&self, idx: TreeIdx) -> Vec<NodeId> {
        let mut path = vec![self.tree.node(idx).node];
        let mut current = idx;
        while let Some((parent, _)) = self.tree.node(current).parent {
            if parent == self.tree.root {
                break;
            }
            path.push(self.tree.node(parent).node);
            current = parent;
        }
        path
    }

    fn root_children(&self) -> Vec<TreeIdx> {
        self.tree.node(self.tree.root).slots[0].children.clone()
    }

    fn root_instance(&self, id: NodeId) -> Option<TreeIdx> {
        self.tree
            .instances(id)
            .iter()
            .copied()
            .find(|&idx| matches!(self.tree.node(idx).parent, Some((p, _)) if p == self.tree.root))
    }

    fn slot_by_sel(&self, idx: TreeIdx, sel_id: SelId) -> Option<u16> {
        self.tree
            .node(idx)
            .slots
            .iter()
            .position(|s| s.sel == Some(sel_id))
            .map(|p| p as u16)
    }

    fn slot_by_edge_name(&self, idx: TreeIdx, edge_name: &str) -> Option<u16> {
        self.tree
            .node(idx)
            .slots
            .iter()
            .position(|s| {
                s.sel
                    .map(|sid| &*self.query.sel(sid).edge_name == edge_name)
                    .unwrap_or(false)
            })
            .map(|p| p as u16)
    }

    // -- callback plumbing -------------------------------------------------

    fn view_item(&self, idx: TreeIdx) -> ViewItem {
        let node = self.tree.node(idx);
        ViewItem {
            id: node.node,
            type_id: node.type_id,
            depth: self.tree.visible_depth(idx),
        }
    }

    /// Visible items of a subtree with their (contiguous) offsets.
    fn block_of(&self, sub: TreeIdx) -> Vec<(ViewItem, usize)> {
        let nodes = self.tree.visible_of(sub);
        let Some(&first) = nodes.first() else {
            return Vec::new();
        };
        let base = self.tree.index_of(first).expect("first node is visible");
        nodes
            .iter()
            .enumerate()
            .map(|(i, &n)| (self.view_item(n), base + i))
            .collect()
    }

    /// Visible items across one slot's children with their offsets.
    fn slot_block(&self, idx: TreeIdx, slot_no: u16) -> Vec<(ViewItem, usize)> {
        let mut nodes = Vec::new();
        for &child in &self.tree.node(idx).slots[slot_no as usize].children {
            nodes.extend(self.tree.visible_of(child));
        }
        let Some(&first) = nodes.first() else {
            return Vec::new();
        };
        let base = self.tree.index_of(first).expect("first node is visible");
        nodes
            .iter()
            .enumerate()
            .map(|(i, &n)| (self.view_item(n), base + i))
            .collect()
    }

    fn emit(&mut self, enter: bool, block: Vec<(ViewItem, usize)>) {
        let Some(callbacks) = self.callbacks.as_mut() else {
            return;
        };
        for (item, offset) in block {
            if enter {
                (callbacks.on_enter)(&item, offset);
            } else {
                (callbacks.on_leave)(&item, offset);
            }
        }
    }
}

/// Walks a path filter's hops backwards from a mutated terminal node to the
/// nodes whose filter value may have changed.
fn reverse_reach(ctx: ReadCtx<'_>, filter: &CompiledFilter, id: NodeId) -> Vec<NodeId> {
    let mut frontier = vec![id];
    for &reverse in filter.reverse_hops.iter().rev() {
        let mut next: Vec<NodeId> = Vec::new();
        for node in frontier {
            if let Some(n) = ctx.store.get(node) {
                next.extend_from_slice(n.targets(reverse));
            }
        }
        next.sort_unstable();
        next.dedup();
        frontier = next;
    }
    frontier
}
