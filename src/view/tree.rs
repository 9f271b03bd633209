//! The reactive tree: flattened visible ordering with expansion state.
//!
//! Tree nodes live in a slab; each carries per-selection child slots, an
//! expansion flag per slot, and a cached subtree visible count. Virtual hop
//! nodes contribute nothing for themselves but pass their expanded
//! children's counts through, so items beneath a hidden hop surface directly
//! under the nearest visible ancestor.
//!
//! Two invariants keep count maintenance unconditional: collapsed slots hold
//! no child tree nodes (their membership is tracked as a lazy count), and
//! every attached child therefore sits under a chain of expanded slots.
//! Index↔offset mapping walks the stored counts: logarithmic in depth,
//! linear only in sibling width.

use rustc_hash::FxHashMap;

use crate::model::{NodeId, TypeId};
use crate::query::SelId;

/// Slab position of a tree node.
pub(crate) type TreeIdx = u32;

/// Per-selection child list on one tree node.
#[derive(Debug)]
pub(crate) struct Slot {
    /// Selection this slot instantiates; `None` only on the container's
    /// root slot.
    pub sel: Option<SelId>,
    /// Whether children are instantiated and counted.
    pub expanded: bool,
    /// Child tree nodes, in result order. Empty while collapsed.
    pub children: Vec<TreeIdx>,
    /// Matching-target count maintained while collapsed.
    pub lazy: usize,
}

impl Slot {
    pub(crate) fn collapsed(sel: Option<SelId>, lazy: usize) -> Self {
        Self {
            sel,
            expanded: false,
            children: Vec::new(),
            lazy,
        }
    }
}

/// One materialised position in the view hierarchy.
#[derive(Debug)]
pub(crate) struct TreeNode {
    /// Backing store node.
    pub node: NodeId,
    /// Backing node's type.
    pub type_id: TypeId,
    /// Hidden hop: invisible itself, children pass through.
    pub virtual_: bool,
    /// Parent tree node and the slot this node sits in.
    pub parent: Option<(TreeIdx, u16)>,
    /// Child slots, parallel to the node's selection list.
    pub slots: Vec<Slot>,
    /// Visible count of this subtree.
    pub visible: usize,
}

/// Ordering engine behind a view.
#[derive(Debug)]
pub(crate) struct ReactiveTree {
    nodes: Vec<TreeNode>,
    free: Vec<TreeIdx>,
    /// Synthetic container above the root items; never visible.
    pub root: TreeIdx,
    by_node: FxHashMap<NodeId, Vec<TreeIdx>>,
}

impl ReactiveTree {
    pub(crate) fn new() -> Self {
        let container = TreeNode {
            node: 0,
            type_id: 0,
            virtual_: true,
            parent: None,
            slots: vec![Slot {
                sel: None,
                expanded: true,
                children: Vec::new(),
                lazy: 0,
            }],
            visible: 0,
        };
        Self {
            nodes: vec![container],
            free: Vec::new(),
            root: 0,
            by_node: FxHashMap::default(),
        }
    }

    pub(crate) fn node(&self, idx: TreeIdx) -> &TreeNode {
        &self.nodes[idx as usize]
    }

    pub(crate) fn node_mut(&mut self, idx: TreeIdx) -> &mut TreeNode {
        &mut self.nodes[idx as usize]
    }

    /// Visible length of the whole sequence.
    pub(crate) fn total(&self) -> usize {
        self.node(self.root).visible
    }

    /// Tree nodes currently instantiated for a store node, oldest first.
    pub(crate) fn instances(&self, node: NodeId) -> &[TreeIdx] {
        self.by_node.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Allocates a detached tree node.
    pub(crate) fn alloc(
        &mut self,
        node: NodeId,
        type_id: TypeId,
        virtual_: bool,
        slots: Vec<Slot>,
    ) -> TreeIdx {
        let fresh = TreeNode {
            node,
            type_id,
            virtual_,
            parent: None,
            slots,
            visible: usize::from(!virtual_),
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx as usize] = fresh;
                idx
            }
            None => {
                self.nodes.push(fresh);
                (self.nodes.len() - 1) as TreeIdx
            }
        };
        self.by_node.entry(node).or_default().push(idx);
        idx
    }

    /// Inserts a detached subtree into an expanded slot, updating ancestor
    /// counts.
    pub(crate) fn attach(&mut self, parent: TreeIdx, slot: u16, position: usize, child: TreeIdx) {
        debug_assert!(self.node(parent).slots[slot as usize].expanded);
        self.node_mut(parent).slots[slot as usize]
            .children
            .insert(position, child);
        self.node_mut(child).parent = Some((parent, slot));
        let delta = self.node(child).visible as isize;
        self.bubble(parent, delta);
    }

    /// Removes a subtree from its parent, updating ancestor counts. The
    /// subtree stays allocated; reattach or [`Self::release`] it.
    pub(crate) fn detach(&mut self, child: TreeIdx) {
        let Some((parent, slot)) = self.node(child).parent else {
            return;
        };
        let children = &mut self.node_mut(parent).slots[slot as usize].children;
        if let Some(pos) = children.iter().position(|&c| c == child) {
            children.remove(pos);
        }
        self.node_mut(child).parent = None;
        let delta = self.node(child).visible as isize;
        self.bubble(parent, -delta);
    }

    /// Frees a detached subtree and unregisters its nodes.
    pub(crate) fn release(&mut self, idx: TreeIdx) {
        debug_assert!(self.node(idx).parent.is_none());
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            for slot in &self.nodes[current as usize].slots {
                stack.extend(slot.children.iter().copied());
            }
            let node = self.nodes[current as usize].node;
            if let Some(list) = self.by_node.get_mut(&node) {
                list.retain(|&i| i != current);
                if list.is_empty() {
                    self.by_node.remove(&node);
                }
            }
            self.nodes[current as usize].slots.clear();
            self.nodes[current as usize].parent = None;
            self.free.push(current);
        }
    }

    /// Adds `delta` to `idx` and every ancestor's visible count.
    pub(crate) fn bubble(&mut self, idx: TreeIdx, delta: isize) {
        if delta == 0 {
            return;
        }
        let mut current = idx;
        loop {
            let node = &mut self.nodes[current as usize];
            node.visible = (node.visible as isize + delta) as usize;
            match node.parent {
                Some((parent, _)) => current = parent,
                None => break,
            }
        }
    }

    /// The visible tree node at a flattened offset.
    pub(crate) fn node_at_index(&self, index: usize) -> Option<TreeIdx> {
        if index >= self.total() {
            return None;
        }
        let mut idx = self.root;
        let mut remaining = index;
        'descend: loop {
            let node = self.node(idx);
            if !node.virtual_ {
                if remaining == 0 {
                    return Some(idx);
                }
                remaining -= 1;
            }
            for slot in &node.slots {
                if !slot.expanded {
                    continue;
                }
                for &child in &slot.children {
                    let width = self.node(child).visible;
                    if remaining < width {
                        idx = child;
                        continue 'descend;
                    }
                    remaining -= width;
                }
            }
            return None;
        }
    }

    /// Flattened offset of a visible tree node; `None` for virtual hops.
    pub(crate) fn index_of(&self, idx: TreeIdx) -> Option<usize> {
        if self.node(idx).virtual_ {
            return None;
        }
        let mut offset = 0;
        let mut current = idx;
        while let Some((parent, slot_no)) = self.node(current).parent {
            let node = self.node(parent);
            for &sibling in &node.slots[slot_no as usize].children {
                if sibling == current {
                    break;
                }
                offset += self.node(sibling).visible;
            }
            for slot in &node.slots[..slot_no as usize] {
                if slot.expanded {
                    offset += slot
                        .children
                        .iter()
                        .map(|&c| self.node(c).visible)
                        .sum::<usize>();
                }
            }
            if !node.virtual_ {
                offset += 1;
            }
            current = parent;
        }
        Some(offset)
    }

    /// Count of non-virtual strict ancestors: the item's indentation depth.
    pub(crate) fn visible_depth(&self, idx: TreeIdx) -> usize {
        let mut depth = 0;
        let mut current = idx;
        while let Some((parent, _)) = self.node(current).parent {
            if !self.node(parent).virtual_ {
                depth += 1;
            }
            current = parent;
        }
        depth
    }

    /// The next visible node after `idx` in flattened order.
    pub(crate) fn advance(&self, idx: TreeIdx) -> Option<TreeIdx> {
        if let Some(down) = self.first_visible_below(idx) {
            return Some(down);
        }
        let mut current = idx;
        while let Some((parent, slot_no)) = self.node(current).parent {
            if let Some(next) = self.next_within(parent, slot_no, current) {
                return Some(next);
            }
            current = parent;
        }
        None
    }

    /// First visible node inside `idx`'s expanded slots.
    fn first_visible_below(&self, idx: TreeIdx) -> Option<TreeIdx> {
        for slot in &self.node(idx).slots {
            if !slot.expanded {
                continue;
            }
            for &child in &slot.children {
                if self.node(child).visible > 0 {
                    return Some(self.first_visible_of(child));
                }
            }
        }
        None
    }

    /// First visible node of a subtree known to have `visible > 0`.
    fn first_visible_of(&self, idx: TreeIdx) -> TreeIdx {
        if !self.node(idx).virtual_ {
            idx
        } else {
            self.first_visible_below(idx)
                .expect("virtual node with positive count has visible descendants")
        }
    }

    /// First visible node after `current` among the parent's later children
    /// and slots.
    fn next_within(&self, parent: TreeIdx, slot_no: u16, current: TreeIdx) -> Option<TreeIdx> {
        let node = self.node(parent);
        let slot = &node.slots[slot_no as usize];
        let pos = slot.children.iter().position(|&c| c == current)?;
        for &sibling in &slot.children[pos + 1..] {
            if self.node(sibling).visible > 0 {
                return Some(self.first_visible_of(sibling));
            }
        }
        for later in &node.slots[slot_no as usize + 1..] {
            if !later.expanded {
                continue;
            }
            for &child in &later.children {
                if self.node(child).visible > 0 {
                    return Some(self.first_visible_of(child));
                }
            }
        }
        None
    }

    /// Every visible node of a subtree, in flattened order.
    pub(crate) fn visible_of(&self, idx: TreeIdx) -> Vec<TreeIdx> {
        let mut out = Vec::with_capacity(self.node(idx).visible);
        self.collect_visible(idx, &mut out);
        out
    }

    fn collect_visible(&self, idx: TreeIdx, out: &mut Vec<TreeIdx>) {
        let node = self.node(idx);
        if !node.virtual_ {
            out.push(idx);
        }
        for slot in &node.slots {
            if !slot.expanded {
                continue;
            }
            for &child in &slot.children {
                self.collect_visible(child, out);
            }
        }
    }
}
