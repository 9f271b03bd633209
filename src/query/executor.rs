//! Query execution: index-ordered scans materialised into item trees.
//!
//! The executor never sorts in memory; root and sorted-edge orderings come
//! straight from the chosen index, unsorted edges follow the forward list.
//! Each materialisation carries a visited set keyed by `NodeId` so cyclic
//! graphs terminate: a node never appears twice on a single root→leaf path.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;

use super::validate::{CompiledFilter, CompiledQuery, CompiledSelection, FieldRef, SelId};
use crate::index::IndexManager;
use crate::model::{Name, Node, NodeId, TypeId, Value};
use crate::query::ast::FilterOp;
use crate::rollup::RollupCache;
use crate::schema::Schema;
use crate::store::NodeStore;

/// Shared read-only view of engine state handed to the executor and to
/// subscription updates.
#[derive(Clone, Copy)]
pub struct ReadCtx<'a> {
    /// Resolved schema.
    pub schema: &'a Schema,
    /// Node storage.
    pub store: &'a NodeStore,
    /// Materialised indexes.
    pub indexes: &'a IndexManager,
    /// Rollup memo.
    pub rollups: &'a RollupCache,
}

/// One segment of an item's path from the query root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    /// The root item.
    Root(NodeId),
    /// An edge hop: edge name and position within the parent's edge result.
    Edge {
        /// Traversed edge's name.
        name: Name,
        /// Index within the parent's materialised children for this edge.
        index: usize,
    },
}

/// Ordered segments locating an item beneath its root.
pub type Path = Vec<PathSegment>;

/// Materialised children of one selection.
#[derive(Clone, Debug)]
pub enum EdgeResultKind {
    /// Fully materialised children.
    Items(Vec<Item>),
    /// Children counted but not materialised (collapsed view edges).
    Lazy {
        /// Number of matching targets.
        count: usize,
    },
}

/// Per-selection result attached to an item.
#[derive(Clone, Debug)]
pub struct EdgeResult {
    /// Edge name.
    pub name: Name,
    /// Children or their lazy count.
    pub kind: EdgeResultKind,
}

/// One materialised node.
#[derive(Clone, Debug)]
pub struct Item {
    /// Backing node.
    pub id: NodeId,
    /// Node's type.
    pub type_id: TypeId,
    /// Path from the root.
    pub path: Path,
    /// `path.len() - 1`.
    pub depth: usize,
    /// Every property and rollup value.
    pub fields: BTreeMap<Name, Value>,
    /// Results for each edge selection, in selection order.
    pub edges: Vec<EdgeResult>,
}

/// Runs a compiled query, returning root items in index order.
pub fn execute(ctx: ReadCtx<'_>, query: &CompiledQuery) -> Vec<Item> {
    let mut items = Vec::new();
    for id in root_candidates(ctx, query) {
        let Some(node) = ctx.store.get(id) else {
            continue;
        };
        let mut visited = FxHashSet::default();
        let path = vec![PathSegment::Root(id)];
        items.push(materialise(ctx, query, node, &query.top, path, &mut visited));
    }
    items
}

/// Root node ids in result order: a direct lookup or a covering-index scan,
/// post-filtered.
pub fn root_candidates(ctx: ReadCtx<'_>, query: &CompiledQuery) -> Vec<NodeId> {
    match query.root_id {
        Some(id) => ctx
            .store
            .get(id)
            .filter(|node| node.type_id == query.root_type)
            .filter(|node| passes_all(ctx, node, &query.filters, &[]))
            .map(|node| vec![node.id])
            .unwrap_or_default(),
        None => {
            let coverage = query
                .coverage
                .as_ref()
                .expect("compiled query without root id carries coverage");
            ctx.indexes
                .scan(query.root_type, coverage)
                .filter(|&id| {
                    ctx.store.get(id).is_some_and(|node| {
                        passes_all(ctx, node, &query.filters, &coverage.consumed_filters)
                    })
                })
                .collect()
        }
    }
}

/// Whether `node` currently belongs to the query's root result set.
pub fn root_matches(ctx: ReadCtx<'_>, query: &CompiledQuery, node: &Node) -> bool {
    if node.type_id != query.root_type {
        return false;
    }
    match (&query.root_id, &query.coverage) {
        (Some(root_id), _) => *root_id == node.id && passes_all(ctx, node, &query.filters, &[]),
        (None, Some(coverage)) => {
            // Membership requires an index entry (all keys defined) plus the
            // equality prefix and residual filters.
            let Some(key) = ctx
                .indexes
                .index(query.root_type, coverage.index_pos)
                .key_of(node.id)
            else {
                return false;
            };
            let prefix_ok = coverage
                .eq_prefix
                .iter()
                .zip(key.0.iter())
                .all(|(bound, part)| *bound == part.value);
            prefix_ok && passes_all(ctx, node, &query.filters, &coverage.consumed_filters)
        }
        (None, None) => false,
    }
}

/// Target ids for one selection beneath `parent`, in result order,
/// post-filtered. Sorted selections scan the covering edge-prefixed index;
/// unsorted ones follow the forward list.
pub fn child_candidates(
    ctx: ReadCtx<'_>,
    parent: &Node,
    sel: &CompiledSelection,
) -> Vec<NodeId> {
    match &sel.coverage {
        Some(coverage) => ctx
            .indexes
            .scan_with_edge_prefix(sel.target_type, coverage, parent.id)
            .filter(|&id| {
                ctx.store.get(id).is_some_and(|node| {
                    passes_all(ctx, node, &sel.filters, &coverage.consumed_filters)
                })
            })
            .collect(),
        None => parent
            .targets(sel.edge)
            .iter()
            .copied()
            .filter(|&id| {
                ctx.store
                    .get(id)
                    .is_some_and(|node| passes_all(ctx, node, &sel.filters, &[]))
            })
            .collect(),
    }
}

/// Whether `node` belongs under `parent` for this selection right now.
pub fn child_matches(
    ctx: ReadCtx<'_>,
    parent: &Node,
    sel: &CompiledSelection,
    node: &Node,
) -> bool {
    if node.type_id != sel.target_type || !parent.targets(sel.edge).contains(&node.id) {
        return false;
    }
    match &sel.coverage {
        Some(coverage) => {
            // Sorted membership additionally requires the index entry whose
            // edge prefix points at this parent.
            let Some(key) = ctx
                .indexes
                .index(sel.target_type, coverage.index_pos)
                .key_of(node.id)
            else {
                return false;
            };
            if key.0.first().map(|part| part.value.clone())
                != Some(Value::Int(parent.id as i64))
            {
                return false;
            }
            let prefix_ok = coverage
                .eq_prefix
                .iter()
                .zip(key.0.iter().skip(1))
                .all(|(bound, part)| *bound == part.value);
            prefix_ok && passes_all(ctx, node, &sel.filters, &coverage.consumed_filters)
        }
        None => passes_all(ctx, node, &sel.filters, &[]),
    }
}

/// Builds the item for `node`, recursing into the given selections.
pub fn materialise(
    ctx: ReadCtx<'_>,
    query: &CompiledQuery,
    node: &Node,
    selections: &[SelId],
    path: Path,
    visited: &mut FxHashSet<NodeId>,
) -> Item {
    visited.insert(node.id);

    let ty = ctx.schema.type_of(node.type_id);
    let mut fields = BTreeMap::new();
    for prop in &ty.properties {
        if let Some(value) = node.properties.get(&prop.name) {
            fields.insert(prop.name.clone(), value.clone());
        }
    }
    for rollup in &ty.rollups {
        fields.insert(
            rollup.name.clone(),
            ctx.rollups.get(ctx.store, ctx.schema, node.id, &rollup.name),
        );
    }

    let mut edges = Vec::with_capacity(selections.len());
    for &sel_id in selections {
        let sel = query.sel(sel_id);
        let mut children = Vec::new();
        for target in child_candidates(ctx, node, sel) {
            if visited.contains(&target) {
                continue;
            }
            let Some(target_node) = ctx.store.get(target) else {
                continue;
            };
            let mut child_path = path.clone();
            child_path.push(PathSegment::Edge {
                name: sel.edge_name.clone(),
                index: children.len(),
            });
            children.push(materialise(
                ctx,
                query,
                target_node,
                &sel.children,
                child_path,
                visited,
            ));
        }
        edges.push(EdgeResult {
            name: sel.edge_name.clone(),
            kind: EdgeResultKind::Items(children),
        });
    }

    visited.remove(&node.id);
    Item {
        id: node.id,
        type_id: node.type_id,
        depth: path.len() - 1,
        path,
        fields,
        edges,
    }
}

/// Applies every filter except the consumed index-prefix positions.
pub fn passes_all(
    ctx: ReadCtx<'_>,
    node: &Node,
    filters: &[CompiledFilter],
    consumed: &[usize],
) -> bool {
    filters
        .iter()
        .enumerate()
        .filter(|(i, _)| !consumed.contains(i))
        .all(|(_, f)| passes(ctx, node, f))
}

fn passes(ctx: ReadCtx<'_>, node: &Node, filter: &CompiledFilter) -> bool {
    let value = filter_value(ctx, node, filter);
    match filter.op {
        FilterOp::Eq => value == filter.value,
        FilterOp::Neq => value != filter.value,
        FilterOp::Gt => value > filter.value,
        FilterOp::Gte => value >= filter.value,
        FilterOp::Lt => value < filter.value,
        FilterOp::Lte => value <= filter.value,
        FilterOp::In => filter.values.contains(&value),
    }
}

/// Walks the filter's hops (first target each) and reads the terminal
/// field; a broken hop or unset value reads as null.
fn filter_value(ctx: ReadCtx<'_>, node: &Node, filter: &CompiledFilter) -> Value {
    let mut current = node;
    for &edge in &filter.hops {
        match current.first_target(edge).and_then(|id| ctx.store.get(id)) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    eval_field(ctx, current, &filter.field)
}

/// Reads a resolved field off a node.
pub fn eval_field(ctx: ReadCtx<'_>, node: &Node, field: &FieldRef) -> Value {
    match field {
        FieldRef::Property(name) => node.property(name),
        FieldRef::Rollup(name) => ctx.rollups.get(ctx.store, ctx.schema, node.id, name),
    }
}
