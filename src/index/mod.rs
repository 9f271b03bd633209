//! Index maintenance and ordered scans.
//!
//! Every [`IndexDef`](crate::schema::IndexDef) is materialised as an ordered
//! set of composite keys mapping to node ids. The invariant: an entry exists
//! iff every key position on the node has a defined value (kind=property and
//! rollup positions) or a non-empty edge (kind=edge positions, which hold
//! the first target's id so edge-prefixed lookups can restrict a scan to one
//! source). Entries are recomputed synchronously from final store state as
//! mutation events arrive.

mod key;
mod select;

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

pub use key::{IndexKey, KeyPart};
pub use select::Coverage;

use crate::model::{Node, NodeId, TypeId, Value};
use crate::rollup::RollupCache;
use crate::schema::{FieldSource, IndexField, Schema, TypeDef};
use crate::store::{Event, NodeStore};

/// One materialised index.
#[derive(Debug)]
pub struct Index {
    fields: Vec<IndexField>,
    entries: BTreeSet<(IndexKey, NodeId)>,
    current: FxHashMap<NodeId, IndexKey>,
}

impl Index {
    fn new(fields: Vec<IndexField>) -> Self {
        Self {
            fields,
            entries: BTreeSet::new(),
            current: FxHashMap::default(),
        }
    }

    /// Key positions of this index.
    pub fn fields(&self) -> &[IndexField] {
        &self.fields
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The node's current key, when indexed.
    pub fn key_of(&self, node: NodeId) -> Option<&IndexKey> {
        self.current.get(&node)
    }

    /// Computes the node's key, or `None` when any position is undefined.
    pub fn compute_key(
        &self,
        store: &NodeStore,
        schema: &Schema,
        rollups: &RollupCache,
        node: &Node,
    ) -> Option<IndexKey> {
        let ty = schema.type_of(node.type_id);
        let mut parts: SmallVec<[KeyPart; 4]> = SmallVec::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = match &field.source {
                FieldSource::Property(name) => node.property(name),
                FieldSource::Rollup(ri) => {
                    rollups.get(store, schema, node.id, &ty.rollups[*ri as usize].name)
                }
                FieldSource::Edge(edge) => match node.first_target(*edge) {
                    Some(target) => Value::Int(target as i64),
                    None => Value::Null,
                },
            };
            if value.is_null() {
                return None;
            }
            parts.push(KeyPart {
                value,
                direction: field.direction,
            });
        }
        Some(IndexKey::new(parts))
    }

    fn reindex(&mut self, store: &NodeStore, schema: &Schema, rollups: &RollupCache, id: NodeId) {
        let fresh = store
            .get(id)
            .and_then(|node| self.compute_key(store, schema, rollups, node));
        let stale = self.current.get(&id);
        if stale == fresh.as_ref() {
            return;
        }
        if let Some(old) = self.current.remove(&id) {
            self.entries.remove(&(old, id));
        }
        if let Some(new) = fresh {
            self.entries.insert((new.clone(), id));
            self.current.insert(id, new);
        }
    }

    fn remove(&mut self, id: NodeId) {
        if let Some(old) = self.current.remove(&id) {
            self.entries.remove(&(old, id));
        }
    }

    /// Scans entries whose key starts with `prefix`, in index order.
    pub fn scan_prefix<'a>(&'a self, prefix: &IndexKey) -> impl Iterator<Item = NodeId> + 'a {
        let start = (prefix.clone(), 0);
        let prefix = prefix.clone();
        self.entries
            .range(start..)
            .take_while(move |(key, _)| key.starts_with(&prefix))
            .map(|&(_, id)| id)
    }

    /// Scans all entries in index order.
    pub fn scan(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.iter().map(|&(_, id)| id)
    }

    /// Builds the scan prefix for an equality binding, tagging each value
    /// with the matching field's direction.
    pub fn prefix_key(&self, values: &[Value]) -> IndexKey {
        IndexKey::new(
            values
                .iter()
                .zip(&self.fields)
                .map(|(value, field)| KeyPart {
                    value: value.clone(),
                    direction: field.direction,
                })
                .collect(),
        )
    }
}

/// Maintains every declared index, keyed by `(type, declaration position)`.
#[derive(Debug)]
pub struct IndexManager {
    per_type: Vec<Vec<Index>>,
}

impl IndexManager {
    /// Builds empty indexes for every declaration in the schema.
    pub fn new(schema: &Schema) -> Self {
        let per_type = schema
            .types()
            .iter()
            .map(|ty| {
                ty.indexes
                    .iter()
                    .map(|def| Index::new(def.fields.clone()))
                    .collect()
            })
            .collect();
        Self { per_type }
    }

    /// The index at `(type, position)`.
    pub fn index(&self, type_id: TypeId, position: u16) -> &Index {
        &self.per_type[type_id as usize][position as usize]
    }

    /// All indexes declared on a type.
    pub fn indexes_of(&self, type_id: TypeId) -> &[Index] {
        &self.per_type[type_id as usize]
    }

    /// Total entries across all indexes (stats surface).
    pub fn entry_count(&self) -> usize {
        self.per_type
            .iter()
            .flat_map(|per| per.iter())
            .map(Index::len)
            .sum()
    }

    /// Recomputes the effect of one mutation event. Rollup invalidation must
    /// run first so recomputed keys see fresh values.
    pub fn apply(
        &mut self,
        store: &NodeStore,
        schema: &Schema,
        rollups: &RollupCache,
        event: &Event,
    ) {
        match event {
            Event::NodeInserted { id, type_id } => {
                // A fresh node can qualify immediately when an index is keyed
                // solely on rollups (a count of zero is a defined value).
                self.reindex_all(store, schema, rollups, *type_id, *id);
            }
            Event::NodeUpdated {
                id,
                type_id,
                changed,
            } => {
                let ty = schema.type_of(*type_id);
                let mut own: SmallVec<[u16; 4]> = SmallVec::new();
                for name in changed {
                    own.extend_from_slice(ty.indexes_on_property(name));
                }
                self.reindex_some(store, schema, rollups, *type_id, *id, &own);

                // A changed property can shift rollup values and first
                // targets on nodes linked through a watching edge.
                for name in changed {
                    let Some(watchers) = schema.watchers(*type_id, name) else {
                        continue;
                    };
                    let mut touched: Vec<(TypeId, NodeId, SmallVec<[u16; 4]>)> = Vec::new();
                    for watch in &watchers.rollups {
                        let source_ty = schema.type_of(watch.source_type);
                        let affected = source_ty.indexes_on_rollup(watch.rollup);
                        if affected.is_empty() {
                            continue;
                        }
                        for &source in sources(store, *id, watch.reverse) {
                            touched.push((watch.source_type, source, affected.into()));
                        }
                    }
                    for watch in &watchers.resort {
                        let source_ty = schema.type_of(watch.source_type);
                        let affected = source_ty.indexes_on_edge(watch.edge);
                        if affected.is_empty() {
                            continue;
                        }
                        for &source in sources(store, *id, watch.reverse) {
                            touched.push((watch.source_type, source, affected.into()));
                        }
                    }
                    for (source_type, source, positions) in touched {
                        self.reindex_some(store, schema, rollups, source_type, source, &positions);
                    }
                }
            }
            Event::NodeDeleted { id, type_id } => {
                for index in &mut self.per_type[*type_id as usize] {
                    index.remove(*id);
                }
            }
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
                let source_ty = schema.type_of(*source_type);
                let mut positions: SmallVec<[u16; 4]> =
                    source_ty.indexes_on_edge(*edge).into();
                for &ri in source_ty.rollups_on_edge(*edge) {
                    positions.extend_from_slice(source_ty.indexes_on_rollup(ri));
                }
                self.reindex_some(store, schema, rollups, *source_type, *source, &positions);

                let edge_def = source_ty.edge_def(*edge);
                let target_ty = schema.type_of(edge_def.target_type);
                let mut positions: SmallVec<[u16; 4]> =
                    target_ty.indexes_on_edge(edge_def.reverse_edge).into();
                for &ri in target_ty.rollups_on_edge(edge_def.reverse_edge) {
                    positions.extend_from_slice(target_ty.indexes_on_rollup(ri));
                }
                self.reindex_some(
                    store,
                    schema,
                    rollups,
                    edge_def.target_type,
                    *target,
                    &positions,
                );
            }
        }
    }

    fn reindex_all(
        &mut self,
        store: &NodeStore,
        schema: &Schema,
        rollups: &RollupCache,
        type_id: TypeId,
        id: NodeId,
    ) {
        for index in &mut self.per_type[type_id as usize] {
            index.reindex(store, schema, rollups, id);
        }
    }

    fn reindex_some(
        &mut self,
        store: &NodeStore,
        schema: &Schema,
        rollups: &RollupCache,
        type_id: TypeId,
        id: NodeId,
        positions: &[u16],
    ) {
        if positions.is_empty() {
            return;
        }
        trace!(type_id, id, ?positions, "reindex");
        let per = &mut self.per_type[type_id as usize];
        let mut seen: SmallVec<[u16; 4]> = SmallVec::new();
        for &pos in positions {
            if seen.contains(&pos) {
                continue;
            }
            seen.push(pos);
            per[pos as usize].reindex(store, schema, rollups, id);
        }
    }

    /// Chooses an index serving a root query. See [`select::select_index`].
    pub fn select_index(
        &self,
        ty: &TypeDef,
        eq_filters: &[(usize, &str, &Value)],
        sorts: &[(&str, crate::schema::Direction)],
    ) -> Option<Coverage> {
        select::select_index(ty, eq_filters, sorts)
    }

    /// Chooses an edge-prefixed index serving an ordered edge traversal.
    pub fn select_nested_index(
        &self,
        target_ty: &TypeDef,
        reverse_edge: crate::model::EdgeId,
        eq_filters: &[(usize, &str, &Value)],
        sorts: &[(&str, crate::schema::Direction)],
    ) -> Option<Coverage> {
        select::select_nested_index(target_ty, reverse_edge, eq_filters, sorts)
    }

    /// Scans a covering index with its equality prefix, in index order.
    pub fn scan<'a>(
        &'a self,
        type_id: TypeId,
        coverage: &Coverage,
    ) -> Box<dyn Iterator<Item = NodeId> + 'a> {
        let index = self.index(type_id, coverage.index_pos);
        if coverage.eq_prefix.is_empty() {
            Box::new(index.scan())
        } else {
            let prefix = index.prefix_key(&coverage.eq_prefix);
            Box::new(index.scan_prefix(&prefix))
        }
    }

    /// Scans an edge-prefixed index restricted to one source node, in index
    /// order.
    pub fn scan_with_edge_prefix<'a>(
        &'a self,
        type_id: TypeId,
        coverage: &Coverage,
        source: NodeId,
    ) -> Box<dyn Iterator<Item = NodeId> + 'a> {
        let index = self.index(type_id, coverage.index_pos);
        let mut values = Vec::with_capacity(1 + coverage.eq_prefix.len());
        values.push(Value::Int(source as i64));
        values.extend(coverage.eq_prefix.iter().cloned());
        let prefix = index.prefix_key(&values);
        Box::new(index.scan_prefix(&prefix))
    }
}

fn sources(store: &NodeStore, id: NodeId, reverse: crate::model::EdgeId) -> &[NodeId] {
    store.get(id).map(|n| n.targets(reverse)).unwrap_or(&[])
}
