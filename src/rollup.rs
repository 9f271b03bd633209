//! Derived values (rollups) with a lazily-filled, precisely-invalidated cache.
//!
//! A rollup reads a node's edge list (and possibly target properties) and
//! reduces it to one scalar. Values are computed on first access and memoised
//! per `(node, rollup)` pair; the engine evicts entries when an input
//! changes: link/unlink on the read edge, or a watched target property.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::model::{Name, Node, NodeId, Value};
use crate::schema::{Direction, RollupDef, RollupKind, Schema};
use crate::store::{cmp_sort_keys, Event, NodeStore};

/// Memoised rollup values.
#[derive(Debug, Default)]
pub struct RollupCache {
    values: Mutex<FxHashMap<(NodeId, Name), Value>>,
}

impl RollupCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of memoised entries.
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// True when nothing is memoised.
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    /// Returns the rollup's value for a node, computing and memoising it on
    /// miss. A missing node yields null.
    pub fn get(&self, store: &NodeStore, schema: &Schema, id: NodeId, rollup: &str) -> Value {
        let Some(node) = store.get(id) else {
            return Value::Null;
        };
        let Some((_, def)) = schema.type_of(node.type_id).rollup(rollup) else {
            return Value::Null;
        };
        let key = (id, def.name.clone());
        if let Some(value) = self.values.lock().get(&key) {
            return value.clone();
        }
        let value = evaluate(store, node, def);
        self.values.lock().insert(key, value.clone());
        value
    }

    /// Evicts one memoised entry.
    pub fn invalidate(&self, id: NodeId, rollup: &Name) {
        self.values.lock().remove(&(id, rollup.clone()));
    }

    /// Evicts every entry for a node.
    pub fn invalidate_node(&self, id: NodeId) {
        self.values.lock().retain(|(node, _), _| *node != id);
    }

    /// Evicts entries whose inputs the event may have changed.
    pub fn apply(&self, schema: &Schema, store: &NodeStore, event: &Event) {
        match event {
            Event::NodeInserted { .. } => {}
            Event::NodeUpdated {
                id,
                type_id,
                changed,
            } => {
                for name in changed {
                    let Some(watchers) = schema.watchers(*type_id, name) else {
                        continue;
                    };
                    for watch in &watchers.rollups {
                        let rollup_name = &schema.type_of(watch.source_type).rollups
                            [watch.rollup as usize]
                            .name;
                        let sources = store
                            .get(*id)
                            .map(|n| n.targets(watch.reverse))
                            .unwrap_or(&[]);
                        for &source in sources {
                            self.invalidate(source, rollup_name);
                        }
                    }
                }
            }
            Event::NodeDeleted { id, .. } => self.invalidate_node(*id),
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
                for &ri in source_ty.rollups_on_edge(*edge) {
                    self.invalidate(*source, &source_ty.rollups[ri as usize].name);
                }
                let edge_def = source_ty.edge_def(*edge);
                let target_ty = schema.type_of(edge_def.target_type);
                for &ri in target_ty.rollups_on_edge(edge_def.reverse_edge) {
                    self.invalidate(*target, &target_ty.rollups[ri as usize].name);
                }
            }
        }
    }
}

/// Computes a rollup's value directly from live store state.
pub fn evaluate(store: &NodeStore, node: &Node, def: &RollupDef) -> Value {
    match &def.kind {
        RollupKind::Count { edge } => Value::Int(node.targets(*edge).len() as i64),
        RollupKind::Traverse { edge, property } => node
            .first_target(*edge)
            .and_then(|t| store.get(t))
            .map(|t| t.property(property))
            .unwrap_or(Value::Null),
        RollupKind::First {
            edge,
            field,
            direction,
            property,
        } => pick(store, node, *edge, field, *direction, property.as_ref(), true),
        RollupKind::Last {
            edge,
            field,
            direction,
            property,
        } => pick(store, node, *edge, field, *direction, property.as_ref(), false),
    }
}

/// Ranks the edge's targets by `(field, id)` under `direction` and reads
/// `property` (or `field` itself) off the minimal or maximal one.
fn pick(
    store: &NodeStore,
    node: &Node,
    edge: crate::model::EdgeId,
    field: &Name,
    direction: Direction,
    property: Option<&Name>,
    first: bool,
) -> Value {
    let chosen = node
        .targets(edge)
        .iter()
        .filter_map(|&t| store.get(t))
        .map(|t| ((t.property(field), t.id), t))
        .reduce(|best, candidate| {
            let keep_candidate = {
                let ord = cmp_sort_keys(direction, &candidate.0, &best.0);
                if first {
                    ord == std::cmp::Ordering::Less
                } else {
                    ord != std::cmp::Ordering::Less
                }
            };
            if keep_candidate {
                candidate
            } else {
                best
            }
        });
    match chosen {
        Some((_, target)) => target.property(property.unwrap_or(field)),
        None => Value::Null,
    }
}
