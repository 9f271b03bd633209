//! Node storage with bidirectional edge maintenance.
//!
//! The store owns all nodes and is the only component that mutates them.
//! Every mutation validates fully before touching state, so a failed call
//! leaves the store observably unchanged, then returns the [`Event`]s the
//! engine fans out to indexes, rollups, and subscriptions.
//!
//! Linking maintains both directions: the forward list on the source and the
//! reverse list on the target, each obeying its own declared sort. When a
//! property watched by an incoming edge's sort changes, the store repositions
//! the node inside every linked source's list and reports the move as an
//! unlink/link pair so downstream mirrors can follow.

use std::cmp::Ordering;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::error::StoreError;
use crate::model::{EdgeId, Name, Node, NodeId, TypeId, Value};
use crate::schema::{Direction, Schema};

/// A mutation notification fanned out by the engine.
///
/// These five kinds are the complete vocabulary; sort-induced repositioning
/// is reported as an unlink/link pair after the property change.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A node was created (no properties, no edges yet).
    NodeInserted {
        /// The new node.
        id: NodeId,
        /// Its declared type.
        type_id: TypeId,
    },
    /// Properties changed on a node.
    NodeUpdated {
        /// The updated node.
        id: NodeId,
        /// Its declared type.
        type_id: TypeId,
        /// Names whose value actually changed (including removals).
        changed: SmallVec<[Name; 4]>,
    },
    /// A node was removed. Every connection was unlinked beforehand.
    NodeDeleted {
        /// The removed node.
        id: NodeId,
        /// Its declared type.
        type_id: TypeId,
    },
    /// A connection was added, in both directions.
    EdgeLinked {
        /// Source endpoint.
        source: NodeId,
        /// Source's type.
        source_type: TypeId,
        /// Edge on the source's type.
        edge: EdgeId,
        /// Target endpoint.
        target: NodeId,
    },
    /// A connection was removed, in both directions.
    EdgeUnlinked {
        /// Source endpoint.
        source: NodeId,
        /// Source's type.
        source_type: TypeId,
        /// Edge on the source's type.
        edge: EdgeId,
        /// Target endpoint.
        target: NodeId,
    },
}

/// Owner of all node instances.
#[derive(Debug)]
pub struct NodeStore {
    schema: Arc<Schema>,
    nodes: FxHashMap<NodeId, Node>,
    next_id: NodeId,
}

impl NodeStore {
    /// Creates an empty store over the given schema.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            nodes: FxHashMap::default(),
            next_id: 1,
        }
    }

    /// Number of live nodes.
    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    /// Fetches a node by id.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Iterates over all live nodes in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    fn node(&self, id: NodeId) -> Result<&Node, StoreError> {
        self.nodes.get(&id).ok_or(StoreError::NodeNotFound(id))
    }

    /// Creates an empty node of the named type.
    pub fn insert(&mut self, type_name: &str) -> Result<(NodeId, Event), StoreError> {
        let type_id = self
            .schema
            .type_id(type_name)
            .ok_or_else(|| StoreError::UnknownType(type_name.to_owned()))?;
        let edge_count = self.schema.type_of(type_id).edges.len();
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, Node::new(id, type_id, edge_count));
        Ok((id, Event::NodeInserted { id, type_id }))
    }

    /// Writes a partial property map onto a node.
    ///
    /// A null (or absent-by-convention) value removes the property. Returns
    /// the update event followed by unlink/link pairs for every sort-induced
    /// reposition, or no events when nothing actually changed.
    pub fn update(
        &mut self,
        id: NodeId,
        props: &[(String, Value)],
    ) -> Result<Vec<Event>, StoreError> {
        let type_id = self.node(id)?.type_id;
        let ty = self.schema.type_of(type_id);

        // Validate everything up front: a failed update must not write.
        let mut writes: Vec<(Name, Value)> = Vec::with_capacity(props.len());
        for (name, value) in props {
            let def = ty
                .property(name)
                .ok_or_else(|| StoreError::UnknownProperty {
                    type_name: ty.name.to_string(),
                    property: name.clone(),
                })?;
            if !value.is_null() && !def.ty.accepts(value) {
                return Err(StoreError::InvalidPropertyType {
                    type_name: ty.name.to_string(),
                    property: name.clone(),
                    expected: def.ty.as_str(),
                });
            }
            writes.push((def.name.clone(), value.clone()));
        }

        let node = self.nodes.get_mut(&id).expect("validated above");
        let mut changed: SmallVec<[Name; 4]> = SmallVec::new();
        for (name, value) in writes {
            let previous = if value.is_null() {
                node.properties.remove(&name)
            } else {
                node.properties.insert(name.clone(), value.clone())
            };
            let was = previous.unwrap_or(Value::Null);
            let now = if value.is_null() { Value::Null } else { value };
            if was != now && !changed.contains(&name) {
                changed.push(name);
            }
        }

        if changed.is_empty() {
            return Ok(Vec::new());
        }

        let mut events = vec![Event::NodeUpdated {
            id,
            type_id,
            changed: changed.clone(),
        }];
        for name in &changed {
            self.resort_incoming(id, type_id, name, &mut events);
        }
        Ok(events)
    }

    /// Removes a node, unlinking every connection in both directions first.
    pub fn delete(&mut self, id: NodeId) -> Result<Vec<Event>, StoreError> {
        let node = self.node(id)?;
        let type_id = node.type_id;

        // Snapshot the connections; each is reported from this node's
        // perspective exactly once.
        let mut links: Vec<(EdgeId, NodeId)> = Vec::new();
        for (slot, targets) in node.edges.iter().enumerate() {
            for &target in targets {
                links.push((slot as EdgeId, target));
            }
        }

        let mut events = Vec::with_capacity(links.len() + 1);
        for (edge, target) in links {
            self.remove_link(id, type_id, edge, target);
            events.push(Event::EdgeUnlinked {
                source: id,
                source_type: type_id,
                edge,
                target,
            });
        }
        self.nodes.remove(&id);
        events.push(Event::NodeDeleted { id, type_id });
        Ok(events)
    }

    /// Connects `source --edge--> target`, maintaining both directions.
    ///
    /// A link that already exists is a silent no-op.
    pub fn link(
        &mut self,
        source: NodeId,
        edge_name: &str,
        target: NodeId,
    ) -> Result<Option<Event>, StoreError> {
        let (source_type, edge, reverse, target_type) = self.resolve_edge(source, edge_name)?;
        let target_node = self
            .nodes
            .get(&target)
            .ok_or(StoreError::EdgeTargetNotFound(target))?;
        if target_node.type_id != target_type {
            return Err(StoreError::TypeMismatch {
                edge: edge_name.to_owned(),
                expected: self.schema.type_of(target_type).name.to_string(),
                actual: self.schema.type_of(target_node.type_id).name.to_string(),
                target,
            });
        }
        if self.nodes[&source].targets(edge).contains(&target) {
            return Ok(None);
        }

        self.insert_sorted(source, source_type, edge, target);
        self.insert_sorted(target, target_type, reverse, source);
        trace!(source, edge, target, "edge linked");
        Ok(Some(Event::EdgeLinked {
            source,
            source_type,
            edge,
            target,
        }))
    }

    /// Disconnects `source --edge--> target` in both directions.
    ///
    /// A missing connection is a silent no-op.
    pub fn unlink(
        &mut self,
        source: NodeId,
        edge_name: &str,
        target: NodeId,
    ) -> Result<Option<Event>, StoreError> {
        let (source_type, edge, _, _) = self.resolve_edge(source, edge_name)?;
        if !self.nodes.contains_key(&target)
            || !self.nodes[&source].targets(edge).contains(&target)
        {
            return Ok(None);
        }
        self.remove_link(source, source_type, edge, target);
        trace!(source, edge, target, "edge unlinked");
        Ok(Some(Event::EdgeUnlinked {
            source,
            source_type,
            edge,
            target,
        }))
    }

    fn resolve_edge(
        &self,
        source: NodeId,
        edge_name: &str,
    ) -> Result<(TypeId, EdgeId, EdgeId, TypeId), StoreError> {
        let source_type = self.node(source)?.type_id;
        let ty = self.schema.type_of(source_type);
        let def = ty.edge(edge_name).ok_or_else(|| StoreError::UnknownEdge {
            type_name: ty.name.to_string(),
            edge: edge_name.to_owned(),
        })?;
        Ok((source_type, def.id, def.reverse_edge, def.target_type))
    }

    /// Inserts `target` into `holder`'s list for `edge` at its sort position
    /// (appended for unsorted edges).
    fn insert_sorted(&mut self, holder: NodeId, holder_type: TypeId, edge: EdgeId, target: NodeId) {
        let position = match &self.schema.type_of(holder_type).edge_def(edge).sort {
            Some(sort) => {
                let key = self.sort_key(target, &sort.property);
                let list = self.nodes[&holder].targets(edge);
                let direction = sort.direction;
                partition_by_key(list, &key, direction, |id| {
                    self.sort_key(id, &sort.property)
                })
            }
            None => self.nodes[&holder].targets(edge).len(),
        };
        let node = self.nodes.get_mut(&holder).expect("holder exists");
        node.edges[edge as usize].insert(position, target);
    }

    /// Removes the connection in both directions. Both endpoints must exist.
    fn remove_link(&mut self, source: NodeId, source_type: TypeId, edge: EdgeId, target: NodeId) {
        let reverse = self.schema.type_of(source_type).edge_def(edge).reverse_edge;
        if let Some(node) = self.nodes.get_mut(&source) {
            node.edges[edge as usize].retain(|&t| t != target);
        }
        if let Some(node) = self.nodes.get_mut(&target) {
            node.edges[reverse as usize].retain(|&t| t != source);
        }
    }

    /// Repositions `id` inside every source list whose edge sorts by
    /// `property`, appending an unlink/link pair per actual move.
    fn resort_incoming(
        &mut self,
        id: NodeId,
        type_id: TypeId,
        property: &Name,
        events: &mut Vec<Event>,
    ) {
        let schema = self.schema.clone();
        let Some(watchers) = schema.watchers(type_id, property) else {
            return;
        };
        for watch in &watchers.resort {
            let sources: Vec<NodeId> = self.nodes[&id].targets(watch.reverse).to_vec();
            for source in sources {
                if self.reposition(source, watch.source_type, watch.edge, id) {
                    events.push(Event::EdgeUnlinked {
                        source,
                        source_type: watch.source_type,
                        edge: watch.edge,
                        target: id,
                    });
                    events.push(Event::EdgeLinked {
                        source,
                        source_type: watch.source_type,
                        edge: watch.edge,
                        target: id,
                    });
                }
            }
        }
    }

    /// Moves `target` to its sort position inside `source`'s list for
    /// `edge`. Returns whether the position changed.
    fn reposition(
        &mut self,
        source: NodeId,
        source_type: TypeId,
        edge: EdgeId,
        target: NodeId,
    ) -> bool {
        let sort = self
            .schema
            .type_of(source_type)
            .edge_def(edge)
            .sort
            .clone()
            .expect("resort watcher implies sorted edge");
        let key = self.sort_key(target, &sort.property);
        let list = self.nodes[&source].targets(edge);
        let old = list.iter().position(|&t| t == target).expect("linked");

        let mut remaining: Vec<NodeId> = list.to_vec();
        remaining.remove(old);
        let new = partition_by_key(&remaining, &key, sort.direction, |id| {
            self.sort_key(id, &sort.property)
        });
        if new == old {
            return false;
        }
        trace!(source, edge, target, old, new, "edge reposition");
        remaining.insert(new, target);
        let node = self.nodes.get_mut(&source).expect("source exists");
        node.edges[edge as usize] = remaining;
        true
    }

    fn sort_key(&self, id: NodeId, property: &str) -> (Value, NodeId) {
        let value = self
            .nodes
            .get(&id)
            .map(|n| n.property(property))
            .unwrap_or(Value::Null);
        (value, id)
    }
}

/// Compares two (value, id) sort keys under a direction. Ties always break
/// by ascending id.
pub(crate) fn cmp_sort_keys(
    direction: Direction,
    a: &(Value, NodeId),
    b: &(Value, NodeId),
) -> Ordering {
    let by_value = match direction {
        Direction::Asc => a.0.cmp(&b.0),
        Direction::Desc => b.0.cmp(&a.0),
    };
    by_value.then(a.1.cmp(&b.1))
}

/// First position in `list` whose key orders after `key`.
fn partition_by_key<F>(list: &[NodeId], key: &(Value, NodeId), direction: Direction, get: F) -> usize
where
    F: Fn(NodeId) -> (Value, NodeId),
{
    list.partition_point(|&id| cmp_sort_keys(direction, &get(id), key) == Ordering::Less)
}
