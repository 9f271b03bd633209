//! Engine facade: wires the store, indexes, rollups, tracker, and views.
//!
//! All mutations funnel through [`Engine`]: the store applies the change and
//! returns its events, the index manager and rollup cache recompute their
//! mirrors from final store state, and the tracker then fans the events out
//! to every live view, all before the mutating call returns. Everything
//! runs on the caller's thread.
//!
//! Enter/leave callbacks run while the engine's locks are held; they must
//! not call back into the engine.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{Error, Result};
use crate::index::IndexManager;
use crate::model::{Node, NodeId, Value};
use crate::query::{self, Query, ReadCtx};
use crate::rollup::RollupCache;
use crate::schema::Schema;
use crate::store::{Event, NodeStore};
use crate::tracker::ChangeTracker;
use crate::view::{ViewCallbacks, ViewCore, ViewItem, ViewOptions};

/// Engine configuration.
#[derive(Clone, Copy, Debug)]
pub struct EngineOptions {
    /// Default viewport length for views created without an explicit limit.
    pub default_view_limit: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_view_limit: usize::MAX,
        }
    }
}

/// Counter snapshot over live engine state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Live nodes.
    pub nodes: usize,
    /// Entries across every index.
    pub index_entries: usize,
    /// Memoised rollup values.
    pub rollup_entries: usize,
    /// Live views.
    pub views: usize,
    /// Distinct interned identifier strings.
    pub interned_strings: usize,
}

pub(crate) struct EngineInner {
    pub(crate) schema: Arc<Schema>,
    pub(crate) store: NodeStore,
    pub(crate) indexes: IndexManager,
    pub(crate) rollups: RollupCache,
    pub(crate) tracker: ChangeTracker,
    options: EngineOptions,
}

impl EngineInner {
    fn ctx(&self) -> ReadCtx<'_> {
        ReadCtx {
            schema: &self.schema,
            store: &self.store,
            indexes: &self.indexes,
            rollups: &self.rollups,
        }
    }

    /// Applies post-mutation bookkeeping and fans the events out.
    fn settle(&mut self, events: Vec<Event>) {
        for event in &events {
            self.rollups.apply(&self.schema, &self.store, event);
        }
        for event in &events {
            self.indexes
                .apply(&self.store, &self.schema, &self.rollups, event);
        }
        let this = &*self;
        for event in &events {
            this.tracker.dispatch(this.ctx(), event);
        }
    }
}

/// The embeddable graph engine.
///
/// Cheap to clone; clones share the same underlying state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<RwLock<EngineInner>>,
}

impl Engine {
    /// Creates an engine over a resolved schema.
    pub fn new(schema: Schema) -> Self {
        Self::with_options(schema, EngineOptions::default())
    }

    /// Creates an engine with explicit options.
    pub fn with_options(schema: Schema, options: EngineOptions) -> Self {
        let schema = Arc::new(schema);
        let inner = EngineInner {
            store: NodeStore::new(schema.clone()),
            indexes: IndexManager::new(&schema),
            rollups: RollupCache::new(),
            tracker: ChangeTracker::new(),
            schema,
            options,
        };
        debug!("engine created");
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Creates an engine from the schema's JSON form.
    pub fn from_schema_json(payload: &str) -> Result<Self> {
        let schema = crate::schema::from_json(payload)?;
        Ok(Self::new(schema))
    }

    /// The resolved schema.
    pub fn schema(&self) -> Arc<Schema> {
        self.inner.read().schema.clone()
    }

    /// Creates an empty node of the named type.
    pub fn insert(&self, type_name: &str) -> Result<NodeId> {
        let mut inner = self.inner.write();
        let (id, event) = inner.store.insert(type_name).map_err(Error::from)?;
        inner.settle(vec![event]);
        Ok(id)
    }

    /// Writes a partial property map; null values unset.
    pub fn update<I, S>(&self, id: NodeId, props: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let props: Vec<(String, Value)> = props
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();
        let mut inner = self.inner.write();
        let events = inner.store.update(id, &props).map_err(Error::from)?;
        inner.settle(events);
        Ok(())
    }

    /// Deletes a node, unlinking every connection first.
    pub fn delete(&self, id: NodeId) -> Result<()> {
        let mut inner = self.inner.write();
        let events = inner.store.delete(id).map_err(Error::from)?;
        inner.settle(events);
        Ok(())
    }

    /// Connects `source --edge--> target` (both directions).
    pub fn link(&self, source: NodeId, edge: &str, target: NodeId) -> Result<()> {
        let mut inner = self.inner.write();
        let event = inner.store.link(source, edge, target).map_err(Error::from)?;
        if let Some(event) = event {
            inner.settle(vec![event]);
        }
        Ok(())
    }

    /// Disconnects `source --edge--> target` (both directions).
    pub fn unlink(&self, source: NodeId, edge: &str, target: NodeId) -> Result<()> {
        let mut inner = self.inner.write();
        let event = inner
            .store
            .unlink(source, edge, target)
            .map_err(Error::from)?;
        if let Some(event) = event {
            inner.settle(vec![event]);
        }
        Ok(())
    }

    /// Snapshot of a node's current state.
    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.inner.read().store.get(id).cloned()
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.inner.read().store.count()
    }

    /// Forward target list of an edge, in list order.
    pub fn neighbors(&self, id: NodeId, edge: &str) -> Result<Vec<NodeId>> {
        let inner = self.inner.read();
        let node = inner
            .store
            .get(id)
            .ok_or(crate::error::StoreError::NodeNotFound(id))
            .map_err(Error::from)?;
        let ty = inner.schema.type_of(node.type_id);
        let def = ty
            .edge(edge)
            .ok_or_else(|| crate::error::StoreError::UnknownEdge {
                type_name: ty.name.to_string(),
                edge: edge.to_owned(),
            })
            .map_err(Error::from)?;
        Ok(node.targets(def.id).to_vec())
    }

    /// Runs a query once, returning the materialised item tree.
    pub fn execute(&self, query: &Query) -> Result<Vec<query::Item>> {
        let inner = self.inner.read();
        let compiled = query::compile(&inner.schema, &inner.indexes, query)?;
        Ok(query::executor::execute(inner.ctx(), &compiled))
    }

    /// Opens a live view over a query. The view stays consistent with every
    /// subsequent mutation until dropped.
    pub fn view(&self, query: &Query, options: ViewOptions) -> Result<View> {
        let inner = self.inner.read();
        let compiled = query::compile(&inner.schema, &inner.indexes, query)?;
        let mut options = options;
        if options.limit == usize::MAX {
            options.limit = inner.options.default_view_limit;
        }
        let core = Arc::new(Mutex::new(ViewCore::new(compiled, options)));
        inner.tracker.register(&core);
        drop(inner);
        Ok(View {
            core,
            engine: self.clone(),
        })
    }

    /// Opens a live view from the query's JSON form.
    pub fn view_from_json(&self, payload: &str, options: ViewOptions) -> Result<View> {
        let query = query::from_json(payload)?;
        self.view(&query, options)
    }

    /// Counter snapshot over live state.
    pub fn stats(&self) -> EngineStats {
        let inner = self.inner.read();
        EngineStats {
            nodes: inner.store.count(),
            index_entries: inner.indexes.entry_count(),
            rollup_entries: inner.rollups.len(),
            views: inner.tracker.subscriber_count(),
            interned_strings: inner.schema.interned_strings(),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("nodes", &self.node_count())
            .finish()
    }
}

/// A live, scrollable hierarchical view.
///
/// Dropping the view detaches its subscription.
pub struct View {
    core: Arc<Mutex<ViewCore>>,
    engine: Engine,
}

impl View {
    /// Materialises the root selection. With `load_nested_existing`, every
    /// declared selection is expanded over existing data transitively.
    pub fn activate(&self, load_nested_existing: bool) {
        let inner = self.engine.inner.read();
        self.core.lock().activate(inner.ctx(), load_nested_existing);
    }

    /// Registers the enter/leave hooks.
    pub fn set_callbacks(&self, callbacks: ViewCallbacks) {
        self.core.lock().set_callbacks(callbacks);
    }

    /// Expands an edge beneath the first visible instance of `id`.
    pub fn expand_by_id(&self, id: NodeId, edge: &str) -> bool {
        let inner = self.engine.inner.read();
        self.core.lock().expand_by_id(inner.ctx(), id, edge)
    }

    /// Collapses an edge beneath the first visible instance of `id`.
    pub fn collapse_by_id(&self, id: NodeId, edge: &str) -> bool {
        let inner = self.engine.inner.read();
        self.core.lock().collapse_by_id(inner.ctx(), id, edge)
    }

    /// Whether the named edge is expanded on the first instance of `id`.
    pub fn is_expanded(&self, id: NodeId, edge: &str) -> bool {
        self.core.lock().is_expanded(id, edge)
    }

    /// Visible indentation depth of `id`, when instantiated.
    pub fn visible_depth_of(&self, id: NodeId) -> Option<usize> {
        self.core.lock().visible_depth_of(id)
    }

    /// Items within the viewport window, in visible order.
    pub fn items(&self) -> Vec<ViewItem> {
        self.core.lock().items()
    }

    /// Visible length of the full sequence.
    pub fn total(&self) -> usize {
        self.core.lock().total()
    }

    /// Moves the window start, clamped to `[0, total - limit]`.
    pub fn scroll_to(&self, offset: usize) {
        self.core.lock().scroll_to(offset);
    }

    /// Relative scroll.
    pub fn move_by(&self, delta: isize) {
        self.core.lock().move_by(delta);
    }

    /// Current window start.
    pub fn get_offset(&self) -> usize {
        self.core.lock().offset()
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core.lock();
        f.debug_struct("View")
            .field("total", &core.total())
            .field("offset", &core.offset())
            .finish()
    }
}
