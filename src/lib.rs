//! # Canopy - Embeddable Graph Database with Live Hierarchical Views
//!
//! Canopy is an in-process graph database: declare a typed schema (entities,
//! properties, bidirectional edges, derived rollups, covering indexes),
//! mutate the graph, and open **reactive views**: declarative tree-shaped
//! queries that stay consistent as the graph changes, expose a stable linear
//! ordering of visible items, support expand/collapse and a sliding
//! viewport, and report incremental changes through enter/leave callbacks.
//!
//! ## Quick Start
//!
//! ```rust
//! use canopy::{Engine, Query, Sort, ViewOptions};
//!
//! let engine = Engine::from_schema_json(
//!     r#"{ "types": [
//!       { "name": "Task",
//!         "properties": [ { "name": "title", "type": "string" } ],
//!         "indexes": [ { "fields": [ { "field": "title" } ] } ] }
//!     ] }"#,
//! )?;
//!
//! let a = engine.insert("Task")?;
//! engine.update(a, [("title", "write docs".into())])?;
//!
//! let mut query = Query::over("Task");
//! query.sorts.push(Sort::asc("title"));
//! let view = engine.view(&query, ViewOptions::default())?;
//! view.activate(false);
//! assert_eq!(view.total(), 1);
//! # Ok::<(), canopy::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - **Store layer**: typed nodes with bidirectional, optionally sorted
//!   edge lists; every mutation validates fully before writing.
//! - **Mirror layer**: composite indexes and the rollup cache, recomputed
//!   synchronously from store events.
//! - **Query layer**: validation against the schema, index-ordered
//!   execution (never an in-memory sort).
//! - **View layer**: per-subscription result mirrors and the reactive tree
//!   with its flattened visible ordering and windowed viewport.
//!
//! Everything is single-threaded and cooperative: a mutation returns only
//! after every live view has observed it.

pub mod engine;
pub mod error;
pub mod index;
pub mod logging;
pub mod model;
pub mod query;
pub mod rollup;
pub mod schema;
pub mod store;
pub mod tracker;
pub mod view;

// Re-export the main public API
pub use crate::engine::{Engine, EngineOptions, EngineStats, View};
pub use crate::error::{Error, QueryError, Result, SchemaError, StoreError};
pub use crate::model::{EdgeId, Name, Node, NodeId, TypeId, Value, NULL_NODE_ID};
pub use crate::query::{EdgeSelection, Filter, FilterOp, Item, Query, Sort};
pub use crate::schema::{Direction, Schema};
pub use crate::view::{ViewCallback, ViewCallbacks, ViewItem, ViewOptions};
