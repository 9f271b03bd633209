//! Query model, compilation, and execution.

pub mod ast;
pub mod executor;
mod json;
pub mod validate;

pub use ast::{EdgeSelection, Filter, FilterOp, Query, Sort};
pub use executor::{EdgeResult, EdgeResultKind, Item, Path, PathSegment, ReadCtx};
pub use json::from_json;
pub use validate::{compile, CompiledQuery, CompiledSelection, FieldRef, SelId};
