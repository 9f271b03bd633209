//! User-facing query model.
//!
//! A [`Query`] names a root type and describes a tree of edge selections to
//! materialise beneath each root item, with per-level filters and sorts.
//! Strings are plain owned `String`s here; compilation resolves them against
//! the schema's interned identifiers, so queries built from serialised input
//! never borrow from the schema.

use crate::model::{NodeId, Value};
use crate::schema::Direction;

/// Comparison operator in a [`Filter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Member of a literal set.
    In,
}

/// A predicate over a field reached through a path.
///
/// All but the last path segment are edge names, each traversed to the
/// first target; the last segment is a property or rollup. An unset value
/// (or a broken hop) compares as [`Value::Null`].
#[derive(Clone, Debug)]
pub struct Filter {
    /// Non-empty field path.
    pub path: Vec<String>,
    /// Comparison operator.
    pub op: FilterOp,
    /// Comparison literal (unused for `In`).
    pub value: Value,
    /// Literal set for `In`.
    pub values: Option<Vec<Value>>,
}

impl Filter {
    /// Single-segment comparison against a literal.
    pub fn cmp(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            path: vec![field.into()],
            op,
            value: value.into(),
            values: None,
        }
    }
}

/// A requested ordering: a property or rollup name plus direction.
#[derive(Clone, Debug)]
pub struct Sort {
    /// Property or rollup name on the sorted type.
    pub field: String,
    /// Sort direction.
    pub direction: Direction,
}

impl Sort {
    /// Ascending sort on a field.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    /// Descending sort on a field.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// One edge to follow beneath a parent item.
#[derive(Clone, Debug, Default)]
pub struct EdgeSelection {
    /// Edge name on the parent's type.
    pub name: String,
    /// Whether the selection re-applies itself beneath each child.
    pub recursive: bool,
    /// Whether traversed nodes are hidden hops: they never appear in a
    /// view's visible sequence, their expanded children surface beneath the
    /// nearest visible ancestor.
    pub virtual_: bool,
    /// Filters applied to each candidate target.
    pub filters: Vec<Filter>,
    /// Target ordering; requires a covering edge-prefixed index.
    pub sorts: Vec<Sort>,
    /// Selections applied beneath each materialised child.
    pub edges: Vec<EdgeSelection>,
}

impl EdgeSelection {
    /// A plain selection of the named edge.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A declarative tree-shaped query.
#[derive(Clone, Debug, Default)]
pub struct Query {
    /// Root type name.
    pub root_type: String,
    /// Direct root lookup, bypassing index selection.
    pub root_id: Option<NodeId>,
    /// Whether root items are hidden hops (see [`EdgeSelection::virtual_`]).
    pub virtual_: bool,
    /// Filters applied to each candidate root.
    pub filters: Vec<Filter>,
    /// Root ordering; requires a covering index.
    pub sorts: Vec<Sort>,
    /// Selections applied beneath each root item.
    pub edges: Vec<EdgeSelection>,
}

impl Query {
    /// A query over every node of `root_type`.
    pub fn over(root_type: impl Into<String>) -> Self {
        Self {
            root_type: root_type.into(),
            ..Default::default()
        }
    }
}
