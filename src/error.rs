//! Error types for schema loading, store mutations, and query compilation.
//!
//! Each failure family gets its own enum so callers can match on the layer
//! that rejected the call; [`Error`] wraps all of them for the engine facade.
//! Every variant exposes a machine-readable [`code`](SchemaError::code) used
//! by bindings and tests.

use thiserror::Error;

use crate::model::NodeId;

/// Convenience alias for fallible engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing or resolving a schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The schema payload was not valid JSON.
    #[error("invalid schema JSON: {0}")]
    InvalidJson(String),
    /// A required field was absent from the payload.
    #[error("missing field '{field}' in {context}")]
    MissingField {
        /// Name of the absent field.
        field: String,
        /// Where the field was expected (type, edge, rollup, ...).
        context: String,
    },
    /// A property declared a type outside `string|int|number|bool`.
    #[error("property '{type_name}.{property}' has invalid type '{declared}'")]
    InvalidPropertyType {
        /// Declaring type.
        type_name: String,
        /// Offending property.
        property: String,
        /// The unrecognised type string.
        declared: String,
    },
    /// An edge definition failed resolution.
    #[error("invalid edge '{type_name}.{edge}': {reason}")]
    InvalidEdgeDefinition {
        /// Declaring type.
        type_name: String,
        /// Offending edge.
        edge: String,
        /// Human-readable cause.
        reason: String,
    },
    /// A rollup definition failed resolution.
    #[error("invalid rollup '{type_name}.{rollup}': {reason}")]
    InvalidRollupDefinition {
        /// Declaring type.
        type_name: String,
        /// Offending rollup.
        rollup: String,
        /// Human-readable cause.
        reason: String,
    },
    /// An index definition failed resolution.
    #[error("invalid index on '{type_name}': {reason}")]
    InvalidIndexDefinition {
        /// Declaring type.
        type_name: String,
        /// Human-readable cause.
        reason: String,
    },
    /// An edge's declared reverse does not exist or does not pair back.
    #[error("edge '{type_name}.{edge}' has no mutual reverse '{reverse}' on '{target}'")]
    MissingReverseEdge {
        /// Declaring type.
        type_name: String,
        /// Forward edge name.
        edge: String,
        /// Expected reverse edge name.
        reverse: String,
        /// Target type that should declare the reverse.
        target: String,
    },
    /// Two declarations within one type share a name.
    #[error("duplicate name '{name}' in type '{type_name}'")]
    DuplicateName {
        /// Declaring type.
        type_name: String,
        /// The colliding identifier.
        name: String,
    },
}

impl SchemaError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::InvalidJson(_) => "InvalidJson",
            SchemaError::MissingField { .. } => "MissingField",
            SchemaError::InvalidPropertyType { .. } => "InvalidPropertyType",
            SchemaError::InvalidEdgeDefinition { .. } => "InvalidEdgeDefinition",
            SchemaError::InvalidRollupDefinition { .. } => "InvalidRollupDefinition",
            SchemaError::InvalidIndexDefinition { .. } => "InvalidIndexDefinition",
            SchemaError::MissingReverseEdge { .. } => "MissingReverseEdge",
            SchemaError::DuplicateName { .. } => "DuplicateName",
        }
    }
}

/// Errors raised by store mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The referenced node does not exist.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    /// The target of a link does not exist.
    #[error("edge target {0} not found")]
    EdgeTargetNotFound(NodeId),
    /// The named type is not declared in the schema.
    #[error("unknown type '{0}'")]
    UnknownType(String),
    /// The named edge is not declared on the source's type.
    #[error("unknown edge '{edge}' on type '{type_name}'")]
    UnknownEdge {
        /// Source node's type.
        type_name: String,
        /// Requested edge name.
        edge: String,
    },
    /// The named property is not declared on the node's type.
    #[error("unknown property '{property}' on type '{type_name}'")]
    UnknownProperty {
        /// Node's type.
        type_name: String,
        /// Requested property name.
        property: String,
    },
    /// A written value does not match the property's declared type.
    #[error("property '{type_name}.{property}' expects {expected}")]
    InvalidPropertyType {
        /// Node's type.
        type_name: String,
        /// Property being written.
        property: String,
        /// Declared scalar type.
        expected: &'static str,
    },
    /// A link target's type does not match the edge's declared target type.
    #[error("edge '{edge}' expects target type '{expected}', node {target} is '{actual}'")]
    TypeMismatch {
        /// Edge being linked.
        edge: String,
        /// Declared target type.
        expected: String,
        /// Actual type of the offered target.
        actual: String,
        /// The offered target node.
        target: NodeId,
    },
}

impl StoreError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NodeNotFound(_) => "NodeNotFound",
            StoreError::EdgeTargetNotFound(_) => "EdgeTargetNotFound",
            StoreError::UnknownType(_) => "UnknownType",
            StoreError::UnknownEdge { .. } => "UnknownEdge",
            StoreError::UnknownProperty { .. } => "UnknownProperty",
            StoreError::InvalidPropertyType { .. } => "InvalidPropertyType",
            StoreError::TypeMismatch { .. } => "TypeMismatch",
        }
    }
}

/// Errors raised while compiling or executing a query.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The query payload was not valid JSON.
    #[error("invalid query JSON: {0}")]
    InvalidJson(String),
    /// The root type name is not declared.
    #[error("unknown type '{0}'")]
    UnknownType(String),
    /// A filter or sort referenced an undeclared property or rollup.
    #[error("unknown property '{property}' on type '{type_name}'")]
    UnknownProperty {
        /// Type the path segment resolved against.
        type_name: String,
        /// The unresolvable field name.
        property: String,
    },
    /// A path or selection referenced an undeclared edge.
    #[error("unknown edge '{edge}' on type '{type_name}'")]
    UnknownEdge {
        /// Type the segment resolved against.
        type_name: String,
        /// The unresolvable edge name.
        edge: String,
    },
    /// A filter literal cannot be compared against the resolved field.
    #[error("filter on '{type_name}.{field}' has incompatible literal")]
    TypeMismatch {
        /// Type owning the field.
        type_name: String,
        /// The filtered field.
        field: String,
    },
    /// No declared index can satisfy the query shape at all.
    #[error("no index on '{type_name}' can serve this query")]
    NoSuitableIndex {
        /// Root or edge-target type missing an index.
        type_name: String,
    },
    /// Indexes exist but none covers the requested sort order.
    #[error("no index on '{type_name}' covers sort order")]
    NoIndexCoverage {
        /// Root or edge-target type whose sorts are uncovered.
        type_name: String,
    },
}

impl QueryError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::InvalidJson(_) => "InvalidJson",
            QueryError::UnknownType(_) => "UnknownType",
            QueryError::UnknownProperty { .. } => "UnknownProperty",
            QueryError::UnknownEdge { .. } => "UnknownEdge",
            QueryError::TypeMismatch { .. } => "TypeMismatch",
            QueryError::NoSuitableIndex { .. } => "NoSuitableIndex",
            QueryError::NoIndexCoverage { .. } => "NoIndexCoverage",
        }
    }
}

/// Top-level error wrapping every failure family, returned by the engine
/// facade.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Schema loading or resolution failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A store mutation failed; the store is observably unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Query compilation or execution failed; the store is untouched.
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl Error {
    /// Returns the wrapped variant's machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Schema(e) => e.code(),
            Error::Store(e) => e.code(),
            Error::Query(e) => e.code(),
        }
    }
}
