//! Query compilation: name resolution and index coverage enforcement.
//!
//! Compilation resolves every name in a [`Query`] against the schema,
//! type-checks filter literals, and locks in the covering index for the root
//! and for every sorted edge selection. The result is a [`CompiledQuery`]
//! whose selection tree is flattened into an arena so recursive selections
//! can reference themselves without ownership cycles.

use smallvec::SmallVec;

use super::ast::{EdgeSelection, Filter, FilterOp, Query, Sort};
use crate::error::QueryError;
use crate::index::{Coverage, IndexManager};
use crate::model::{EdgeId, Name, NodeId, TypeId, Value};
use crate::schema::{Direction, Schema, TypeDef};

/// Identifier of a compiled selection within its query's arena.
pub type SelId = u16;

/// A resolved field reference: the terminal segment of a filter path or a
/// sort field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldRef {
    /// A declared property.
    Property(Name),
    /// A declared rollup.
    Rollup(Name),
}

impl FieldRef {
    /// The referenced name.
    pub fn name(&self) -> &Name {
        match self {
            FieldRef::Property(n) | FieldRef::Rollup(n) => n,
        }
    }
}

/// A filter with every path segment resolved.
#[derive(Clone, Debug)]
pub struct CompiledFilter {
    /// Intermediate edges, each traversed to the first target.
    pub hops: SmallVec<[EdgeId; 2]>,
    /// Reverse edge of each hop, in hop order. Subscriptions walk these
    /// backwards to find nodes whose filter value a mutation may have
    /// changed.
    pub reverse_hops: SmallVec<[EdgeId; 2]>,
    /// Type the terminal field lives on.
    pub terminal_type: TypeId,
    /// Terminal field on the path's final type.
    pub field: FieldRef,
    /// Comparison operator.
    pub op: FilterOp,
    /// Comparison literal.
    pub value: Value,
    /// Literal set for `In` (empty otherwise).
    pub values: Vec<Value>,
}

/// A resolved sort.
#[derive(Clone, Debug)]
pub struct CompiledSort {
    /// Property or rollup name.
    pub field: Name,
    /// Sort direction.
    pub direction: Direction,
}

/// A resolved edge selection.
#[derive(Clone, Debug)]
pub struct CompiledSelection {
    /// Edge on the parent type.
    pub edge: EdgeId,
    /// Edge name (interned).
    pub edge_name: Name,
    /// Type declaring the edge.
    pub parent_type: TypeId,
    /// Type the edge targets.
    pub target_type: TypeId,
    /// The mutual reverse edge on the target type.
    pub reverse_edge: EdgeId,
    /// Whether the selection re-applies itself beneath each child.
    pub recursive: bool,
    /// Whether traversed nodes are hidden hops.
    pub virtual_: bool,
    /// Filters applied to each candidate target.
    pub filters: Vec<CompiledFilter>,
    /// Requested target ordering.
    pub sorts: Vec<CompiledSort>,
    /// Covering edge-prefixed index; present iff sorts are present.
    pub coverage: Option<Coverage>,
    /// Child selections, including this selection's own id when recursive.
    pub children: Vec<SelId>,
}

/// A fully resolved query, ready for execution and subscriptions.
#[derive(Clone, Debug)]
pub struct CompiledQuery {
    /// Resolved root type.
    pub root_type: TypeId,
    /// Direct root lookup, bypassing the index scan.
    pub root_id: Option<NodeId>,
    /// Whether root items are hidden hops.
    pub virtual_root: bool,
    /// Root filters.
    pub filters: Vec<CompiledFilter>,
    /// Root sorts.
    pub sorts: Vec<CompiledSort>,
    /// Covering root index; absent only for direct lookups.
    pub coverage: Option<Coverage>,
    /// Selections beneath each root item.
    pub top: Vec<SelId>,
    /// Flattened selection arena.
    pub sels: Vec<CompiledSelection>,
}

impl CompiledQuery {
    /// The selection stored at `id`.
    pub fn sel(&self, id: SelId) -> &CompiledSelection {
        &self.sels[id as usize]
    }
}

/// Resolves a query against the schema, enforcing index coverage.
pub fn compile(
    schema: &Schema,
    indexes: &IndexManager,
    query: &Query,
) -> Result<CompiledQuery, QueryError> {
    let root_type = schema
        .type_id(&query.root_type)
        .ok_or_else(|| QueryError::UnknownType(query.root_type.clone()))?;
    let ty = schema.type_of(root_type);

    let filters = compile_filters(schema, ty, &query.filters)?;
    let sorts = compile_sorts(ty, &query.sorts)?;

    let coverage = if query.root_id.is_some() {
        None
    } else {
        Some(root_coverage(indexes, ty, &filters, &sorts)?)
    };

    let mut sels = Vec::new();
    let top = compile_selections(schema, indexes, root_type, &query.edges, &mut sels)?;

    Ok(CompiledQuery {
        root_type,
        root_id: query.root_id,
        virtual_root: query.virtual_,
        filters,
        sorts,
        coverage,
        top,
        sels,
    })
}

fn compile_selections(
    schema: &Schema,
    indexes: &IndexManager,
    parent_type: TypeId,
    selections: &[EdgeSelection],
    sels: &mut Vec<CompiledSelection>,
) -> Result<Vec<SelId>, QueryError> {
    selections
        .iter()
        .map(|sel| compile_selection(schema, indexes, parent_type, sel, sels))
        .collect()
}

fn compile_selection(
    schema: &Schema,
    indexes: &IndexManager,
    parent_type: TypeId,
    sel: &EdgeSelection,
    sels: &mut Vec<CompiledSelection>,
) -> Result<SelId, QueryError> {
    let parent = schema.type_of(parent_type);
    let edge = parent
        .edge(&sel.name)
        .ok_or_else(|| QueryError::UnknownEdge {
            type_name: parent.name.to_string(),
            edge: sel.name.clone(),
        })?;
    let target = schema.type_of(edge.target_type);

    let filters = compile_filters(schema, target, &sel.filters)?;
    let sorts = compile_sorts(target, &sel.sorts)?;
    let coverage = if sorts.is_empty() {
        None
    } else {
        Some(nested_coverage(
            indexes,
            target,
            edge.reverse_edge,
            &filters,
            &sorts,
        )?)
    };

    // Reserve the arena slot before descending so a recursive selection can
    // include itself in its child list.
    let id = sels.len() as SelId;
    sels.push(CompiledSelection {
        edge: edge.id,
        edge_name: edge.name.clone(),
        parent_type,
        target_type: edge.target_type,
        reverse_edge: edge.reverse_edge,
        recursive: sel.recursive,
        virtual_: sel.virtual_,
        filters,
        sorts,
        coverage,
        children: Vec::new(),
    });

    let mut children =
        compile_selections(schema, indexes, edge.target_type, &sel.edges, sels)?;
    if sel.recursive {
        children.push(id);
    }
    sels[id as usize].children = children;
    Ok(id)
}

fn compile_filters(
    schema: &Schema,
    ty: &TypeDef,
    filters: &[Filter],
) -> Result<Vec<CompiledFilter>, QueryError> {
    filters
        .iter()
        .map(|f| compile_filter(schema, ty, f))
        .collect()
}

fn compile_filter(
    schema: &Schema,
    ty: &TypeDef,
    filter: &Filter,
) -> Result<CompiledFilter, QueryError> {
    let Some((terminal, hops_path)) = filter.path.split_last() else {
        return Err(QueryError::UnknownProperty {
            type_name: ty.name.to_string(),
            property: String::new(),
        });
    };

    let mut current = ty;
    let mut hops: SmallVec<[EdgeId; 2]> = SmallVec::new();
    let mut reverse_hops: SmallVec<[EdgeId; 2]> = SmallVec::new();
    for segment in hops_path {
        let edge = current
            .edge(segment)
            .ok_or_else(|| QueryError::UnknownEdge {
                type_name: current.name.to_string(),
                edge: segment.clone(),
            })?;
        hops.push(edge.id);
        reverse_hops.push(edge.reverse_edge);
        current = schema.type_of(edge.target_type);
    }

    let field = if let Some(prop) = current.property(terminal) {
        // Literal compatibility: null always compares, otherwise the
        // declared scalar type must accept the literal.
        let check = |v: &Value| v.is_null() || prop.ty.accepts(v);
        let ok = match filter.op {
            FilterOp::In => filter
                .values
                .as_ref()
                .is_some_and(|vs| vs.iter().all(check)),
            _ => check(&filter.value),
        };
        if !ok {
            return Err(QueryError::TypeMismatch {
                type_name: current.name.to_string(),
                field: terminal.clone(),
            });
        }
        FieldRef::Property(prop.name.clone())
    } else if let Some((_, rollup)) = current.rollup(terminal) {
        if filter.op == FilterOp::In && filter.values.is_none() {
            return Err(QueryError::TypeMismatch {
                type_name: current.name.to_string(),
                field: terminal.clone(),
            });
        }
        FieldRef::Rollup(rollup.name.clone())
    } else {
        return Err(QueryError::UnknownProperty {
            type_name: current.name.to_string(),
            property: terminal.clone(),
        });
    };

    Ok(CompiledFilter {
        hops,
        reverse_hops,
        terminal_type: current.id,
        field,
        op: filter.op,
        value: filter.value.clone(),
        values: filter.values.clone().unwrap_or_default(),
    })
}

fn compile_sorts(ty: &TypeDef, sorts: &[Sort]) -> Result<Vec<CompiledSort>, QueryError> {
    sorts
        .iter()
        .map(|sort| {
            let field = if let Some(prop) = ty.property(&sort.field) {
                prop.name.clone()
            } else if let Some((_, rollup)) = ty.rollup(&sort.field) {
                rollup.name.clone()
            } else {
                return Err(QueryError::UnknownProperty {
                    type_name: ty.name.to_string(),
                    property: sort.field.clone(),
                });
            };
            Ok(CompiledSort {
                field,
                direction: sort.direction,
            })
        })
        .collect()
}

/// Single-segment equality filters usable as an index prefix.
fn eq_probes<'a>(filters: &'a [CompiledFilter]) -> Vec<(usize, &'a str, &'a Value)> {
    filters
        .iter()
        .enumerate()
        .filter(|(_, f)| f.hops.is_empty() && f.op == FilterOp::Eq)
        .map(|(i, f)| (i, &**f.field.name(), &f.value))
        .collect()
}

fn sort_reqs(sorts: &[CompiledSort]) -> Vec<(&str, Direction)> {
    sorts.iter().map(|s| (&*s.field, s.direction)).collect()
}

fn root_coverage(
    indexes: &IndexManager,
    ty: &TypeDef,
    filters: &[CompiledFilter],
    sorts: &[CompiledSort],
) -> Result<Coverage, QueryError> {
    if ty.indexes.is_empty() {
        return Err(QueryError::NoSuitableIndex {
            type_name: ty.name.to_string(),
        });
    }
    indexes
        .select_index(ty, &eq_probes(filters), &sort_reqs(sorts))
        .ok_or_else(|| QueryError::NoIndexCoverage {
            type_name: ty.name.to_string(),
        })
}

fn nested_coverage(
    indexes: &IndexManager,
    target: &TypeDef,
    reverse_edge: EdgeId,
    filters: &[CompiledFilter],
    sorts: &[CompiledSort],
) -> Result<Coverage, QueryError> {
    if !target
        .indexes
        .iter()
        .any(|def| def.edge_prefixed_by(reverse_edge))
    {
        return Err(QueryError::NoSuitableIndex {
            type_name: target.name.to_string(),
        });
    }
    indexes
        .select_nested_index(target, reverse_edge, &eq_probes(filters), &sort_reqs(sorts))
        .ok_or_else(|| QueryError::NoIndexCoverage {
            type_name: target.name.to_string(),
        })
}
