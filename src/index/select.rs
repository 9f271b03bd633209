//! Index selection: choosing the declared index that serves a query shape.
//!
//! Selection binds leading key positions to equality filters, then requires
//! the following positions to cover every requested sort in order and
//! direction. Among viable candidates the one consuming the most filters
//! wins (fewest post-filters, tightest equality prefix), ties broken by
//! declaration order.

use crate::model::{EdgeId, Value};
use crate::schema::{Direction, FieldSource, IndexDef, TypeDef};

/// How a chosen index serves a query.
#[derive(Clone, Debug, PartialEq)]
pub struct Coverage {
    /// Declaration position of the index within its type.
    pub index_pos: u16,
    /// Values bound to the leading key positions; the scan restricts to
    /// entries matching this prefix.
    pub eq_prefix: Vec<Value>,
    /// Positions (into the caller's filter list) consumed by the prefix;
    /// everything else must be re-checked per scanned node.
    pub consumed_filters: Vec<usize>,
    /// Leading sorts covered by the index, in matching order and direction.
    /// Selection only returns coverage when this equals the sort count.
    pub sort_prefix: usize,
}

/// Chooses an index for a root query over `ty`.
///
/// `eq_filters` carries the single-segment equality filters as
/// `(caller position, field name, literal)`; `sorts` the requested
/// `(field, direction)` pairs. Returns `None` when no index covers every
/// sort.
pub fn select_index(
    ty: &TypeDef,
    eq_filters: &[(usize, &str, &Value)],
    sorts: &[(&str, Direction)],
) -> Option<Coverage> {
    best(ty.indexes.iter().enumerate(), 0, eq_filters, sorts)
}

/// Chooses an edge-prefixed index for traversing into `target_ty` in target
/// order: only indexes whose leading field is `reverse_edge` qualify, and
/// binding starts after that edge position.
pub fn select_nested_index(
    target_ty: &TypeDef,
    reverse_edge: EdgeId,
    eq_filters: &[(usize, &str, &Value)],
    sorts: &[(&str, Direction)],
) -> Option<Coverage> {
    let candidates = target_ty
        .indexes
        .iter()
        .enumerate()
        .filter(|(_, def)| def.edge_prefixed_by(reverse_edge));
    best(candidates, 1, eq_filters, sorts)
}

fn best<'a>(
    candidates: impl Iterator<Item = (usize, &'a IndexDef)>,
    skip: usize,
    eq_filters: &[(usize, &str, &Value)],
    sorts: &[(&str, Direction)],
) -> Option<Coverage> {
    let mut winner: Option<Coverage> = None;
    for (pos, def) in candidates {
        let Some(coverage) = cover(pos as u16, def, skip, eq_filters, sorts) else {
            continue;
        };
        let better = match &winner {
            None => true,
            Some(current) => coverage.consumed_filters.len() > current.consumed_filters.len(),
        };
        if better {
            winner = Some(coverage);
        }
    }
    winner
}

fn cover(
    index_pos: u16,
    def: &IndexDef,
    skip: usize,
    eq_filters: &[(usize, &str, &Value)],
    sorts: &[(&str, Direction)],
) -> Option<Coverage> {
    let fields = &def.fields[..];
    if fields.len() < skip {
        return None;
    }

    let mut cursor = skip;
    let mut eq_prefix = Vec::new();
    let mut consumed_filters = Vec::new();

    // Greedily bind leading positions to equality filters.
    while cursor < fields.len() {
        let field = &fields[cursor];
        if matches!(field.source, FieldSource::Edge(_)) {
            break;
        }
        let Some(&(caller_pos, _, value)) = eq_filters
            .iter()
            .find(|(p, name, _)| *name == &*field.name && !consumed_filters.contains(p))
        else {
            break;
        };
        eq_prefix.push(value.clone());
        consumed_filters.push(caller_pos);
        cursor += 1;
    }

    // The remaining positions must cover every sort, in order.
    let mut sort_prefix = 0;
    for &(field_name, direction) in sorts {
        let Some(field) = fields.get(cursor) else {
            break;
        };
        if &*field.name != field_name || field.direction != direction {
            break;
        }
        sort_prefix += 1;
        cursor += 1;
    }
    if sort_prefix != sorts.len() {
        return None;
    }

    Some(Coverage {
        index_pos,
        eq_prefix,
        consumed_filters,
        sort_prefix,
    })
}
