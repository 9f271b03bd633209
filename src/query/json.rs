//! JSON surface for queries.
//!
//! Mirrors the schema JSON conventions: unknown keys are tolerated,
//! malformed shapes surface as [`QueryError::InvalidJson`]. Literals are
//! duplicated into the query's own storage, so the parsed [`Query`] owns
//! every string it holds.

use serde::Deserialize;

use super::ast::{EdgeSelection, Filter, FilterOp, Query, Sort};
use crate::error::QueryError;
use crate::model::{NodeId, Value};
use crate::schema::Direction;

#[derive(Deserialize)]
struct QueryDoc {
    root: String,
    #[serde(default)]
    id: Option<NodeId>,
    #[serde(default, rename = "virtual")]
    virtual_: bool,
    #[serde(default)]
    sort: Vec<SortDoc>,
    #[serde(default)]
    filter: Vec<FilterDoc>,
    #[serde(default)]
    edges: Vec<EdgeDoc>,
}

#[derive(Deserialize)]
struct EdgeDoc {
    name: String,
    #[serde(default)]
    recursive: bool,
    #[serde(default, rename = "virtual")]
    virtual_: bool,
    #[serde(default)]
    sort: Vec<SortDoc>,
    #[serde(default)]
    filter: Vec<FilterDoc>,
    #[serde(default)]
    edges: Vec<EdgeDoc>,
}

#[derive(Deserialize)]
struct SortDoc {
    field: String,
    #[serde(default)]
    direction: Direction,
}

#[derive(Deserialize)]
struct FilterDoc {
    field: String,
    op: String,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    values: Option<Vec<Value>>,
}

/// Parses a query from its JSON form.
pub fn from_json(payload: &str) -> Result<Query, QueryError> {
    let doc: QueryDoc =
        serde_json::from_str(payload).map_err(|e| QueryError::InvalidJson(e.to_string()))?;
    Ok(Query {
        root_type: doc.root,
        root_id: doc.id,
        virtual_: doc.virtual_,
        filters: filters(doc.filter)?,
        sorts: sorts(doc.sort),
        edges: edges(doc.edges)?,
    })
}

fn edges(docs: Vec<EdgeDoc>) -> Result<Vec<EdgeSelection>, QueryError> {
    docs.into_iter()
        .map(|doc| {
            Ok(EdgeSelection {
                name: doc.name,
                recursive: doc.recursive,
                virtual_: doc.virtual_,
                filters: filters(doc.filter)?,
                sorts: sorts(doc.sort),
                edges: edges(doc.edges)?,
            })
        })
        .collect()
}

fn sorts(docs: Vec<SortDoc>) -> Vec<Sort> {
    docs.into_iter()
        .map(|doc| Sort {
            field: doc.field,
            direction: doc.direction,
        })
        .collect()
}

fn filters(docs: Vec<FilterDoc>) -> Result<Vec<Filter>, QueryError> {
    docs.into_iter()
        .map(|doc| {
            let op = match doc.op.as_str() {
                "eq" => FilterOp::Eq,
                "neq" => FilterOp::Neq,
                "gt" => FilterOp::Gt,
                "gte" => FilterOp::Gte,
                "lt" => FilterOp::Lt,
                "lte" => FilterOp::Lte,
                "in" => FilterOp::In,
                other => {
                    return Err(QueryError::InvalidJson(format!(
                        "unknown filter op '{other}'"
                    )))
                }
            };
            // Dotted paths traverse edges: "author.name".
            let path = doc.field.split('.').map(str::to_owned).collect();
            Ok(Filter {
                path,
                op,
                value: doc.value,
                values: doc.values,
            })
        })
        .collect()
}
