//! JSON surface for schema declarations.
//!
//! The document shape is `{ "types": [ ... ] }`; unknown keys are tolerated,
//! unrecognised shapes surface as [`SchemaError`] variants.

use serde::Deserialize;

use super::{Schema, TypeSpec};
use crate::error::SchemaError;

#[derive(Deserialize)]
struct SchemaDoc {
    types: Vec<TypeSpec>,
}

/// Parses and resolves a schema from its JSON form.
pub fn from_json(payload: &str) -> Result<Schema, SchemaError> {
    let doc: SchemaDoc = serde_json::from_str(payload).map_err(classify)?;
    Schema::build(doc.types)
}

fn classify(err: serde_json::Error) -> SchemaError {
    let message = err.to_string();
    if message.contains("missing field") {
        // serde reports `missing field `name` at line ...`; keep the field.
        let field = message
            .split('`')
            .nth(1)
            .map(str::to_owned)
            .unwrap_or_default();
        return SchemaError::MissingField {
            field,
            context: "schema document".into(),
        };
    }
    SchemaError::InvalidJson(message)
}
