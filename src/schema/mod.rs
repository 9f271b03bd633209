//! Typed schema: entities, properties, bidirectional edges, rollups, indexes.
//!
//! A [`Schema`] is built from unresolved [`TypeSpec`]s (parsed from JSON or
//! constructed programmatically), resolving every name to an id and enforcing
//! the load-time invariants: mutual reverse edges, unique identifiers per
//! type, rollup/edge/sort references that exist, and well-formed indexes.
//! Resolution also precomputes the dependency tables the store, index
//! manager, and rollup cache consult on every mutation.

mod interner;
mod json;

use rustc_hash::FxHashMap;
use serde::Deserialize;

pub use interner::StringInterner;
pub use json::from_json;

use crate::error::SchemaError;
use crate::model::{EdgeId, Name, TypeId, Value};

/// Scalar type a property can declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyType {
    /// UTF-8 string.
    String,
    /// Signed 64-bit integer.
    Int,
    /// 64-bit float; also accepts integer literals.
    Number,
    /// Boolean.
    Bool,
}

impl PropertyType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(PropertyType::String),
            "int" => Some(PropertyType::Int),
            "number" => Some(PropertyType::Number),
            "bool" => Some(PropertyType::Bool),
            _ => None,
        }
    }

    /// Display name matching the JSON surface.
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Int => "int",
            PropertyType::Number => "number",
            PropertyType::Bool => "bool",
        }
    }

    /// Whether a non-null value is acceptable for this declared type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (PropertyType::String, Value::String(_)) => true,
            (PropertyType::Int, Value::Int(_)) => true,
            (PropertyType::Number, Value::Int(_) | Value::Number(_)) => true,
            (PropertyType::Bool, Value::Bool(_)) => true,
            _ => false,
        }
    }
}

/// Sort direction for edge sorts, query sorts, and index fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Ascending (the default).
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// A declared property.
#[derive(Clone, Debug)]
pub struct PropertyDef {
    /// Interned property name.
    pub name: Name,
    /// Declared scalar type.
    pub ty: PropertyType,
}

/// Ordering an edge keeps its forward target list in.
#[derive(Clone, Debug)]
pub struct EdgeSort {
    /// Property on the target type the list is ordered by.
    pub property: Name,
    /// Sort direction; ties always break by ascending `NodeId`.
    pub direction: Direction,
}

/// A declared edge, resolved against its target type.
///
/// Every edge is paired with a mutual reverse edge declared on the target
/// type; linking maintains both directions.
#[derive(Clone, Debug)]
pub struct EdgeDef {
    /// Id within the declaring type, assigned by declaration order.
    pub id: EdgeId,
    /// Interned edge name.
    pub name: Name,
    /// Target type name as declared.
    pub target_type_name: Name,
    /// Resolved target type id.
    pub target_type: TypeId,
    /// Name of the mutual reverse edge on the target type.
    pub reverse_name: Name,
    /// Resolved id of the reverse edge on the target type.
    pub reverse_edge: EdgeId,
    /// Optional ordering of the forward target list.
    pub sort: Option<EdgeSort>,
}

/// How a rollup derives its value.
#[derive(Clone, Debug)]
pub enum RollupKind {
    /// Number of targets along an edge.
    Count {
        /// Edge whose target list is counted.
        edge: EdgeId,
    },
    /// A property read off the first target along an edge.
    Traverse {
        /// Edge to hop.
        edge: EdgeId,
        /// Property on the target type.
        property: Name,
    },
    /// Property of the minimal target when ordering targets by `field`.
    First {
        /// Edge whose targets are ranked.
        edge: EdgeId,
        /// Ranking property on the target type.
        field: Name,
        /// Ranking direction.
        direction: Direction,
        /// Property to read off the chosen target; `field` when absent.
        property: Option<Name>,
    },
    /// Property of the maximal target when ordering targets by `field`.
    Last {
        /// Edge whose targets are ranked.
        edge: EdgeId,
        /// Ranking property on the target type.
        field: Name,
        /// Ranking direction.
        direction: Direction,
        /// Property to read off the chosen target; `field` when absent.
        property: Option<Name>,
    },
}

impl RollupKind {
    /// The edge this rollup reads.
    pub fn edge(&self) -> EdgeId {
        match self {
            RollupKind::Count { edge }
            | RollupKind::Traverse { edge, .. }
            | RollupKind::First { edge, .. }
            | RollupKind::Last { edge, .. } => *edge,
        }
    }

    /// Target-type properties this rollup reads, if any.
    fn target_deps(&self) -> impl Iterator<Item = &Name> {
        let (a, b) = match self {
            RollupKind::Count { .. } => (None, None),
            RollupKind::Traverse { property, .. } => (Some(property), None),
            RollupKind::First {
                field, property, ..
            }
            | RollupKind::Last {
                field, property, ..
            } => (Some(field), property.as_ref()),
        };
        a.into_iter().chain(b)
    }
}

/// A declared rollup.
#[derive(Clone, Debug)]
pub struct RollupDef {
    /// Interned rollup name.
    pub name: Name,
    /// Derivation rule.
    pub kind: RollupKind,
}

/// What an index key position reads off a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldSource {
    /// A declared property, by name.
    Property(Name),
    /// A declared rollup, by index into the type's rollup list.
    Rollup(u16),
    /// An edge: the key holds the first target's id along it.
    Edge(EdgeId),
}

/// One key position of a composite index.
#[derive(Clone, Debug)]
pub struct IndexField {
    /// Field name as declared.
    pub name: Name,
    /// Comparison direction at this position.
    pub direction: Direction,
    /// Resolved source of the key value.
    pub source: FieldSource,
}

/// A declared composite index.
#[derive(Clone, Debug)]
pub struct IndexDef {
    /// Ordered key positions.
    pub fields: Vec<IndexField>,
}

impl IndexDef {
    /// True when the leading field is the given edge (edge-prefixed index).
    pub fn edge_prefixed_by(&self, edge: EdgeId) -> bool {
        matches!(self.fields.first(), Some(f) if f.source == FieldSource::Edge(edge))
    }
}

/// One edge on a source type that must react when a target-type property
/// changes.
#[derive(Clone, Copy, Debug)]
pub struct EdgeWatch {
    /// Type declaring the watching edge.
    pub source_type: TypeId,
    /// The watching edge on the source type.
    pub edge: EdgeId,
    /// The reverse edge on the changed node's own type, used to enumerate
    /// affected sources.
    pub reverse: EdgeId,
}

/// A rollup on a source type that must be invalidated when a target-type
/// property changes.
#[derive(Clone, Copy, Debug)]
pub struct RollupWatch {
    /// Type declaring the rollup.
    pub source_type: TypeId,
    /// Edge the rollup reads.
    pub edge: EdgeId,
    /// Reverse edge on the changed node's own type.
    pub reverse: EdgeId,
    /// Index into the source type's rollup list.
    pub rollup: u16,
}

/// Everything that reacts to a change of one property on one type.
#[derive(Clone, Debug, Default)]
pub struct PropWatchers {
    /// Edges (on other types) whose sort reads this property: the changed
    /// node must be repositioned in every linked source's forward list.
    pub resort: Vec<EdgeWatch>,
    /// Rollups (on other types) that read this property through an edge.
    pub rollups: Vec<RollupWatch>,
}

/// A resolved type definition.
#[derive(Debug)]
pub struct TypeDef {
    /// Type id, assigned by declaration order.
    pub id: TypeId,
    /// Interned type name.
    pub name: Name,
    /// Declared properties, in declaration order.
    pub properties: Vec<PropertyDef>,
    /// Declared edges, in declaration order.
    pub edges: Vec<EdgeDef>,
    /// Declared rollups, in declaration order.
    pub rollups: Vec<RollupDef>,
    /// Declared indexes, in declaration order.
    pub indexes: Vec<IndexDef>,
    prop_by_name: FxHashMap<Name, u16>,
    edge_by_name: FxHashMap<Name, EdgeId>,
    rollup_by_name: FxHashMap<Name, u16>,
    /// Per edge id: rollup indices that read that edge.
    edge_rollups: Vec<Vec<u16>>,
    /// Per edge id: index positions with a key field on that edge.
    edge_indexes: Vec<Vec<u16>>,
    /// Per property name: index positions with a key field on it.
    prop_indexes: FxHashMap<Name, Vec<u16>>,
    /// Per rollup index: index positions with a key field on it.
    rollup_indexes: Vec<Vec<u16>>,
}

impl TypeDef {
    /// Looks up a property definition by name.
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.prop_by_name
            .get(name)
            .map(|&i| &self.properties[i as usize])
    }

    /// Looks up an edge definition by name.
    pub fn edge(&self, name: &str) -> Option<&EdgeDef> {
        self.edge_by_name.get(name).map(|&i| &self.edges[i as usize])
    }

    /// Returns the edge definition for a resolved id.
    pub fn edge_def(&self, id: EdgeId) -> &EdgeDef {
        &self.edges[id as usize]
    }

    /// Looks up a rollup by name, returning its index and definition.
    pub fn rollup(&self, name: &str) -> Option<(u16, &RollupDef)> {
        self.rollup_by_name
            .get(name)
            .map(|&i| (i, &self.rollups[i as usize]))
    }

    /// Rollups reading the given edge.
    pub(crate) fn rollups_on_edge(&self, edge: EdgeId) -> &[u16] {
        &self.edge_rollups[edge as usize]
    }

    /// Indexes keyed (in any position) on the given edge.
    pub(crate) fn indexes_on_edge(&self, edge: EdgeId) -> &[u16] {
        &self.edge_indexes[edge as usize]
    }

    /// Indexes keyed on the given property.
    pub(crate) fn indexes_on_property(&self, name: &str) -> &[u16] {
        self.prop_indexes.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Indexes keyed on the given rollup.
    pub(crate) fn indexes_on_rollup(&self, rollup: u16) -> &[u16] {
        &self.rollup_indexes[rollup as usize]
    }
}

/// A fully resolved schema.
#[derive(Debug)]
pub struct Schema {
    types: Vec<TypeDef>,
    by_name: FxHashMap<Name, TypeId>,
    /// Indexed by `TypeId`: watchers keyed by the changed property's name.
    watchers: Vec<FxHashMap<Name, PropWatchers>>,
    interner: StringInterner,
}

impl Schema {
    /// Resolves a list of unresolved type specs into a schema.
    pub fn build(specs: Vec<TypeSpec>) -> Result<Self, SchemaError> {
        resolve(specs)
    }

    /// All declared types, in declaration order.
    pub fn types(&self) -> &[TypeDef] {
        &self.types
    }

    /// Looks up a type id by name.
    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Looks up a type definition by name.
    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.type_id(name).map(|id| &self.types[id as usize])
    }

    /// Returns the type definition for a resolved id.
    pub fn type_of(&self, id: TypeId) -> &TypeDef {
        &self.types[id as usize]
    }

    /// Watchers reacting to a change of `property` on `type_id`.
    pub(crate) fn watchers(&self, type_id: TypeId, property: &str) -> Option<&PropWatchers> {
        self.watchers[type_id as usize].get(property)
    }

    /// Number of distinct identifier strings held by the interner.
    pub fn interned_strings(&self) -> usize {
        self.interner.len()
    }
}

// ---------------------------------------------------------------------------
// Unresolved specs (JSON shape and programmatic construction)
// ---------------------------------------------------------------------------

/// Unresolved type declaration.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TypeSpec {
    /// Type name.
    pub name: String,
    /// Property declarations.
    #[serde(default)]
    pub properties: Vec<PropertySpec>,
    /// Edge declarations.
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    /// Rollup declarations.
    #[serde(default)]
    pub rollups: Vec<RollupSpec>,
    /// Index declarations.
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

/// Unresolved property declaration.
#[derive(Clone, Debug, Deserialize)]
pub struct PropertySpec {
    /// Property name.
    pub name: String,
    /// Scalar type: `string|int|number|bool`.
    #[serde(rename = "type")]
    pub ty: String,
}

/// Unresolved edge sort.
#[derive(Clone, Debug, Deserialize)]
pub struct EdgeSortSpec {
    /// Sort property on the target type.
    pub property: String,
    /// Sort direction.
    #[serde(default)]
    pub direction: Direction,
}

/// Unresolved edge declaration.
#[derive(Clone, Debug, Deserialize)]
pub struct EdgeSpec {
    /// Edge name.
    pub name: String,
    /// Target type name.
    pub target: String,
    /// Reverse edge name on the target type.
    pub reverse: String,
    /// Optional forward-list ordering.
    #[serde(default)]
    pub sort: Option<EdgeSortSpec>,
}

/// Unresolved traverse rollup payload.
#[derive(Clone, Debug, Deserialize)]
pub struct TraverseSpec {
    /// Edge to hop.
    pub edge: String,
    /// Property on the target type.
    pub property: String,
}

/// Unresolved first/last rollup payload.
#[derive(Clone, Debug, Deserialize)]
pub struct OrderedPickSpec {
    /// Edge whose targets are ranked.
    pub edge: String,
    /// Ranking property on the target type.
    pub field: String,
    /// Ranking direction.
    #[serde(default)]
    pub direction: Direction,
    /// Optional property to read off the chosen target.
    #[serde(default)]
    pub property: Option<String>,
}

/// Unresolved rollup declaration. Exactly one of the kind payloads must be
/// present.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RollupSpec {
    /// Rollup name.
    pub name: String,
    /// `count` payload: the counted edge's name.
    #[serde(default)]
    pub count: Option<String>,
    /// `traverse` payload.
    #[serde(default)]
    pub traverse: Option<TraverseSpec>,
    /// `first` payload.
    #[serde(default)]
    pub first: Option<OrderedPickSpec>,
    /// `last` payload.
    #[serde(default)]
    pub last: Option<OrderedPickSpec>,
}

/// Unresolved index field.
#[derive(Clone, Debug, Deserialize)]
pub struct IndexFieldSpec {
    /// Referenced field: a property, rollup, or edge name.
    pub field: String,
    /// Comparison direction.
    #[serde(default)]
    pub direction: Direction,
    /// `property` (the default; also covers rollups) or `edge`.
    #[serde(default)]
    pub kind: Option<String>,
}

/// Unresolved index declaration.
#[derive(Clone, Debug, Deserialize)]
pub struct IndexSpec {
    /// Ordered key positions.
    pub fields: Vec<IndexFieldSpec>,
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

fn resolve(specs: Vec<TypeSpec>) -> Result<Schema, SchemaError> {
    let mut interner = StringInterner::new();

    let mut by_name: FxHashMap<Name, TypeId> = FxHashMap::default();
    for (i, spec) in specs.iter().enumerate() {
        if spec.name.is_empty() {
            return Err(SchemaError::MissingField {
                field: "name".into(),
                context: format!("type #{i}"),
            });
        }
        let name = interner.intern(&spec.name);
        if by_name.insert(name, i as TypeId).is_some() {
            return Err(SchemaError::DuplicateName {
                type_name: spec.name.clone(),
                name: spec.name.clone(),
            });
        }
    }

    // First pass: properties and name tables; edges get a placeholder
    // reverse id patched once every type's edge list exists.
    let mut types: Vec<TypeDef> = Vec::with_capacity(specs.len());
    for (i, spec) in specs.iter().enumerate() {
        types.push(resolve_shell(i as TypeId, spec, &by_name, &mut interner)?);
    }

    // Second pass: mutual reverse edges, edge sorts, rollups, indexes.
    patch_reverse_edges(&mut types, &specs)?;
    for (i, spec) in specs.iter().enumerate() {
        check_edge_sorts(&types, i, spec)?;
        let (rollups, rollup_by_name) = resolve_rollups(&types, i, spec, &mut interner)?;
        types[i].rollups = rollups;
        types[i].rollup_by_name = rollup_by_name;
    }
    for (i, spec) in specs.iter().enumerate() {
        let indexes = resolve_indexes(&types[i], spec, &mut interner)?;
        types[i].indexes = indexes;
        build_dependency_tables(&mut types[i]);
    }

    let watchers = build_watchers(&types);

    Ok(Schema {
        types,
        by_name,
        watchers,
        interner,
    })
}

fn resolve_shell(
    id: TypeId,
    spec: &TypeSpec,
    by_name: &FxHashMap<Name, TypeId>,
    interner: &mut StringInterner,
) -> Result<TypeDef, SchemaError> {
    let type_name = interner.intern(&spec.name);
    let mut taken: FxHashMap<Name, ()> = FxHashMap::default();
    let mut claim = |name: &Name| -> Result<(), SchemaError> {
        if taken.insert(name.clone(), ()).is_some() {
            return Err(SchemaError::DuplicateName {
                type_name: spec.name.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    };

    let mut properties = Vec::with_capacity(spec.properties.len());
    let mut prop_by_name = FxHashMap::default();
    for (pi, prop) in spec.properties.iter().enumerate() {
        let name = interner.intern(&prop.name);
        claim(&name)?;
        let ty = PropertyType::parse(&prop.ty).ok_or_else(|| SchemaError::InvalidPropertyType {
            type_name: spec.name.clone(),
            property: prop.name.clone(),
            declared: prop.ty.clone(),
        })?;
        prop_by_name.insert(name.clone(), pi as u16);
        properties.push(PropertyDef { name, ty });
    }

    let mut edges = Vec::with_capacity(spec.edges.len());
    let mut edge_by_name = FxHashMap::default();
    for (ei, edge) in spec.edges.iter().enumerate() {
        let name = interner.intern(&edge.name);
        claim(&name)?;
        let target_type_name = interner.intern(&edge.target);
        let target_type =
            *by_name
                .get(&target_type_name)
                .ok_or_else(|| SchemaError::InvalidEdgeDefinition {
                    type_name: spec.name.clone(),
                    edge: edge.name.clone(),
                    reason: format!("unknown target type '{}'", edge.target),
                })?;
        let sort = edge.sort.as_ref().map(|s| EdgeSort {
            property: interner.intern(&s.property),
            direction: s.direction,
        });
        edge_by_name.insert(name.clone(), ei as EdgeId);
        edges.push(EdgeDef {
            id: ei as EdgeId,
            name,
            target_type_name,
            target_type,
            reverse_name: interner.intern(&edge.reverse),
            reverse_edge: 0, // patched in the second pass
            sort,
        });
    }

    // Rollup names claim their slot in the shared namespace up front so a
    // rollup cannot shadow a property or edge.
    for rollup in &spec.rollups {
        let name = interner.intern(&rollup.name);
        claim(&name)?;
    }

    Ok(TypeDef {
        id,
        name: type_name,
        properties,
        edges,
        rollups: Vec::new(),
        indexes: Vec::new(),
        prop_by_name,
        edge_by_name,
        rollup_by_name: FxHashMap::default(),
        edge_rollups: Vec::new(),
        edge_indexes: Vec::new(),
        prop_indexes: FxHashMap::default(),
        rollup_indexes: Vec::new(),
    })
}

fn patch_reverse_edges(types: &mut [TypeDef], specs: &[TypeSpec]) -> Result<(), SchemaError> {
    for ti in 0..types.len() {
        for ei in 0..types[ti].edges.len() {
            let (target_type, reverse_name, own_name) = {
                let e = &types[ti].edges[ei];
                (e.target_type, e.reverse_name.clone(), e.name.clone())
            };
            let target = &types[target_type as usize];
            let missing = || SchemaError::MissingReverseEdge {
                type_name: specs[ti].name.clone(),
                edge: own_name.to_string(),
                reverse: reverse_name.to_string(),
                target: target.name.to_string(),
            };
            let reverse = target.edge(&reverse_name).ok_or_else(missing)?;
            // Mutual inversion: the reverse must point back at this type by
            // this edge's name.
            if reverse.target_type != types[ti].id || reverse.reverse_name != own_name {
                return Err(missing());
            }
            let reverse_id = reverse.id;
            types[ti].edges[ei].reverse_edge = reverse_id;
        }
    }
    Ok(())
}

fn check_edge_sorts(types: &[TypeDef], ti: usize, spec: &TypeSpec) -> Result<(), SchemaError> {
    for edge in &types[ti].edges {
        if let Some(sort) = &edge.sort {
            let target = &types[edge.target_type as usize];
            if target.property(&sort.property).is_none() {
                return Err(SchemaError::InvalidEdgeDefinition {
                    type_name: spec.name.clone(),
                    edge: edge.name.to_string(),
                    reason: format!(
                        "sort property '{}' does not exist on '{}'",
                        sort.property, target.name
                    ),
                });
            }
        }
    }
    Ok(())
}

fn resolve_rollups(
    types: &[TypeDef],
    ti: usize,
    spec: &TypeSpec,
    interner: &mut StringInterner,
) -> Result<(Vec<RollupDef>, FxHashMap<Name, u16>), SchemaError> {
    let owner = &types[ti];
    let mut rollups = Vec::with_capacity(spec.rollups.len());
    let mut rollup_by_name = FxHashMap::default();

    for (ri, rollup) in spec.rollups.iter().enumerate() {
        let invalid = |reason: String| SchemaError::InvalidRollupDefinition {
            type_name: spec.name.clone(),
            rollup: rollup.name.clone(),
            reason,
        };
        let resolve_edge = |edge_name: &str| -> Result<&EdgeDef, SchemaError> {
            owner
                .edge(edge_name)
                .ok_or_else(|| invalid(format!("unknown edge '{edge_name}'")))
        };
        let check_target_prop = |edge: &EdgeDef, prop: &str| -> Result<(), SchemaError> {
            let target = &types[edge.target_type as usize];
            if target.property(prop).is_none() {
                return Err(invalid(format!(
                    "property '{prop}' does not exist on '{}'",
                    target.name
                )));
            }
            Ok(())
        };

        let mut declared = 0;
        declared += usize::from(rollup.count.is_some());
        declared += usize::from(rollup.traverse.is_some());
        declared += usize::from(rollup.first.is_some());
        declared += usize::from(rollup.last.is_some());
        if declared != 1 {
            return Err(invalid(format!(
                "expected exactly one of count/traverse/first/last, got {declared}"
            )));
        }

        let kind = if let Some(edge_name) = &rollup.count {
            RollupKind::Count {
                edge: resolve_edge(edge_name)?.id,
            }
        } else if let Some(t) = &rollup.traverse {
            let edge = resolve_edge(&t.edge)?;
            check_target_prop(edge, &t.property)?;
            RollupKind::Traverse {
                edge: edge.id,
                property: interner.intern(&t.property),
            }
        } else {
            let (pick, is_first) = match (&rollup.first, &rollup.last) {
                (Some(p), None) => (p, true),
                (None, Some(p)) => (p, false),
                _ => unreachable!("exactly one kind declared"),
            };
            let edge = resolve_edge(&pick.edge)?;
            check_target_prop(edge, &pick.field)?;
            if let Some(prop) = &pick.property {
                check_target_prop(edge, prop)?;
            }
            let field = interner.intern(&pick.field);
            let property = pick.property.as_deref().map(|p| interner.intern(p));
            if is_first {
                RollupKind::First {
                    edge: edge.id,
                    field,
                    direction: pick.direction,
                    property,
                }
            } else {
                RollupKind::Last {
                    edge: edge.id,
                    field,
                    direction: pick.direction,
                    property,
                }
            }
        };

        let name = interner.intern(&rollup.name);
        rollup_by_name.insert(name.clone(), ri as u16);
        rollups.push(RollupDef { name, kind });
    }

    Ok((rollups, rollup_by_name))
}

fn resolve_indexes(
    owner: &TypeDef,
    spec: &TypeSpec,
    interner: &mut StringInterner,
) -> Result<Vec<IndexDef>, SchemaError> {
    let mut indexes = Vec::with_capacity(spec.indexes.len());
    for index in &spec.indexes {
        let invalid = |reason: String| SchemaError::InvalidIndexDefinition {
            type_name: spec.name.clone(),
            reason,
        };
        if index.fields.is_empty() {
            return Err(invalid("index has no fields".into()));
        }
        let mut fields = Vec::with_capacity(index.fields.len());
        for field in &index.fields {
            let name = interner.intern(&field.field);
            let source = match field.kind.as_deref() {
                Some("edge") => {
                    let edge = owner
                        .edge(&name)
                        .ok_or_else(|| invalid(format!("unknown edge '{name}'")))?;
                    FieldSource::Edge(edge.id)
                }
                None | Some("property") => {
                    if owner.property(&name).is_some() {
                        FieldSource::Property(name.clone())
                    } else if let Some((ri, _)) = owner.rollup(&name) {
                        FieldSource::Rollup(ri)
                    } else {
                        return Err(invalid(format!("unknown field '{name}'")));
                    }
                }
                Some(other) => {
                    return Err(invalid(format!("unknown field kind '{other}'")));
                }
            };
            fields.push(IndexField {
                name,
                direction: field.direction,
                source,
            });
        }
        indexes.push(IndexDef { fields });
    }
    Ok(indexes)
}

fn build_dependency_tables(ty: &mut TypeDef) {
    let mut edge_rollups = vec![Vec::new(); ty.edges.len()];
    for (ri, rollup) in ty.rollups.iter().enumerate() {
        edge_rollups[rollup.kind.edge() as usize].push(ri as u16);
    }

    let mut edge_indexes = vec![Vec::new(); ty.edges.len()];
    let mut prop_indexes: FxHashMap<Name, Vec<u16>> = FxHashMap::default();
    let mut rollup_indexes = vec![Vec::new(); ty.rollups.len()];
    for (ii, index) in ty.indexes.iter().enumerate() {
        for field in &index.fields {
            match &field.source {
                FieldSource::Property(name) => {
                    prop_indexes.entry(name.clone()).or_default().push(ii as u16);
                }
                FieldSource::Rollup(ri) => rollup_indexes[*ri as usize].push(ii as u16),
                FieldSource::Edge(edge) => edge_indexes[*edge as usize].push(ii as u16),
            }
        }
    }
    for list in edge_indexes.iter_mut().chain(rollup_indexes.iter_mut()) {
        list.dedup();
    }
    for list in prop_indexes.values_mut() {
        list.dedup();
    }

    ty.edge_rollups = edge_rollups;
    ty.edge_indexes = edge_indexes;
    ty.prop_indexes = prop_indexes;
    ty.rollup_indexes = rollup_indexes;
}

fn build_watchers(types: &[TypeDef]) -> Vec<FxHashMap<Name, PropWatchers>> {
    let mut watchers: Vec<FxHashMap<Name, PropWatchers>> =
        vec![FxHashMap::default(); types.len()];

    for ty in types {
        for edge in &ty.edges {
            if let Some(sort) = &edge.sort {
                watchers[edge.target_type as usize]
                    .entry(sort.property.clone())
                    .or_default()
                    .resort
                    .push(EdgeWatch {
                        source_type: ty.id,
                        edge: edge.id,
                        reverse: edge.reverse_edge,
                    });
            }
        }
        for (ri, rollup) in ty.rollups.iter().enumerate() {
            let edge = ty.edge_def(rollup.kind.edge());
            for dep in rollup.kind.target_deps() {
                watchers[edge.target_type as usize]
                    .entry(dep.clone())
                    .or_default()
                    .rollups
                    .push(RollupWatch {
                        source_type: ty.id,
                        edge: edge.id,
                        reverse: edge.reverse_edge,
                        rollup: ri as u16,
                    });
            }
        }
    }

    watchers
}
