#![allow(missing_docs)]

use std::sync::{Arc, Mutex};

use canopy::{EdgeSelection, Engine, NodeId, Query, Sort, Value, ViewCallbacks, ViewOptions};

const TRIPLE: &str = r#"{ "types": [
  { "name": "Parent",
    "properties": [ { "name": "name", "type": "string" } ],
    "edges": [ { "name": "children", "target": "Child", "reverse": "parent" } ],
    "indexes": [ { "fields": [ { "field": "name" } ] } ] },
  { "name": "Child",
    "properties": [ { "name": "name", "type": "string" } ],
    "edges": [
      { "name": "parent", "target": "Parent", "reverse": "children" },
      { "name": "items", "target": "Item", "reverse": "holder" }
    ] },
  { "name": "Item",
    "properties": [ { "name": "name", "type": "string" } ],
    "edges": [ { "name": "holder", "target": "Child", "reverse": "items" } ] }
] }"#;

fn named(g: &Engine, ty: &str, name: &str) -> NodeId {
    let id = g.insert(ty).expect("insert");
    g.update(id, [("name", Value::from(name))]).expect("name");
    id
}

fn nested_query() -> Query {
    let mut query = Query::over("Parent");
    query.sorts.push(Sort::asc("name"));
    let mut children = EdgeSelection::named("children");
    children.edges.push(EdgeSelection::named("items"));
    query.edges.push(children);
    query
}

type Log = Arc<Mutex<Vec<(NodeId, usize)>>>;

fn recording_callbacks(enters: &Log, leaves: &Log) -> ViewCallbacks {
    let enters = enters.clone();
    let leaves = leaves.clone();
    ViewCallbacks {
        on_enter: Box::new(move |item, offset| enters.lock().unwrap().push((item.id, offset))),
        on_leave: Box::new(move |item, offset| leaves.lock().unwrap().push((item.id, offset))),
    }
}

#[test]
fn expand_then_live_insert_enters_once() {
    let g = Engine::from_schema_json(TRIPLE).expect("schema loads");
    let p = named(&g, "Parent", "p");
    let c = named(&g, "Child", "c");
    g.link(p, "children", c).expect("link child");

    let view = g.view(&nested_query(), ViewOptions::default()).expect("view");
    view.activate(false);
    assert_eq!(view.total(), 1, "root only until expanded");

    view.expand_by_id(p, "children");
    assert_eq!(view.total(), 2);
    view.expand_by_id(c, "items");
    assert_eq!(view.total(), 2, "no items yet");

    let enters: Log = Arc::default();
    let leaves: Log = Arc::default();
    view.set_callbacks(recording_callbacks(&enters, &leaves));

    let i1 = named(&g, "Item", "i1");
    g.link(c, "items", i1).expect("link item");

    assert_eq!(view.total(), 3);
    assert_eq!(enters.lock().unwrap().as_slice(), &[(i1, 2)]);
    assert!(leaves.lock().unwrap().is_empty());

    let ids: Vec<NodeId> = view.items().iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![p, c, i1]);
    let depths: Vec<usize> = view.items().iter().map(|i| i.depth).collect();
    assert_eq!(depths, vec![0, 1, 2]);
}

#[test]
fn virtual_edge_hides_hop_nodes() {
    let g = Engine::from_schema_json(TRIPLE).expect("schema loads");
    let p = named(&g, "Parent", "p");
    let c = named(&g, "Child", "c");
    let i1 = named(&g, "Item", "i1");
    let i2 = named(&g, "Item", "i2");
    g.link(p, "children", c).expect("link child");
    g.link(c, "items", i1).expect("link item 1");
    g.link(c, "items", i2).expect("link item 2");

    let mut query = Query::over("Parent");
    query.sorts.push(Sort::asc("name"));
    let mut children = EdgeSelection::named("children");
    children.virtual_ = true;
    children.edges.push(EdgeSelection::named("items"));
    query.edges.push(children);

    let view = g.view(&query, ViewOptions::default()).expect("view");
    view.activate(false);
    assert_eq!(view.total(), 1, "parent only");

    view.expand_by_id(p, "children");
    assert_eq!(view.total(), 3, "parent plus both items");

    let ids: Vec<NodeId> = view.items().iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![p, i1, i2]);
    assert!(!ids.contains(&c), "hop node never surfaces");

    // Items under the hop indent directly beneath the parent.
    let depths: Vec<usize> = view.items().iter().map(|i| i.depth).collect();
    assert_eq!(depths, vec![0, 1, 1]);
}

#[test]
fn collapse_restores_lazy_state() {
    let g = Engine::from_schema_json(TRIPLE).expect("schema loads");
    let p = named(&g, "Parent", "p");
    let c1 = named(&g, "Child", "c1");
    let c2 = named(&g, "Child", "c2");
    g.link(p, "children", c1).expect("link");
    g.link(p, "children", c2).expect("link");

    let view = g.view(&nested_query(), ViewOptions::default()).expect("view");
    view.activate(false);

    let enters: Log = Arc::default();
    let leaves: Log = Arc::default();
    view.set_callbacks(recording_callbacks(&enters, &leaves));

    view.expand_by_id(p, "children");
    assert_eq!(view.total(), 3);
    assert!(view.is_expanded(p, "children"));
    assert_eq!(enters.lock().unwrap().len(), 2);

    view.collapse_by_id(p, "children");
    assert_eq!(view.total(), 1);
    assert!(!view.is_expanded(p, "children"));
    assert_eq!(leaves.lock().unwrap().len(), 2);

    // Expanding again rebuilds the same children.
    view.expand_by_id(p, "children");
    let ids: Vec<NodeId> = view.items().iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![p, c1, c2]);
}

#[test]
fn load_nested_materialises_existing_data() {
    let g = Engine::from_schema_json(TRIPLE).expect("schema loads");
    let p = named(&g, "Parent", "p");
    let c = named(&g, "Child", "c");
    let i = named(&g, "Item", "i");
    g.link(p, "children", c).expect("link");
    g.link(c, "items", i).expect("link");

    let view = g.view(&nested_query(), ViewOptions::default()).expect("view");
    view.activate(true);
    assert_eq!(view.total(), 3);
    let ids: Vec<NodeId> = view.items().iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![p, c, i]);
}

#[test]
fn index_offset_bijection_over_visible_items() {
    let g = Engine::from_schema_json(TRIPLE).expect("schema loads");
    let p1 = named(&g, "Parent", "a");
    let p2 = named(&g, "Parent", "b");
    for parent in [p1, p2] {
        for suffix in ["x", "y"] {
            let c = named(&g, "Child", suffix);
            g.link(parent, "children", c).expect("link");
        }
    }

    let wide = g.view(&nested_query(), ViewOptions::default()).expect("view");
    wide.activate(true);
    assert_eq!(wide.total(), 6);
    let all: Vec<NodeId> = wide.items().iter().map(|i| i.id).collect();
    assert_eq!(all.len(), 6);

    // A one-item window slides over the same sequence item by item.
    let narrow = g
        .view(&nested_query(), ViewOptions { limit: 1 })
        .expect("view");
    narrow.activate(true);
    for (offset, expected) in all.iter().enumerate() {
        narrow.scroll_to(offset);
        assert_eq!(narrow.get_offset(), offset);
        let ids: Vec<NodeId> = narrow.items().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![*expected], "window at offset {offset}");
    }
}

#[test]
fn total_matches_full_iteration() {
    let g = Engine::from_schema_json(TRIPLE).expect("schema loads");
    for name in ["m", "n", "o"] {
        let p = named(&g, "Parent", name);
        let c = named(&g, "Child", &format!("c-{name}"));
        g.link(p, "children", c).expect("link");
    }
    let view = g.view(&nested_query(), ViewOptions::default()).expect("view");
    view.activate(true);
    assert_eq!(view.total(), view.items().len());
}
