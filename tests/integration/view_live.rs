#![allow(missing_docs)]

use std::sync::{Arc, Mutex};

use canopy::{EdgeSelection, Engine, NodeId, Query, Sort, Value, ViewCallbacks, ViewOptions};

const CHAIN: &str = r#"{ "types": [
  { "name": "Root",
    "properties": [ { "name": "name", "type": "string" } ],
    "edges": [ { "name": "l1", "target": "L1", "reverse": "up" } ],
    "indexes": [ { "fields": [ { "field": "name" } ] } ] },
  { "name": "L1",
    "properties": [ { "name": "name", "type": "string" } ],
    "edges": [
      { "name": "up", "target": "Root", "reverse": "l1" },
      { "name": "l2", "target": "L2", "reverse": "up" }
    ] },
  { "name": "L2",
    "properties": [ { "name": "name", "type": "string" } ],
    "edges": [
      { "name": "up", "target": "L1", "reverse": "l2" },
      { "name": "l3", "target": "L3", "reverse": "up" }
    ] },
  { "name": "L3",
    "properties": [ { "name": "name", "type": "string" } ],
    "edges": [ { "name": "up", "target": "L2", "reverse": "l3" } ] }
] }"#;

type Log = Arc<Mutex<Vec<(NodeId, usize)>>>;

fn recording(enters: &Log, leaves: &Log) -> ViewCallbacks {
    let enters = enters.clone();
    let leaves = leaves.clone();
    ViewCallbacks {
        on_enter: Box::new(move |item, offset| enters.lock().unwrap().push((item.id, offset))),
        on_leave: Box::new(move |item, offset| leaves.lock().unwrap().push((item.id, offset))),
    }
}

fn named(g: &Engine, ty: &str, name: &str) -> NodeId {
    let id = g.insert(ty).expect("insert");
    g.update(id, [("name", Value::from(name))]).expect("name");
    id
}

#[test]
fn nested_insert_four_levels_deep_is_observed() {
    let g = Engine::from_schema_json(CHAIN).expect("schema loads");
    let root = named(&g, "Root", "root");
    let l1 = named(&g, "L1", "l1");
    let l2 = named(&g, "L2", "l2");
    g.link(root, "l1", l1).expect("link");
    g.link(l1, "l2", l2).expect("link");

    let mut query = Query::over("Root");
    query.sorts.push(Sort::asc("name"));
    let mut sel1 = EdgeSelection::named("l1");
    let mut sel2 = EdgeSelection::named("l2");
    sel2.edges.push(EdgeSelection::named("l3"));
    sel1.edges.push(sel2);
    query.edges.push(sel1);

    let view = g.view(&query, ViewOptions::default()).expect("view");
    view.activate(false);
    view.expand_by_id(root, "l1");
    view.expand_by_id(l1, "l2");
    view.expand_by_id(l2, "l3");
    assert_eq!(view.total(), 3);

    let enters: Log = Arc::default();
    let leaves: Log = Arc::default();
    view.set_callbacks(recording(&enters, &leaves));

    let l3 = named(&g, "L3", "l3");
    g.link(l2, "l3", l3).expect("link into the deepest edge");

    assert_eq!(view.total(), 4);
    assert_eq!(enters.lock().unwrap().as_slice(), &[(l3, 3)]);
    assert!(leaves.lock().unwrap().is_empty());
    let ids: Vec<NodeId> = view.items().iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![root, l1, l2, l3]);
}

#[test]
fn collapsed_edges_stay_silent() {
    let g = Engine::from_schema_json(CHAIN).expect("schema loads");
    let root = named(&g, "Root", "root");
    let l1 = named(&g, "L1", "l1");
    g.link(root, "l1", l1).expect("link");

    let mut query = Query::over("Root");
    query.sorts.push(Sort::asc("name"));
    query.edges.push(EdgeSelection::named("l1"));

    let view = g.view(&query, ViewOptions::default()).expect("view");
    view.activate(false);

    let enters: Log = Arc::default();
    let leaves: Log = Arc::default();
    view.set_callbacks(recording(&enters, &leaves));

    // Churn beneath the collapsed edge: no events, total unchanged.
    let extra = named(&g, "L1", "extra");
    g.link(root, "l1", extra).expect("link");
    g.unlink(root, "l1", extra).expect("unlink");
    g.delete(extra).expect("delete");

    assert_eq!(view.total(), 1);
    assert!(enters.lock().unwrap().is_empty());
    assert!(leaves.lock().unwrap().is_empty());

    // The recorded lazy membership surfaces on expansion.
    view.expand_by_id(root, "l1");
    assert_eq!(view.total(), 2);
    assert_eq!(enters.lock().unwrap().as_slice(), &[(l1, 1)]);
}

#[test]
fn enter_leave_conservation_across_mutations() {
    let g = Engine::from_schema_json(CHAIN).expect("schema loads");
    let mut query = Query::over("Root");
    query.sorts.push(Sort::asc("name"));
    query.edges.push(EdgeSelection::named("l1"));

    let view = g.view(&query, ViewOptions::default()).expect("view");
    view.activate(false);

    let enters: Log = Arc::default();
    let leaves: Log = Arc::default();
    view.set_callbacks(recording(&enters, &leaves));
    let baseline = view.total();

    let r1 = named(&g, "Root", "alpha");
    let r2 = named(&g, "Root", "beta");
    let l1 = named(&g, "L1", "leaf");
    g.link(r1, "l1", l1).expect("link");
    view.expand_by_id(r1, "l1");
    g.unlink(r1, "l1", l1).expect("unlink");
    g.delete(r2).expect("delete");
    g.update(r1, [("name", Value::from("gamma"))]).expect("rename");

    let entered = enters.lock().unwrap().len() as isize;
    let left = leaves.lock().unwrap().len() as isize;
    assert_eq!(
        entered - left,
        view.total() as isize - baseline as isize,
        "enters minus leaves equals the net visible change"
    );
}

#[test]
fn root_rename_moves_item_within_order() {
    let g = Engine::from_schema_json(CHAIN).expect("schema loads");
    let a = named(&g, "Root", "a");
    let b = named(&g, "Root", "b");
    let c = named(&g, "Root", "c");

    let mut query = Query::over("Root");
    query.sorts.push(Sort::asc("name"));
    let view = g.view(&query, ViewOptions::default()).expect("view");
    view.activate(false);
    let ids: Vec<NodeId> = view.items().iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![a, b, c]);

    g.update(a, [("name", Value::from("zz"))]).expect("rename");
    let ids: Vec<NodeId> = view.items().iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![b, c, a]);
    assert_eq!(view.total(), 3);
}

#[test]
fn root_filter_membership_follows_updates() {
    let g = Engine::from_schema_json(CHAIN).expect("schema loads");
    let a = named(&g, "Root", "keep");
    let b = named(&g, "Root", "drop");

    let mut query = Query::over("Root");
    query.sorts.push(Sort::asc("name"));
    query.filters.push(canopy::Filter::cmp(
        "name",
        canopy::FilterOp::Neq,
        "drop",
    ));
    let view = g.view(&query, ViewOptions::default()).expect("view");
    view.activate(false);
    assert_eq!(view.total(), 1);

    let enters: Log = Arc::default();
    let leaves: Log = Arc::default();
    view.set_callbacks(recording(&enters, &leaves));

    // b renames into membership, a renames out.
    g.update(b, [("name", Value::from("back"))]).expect("rename");
    assert_eq!(view.total(), 2);
    assert_eq!(enters.lock().unwrap().as_slice(), &[(b, 0)]);

    g.update(a, [("name", Value::from("drop"))]).expect("rename");
    assert_eq!(view.total(), 1);
    assert_eq!(leaves.lock().unwrap().as_slice(), &[(a, 1)]);
}

#[test]
fn deleting_expanded_child_fires_single_leave() {
    let g = Engine::from_schema_json(CHAIN).expect("schema loads");
    let root = named(&g, "Root", "root");
    let l1 = named(&g, "L1", "leaf");
    g.link(root, "l1", l1).expect("link");

    let mut query = Query::over("Root");
    query.sorts.push(Sort::asc("name"));
    query.edges.push(EdgeSelection::named("l1"));
    let view = g.view(&query, ViewOptions::default()).expect("view");
    view.activate(false);
    view.expand_by_id(root, "l1");
    assert_eq!(view.total(), 2);

    let enters: Log = Arc::default();
    let leaves: Log = Arc::default();
    view.set_callbacks(recording(&enters, &leaves));

    g.delete(l1).expect("delete leaf");
    assert_eq!(view.total(), 1);
    assert_eq!(leaves.lock().unwrap().as_slice(), &[(l1, 1)]);
    assert!(enters.lock().unwrap().is_empty());
}
