#![allow(missing_docs)]

use canopy::query::EdgeResultKind;
use canopy::{EdgeSelection, Engine, Filter, FilterOp, Query, Sort, Value};

fn users() -> Engine {
    Engine::from_schema_json(
        r#"{ "types": [
          { "name": "User",
            "properties": [
              { "name": "name", "type": "string" },
              { "name": "age", "type": "int" }
            ],
            "indexes": [
              { "fields": [ { "field": "name", "direction": "asc" } ] },
              { "fields": [ { "field": "age", "direction": "desc" } ] }
            ] }
        ] }"#,
    )
    .expect("schema loads")
}

fn named_user(g: &Engine, name: &str, age: i64) -> canopy::NodeId {
    let id = g.insert("User").expect("insert");
    g.update(id, [("name".to_owned(), Value::from(name)), ("age".to_owned(), Value::Int(age))])
        .expect("props");
    id
}

#[test]
fn root_sort_follows_name_index() {
    // Insert ids 1,2,3 with names "C","A","B"; sorting by name yields the
    // index order A, B, C.
    let g = users();
    let c = named_user(&g, "C", 30);
    let a = named_user(&g, "A", 20);
    let b = named_user(&g, "B", 10);

    let mut query = Query::over("User");
    query.sorts.push(Sort::asc("name"));
    let items = g.execute(&query).expect("execute");
    let ids: Vec<_> = items.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![a, b, c]);

    // Consecutive results never violate the requested sort.
    let names: Vec<_> = items
        .iter()
        .map(|i| i.fields.get("name").cloned().unwrap())
        .collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[test]
fn descending_sort_uses_age_index() {
    let g = users();
    let x = named_user(&g, "x", 10);
    let y = named_user(&g, "y", 30);
    let z = named_user(&g, "z", 20);

    let mut query = Query::over("User");
    query.sorts.push(Sort::desc("age"));
    let ids: Vec<_> = g.execute(&query).expect("execute").iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![y, z, x]);
}

#[test]
fn unindexed_sort_is_rejected() {
    let g = users();
    let mut query = Query::over("User");
    query.sorts.push(Sort::desc("name"));
    let err = g.execute(&query).expect_err("no desc name index");
    assert_eq!(err.code(), "NoIndexCoverage");
}

#[test]
fn filters_and_root_id_lookup() {
    let g = users();
    let a = named_user(&g, "ada", 36);
    let _b = named_user(&g, "bob", 41);

    let mut query = Query::over("User");
    query.sorts.push(Sort::asc("name"));
    query.filters.push(Filter::cmp("age", FilterOp::Lt, 40i64));
    let ids: Vec<_> = g.execute(&query).expect("execute").iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![a]);

    let mut direct = Query::over("User");
    direct.root_id = Some(a);
    let items = g.execute(&direct).expect("direct");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, a);

    // A direct lookup still applies filters.
    let mut miss = Query::over("User");
    miss.root_id = Some(a);
    miss.filters.push(Filter::cmp("name", FilterOp::Eq, "bob"));
    assert!(g.execute(&miss).expect("filtered direct").is_empty());
}

#[test]
fn in_filter_matches_membership() {
    let g = users();
    let a = named_user(&g, "ada", 36);
    let _b = named_user(&g, "bob", 41);
    let c = named_user(&g, "cyd", 22);

    let mut query = Query::over("User");
    query.sorts.push(Sort::asc("name"));
    query.filters.push(Filter {
        path: vec!["name".into()],
        op: FilterOp::In,
        value: Value::Null,
        values: Some(vec![Value::from("ada"), Value::from("cyd")]),
    });
    let ids: Vec<_> = g.execute(&query).expect("execute").iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![a, c]);
}

fn folders() -> Engine {
    Engine::from_schema_json(
        r#"{ "types": [
          { "name": "Folder",
            "properties": [ { "name": "name", "type": "string" } ],
            "edges": [
              { "name": "children", "target": "Folder", "reverse": "parent" },
              { "name": "parent", "target": "Folder", "reverse": "children" }
            ],
            "indexes": [ { "fields": [ { "field": "name" } ] } ] }
        ] }"#,
    )
    .expect("schema loads")
}

#[test]
fn recursive_selection_terminates_on_cycles() {
    let g = folders();
    let a = g.insert("Folder").expect("a");
    let b = g.insert("Folder").expect("b");
    let c = g.insert("Folder").expect("c");
    for (id, name) in [(a, "a"), (b, "b"), (c, "c")] {
        g.update(id, [("name", Value::from(name))]).expect("name");
    }
    g.link(a, "children", b).expect("a->b");
    g.link(b, "children", c).expect("b->c");
    g.link(c, "children", a).expect("c->a closes the cycle");

    let mut query = Query::over("Folder");
    query.root_id = Some(a);
    let mut sel = EdgeSelection::named("children");
    sel.recursive = true;
    query.edges.push(sel);

    let items = g.execute(&query).expect("cyclic graph executes");
    assert_eq!(items.len(), 1);

    // Depth-first: a -> b -> c, and c's child a is omitted as a cycle.
    let root = &items[0];
    let EdgeResultKind::Items(level1) = &root.edges[0].kind else {
        panic!("materialised children expected");
    };
    assert_eq!(level1.len(), 1);
    assert_eq!(level1[0].id, b);
    let EdgeResultKind::Items(level2) = &level1[0].edges[0].kind else {
        panic!("materialised children expected");
    };
    assert_eq!(level2.len(), 1);
    assert_eq!(level2[0].id, c);
    let EdgeResultKind::Items(level3) = &level2[0].edges[0].kind else {
        panic!("materialised children expected");
    };
    assert!(level3.is_empty(), "cycle back to a is cut");
}

#[test]
fn path_filter_reaches_across_edges() {
    let g = folders();
    let root = g.insert("Folder").expect("root");
    let child = g.insert("Folder").expect("child");
    let stray = g.insert("Folder").expect("stray");
    g.update(root, [("name", Value::from("root"))]).expect("name");
    g.update(child, [("name", Value::from("child"))]).expect("name");
    g.update(stray, [("name", Value::from("stray"))]).expect("name");
    g.link(root, "children", child).expect("link");

    // Folders whose parent is named "root": only `child` qualifies.
    let mut query = Query::over("Folder");
    query.sorts.push(Sort::asc("name"));
    query.filters.push(Filter {
        path: vec!["parent".into(), "name".into()],
        op: FilterOp::Eq,
        value: Value::from("root"),
        values: None,
    });
    let ids: Vec<_> = g.execute(&query).expect("execute").iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![child]);
}

#[test]
fn rollup_sort_orders_by_child_count() {
    let g = Engine::from_schema_json(
        r#"{ "types": [
          { "name": "List",
            "properties": [ { "name": "name", "type": "string" } ],
            "edges": [
              { "name": "items", "target": "Item", "reverse": "list" }
            ],
            "rollups": [ { "name": "size", "count": "items" } ],
            "indexes": [
              { "fields": [ { "field": "size", "direction": "desc" },
                            { "field": "name", "direction": "asc" } ] }
            ] },
          { "name": "Item",
            "edges": [ { "name": "list", "target": "List", "reverse": "items" } ] }
        ] }"#,
    )
    .expect("schema loads");

    let small = g.insert("List").expect("small");
    let big = g.insert("List").expect("big");
    g.update(small, [("name", Value::from("small"))]).expect("name");
    g.update(big, [("name", Value::from("big"))]).expect("name");
    for _ in 0..3 {
        let item = g.insert("Item").expect("item");
        g.link(big, "items", item).expect("link");
    }
    let lone = g.insert("Item").expect("item");
    g.link(small, "items", lone).expect("link");

    let mut query = Query::over("List");
    query.sorts.push(Sort::desc("size"));
    let items = g.execute(&query).expect("execute");
    let ids: Vec<_> = items.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![big, small]);
    assert_eq!(items[0].fields.get("size"), Some(&Value::Int(3)));
}

#[test]
fn missing_edges_materialise_empty() {
    let g = folders();
    let lone = g.insert("Folder").expect("lone");
    g.update(lone, [("name", Value::from("lone"))]).expect("name");

    let mut query = Query::over("Folder");
    query.root_id = Some(lone);
    query.edges.push(EdgeSelection::named("children"));
    let items = g.execute(&query).expect("execute");
    let EdgeResultKind::Items(children) = &items[0].edges[0].kind else {
        panic!("materialised children expected");
    };
    assert!(children.is_empty());
}
