#![allow(missing_docs)]

use canopy::{Engine, Value};

fn blog() -> Engine {
    Engine::from_schema_json(
        r#"{ "types": [
          { "name": "User",
            "properties": [
              { "name": "name", "type": "string" },
              { "name": "age", "type": "int" }
            ],
            "edges": [
              { "name": "posts", "target": "Post", "reverse": "author",
                "sort": { "property": "title", "direction": "asc" } }
            ],
            "indexes": [ { "fields": [ { "field": "name" } ] } ] },
          { "name": "Post",
            "properties": [ { "name": "title", "type": "string" } ],
            "edges": [
              { "name": "author", "target": "User", "reverse": "posts" }
            ] }
        ] }"#,
    )
    .expect("schema loads")
}

#[test]
fn link_unlink_delete_cascade() {
    // Scenario: link a post, unlink it, then delete the user and check the
    // cascade leaves the post orphaned.
    let g = blog();
    let u1 = g.insert("User").expect("insert user");
    let p1 = g.insert("Post").expect("insert post");
    g.update(p1, [("title", Value::from("hello"))]).expect("title");

    g.link(u1, "posts", p1).expect("link");
    assert_eq!(g.neighbors(u1, "posts").expect("posts"), vec![p1]);
    assert_eq!(g.neighbors(p1, "author").expect("author"), vec![u1]);

    g.unlink(u1, "posts", p1).expect("unlink");
    assert!(g.neighbors(p1, "author").expect("author").is_empty());

    g.link(u1, "posts", p1).expect("relink");
    let before = g.node_count();
    g.delete(u1).expect("delete user");
    assert_eq!(g.node_count(), before - 1);
    assert!(g.neighbors(p1, "author").expect("author").is_empty());
}

#[test]
fn reverse_edge_symmetry_holds() {
    let g = blog();
    let u1 = g.insert("User").expect("user 1");
    let u2 = g.insert("User").expect("user 2");
    let mut posts = Vec::new();
    for i in 0..6 {
        let p = g.insert("Post").expect("post");
        g.update(p, [("title", Value::from(format!("t{i}")))])
            .expect("title");
        posts.push(p);
    }
    for (i, &p) in posts.iter().enumerate() {
        let owner = if i % 2 == 0 { u1 } else { u2 };
        g.link(owner, "posts", p).expect("link");
    }

    for &owner in &[u1, u2] {
        for p in g.neighbors(owner, "posts").expect("posts") {
            assert!(
                g.neighbors(p, "author").expect("author").contains(&owner),
                "post {p} lost its author backlink"
            );
        }
    }
}

#[test]
fn sorted_edge_tracks_title_changes() {
    let g = blog();
    let u = g.insert("User").expect("user");
    let mut ids = Vec::new();
    for title in ["delta", "alpha", "charlie", "bravo"] {
        let p = g.insert("Post").expect("post");
        g.update(p, [("title", Value::from(title))]).expect("title");
        g.link(u, "posts", p).expect("link");
        ids.push((p, title.to_owned()));
    }

    let titles = |g: &Engine| -> Vec<String> {
        g.neighbors(u, "posts")
            .expect("posts")
            .into_iter()
            .map(|p| match g.node(p).expect("post").property("title") {
                Value::String(s) => s,
                other => panic!("unexpected title {other:?}"),
            })
            .collect()
    };
    assert_eq!(titles(&g), vec!["alpha", "bravo", "charlie", "delta"]);

    // Retitle "alpha" past the end and check the list resorts.
    let alpha = ids[1].0;
    g.update(alpha, [("title", Value::from("zulu"))]).expect("retitle");
    assert_eq!(titles(&g), vec!["bravo", "charlie", "delta", "zulu"]);

    // Unsetting the sort property moves the post to the null-first slot.
    g.update(alpha, [("title", Value::Null)]).expect("unset");
    let order = g.neighbors(u, "posts").expect("posts");
    assert_eq!(order.len(), 4);
    assert_eq!(order[0], alpha, "null sorts before every string");
}

#[test]
fn duplicate_link_is_noop() {
    let g = blog();
    let u = g.insert("User").expect("user");
    let p = g.insert("Post").expect("post");
    g.link(u, "posts", p).expect("link");
    g.link(u, "posts", p).expect("relink");
    assert_eq!(g.neighbors(u, "posts").expect("posts").len(), 1);
}

#[test]
fn store_errors_carry_codes() {
    let g = blog();
    assert_eq!(g.insert("Ghost").expect_err("type").code(), "UnknownType");

    let u = g.insert("User").expect("user");
    assert_eq!(
        g.update(99, [("name", Value::from("x"))])
            .expect_err("node")
            .code(),
        "NodeNotFound"
    );
    assert_eq!(
        g.update(u, [("name", Value::Int(3))]).expect_err("type").code(),
        "InvalidPropertyType"
    );
    assert_eq!(
        g.link(u, "friends", u).expect_err("edge").code(),
        "UnknownEdge"
    );
    assert_eq!(
        g.link(u, "posts", 99).expect_err("target").code(),
        "EdgeTargetNotFound"
    );
    assert_eq!(
        g.link(u, "posts", u).expect_err("mismatch").code(),
        "TypeMismatch"
    );
}

#[test]
fn failed_update_leaves_store_unchanged() {
    let g = blog();
    let u = g.insert("User").expect("user");
    g.update(u, [("name", Value::from("ada"))]).expect("name");

    let err = g
        .update(
            u,
            [
                ("name".to_owned(), Value::from("grace")),
                ("age".to_owned(), Value::from("not an int")),
            ],
        )
        .expect_err("second write is invalid");
    assert_eq!(err.code(), "InvalidPropertyType");
    assert_eq!(
        g.node(u).expect("user").property("name"),
        Value::from("ada"),
        "partial update must not stick"
    );
}
