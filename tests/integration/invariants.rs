#![allow(missing_docs)]

use std::sync::{Arc, Mutex};

use proptest::prelude::*;

use canopy::{EdgeSelection, Engine, NodeId, Query, Sort, Value, ViewCallbacks, ViewOptions};

const SCHEMA: &str = r#"{ "types": [
  { "name": "User",
    "properties": [ { "name": "name", "type": "string" } ],
    "edges": [
      { "name": "posts", "target": "Post", "reverse": "author",
        "sort": { "property": "title", "direction": "asc" } }
    ],
    "indexes": [ { "fields": [ { "field": "name" } ] } ] },
  { "name": "Post",
    "properties": [ { "name": "title", "type": "string" } ],
    "edges": [ { "name": "author", "target": "User", "reverse": "posts" } ],
    "indexes": [ { "fields": [ { "field": "title" } ] } ] }
] }"#;

#[derive(Clone, Debug)]
enum Op {
    InsertUser(String),
    InsertPost(String),
    Rename(usize, String),
    Link(usize, usize),
    Unlink(usize, usize),
    Delete(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let short = "[a-d]{1,3}";
    prop_oneof![
        short.prop_map(Op::InsertUser),
        short.prop_map(Op::InsertPost),
        (any::<usize>(), short).prop_map(|(i, s)| Op::Rename(i, s)),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Link(a, b)),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Unlink(a, b)),
        any::<usize>().prop_map(Op::Delete),
    ]
}

struct Harness {
    engine: Engine,
    users: Vec<NodeId>,
    posts: Vec<NodeId>,
    live: Vec<NodeId>,
}

impl Harness {
    fn new() -> Self {
        Self {
            engine: Engine::from_schema_json(SCHEMA).expect("schema loads"),
            users: Vec::new(),
            posts: Vec::new(),
            live: Vec::new(),
        }
    }

    fn pick(list: &[NodeId], i: usize) -> Option<NodeId> {
        if list.is_empty() {
            None
        } else {
            Some(list[i % list.len()])
        }
    }

    fn apply(&mut self, op: &Op) {
        match op {
            Op::InsertUser(name) => {
                let id = self.engine.insert("User").expect("insert");
                self.engine
                    .update(id, [("name", Value::from(name.as_str()))])
                    .expect("name");
                self.users.push(id);
                self.live.push(id);
            }
            Op::InsertPost(title) => {
                let id = self.engine.insert("Post").expect("insert");
                self.engine
                    .update(id, [("title", Value::from(title.as_str()))])
                    .expect("title");
                self.posts.push(id);
                self.live.push(id);
            }
            Op::Rename(i, s) => {
                if let Some(id) = Self::pick(&self.live, *i) {
                    let node = self.engine.node(id).expect("live node");
                    let prop = if self.users.contains(&node.id) {
                        "name"
                    } else {
                        "title"
                    };
                    self.engine
                        .update(id, [(prop, Value::from(s.as_str()))])
                        .expect("rename");
                }
            }
            Op::Link(a, b) => {
                if let (Some(user), Some(post)) =
                    (Self::pick(&self.users, *a), Self::pick(&self.posts, *b))
                {
                    if self.live.contains(&user) && self.live.contains(&post) {
                        self.engine.link(user, "posts", post).expect("link");
                    }
                }
            }
            Op::Unlink(a, b) => {
                if let (Some(user), Some(post)) =
                    (Self::pick(&self.users, *a), Self::pick(&self.posts, *b))
                {
                    if self.live.contains(&user) && self.live.contains(&post) {
                        self.engine.unlink(user, "posts", post).expect("unlink");
                    }
                }
            }
            Op::Delete(i) => {
                if let Some(id) = Self::pick(&self.live, *i) {
                    self.engine.delete(id).expect("delete");
                    self.live.retain(|&l| l != id);
                }
            }
        }
    }

    fn check_reverse_symmetry(&self) {
        let schema = self.engine.schema();
        for &id in &self.live {
            let node = self.engine.node(id).expect("live node");
            let ty = schema.type_of(node.type_id);
            for edge in &ty.edges {
                for &target in node.targets(edge.id) {
                    let mirror = self.engine.node(target).expect("linked node");
                    assert!(
                        mirror.targets(edge.reverse_edge).contains(&id),
                        "reverse list of {target} misses {id}"
                    );
                }
            }
        }
    }

    fn check_edge_sort(&self) {
        let schema = self.engine.schema();
        for &id in &self.live {
            let node = self.engine.node(id).expect("live node");
            let ty = schema.type_of(node.type_id);
            for edge in &ty.edges {
                let Some(sort) = &edge.sort else { continue };
                let keys: Vec<(Value, NodeId)> = node
                    .targets(edge.id)
                    .iter()
                    .map(|&t| {
                        let target = self.engine.node(t).expect("target");
                        (target.property(&sort.property), t)
                    })
                    .collect();
                for pair in keys.windows(2) {
                    assert!(
                        pair[0] <= pair[1],
                        "edge {} out of order: {:?} then {:?}",
                        edge.name,
                        pair[0],
                        pair[1]
                    );
                }
            }
        }
    }

    fn check_executor_order(&self) {
        let mut query = Query::over("Post");
        query.sorts.push(Sort::asc("title"));
        let result: Vec<NodeId> = self
            .engine
            .execute(&query)
            .expect("execute")
            .iter()
            .map(|i| i.id)
            .collect();

        let mut expected: Vec<(Value, NodeId)> = self
            .live
            .iter()
            .filter_map(|&id| {
                let node = self.engine.node(id)?;
                if !self.posts.contains(&id) {
                    return None;
                }
                let title = node.property("title");
                if title.is_null() {
                    None
                } else {
                    Some((title, id))
                }
            })
            .collect();
        expected.sort();
        let expected: Vec<NodeId> = expected.into_iter().map(|(_, id)| id).collect();
        assert_eq!(result, expected, "executor order must match the index");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn store_invariants_hold_under_random_ops(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let mut harness = Harness::new();
        for op in &ops {
            harness.apply(op);
        }
        harness.check_reverse_symmetry();
        harness.check_edge_sort();
        harness.check_executor_order();
    }

    #[test]
    fn enter_leave_conserves_total_under_random_ops(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let mut harness = Harness::new();

        let mut query = Query::over("User");
        query.sorts.push(Sort::asc("name"));
        query.edges.push(EdgeSelection::named("posts"));
        let view = harness
            .engine
            .view(&query, ViewOptions::default())
            .expect("view");
        view.activate(false);

        let enters = Arc::new(Mutex::new(0isize));
        let leaves = Arc::new(Mutex::new(0isize));
        {
            let enters = enters.clone();
            let leaves = leaves.clone();
            view.set_callbacks(ViewCallbacks {
                on_enter: Box::new(move |_, _| *enters.lock().unwrap() += 1),
                on_leave: Box::new(move |_, _| *leaves.lock().unwrap() += 1),
            });
        }
        let baseline = view.total() as isize;

        for op in &ops {
            harness.apply(op);
            // Expand the first visible user's posts now and then to exercise
            // nested reconciliation.
            if let Some(first) = view.items().first().map(|i| i.id) {
                view.expand_by_id(first, "posts");
            }
        }

        let delta = view.total() as isize - baseline;
        let balance = *enters.lock().unwrap() - *leaves.lock().unwrap();
        prop_assert_eq!(balance, delta, "enter/leave flow must match the total");
    }
}
