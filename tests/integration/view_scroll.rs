#![allow(missing_docs)]

use canopy::{Engine, Query, Sort, Value, ViewOptions};

#[test]
fn scrolls_a_flat_hundred_thousand_node_view() {
    let g = Engine::from_schema_json(
        r#"{ "types": [
          { "name": "Row",
            "properties": [ { "name": "priority", "type": "int" } ],
            "indexes": [ { "fields": [ { "field": "priority" } ] } ] }
        ] }"#,
    )
    .expect("schema loads");

    const N: i64 = 100_000;
    // Insert out of priority order so the index does the sorting.
    for i in 0..N {
        let priority = (i * 7919) % N;
        let id = g.insert("Row").expect("insert");
        g.update(id, [("priority", Value::Int(priority))])
            .expect("priority");
    }
    assert_eq!(g.node_count(), N as usize);

    let mut query = Query::over("Row");
    query.sorts.push(Sort::asc("priority"));
    let view = g.view(&query, ViewOptions { limit: 100 }).expect("view");
    view.activate(false);
    assert_eq!(view.total(), N as usize);

    let priorities = |view: &canopy::View| -> Vec<i64> {
        view.items()
            .iter()
            .map(|item| match g.node(item.id).expect("row").property("priority") {
                Value::Int(p) => p,
                other => panic!("unexpected priority {other:?}"),
            })
            .collect()
    };

    view.scroll_to(50_000);
    assert_eq!(view.get_offset(), 50_000);
    let window = priorities(&view);
    assert_eq!(window.len(), 100);
    assert_eq!(window, (50_000..50_100).collect::<Vec<_>>());

    // Scrolling past the end clamps to total - limit.
    view.scroll_to(99_950);
    assert_eq!(view.get_offset(), 99_900);
    let window = priorities(&view);
    assert_eq!(window, (99_900..100_000).collect::<Vec<_>>());

    // Relative movement composes with clamping.
    view.move_by(-100);
    assert_eq!(view.get_offset(), 99_800);
    view.move_by(isize::MIN);
    assert_eq!(view.get_offset(), 0);
    assert_eq!(priorities(&view), (0..100).collect::<Vec<_>>());
}
