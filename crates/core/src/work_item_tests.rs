// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn item(id: &str, priority: u32, created_at_ms: i64) -> WorkItem {
    WorkItem {
        id: id.into(),
        item_type: ItemType::Task,
        priority,
        agent: "coder".into(),
        depends_on: vec![],
        title: format!("item {}", id),
        created_at_ms,
    }
}

#[test]
fn order_key_prefers_project_then_priority_then_age() {
    let a = item("a", 2, 100);
    let b = item("b", 1, 200);
    let c = item("c", 1, 50);

    let mut keys = vec![
        ("a", a.order_key(0)),
        ("b", b.order_key(0)),
        ("c", c.order_key(0)),
    ];
    keys.sort_by_key(|(_, k)| *k);
    let order: Vec<&str> = keys.iter().map(|(id, _)| *id).collect();
    assert_eq!(order, vec!["c", "b", "a"]);

    // A lower-priority project outranks item priority
    assert!(a.order_key(0) < b.order_key(1));
}

#[test]
fn epic_predicate() {
    assert!(ItemType::Epic.is_epic());
    assert!(!ItemType::Bug.is_epic());
}

#[test]
fn item_type_round_trips() {
    for t in [
        ItemType::Task,
        ItemType::Bug,
        ItemType::Feature,
        ItemType::Chore,
        ItemType::Epic,
    ] {
        let parsed: ItemType = t.as_str().parse().unwrap();
        assert_eq!(parsed, t);
    }
}

#[test]
fn deserializes_from_backlog_json() {
    let json = r#"{
        "id": "cx-7",
        "type": "bug",
        "priority": 1,
        "agent": "coder",
        "title": "scheduler drops items"
    }"#;
    let item: WorkItem = serde_json::from_str(json).unwrap();
    assert_eq!(item.id, "cx-7");
    assert_eq!(item.item_type, ItemType::Bug);
    assert!(item.depends_on.is_empty());
    assert_eq!(item.created_at_ms, 0);
}
