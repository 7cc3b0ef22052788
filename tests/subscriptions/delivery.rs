//! Event delivery: filters, handler shapes, ordering, malformed payloads.

use std::thread;
use std::time::Duration;

use serde_json::json;
use view_sync::{
    ChangeEvent, DataAccess, Mutation, Operation, RecordId, SubscriptionDescriptor,
};

use crate::support::{class_insert, classes_backend, manager, row, wait_until, Recorder, WAIT};

// ============================================================================
// Test 1: descriptors on one table with different filters are independent
// ============================================================================

#[test]
fn row_filters_are_independent() {
    let backend = classes_backend();
    let manager = manager(&backend);
    let school_42 = Recorder::new();
    let school_7 = Recorder::new();

    let _a = manager
        .subscribe(
            SubscriptionDescriptor::new("classes")
                .filter_eq("school_id", 42)
                .on_event(school_42.handler()),
        )
        .unwrap();
    let _b = manager
        .subscribe(
            SubscriptionDescriptor::new("classes")
                .filter_eq("school_id", 7)
                .on_event(school_7.handler()),
        )
        .unwrap();
    assert_eq!(manager.channels_for("classes").len(), 2);

    backend
        .mutate("classes", Mutation::Insert(row(json!({"id": 3, "name": "CM1", "school_id": 42}))))
        .unwrap();
    backend
        .mutate("classes", Mutation::Insert(row(json!({"id": 4, "name": "CM2", "school_id": 7}))))
        .unwrap();

    assert!(school_42.wait_for(1));
    assert!(school_7.wait_for(1));
    thread::sleep(Duration::from_millis(30));

    assert_eq!(school_42.ids(), vec!["3"]);
    assert_eq!(school_7.ids(), vec!["4"]);
}

// ============================================================================
// Test 2: events on one channel arrive in commit order
// ============================================================================

#[test]
fn events_arrive_in_commit_order() {
    let backend = classes_backend();
    let manager = manager(&backend);
    let recorder = Recorder::new();

    let _handle = manager
        .subscribe(SubscriptionDescriptor::new("classes").on_event(recorder.handler()))
        .unwrap();

    backend
        .mutate("classes", Mutation::Insert(row(json!({"id": 3, "name": "CM1", "school_id": 42}))))
        .unwrap();
    backend
        .mutate(
            "classes",
            Mutation::Update {
                id: RecordId::from(3),
                changes: row(json!({"name": "CM1-A"})),
            },
        )
        .unwrap();
    backend
        .mutate("classes", Mutation::Delete { id: RecordId::from(3) })
        .unwrap();

    assert!(recorder.wait_for(3));
    assert_eq!(
        recorder.operations(),
        vec![Operation::Insert, Operation::Update, Operation::Delete]
    );
}

#[test]
fn many_events_keep_their_order() {
    let backend = classes_backend();
    let manager = manager(&backend);
    let recorder = Recorder::new();

    let _handle = manager
        .subscribe(SubscriptionDescriptor::new("classes").on_event(recorder.handler()))
        .unwrap();

    for id in 100..200 {
        backend.publish(class_insert(id, 42));
    }

    assert!(recorder.wait_for(100));
    let expected: Vec<String> = (100..200).map(|id: i64| id.to_string()).collect();
    assert_eq!(recorder.ids(), expected);
}

// ============================================================================
// Test 3: operation-specific handlers
// ============================================================================

#[test]
fn specific_handlers_only_see_their_operation() {
    let backend = classes_backend();
    let manager = manager(&backend);
    let inserts = Recorder::new();
    let deletes = Recorder::new();

    let handle = manager
        .subscribe(
            SubscriptionDescriptor::new("classes")
                .on_insert(inserts.handler())
                .on_delete(deletes.handler()),
        )
        .unwrap();

    backend
        .mutate("classes", Mutation::Insert(row(json!({"id": 3, "name": "CM1", "school_id": 42}))))
        .unwrap();
    backend
        .mutate(
            "classes",
            Mutation::Update {
                id: RecordId::from(3),
                changes: row(json!({"name": "CM1-A"})),
            },
        )
        .unwrap();
    backend
        .mutate("classes", Mutation::Delete { id: RecordId::from(3) })
        .unwrap();

    assert!(wait_until(WAIT, || handle.stats().delivered == 2));
    assert_eq!(inserts.operations(), vec![Operation::Insert]);
    assert_eq!(deletes.operations(), vec![Operation::Delete]);
    assert_eq!(handle.stats().filtered, 1);
}

#[test]
fn operation_filter_skips_other_operations() {
    let backend = classes_backend();
    let manager = manager(&backend);
    let recorder = Recorder::new();

    let handle = manager
        .subscribe(
            SubscriptionDescriptor::new("classes")
                .operation(Operation::Update)
                .on_event(recorder.handler()),
        )
        .unwrap();

    backend
        .mutate(
            "classes",
            Mutation::Update {
                id: RecordId::from(1),
                changes: row(json!({"name": "CP1-A"})),
            },
        )
        .unwrap();
    backend
        .mutate("classes", Mutation::Delete { id: RecordId::from(1) })
        .unwrap();
    backend.publish(class_insert(9, 42));

    assert!(wait_until(WAIT, || handle.stats().filtered == 2));
    assert_eq!(recorder.operations(), vec![Operation::Update]);
    assert_eq!(handle.stats().delivered, 1);
}

// ============================================================================
// Test 4: malformed payloads are dropped, later events still arrive
// ============================================================================

#[test]
fn malformed_payloads_are_dropped() {
    let backend = classes_backend();
    let manager = manager(&backend);
    let recorder = Recorder::new();

    let handle = manager
        .subscribe(SubscriptionDescriptor::new("classes").on_event(recorder.handler()))
        .unwrap();

    backend.inject_raw("classes", json!("not an object"));
    backend.inject_raw(
        "classes",
        json!({"table": "classes", "eventType": "TRUNCATE", "new": {}, "old": {}}),
    );
    backend.inject_raw(
        "classes",
        json!({"table": "classes", "eventType": "UPDATE", "old": {"id": 1}}),
    );
    backend.inject_raw(
        "classes",
        json!({"table": "students", "eventType": "INSERT", "new": {"id": 1}, "old": {}}),
    );
    backend.publish(class_insert(10, 42));

    assert!(wait_until(WAIT, || handle.stats().delivered == 1));
    assert_eq!(recorder.ids(), vec!["10"]);
    assert_eq!(handle.stats().dropped, 4);
}

// ============================================================================
// Test 5: raw payload aliases decode like the canonical shape
// ============================================================================

#[test]
fn payload_aliases_are_accepted() {
    let backend = classes_backend();
    let manager = manager(&backend);
    let recorder = Recorder::new();

    let _handle = manager
        .subscribe(SubscriptionDescriptor::new("classes").on_event(recorder.handler()))
        .unwrap();

    backend.inject_raw(
        "classes",
        json!({
            "table": "classes",
            "type": "DELETE",
            "old_record": {"id": 2, "school_id": 7},
            "record": null,
            "commit_timestamp": "2024-09-01T08:00:00Z"
        }),
    );

    assert!(recorder.wait_for(1));
    let expected = ChangeEvent::delete("classes", row(json!({"id": 2, "school_id": 7})))
        .with_commit_timestamp("2024-09-01T08:00:00Z");
    assert_eq!(recorder.events(), vec![expected]);
}
