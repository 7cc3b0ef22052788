//! The classes screen of one school, wired by hand.

use std::sync::{Arc, Mutex};

use serde_json::json;
use view_sync::{
    into_row, ChangeEvent, DataAccessExt, InsertPosition, Outcome, ReconciledCollection,
    RowFilter, SubscriptionDescriptor,
};

use crate::support::{manager, names, school_backend, wait_until, Class, WAIT};

type Screen = Arc<Mutex<ReconciledCollection<Class>>>;

fn snapshot(screen: &Screen) -> Vec<(i64, String)> {
    names(screen.lock().unwrap().items())
}

// ============================================================================
// Test 1: subscribe, load, then follow insert / update / delete
// ============================================================================

#[test]
fn classes_screen_follows_its_school() {
    let backend = school_backend();
    let manager = manager(&backend);
    let filter = RowFilter::eq("school_id", 42);

    let screen: Screen = Arc::new(Mutex::new(ReconciledCollection::new(InsertPosition::Append)));
    let outcomes = Arc::new(Mutex::new(Vec::new()));

    let handle = {
        let screen = Arc::clone(&screen);
        let outcomes = Arc::clone(&outcomes);
        manager
            .subscribe(
                SubscriptionDescriptor::new("classes")
                    .filter(filter.clone())
                    .on_event(move |event| {
                        let outcome = screen.lock().unwrap().apply(event).unwrap();
                        outcomes.lock().unwrap().push(outcome);
                    }),
            )
            .unwrap()
    };

    let loaded = backend.bulk_load_records::<Class>(Some(&filter)).unwrap();
    screen.lock().unwrap().seed(loaded);
    assert_eq!(snapshot(&screen), vec![(1, "CP1".to_string())]);

    backend
        .insert_record(&Class { id: 2, name: "CP2".into(), school_id: 42 })
        .unwrap();
    assert!(wait_until(WAIT, || screen.lock().unwrap().len() == 2));
    assert_eq!(
        snapshot(&screen),
        vec![(1, "CP1".to_string()), (2, "CP2".to_string())]
    );

    backend
        .update_record::<Class>(1, json!({"name": "CP1-A"}))
        .unwrap();
    assert!(wait_until(WAIT, || snapshot(&screen)[0].1 == "CP1-A"));
    assert_eq!(
        snapshot(&screen),
        vec![(1, "CP1-A".to_string()), (2, "CP2".to_string())]
    );

    backend.delete_record::<Class>(2).unwrap();
    assert!(wait_until(WAIT, || screen.lock().unwrap().len() == 1));
    assert_eq!(snapshot(&screen), vec![(1, "CP1-A".to_string())]);

    assert_eq!(
        *outcomes.lock().unwrap(),
        vec![Outcome::Inserted, Outcome::Updated, Outcome::Deleted]
    );
    handle.unsubscribe();
}

// ============================================================================
// Test 2: other schools' changes never reach the screen
// ============================================================================

#[test]
fn other_school_changes_are_invisible() {
    let backend = school_backend();
    let manager = manager(&backend);
    let filter = RowFilter::eq("school_id", 42);

    let screen: Screen = Arc::new(Mutex::new(ReconciledCollection::new(InsertPosition::Append)));
    let _handle = {
        let screen = Arc::clone(&screen);
        manager
            .subscribe(
                SubscriptionDescriptor::new("classes")
                    .filter(filter.clone())
                    .on_event(move |event| {
                        screen.lock().unwrap().apply(event).unwrap();
                    }),
            )
            .unwrap()
    };
    let loaded = backend.bulk_load_records::<Class>(Some(&filter)).unwrap();
    screen.lock().unwrap().seed(loaded);

    backend
        .insert_record(&Class { id: 8, name: "CM1".into(), school_id: 9 })
        .unwrap();
    backend.delete_record::<Class>(7).unwrap();
    backend
        .insert_record(&Class { id: 3, name: "CE1".into(), school_id: 42 })
        .unwrap();

    assert!(wait_until(WAIT, || screen.lock().unwrap().len() == 2));
    assert_eq!(
        snapshot(&screen),
        vec![(1, "CP1".to_string()), (3, "CE1".to_string())]
    );
}

// ============================================================================
// Test 3: the echo of the screen's own optimistic write changes nothing
// ============================================================================

#[test]
fn echo_of_own_write_is_idempotent() {
    let backend = school_backend();
    let manager = manager(&backend);

    let screen: Screen = Arc::new(Mutex::new(ReconciledCollection::new(InsertPosition::Append)));
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let _handle = {
        let screen = Arc::clone(&screen);
        let outcomes = Arc::clone(&outcomes);
        manager
            .subscribe(SubscriptionDescriptor::new("classes").on_event(move |event| {
                let outcome = screen.lock().unwrap().apply(event).unwrap();
                outcomes.lock().unwrap().push(outcome);
            }))
            .unwrap()
    };
    let loaded = backend.bulk_load_records::<Class>(None).unwrap();
    screen.lock().unwrap().seed(loaded);

    let created = Class { id: 3, name: "CE1".into(), school_id: 42 };
    {
        // Optimistic local insert before the write round-trips.
        let mut screen = screen.lock().unwrap();
        let local = ChangeEvent::insert(
            "classes",
            into_row(serde_json::to_value(&created).unwrap()).unwrap(),
        );
        assert_eq!(screen.apply(&local).unwrap(), Outcome::Inserted);
    }
    backend.insert_record(&created).unwrap();

    assert!(wait_until(WAIT, || outcomes.lock().unwrap().len() == 1));
    assert_eq!(*outcomes.lock().unwrap(), vec![Outcome::Unchanged]);
    assert_eq!(screen.lock().unwrap().len(), 3);
}
