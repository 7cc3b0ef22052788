//! Live changes that land between subscribe and the bulk load resolving.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::json;
use view_sync::{
    DataAccessExt, InsertPosition, LiveQuery, LiveQueryOptions, ReconciledCollection,
    SubscriptionDescriptor,
};

use crate::support::{manager, school_backend, wait_until, Payroll, WAIT};

// ============================================================================
// Test 1: the live UPDATE arrives before the stale snapshot
// ============================================================================

#[test]
fn live_update_beats_stale_snapshot() {
    let backend = school_backend();
    let manager = manager(&backend);

    let screen = Arc::new(Mutex::new(ReconciledCollection::<Payroll>::new(
        InsertPosition::Append,
    )));
    let _handle = {
        let screen = Arc::clone(&screen);
        manager
            .subscribe(SubscriptionDescriptor::new("payroll").on_event(move |event| {
                screen.lock().unwrap().apply(event).unwrap();
            }))
            .unwrap()
    };

    // The load starts and reads the DRAFT row...
    let stale = backend.bulk_load_records::<Payroll>(None).unwrap();

    // ...then the row is paid and the live event lands first.
    backend
        .update_record::<Payroll>(5, json!({"status": "PAID"}))
        .unwrap();
    assert!(wait_until(WAIT, || screen.lock().unwrap().pending_len() == 1));

    screen.lock().unwrap().seed(stale);

    let screen = screen.lock().unwrap();
    assert_eq!(
        screen.items(),
        &[Payroll { id: 5, status: "PAID".into(), amount: 1200 }]
    );
    assert_eq!(screen.pending_len(), 0);
}

// ============================================================================
// Test 2: the same race through a live query
// ============================================================================

#[test]
fn live_query_keeps_update_committed_during_load() {
    let backend = school_backend();
    let manager = manager(&backend);

    let writer = backend.clone();
    backend.on_bulk_load(move |_| {
        writer
            .update_record::<Payroll>(5, json!({"status": "PAID"}))
            .unwrap();
        // Give the dispatcher time to deliver before the load returns.
        thread::sleep(Duration::from_millis(50));
    });

    let payroll = LiveQuery::<Payroll>::mount(&manager, &backend, LiveQueryOptions::new()).unwrap();
    backend.clear_bulk_load_hook();

    let paid = vec![Payroll { id: 5, status: "PAID".into(), amount: 1200 }];
    assert!(wait_until(WAIT, || payroll.items() == paid));
}

#[test]
fn live_query_drops_record_deleted_during_load() {
    let backend = school_backend();
    let manager = manager(&backend);

    let writer = backend.clone();
    backend.on_bulk_load(move |_| {
        writer.delete_record::<Payroll>(5).unwrap();
        thread::sleep(Duration::from_millis(50));
    });

    let payroll = LiveQuery::<Payroll>::mount(&manager, &backend, LiveQueryOptions::new()).unwrap();
    backend.clear_bulk_load_hook();

    assert!(wait_until(WAIT, || payroll.is_empty()));
}

#[test]
fn live_query_adds_record_inserted_during_load() {
    let backend = school_backend();
    let manager = manager(&backend);

    let writer = backend.clone();
    backend.on_bulk_load(move |_| {
        writer
            .insert_record(&Payroll { id: 6, status: "DRAFT".into(), amount: 900 })
            .unwrap();
        thread::sleep(Duration::from_millis(50));
    });

    let payroll = LiveQuery::<Payroll>::mount(
        &manager,
        &backend,
        LiveQueryOptions::new().position(InsertPosition::Append),
    )
    .unwrap();
    backend.clear_bulk_load_hook();

    assert!(wait_until(WAIT, || payroll.len() == 2));
    let ids: Vec<i64> = payroll.items().iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![5, 6]);
}
