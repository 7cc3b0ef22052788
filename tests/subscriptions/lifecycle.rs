//! Subscribe / unsubscribe lifecycle.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use view_sync::{
    ChannelState, RowFilter, SubscriptionDescriptor, SubscriptionError, SubscriptionHandle,
};

use crate::support::{class_insert, classes_backend, manager, wait_until, Recorder, WAIT};

// ============================================================================
// Test 1: subscribe opens a channel, unsubscribe closes it
// ============================================================================

#[test]
fn subscribe_opens_and_unsubscribe_closes_channel() {
    let backend = classes_backend();
    let manager = manager(&backend);

    let handle = manager
        .subscribe(SubscriptionDescriptor::new("classes").on_event(|_| {}))
        .unwrap();

    assert_eq!(handle.state(), ChannelState::Open);
    assert!(handle.is_active());
    assert_eq!(manager.channel_count(), 1);
    assert_eq!(backend.open_streams("classes"), 1);
    assert_eq!(handle.topic().unwrap().name(), "realtime:classes");

    handle.unsubscribe();

    assert_eq!(handle.state(), ChannelState::Closed);
    assert!(!handle.is_active());
    assert_eq!(manager.channel_count(), 0);
    assert_eq!(backend.open_streams("classes"), 0);
}

// ============================================================================
// Test 2: unsubscribe is idempotent
// ============================================================================

#[test]
fn unsubscribe_twice_is_harmless() {
    let backend = classes_backend();
    let manager = manager(&backend);

    let handle = manager
        .subscribe(SubscriptionDescriptor::new("classes").on_event(|_| {}))
        .unwrap();

    handle.unsubscribe();
    handle.unsubscribe();
    manager.unsubscribe(&handle);

    assert_eq!(manager.channel_count(), 0);
}

// ============================================================================
// Test 3: no callback after unsubscribe returns
// ============================================================================

#[test]
fn no_callback_after_unsubscribe() {
    let backend = classes_backend();
    let manager = manager(&backend);
    let recorder = Recorder::new();

    let handle = manager
        .subscribe(SubscriptionDescriptor::new("classes").on_event(recorder.handler()))
        .unwrap();

    backend.publish(class_insert(10, 42));
    assert!(recorder.wait_for(1));

    handle.unsubscribe();
    backend.publish(class_insert(11, 42));
    thread::sleep(Duration::from_millis(50));

    assert_eq!(recorder.len(), 1);
}

#[test]
fn no_callback_after_unsubscribe_under_load() {
    let backend = classes_backend();
    let manager = manager(&backend);

    let unsubscribed = Arc::new(AtomicBool::new(false));
    let late_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));

    let handle = {
        let unsubscribed = Arc::clone(&unsubscribed);
        let late_calls = Arc::clone(&late_calls);
        let calls = Arc::clone(&calls);
        manager
            .subscribe(SubscriptionDescriptor::new("classes").on_event(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
                if unsubscribed.load(Ordering::SeqCst) {
                    late_calls.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .unwrap()
    };

    let stop = Arc::new(AtomicBool::new(false));
    let publisher = {
        let backend = backend.clone();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut id = 100;
            while !stop.load(Ordering::SeqCst) {
                backend.publish(class_insert(id, 42));
                id += 1;
                thread::sleep(Duration::from_micros(200));
            }
        })
    };

    assert!(wait_until(WAIT, || calls.load(Ordering::SeqCst) >= 5));
    handle.unsubscribe();
    unsubscribed.store(true, Ordering::SeqCst);

    thread::sleep(Duration::from_millis(50));
    stop.store(true, Ordering::SeqCst);
    publisher.join().unwrap();

    assert_eq!(late_calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Test 4: a handler may unsubscribe its own subscription
// ============================================================================

#[test]
fn handler_can_unsubscribe_itself() {
    let backend = classes_backend();
    let manager = manager(&backend);

    let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
    let calls = Arc::new(AtomicUsize::new(0));

    let handle = {
        let slot = Arc::clone(&slot);
        let calls = Arc::clone(&calls);
        manager
            .subscribe(SubscriptionDescriptor::new("classes").on_event(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(handle) = slot.lock().unwrap().as_ref() {
                    handle.unsubscribe();
                }
            }))
            .unwrap()
    };
    *slot.lock().unwrap() = Some(handle);

    backend.publish(class_insert(10, 42));
    backend.publish(class_insert(11, 42));

    assert!(wait_until(WAIT, || manager.channel_count() == 0));
    thread::sleep(Duration::from_millis(30));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let handle = slot.lock().unwrap().take().unwrap();
    assert_eq!(handle.state(), ChannelState::Closed);
    drop(handle);
}

#[test]
fn handlers_may_unsubscribe_each_other() {
    let backend = classes_backend();
    let manager = manager(&backend);

    type Slot = Arc<Mutex<Option<SubscriptionHandle>>>;
    let first: Slot = Arc::new(Mutex::new(None));
    let second: Slot = Arc::new(Mutex::new(None));
    let both_inside = Arc::new(Barrier::new(2));
    let calls = Arc::new(AtomicUsize::new(0));

    let subscribe = |other: &Slot| {
        let other = Arc::clone(other);
        let both_inside = Arc::clone(&both_inside);
        let calls = Arc::clone(&calls);
        manager
            .subscribe(SubscriptionDescriptor::new("classes").on_event(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                both_inside.wait();
                let handle = other.lock().unwrap().take();
                if let Some(handle) = handle {
                    handle.unsubscribe();
                }
            }))
            .unwrap()
    };
    let first_handle = subscribe(&second);
    let second_handle = subscribe(&first);
    *first.lock().unwrap() = Some(first_handle);
    *second.lock().unwrap() = Some(second_handle);

    backend.publish(class_insert(10, 42));

    assert!(wait_until(WAIT, || manager.channel_count() == 0));
    thread::sleep(Duration::from_millis(30));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(first.lock().unwrap().is_none());
    assert!(second.lock().unwrap().is_none());
}

// ============================================================================
// Test 5: disabled descriptors and invalid descriptors
// ============================================================================

#[test]
fn disabled_descriptor_opens_nothing() {
    let backend = classes_backend();
    let manager = manager(&backend);
    let recorder = Recorder::new();

    let handle = manager
        .subscribe(
            SubscriptionDescriptor::new("classes")
                .enabled(false)
                .on_event(recorder.handler()),
        )
        .unwrap();

    assert!(handle.is_noop());
    assert_eq!(handle.state(), ChannelState::Closed);
    assert_eq!(manager.channel_count(), 0);
    assert_eq!(backend.open_streams("classes"), 0);

    backend.publish(class_insert(10, 42));
    thread::sleep(Duration::from_millis(30));
    assert_eq!(recorder.len(), 0);

    handle.unsubscribe();
}

#[test]
fn empty_table_is_rejected() {
    let backend = classes_backend();
    let manager = manager(&backend);

    let err = manager
        .subscribe(SubscriptionDescriptor::new("  ").on_event(|_| {}))
        .unwrap_err();

    assert!(matches!(err, SubscriptionError::InvalidDescriptor(_)));
    assert_eq!(manager.channel_count(), 0);
}

// ============================================================================
// Test 6: dropping the handle unsubscribes
// ============================================================================

#[test]
fn dropping_handle_unsubscribes() {
    let backend = classes_backend();
    let manager = manager(&backend);
    let recorder = Recorder::new();

    {
        let _handle = manager
            .subscribe(SubscriptionDescriptor::new("classes").on_event(recorder.handler()))
            .unwrap();
        assert_eq!(manager.channel_count(), 1);
    }

    assert_eq!(manager.channel_count(), 0);
    assert_eq!(backend.open_streams("classes"), 0);

    backend.publish(class_insert(10, 42));
    thread::sleep(Duration::from_millis(30));
    assert_eq!(recorder.len(), 0);
}

// ============================================================================
// Test 7: resubscribe on a dependency change
// ============================================================================

#[test]
fn resubscribe_replaces_the_channel() {
    let backend = classes_backend();
    let manager = manager(&backend);
    let before = Recorder::new();
    let after = Recorder::new();

    let handle = manager
        .subscribe(
            SubscriptionDescriptor::new("classes")
                .filter_eq("school_id", 42)
                .on_event(before.handler()),
        )
        .unwrap();
    let old_id = handle.channel_id().unwrap();

    let handle = manager
        .resubscribe(
            handle,
            SubscriptionDescriptor::new("classes")
                .filter_eq("school_id", 7)
                .on_event(after.handler()),
        )
        .unwrap();

    let channels = manager.channels_for("classes");
    assert_eq!(channels.len(), 1);
    assert_ne!(channels[0].id, old_id);
    assert_eq!(channels[0].topic.filter, Some(RowFilter::eq("school_id", 7)));
    assert_eq!(backend.open_streams("classes"), 1);

    backend.publish(class_insert(10, 42));
    backend.publish(class_insert(11, 7));
    assert!(after.wait_for(1));
    thread::sleep(Duration::from_millis(30));

    assert_eq!(before.len(), 0);
    assert_eq!(after.ids(), vec!["11"]);
    drop(handle);
}

// ============================================================================
// Test 8: concurrent subscribe and unsubscribe from many screens
// ============================================================================

#[test]
fn concurrent_subscribe_and_unsubscribe() {
    let backend = classes_backend().with_table("students", Vec::new());
    let manager = manager(&backend);

    let workers: Vec<_> = (0..8)
        .map(|n| {
            let manager = manager.clone();
            thread::spawn(move || {
                let mut kept = Vec::new();
                for i in 0..10 {
                    let table = if (n + i) % 2 == 0 { "classes" } else { "students" };
                    let handle = manager
                        .subscribe(SubscriptionDescriptor::new(table).on_event(|_| {}))
                        .unwrap();
                    if i % 3 == 0 {
                        kept.push(handle);
                    } else {
                        handle.unsubscribe();
                    }
                }
                kept
            })
        })
        .collect();

    let kept: Vec<SubscriptionHandle> = workers
        .into_iter()
        .flat_map(|worker| worker.join().unwrap())
        .collect();

    assert_eq!(manager.channel_count(), kept.len());
    assert_eq!(
        backend.open_streams("classes") + backend.open_streams("students"),
        kept.len()
    );

    drop(kept);
    assert_eq!(manager.channel_count(), 0);
    assert_eq!(backend.open_streams("classes"), 0);
    assert_eq!(backend.open_streams("students"), 0);
}
