use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempo::{block_on, task, wait, Error};

#[test]
fn until_completes_when_the_predicate_holds() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    block_on(async move {
        wait::until(move || counter.fetch_add(1, Ordering::SeqCst) + 1 >= 5)
            .await
            .unwrap();
    });
    // one call per tick, none after completion
    assert_eq!(hits.load(Ordering::SeqCst), 5);
}

#[test]
fn while_true_completes_when_the_predicate_stops_holding() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    block_on(async move {
        wait::while_true(move || counter.fetch_add(1, Ordering::SeqCst) + 1 < 3)
            .await
            .unwrap();
    });
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[test]
fn for_change_yields_the_new_value() {
    let watched = Arc::new(AtomicU32::new(1));
    let writer = watched.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        writer.store(7, Ordering::SeqCst);
    });
    let out = block_on(async move {
        wait::for_change(move || watched.load(Ordering::SeqCst)).await
    });
    assert_eq!(out, Ok(7));
}

#[test]
fn predicate_panic_becomes_a_fault() {
    let out = block_on(async {
        wait::until(|| panic!("boom in predicate")).await
    });
    match out {
        Err(Error::Faulted(message)) => assert!(message.contains("boom in predicate")),
        other => panic!("expected a fault, got {other:?}"),
    }
}

#[test]
fn the_loop_survives_a_faulting_predicate() {
    block_on(async {
        let _ = wait::until(|| panic!("contained")).await;
        // the panic never unwound into the tick loop; new work still runs
        task::yield_now().await.unwrap();
    });
}

#[test]
fn watch_panic_at_construction_is_an_immediate_fault() {
    let out = block_on(async {
        wait::for_change::<u32, _>(|| panic!("sample failed")).await
    });
    match out {
        Err(Error::Faulted(message)) => assert!(message.contains("sample failed")),
        other => panic!("expected a fault, got {other:?}"),
    }
}

#[test]
fn yield_now_completes() {
    block_on(async {
        task::yield_now().await.unwrap();
    });
}

#[test]
fn yields_recycle_their_arena_slots() {
    block_on(async {
        for _ in 0..128 {
            task::yield_now().await.unwrap();
        }
    });
}

#[test]
fn yield_to_every_phase() {
    block_on(async {
        for timing in [tempo::Timing::Early, tempo::Timing::Update, tempo::Timing::Late] {
            task::yield_to(timing).await.unwrap();
        }
    });
}
