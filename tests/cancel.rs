use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempo::time::delay_with;
use tempo::{task, wait, CancelSource, CancelToken, Error, Timing};

#[test]
fn none_token_cannot_be_signaled() {
    let token = CancelToken::none();
    assert!(!token.can_be_signaled());
    assert!(!token.is_signaled());
}

#[test]
fn callback_runs_on_signal() {
    let source = CancelSource::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let registration = source.token().register(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    source.cancel();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    drop(registration);
}

#[test]
fn cancel_is_idempotent() {
    let source = CancelSource::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let _registration = source.token().register(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    source.cancel();
    source.cancel();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn register_on_a_signaled_source_runs_inline() {
    let source = CancelSource::new();
    source.cancel();
    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    let _registration = source.token().register(move || flag.store(true, Ordering::SeqCst));
    assert!(ran.load(Ordering::SeqCst));
}

#[test]
fn dropped_registration_is_revoked() {
    let source = CancelSource::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let registration = source.token().register(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    drop(registration);
    source.cancel();
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn already_signaled_token_never_invokes_the_predicate() {
    let source = CancelSource::new();
    source.cancel();
    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();
    let token = source.token();
    let out = tempo::block_on(async move {
        wait::until_with(
            move || {
                flag.store(true, Ordering::SeqCst);
                true
            },
            Timing::Update,
            token,
            false,
        )
        .await
    });
    assert_eq!(out, Err(Error::Canceled));
    assert!(!called.load(Ordering::SeqCst));
}

#[test]
fn cancel_immediately_interrupts_a_long_delay() {
    let source = CancelSource::new();
    let token = source.token();
    let start = Instant::now();
    let out = tempo::block_on(async move {
        let task = delay_with(Duration::from_secs(30), Timing::Update, token, true);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            source.cancel();
        });
        task.await
    });
    assert_eq!(out, Err(Error::Canceled));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn deferred_cancellation_is_observed_on_the_next_tick() {
    let source = CancelSource::new();
    let token = source.token();
    let start = Instant::now();
    let out = tempo::block_on(async move {
        let task = delay_with(Duration::from_secs(30), Timing::Update, token, false);
        source.cancel();
        task.await
    });
    assert_eq!(out, Err(Error::Canceled));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn signaled_completes_successfully() {
    let source = CancelSource::new();
    let token = source.token();
    tempo::block_on(async move {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            source.cancel();
        });
        wait::signaled(token).await.unwrap();
    });
}

#[test]
fn already_signaled_resolves_without_waiting() {
    let source = CancelSource::new();
    source.cancel();
    tempo::block_on(async move {
        wait::signaled(source.token()).await.unwrap();
    });
}

#[test]
fn never_resolves_only_through_cancellation() {
    let source = CancelSource::new();
    let token = source.token();
    let out = tempo::block_on(async move {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            source.cancel();
        });
        task::never(token).await
    });
    assert_eq!(out, Err(Error::Canceled));
}
