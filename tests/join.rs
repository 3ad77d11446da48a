use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use tempo::time::delay;
use tempo::{block_on, join, task, CancelToken, CompletionSource, Error, Task};

fn sources(count: usize) -> (Vec<CompletionSource<usize>>, Vec<Task<usize>>) {
    let mut sources = Vec::with_capacity(count);
    let mut tasks = Vec::with_capacity(count);
    for _ in 0..count {
        let (source, task) = CompletionSource::new();
        sources.push(source);
        tasks.push(task);
    }
    (sources, tasks)
}

#[test]
fn all_preserves_the_original_order() {
    for _ in 0..16 {
        let (sources, tasks) = sources(8);
        let all = join::all(tasks);

        let mut order: Vec<usize> = (0..8).collect();
        fastrand::shuffle(&mut order);
        for index in order {
            assert!(sources[index].try_set_result(index * 10));
        }

        let expected: Vec<usize> = (0..8).map(|index| index * 10).collect();
        assert_eq!(block_on(all), Ok(expected));
    }
}

#[test]
fn all_of_nothing_is_an_empty_buffer() {
    let all: Task<Vec<u32>> = join::all(Vec::new());
    assert_eq!(block_on(all), Ok(Vec::new()));
}

#[test]
fn all_fails_with_the_first_fault() {
    let (sources, tasks) = sources(3);
    let all = join::all(tasks);

    sources[1].try_set_error("first fault");
    sources[0].try_set_result(0);
    sources[2].try_set_error("second fault");

    match block_on(all) {
        Err(Error::Faulted(message)) => assert!(message.contains("first fault")),
        other => panic!("expected the first fault, got {other:?}"),
    }
}

#[test]
fn all_propagates_a_canceled_child() {
    let (sources, tasks) = sources(2);
    let all = join::all(tasks);
    sources[0].try_set_canceled();
    sources[1].try_set_result(5);
    assert_eq!(block_on(all), Err(Error::Canceled));
}

#[test]
fn all_completes_across_threads() {
    let (sources, tasks) = sources(16);
    let all = join::all(tasks);

    let barrier = Arc::new(Barrier::new(16));
    let (done_tx, done_rx) = crossbeam_channel::unbounded();
    let mut completers = Vec::new();
    for (index, source) in sources.into_iter().enumerate() {
        let barrier = barrier.clone();
        let done = done_tx.clone();
        completers.push(thread::spawn(move || {
            barrier.wait();
            assert!(source.try_set_result(index));
            done.send(index).unwrap();
        }));
    }
    drop(done_tx);

    assert_eq!(done_rx.iter().count(), 16);
    for completer in completers {
        completer.join().unwrap();
    }
    let expected: Vec<usize> = (0..16).collect();
    assert_eq!(block_on(all), Ok(expected));
}

#[test]
fn any_yields_the_winner() {
    let (sources, tasks) = sources(3);
    let any = join::any(tasks);

    sources[2].try_set_result(30);
    sources[0].try_set_result(10);
    sources[1].try_set_error("loser fault is drained");

    assert_eq!(block_on(any), Ok((2, 30)));
}

#[test]
fn any_of_nothing_is_an_error() {
    let any: Task<(usize, u32)> = join::any(Vec::new());
    assert_eq!(block_on(any), Err(Error::NoChildren));
}

#[test]
fn any_fails_when_a_fault_comes_first() {
    let (sources, tasks) = sources(2);
    let any = join::any(tasks);
    sources[1].try_set_error("fast failure");
    sources[0].try_set_result(1);
    match block_on(any) {
        Err(Error::Faulted(message)) => assert!(message.contains("fast failure")),
        other => panic!("expected a fault, got {other:?}"),
    }
}

#[test]
fn any_picks_the_shorter_delay() {
    let out = block_on(async {
        join::any(vec![
            delay(Duration::from_millis(300)),
            delay(Duration::from_millis(30)),
        ])
        .await
    });
    assert_eq!(out, Ok((1, ())));
}

#[test]
fn timeouts_compose_from_never_and_delay() {
    // the idiomatic timeout: race the operation against a delay
    let out = block_on(async {
        join::any(vec![
            task::never(CancelToken::none()),
            delay(Duration::from_millis(30)),
        ])
        .await
    });
    assert_eq!(out, Ok((1, ())));
}

#[test]
fn any_decides_exactly_once_across_threads() {
    for _ in 0..8 {
        let (sources, tasks) = sources(8);
        let any = join::any(tasks);

        let barrier = Arc::new(Barrier::new(8));
        let completers: Vec<_> = sources
            .into_iter()
            .enumerate()
            .map(|(index, source)| {
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    source.try_set_result(index);
                })
            })
            .collect();
        for completer in completers {
            completer.join().unwrap();
        }

        let (index, value) = block_on(any).unwrap();
        assert_eq!(index, value);
        assert!(index < 8);
    }
}
