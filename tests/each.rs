use std::time::Duration;

use tempo::time::delay;
use tempo::{block_on, join, CompletionSource, Error, Task};

fn sources(count: usize) -> (Vec<CompletionSource<u32>>, Vec<Task<u32>>) {
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
fn results_stream_in_completion_order() {
    block_on(async {
        let mut stream = join::each(vec![
            delay(Duration::from_millis(300)),
            delay(Duration::from_millis(100)),
            delay(Duration::from_millis(200)),
        ]);
        let mut indices = Vec::new();
        while let Some(item) = stream.next().await {
            indices.push(item.unwrap().0);
        }
        assert_eq!(indices, vec![1, 2, 0]);
    });
}

#[test]
fn the_stream_ends_after_every_child() {
    let (sources, tasks) = sources(2);
    let mut stream = join::each(tasks);
    sources[0].try_set_result(1);
    sources[1].try_set_result(2);
    block_on(async move {
        assert_eq!(stream.next().await, Some(Ok((0, 1))));
        assert_eq!(stream.next().await, Some(Ok((1, 2))));
        assert_eq!(stream.next().await, None);
        assert_eq!(stream.next().await, None);
    });
}

#[test]
fn empty_input_yields_no_children_then_ends() {
    let mut stream: join::WhenEach<u32> = join::each(Vec::new());
    block_on(async move {
        assert_eq!(stream.next().await, Some(Err(Error::NoChildren)));
        assert_eq!(stream.next().await, None);
    });
}

#[test]
fn failures_stream_in_completion_order_too() {
    let (sources, tasks) = sources(2);
    let mut stream = join::each(tasks);
    sources[1].try_set_error("early failure");
    sources[0].try_set_result(4);
    block_on(async move {
        match stream.next().await {
            Some(Err(Error::Faulted(message))) => assert!(message.contains("early failure")),
            other => panic!("expected the failure first, got {other:?}"),
        }
        assert_eq!(stream.next().await, Some(Ok((0, 4))));
        assert_eq!(stream.next().await, None);
    });
}

#[test]
fn try_next_does_not_wait() {
    let (sources, tasks) = sources(1);
    let mut stream = join::each(tasks);
    assert_eq!(stream.try_next(), None);
    sources[0].try_set_result(9);
    assert_eq!(stream.try_next(), Some(Ok((0, 9))));
}

#[test]
fn dropping_the_stream_still_drains_children() {
    let (sources, tasks) = sources(3);
    let mut stream = join::each(tasks);
    sources[0].try_set_result(0);
    block_on(async {
        assert_eq!(stream.next().await, Some(Ok((0, 0))));
    });
    drop(stream);

    // stragglers complete into the dropped stream's queue without panicking
    assert!(sources[1].try_set_error("late failure"));
    assert!(sources[2].try_set_result(2));
}
