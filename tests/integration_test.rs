use concurrent_runner::prelude::*;
use concurrent_runner::ThreadPool;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ItemError {
    Rejected,
    Unsupported,
}

impl Classify for ItemError {
    type Kind = ItemError;

    fn kind(&self) -> ItemError {
        *self
    }
}

fn check(x: i32) -> std::result::Result<i32, ItemError> {
    match x {
        x if x < 0 => Err(ItemError::Rejected),
        0 => Err(ItemError::Unsupported),
        13 => panic!("unlucky item"),
        x => Ok(x * 2),
    }
}

fn sorted_values<T: Ord>(outcomes: Vec<Outcome<T>>) -> Vec<T> {
    let mut values: Vec<T> = outcomes.into_iter().filter_map(Outcome::into_value).collect();
    values.sort();
    values
}

#[test]
fn test_every_item_completes_exactly_once() {
    let items: Vec<i32> = (1..=200).collect();
    let runner = ConcurrentRunner::new(items, |x: i32| Ok::<_, ItemError>(x));

    let values = sorted_values(runner.run_threads(Some(8)).unwrap());
    assert_eq!(values, (1..=200).collect::<Vec<_>>());
}

#[test]
fn test_one_failure_does_not_stop_the_rest() {
    let runner = ConcurrentRunner::new(vec![1, -1, 2, 13, 3], check);

    let outcomes = runner.run_threads(Some(3)).unwrap();
    assert_eq!(outcomes.len(), 5);
    assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 3);
    assert_eq!(
        outcomes.iter().filter(|o| **o == Outcome::Handled(None)).count(),
        2
    );
}

#[test]
fn test_handlers_are_chosen_by_kind() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let rejected = seen.clone();
    let panicked = seen.clone();

    let runner = ConcurrentRunner::new(vec![-5, 0, 13, 4], check)
        .on_error(ItemError::Rejected, move |failure| {
            rejected.lock().push(("rejected", *failure.item));
            Some(-1)
        })
        .on_panic(move |failure| {
            panicked.lock().push(("panic", *failure.item));
            assert!(matches!(failure.error, TaskError::Panicked(ref p) if p.message == "unlucky item"));
            Some(-13)
        });

    let values = sorted_values(runner.run_threads(Some(2)).unwrap());

    // Unsupported has no route and yields nothing
    assert_eq!(values, vec![-13, -1, 8]);

    let mut seen = seen.lock().clone();
    seen.sort();
    assert_eq!(seen, vec![("panic", 13), ("rejected", -5)]);
}

#[test]
fn test_fallback_catches_unrouted_classes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let runner = ConcurrentRunner::new(vec![0, -1, 13, 1], check)
        .on_error(ItemError::Rejected, |_| Some(100))
        .fallback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(0)
        });

    let values = sorted_values(runner.run_threads(None).unwrap());
    assert_eq!(values, vec![0, 0, 2, 100]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_registering_a_kind_twice_keeps_the_last_handler() {
    let runner = ConcurrentRunner::new(vec![-1], check)
        .on_error(ItemError::Rejected, |_| Some(1))
        .on_error(ItemError::Rejected, |_| Some(2));

    assert_eq!(runner.error_routes().len(), 1);
    assert_eq!(sorted_values(runner.run_threads(Some(1)).unwrap()), vec![2]);
}

#[test]
fn test_positional_args() {
    let runner = ConcurrentRunner::with_args(vec![1, 2, 3], (10, 100), |x: i32, args: &(i32, i32)| {
        Ok::<_, ItemError>(x * args.0 + args.1)
    });

    assert_eq!(sorted_values(runner.run_threads(Some(2)).unwrap()), vec![110, 120, 130]);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Scale {
    factor: i32,
    offset: i32,
}

#[test]
fn test_keyword_args() {
    let runner = ConcurrentRunner::with_args(
        vec![1, 2],
        Scale {
            factor: 3,
            offset: -1,
        },
        |x: i32, scale: &Scale| Ok::<_, ItemError>(x * scale.factor + scale.offset),
    );

    assert_eq!(sorted_values(runner.run_threads(Some(2)).unwrap()), vec![2, 5]);
}

#[test]
fn test_positional_and_keyword_args() {
    let args = Args::new((2,), Scale { factor: 5, offset: 1 });
    let runner = ConcurrentRunner::with_args(vec![1, 2], args, |x: i32, args: &Args<(i32,), Scale>| {
        Ok::<_, ItemError>((x + args.positional.0) * args.keyword.factor + args.keyword.offset)
    });

    assert_eq!(sorted_values(runner.run_threads(Some(2)).unwrap()), vec![16, 21]);
}

#[test]
fn test_args_are_shared_not_copied_per_item() {
    let lookup: HashMap<&str, usize> = [("a", 1), ("bb", 2)].into_iter().collect();
    let runner = ConcurrentRunner::with_args(vec!["a", "bb", "ccc"], lookup, |key, table| {
        table.get(key).copied().ok_or(ItemError::Unsupported)
    })
    .on_error(ItemError::Unsupported, |failure| Some(failure.item.len() * 10));

    assert_eq!(sorted_values(runner.run_threads(Some(3)).unwrap()), vec![1, 2, 30]);
}

#[test]
fn test_duplicate_items_each_get_a_task() {
    let runner = ConcurrentRunner::new(vec![5, 5, 5, -5, -5], check)
        .on_error(ItemError::Rejected, |failure| Some(*failure.item));

    assert_eq!(sorted_values(runner.run_threads(Some(2)).unwrap()), vec![-5, -5, 10, 10, 10]);
}

#[test]
fn test_reuse_gives_the_same_multiset() {
    let runner = ConcurrentRunner::new((1..=50).collect::<Vec<i32>>(), check)
        .on_panic(|_| Some(0));

    let first = sorted_values(runner.run_threads(Some(4)).unwrap());
    let second = sorted_values(runner.run_threads(Some(7)).unwrap());
    assert_eq!(first, second);
    assert_eq!(first.len(), 50);
}

#[test]
fn test_results_arrive_in_completion_order() {
    // 0 sleeps longest, so with one worker per item it finishes last
    let runner = ConcurrentRunner::new(vec![0u64, 1, 2], |x: u64| {
        thread::sleep(Duration::from_millis(150 - x * 50));
        Ok::<_, ItemError>(x)
    });

    let outcomes = runner.run_threads(Some(3)).unwrap();
    assert_eq!(outcomes.last(), Some(&Outcome::Success(0)));
}

#[test]
fn test_invalid_worker_counts_are_rejected() {
    let runner = ConcurrentRunner::new(vec![1], check);

    assert!(matches!(runner.run_threads(Some(0)), Err(Error::Config(_))));
    assert!(matches!(runner.run_threads(Some(5000)), Err(Error::Config(_))));
}

#[test]
fn test_closure_runner_on_configured_thread_pool() {
    let config = RunConfig::builder()
        .max_workers(3)
        .thread_name_prefix("closure-run")
        .build()
        .unwrap();
    let runner = ConcurrentRunner::new(vec![1, 2, 3], check);

    let outcomes = runner.run_on(ThreadPool::new(&config).unwrap()).unwrap();
    assert_eq!(sorted_values(outcomes), vec![2, 4, 6]);
}

#[test]
fn test_io_errors_route_by_error_kind() {
    use std::io;

    let runner = ConcurrentRunner::new(vec!["ok", "missing", "denied"], |name: &str| match name {
        "missing" => Err(io::Error::new(io::ErrorKind::NotFound, "no such item")),
        "denied" => Err(io::Error::new(io::ErrorKind::PermissionDenied, "nope")),
        other => Ok(other.len()),
    })
    .on_error(io::ErrorKind::NotFound, |_| Some(0));

    let outcomes = runner.run_threads(Some(2)).unwrap();
    assert_eq!(sorted_values(outcomes), vec![0, 2]);
}

#[test]
fn test_report_threads_counts_outcomes() {
    let runner = ConcurrentRunner::new(vec![1, 2, -1, 13], check).on_panic(|_| Some(0));

    let report = runner.report_threads(Some(2)).unwrap();
    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.successes(), 2);

    #[cfg(feature = "telemetry")]
    {
        assert_eq!(report.metrics.tasks_completed, 4);
        assert_eq!(report.metrics.tasks_failed, 1);
        assert_eq!(report.metrics.tasks_panicked, 1);
        assert_eq!(report.metrics.tasks_recovered, 1);
    }
}
