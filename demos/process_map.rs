use concurrent_runner::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum CollatzError {
    Zero,
}

impl Classify for CollatzError {
    type Kind = CollatzError;

    fn kind(&self) -> CollatzError {
        *self
    }
}

fn collatz_steps(mut n: u64, limit: &(u64,)) -> std::result::Result<u64, CollatzError> {
    if n == 0 {
        return Err(CollatzError::Zero);
    }
    let mut steps = 0;
    while n != 1 && steps < limit.0 {
        n = if n % 2 == 0 { n / 2 } else { 3 * n + 1 };
        steps += 1;
    }
    Ok(steps)
}

const COLLATZ: RemoteFn<u64, (u64,), u64, CollatzError> = RemoteFn::new("collatz_steps", collatz_steps);

fn main() {
    // worker processes stop here
    serve_if_worker(&Registry::new().register(COLLATZ));

    println!("=== Process Map Example ===\n");

    let items: Vec<u64> = (0..20).map(|i| i * 7_919).collect();
    let runner = ConcurrentRunner::from_task(items, (10_000,), COLLATZ)
        .on_error(CollatzError::Zero, |_| Some(0));

    let config = RunConfig::builder()
        .pool_kind(PoolKind::Process)
        .build()
        .expect("invalid configuration");

    println!("Workers: {}", config.worker_count());

    let report = runner.report(&config).expect("process pool failed to start");
    let longest = report.outcomes.iter().filter_map(Outcome::value).max();

    println!("Completed: {}", report.outcomes.len());
    println!("Longest chain: {:?}", longest);
    println!("Wall time: {:?}", report.metrics.wall_time);

    println!("\n=== Example Complete ===");
}
