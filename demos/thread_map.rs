use concurrent_runner::prelude::*;
use std::io;
use tracing_subscriber::EnvFilter;

fn parse_port(raw: &str) -> io::Result<u16> {
    let port: u16 = raw
        .trim()
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if port < 1024 {
        return Err(io::Error::new(io::ErrorKind::PermissionDenied, "privileged port"));
    }
    Ok(port)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Thread Map Example ===\n");

    let inputs = vec!["8080", "443", "not-a-port", "9000", " 3000 "];
    let runner = ConcurrentRunner::new(inputs, parse_port)
        .on_error(io::ErrorKind::PermissionDenied, |failure| {
            println!("  {:?} is privileged, using 8443 instead", failure.item);
            Some(8443)
        });

    let report = runner.report_threads(Some(4)).expect("thread pool failed to start");

    for outcome in &report.outcomes {
        match outcome {
            Outcome::Success(port) => println!("  parsed {}", port),
            Outcome::Handled(Some(port)) => println!("  substituted {}", port),
            Outcome::Handled(None) => println!("  dropped an item"),
        }
    }

    println!("\nSucceeded: {}", report.successes());
    println!("Success rate: {:.0}%", report.metrics.success_rate() * 100.0);
    println!("p99 latency: {} ns", report.metrics.p99_latency_ns);

    println!("\n=== Example Complete ===");
}
