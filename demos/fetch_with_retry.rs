//! # Example: Flaky fetch with retry and stale-if-error
//!
//! A "fetch" that fails on every third call. `ErrorRetry` re-runs it, while
//! `StaleState` keeps showing the last good value next to the latest error.
//!
//! Run with: `RUST_LOG=debug cargo run --example fetch_with_retry`

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use taskscope::{
    BackoffPolicy, Config, ErrorRetry, LogWriter, RetryPolicy, RunContext, Runtime, StaleState,
    Subscribe, Task, TaskError, on_error,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskscope=info")),
        )
        .init();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let rt = Runtime::builder(Config::default())
        .with_subscribers(subs)
        .build();

    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let quotes = Task::new(rt.lifetime(), "quotes", move |ctx: RunContext| {
        let n = c.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            ctx.on_abort(move || println!("[quotes] call {n} aborted"));
            tokio::time::sleep(Duration::from_millis(50)).await;
            if n % 3 == 0 {
                return Err(TaskError::fail(format!("upstream 503 on call {n}")));
            }
            Ok(100 + n)
        }
    });

    let policy = RetryPolicy::new(3, Duration::from_millis(100)).with_backoff(
        BackoffPolicy::exponential(Duration::from_millis(100), 2.0, Duration::from_secs(1)),
    );
    let retry = ErrorRetry::new(rt.lifetime(), &quotes, policy);
    let stale = StaleState::new(rt.lifetime(), &quotes);
    on_error(rt.lifetime(), &quotes, |e: &TaskError| println!("[quotes] {}", e.as_message()));

    for _ in 0..4 {
        let result = quotes.run().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let snap = stale.get();
        println!(
            "[view] result={:?} data={:?} error={:?} fresh={} retries={}",
            result.kind(),
            snap.data,
            snap.error.map(|e| e.as_message()),
            snap.fresh,
            retry.count()
        );
        tokio::time::sleep(Duration::from_millis(400)).await;
    }

    rt.shutdown().await?;
    Ok(())
}
