//! # Example: One-off form submission with a dangling scope
//!
//! Each click starts a detached submission that disposes itself when it
//! finishes or after a timeout. A second click replaces the first one.
//! The spinner only shows up for submissions slower than 200ms.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use taskscope::{
    Config, DanglingScope, DelayedPending, Lifetime, LogWriter, RunContext, Runtime, Subscribe,
    Task, TaskError, on_success,
};

fn submit(lifetime: &Lifetime, form: &'static str, latency: Duration) -> Task<String> {
    Task::new(lifetime, "submit", move |_ctx: RunContext| async move {
        tokio::time::sleep(latency).await;
        Ok::<_, TaskError>(format!("saved {form}"))
    })
}

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
    let cfg = rt.config().clone();
    let form = DanglingScope::new(rt.lifetime(), "contact-form");

    let clicks = [
        ("draft #1", Duration::from_millis(80)),
        ("draft #2", Duration::from_millis(600)),
        ("final", Duration::from_millis(300)),
    ];
    for (name, latency) in clicks {
        let submission = form.setup(|lt, dispose| {
            let task = submit(lt, name, latency);
            let done = dispose.clone();
            on_success(lt, &task, move |msg: &String| {
                println!("[form] {msg}");
                done.dispose();
            });
            lt.spawn(async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                println!("[form] submission timed out");
                dispose.dispose();
            });
            let _ = task.run();
            let spinner = DelayedPending::with_defaults(lt, &task, &cfg);
            (task, spinner)
        })?;

        let (_, spinner) = &*submission;
        let mut shown = spinner.subscribe();
        let watcher = tokio::spawn(async move {
            while shown.changed().await.is_ok() {
                println!("[form] spinner visible={}", *shown.borrow_and_update());
            }
        });
        tokio::time::sleep(Duration::from_millis(400)).await;
        watcher.abort();
        println!("[form] after 400ms: active={}", form.is_active());
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    rt.shutdown().await?;
    Ok(())
}
