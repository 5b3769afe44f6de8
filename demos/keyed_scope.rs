//! # Example: Keyed scope following a selected user
//!
//! The selected user id lives in a `watch` channel. For every distinct id the
//! scope builds a profile loader; switching users tears the previous loader
//! down (aborting its run) before the next one starts. Re-selecting the same
//! id does nothing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use taskscope::{
    Config, Lifetime, LogWriter, RunContext, Runtime, Scope, ScopeError, Subscribe, Task,
    TaskError,
};

fn profile_loader(id: &u32, lifetime: &Lifetime) -> Result<Task<String>, ScopeError> {
    if *id == 0 {
        return Err(ScopeError::setup("user 0 does not exist"));
    }
    let id = *id;
    let task = Task::new(lifetime, format!("profile-{id}"), move |_ctx: RunContext| async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        Ok::<_, TaskError>(format!("profile of user {id}"))
    });
    lifetime.on_cleanup(move || println!("[scope] released user {id}"));
    let _ = task.run();
    Ok(task)
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

    let (selected, rx) = watch::channel(Some(1u32));
    let profile = Scope::watch(rt.lifetime(), "profile", rx, profile_loader)?;

    for next in [Some(1), Some(2), Some(0), None, Some(3)] {
        tokio::time::sleep(Duration::from_millis(50)).await;
        selected.send_replace(next);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let state = profile.current().map(|task| task.state());
        println!(
            "[scope] key={:?} state={:?} last_error={:?}",
            profile.key(),
            state,
            profile.last_error().map(|e| e.as_message())
        );
    }

    rt.shutdown().await?;
    Ok(())
}
