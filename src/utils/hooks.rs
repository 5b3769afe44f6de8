//! Side-effect hooks fired on task settlements.

use tokio::sync::broadcast;

use crate::scope::Lifetime;
use crate::tasks::{RunResult, TaskHandle};

/// Calls `f` with the value of every successful run until `lifetime` is disposed.
pub fn on_success<H, F>(lifetime: &Lifetime, task: &H, mut f: F)
where
    H: TaskHandle,
    F: FnMut(&H::Value) + Send + 'static,
{
    on_settled(lifetime, task, move |result| {
        if let RunResult::Ok(v) = result {
            f(v);
        }
    });
}

/// Calls `f` with the error of every failed run until `lifetime` is disposed.
pub fn on_error<H, F>(lifetime: &Lifetime, task: &H, mut f: F)
where
    H: TaskHandle,
    F: FnMut(&H::Error) + Send + 'static,
{
    on_settled(lifetime, task, move |result| {
        if let RunResult::Err(e) = result {
            f(e);
        }
    });
}

fn on_settled<H, F>(lifetime: &Lifetime, task: &H, mut f: F)
where
    H: TaskHandle,
    F: FnMut(&RunResult<H::Value, H::Error>) + Send + 'static,
{
    let name = task.name().to_string();
    let mut settled = task.settlements();
    lifetime.spawn(async move {
        loop {
            match settled.recv().await {
                Ok(result) => f(&result),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(task = %name, skipped, "hook fell behind task settlements");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::error::TaskError;
    use crate::tasks::{RunContext, Task};

    fn echo(lifetime: &Lifetime) -> (Task<u32>, Arc<Mutex<Result<u32, &'static str>>>) {
        let next = Arc::new(Mutex::new(Ok(1)));
        let n = next.clone();
        let task = Task::new(lifetime, "echo", move |_ctx: RunContext| {
            let out = *n.lock().unwrap();
            async move { out.map_err(TaskError::fail) }
        });
        (task, next)
    }

    #[tokio::test(start_paused = true)]
    async fn hooks_see_their_own_outcomes() {
        let lt = Lifetime::new();
        let (task, next) = echo(&lt);
        let ok = Arc::new(Mutex::new(Vec::new()));
        let err = Arc::new(Mutex::new(Vec::new()));

        let o = ok.clone();
        on_success(&lt, &task, move |v| o.lock().unwrap().push(*v));
        let e = err.clone();
        on_error(&lt, &task, move |x: &TaskError| e.lock().unwrap().push(x.clone()));

        task.run().await;
        *next.lock().unwrap() = Err("boom");
        task.run().await;
        *next.lock().unwrap() = Ok(2);
        task.run().await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(*ok.lock().unwrap(), vec![1, 2]);
        assert_eq!(*err.lock().unwrap(), vec![TaskError::fail("boom")]);
    }

    #[tokio::test(start_paused = true)]
    async fn hooks_stop_with_lifetime() {
        let lt = Lifetime::new();
        let (task, _next) = echo(&lt);
        let owner = lt.child();
        let hits = Arc::new(Mutex::new(0));

        let h = hits.clone();
        on_success(&owner, &task, move |_| *h.lock().unwrap() += 1);

        task.run().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        owner.dispose();
        task.run().await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(*hits.lock().unwrap(), 1);
    }
}
