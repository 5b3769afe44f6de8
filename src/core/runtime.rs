//! # Runtime: root lifetime, event fan-out and graceful shutdown.
//!
//! The [`Runtime`] owns the event bus, a [`SubscriberSet`], the
//! [`InFlightTracker`] and the root [`Lifetime`] every task, utility and scope
//! of the application hangs off.
//!
//! ```text
//! Runtime::builder(cfg).with_subscribers(subs).build()
//!   ├─ Bus::new(cfg.bus_capacity)
//!   ├─ SubscriberSet::new(subs, bus)
//!   ├─ root Lifetime (bus + TaskTracker)
//!   └─ subscriber_listener(): Bus ─► InFlightTracker::update ─► SubscriberSet::emit
//!
//! shutdown():
//!   ├─► publish ShutdownRequested
//!   ├─► root.dispose()          → aborts runs, cancels watchers, tears down scopes
//!   ├─► tracker.wait() within cfg.grace
//!   │      ├─ Ok       → publish AllStoppedWithin
//!   │      └─ Timeout  → publish GraceExceeded
//!   ├─► stop listener (drains queued events)
//!   └─► SubscriberSet::shutdown()  → Err(GraceExceeded { still_running }) if timed out
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use taskscope::{Config, LogWriter, RunContext, Runtime, Subscribe, Task, TaskError};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let rt = Runtime::builder(Config::default()).with_subscribers(subs).build();
//!
//!     let ping = Task::new(rt.lifetime(), "ping", |_ctx: RunContext| async {
//!         Ok::<_, TaskError>("pong")
//!     });
//!     ping.run().await;
//!
//!     rt.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{builder::RuntimeBuilder, in_flight::InFlightTracker};
use crate::{
    core::Config,
    error::RuntimeError,
    events::{Bus, Event, EventKind},
    scope::Lifetime,
    subscribers::SubscriberSet,
};

/// Owner of the root lifetime, event delivery and shutdown.
pub struct Runtime {
    cfg: Config,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    in_flight: Arc<InFlightTracker>,
    tracker: TaskTracker,
    root: Lifetime,
    listener_token: CancellationToken,
    listener: JoinHandle<()>,
}

impl Runtime {
    /// Creates a builder with the given configuration.
    pub fn builder(cfg: Config) -> RuntimeBuilder {
        RuntimeBuilder::new(cfg)
    }

    pub(super) fn new_internal(
        cfg: Config,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        in_flight: Arc<InFlightTracker>,
        tracker: TaskTracker,
        root: Lifetime,
        listener_token: CancellationToken,
    ) -> Self {
        let listener = subscriber_listener(
            bus.subscribe(),
            subs.clone(),
            in_flight.clone(),
            listener_token.clone(),
        );
        Self {
            cfg,
            bus,
            subs,
            in_flight,
            tracker,
            root,
            listener_token,
            listener,
        }
    }

    /// Root lifetime; everything created on it is torn down by [`shutdown`](Runtime::shutdown).
    pub fn lifetime(&self) -> &Lifetime {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Sorted names of tasks that currently have a run in flight.
    pub async fn in_flight(&self) -> Vec<String> {
        self.in_flight.snapshot().await
    }

    /// Tears down the root lifetime and waits up to [`Config::grace`] for
    /// spawned runs and watchers to finish.
    pub async fn shutdown(self) -> Result<(), RuntimeError> {
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.root.dispose();
        self.tracker.close();

        let grace = self.cfg.grace;
        let stopped = tokio::time::timeout(grace, self.tracker.wait()).await.is_ok();
        let still_running = self.tracker.len();
        if stopped {
            self.bus.publish(Event::new(EventKind::AllStoppedWithin));
        } else {
            self.bus.publish(
                Event::new(EventKind::GraceExceeded)
                    .with_reason(format!("{still_running} still running")),
            );
        }

        self.listener_token.cancel();
        let _ = self.listener.await;

        match Arc::try_unwrap(self.subs) {
            Ok(subs) => subs.shutdown().await,
            Err(_) => tracing::warn!("subscriber set still shared; workers not drained"),
        }

        if stopped {
            Ok(())
        } else {
            Err(RuntimeError::GraceExceeded {
                grace,
                still_running,
            })
        }
    }
}

/// Forwards bus events to the in-flight tracker and subscribers until
/// `token` is cancelled, then drains what is already queued.
fn subscriber_listener(
    mut rx: broadcast::Receiver<Event>,
    subs: Arc<SubscriberSet>,
    in_flight: Arc<InFlightTracker>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let ev = tokio::select! {
                res = rx.recv() => match res {
                    Ok(ev) => ev,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event listener lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                _ = token.cancelled() => break,
            };
            in_flight.update(&ev).await;
            subs.emit(&ev);
        }

        while let Ok(ev) = rx.try_recv() {
            in_flight.update(&ev).await;
            subs.emit(&ev);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::TaskError;
    use crate::subscribers::Subscribe;
    use crate::tasks::{RunContext, Task, TaskState};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().unwrap().push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_runs_and_reports() {
        let rec = Arc::new(Recorder::default());
        let rt = Runtime::builder(Config::default())
            .with_subscribers(vec![rec.clone() as Arc<dyn Subscribe>])
            .build();

        let slow = Task::new(rt.lifetime(), "slow", |_ctx: RunContext| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, TaskError>(())
        });
        let run = slow.run();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(rt.in_flight().await, vec!["slow"]);

        rt.shutdown().await.unwrap();
        assert_eq!(run.await, crate::RunResult::Aborted);
        assert_eq!(slow.state(), TaskState::Aborted);

        let kinds = rec.0.lock().unwrap().clone();
        assert_eq!(kinds.first(), Some(&EventKind::RunStarting));
        assert!(kinds.contains(&EventKind::ShutdownRequested));
        assert!(kinds.contains(&EventKind::RunAborted));
        assert_eq!(kinds.last(), Some(&EventKind::AllStoppedWithin));
    }

    #[tokio::test(start_paused = true)]
    async fn grace_exceeded_counts_stragglers() {
        let cfg = Config {
            grace: Duration::from_millis(50),
            ..Config::default()
        };
        let rt = Runtime::builder(cfg).build();

        // Blocks the tracker without being cancellable through the lifetime.
        let tracker = rt.tracker.clone();
        tracker.spawn(tokio::time::sleep(Duration::from_secs(10)));

        let err = rt.shutdown().await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::GraceExceeded {
                still_running: 1,
                ..
            }
        ));
        assert_eq!(err.as_label(), "runtime_grace_exceeded");
    }
}
