use std::sync::Arc;

use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{in_flight::InFlightTracker, runtime::Runtime};
use crate::{
    core::Config,
    events::Bus,
    scope::Lifetime,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for a [`Runtime`].
pub struct RuntimeBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl RuntimeBuilder {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive every event published by tasks, utilities and
    /// scopes of this runtime through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the runtime and starts forwarding events to subscribers.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Runtime {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let tracker = TaskTracker::new();
        let root = Lifetime::root(bus.clone(), tracker.clone());

        Runtime::new_internal(
            self.cfg,
            bus,
            subs,
            Arc::new(InFlightTracker::new()),
            tracker,
            root,
            CancellationToken::new(),
        )
    }
}
