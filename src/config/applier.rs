//! Application of configuration events to the routing table.
//!
//! [`ConfigApplier::apply`] turns one [`ConfigEvent`] into a new pool
//! generation: build the pool, start its health monitor, install it, and
//! let the routing table cancel the monitor it replaces.
//!
//! [`ConfigApplier::run`] drives a [`ConfigSource`]: it subscribes first,
//! then replays the persisted registry, then consumes the live stream.
//! Live events are handed to one lane task per prefix, so events for the
//! same prefix apply in receipt order while different prefixes apply
//! concurrently. Malformed events are logged and dropped without touching
//! the table or stopping the stream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};

use super::model::ConfigEvent;
use super::ConfigSource;
use crate::balancer::{BackendPool, HealthMonitor, MonitorSettings, Prober};
use crate::error::MeshError;
use crate::proxy::routing::RoutingTable;

pub const DEFAULT_RESUBSCRIBE_INTERVAL: Duration = Duration::from_secs(5);

pub struct ConfigApplier {
    table: Arc<RoutingTable>,
    settings: MonitorSettings,
    prober: Arc<dyn Prober>,
}

impl ConfigApplier {
    #[must_use]
    pub fn new(table: Arc<RoutingTable>, settings: MonitorSettings, prober: Arc<dyn Prober>) -> Self {
        Self {
            table,
            settings,
            prober,
        }
    }

    #[must_use]
    pub fn table(&self) -> &Arc<RoutingTable> {
        &self.table
    }

    /// Install a new pool generation for `event.prefix`.
    ///
    /// Returns the number of usable backends in the installed pool. An
    /// invalid prefix leaves the table unchanged, and so does an event whose
    /// normalized backends match the installed pool: the running monitor and
    /// the recorded liveness stay as they are.
    pub async fn apply(&self, event: ConfigEvent) -> Result<usize, MeshError> {
        event.validate()?;

        let pool = match self.table.pool(&event.prefix) {
            Some(previous) => {
                let successor = previous.update_targets(&event.backends);
                if successor.same_members(&previous) {
                    tracing::debug!(prefix = %event.prefix, "route unchanged");
                    return Ok(previous.len());
                }
                successor
            }
            None => BackendPool::new(&event.backends),
        };
        let pool = Arc::new(pool);
        let usable = pool.len();

        if usable == 0 {
            tracing::warn!(
                prefix = %event.prefix,
                requested = event.backends.len(),
                "route has no usable backend, requests will be answered 503"
            );
        }

        let monitor =
            HealthMonitor::new(Arc::clone(&pool), self.settings, Arc::clone(&self.prober)).spawn();
        let replaced = self.table.apply(&event.prefix, pool, monitor).await.is_some();

        tracing::info!(
            prefix = %event.prefix,
            backends = usable,
            replaced,
            "route configured"
        );
        Ok(usable)
    }

    /// Replay every persisted route once. Returns how many were applied.
    ///
    /// An unreachable source is logged and treated as an empty registry.
    pub async fn replay(&self, source: &dyn ConfigSource) -> usize {
        let events = match source.list_registered().await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(source = source.name(), error = %e, "route registry unavailable, nothing replayed");
                return 0;
            }
        };

        let mut applied = 0;
        for event in events {
            let prefix = event.prefix.clone();
            match self.apply(event).await {
                Ok(_) => applied += 1,
                Err(e) => tracing::warn!(prefix = %prefix, error = %e, "dropping registered route"),
            }
        }

        tracing::info!(source = source.name(), routes = applied, "route registry replayed");
        applied
    }

    /// Keep the routing table in sync with `source` until `shutdown` fires.
    pub async fn run(
        self: Arc<Self>,
        source: Arc<dyn ConfigSource>,
        resubscribe_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut lanes: HashMap<String, mpsc::UnboundedSender<ConfigEvent>> = HashMap::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let subscription = tokio::select! {
                result = source.subscribe() => result,
                _ = shutdown.changed() => break,
            };

            let mut events = match subscription {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!(
                        source = source.name(),
                        error = %e,
                        retry_secs = resubscribe_interval.as_secs(),
                        "config source unavailable, serving current routes"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(resubscribe_interval) => continue,
                        _ = shutdown.changed() => break,
                    }
                }
            };

            tokio::select! {
                _ = self.replay(source.as_ref()) => {}
                _ = shutdown.changed() => break,
            }

            loop {
                let item = tokio::select! {
                    item = events.next() => item,
                    _ = shutdown.changed() => {
                        tracing::debug!("config applier shutting down");
                        return;
                    }
                };

                match item {
                    Some(Ok(event)) => self.dispatch_to_lane(&mut lanes, event),
                    Some(Err(e)) => {
                        tracing::warn!(source = source.name(), error = %e, "dropping malformed config event");
                    }
                    None => {
                        tracing::warn!(source = source.name(), "config subscription closed, resubscribing");
                        break;
                    }
                }
            }

            tokio::select! {
                () = tokio::time::sleep(resubscribe_interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        tracing::debug!("config applier shutting down");
    }

    fn dispatch_to_lane(
        self: &Arc<Self>,
        lanes: &mut HashMap<String, mpsc::UnboundedSender<ConfigEvent>>,
        event: ConfigEvent,
    ) {
        if let Err(e) = event.validate() {
            tracing::warn!(error = %e, "dropping malformed config event");
            return;
        }

        let lane = lanes
            .entry(event.prefix.clone())
            .or_insert_with(|| self.spawn_lane(&event.prefix));
        if let Err(mpsc::error::SendError(event)) = lane.send(event) {
            // The lane task is gone; start a fresh one for this prefix.
            let lane = self.spawn_lane(&event.prefix);
            let prefix = event.prefix.clone();
            let _ = lane.send(event);
            lanes.insert(prefix, lane);
        }
    }

    /// Start the task that applies live events for one prefix in order.
    ///
    /// Lanes are never retired: each lives until the applier's lane map is
    /// dropped, so their number is bounded by the number of distinct
    /// prefixes seen on the stream.
    fn spawn_lane(self: &Arc<Self>, prefix: &str) -> mpsc::UnboundedSender<ConfigEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel::<ConfigEvent>();
        let applier = Arc::clone(self);
        tracing::debug!(prefix = %prefix, "starting config lane");

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let prefix = event.prefix.clone();
                if let Err(e) = applier.apply(event).await {
                    tracing::warn!(prefix = %prefix, error = %e, "dropping config event");
                }
            }
        });
        tx
    }
}
