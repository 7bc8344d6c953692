//! Prefix routing table with lock-free reads.
//!
//! [`RoutingTable`] publishes an immutable, specificity-sorted snapshot of
//! its routes through [`ArcSwap`]: every lookup is a pointer load followed
//! by an in-order scan, with no lock and no I/O on the request path.
//! Writers are serialized by an async mutex that also owns the
//! [`MonitorHandle`] of every entry, so replacing a prefix swaps the
//! snapshot and cancels the superseded monitor in one critical section.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;

use crate::balancer::{BackendPool, MonitorHandle};

/// A registered prefix and the pool currently serving it.
#[derive(Debug, Clone)]
pub struct Route {
    pub prefix: Arc<str>,
    pub pool: Arc<BackendPool>,
}

impl Route {
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&*self.prefix)
    }
}

/// Longest prefix first; equal lengths in lexicographic order.
fn by_specificity(a: &Route, b: &Route) -> Ordering {
    b.prefix
        .len()
        .cmp(&a.prefix.len())
        .then_with(|| a.prefix.cmp(&b.prefix))
}

#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: ArcSwap<Vec<Route>>,
    monitors: Mutex<HashMap<Arc<str>, MonitorHandle>>,
}

impl RoutingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the most specific route whose prefix `path` starts with.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<Route> {
        self.routes
            .load()
            .iter()
            .find(|route| route.matches(path))
            .cloned()
    }

    /// The pool registered for exactly `prefix`, if any.
    #[must_use]
    pub fn pool(&self, prefix: &str) -> Option<Arc<BackendPool>> {
        self.routes
            .load()
            .iter()
            .find(|route| &*route.prefix == prefix)
            .map(|route| Arc::clone(&route.pool))
    }

    /// Install or replace the pool for `prefix`.
    ///
    /// The new snapshot becomes visible to every subsequent lookup at once.
    /// If the prefix was already registered, its monitor is cancelled before
    /// the lock is released and the retired handle is returned.
    pub async fn apply(
        &self,
        prefix: &str,
        pool: Arc<BackendPool>,
        monitor: MonitorHandle,
    ) -> Option<MonitorHandle> {
        let prefix: Arc<str> = Arc::from(prefix);
        let mut monitors = self.monitors.lock().await;

        let current = self.routes.load();
        let mut next: Vec<Route> = current
            .iter()
            .filter(|route| route.prefix != prefix)
            .cloned()
            .collect();
        next.push(Route {
            prefix: Arc::clone(&prefix),
            pool,
        });
        next.sort_by(by_specificity);
        self.routes.store(Arc::new(next));

        let retired = monitors.insert(prefix, monitor);
        if let Some(ref handle) = retired {
            handle.cancel();
        }
        retired
    }

    /// Current routes in match order.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Route>> {
        self.routes.load_full()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.load().is_empty()
    }

    /// Number of monitors owned by the table (one per entry).
    pub async fn monitor_count(&self) -> usize {
        self.monitors.lock().await.len()
    }

    /// Stop every monitor. Routes stay readable.
    pub async fn shutdown(&self) {
        let monitors: Vec<MonitorHandle> = self.monitors.lock().await.drain().map(|(_, h)| h).collect();
        let count = monitors.len();
        for handle in monitors {
            handle.stopped().await;
        }
        tracing::debug!(monitors = count, "routing table monitors stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::balancer::{HealthMonitor, MonitorSettings, TcpProber};

    fn monitored(pool: &Arc<BackendPool>) -> MonitorHandle {
        HealthMonitor::new(Arc::clone(pool), MonitorSettings::default(), Arc::new(TcpProber)).spawn()
    }

    async fn register(table: &RoutingTable, prefix: &str, addresses: &[&str]) -> Option<MonitorHandle> {
        let pool = Arc::new(BackendPool::new(addresses));
        let monitor = monitored(&pool);
        table.apply(prefix, pool, monitor).await
    }

    #[tokio::test]
    async fn empty_table_matches_nothing() {
        let table = RoutingTable::new();
        assert!(table.lookup("/anything").is_none());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn longest_prefix_wins() {
        let table = RoutingTable::new();
        register(&table, "/api", &["http://short:1"]).await;
        register(&table, "/api/users", &["http://long:1"]).await;

        let route = table.lookup("/api/users/42").unwrap();
        assert_eq!(&*route.prefix, "/api/users");

        let route = table.lookup("/api/orders").unwrap();
        assert_eq!(&*route.prefix, "/api");
    }

    #[tokio::test]
    async fn specificity_does_not_depend_on_registration_order() {
        let table = RoutingTable::new();
        register(&table, "/api/users", &["http://long:1"]).await;
        register(&table, "/api", &["http://short:1"]).await;

        assert_eq!(&*table.lookup("/api/users/me").unwrap().prefix, "/api/users");
    }

    #[tokio::test]
    async fn snapshot_is_sorted_deterministically() {
        let table = RoutingTable::new();
        for prefix in ["/b", "/", "/a", "/api", "/ab"] {
            register(&table, prefix, &["http://x:1"]).await;
        }
        let order: Vec<String> = table
            .snapshot()
            .iter()
            .map(|r| r.prefix.to_string())
            .collect();
        assert_eq!(order, ["/api", "/ab", "/a", "/b", "/"]);
    }

    #[tokio::test]
    async fn replacing_a_prefix_swaps_the_pool_and_cancels_its_monitor() {
        let table = RoutingTable::new();
        assert!(register(&table, "/api", &["http://old:1"]).await.is_none());

        let retired = register(&table, "/api", &["http://new:1"]).await.unwrap();
        assert!(retired.is_cancelled());
        retired.stopped().await;

        assert_eq!(table.len(), 1);
        assert_eq!(table.monitor_count().await, 1);
        let route = table.lookup("/api/x").unwrap();
        assert_eq!(route.pool.members()[0].origin(), "http://new:1");
    }

    #[tokio::test]
    async fn in_flight_readers_keep_the_old_pool() {
        let table = RoutingTable::new();
        register(&table, "/api", &["http://old:1"]).await;
        let held = table.lookup("/api").unwrap();

        register(&table, "/api", &["http://new:1"]).await;

        assert_eq!(held.pool.members()[0].origin(), "http://old:1");
        assert_eq!(
            table.lookup("/api").unwrap().pool.members()[0].origin(),
            "http://new:1"
        );
    }

    #[tokio::test]
    async fn shutdown_stops_all_monitors() {
        let table = RoutingTable::new();
        register(&table, "/a", &["http://a:1"]).await;
        register(&table, "/b", &["http://b:1"]).await;

        tokio::time::timeout(Duration::from_secs(1), table.shutdown())
            .await
            .unwrap();
        assert_eq!(table.monitor_count().await, 0);
        assert_eq!(table.len(), 2);
    }
}
