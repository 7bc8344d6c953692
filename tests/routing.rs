//! Integration tests for route lookup and backend selection.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use relaymesh::balancer::{Backend, BackendPool, HealthMonitor, MonitorSettings, Prober, TcpProber};
use relaymesh::error::DispatchError;
use relaymesh::proxy::forward::HyperForwarder;
use relaymesh::proxy::routing::RoutingTable;
use relaymesh::proxy::Dispatcher;
use relaymesh::server::build_http_client;

async fn install(table: &RoutingTable, prefix: &str, addresses: &[&str]) -> Arc<BackendPool> {
    let pool = Arc::new(match table.pool(prefix) {
        Some(previous) => previous.update_targets(addresses),
        None => BackendPool::new(addresses),
    });
    let monitor =
        HealthMonitor::new(Arc::clone(&pool), MonitorSettings::default(), Arc::new(TcpProber))
            .spawn();
    table.apply(prefix, Arc::clone(&pool), monitor).await;
    pool
}

fn dispatcher(table: &Arc<RoutingTable>) -> Dispatcher {
    let forwarder = HyperForwarder::new(
        build_http_client(Duration::from_secs(1)),
        Duration::from_secs(1),
    );
    Dispatcher::new(Arc::clone(table), Arc::new(forwarder))
}

fn selected_origin(dispatcher: &Dispatcher, path: &str) -> String {
    dispatcher.select(path).unwrap().backend.origin().to_string()
}

#[tokio::test]
async fn round_robin_across_requests() {
    let table = Arc::new(RoutingTable::new());
    install(&table, "/api", &["http://a:8080", "http://b:8080"]).await;
    let dispatcher = dispatcher(&table);

    let picks: Vec<String> = (0..3)
        .map(|_| selected_origin(&dispatcher, "/api/users"))
        .collect();
    assert_eq!(picks, ["http://a:8080", "http://b:8080", "http://a:8080"]);

    let selection = dispatcher.select("/api/users").unwrap();
    assert_eq!(&*selection.prefix, "/api");
    assert_eq!(selection.upstream_path, "/users");

    table.shutdown().await;
}

#[tokio::test]
async fn most_specific_prefix_wins_in_either_registration_order() {
    for order in [["/api", "/api/users"], ["/api/users", "/api"]] {
        let table = Arc::new(RoutingTable::new());
        for prefix in order {
            let backend = if prefix == "/api" {
                "http://general:1"
            } else {
                "http://users:1"
            };
            install(&table, prefix, &[backend]).await;
        }
        let dispatcher = dispatcher(&table);

        assert_eq!(selected_origin(&dispatcher, "/api/users/42"), "http://users:1");
        assert_eq!(selected_origin(&dispatcher, "/api/orders"), "http://general:1");

        table.shutdown().await;
    }
}

#[tokio::test]
async fn unknown_path_is_route_not_found() {
    let table = Arc::new(RoutingTable::new());
    install(&table, "/api", &["http://a:1"]).await;
    let dispatcher = dispatcher(&table);

    let err = dispatcher.select("/unknown").unwrap_err();
    assert!(matches!(err, DispatchError::RouteNotFound { .. }));
    assert_eq!(err.status(), 404);

    table.shutdown().await;
}

#[tokio::test]
async fn route_with_only_malformed_backends_is_unavailable() {
    let table = Arc::new(RoutingTable::new());
    let pool = install(&table, "/x", &["not a url", "ftp://nope"]).await;
    assert!(pool.is_empty());
    let dispatcher = dispatcher(&table);

    let err = dispatcher.select("/x/anything").unwrap_err();
    assert!(matches!(err, DispatchError::ServiceUnavailable { .. }));
    assert_eq!(err.status(), 503);

    table.shutdown().await;
}

#[tokio::test]
async fn dead_backends_are_skipped_until_none_remain() {
    let table = Arc::new(RoutingTable::new());
    let pool = install(&table, "/api", &["http://a:1", "http://b:1"]).await;
    let dispatcher = dispatcher(&table);

    pool.members()[0].set_alive(false);
    for _ in 0..4 {
        assert_eq!(selected_origin(&dispatcher, "/api"), "http://b:1");
    }

    pool.members()[1].set_alive(false);
    let err = dispatcher.select("/api").unwrap_err();
    assert!(matches!(err, DispatchError::ServiceUnavailable { .. }));

    pool.members()[0].set_alive(true);
    assert_eq!(selected_origin(&dispatcher, "/api"), "http://a:1");

    table.shutdown().await;
}

/// Reports every backend in `down` as unreachable.
#[derive(Default)]
struct ScriptedProber {
    down: Mutex<HashSet<String>>,
}

impl ScriptedProber {
    fn set_down(&self, origin: &str, down: bool) {
        let mut set = self.down.lock().unwrap();
        if down {
            set.insert(origin.to_string());
        } else {
            set.remove(origin);
        }
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, backend: &Backend, _timeout: Duration) -> bool {
        !self.down.lock().unwrap().contains(backend.origin())
    }
}

#[tokio::test(start_paused = true)]
async fn pool_marked_dead_by_its_monitor_is_unavailable_until_recovery() {
    let table = Arc::new(RoutingTable::new());
    let prober = Arc::new(ScriptedProber::default());
    prober.set_down("http://a:1", true);
    prober.set_down("http://b:1", true);

    let settings = MonitorSettings {
        interval: Duration::from_secs(15),
        timeout: Duration::from_secs(2),
    };
    let pool = Arc::new(BackendPool::new(&["http://a:1", "http://b:1"]));
    let monitor = HealthMonitor::new(Arc::clone(&pool), settings, prober.clone()).spawn();
    table.apply("/api", Arc::clone(&pool), monitor).await;
    let dispatcher = dispatcher(&table);

    // Members start alive until the first probe round.
    assert!(dispatcher.select("/api").is_ok());

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(pool.alive_count(), 0);
    let err = dispatcher.select("/api").unwrap_err();
    assert!(matches!(err, DispatchError::ServiceUnavailable { .. }));
    assert_eq!(err.status(), 503);

    prober.set_down("http://b:1", false);
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(pool.alive_count(), 1);
    for _ in 0..3 {
        assert_eq!(selected_origin(&dispatcher, "/api"), "http://b:1");
    }

    table.shutdown().await;
}

#[tokio::test]
async fn replacement_takes_effect_for_the_next_request() {
    let table = Arc::new(RoutingTable::new());
    install(&table, "/api", &["http://old:1"]).await;
    let dispatcher = dispatcher(&table);
    assert_eq!(selected_origin(&dispatcher, "/api/x"), "http://old:1");

    install(&table, "/api", &["http://new-a:1", "http://new-b:1"]).await;
    let picks: Vec<String> = (0..4)
        .map(|_| selected_origin(&dispatcher, "/api/x"))
        .collect();
    assert!(picks.iter().all(|p| p.starts_with("http://new-")));
    assert_eq!(table.len(), 1);
    assert_eq!(table.monitor_count().await, 1);

    table.shutdown().await;
}

#[tokio::test]
async fn lookups_race_with_replacements_without_errors() {
    let table = Arc::new(RoutingTable::new());
    install(&table, "/api", &["http://gen0:1"]).await;
    let dispatcher = Arc::new(dispatcher(&table));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                for _ in 0..500 {
                    let selection = dispatcher.select("/api/items").unwrap();
                    assert!(selection.backend.origin().starts_with("http://gen"));
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for generation in 1..20 {
        let address = format!("http://gen{generation}:1");
        install(&table, "/api", &[address.as_str()]).await;
        tokio::task::yield_now().await;
    }

    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(table.monitor_count().await, 1);
    table.shutdown().await;
}
