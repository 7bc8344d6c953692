//! Periodic liveness probing for one pool generation.
//!
//! A [`HealthMonitor`] is bound to exactly one [`BackendPool`] for its
//! whole life. Once spawned it is controlled through its
//! [`MonitorHandle`]: cancelling the handle (or dropping it) moves the
//! monitor from [`MonitorState::Running`] to [`MonitorState::Stopped`].
//! Cancellation is checked before every tick, so a cancelled monitor
//! never starts another round of probes; probes already in flight are
//! allowed to finish.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::backend::Backend;
use super::pool::BackendPool;

pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PROBE_INTERVAL,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Reachability check for a single backend. Pass/fail only.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, backend: &Backend, timeout: Duration) -> bool;
}

/// Bare TCP connection attempt to the backend's `host:port`, no payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, backend: &Backend, timeout: Duration) -> bool {
        match time::timeout(timeout, tokio::net::TcpStream::connect(backend.authority())).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                tracing::debug!(backend = %backend, error = %e, "probe connection failed");
                false
            }
            Err(_) => {
                tracing::debug!(backend = %backend, timeout_ms = timeout.as_millis() as u64, "probe timed out");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    Stopped,
}

pub struct HealthMonitor {
    pool: Arc<BackendPool>,
    settings: MonitorSettings,
    prober: Arc<dyn Prober>,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(pool: Arc<BackendPool>, settings: MonitorSettings, prober: Arc<dyn Prober>) -> Self {
        Self {
            pool,
            settings,
            prober,
        }
    }

    /// Start the probe loop on the current runtime.
    #[must_use]
    pub fn spawn(self) -> MonitorHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(cancel_rx));
        MonitorHandle {
            cancel: cancel_tx,
            task,
        }
    }

    async fn run(self, mut cancel: watch::Receiver<bool>) {
        let period = self.settings.interval;
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(
            backends = self.pool.len(),
            interval_secs = period.as_secs(),
            "health monitor started"
        );

        loop {
            tokio::select! {
                biased;
                changed = cancel.changed() => {
                    // A closed channel means the handle was dropped: stop as well.
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if *cancel.borrow() {
                        break;
                    }
                    self.probe_all().await;
                }
            }
        }

        tracing::debug!(backends = self.pool.len(), "health monitor stopped");
    }

    async fn probe_all(&self) {
        let timeout = self.settings.timeout;
        let probes = self.pool.members().iter().map(|backend| {
            let prober = Arc::clone(&self.prober);
            async move {
                let alive = prober.probe(backend, timeout).await;
                let was_alive = backend.set_alive(alive);
                if was_alive != alive {
                    if alive {
                        tracing::info!(backend = %backend, "backend is reachable again");
                    } else {
                        tracing::warn!(backend = %backend, "backend marked not alive");
                    }
                }
            }
        });
        join_all(probes).await;
    }
}

/// Cancellation handle for a spawned [`HealthMonitor`].
///
/// Dropping the handle has the same effect as [`MonitorHandle::cancel`].
#[derive(Debug)]
pub struct MonitorHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    #[must_use]
    pub fn state(&self) -> MonitorState {
        if self.task.is_finished() {
            MonitorState::Stopped
        } else {
            MonitorState::Running
        }
    }

    /// Cancel and wait for the probe loop to exit.
    pub async fn stopped(self) {
        self.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "health monitor task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct CountingProber {
        probes: AtomicUsize,
        down: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Prober for CountingProber {
        async fn probe(&self, backend: &Backend, _timeout: Duration) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            !self
                .down
                .lock()
                .unwrap()
                .iter()
                .any(|d| d == backend.origin())
        }
    }

    fn settings() -> MonitorSettings {
        MonitorSettings {
            interval: Duration::from_secs(15),
            timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_probe_waits_one_interval() {
        let prober = Arc::new(CountingProber::default());
        let pool = Arc::new(BackendPool::new(&["http://a:1", "http://b:2"]));
        let handle = HealthMonitor::new(pool, settings(), prober.clone()).spawn();

        time::sleep(Duration::from_secs(14)).await;
        assert_eq!(prober.probes.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(prober.probes.load(Ordering::SeqCst), 2);

        handle.stopped().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_marks_backend_not_alive() {
        let prober = Arc::new(CountingProber::default());
        prober.down.lock().unwrap().push("http://b:2".into());
        let pool = Arc::new(BackendPool::new(&["http://a:1", "http://b:2"]));
        let handle = HealthMonitor::new(Arc::clone(&pool), settings(), prober.clone()).spawn();

        time::sleep(Duration::from_secs(16)).await;
        assert!(pool.members()[0].is_alive());
        assert!(!pool.members()[1].is_alive());

        prober.down.lock().unwrap().clear();
        time::sleep(Duration::from_secs(15)).await;
        assert!(pool.members()[1].is_alive());

        handle.stopped().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_monitor_stops_probing() {
        let prober = Arc::new(CountingProber::default());
        let pool = Arc::new(BackendPool::new(&["http://a:1"]));
        let handle = HealthMonitor::new(pool, settings(), prober.clone()).spawn();

        time::sleep(Duration::from_secs(31)).await;
        let before = prober.probes.load(Ordering::SeqCst);
        assert_eq!(before, 2);

        handle.cancel();
        assert!(handle.is_cancelled());
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(prober.probes.load(Ordering::SeqCst), before);
        assert_eq!(handle.state(), MonitorState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_the_monitor() {
        let prober = Arc::new(CountingProber::default());
        let pool = Arc::new(BackendPool::new(&["http://a:1"]));
        drop(HealthMonitor::new(pool, settings(), prober.clone()).spawn());

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(prober.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tcp_prober_detects_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let backend = Backend::parse(&format!("http://{addr}")).unwrap();

        assert!(TcpProber.probe(&backend, Duration::from_secs(2)).await);

        drop(listener);
        assert!(!TcpProber.probe(&backend, Duration::from_secs(2)).await);
    }
}
