//! Backend pools, round-robin selection and liveness monitoring.
//!
//! - [`backend`] -- one upstream endpoint with its liveness flag.
//! - [`pool`] -- the immutable-once-published, round-robin [`BackendPool`].
//! - [`monitor`] -- the cancellable [`HealthMonitor`] bound to one pool.

pub mod backend;
pub mod monitor;
pub mod pool;

pub use backend::Backend;
pub use monitor::{HealthMonitor, MonitorHandle, MonitorSettings, MonitorState, Prober, TcpProber};
pub use pool::BackendPool;
