//! Configuration events, sources and their application to the routing table.
//!
//! Defines the [`ConfigSource`] trait for pluggable route sources (a live
//! subscription plus a bulk replay of the persisted registry) and the
//! [`EventStream`] it produces. Submodules provide the event model,
//! validation, concrete sources and the [`ConfigApplier`](applier::ConfigApplier).

pub mod applier;
pub mod model;
pub mod sources;
pub mod validation;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::MeshError;
use model::ConfigEvent;

/// Lazy, unbounded sequence of live events. Items that failed to decode
/// are yielded as errors so the consumer can log and skip them.
pub type EventStream = BoxStream<'static, Result<ConfigEvent, MeshError>>;

// async_trait is required here because ConfigSource is used as Arc<dyn ConfigSource>
// and native async fn in traits does not support dyn dispatch.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open the live event subscription.
    async fn subscribe(&self) -> Result<EventStream, MeshError>;

    /// Enumerate every persisted route once. Entries that fail to decode are
    /// logged and skipped by the source.
    async fn list_registered(&self) -> Result<Vec<ConfigEvent>, MeshError>;
}
