//! In-process route source.
//!
//! [`MemorySource`] keeps a registry of JSON payloads keyed by prefix and
//! a broadcast channel for live events, mirroring the persist-then-publish
//! contract of the Redis source without an external broker. Used to embed
//! relaymesh and to drive the applier in tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;

use crate::config::model::ConfigEvent;
use crate::config::{ConfigSource, EventStream};
use crate::error::MeshError;

const CHANNEL_CAPACITY: usize = 1024;

pub struct MemorySource {
    registry: RwLock<BTreeMap<String, String>>,
    channel: broadcast::Sender<String>,
    reachable: AtomicBool,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        let (channel, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            registry: RwLock::new(BTreeMap::new()),
            channel,
            reachable: AtomicBool::new(true),
        }
    }

    /// Persist `event` in the registry and publish it to subscribers.
    pub async fn register(&self, event: &ConfigEvent) -> Result<(), MeshError> {
        let payload = event.to_json()?;
        self.registry
            .write()
            .await
            .insert(event.prefix.clone(), payload.clone());
        let _ = self.channel.send(payload);
        Ok(())
    }

    /// Persist a raw payload under `key` without publishing it.
    pub async fn persist_raw(&self, key: impl Into<String>, payload: impl Into<String>) {
        self.registry.write().await.insert(key.into(), payload.into());
    }

    /// Publish an arbitrary payload without persisting it.
    pub fn publish_raw(&self, payload: impl Into<String>) {
        let _ = self.channel.send(payload.into());
    }

    /// Simulate the source going offline (or coming back).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.channel.receiver_count()
    }

    fn ensure_reachable(&self) -> Result<(), MeshError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MeshError::SourceUnavailable {
                backend: "memory",
                source: "source marked unreachable".into(),
            })
        }
    }
}

#[async_trait]
impl ConfigSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn subscribe(&self) -> Result<EventStream, MeshError> {
        self.ensure_reachable()?;
        let receiver = self.channel.subscribe();

        let events = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => {
                        let event = ConfigEvent::from_json(&payload, "memory");
                        return Some((event, receiver));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "route subscriber lagged, events dropped");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });
        Ok(events.boxed())
    }

    async fn list_registered(&self) -> Result<Vec<ConfigEvent>, MeshError> {
        self.ensure_reachable()?;
        let registry = self.registry.read().await;

        let mut events = Vec::with_capacity(registry.len());
        for (key, payload) in registry.iter() {
            match ConfigEvent::from_json(payload, key) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(key = %key, error = %e, "skipping unreadable registry entry"),
            }
        }
        Ok(events)
    }
}
