//! Redis-backed route source.
//!
//! [`RedisSource`] implements [`ConfigSource`] over the control plane's
//! Redis contract: every route is persisted as a JSON [`ConfigEvent`]
//! under `route:{path}` and the same payload is published on the
//! `config_updates` channel. Replay scans the persisted keys; the live
//! subscription listens on the channel.
//!
//! Connections are opened lazily, so an unreachable server at startup only
//! surfaces as [`MeshError::SourceUnavailable`] from `subscribe` or
//! `list_registered` and the caller decides how to degrade.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;

use crate::config::model::ConfigEvent;
use crate::config::{ConfigSource, EventStream};
use crate::error::MeshError;

pub const DEFAULT_CHANNEL: &str = "config_updates";
pub const DEFAULT_KEY_PATTERN: &str = "route:*";

fn unavailable(e: redis::RedisError) -> MeshError {
    MeshError::SourceUnavailable {
        backend: "redis",
        source: Box::new(e),
    }
}

pub struct RedisSource {
    client: redis::Client,
    channel: String,
    key_pattern: String,
}

impl RedisSource {
    pub fn new(url: &str, channel: &str, key_pattern: &str) -> Result<Self, MeshError> {
        let client = redis::Client::open(url).map_err(|e| MeshError::ConfigParse {
            path: "redis url".into(),
            source: Box::new(e),
        })?;

        Ok(Self {
            client,
            channel: channel.to_string(),
            key_pattern: key_pattern.to_string(),
        })
    }
}

#[async_trait]
impl ConfigSource for RedisSource {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn subscribe(&self) -> Result<EventStream, MeshError> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(unavailable)?;
        pubsub.subscribe(&self.channel).await.map_err(unavailable)?;
        tracing::info!(channel = %self.channel, "subscribed to route updates");

        let channel = self.channel.clone();
        let events = pubsub.into_on_message().map(move |msg| {
            let payload: String = msg.get_payload().map_err(|e| MeshError::ConfigParse {
                path: channel.clone(),
                source: Box::new(e),
            })?;
            ConfigEvent::from_json(&payload, &channel)
        });
        Ok(events.boxed())
    }

    async fn list_registered(&self) -> Result<Vec<ConfigEvent>, MeshError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;

        let mut keys: Vec<String> = conn.keys(&self.key_pattern).await.map_err(unavailable)?;
        keys.sort();

        let mut events = Vec::with_capacity(keys.len());
        for key in keys {
            let value: Option<String> = conn.get(&key).await.map_err(unavailable)?;
            let Some(payload) = value else {
                continue;
            };
            match ConfigEvent::from_json(&payload, &key) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(key = %key, error = %e, "skipping unreadable registry entry"),
            }
        }
        Ok(events)
    }
}
