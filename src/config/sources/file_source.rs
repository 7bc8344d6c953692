//! Generic async file-based route source with SHA256 change detection.
//!
//! [`FileSource`] implements [`ConfigSource`] for any file format by
//! accepting a deserialization function at construction time. Replay reads
//! the whole file. The subscription polls the file and, whenever its SHA256
//! digest changes, yields one event per route that was added or whose
//! backend list changed. Routes removed from the file stay installed: the
//! routing table never deletes entries.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::time::{self, Interval, MissedTickBehavior};

use super::sha256_hex;
use crate::config::model::{ConfigEvent, RoutesFile};
use crate::config::{ConfigSource, EventStream};
use crate::error::MeshError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

type DeserializeFn = fn(&str) -> Result<RoutesFile, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Clone)]
pub struct FileSource {
    path: PathBuf,
    name: &'static str,
    deserialize: DeserializeFn,
    poll_interval: Duration,
}

impl FileSource {
    #[must_use]
    pub fn new(path: PathBuf, name: &'static str, deserialize: DeserializeFn) -> Self {
        Self {
            path,
            name,
            deserialize,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn read_content(&self) -> Result<String, MeshError> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MeshError::ConfigFileNotFound {
                    path: self.path.clone(),
                }
            } else {
                MeshError::Io(e)
            }
        })
    }

    fn parse(&self, content: &str) -> Result<RoutesFile, MeshError> {
        (self.deserialize)(content).map_err(|e| MeshError::ConfigParse {
            path: self.path.display().to_string(),
            source: e,
        })
    }

    async fn load(&self) -> Result<(RoutesFile, String), MeshError> {
        let content = self.read_content().await?;
        let routes = self.parse(&content)?;
        Ok((routes, sha256_hex(content.as_bytes())))
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn subscribe(&self) -> Result<EventStream, MeshError> {
        let (routes, hash) = self.load().await?;
        let known = routes
            .routes
            .into_iter()
            .map(|event| (event.prefix, event.backends))
            .collect();

        let mut ticker = time::interval_at(
            time::Instant::now() + self.poll_interval,
            self.poll_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let watch = FileWatch {
            source: self.clone(),
            hash,
            known,
            pending: VecDeque::new(),
            ticker,
        };
        Ok(stream::unfold(watch, FileWatch::next_event).boxed())
    }

    async fn list_registered(&self) -> Result<Vec<ConfigEvent>, MeshError> {
        let (routes, _) = self.load().await?;
        Ok(routes.routes)
    }
}

struct FileWatch {
    source: FileSource,
    hash: String,
    known: HashMap<String, Vec<String>>,
    pending: VecDeque<Result<ConfigEvent, MeshError>>,
    ticker: Interval,
}

impl FileWatch {
    async fn next_event(mut self) -> Option<(Result<ConfigEvent, MeshError>, Self)> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some((item, self));
            }
            self.ticker.tick().await;
            self.poll().await;
        }
    }

    async fn poll(&mut self) {
        let content = match self.source.read_content().await {
            Ok(content) => content,
            Err(e) => {
                self.pending.push_back(Err(e));
                return;
            }
        };

        let hash = sha256_hex(content.as_bytes());
        if hash == self.hash {
            return;
        }
        self.hash = hash;

        match self.source.parse(&content) {
            Ok(routes) => {
                tracing::info!(path = %self.source.path.display(), "routes file changed");
                for event in routes.routes {
                    if self.known.get(&event.prefix) == Some(&event.backends) {
                        continue;
                    }
                    self.known
                        .insert(event.prefix.clone(), event.backends.clone());
                    self.pending.push_back(Ok(event));
                }
            }
            Err(e) => self.pending.push_back(Err(e)),
        }
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;

    fn temp_routes_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "relaymesh-{}-{name}.json",
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn replays_every_route() {
        let path = temp_routes_file(
            "replay",
            r#"{"routes":[{"path":"/a","backends":["http://a:1"]},{"path":"/b","backends":[]}]}"#,
        );
        let source = super::super::json::new(path.clone());
        let events = source.list_registered().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ConfigEvent::new("/a", ["http://a:1"]));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let source = super::super::json::new(PathBuf::from("/nonexistent/relaymesh.json"));
        assert!(matches!(
            source.subscribe().await,
            Err(MeshError::ConfigFileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn subscription_yields_only_changed_routes() {
        let path = temp_routes_file(
            "watch",
            r#"{"routes":[{"path":"/a","backends":["http://a:1"]},{"path":"/b","backends":["http://b:1"]}]}"#,
        );
        let source =
            super::super::json::new(path.clone()).with_poll_interval(Duration::from_millis(20));
        let mut events = source.subscribe().await.unwrap();

        std::fs::write(
            &path,
            r#"{"routes":[{"path":"/a","backends":["http://a:1"]},{"path":"/b","backends":["http://b:2"]}]}"#,
        )
        .unwrap();

        let event = time::timeout(Duration::from_secs(2), events.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(event, ConfigEvent::new("/b", ["http://b:2"]));
        let _ = std::fs::remove_file(path);
    }
}
