//! Serde data structures for configuration events and route files.
//!
//! A [`ConfigEvent`] describes the desired state of one route: its path
//! prefix and the ordered list of backend endpoint URLs. On the wire (the
//! publish/subscribe payload and the persisted registry) and inside route
//! files it is `{"path": ..., "backends": [...]}`.

use serde::{Deserialize, Serialize};

use crate::error::MeshError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigEvent {
    #[serde(rename = "path")]
    pub prefix: String,

    #[serde(default)]
    pub backends: Vec<String>,
}

impl ConfigEvent {
    #[must_use]
    pub fn new<I, S>(prefix: impl Into<String>, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            backends: backends.into_iter().map(Into::into).collect(),
        }
    }

    /// Decode a JSON payload. `origin` names where it came from, for errors.
    pub fn from_json(payload: &str, origin: &str) -> Result<Self, MeshError> {
        serde_json::from_str(payload).map_err(|e| MeshError::ConfigParse {
            path: origin.to_string(),
            source: Box::new(e),
        })
    }

    pub fn to_json(&self) -> Result<String, MeshError> {
        serde_json::to_string(self).map_err(|e| MeshError::ConfigParse {
            path: self.prefix.clone(),
            source: Box::new(e),
        })
    }

    /// Check the parts of an event that must hold before it can be applied.
    ///
    /// Backend addresses are not checked here: malformed ones are dropped
    /// individually when the pool is built.
    pub fn validate(&self) -> Result<(), MeshError> {
        crate::config::validation::validate_prefix(&self.prefix).map_err(|reason| {
            MeshError::InvalidEvent {
                prefix: self.prefix.clone(),
                reason,
            }
        })
    }
}

/// Document read by the file-backed source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutesFile {
    #[serde(default)]
    pub routes: Vec<ConfigEvent>,
}

impl RoutesFile {
    #[must_use]
    pub fn total_backends(&self) -> usize {
        self.routes.iter().map(|r| r.backends.len()).sum()
    }
}
