//! Unified error types for relaymesh.
//!
//! Defines [`MeshError`] (the main crate error enum), [`DispatchError`]
//! for the per-request failures that map onto HTTP status codes, and
//! [`ValidationError`] for route file validation failures. All use
//! `thiserror` for `Display` and `Error` derives.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub route: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "  route {}: {} — {}",
            self.route, self.field, self.message
        )?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MeshError {
    #[error("No config source found.\n\n  {hint}")]
    NoConfigSource { hint: String },

    #[error("Routes file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Routes validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Invalid config event for prefix '{prefix}': {reason}")]
    InvalidEvent { prefix: String, reason: String },

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Config source '{backend}' unavailable: {source}")]
    SourceUnavailable {
        backend: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("Invalid URI: {source}")]
    UriParse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Upstream timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),
}

/// Per-request failures raised by the dispatch path.
///
/// Every variant is contained to the request that produced it and maps
/// onto a user-visible status code through [`IntoResponse`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no route matches '{path}'")]
    RouteNotFound { path: String },

    #[error("route '{prefix}' has no usable backend")]
    ServiceUnavailable { prefix: String },

    #[error("forwarding to {backend} failed: {source}")]
    ForwardingFailure {
        backend: String,
        #[source]
        source: MeshError,
    },
}

impl DispatchError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::ForwardingFailure { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let body = match self {
            Self::RouteNotFound { .. } => "relaymesh: no route for this path",
            Self::ServiceUnavailable { .. } => "relaymesh: no backend available",
            Self::ForwardingFailure { .. } => "relaymesh: backend is unreachable",
        };
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_map_to_status_codes() {
        let not_found = DispatchError::RouteNotFound {
            path: "/unknown".into(),
        };
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let unavailable = DispatchError::ServiceUnavailable {
            prefix: "/x".into(),
        };
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);

        let failed = DispatchError::ForwardingFailure {
            backend: "http://a:80".into(),
            source: MeshError::Timeout(std::time::Duration::from_secs(10)),
        };
        assert_eq!(failed.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(failed.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn validation_errors_render_with_suggestion() {
        let err = MeshError::ConfigValidation {
            errors: vec![ValidationError {
                route: "api".into(),
                field: "path".into(),
                message: "prefix must start with '/'".into(),
                suggestion: Some("did you mean '/api'?".into()),
            }],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("route api: path"));
        assert!(rendered.contains("did you mean '/api'?"));
    }
}
