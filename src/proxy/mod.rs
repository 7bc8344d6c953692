//! Per-request dispatch.
//!
//! The [`Dispatcher`] matches a request path against the
//! [`RoutingTable`](routing::RoutingTable), takes the next backend from the
//! matched pool, strips the matched prefix and hands the rewritten request
//! to the [`Forwarder`](forward::Forwarder). [`dispatch_handler`] is the
//! Axum fallback wrapping it: it turns [`DispatchError`]s into 404 / 503 /
//! 502 responses and keeps the request counters.

pub mod forward;
pub mod headers;
pub mod routing;

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use crate::balancer::Backend;
use crate::error::DispatchError;
use crate::server::AppState;
use forward::{ForwardRequest, ForwardResponse, Forwarder};
use routing::RoutingTable;

/// Outcome of route lookup and backend selection for one path.
#[derive(Debug, Clone)]
pub struct Selection {
    pub prefix: Arc<str>,
    pub backend: Arc<Backend>,
    pub upstream_path: String,
}

/// An inbound request as seen by the dispatcher.
#[derive(Debug)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_addr: SocketAddr,
    pub correlation_id: String,
}

/// Remove `prefix` from `path`. The result always starts with `/`.
#[must_use]
pub fn strip_prefix(path: &str, prefix: &str) -> String {
    let rest = path.strip_prefix(prefix).unwrap_or(path);
    if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    }
}

pub struct Dispatcher {
    table: Arc<RoutingTable>,
    forwarder: Arc<dyn Forwarder>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(table: Arc<RoutingTable>, forwarder: Arc<dyn Forwarder>) -> Self {
        Self { table, forwarder }
    }

    #[must_use]
    pub fn table(&self) -> &Arc<RoutingTable> {
        &self.table
    }

    /// Route lookup and backend selection. Never blocks.
    pub fn select(&self, path: &str) -> Result<Selection, DispatchError> {
        let route = self
            .table
            .lookup(path)
            .ok_or_else(|| DispatchError::RouteNotFound {
                path: path.to_string(),
            })?;

        let backend = route
            .pool
            .next()
            .ok_or_else(|| DispatchError::ServiceUnavailable {
                prefix: route.prefix.to_string(),
            })?;

        Ok(Selection {
            upstream_path: strip_prefix(path, &route.prefix),
            prefix: route.prefix,
            backend,
        })
    }

    pub async fn dispatch(&self, request: InboundRequest) -> Result<ForwardResponse, DispatchError> {
        let selection = self.select(request.uri.path())?;

        let path_and_query = match request.uri.query() {
            Some(query) => format!("{}?{query}", selection.upstream_path),
            None => selection.upstream_path.clone(),
        };
        let headers = headers::build_forwarded_headers(
            &request.headers,
            &request.client_addr.ip().to_string(),
            &selection.backend,
            &request.correlation_id,
        );

        tracing::info!(
            correlation_id = %request.correlation_id,
            method = %request.method,
            path = %request.uri.path(),
            route = %selection.prefix,
            backend = %selection.backend,
            upstream_path = %path_and_query,
            "dispatching request"
        );

        let outbound = ForwardRequest {
            method: request.method,
            path_and_query,
            headers,
            body: request.body,
        };

        self.forwarder
            .forward(outbound, &selection.backend)
            .await
            .map_err(|source| DispatchError::ForwardingFailure {
                backend: selection.backend.to_string(),
                source,
            })
    }
}

pub async fn dispatch_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    req_headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = req_headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

    let request = InboundRequest {
        method,
        uri,
        headers: req_headers,
        body,
        client_addr: addr,
        correlation_id: correlation_id.clone(),
    };

    match state.dispatcher.dispatch(request).await {
        Ok(ForwardResponse {
            status,
            headers: mut resp_headers,
            body,
        }) => {
            state.stats.forwarded.fetch_add(1, Ordering::Relaxed);
            headers::strip_response_hop_by_hop(&mut resp_headers);
            let mut builder = Response::builder().status(status);
            for (key, value) in &resp_headers {
                builder = builder.header(key, value);
            }
            builder
                .header("x-correlation-id", &correlation_id)
                .body(axum::body::Body::from(body))
                .unwrap_or_else(|e| {
                    tracing::error!(
                        correlation_id = %correlation_id,
                        error = %e,
                        "failed to build response"
                    );
                    StatusCode::BAD_GATEWAY.into_response()
                })
        }
        Err(e) => {
            match &e {
                DispatchError::RouteNotFound { path } => {
                    state.stats.not_found.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(correlation_id = %correlation_id, path = %path, "no route matched");
                }
                DispatchError::ServiceUnavailable { prefix } => {
                    state.stats.unavailable.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(correlation_id = %correlation_id, route = %prefix, "no backend available");
                }
                DispatchError::ForwardingFailure { backend, source } => {
                    state.stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        correlation_id = %correlation_id,
                        backend = %backend,
                        error = %source,
                        "forwarding failed"
                    );
                }
            }
            e.into_response()
        }
    }
}
