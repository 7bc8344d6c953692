//! The forwarding engine: sends one prepared request to one backend.
//!
//! The dispatcher only sees the [`Forwarder`] trait. [`HyperForwarder`]
//! is the production implementation on top of the pooled hyper client
//! built by [`build_http_client`](crate::server::build_http_client); the
//! connect timeout lives in that client, the response timeout here. There
//! is no retry: a failure is reported to the caller as-is.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use http::Uri;
use http_body_util::{BodyExt, Full};
use hyper::StatusCode;

use crate::balancer::Backend;
use crate::error::MeshError;
use crate::server::HttpClient;

pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// An outbound request, already rewritten for its backend.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    /// Upstream path (prefix stripped) plus the original query string.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug)]
pub struct ForwardResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        request: ForwardRequest,
        backend: &Backend,
    ) -> Result<ForwardResponse, MeshError>;
}

pub struct HyperForwarder {
    client: HttpClient,
    response_timeout: Duration,
}

impl HyperForwarder {
    #[must_use]
    pub const fn new(client: HttpClient, response_timeout: Duration) -> Self {
        Self {
            client,
            response_timeout,
        }
    }
}

#[async_trait]
impl Forwarder for HyperForwarder {
    async fn forward(
        &self,
        request: ForwardRequest,
        backend: &Backend,
    ) -> Result<ForwardResponse, MeshError> {
        let start = Instant::now();
        let uri: Uri = format!("{}{}", backend.origin(), request.path_and_query)
            .parse()
            .map_err(|e: http::uri::InvalidUri| MeshError::UriParse {
                source: Box::new(e),
            })?;

        let mut builder = hyper::Request::builder().method(request.method).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = request.headers;
        }
        let outbound = builder
            .body(Full::new(request.body))
            .map_err(|e| MeshError::HttpRequest {
                source: Box::new(e),
            })?;

        let response = tokio::time::timeout(self.response_timeout, self.client.request(outbound))
            .await
            .map_err(|_| MeshError::Timeout(self.response_timeout))?
            .map_err(|e| MeshError::HttpRequest {
                source: Box::new(e),
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = tokio::time::timeout(self.response_timeout, response.into_body().collect())
            .await
            .map_err(|_| MeshError::Timeout(self.response_timeout))?
            .map_err(|e| MeshError::HttpRequest {
                source: format!("body read error: {e}").into(),
            })?
            .to_bytes();

        tracing::debug!(
            backend = %backend,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "backend responded"
        );

        Ok(ForwardResponse {
            status,
            headers,
            body,
        })
    }
}
