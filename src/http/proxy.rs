//! Backend forwarding.
//!
//! # Responsibilities
//! - Rewrite the request target onto the backend origin
//! - Strip hop-by-hop headers, rewrite `Host`, add `X-Forwarded-*`
//! - Bound the backend call by the upstream timeout, both until the
//!   response headers and between body frames afterwards
//!
//! # Design Decisions
//! - Bodies are streamed both ways, never buffered
//! - No retries: the gateway sits in front of one local backend
//! - On timeout the in-flight call is dropped, releasing its connection

use std::net::IpAddr;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, uri::Authority, HeaderValue, Request, Uri, Version},
    response::Response,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::error::{GatewayError, ProxyError};
use crate::http::request::RequestIdExt;
use crate::http::response::relay;
use crate::observability::metrics;
use crate::security::headers::{append_forwarded, strip_hop_by_hop};

/// HTTP client bound to the backend origin.
#[derive(Clone)]
pub struct Upstream {
    client: Client<HttpConnector, Body>,
    authority: Authority,
    timeout: Duration,
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upstream")
            .field("authority", &self.authority)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Upstream {
    /// Client for `backend_url` (an `http://host:port` origin).
    pub fn new(backend_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let authority = parse_origin(backend_url)
            .ok_or_else(|| GatewayError::BackendOrigin(backend_url.to_string()))?;

        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.set_connect_timeout(Some(timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            authority,
            timeout,
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Backend URI for an incoming path and query.
    pub fn target_uri(&self, path_and_query: &str) -> Result<Uri, ProxyError> {
        Uri::builder()
            .scheme("http")
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| ProxyError::InvalidTarget(e.to_string()))
    }

    /// `ws://` URL of the backend for an incoming path and query.
    pub fn websocket_url(&self, path_and_query: &str) -> String {
        format!("ws://{}{}", self.authority, path_and_query)
    }

    /// Forward `req` to the backend and relay its response.
    pub async fn forward(&self, req: Request<Body>, peer: IpAddr) -> Result<Response, ProxyError> {
        let request_id = req.request_id().unwrap_or("-").to_string();
        let (mut parts, body) = req.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        parts.uri = self.target_uri(path_and_query)?;
        parts.version = Version::HTTP_11;

        let original_host = parts.headers.get(header::HOST).cloned();
        strip_hop_by_hop(&mut parts.headers);
        append_forwarded(&mut parts.headers, peer, original_host);
        if let Ok(host) = HeaderValue::from_str(self.authority.as_str()) {
            parts.headers.insert(header::HOST, host);
        }

        let request = Request::from_parts(parts, body);
        let result = match tokio::time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(relay(response, self.timeout)),
            Ok(Err(e)) => Err(ProxyError::Unreachable(e.to_string())),
            Err(_) => Err(ProxyError::Timeout(self.timeout)),
        };

        if let Err(e) = &result {
            metrics::record_upstream_error(e.kind());
            tracing::warn!(
                request_id = %request_id,
                backend = %self.authority,
                error = %e,
                "Upstream request failed"
            );
        }
        result
    }
}

fn parse_origin(backend_url: &str) -> Option<Authority> {
    let url = Url::parse(backend_url).ok()?;
    if url.scheme() != "http" {
        return None;
    }
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    format!("{host}:{port}").parse().ok()
}
