//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Establish WebSocket connection to backend before accepting the client
//! - Complete upgrade handshake with client
//! - Bidirectional frame forwarding
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Gateway ←──── WebSocket frames ────→ Backend
//! ```
//!
//! # Design Decisions
//! - Backend failure is reported as 502 before the client is upgraded
//! - Frame-level forwarding (no message buffering)
//! - Close frames propagated in both directions
//! - Ping/pong forwarded as ordinary frames

use std::net::IpAddr;

use axum::{
    extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    tungstenite::{
        self,
        client::IntoClientRequest,
        protocol::{frame::coding::CloseCode, CloseFrame as BackendCloseFrame},
    },
    MaybeTlsStream, WebSocketStream,
};

use crate::error::ProxyError;
use crate::http::proxy::Upstream;
use crate::observability::metrics;
use crate::security::policy::LOCAL_BYPASS_HEADER;

type BackendSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Headers carried over to the backend handshake.
const FORWARDED: [HeaderName; 3] = [
    header::COOKIE,
    header::AUTHORIZATION,
    header::SEC_WEBSOCKET_PROTOCOL,
];

/// Connect to the backend, then upgrade the client and pump frames.
///
/// `headers` are the client's request headers after policy evaluation, so
/// the bypass header is only present for bypassed callers.
pub async fn proxy_websocket(
    upgrade: WebSocketUpgrade,
    upstream: &Upstream,
    path_and_query: &str,
    headers: &HeaderMap,
    peer: IpAddr,
) -> Response {
    let url = upstream.websocket_url(path_and_query);
    let (backend, protocol) = match connect_backend(&url, headers, peer, upstream).await {
        Ok(connected) => connected,
        Err(e) => {
            metrics::record_upstream_error(e.kind());
            tracing::warn!(url = %url, error = %e, "Backend websocket connect failed");
            return e.into_response();
        }
    };

    tracing::debug!(url = %url, peer = %peer, "Websocket proxy established");
    let upgrade = match protocol {
        Some(protocol) => upgrade.protocols([protocol]),
        None => upgrade,
    };
    upgrade.on_upgrade(move |client| pump(client, backend))
}

async fn connect_backend(
    url: &str,
    headers: &HeaderMap,
    peer: IpAddr,
    upstream: &Upstream,
) -> Result<(BackendSocket, Option<String>), ProxyError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| ProxyError::InvalidTarget(e.to_string()))?;

    let outbound = request.headers_mut();
    for name in FORWARDED.iter().chain(std::iter::once(&LOCAL_BYPASS_HEADER)) {
        if let Some(value) = headers.get(name) {
            outbound.insert(name.clone(), value.clone());
        }
    }
    if let Ok(value) = HeaderValue::from_str(&peer.to_string()) {
        outbound.insert(HeaderName::from_static("x-forwarded-for"), value);
    }

    let connect = tokio_tungstenite::connect_async(request);
    let (socket, response) = tokio::time::timeout(upstream.timeout(), connect)
        .await
        .map_err(|_| ProxyError::Timeout(upstream.timeout()))?
        .map_err(|e| ProxyError::Handshake(e.to_string()))?;

    let protocol = response
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Ok((socket, protocol))
}

async fn pump(client: WebSocket, backend: BackendSocket) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut backend_tx, mut backend_rx) = backend.split();

    let upstream = async {
        while let Some(Ok(message)) = client_rx.next().await {
            let closing = matches!(message, Message::Close(_));
            if backend_tx.send(to_backend(message)).await.is_err() || closing {
                break;
            }
        }
        let _ = backend_tx.close().await;
    };

    let downstream = async {
        while let Some(Ok(message)) = backend_rx.next().await {
            let Some(message) = to_client(message) else {
                continue;
            };
            let closing = matches!(message, Message::Close(_));
            if client_tx.send(message).await.is_err() || closing {
                break;
            }
        }
        let _ = client_tx.close().await;
    };

    tokio::select! {
        _ = upstream => tracing::debug!("Client side of websocket proxy closed"),
        _ = downstream => tracing::debug!("Backend side of websocket proxy closed"),
    }
}

fn to_backend(message: Message) -> tungstenite::Message {
    match message {
        Message::Text(text) => tungstenite::Message::text(text.as_str().to_owned()),
        Message::Binary(bytes) => tungstenite::Message::Binary(bytes),
        Message::Ping(bytes) => tungstenite::Message::Ping(bytes),
        Message::Pong(bytes) => tungstenite::Message::Pong(bytes),
        Message::Close(frame) => tungstenite::Message::Close(frame.map(|f| BackendCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().to_owned().into(),
        })),
    }
}

fn to_client(message: tungstenite::Message) -> Option<Message> {
    Some(match message {
        tungstenite::Message::Text(text) => Message::text(text.as_str().to_owned()),
        tungstenite::Message::Binary(bytes) => Message::Binary(bytes),
        tungstenite::Message::Ping(bytes) => Message::Ping(bytes),
        tungstenite::Message::Pong(bytes) => Message::Pong(bytes),
        tungstenite::Message::Close(frame) => Message::Close(frame.map(|f| CloseFrame {
            code: u16::from(f.code),
            reason: f.reason.as_str().to_owned().into(),
        })),
        tungstenite::Message::Frame(_) => return None,
    })
}
