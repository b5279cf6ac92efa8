//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the dispatch handler
//! - Wire up middleware (request ID, tracing, limits, security headers,
//!   access log, policy, CORS)
//! - Dispatch admitted requests by route class
//! - Serve until shutdown, then drain for the grace period

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, ConnectInfo, FromRequestParts, State},
    http::{header, HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::assets::StaticAssets;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::health::{csrf_token_response, health_response, GatewayStats};
use crate::http::proxy::Upstream;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::websocket::proxy_websocket;
use crate::observability::access_log::{access_log_middleware, AccessLogState};
use crate::routing::{classify, RouteClass};
use crate::security::csrf::CSRF_HEADER;
use crate::security::headers::security_headers;
use crate::security::{policy_middleware, PolicyEngine, RateLimiter};

/// How often idle rate-limit windows are reclaimed.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub policy: Arc<PolicyEngine>,
    pub assets: Arc<StaticAssets>,
    pub upstream: Upstream,
    pub stats: Arc<GatewayStats>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: Arc<GatewayConfig>) -> Result<Self, GatewayError> {
        let upstream = Upstream::new(&config.network.backend_url, config.network.upstream_timeout)?;

        let state = AppState {
            policy: Arc::new(PolicyEngine::new(&config)),
            assets: Arc::new(StaticAssets::new(config.paths.static_dir.clone())),
            upstream,
            stats: Arc::new(GatewayStats::new()),
            config,
        };

        let router = Self::build_router(state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let network = &state.config.network;
        let access_log = AccessLogState {
            stats: state.stats.clone(),
            enabled: state.config.security.request_log_enabled,
        };

        let mut router = Router::new()
            .fallback(dispatch)
            .with_state(state.clone())
            .layer(cors_layer(&network.allowed_origins))
            .layer(middleware::from_fn_with_state(
                state.policy.clone(),
                policy_middleware,
            ))
            .layer(middleware::from_fn_with_state(access_log, access_log_middleware));

        for (name, value) in security_headers() {
            router = router.layer(SetResponseHeaderLayer::if_not_present(name, value));
        }

        router
            .layer(RequestBodyLimitLayer::new(network.max_body_bytes))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                network.request_timeout,
            ))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Router with all layers, for driving requests without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn stats(&self) -> Arc<GatewayStats> {
        self.state.stats.clone()
    }

    pub fn rate_limiter(&self) -> Option<Arc<RateLimiter>> {
        self.state.policy.limiter().cloned()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests
    /// for at most the configured grace period.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let grace = self.state.config.network.shutdown_grace;
        tracing::info!(
            address = %addr,
            backend = %self.state.upstream.authority(),
            static_root = ?self.state.assets.root(),
            "HTTP server starting"
        );

        if let Some(limiter) = self.rate_limiter() {
            tokio::spawn(sweep_rate_limits(limiter, shutdown.resubscribe()));
        }

        let mut force = shutdown.resubscribe();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server no longer accepting connections");
            })
            .into_future();

        let deadline = async move {
            let _ = force.recv().await;
            tokio::time::sleep(grace).await;
        };

        tokio::select! {
            result = serve => result?,
            _ = deadline => {
                tracing::warn!(grace = ?grace, "Grace period elapsed, dropping in-flight requests");
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Fallback handler: every admitted request lands here.
async fn dispatch(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request<Body>,
) -> Response {
    let class = classify(req.uri().path());
    tracing::debug!(path = %req.uri().path(), class = class.as_str(), "Dispatching request");

    match class {
        RouteClass::Health => health_response(&state.config, &state.stats),
        RouteClass::CsrfToken => csrf_token_response(state.policy.csrf()),
        RouteClass::WebSocket => websocket(state, peer, req).await,
        RouteClass::Api => forward(&state, peer, req).await,
        RouteClass::Static | RouteClass::Shell => {
            state.assets.serve(req.method(), req.uri().path()).await
        }
    }
}

async fn forward(state: &AppState, peer: SocketAddr, req: Request<Body>) -> Response {
    state
        .upstream
        .forward(req, peer.ip())
        .await
        .unwrap_or_else(IntoResponse::into_response)
}

/// Upgrade requests are proxied as websockets; anything else is plain HTTP.
async fn websocket(state: AppState, peer: SocketAddr, req: Request<Body>) -> Response {
    let (mut parts, body) = req.into_parts();
    match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(upgrade) => {
            let path_and_query = parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            proxy_websocket(upgrade, &state.upstream, path_and_query, &parts.headers, peer.ip())
                .await
        }
        Err(_) => forward(&state, peer, Request::from_parts(parts, body)).await,
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
            CSRF_HEADER,
        ])
        .allow_credentials(true);

    if origins.iter().any(|o| o == "*") {
        layer.allow_origin(AllowOrigin::mirror_request())
    } else {
        let allowed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}

async fn sweep_rate_limits(limiter: Arc<RateLimiter>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                limiter.sweep();
            }
            _ = shutdown.recv() => {
                tracing::debug!("Rate-limit sweeper received shutdown signal, exiting loop");
                break;
            }
        }
    }
}
