//! Configuration schema definitions.
//!
//! [`GatewayConfig`] is the immutable snapshot every component reads. The
//! `Default` impls below are the documented defaults; the loader starts from
//! them and overrides field by field from the environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Serialize, Default)]
pub struct GatewayConfig {
    /// Bind address, CORS and backend origin.
    pub network: NetworkConfig,

    /// Session limits advertised to the backend's clients.
    pub sessions: SessionConfig,

    /// Authentication switches.
    pub auth: AuthConfig,

    /// Filesystem roots.
    pub paths: PathsConfig,

    /// Periodic save settings.
    pub persistence: PersistenceConfig,

    /// Security middleware settings.
    pub security: SecurityConfig,

    /// Tunnel provider flags and credentials.
    pub tunnels: TunnelsConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// `host:port` string handed to the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.network.host, self.network.port)
    }
}

/// Network bind parameters and upstream settings.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins. `*` mirrors the request origin.
    pub allowed_origins: Vec<String>,

    /// Backend origin, e.g. `http://127.0.0.1:4021`.
    pub backend_url: String,

    /// Budget for a single backend call (until response headers).
    pub upstream_timeout: Duration,

    /// Outer bound on handling any request.
    pub request_timeout: Duration,

    /// How long in-flight requests may run after shutdown begins.
    pub shutdown_grace: Duration,

    /// Maximum accepted request body.
    pub max_body_bytes: usize,

    /// Display name reported by `/health`.
    pub server_name: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4020,
            allowed_origins: vec!["*".to_string()],
            backend_url: "http://127.0.0.1:4021".to_string(),
            upstream_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(10),
            max_body_bytes: 16 * 1024 * 1024,
            server_name: "TunnelForge Gateway".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionConfig {
    pub max_sessions: u32,
    /// Session timeout in minutes.
    pub timeout_minutes: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 50,
            timeout_minutes: 24 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthConfig {
    pub enabled: bool,
    /// Whether API access requires authentication.
    pub required: bool,
    /// Whether loopback callers may use the `X-TunnelForge-Local` header.
    pub allow_local_bypass: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            required: false,
            allow_local_bypass: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PathsConfig {
    /// Root of the served web assets.
    pub static_dir: PathBuf,
    /// Fail startup when `static_dir` is unreadable.
    pub require_static: bool,
    pub filesystem_base: PathBuf,
    pub git_base: PathBuf,
    pub vapid_key_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home = home_dir();
        Self {
            static_dir: PathBuf::from("../web/public"),
            require_static: false,
            filesystem_base: home.clone(),
            git_base: home.clone(),
            vapid_key_path: home.join(".tunnelforge/keys"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub interval: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: home_dir().join(".tunnelforge/sessions"),
            interval: Duration::from_secs(30),
        }
    }
}

/// Security middleware configuration.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityConfig {
    pub rate_limit_enabled: bool,
    /// Requests per rolling minute per client address.
    pub rate_limit_per_min: u32,
    /// Upper bound on tracked client addresses.
    pub rate_limit_max_clients: usize,

    pub csrf_enabled: bool,
    #[serde(skip_serializing)]
    pub csrf_secret: String,

    pub ip_allowlist_enabled: bool,
    /// CIDR ranges or single addresses.
    pub allowed_ips: Vec<String>,

    pub request_log_enabled: bool,
}

pub const DEFAULT_CSRF_SECRET: &str = "tunnelforge-csrf-secret-change-in-production";

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            rate_limit_enabled: true,
            rate_limit_per_min: 100,
            rate_limit_max_clients: 10_000,
            csrf_enabled: false,
            csrf_secret: DEFAULT_CSRF_SECRET.to_string(),
            ip_allowlist_enabled: false,
            allowed_ips: vec!["127.0.0.1/8".to_string(), "::1/128".to_string()],
            request_log_enabled: true,
        }
    }
}

/// Supported tunnel providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelProvider {
    Cloudflare,
    Ngrok,
    Tailscale,
}

impl TunnelProvider {
    pub const ALL: [TunnelProvider; 3] = [
        TunnelProvider::Cloudflare,
        TunnelProvider::Ngrok,
        TunnelProvider::Tailscale,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelProvider::Cloudflare => "cloudflare",
            TunnelProvider::Ngrok => "ngrok",
            TunnelProvider::Tailscale => "tailscale",
        }
    }

    /// Cloudflare needs an account as well as a token; the others only a token.
    pub fn needs_account(&self) -> bool {
        matches!(self, TunnelProvider::Cloudflare)
    }
}

/// Flag and credentials for one tunnel provider.
#[derive(Debug, Clone, Serialize)]
pub struct TunnelConfig {
    pub enabled: bool,
    #[serde(skip_serializing)]
    pub api_token: String,
    #[serde(skip_serializing)]
    pub account_id: String,
    pub config_dir: PathBuf,
}

impl TunnelConfig {
    fn disabled(provider: TunnelProvider) -> Self {
        Self {
            enabled: false,
            api_token: String::new(),
            account_id: String::new(),
            config_dir: home_dir().join(".tunnelforge").join(provider.as_str()),
        }
    }

    /// Whether the credentials needed by `provider` are present.
    pub fn has_credentials(&self, provider: TunnelProvider) -> bool {
        !self.api_token.is_empty() && (!provider.needs_account() || !self.account_id.is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TunnelsConfig {
    pub cloudflare: TunnelConfig,
    pub ngrok: TunnelConfig,
    pub tailscale: TunnelConfig,
}

impl TunnelsConfig {
    pub fn get(&self, provider: TunnelProvider) -> &TunnelConfig {
        match provider {
            TunnelProvider::Cloudflare => &self.cloudflare,
            TunnelProvider::Ngrok => &self.ngrok,
            TunnelProvider::Tailscale => &self.tailscale,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (TunnelProvider, &TunnelConfig)> {
        TunnelProvider::ALL.into_iter().map(move |p| (p, self.get(p)))
    }
}

impl Default for TunnelsConfig {
    fn default() -> Self {
        Self {
            cloudflare: TunnelConfig::disabled(TunnelProvider::Cloudflare),
            ngrok: TunnelConfig::disabled(TunnelProvider::Ngrok),
            tailscale: TunnelConfig::disabled(TunnelProvider::Tailscale),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
