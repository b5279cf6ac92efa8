//! Configuration loading from the process environment.
//!
//! Every field is resolved independently: a missing or empty variable keeps
//! the default, an unparsable one keeps the default and is reported as a
//! [`ParseIssue`]. Loading never fails.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::config::schema::{
    GatewayConfig, LogFormat, TunnelConfig, TunnelProvider,
};

/// Upper bound for every duration setting.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// A variable that was set but could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    pub key: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl std::fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}={:?} is not a valid {}, using default",
            self.key, self.value, self.expected
        )
    }
}

impl GatewayConfig {
    /// Build the snapshot from the live process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the snapshot from an arbitrary variable lookup. Parse issues
    /// are logged and replaced by defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let (config, issues) = load_with(lookup);
        log_issues(&issues);
        config
    }
}

/// Log each parse issue at `warn`.
pub fn log_issues(issues: &[ParseIssue]) {
    for issue in issues {
        tracing::warn!(
            key = issue.key,
            value = %issue.value,
            expected = issue.expected,
            "Invalid configuration value, using default"
        );
    }
}

/// Load from the process environment, returning the parse issues alongside.
pub fn load_from_env() -> (GatewayConfig, Vec<ParseIssue>) {
    load_with(|key| std::env::var(key).ok())
}

/// Load from a fixed map. Handy in tests and for `.env`-style sources.
pub fn load_from_map(vars: &HashMap<String, String>) -> (GatewayConfig, Vec<ParseIssue>) {
    load_with(|key| vars.get(key).cloned())
}

/// Core loader: a pure function of the lookup.
pub fn load_with<F>(lookup: F) -> (GatewayConfig, Vec<ParseIssue>)
where
    F: Fn(&str) -> Option<String>,
{
    let mut env = EnvSource::new(lookup);
    let mut cfg = GatewayConfig::default();

    let home = env
        .raw("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let tf_home = home.join(".tunnelforge");

    // network
    let net = &mut cfg.network;
    net.host = env.string("HOST", &net.host);
    net.port = env.parsed("PORT", net.port, "port number", |s| s.parse().ok());
    net.allowed_origins = env.list("ALLOWED_ORIGINS", &net.allowed_origins);
    net.backend_url = env.parsed("BACKEND_URL", net.backend_url.clone(), "http origin", parse_origin);
    net.upstream_timeout = env.duration("UPSTREAM_TIMEOUT", net.upstream_timeout);
    net.request_timeout = env.duration("REQUEST_TIMEOUT", net.request_timeout);
    net.shutdown_grace = env.duration("SHUTDOWN_GRACE", net.shutdown_grace);
    net.max_body_bytes = env.parsed("MAX_BODY_BYTES", net.max_body_bytes, "byte count", |s| {
        s.parse().ok().filter(|n: &usize| *n > 0)
    });
    net.server_name = env.string("SERVER_NAME", &net.server_name);

    // sessions
    cfg.sessions.max_sessions = env.parsed("MAX_SESSIONS", cfg.sessions.max_sessions, "integer", |s| s.parse().ok());
    cfg.sessions.timeout_minutes =
        env.parsed("SESSION_TIMEOUT", cfg.sessions.timeout_minutes, "integer", |s| s.parse().ok());

    // auth
    cfg.auth.enabled = env.bool("ENABLE_AUTH", cfg.auth.enabled);
    cfg.auth.required = env.bool("AUTH_REQUIRED", cfg.auth.required);
    cfg.auth.allow_local_bypass = env.bool("ALLOW_LOCAL_BYPASS", cfg.auth.allow_local_bypass);

    // filesystem roots
    let paths = &mut cfg.paths;
    paths.static_dir = env.path("STATIC_DIR", paths.static_dir.clone());
    paths.require_static = env.bool("REQUIRE_STATIC", paths.require_static);
    paths.filesystem_base = env.path("FILESYSTEM_BASE_PATH", home.clone());
    paths.git_base = env.path("GIT_BASE_PATH", home.clone());
    paths.vapid_key_path = env.path("VAPID_KEY_PATH", tf_home.join("keys"));

    // persistence
    cfg.persistence.enabled = env.bool("ENABLE_PERSISTENCE", cfg.persistence.enabled);
    cfg.persistence.dir = env.path("PERSISTENCE_DIR", tf_home.join("sessions"));
    cfg.persistence.interval = env.duration("PERSISTENCE_INTERVAL", cfg.persistence.interval);

    // security middleware
    let sec = &mut cfg.security;
    sec.rate_limit_enabled = env.bool("ENABLE_RATE_LIMIT", sec.rate_limit_enabled);
    sec.rate_limit_per_min = env.parsed("RATE_LIMIT_PER_MIN", sec.rate_limit_per_min, "integer", |s| s.parse().ok());
    sec.rate_limit_max_clients = env.parsed("RATE_LIMIT_MAX_CLIENTS", sec.rate_limit_max_clients, "integer", |s| {
        s.parse().ok().filter(|n: &usize| *n > 0)
    });
    sec.csrf_enabled = env.bool("ENABLE_CSRF", sec.csrf_enabled);
    sec.csrf_secret = env.string("CSRF_SECRET", &sec.csrf_secret);
    sec.ip_allowlist_enabled = env.bool("ENABLE_IP_WHITELIST", sec.ip_allowlist_enabled);
    sec.allowed_ips = env.list("ALLOWED_IPS", &sec.allowed_ips);
    sec.request_log_enabled = env.bool("ENABLE_REQUEST_LOG", sec.request_log_enabled);

    // tunnels
    cfg.tunnels.cloudflare = env.tunnel(
        TunnelProvider::Cloudflare,
        TunnelKeys {
            enabled: "ENABLE_CLOUDFLARE_TUNNELS",
            token: "CLOUDFLARE_API_TOKEN",
            account: "CLOUDFLARE_ACCOUNT_ID",
            config_dir: "CLOUDFLARE_CONFIG_DIR",
        },
        &tf_home,
    );
    cfg.tunnels.ngrok = env.tunnel(
        TunnelProvider::Ngrok,
        TunnelKeys {
            enabled: "ENABLE_NGROK_TUNNELS",
            token: "NGROK_AUTHTOKEN",
            account: "NGROK_ACCOUNT_ID",
            config_dir: "NGROK_CONFIG_DIR",
        },
        &tf_home,
    );
    cfg.tunnels.tailscale = env.tunnel(
        TunnelProvider::Tailscale,
        TunnelKeys {
            enabled: "ENABLE_TAILSCALE_TUNNELS",
            token: "TAILSCALE_AUTH_KEY",
            account: "TAILSCALE_TAILNET",
            config_dir: "TAILSCALE_CONFIG_DIR",
        },
        &tf_home,
    );

    // observability
    let obs = &mut cfg.observability;
    obs.log_format = env.parsed("LOG_FORMAT", obs.log_format, "log format (pretty|json)", |s| {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    });
    obs.metrics_enabled = env.bool("METRICS_ENABLED", obs.metrics_enabled);
    obs.metrics_address = env.parsed("METRICS_ADDRESS", obs.metrics_address.clone(), "socket address", |s| {
        s.parse::<SocketAddr>().ok().map(|_| s.to_string())
    });

    (cfg, env.issues)
}

struct TunnelKeys {
    enabled: &'static str,
    token: &'static str,
    account: &'static str,
    config_dir: &'static str,
}

/// Typed accessors over a variable lookup, collecting parse issues.
struct EnvSource<F> {
    lookup: F,
    issues: Vec<ParseIssue>,
}

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn new(lookup: F) -> Self {
        Self {
            lookup,
            issues: Vec::new(),
        }
    }

    /// Trimmed, non-empty value. Empty counts as unset.
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn path(&self, key: &str, default: PathBuf) -> PathBuf {
        self.raw(key).map(PathBuf::from).unwrap_or(default)
    }

    fn parsed<T>(
        &mut self,
        key: &'static str,
        default: T,
        expected: &'static str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> T {
        let Some(value) = self.raw(key) else {
            return default;
        };
        match parse(&value) {
            Some(parsed) => parsed,
            None => {
                self.issues.push(ParseIssue {
                    key,
                    value,
                    expected,
                });
                default
            }
        }
    }

    fn bool(&mut self, key: &'static str, default: bool) -> bool {
        self.parsed(key, default, "boolean", parse_bool)
    }

    /// Durations must be strictly positive and at most [`MAX_DURATION`].
    fn duration(&mut self, key: &'static str, default: Duration) -> Duration {
        self.parsed(key, default, "duration between 1ns and 24h", |s| {
            parse_duration(s).filter(|d| !d.is_zero() && *d <= MAX_DURATION)
        })
    }

    fn list(&mut self, key: &'static str, default: &[String]) -> Vec<String> {
        let Some(value) = self.raw(key) else {
            return default.to_vec();
        };
        let items = split_list(&value);
        if items.is_empty() {
            self.issues.push(ParseIssue {
                key,
                value,
                expected: "comma-separated list",
            });
            return default.to_vec();
        }
        items
    }

    fn tunnel(&mut self, provider: TunnelProvider, keys: TunnelKeys, tf_home: &std::path::Path) -> TunnelConfig {
        TunnelConfig {
            enabled: self.bool(keys.enabled, false),
            api_token: self.string(keys.token, ""),
            account_id: self.string(keys.account, ""),
            config_dir: self.path(keys.config_dir, tf_home.join(provider.as_str())),
        }
    }
}

/// Boolean spellings accepted by Go's `strconv.ParseBool`, plus yes/no/on/off.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" | "yes" | "on" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a duration such as `30s`, `500ms`, `1h30m`, `1.5s` or a bare
/// integer number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return None;
        }
        let value: f64 = rest[..num_len].parse().ok()?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total += value * nanos_per_unit;
    }

    if !total.is_finite() || total > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(total as u64))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accept only `http` origins with a host. Trailing slashes are dropped.
fn parse_origin(s: &str) -> Option<String> {
    let url = Url::parse(s).ok()?;
    if url.scheme() != "http" || url.host_str().is_none() {
        return None;
    }
    if url.query().is_some() || url.fragment().is_some() {
        return None;
    }
    Some(url.as_str().trim_end_matches('/').to_string())
}
