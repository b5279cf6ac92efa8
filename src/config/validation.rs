//! Configuration validation.
//!
//! Semantic checks that never stop startup. The loader already guarantees
//! every field holds a well-typed value; this pass reports values that are
//! well-typed but probably not what the operator meant.

use crate::config::schema::{GatewayConfig, DEFAULT_CSRF_SECRET};
use crate::security::ip_allow::IpAllowList;

/// A semantic configuration problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// An `ALLOWED_IPS` entry is neither a CIDR nor an address.
    InvalidAllowListEntry(String),
    /// IP allow-listing is on but nothing parsed; every request is rejected.
    EmptyAllowList,
    /// CSRF is on with the shipped secret.
    DefaultCsrfSecret,
    /// Rate limiting is on with a limit of zero; every request is rejected.
    ZeroRateLimit,
    /// A tunnel provider is enabled without the credentials it needs.
    TunnelMissingCredentials(&'static str),
    /// Local bypass is allowed while binding beyond loopback.
    BypassOnPublicBind(String),
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::InvalidAllowListEntry(entry) => {
                write!(f, "ignoring invalid ALLOWED_IPS entry {:?}", entry)
            }
            ConfigWarning::EmptyAllowList => {
                write!(f, "IP allow-list is enabled but empty; all requests will be rejected")
            }
            ConfigWarning::DefaultCsrfSecret => {
                write!(f, "CSRF protection uses the default secret; set CSRF_SECRET")
            }
            ConfigWarning::ZeroRateLimit => {
                write!(f, "RATE_LIMIT_PER_MIN is 0; all requests will be rejected")
            }
            ConfigWarning::TunnelMissingCredentials(provider) => {
                write!(f, "{} tunnels are enabled but credentials are missing", provider)
            }
            ConfigWarning::BypassOnPublicBind(host) => write!(
                f,
                "local bypass is allowed while listening on {}; only loopback peers can use it",
                host
            ),
        }
    }
}

/// Validate a loaded snapshot. Pure: `&GatewayConfig -> Vec<ConfigWarning>`.
pub fn validate(config: &GatewayConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();
    let sec = &config.security;

    let (list, rejected) = IpAllowList::parse(&sec.allowed_ips);
    warnings.extend(rejected.into_iter().map(ConfigWarning::InvalidAllowListEntry));
    if sec.ip_allowlist_enabled && list.is_empty() {
        warnings.push(ConfigWarning::EmptyAllowList);
    }

    if sec.csrf_enabled && sec.csrf_secret == DEFAULT_CSRF_SECRET {
        warnings.push(ConfigWarning::DefaultCsrfSecret);
    }

    if sec.rate_limit_enabled && sec.rate_limit_per_min == 0 {
        warnings.push(ConfigWarning::ZeroRateLimit);
    }

    for (provider, tunnel) in config.tunnels.iter() {
        if tunnel.enabled && !tunnel.has_credentials(provider) {
            warnings.push(ConfigWarning::TunnelMissingCredentials(provider.as_str()));
        }
    }

    let host = config.network.host.as_str();
    let loopback_bind = matches!(host, "localhost" | "127.0.0.1" | "::1");
    if config.auth.allow_local_bypass && !loopback_bind {
        warnings.push(ConfigWarning::BypassOnPublicBind(host.to_string()));
    }

    warnings
}
