//! Security policy evaluation.
//!
//! # Responsibilities
//! - Decide, per request, whether it may proceed
//! - Apply the checks in a fixed order and stop at the first rejection
//! - Recognise local bypass callers
//!
//! # Design Decisions
//! - Only the socket peer address is trusted; forwarding headers are ignored
//! - Evaluation is synchronous and allocation-free on the allow path
//! - Disabled checks are simply absent from the engine

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, Method};

use crate::config::GatewayConfig;
use crate::security::csrf::{self, CsrfTokens};
use crate::security::ip_allow::{canonical_ip, IpAllowList};
use crate::security::rate_limit::{RateLimitOutcome, RateLimiter};

/// Header a loopback caller sets to skip authentication.
pub const LOCAL_BYPASS_HEADER: HeaderName = HeaderName::from_static("x-tunnelforge-local");

/// Outcome of evaluating the security policies for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    RejectByIp,
    RejectByRateLimit { retry_after: Duration },
    RejectByCsrf,
    BypassAuth,
}

impl PolicyDecision {
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PolicyDecision::RejectByIp
                | PolicyDecision::RejectByRateLimit { .. }
                | PolicyDecision::RejectByCsrf
        )
    }

    /// Label used in logs, metrics and rejection bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyDecision::Allow => "allow",
            PolicyDecision::RejectByIp => "ip_allowlist",
            PolicyDecision::RejectByRateLimit { .. } => "rate_limit",
            PolicyDecision::RejectByCsrf => "csrf",
            PolicyDecision::BypassAuth => "local_bypass",
        }
    }
}

/// The parts of a request the policies look at.
#[derive(Debug, Clone, Copy)]
pub struct RequestMeta<'a> {
    pub peer: IpAddr,
    pub method: &'a Method,
    pub headers: &'a HeaderMap,
}

/// Identity attached to requests admitted through the local bypass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPrincipal {
    pub user_id: &'static str,
    pub username: &'static str,
    pub role: &'static str,
}

impl Default for LocalPrincipal {
    fn default() -> Self {
        Self {
            user_id: "local-user",
            username: "system",
            role: "admin",
        }
    }
}

/// Ordered set of request policies built from the configuration snapshot.
#[derive(Debug)]
pub struct PolicyEngine {
    allow_list: Option<IpAllowList>,
    limiter: Option<Arc<RateLimiter>>,
    csrf: Option<CsrfTokens>,
    allow_local_bypass: bool,
}

impl PolicyEngine {
    pub fn new(config: &GatewayConfig) -> Self {
        let sec = &config.security;

        let allow_list = sec
            .ip_allowlist_enabled
            .then(|| IpAllowList::parse(&sec.allowed_ips).0);
        let limiter = sec.rate_limit_enabled.then(|| {
            Arc::new(RateLimiter::per_minute(
                sec.rate_limit_per_min,
                sec.rate_limit_max_clients,
            ))
        });
        let csrf = sec.csrf_enabled.then(|| CsrfTokens::new(&sec.csrf_secret));

        Self {
            allow_list,
            limiter,
            csrf,
            allow_local_bypass: config.auth.allow_local_bypass,
        }
    }

    /// Evaluate IP allow-list, rate limit, CSRF and local bypass, in that order.
    pub fn evaluate(&self, meta: &RequestMeta<'_>) -> PolicyDecision {
        let peer = canonical_ip(meta.peer);

        if let Some(allow_list) = &self.allow_list {
            if !allow_list.contains(peer) {
                return PolicyDecision::RejectByIp;
            }
        }

        if let Some(limiter) = &self.limiter {
            if let RateLimitOutcome::Limited { retry_after } = limiter.check(peer) {
                return PolicyDecision::RejectByRateLimit { retry_after };
            }
        }

        if let Some(tokens) = &self.csrf {
            if csrf::requires_token(meta.method) && !tokens.verify_headers(meta.headers) {
                return PolicyDecision::RejectByCsrf;
            }
        }

        if self.allow_local_bypass && peer.is_loopback() && has_bypass_header(meta.headers) {
            return PolicyDecision::BypassAuth;
        }

        PolicyDecision::Allow
    }

    /// Rate limiter, when rate limiting is enabled.
    pub fn limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }

    /// Token signer, when CSRF protection is enabled.
    pub fn csrf(&self) -> Option<&CsrfTokens> {
        self.csrf.as_ref()
    }
}

fn has_bypass_header(headers: &HeaderMap) -> bool {
    headers
        .get(&LOCAL_BYPASS_HEADER)
        .map(|v| !v.as_bytes().is_empty())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn engine(f: impl FnOnce(&mut GatewayConfig)) -> PolicyEngine {
        let mut config = GatewayConfig::default();
        f(&mut config);
        PolicyEngine::new(&config)
    }

    fn eval(engine: &PolicyEngine, peer: &str, method: Method, headers: &HeaderMap) -> PolicyDecision {
        engine.evaluate(&RequestMeta {
            peer: peer.parse().unwrap(),
            method: &method,
            headers,
        })
    }

    fn bypass_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(LOCAL_BYPASS_HEADER, HeaderValue::from_static("1"));
        headers
    }

    #[test]
    fn test_engine_debug_includes_enabled_policies() {
        let engine = engine(|c| c.security.csrf_enabled = true);
        let rendered = format!("{engine:?}");
        assert!(rendered.contains("RateLimiter"), "{rendered}");
        assert!(rendered.contains("CsrfTokens"), "{rendered}");
    }

    #[test]
    fn test_defaults_allow() {
        let engine = engine(|_| {});
        assert_eq!(eval(&engine, "203.0.113.5", Method::GET, &HeaderMap::new()), PolicyDecision::Allow);
    }

    #[test]
    fn test_ip_allowlist_rejects_outsiders() {
        let engine = engine(|c| c.security.ip_allowlist_enabled = true);
        let headers = HeaderMap::new();
        assert_eq!(eval(&engine, "203.0.113.5", Method::GET, &headers), PolicyDecision::RejectByIp);
        assert_eq!(eval(&engine, "127.0.0.1", Method::GET, &headers), PolicyDecision::Allow);
        assert_eq!(eval(&engine, "::1", Method::GET, &headers), PolicyDecision::Allow);
    }

    #[test]
    fn test_ip_check_runs_before_rate_limit() {
        let engine = engine(|c| {
            c.security.ip_allowlist_enabled = true;
            c.security.rate_limit_per_min = 1;
        });
        let headers = HeaderMap::new();
        for _ in 0..3 {
            assert_eq!(eval(&engine, "203.0.113.5", Method::GET, &headers), PolicyDecision::RejectByIp);
        }
        // Rejected requests never consumed the outsider's budget.
        assert_eq!(engine.limiter().unwrap().tracked_clients(), 0);
    }

    #[test]
    fn test_rate_limit_rejects_after_budget() {
        let engine = engine(|c| c.security.rate_limit_per_min = 2);
        let headers = HeaderMap::new();
        assert!(!eval(&engine, "10.0.0.1", Method::GET, &headers).is_rejection());
        assert!(!eval(&engine, "10.0.0.1", Method::GET, &headers).is_rejection());
        assert!(matches!(
            eval(&engine, "10.0.0.1", Method::GET, &headers),
            PolicyDecision::RejectByRateLimit { .. }
        ));
    }

    #[test]
    fn test_csrf_only_guards_unsafe_methods() {
        let engine = engine(|c| c.security.csrf_enabled = true);
        let mut headers = HeaderMap::new();
        assert_eq!(eval(&engine, "10.0.0.1", Method::GET, &headers), PolicyDecision::Allow);
        assert_eq!(eval(&engine, "10.0.0.1", Method::POST, &headers), PolicyDecision::RejectByCsrf);

        let token = engine.csrf().unwrap().issue();
        headers.insert(csrf::CSRF_HEADER, HeaderValue::from_str(&token).unwrap());
        assert_eq!(eval(&engine, "10.0.0.1", Method::POST, &headers), PolicyDecision::Allow);
    }

    #[test]
    fn test_bypass_requires_loopback_socket_peer() {
        let engine = engine(|c| c.auth.required = true);
        let mut headers = bypass_headers();
        assert_eq!(eval(&engine, "127.0.0.1", Method::GET, &headers), PolicyDecision::BypassAuth);
        assert_eq!(eval(&engine, "::ffff:127.0.0.1", Method::GET, &headers), PolicyDecision::BypassAuth);
        assert_eq!(eval(&engine, "192.168.1.20", Method::GET, &headers), PolicyDecision::Allow);

        headers.insert("x-forwarded-for", HeaderValue::from_static("127.0.0.1"));
        assert_eq!(eval(&engine, "192.168.1.20", Method::GET, &headers), PolicyDecision::Allow);
    }

    #[test]
    fn test_bypass_disabled_or_empty_header() {
        let disabled = engine(|c| c.auth.allow_local_bypass = false);
        assert_eq!(eval(&disabled, "127.0.0.1", Method::GET, &bypass_headers()), PolicyDecision::Allow);

        let enabled = engine(|_| {});
        let mut empty = HeaderMap::new();
        empty.insert(LOCAL_BYPASS_HEADER, HeaderValue::from_static(""));
        assert_eq!(eval(&enabled, "127.0.0.1", Method::GET, &empty), PolicyDecision::Allow);
    }

    #[test]
    fn test_csrf_still_applies_to_bypass_callers() {
        let engine = engine(|c| c.security.csrf_enabled = true);
        assert_eq!(
            eval(&engine, "127.0.0.1", Method::POST, &bypass_headers()),
            PolicyDecision::RejectByCsrf
        );
    }
}
