//! URL/Host Guard (C2) — validates outbound URLs against the configured
//! allow/deny policy before the Workflow Executor's HTTP fetch handler
//! makes any network call.

use std::net::IpAddr;
use std::str::FromStr;

use ipnetwork::IpNetwork;
use thiserror::Error;
use url::Url;

use crate::config::SecurityPolicy;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("malformed url: {0}")]
    MalformedUrl(String),

    #[error("scheme '{0}' is not allowed")]
    SchemeDenied(String),

    #[error("host {0} is explicitly denied")]
    HostDenied(String),

    #[error("host {0} is not in the allowed host list")]
    HostNotAllowed(String),

    #[error("port {0} is not permitted")]
    PortDenied(u16),

    #[error("address {0} falls within a denied network")]
    NetworkDenied(String),

    #[error("response exceeded the maximum allowed size of {0} bytes")]
    ResponseTooLarge(u64),
}

/// Validates URLs against a [`SecurityPolicy`].
pub struct UrlGuard<'a> {
    policy: &'a SecurityPolicy,
}

impl<'a> UrlGuard<'a> {
    pub fn new(policy: &'a SecurityPolicy) -> Self {
        Self { policy }
    }

    /// Run every check in order; the first violation wins.
    pub fn validate(&self, raw_url: &str) -> Result<Url, SecurityError> {
        let url = Url::parse(raw_url).map_err(|e| SecurityError::MalformedUrl(e.to_string()))?;

        let scheme = url.scheme().to_lowercase();
        if !self
            .policy
            .allowed_schemes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(&scheme))
        {
            return Err(SecurityError::SchemeDenied(scheme));
        }

        let host = url
            .host_str()
            .ok_or_else(|| SecurityError::MalformedUrl("missing host".to_string()))?
            .to_lowercase();

        if host_matches_any(&host, &self.policy.denied_hosts) {
            return Err(SecurityError::HostDenied(host));
        }

        if !self.policy.allowed_hosts.is_empty() && !host_matches_any(&host, &self.policy.allowed_hosts) {
            return Err(SecurityError::HostNotAllowed(host));
        }

        let port = url.port_or_known_default().unwrap_or(match scheme.as_str() {
            "https" => 443,
            _ => 80,
        });

        if self.policy.denied_ports.contains(&port) {
            return Err(SecurityError::PortDenied(port));
        }
        if !self.policy.allowed_ports.is_empty() && !self.policy.allowed_ports.contains(&port) {
            return Err(SecurityError::PortDenied(port));
        }

        if let Ok(ip) = IpAddr::from_str(&host) {
            for cidr in &self.policy.denied_networks {
                if let Ok(net) = IpNetwork::from_str(cidr) {
                    if net.contains(ip) {
                        return Err(SecurityError::NetworkDenied(host));
                    }
                }
            }
        }

        Ok(url)
    }
}

/// Match a host against a pattern list supporting exact, `*.suffix`, and
/// `prefix.*` wildcards.
fn host_matches_any(host: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| host_matches(host, pattern))
}

fn host_matches(host: &str, pattern: &str) -> bool {
    let pattern = pattern.to_lowercase();
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return host == suffix || host.ends_with(&format!(".{suffix}"));
    }
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return host == prefix || host.starts_with(&format!("{prefix}."));
    }
    host == pattern
}
