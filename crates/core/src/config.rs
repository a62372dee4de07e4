//! Configuration types shared across crates.

use crate::rule::{EncryptRule, RuleSet};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:5344").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable request tracing spans.
    #[serde(default)]
    pub enable_tracing: bool,
}

fn default_bind() -> String {
    "127.0.0.1:5344".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            enable_tracing: false,
        }
    }
}

/// Upstream (Alist) backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Backend origin, scheme + host + optional port (e.g. "http://alist:5244").
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Timeout in seconds for size-probe HEAD requests.
    #[serde(default = "default_head_timeout_secs")]
    pub head_timeout_secs: u64,
}

fn default_origin() -> String {
    "http://127.0.0.1:5244".to_string()
}

fn default_head_timeout_secs() -> u64 {
    10
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            head_timeout_secs: default_head_timeout_secs(),
        }
    }
}

impl UpstreamConfig {
    /// Backend origin without a trailing slash.
    pub fn origin_trimmed(&self) -> &str {
        self.origin.trim_end_matches('/')
    }

    /// Validate upstream configuration invariants.
    pub fn validate(&self) -> Result<()> {
        if !self.origin.starts_with("http://") && !self.origin.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "upstream.origin must be an http(s) URL, got `{}`",
                self.origin
            )));
        }
        if self.head_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "upstream.head_timeout_secs cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP client tuning for the upstream connection pool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Maximum idle connections kept per upstream host.
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
    /// Idle connection timeout in seconds.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Skip TLS certificate verification (self-hosted backends only).
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_pool_max_idle_per_host() -> usize {
    100
}

fn default_idle_timeout_secs() -> u64 {
    90
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            idle_timeout_secs: default_idle_timeout_secs(),
            accept_invalid_certs: false,
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream backend configuration.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Upstream HTTP client tuning.
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Ordered encryption rules; first match wins.
    #[serde(default)]
    pub rules: Vec<EncryptRule>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            proxy: ProxyConfig::default(),
            rules: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Validate the configuration and compile the rule list.
    pub fn compile_rules(&self) -> Result<RuleSet> {
        self.upstream.validate()?;
        RuleSet::compile(&self.rules)
    }

    /// Create a test configuration pointed at the given upstream origin.
    ///
    /// **For testing only.**
    pub fn for_testing(origin: &str) -> Self {
        Self {
            upstream: UpstreamConfig {
                origin: origin.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize_from_empty_document() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:5344");
        assert_eq!(config.upstream.head_timeout_secs, 10);
        assert!(config.rules.is_empty());
    }

    #[test]
    fn origin_trimming() {
        let mut config = AppConfig::default();
        config.upstream.origin = "http://alist:5244/".to_string();
        assert_eq!(config.upstream.origin_trimmed(), "http://alist:5244");
    }

    #[test]
    fn validate_rejects_non_http_origin() {
        let mut config = AppConfig::default();
        config.upstream.origin = "ftp://alist".to_string();
        assert!(config.compile_rules().is_err());
    }
}
