//! Configuration structures and file loading.
//!
//! The routing ruleset is declarative: an ordered list of host rules, each
//! with an ordered list of path specs. Regexes and CIDR entries are validated
//! at load time so a bad file is rejected before it replaces a good ruleset;
//! the mux itself stays defensive about patterns it cannot compile.

pub mod manager;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GantryError, GantryResult};

pub use manager::ConfigManager;

// Re-export external types that are part of the config API
pub use crate::ipfilter::IpFilterConfig;
pub use crate::redirector::RedirectorConfig;
pub use crate::trace::TracingConfig;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    /// The routing ruleset served by the mux.
    #[serde(default)]
    pub router: MuxConfig,
    /// Redirector backends, registered in the handler registry by name.
    #[serde(default)]
    pub redirectors: HashMap<String, RedirectorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: "0.0.0.0:8080".parse().expect("valid default bind address"),
        }
    }
}

/// The mux ruleset: top-level policy plus the ordered host rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MuxConfig {
    pub ip_filter: Option<IpFilterConfig>,
    /// Route cache capacity; zero disables the cache.
    #[serde(default)]
    pub cache_size: u32,
    pub tracing: Option<TracingConfig>,
    /// Append the client IP to `X-Forwarded-For` before backend calls.
    #[serde(default)]
    pub x_forwarded_for: bool,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// One host rule: a host matcher plus its ordered path specs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub ip_filter: Option<IpFilterConfig>,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub host_regexp: String,
    #[serde(default)]
    pub paths: Vec<PathConfig>,
}

/// One path spec. At most one of `path`, `path_prefix`, `path_regexp` may be
/// set; all empty means match-any.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathConfig {
    pub ip_filter: Option<IpFilterConfig>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub path_prefix: String,
    #[serde(default)]
    pub path_regexp: String,
    /// Allowed methods; empty matches any method.
    #[serde(default)]
    pub methods: Vec<String>,
    pub backend: String,
    /// Replacement template applied to the path when `path_regexp` matched.
    #[serde(default)]
    pub rewrite_target: String,
    #[serde(default)]
    pub headers: Vec<HeaderRuleConfig>,
}

/// A header gate on a path: the first value of `key` must be in `values` or
/// match `regexp`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderRuleConfig {
    pub key: String,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub regexp: String,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> GantryResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;

        info!("Configuration loaded from {:?}", path.as_ref());
        Ok(config)
    }

    pub fn validate(&self) -> GantryResult<()> {
        self.router.validate()?;

        for (name, redirector) in &self.redirectors {
            Regex::new(&redirector.pattern).map_err(|e| {
                GantryError::config(format!(
                    "Invalid match regex in redirector '{}': {}",
                    name, e
                ))
            })?;
        }

        Ok(())
    }
}

impl MuxConfig {
    pub fn validate(&self) -> GantryResult<()> {
        if let Some(filter) = &self.ip_filter {
            validate_ip_filter(filter, "router")?;
        }

        for (i, rule) in self.rules.iter().enumerate() {
            rule.validate()
                .map_err(|e| GantryError::config(format!("rule {}: {}", i, e)))?;
        }

        Ok(())
    }
}

impl RuleConfig {
    fn validate(&self) -> GantryResult<()> {
        if !self.host_regexp.is_empty() {
            Regex::new(&self.host_regexp)
                .map_err(|e| GantryError::config(format!("invalid host regex: {}", e)))?;
        }

        if let Some(filter) = &self.ip_filter {
            validate_ip_filter(filter, "rule")?;
        }

        for (j, path) in self.paths.iter().enumerate() {
            path.validate()
                .map_err(|e| GantryError::config(format!("path {}: {}", j, e)))?;
        }

        Ok(())
    }
}

impl PathConfig {
    fn validate(&self) -> GantryResult<()> {
        let matchers_set = [&self.path, &self.path_prefix, &self.path_regexp]
            .iter()
            .filter(|m| !m.is_empty())
            .count();
        if matchers_set > 1 {
            return Err(GantryError::config(
                "at most one of path, path_prefix, path_regexp may be set",
            ));
        }

        if self.backend.is_empty() {
            return Err(GantryError::config("backend must not be empty"));
        }

        if !self.path_regexp.is_empty() {
            Regex::new(&self.path_regexp)
                .map_err(|e| GantryError::config(format!("invalid path regex: {}", e)))?;
        }

        for header in &self.headers {
            if header.key.is_empty() {
                return Err(GantryError::config("header rule key must not be empty"));
            }
            if !header.regexp.is_empty() {
                Regex::new(&header.regexp)
                    .map_err(|e| GantryError::config(format!("invalid header regex: {}", e)))?;
            }
        }

        if let Some(filter) = &self.ip_filter {
            validate_ip_filter(filter, "path")?;
        }

        Ok(())
    }
}

fn validate_ip_filter(filter: &IpFilterConfig, scope: &str) -> GantryResult<()> {
    for entry in filter.allow_ips.iter().chain(filter.block_ips.iter()) {
        let valid = entry.parse::<std::net::IpAddr>().is_ok()
            || entry.parse::<ipnet::IpNet>().is_ok();
        if !valid {
            return Err(GantryError::config(format!(
                "{} ip filter: '{}' is not an ip or cidr",
                scope, entry
            )));
        }
    }
    Ok(())
}
