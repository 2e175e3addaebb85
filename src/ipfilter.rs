//! CIDR-based allow/block filtering for client IPs.
//!
//! A filter holds two range lists built from its configuration. Filters are
//! composed into chains that mirror the configuration hierarchy: a request is
//! allowed by a chain only when every filter in it allows the request.

use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tracing::error;

/// IP filter configuration.
///
/// Entries in `allow_ips` and `block_ips` may be CIDR blocks or bare IPs;
/// bare IPs are treated as /32 (or /128 for IPv6) networks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpFilterConfig {
    #[serde(default)]
    pub block_by_default: bool,

    #[serde(default)]
    pub allow_ips: Vec<String>,
    #[serde(default)]
    pub block_ips: Vec<String>,
}

/// A single allow/block ruleset over CIDR ranges.
#[derive(Debug)]
pub struct IpFilter {
    block_by_default: bool,

    allow: Vec<IpNet>,
    block: Vec<IpNet>,
}

impl IpFilter {
    pub fn new(config: &IpFilterConfig) -> Self {
        IpFilter {
            block_by_default: config.block_by_default,
            allow: nets_from_entries(&config.allow_ips),
            block: nets_from_entries(&config.block_ips),
        }
    }

    /// Whether the filter allows the incoming IP.
    ///
    /// An IP matching both the allow and block ranges is ambiguous and falls
    /// back to the default policy, same as an unparseable input.
    pub fn allow(&self, ipstr: &str) -> bool {
        let default_result = !self.block_by_default;

        let ip: IpAddr = match ipstr.parse() {
            Ok(ip) => ip,
            Err(_) => return default_result,
        };

        let allowed = self.allow.iter().any(|net| net.contains(&ip));
        let blocked = self.block.iter().any(|net| net.contains(&ip));

        match (allowed, blocked) {
            (true, true) => default_result,
            (true, false) => true,
            (false, true) => false,
            (false, false) => default_result,
        }
    }
}

/// Parse a list of `ip` or `cidr` strings into networks.
///
/// Invalid entries are logged and skipped; the rest of the list still loads.
fn nets_from_entries(entries: &[String]) -> Vec<IpNet> {
    let mut nets = Vec::with_capacity(entries.len());

    for entry in entries {
        if let Ok(ip) = entry.parse::<IpAddr>() {
            // Bare IP: promote to a host network. IPv6 is detected the same
            // way the wire format is ambiguous about it: two or more colons.
            let prefix_len = if entry.matches(':').count() >= 2 {
                128
            } else {
                32
            };
            match IpNet::new(ip, prefix_len) {
                Ok(net) => nets.push(net),
                Err(e) => error!("BUG: {} is an invalid ip: {}", entry, e),
            }
            continue;
        }

        match entry.parse::<IpNet>() {
            Ok(net) => nets.push(net),
            Err(_) => error!("BUG: {} is an invalid ip or cidr", entry),
        }
    }

    nets
}

/// A conjunction of IP filters inherited down the configuration tree.
///
/// A chain with zero filters is never constructed; builders return `None`
/// instead, and callers treat an absent chain as allow-all.
#[derive(Debug, Clone)]
pub struct IpFilterChain {
    filters: Vec<Arc<IpFilter>>,
}

impl IpFilterChain {
    pub fn filters(&self) -> &[Arc<IpFilter>] {
        &self.filters
    }

    /// Whether every filter in the chain allows the incoming IP.
    pub fn allow(&self, ipstr: &str) -> bool {
        self.filters.iter().all(|filter| filter.allow(ipstr))
    }
}

/// Extend a parent chain with a child's own filter.
///
/// Returns `None` when the resulting chain would hold zero filters.
pub fn new_ip_filter_chain(
    parent: Option<&Arc<IpFilterChain>>,
    child: Option<&IpFilterConfig>,
) -> Option<Arc<IpFilterChain>> {
    let mut filters = match parent {
        Some(chain) => chain.filters.clone(),
        None => Vec::new(),
    };

    if let Some(config) = child {
        filters.push(Arc::new(IpFilter::new(config)));
    }

    if filters.is_empty() {
        return None;
    }

    Some(Arc::new(IpFilterChain { filters }))
}

pub fn new_ip_filter(config: Option<&IpFilterConfig>) -> Option<IpFilter> {
    config.map(IpFilter::new)
}
