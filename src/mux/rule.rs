//! Compiled host rule: a host matcher and its ordered path specs.

use std::sync::Arc;

use regex::Regex;
use tracing::error;

use crate::config::RuleConfig;
use crate::context::HttpContext;
use crate::ipfilter::{new_ip_filter, new_ip_filter_chain, IpFilter, IpFilterChain};
use crate::mux::path::MuxPath;

pub(crate) struct MuxRule {
    ip_filter: Option<IpFilter>,
    #[allow(dead_code)]
    pub(crate) ip_filter_chain: Option<Arc<IpFilterChain>>,

    host: String,
    host_re: Option<Regex>,
    pub(crate) paths: Vec<Arc<MuxPath>>,
}

impl MuxRule {
    pub fn new(parent_chain: Option<&Arc<IpFilterChain>>, config: &RuleConfig) -> Self {
        let host_re = if config.host_regexp.is_empty() {
            None
        } else {
            match Regex::new(&config.host_regexp) {
                Ok(re) => Some(re),
                Err(e) => {
                    error!("BUG: compile {} failed: {}", config.host_regexp, e);
                    None
                }
            }
        };

        // Paths inherit this rule's chain, which already contains the root's.
        let rule_chain = new_ip_filter_chain(parent_chain, config.ip_filter.as_ref());
        let paths = config
            .paths
            .iter()
            .map(|p| Arc::new(MuxPath::new(rule_chain.as_ref(), p)))
            .collect();

        MuxRule {
            ip_filter: new_ip_filter(config.ip_filter.as_ref()),
            ip_filter_chain: rule_chain,
            host: config.host.clone(),
            host_re,
            paths,
        }
    }

    /// Host match: both matchers empty means match-any.
    pub fn matches(&self, ctx: &HttpContext) -> bool {
        if self.host.is_empty() && self.host_re.is_none() {
            return true;
        }

        if !self.host.is_empty() && self.host == ctx.host() {
            return true;
        }
        if let Some(re) = &self.host_re {
            if re.is_match(ctx.host()) {
                return true;
            }
        }

        false
    }

    /// The rule's own filter; absent means allow.
    pub fn pass(&self, ctx: &HttpContext) -> bool {
        match &self.ip_filter {
            Some(filter) => filter.allow(ctx.real_ip()),
            None => true,
        }
    }
}
