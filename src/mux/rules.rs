//! The immutable rules snapshot.
//!
//! One snapshot bundles the compiled matchers, the filter chains, the route
//! cache, and the tracer produced by one reload cycle. Snapshots are
//! published atomically and never mutated afterwards; in-flight requests keep
//! using the snapshot they captured at dispatch start.

use std::sync::Arc;

use crate::config::MuxConfig;
use crate::context::HttpContext;
use crate::ipfilter::{new_ip_filter, new_ip_filter_chain, IpFilter, IpFilterChain};
use crate::mux::cache::{CacheItem, RouteCache};
use crate::mux::rule::MuxRule;
use crate::trace::Tracer;

pub(crate) struct MuxRules {
    pub config: MuxConfig,

    pub cache: Option<RouteCache>,
    pub tracer: Arc<Tracer>,

    ip_filter: Option<IpFilter>,
    pub ip_filter_chain: Option<Arc<IpFilterChain>>,

    pub rules: Vec<MuxRule>,
}

impl MuxRules {
    pub fn new(config: MuxConfig, tracer: Arc<Tracer>) -> Self {
        let ip_filter = new_ip_filter(config.ip_filter.as_ref());
        let ip_filter_chain = new_ip_filter_chain(None, config.ip_filter.as_ref());

        let rules = config
            .rules
            .iter()
            // Rules are compiled against the root chain, not their own.
            .map(|rule| MuxRule::new(ip_filter_chain.as_ref(), rule))
            .collect();

        let cache = if config.cache_size > 0 {
            Some(RouteCache::new(config.cache_size))
        } else {
            None
        };

        MuxRules {
            config,
            cache,
            tracer,
            ip_filter,
            ip_filter_chain,
            rules,
        }
    }

    /// The initial snapshot a mux serves before its first reload.
    pub fn empty() -> Self {
        MuxRules::new(MuxConfig::default(), Arc::new(Tracer::noop()))
    }

    /// The root filter; absent means allow.
    pub fn pass(&self, ctx: &HttpContext) -> bool {
        match &self.ip_filter {
            Some(filter) => filter.allow(ctx.real_ip()),
            None => true,
        }
    }

    fn fingerprint(ctx: &HttpContext) -> String {
        format!("{}|{}|{}", ctx.host(), ctx.method(), ctx.path())
    }

    pub fn get_cache_item(&self, ctx: &HttpContext) -> Option<Arc<CacheItem>> {
        let cache = self.cache.as_ref()?;
        cache.get(&Self::fingerprint(ctx))
    }

    /// Record a decision for this request's fingerprint. Header-matched
    /// decisions are dropped here, at the write site: the fingerprint does
    /// not cover headers, so caching them would poison later lookups.
    pub fn put_cache_item(&self, ctx: &HttpContext, item: &Arc<CacheItem>) {
        let cache = match &self.cache {
            Some(cache) => cache,
            None => return,
        };
        if !item.cacheable() {
            return;
        }

        // Concurrent requests may race on the same fingerprint; overwriting
        // an existing entry is fine.
        cache.put(Self::fingerprint(ctx), Arc::clone(item));
    }
}
