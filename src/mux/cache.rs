//! Bounded route cache.
//!
//! Maps a request fingerprint to the routing decision a previous request with
//! the same fingerprint produced. The cache is embedded in a rules snapshot,
//! so swapping snapshots retires it wholesale and no explicit invalidation is
//! needed.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::ipfilter::IpFilterChain;
use crate::mux::path::MuxPath;

/// The decision a route resolution produced.
#[derive(Clone)]
pub(crate) enum RouteDecision {
    /// No host/path matched.
    NotFound,
    /// A path matched but its method list did not.
    MethodNotAllowed,
    /// A path spec was selected.
    Matched(Arc<MuxPath>),
    /// A path was selected through a header rule. Never cached: the cache key
    /// does not include headers.
    HeaderMatched(Arc<MuxPath>),
}

/// A routing decision plus the filter chain of the node that produced it.
///
/// The chain must be re-evaluated on every use because a cached decision
/// forgets the path taken through the rule tree.
pub(crate) struct CacheItem {
    pub chain: Option<Arc<IpFilterChain>>,
    pub decision: RouteDecision,
}

impl CacheItem {
    pub fn new(chain: Option<Arc<IpFilterChain>>, decision: RouteDecision) -> Arc<Self> {
        Arc::new(CacheItem { chain, decision })
    }

    /// Whether the decision may be written to the cache.
    pub fn cacheable(&self) -> bool {
        !matches!(self.decision, RouteDecision::HeaderMatched(_))
    }
}

/// Fixed-capacity fingerprint → decision map, safe under concurrent readers
/// and writers. Concurrent insertion of the same key is tolerated; the last
/// writer wins.
pub(crate) struct RouteCache {
    items: Mutex<LruCache<String, Arc<CacheItem>>>,
}

impl RouteCache {
    pub fn new(capacity: u32) -> Self {
        let capacity = NonZeroUsize::new(capacity as usize)
            .unwrap_or_else(|| NonZeroUsize::new(1).expect("1 is non-zero"));
        RouteCache {
            items: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<CacheItem>> {
        self.items.lock().get(key).cloned()
    }

    pub fn put(&self, key: String, item: Arc<CacheItem>) {
        self.items.lock().put(key, item);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}
