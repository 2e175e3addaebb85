//! The request multiplexer.
//!
//! Per-request orchestration: cache probe, host/path/method/header matching
//! in declaration order, hierarchical IP policy, optional path rewrite, and
//! hand-off to the named backend handler. The active ruleset lives behind an
//! atomic handle; reloads publish a complete new snapshot and never disturb
//! requests already in flight.

mod cache;
mod path;
mod rule;
mod rules;

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use hyper::{Body, Request, Response, StatusCode};
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::config::MuxConfig;
use crate::context::{append_x_forwarded_for, HttpContext};
use crate::registry::{HandlerRegistry, MapRegistry};
use crate::stats::{HttpStat, TopN};
use crate::trace::Tracer;

use cache::{CacheItem, RouteDecision};
use rules::MuxRules;

pub struct Mux {
    http_stat: Arc<HttpStat>,
    top_n: Arc<TopN>,

    rules: ArcSwap<MuxRules>,
    // Kept apart from the rules handle: handlers are replaced independently
    // of rules, and the registry's concrete type may differ across swaps.
    registry: RwLock<Arc<dyn HandlerRegistry>>,
}

impl Mux {
    /// A mux serving the empty ruleset with a no-op tracer, usable before the
    /// first reload.
    pub fn new(http_stat: Arc<HttpStat>, top_n: Arc<TopN>) -> Self {
        Mux {
            http_stat,
            top_n,
            rules: ArcSwap::from_pointee(MuxRules::empty()),
            registry: RwLock::new(Arc::new(MapRegistry::new())),
        }
    }

    /// Replace the backend handler registry.
    pub async fn set_registry(&self, registry: Arc<dyn HandlerRegistry>) {
        let mut guard = self.registry.write().await;
        *guard = registry;
    }

    /// Build and publish a new rules snapshot.
    ///
    /// The tracer is carried over when the tracing configuration is
    /// unchanged; otherwise a new one is built (falling back to no-op on
    /// failure) and the previous one is closed after the swap.
    pub fn reload(&self, config: MuxConfig) {
        let old = self.rules.load_full();

        let tracer = if old.config.tracing == config.tracing {
            Arc::clone(&old.tracer)
        } else {
            match &config.tracing {
                Some(tracing_config) => match Tracer::new(tracing_config) {
                    Ok(tracer) => Arc::new(tracer),
                    Err(e) => {
                        error!("create tracer failed: {}", e);
                        Arc::new(Tracer::noop())
                    }
                },
                None => Arc::new(Tracer::noop()),
            }
        };
        let tracer_replaced = !Arc::ptr_eq(&old.tracer, &tracer);

        let rules = Arc::new(MuxRules::new(config, tracer));
        self.rules.store(rules);
        debug!("rules snapshot published");

        if tracer_replaced {
            old.tracer.close();
        }
    }

    /// Serve one request. The snapshot is loaded once and used for the whole
    /// exchange.
    pub async fn serve(&self, request: Request<Body>, remote_addr: SocketAddr) -> Response<Body> {
        let rules = self.rules.load_full();

        let span = rules.tracer.new_span("http_request");
        let mut ctx = HttpContext::new(request, remote_addr, span);

        self.dispatch(&rules, &mut ctx).await;

        let record = ctx.finish();
        self.http_stat.stat(&record);
        self.top_n.stat(&record);

        ctx.into_response()
    }

    async fn dispatch(&self, rules: &MuxRules, ctx: &mut HttpContext) {
        if let Some(item) = rules.get_cache_item(ctx) {
            return self.handle_with_cache(rules, ctx, &item).await;
        }

        if !rules.pass(ctx) {
            return handle_ip_not_allow(ctx);
        }

        for rule in &rules.rules {
            if !rule.matches(ctx) {
                continue;
            }

            if !rule.pass(ctx) {
                return handle_ip_not_allow(ctx);
            }

            for path in &rule.paths {
                if !path.match_path(ctx.path()) {
                    continue;
                }

                if !path.match_method(ctx.method()) {
                    let item = CacheItem::new(
                        path.ip_filter_chain.clone(),
                        RouteDecision::MethodNotAllowed,
                    );
                    rules.put_cache_item(ctx, &item);
                    return self.handle_with_cache(rules, ctx, &item).await;
                }

                if !path.pass(ctx) {
                    return handle_ip_not_allow(ctx);
                }

                if path.has_header_rules() {
                    if path.match_headers(ctx) {
                        // Never cached: the fingerprint omits headers.
                        let item = CacheItem::new(
                            path.ip_filter_chain.clone(),
                            RouteDecision::HeaderMatched(Arc::clone(path)),
                        );
                        return self.handle_with_cache(rules, ctx, &item).await;
                    }
                    // Header-gated path missed; try the next candidate.
                    continue;
                }

                let item = CacheItem::new(
                    path.ip_filter_chain.clone(),
                    RouteDecision::Matched(Arc::clone(path)),
                );
                rules.put_cache_item(ctx, &item);
                return self.handle_with_cache(rules, ctx, &item).await;
            }

            // A host matched but none of its paths did. Other hosts are not
            // tried, and the miss may depend on header-gated paths, so the
            // decision stays out of the cache.
            let item = CacheItem::new(rules.ip_filter_chain.clone(), RouteDecision::NotFound);
            return self.handle_with_cache(rules, ctx, &item).await;
        }

        let item = CacheItem::new(rules.ip_filter_chain.clone(), RouteDecision::NotFound);
        rules.put_cache_item(ctx, &item);
        self.handle_with_cache(rules, ctx, &item).await
    }

    async fn handle_with_cache(&self, rules: &MuxRules, ctx: &mut HttpContext, item: &CacheItem) {
        // A cached decision forgets the path taken through the rule tree, so
        // the full chain is re-evaluated here.
        if let Some(chain) = &item.chain {
            if !chain.allow(ctx.real_ip()) {
                return handle_ip_not_allow(ctx);
            }
        }

        match &item.decision {
            RouteDecision::NotFound => ctx.set_status_code(StatusCode::NOT_FOUND),
            RouteDecision::MethodNotAllowed => {
                ctx.set_status_code(StatusCode::METHOD_NOT_ALLOWED)
            }
            RouteDecision::Matched(path) | RouteDecision::HeaderMatched(path) => {
                // The read lock covers both the lookup and the handler call.
                let registry = self.registry.read().await;
                let handler = match registry.get(&path.backend) {
                    Some(handler) => handler,
                    None => {
                        ctx.add_tag(format!("backend {} not found", path.backend));
                        ctx.set_status_code(StatusCode::SERVICE_UNAVAILABLE);
                        return;
                    }
                };

                if rules.config.x_forwarded_for {
                    append_x_forwarded_for(ctx);
                }

                if let Some(rewritten) = path.rewrite(ctx.path()) {
                    ctx.set_path(rewritten);
                }

                handler.handle(ctx).await;
            }
        }
    }

    /// Close the mux, releasing the current snapshot's tracer.
    pub fn close(&self) {
        let rules = self.rules.load_full();
        rules.tracer.close();
    }
}

fn handle_ip_not_allow(ctx: &mut HttpContext) {
    ctx.add_tag(format!("ip {} not allow", ctx.real_ip()));
    ctx.set_status_code(StatusCode::FORBIDDEN);
}
