//! Compiled path spec: matchers plus the dispatch action.

use std::sync::Arc;

use regex::Regex;
use tracing::error;

use crate::config::PathConfig;
use crate::context::HttpContext;
use crate::ipfilter::{new_ip_filter, new_ip_filter_chain, IpFilter, IpFilterChain};

/// A header gate with its compiled regex.
struct CompiledHeaderRule {
    key: String,
    values: Vec<String>,
    regex: Option<Regex>,
}

pub(crate) struct MuxPath {
    ip_filter: Option<IpFilter>,
    pub(crate) ip_filter_chain: Option<Arc<IpFilterChain>>,

    path: String,
    path_prefix: String,
    path_re: Option<Regex>,
    methods: Vec<String>,
    rewrite_target: String,
    pub(crate) backend: String,
    headers: Vec<CompiledHeaderRule>,
}

/// Compile a pattern. On failure the matcher stays absent and never matches;
/// the rest of the snapshot is unaffected.
fn compile(pattern: &str) -> Option<Regex> {
    if pattern.is_empty() {
        return None;
    }
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            error!("BUG: compile {} failed: {}", pattern, e);
            None
        }
    }
}

impl MuxPath {
    pub fn new(parent_chain: Option<&Arc<IpFilterChain>>, config: &PathConfig) -> Self {
        let headers = config
            .headers
            .iter()
            .map(|h| CompiledHeaderRule {
                key: h.key.clone(),
                values: h.values.clone(),
                regex: compile(&h.regexp),
            })
            .collect();

        MuxPath {
            ip_filter: new_ip_filter(config.ip_filter.as_ref()),
            ip_filter_chain: new_ip_filter_chain(parent_chain, config.ip_filter.as_ref()),

            path: config.path.clone(),
            path_prefix: config.path_prefix.clone(),
            path_re: compile(&config.path_regexp),
            methods: config.methods.clone(),
            rewrite_target: config.rewrite_target.clone(),
            backend: config.backend.clone(),
            headers,
        }
    }

    /// The path's own filter; absent means allow.
    pub fn pass(&self, ctx: &HttpContext) -> bool {
        match &self.ip_filter {
            Some(filter) => filter.allow(ctx.real_ip()),
            None => true,
        }
    }

    pub fn match_path(&self, path: &str) -> bool {
        if self.path.is_empty() && self.path_prefix.is_empty() && self.path_re.is_none() {
            return true;
        }

        if !self.path.is_empty() && self.path == path {
            return true;
        }
        if !self.path_prefix.is_empty() && path.starts_with(&self.path_prefix) {
            return true;
        }
        if let Some(re) = &self.path_re {
            return re.is_match(path);
        }

        false
    }

    /// Empty method list matches any method.
    pub fn match_method(&self, method: &str) -> bool {
        if self.methods.is_empty() {
            return true;
        }
        self.methods.iter().any(|m| m == method)
    }

    pub fn has_header_rules(&self) -> bool {
        !self.headers.is_empty()
    }

    /// Whether any header rule matches, checked in declaration order against
    /// the first value of each named header.
    pub fn match_headers(&self, ctx: &HttpContext) -> bool {
        for rule in &self.headers {
            let value = ctx.header(&rule.key);

            if rule.values.iter().any(|v| v == value) {
                return true;
            }

            if let Some(re) = &rule.regex {
                if re.is_match(value) {
                    return true;
                }
            }
        }

        false
    }

    /// The rewritten request path, when this path matched by regex and a
    /// rewrite target is configured.
    pub fn rewrite(&self, path: &str) -> Option<String> {
        let re = self.path_re.as_ref()?;
        if self.rewrite_target.is_empty() {
            return None;
        }
        Some(re.replace_all(path, self.rewrite_target.as_str()).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HeaderRuleConfig, PathConfig};
    use crate::trace::Tracer;
    use hyper::{Body, Request};

    fn mux_path(config: PathConfig) -> MuxPath {
        MuxPath::new(None, &config)
    }

    fn ctx_with_header(key: &'static str, value: &'static str) -> HttpContext {
        let request = Request::builder()
            .uri("/")
            .header(key, value)
            .body(Body::empty())
            .unwrap();
        HttpContext::new(
            request,
            "127.0.0.1:1234".parse().unwrap(),
            Tracer::noop().new_span("test"),
        )
    }

    #[test]
    fn test_match_any_when_no_matcher_configured() {
        let path = mux_path(PathConfig::default());
        assert!(path.match_path("/anything"));
        assert!(path.match_path("/"));
    }

    #[test]
    fn test_exact_prefix_regexp_matching() {
        let path = mux_path(PathConfig {
            path: "/status".to_string(),
            ..Default::default()
        });
        assert!(path.match_path("/status"));
        assert!(!path.match_path("/status/extra"));

        let path = mux_path(PathConfig {
            path_prefix: "/api".to_string(),
            ..Default::default()
        });
        assert!(path.match_path("/api/v1"));
        assert!(!path.match_path("/web"));

        let path = mux_path(PathConfig {
            path_regexp: "^/u/[0-9]+$".to_string(),
            ..Default::default()
        });
        assert!(path.match_path("/u/42"));
        assert!(!path.match_path("/u/abc"));
    }

    #[test]
    fn test_invalid_regexp_never_matches() {
        let path = mux_path(PathConfig {
            path_regexp: "(unclosed".to_string(),
            ..Default::default()
        });
        assert!(!path.match_path("/anything"));
    }

    #[test]
    fn test_match_method() {
        let path = mux_path(PathConfig::default());
        assert!(path.match_method("DELETE"));

        let path = mux_path(PathConfig {
            methods: vec!["GET".to_string(), "HEAD".to_string()],
            ..Default::default()
        });
        assert!(path.match_method("GET"));
        assert!(!path.match_method("POST"));
    }

    #[test]
    fn test_match_headers_by_value_and_regex() {
        let path = mux_path(PathConfig {
            headers: vec![
                HeaderRuleConfig {
                    key: "x-version".to_string(),
                    values: vec!["v2".to_string()],
                    ..Default::default()
                },
                HeaderRuleConfig {
                    key: "x-canary".to_string(),
                    regexp: "^on(-.*)?$".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        });

        assert!(path.match_headers(&ctx_with_header("x-version", "v2")));
        assert!(path.match_headers(&ctx_with_header("x-canary", "on-eu")));
        assert!(!path.match_headers(&ctx_with_header("x-version", "v1")));
        assert!(!path.match_headers(&ctx_with_header("x-other", "v2")));
    }

    #[test]
    fn test_rewrite_requires_regexp_and_target() {
        let path = mux_path(PathConfig {
            path_regexp: "^/u/([0-9]+)$".to_string(),
            rewrite_target: "/users/$1".to_string(),
            ..Default::default()
        });
        assert_eq!(path.rewrite("/u/42").unwrap(), "/users/42");

        let path = mux_path(PathConfig {
            path_regexp: "^/u/([0-9]+)$".to_string(),
            ..Default::default()
        });
        assert!(path.rewrite("/u/42").is_none());

        let path = mux_path(PathConfig {
            path_prefix: "/u/".to_string(),
            rewrite_target: "/users/$1".to_string(),
            ..Default::default()
        });
        assert!(path.rewrite("/u/42").is_none());
    }
}
