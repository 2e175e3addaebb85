//! Backend handler registry.
//!
//! Backends are named downstream handlers. The mux resolves them at dispatch
//! time through the [`HandlerRegistry`] trait, so the registry can be swapped
//! wholesale while rules stay untouched, and the other way around.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::HttpContext;

/// A downstream request handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &mut HttpContext);
}

/// Named lookup of handlers.
pub trait HandlerRegistry: Send + Sync {
    fn get(&self, name: &str) -> Option<Arc<dyn Handler>>;
}

/// Plain map-backed registry.
#[derive(Default)]
pub struct MapRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl MapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, handler: Arc<dyn Handler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.remove(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl HandlerRegistry for MapRegistry {
    fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::StatusCode;

    struct TeapotHandler;

    #[async_trait]
    impl Handler for TeapotHandler {
        async fn handle(&self, ctx: &mut HttpContext) {
            ctx.set_status_code(StatusCode::IM_A_TEAPOT);
        }
    }

    #[test]
    fn test_map_registry_lookup() {
        let mut registry = MapRegistry::new();
        assert!(registry.is_empty());

        registry.insert("backend-a", Arc::new(TeapotHandler));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("backend-a").is_some());
        assert!(registry.get("backend-b").is_none());

        registry.remove("backend-a");
        assert!(registry.get("backend-a").is_none());
    }
}
