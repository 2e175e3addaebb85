//! Request tracing seam.
//!
//! The mux owns one tracer per rules snapshot. Reconfiguration only rebuilds
//! the tracer when the tracing configuration actually changed; otherwise the
//! previous tracer is carried over into the new snapshot. The no-op tracer is
//! the default and emits nothing.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GantryError, GantryResult};

/// Tracing configuration. Structural equality against the previous
/// configuration decides whether a reload reuses the existing tracer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingConfig {
    pub service_name: String,
    #[serde(default)]
    pub enabled: bool,
}

/// Span factory bound to one rules snapshot.
pub struct Tracer {
    service: Option<String>,
}

impl Tracer {
    /// The no-op tracer. Spans from it are inert.
    pub fn noop() -> Self {
        Tracer { service: None }
    }

    pub fn new(config: &TracingConfig) -> GantryResult<Self> {
        if config.service_name.is_empty() {
            return Err(GantryError::config("tracing service_name must not be empty"));
        }

        Ok(Tracer {
            service: config.enabled.then(|| config.service_name.clone()),
        })
    }

    pub fn is_noop(&self) -> bool {
        self.service.is_none()
    }

    pub fn new_span(&self, name: &str) -> Span {
        let inner = self
            .service
            .as_ref()
            .map(|service| tracing::info_span!("http_request", service = %service, name = %name));

        Span { inner }
    }

    /// Close the tracer, flushing anything buffered. Called at most once per
    /// tracer: either by the reload path after replacement, or at shutdown.
    pub fn close(&self) {
        if let Some(service) = &self.service {
            debug!(service = %service, "tracer closed");
        }
    }
}

/// One request's span. Finishing an inert span is a no-op.
pub struct Span {
    inner: Option<tracing::Span>,
}

impl Span {
    pub fn finish(&mut self) {
        self.inner.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_tracer() {
        let tracer = Tracer::noop();
        assert!(tracer.is_noop());

        let mut span = tracer.new_span("request");
        span.finish();
        span.finish(); // idempotent
    }

    #[test]
    fn test_disabled_config_yields_noop() {
        let tracer = Tracer::new(&TracingConfig {
            service_name: "gateway".to_string(),
            enabled: false,
        })
        .unwrap();
        assert!(tracer.is_noop());
    }

    #[test]
    fn test_empty_service_name_rejected() {
        assert!(Tracer::new(&TracingConfig::default()).is_err());
    }

    #[test]
    fn test_enabled_tracer() {
        let tracer = Tracer::new(&TracingConfig {
            service_name: "gateway".to_string(),
            enabled: true,
        })
        .unwrap();
        assert!(!tracer.is_noop());

        let mut span = tracer.new_span("request");
        span.finish();
        tracer.close();
    }
}
