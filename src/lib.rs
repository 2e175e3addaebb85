pub mod config;
pub mod context;
pub mod error;
pub mod ipfilter;
pub mod mux;
pub mod redirector;
pub mod registry;
pub mod server;
pub mod stats;
pub mod trace;

// Re-export commonly used types
pub use config::{
    Config, ConfigManager, HeaderRuleConfig, MuxConfig, PathConfig, RuleConfig, ServerConfig,
};
pub use context::HttpContext;
pub use error::{GantryError, GantryResult};
pub use ipfilter::{IpFilter, IpFilterChain, IpFilterConfig};
pub use mux::Mux;
pub use redirector::{Redirector, RedirectorConfig};
pub use registry::{Handler, HandlerRegistry, MapRegistry};
pub use server::GatewayServer;
pub use stats::{HttpStat, StatRecord, TopN};
pub use trace::{Span, Tracer, TracingConfig};
