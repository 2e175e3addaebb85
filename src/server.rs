//! The gateway HTTP server.
//!
//! Owns the mux and its collectors, wires redirector backends from the
//! configuration into the handler registry, and drives the hyper accept
//! loop. Rules hot-reload goes through [`GatewayServer::apply`], which only
//! touches the mux; the listener itself never restarts.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{GantryError, GantryResult};
use crate::mux::Mux;
use crate::redirector::Redirector;
use crate::registry::{Handler, MapRegistry};
use crate::stats::{HttpStat, TopN};

const TOP_N_SIZE: usize = 10;

pub struct GatewayServer {
    bind_addr: SocketAddr,
    mux: Arc<Mux>,
    http_stat: Arc<HttpStat>,
    top_n: Arc<TopN>,
}

impl GatewayServer {
    pub fn new(bind_addr: SocketAddr) -> Self {
        let http_stat = Arc::new(HttpStat::new());
        let top_n = Arc::new(TopN::new(TOP_N_SIZE));
        let mux = Arc::new(Mux::new(Arc::clone(&http_stat), Arc::clone(&top_n)));

        GatewayServer {
            bind_addr,
            mux,
            http_stat,
            top_n,
        }
    }

    pub fn mux(&self) -> Arc<Mux> {
        Arc::clone(&self.mux)
    }

    pub fn http_stat(&self) -> Arc<HttpStat> {
        Arc::clone(&self.http_stat)
    }

    pub fn top_n(&self) -> Arc<TopN> {
        Arc::clone(&self.top_n)
    }

    /// Apply a configuration: rebuild the handler registry from the
    /// configured redirectors and publish a new rules snapshot.
    pub async fn apply(&self, config: &Config) -> GantryResult<()> {
        let mut registry = MapRegistry::new();
        for (name, redirector_config) in &config.redirectors {
            match Redirector::new(redirector_config) {
                Ok(redirector) => {
                    registry.insert(name.clone(), Arc::new(redirector) as Arc<dyn Handler>);
                }
                Err(e) => {
                    error!("redirector {} skipped: {}", name, e);
                }
            }
        }

        self.mux.set_registry(Arc::new(registry)).await;
        self.mux.reload(config.router.clone());
        info!("gateway configuration applied");
        Ok(())
    }

    /// Run the accept loop until the shutdown future resolves.
    pub async fn run(
        &self,
        shutdown: impl std::future::Future<Output = ()>,
    ) -> GantryResult<()> {
        let mux = Arc::clone(&self.mux);

        let make_service = make_service_fn(move |conn: &AddrStream| {
            let remote = conn.remote_addr();
            let mux = Arc::clone(&mux);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let mux = Arc::clone(&mux);
                    async move { Ok::<_, Infallible>(mux.serve(req, remote).await) }
                }))
            }
        });

        info!("gateway listening on {}", self.bind_addr);
        let server = Server::try_bind(&self.bind_addr)
            .map_err(|e| GantryError::http(format!("bind {} failed: {}", self.bind_addr, e)))?
            .serve(make_service)
            .with_graceful_shutdown(shutdown);

        server.await?;

        self.mux.close();
        info!("gateway stopped");
        Ok(())
    }
}
