use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{Router, middleware, routing::get};
use knock_gate::{KnockGate, knock_middleware};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::proxy::{self, Upstream};

/// Builds the router: every path except `/healthz` passes the knock gate
/// before it is forwarded upstream.
pub fn build_app(gate: Arc<KnockGate>, upstream: Arc<Upstream>) -> Router {
    let gated = Router::new()
        .fallback(proxy::forward)
        .with_state(upstream)
        .layer(middleware::from_fn_with_state(gate, knock_middleware));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(gated)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

pub struct KnockServer {
    addr: SocketAddr,
    app: Router,
    gate: Arc<KnockGate>,
}

impl KnockServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.addr))?;
        info!(addr = %self.addr, "Knock gate listening");

        let served = axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        // Stop the verdict sweeper; loads still in flight finish for their waiters.
        self.gate.close().await;
        let stats = self.gate.stats();
        info!(
            entries = stats.size,
            hits = stats.hits,
            misses = stats.misses,
            loads = stats.loads,
            "Knock gate stopped"
        );
        served.context("server error")
    }
}

#[derive(Default)]
pub struct ServerBuilder {
    config: AppConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Must be called inside a Tokio runtime; the gate spawns its sweeper.
    pub fn build(self) -> anyhow::Result<KnockServer> {
        self.config.validate().map_err(anyhow::Error::msg)?;
        let gate = Arc::new(KnockGate::new(&self.config.knock)?);
        let upstream =
            Arc::new(Upstream::new(&self.config.server).context("failed to build HTTP client")?);
        info!(
            upstream = %self.config.server.upstream,
            knock = %self.config.knock.server,
            service = %self.config.knock.svcname,
            "Configured knock gate"
        );
        Ok(KnockServer {
            addr: self.config.addr(),
            app: build_app(gate.clone(), upstream),
            gate,
        })
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
