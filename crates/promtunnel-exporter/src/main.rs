//! promtunnel metrics exporter.
//!
//! - Loads the YAML config (path from argv[1], default `promtunnel.yaml`)
//! - Registers the request instruments once
//! - Serves /metrics, /healthz, /readyz, /version until SIGINT/SIGTERM
//!
//! Config, registration, and bind failures are fatal: log and exit(1).

use tracing_subscriber::{fmt, EnvFilter};

use promtunnel_core::TunnelError;
use promtunnel_exporter::{app_state::AppState, config, server};

const DEFAULT_CONFIG_PATH: &str = "promtunnel.yaml";

#[tokio::main]
async fn main() {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let cfg = match config::load_from_file(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            init_tracing(false);
            fatal("config load failed", &e);
        }
    };
    init_tracing(cfg.debug);

    let state = match AppState::new() {
        Ok(state) => state,
        Err(e) => fatal("metrics registration failed", &e),
    };

    state.mark_ready();

    let draining = state.clone();
    let shutdown = async move {
        shutdown_signal().await;
        draining.mark_not_ready();
    };

    if let Err(e) = server::run(cfg.metrics.port, state, shutdown).await {
        fatal("metrics server failed to start", &e);
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt().with_env_filter(filter).init();
}

fn fatal(msg: &str, e: &TunnelError) -> ! {
    tracing::error!(kind = e.kind().as_str(), error = %e, "{}", msg);
    std::process::exit(1);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
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
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
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
    tracing::info!("signal received, starting graceful shutdown");
}
