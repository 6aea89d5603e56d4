//! Murmur agent worker binary.
//!
//! Loads configuration, starts the job endpoint with structured logging and
//! shuts down gracefully on SIGTERM/SIGINT.

use murmur_agent::{app, build_worker, config};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("MURMUR_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn fail(message: &str, error: &dyn std::fmt::Display) -> ! {
    eprintln!("murmur-agent: {}: {}", message, error);
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("murmur.toml"));

    let config = config::load_config(selected_config_path)
        .unwrap_or_else(|e| fail("failed to load configuration", &e));

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let instructions = config
        .agent
        .load_instructions()
        .unwrap_or_else(|e| fail("failed to load agent instructions", &e));

    let worker = build_worker(&config, instructions)
        .unwrap_or_else(|e| fail("failed to build agent worker", &e));

    tracing::info!(
        model = %config.llm.model,
        backend = %config.llm.base_url,
        mcp = config.mcp.url.as_deref().unwrap_or("<none>"),
        livekit = !config.livekit.url.is_empty(),
        "agent worker configured"
    );

    let app = app(Arc::new(worker));
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting murmur agent worker");

    let listener = TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| fail("failed to bind job endpoint", &e));

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
    }

    tracing::info!("murmur agent worker shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
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
            Ok(mut signal) => {
                signal.recv().await;
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
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
