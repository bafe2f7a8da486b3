//! Switchboard daemon — the standalone entry point for the synthesis
//! pipeline.
//!
//! Loads configuration, initializes structured logging and the database,
//! spawns the background eviction sweep, and logs transfer signals until
//! SIGTERM/SIGINT. Telephony integrations that embed the pipeline as a
//! library consume the same [`switchboard_core::Pipeline`] this binary
//! drives.

use switchboard_core::{Pipeline, SwitchboardConfig};
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("SWITCHBOARD_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();

    // An explicitly named config file must exist; the implicit default may
    // be absent, in which case every setting falls back to its default.
    let config = match &resolved_config_path {
        Some(path) => SwitchboardConfig::load(path)
            .expect("failed to load configuration — the daemon cannot start without valid config"),
        None if std::path::Path::new("config.toml").exists() => SwitchboardConfig::load(
            "config.toml",
        )
        .expect("failed to load configuration — the daemon cannot start without valid config"),
        None => SwitchboardConfig::default(),
    };

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
        path = resolved_config_path.as_deref().unwrap_or("config.toml"),
        "resolved startup configuration path"
    );

    let (pipeline, mut signals) = Pipeline::from_config(&config)
        .expect("failed to build pipeline — check db_path and provider settings in config");

    let sweep = pipeline.spawn_eviction();
    tracing::info!("switchboard daemon started");

    loop {
        tokio::select! {
            () = shutdown_signal() => break,
            signal = signals.recv() => match signal {
                Some(signal) => {
                    tracing::warn!(
                        call_id = %signal.call_id,
                        transfer_queue = %signal.transfer_queue,
                        transfer_audio_key = %signal.transfer_audio_key,
                        "call escalated to human transfer"
                    );
                }
                None => break,
            },
        }
    }

    sweep.abort();
    tracing::info!("switchboard daemon shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
