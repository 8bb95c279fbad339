//! `grayroute run`: start the gateway.
//!
//! Loads the config file, seeds the backend registry, starts the Axum
//! HTTP server with graceful shutdown, and spawns a background refresh
//! loop that swaps in changed config files.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::RunArgs;
use crate::config::model::Config;
use crate::config::sources::FileSource;
use crate::config::ConfigSource;
use crate::error::GrayrouteError;
use crate::logging;
use crate::server::{self, AppState, LoadedConfig};

const CANDIDATES: [&str; 4] = [
    "grayroute.yaml",
    "grayroute.yml",
    "grayroute.json",
    "grayroute.toml",
];

pub async fn execute(args: RunArgs) -> Result<(), GrayrouteError> {
    logging::init(&args.log_level, logging::resolve_format(args.pretty, args.json));

    let source = resolve_config_source(args.config.as_deref()).await?;
    let (mut config, version) = source.load().await?;
    apply_timeout_override(&mut config, args.timeout);

    tracing::info!(
        source = source.name(),
        path = %source.path().display(),
        version = version.short(),
        "config loaded"
    );

    let role = config.role;
    let route_count = config.routes.len();
    let instance_count = config.total_instances();

    let state = Arc::new(AppState::new(
        LoadedConfig::new(config, version, source.name()),
        server::build_http_client(),
    ));

    // Flipped on shutdown to stop the refresh loop.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let refresh_state = Arc::clone(&state);
    let refresh_handle = tokio::spawn(config_refresh_loop(
        refresh_state,
        source,
        args.timeout,
        args.poll_interval,
        shutdown_rx,
    ));

    let router = server::build_router(state, args.max_body);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        role = role.as_str(),
        routes = route_count,
        instances = instance_count,
        "grayroute started"
    );

    let graceful_shutdown = async move {
        server::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    };

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful_shutdown)
    .await?;

    if let Err(e) = refresh_handle.await {
        tracing::error!(error = %e, "config refresh task failed");
    }

    tracing::info!("grayroute stopped");
    Ok(())
}

/// `--timeout` replaces the file's default upstream timeout.
fn apply_timeout_override(config: &mut Config, timeout: Option<u64>) {
    if let Some(timeout) = timeout {
        config.defaults.timeout = timeout;
    }
}

async fn resolve_config_source(explicit: Option<&Path>) -> Result<FileSource, GrayrouteError> {
    if let Some(path) = explicit {
        return FileSource::for_path(path);
    }

    for name in &CANDIDATES {
        let path = PathBuf::from(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "auto-detected config file");
            return FileSource::for_path(&path);
        }
    }

    Err(GrayrouteError::NoConfigSource {
        hint: format!(
            "Provide --config <file> or place one of {} in the working directory.",
            CANDIDATES.join(", ")
        ),
    })
}

async fn config_refresh_loop(
    state: Arc<AppState>,
    source: FileSource,
    timeout_override: Option<u64>,
    interval_secs: u64,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.tick().await; // first tick is immediate

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                tracing::debug!("config refresh loop shutting down");
                return;
            }
        }

        let current_version = state.config.load().version.clone();

        match source.has_changed(&current_version).await {
            Ok(true) => {
                tracing::info!("config change detected, reloading");
                match source.load().await {
                    Ok((mut config, version)) => {
                        apply_timeout_override(&mut config, timeout_override);
                        let route_count = config.routes.len();
                        let short = version.short().to_string();
                        state.apply(LoadedConfig::new(config, version, source.name()));
                        tracing::info!(routes = route_count, version = %short, "config reloaded");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "config reload failed, keeping current config");
                    }
                }
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "config change check failed");
            }
        }
    }
}
