//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (config snapshot with its backend registry, HTTP
//! client, stats, and uptime), [`build_router`] for constructing the Axum router
//! with the ingress tagging layer, [`build_http_client`] for the
//! connection-pooled hyper client, and [`shutdown_signal`] for
//! SIGTERM / Ctrl+C handling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::model::Config;
use crate::config::ConfigVersion;
use crate::health::health_handler;
use crate::middleware::gray_ingress;
use crate::proxy;
use crate::registry::Registry;
use crate::routing::RoutingClass;

/// One loaded config and the registry built from its `services`
/// section, published and read as a single value.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Arc<Config>,
    pub registry: Registry,
    pub version: ConfigVersion,
    pub source_name: String,
    pub loaded_at: Instant,
}

impl LoadedConfig {
    #[must_use]
    pub fn new(config: Config, version: ConfigVersion, source_name: impl Into<String>) -> Self {
        Self {
            registry: Registry::from_config(&config.services),
            config: Arc::new(config),
            version,
            source_name: source_name.into(),
            loaded_at: Instant::now(),
        }
    }
}

#[derive(Debug)]
pub struct Stats {
    pub forwarded: AtomicU64,
    pub failed: AtomicU64,
    /// Requests rejected because no instance could be selected.
    pub unavailable: AtomicU64,
    pub config_reloads: AtomicU64,
    pub classified_all: AtomicU64,
    pub classified_prod: AtomicU64,
    pub classified_gray: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            forwarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            unavailable: AtomicU64::new(0),
            config_reloads: AtomicU64::new(0),
            classified_all: AtomicU64::new(0),
            classified_prod: AtomicU64::new(0),
            classified_gray: AtomicU64::new(0),
        }
    }

    pub fn record_class(&self, class: RoutingClass) {
        let counter = match class {
            RoutingClass::All => &self.classified_all,
            RoutingClass::Prod => &self.classified_prod,
            RoutingClass::Gray => &self.classified_gray,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, http_body_util::Full<bytes::Bytes>>;

pub struct AppState {
    pub config: ArcSwap<LoadedConfig>,
    pub http_client: HttpClient,
    pub start_time: Instant,
    pub stats: Stats,
}

impl AppState {
    #[must_use]
    pub fn new(loaded: LoadedConfig, http_client: HttpClient) -> Self {
        Self {
            config: ArcSwap::from_pointee(loaded),
            http_client,
            start_time: Instant::now(),
            stats: Stats::new(),
        }
    }

    /// Publish a reloaded config. Readers see either the old snapshot or
    /// this one in full. Expects a single writer.
    pub fn apply(&self, mut loaded: LoadedConfig) {
        loaded.registry.inherit_cursors(&self.config.load().registry);
        self.config.store(Arc::new(loaded));
        self.stats.config_reloads.fetch_add(1, Ordering::Relaxed);
    }
}

#[must_use]
pub fn build_http_client() -> HttpClient {
    // With more than one rustls crypto provider compiled in, rustls cannot
    // pick one on its own.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https)
}

/// `/health` is served directly; everything else goes through the
/// ingress tagging layer and on to the forwarding fallback.
pub fn build_router(state: Arc<AppState>, max_body: usize) -> Router {
    let proxied = Router::new()
        .fallback(proxy::forward_handler)
        .layer(from_fn_with_state(Arc::clone(&state), gray_ingress));

    Router::new()
        .route("/health", get(health_handler))
        .merge(proxied)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(state)
}

pub async fn shutdown_signal() {
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
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
