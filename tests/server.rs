//! Integration tests for the HTTP server: ingress tagging, version-aware
//! forwarding, propagation, error statuses, reload, and the health endpoint.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderMap, Uri};
use axum::{Json, Router};
use grayroute::config::model::{Config, Defaults, InstanceConfig, Role, Route, RoutingConfig};
use grayroute::config::ConfigVersion;
use grayroute::health::HealthResponse;
use grayroute::server::{self, AppState, LoadedConfig};
use serde_json::Value;

/// Backend that answers with its id and what the gateway sent it.
async fn start_backend(id: &'static str) -> String {
    let app = Router::new().fallback(move |headers: HeaderMap, uri: Uri| async move {
        Json(serde_json::json!({
            "id": id,
            "tag": headers.get("gray-tag").and_then(|v| v.to_str().ok()),
            "uri": uri.to_string(),
        }))
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A loopback URL nothing listens on.
async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn instance(id: &str, url: &str, version: &str) -> InstanceConfig {
    InstanceConfig {
        id: id.into(),
        url: url.into(),
        metadata: HashMap::from([("version".to_string(), version.to_string())]),
        alive: true,
        reachable: true,
    }
}

fn route(path: &str, service: &str) -> Route {
    Route {
        path: path.into(),
        methods: vec!["*".into()],
        service: service.into(),
        timeout: None,
    }
}

/// `/user/*` has one v1 and one v2 instance; `/legacy/*` only has v1.
async fn gateway_config(role: Role) -> Config {
    let user_v1 = start_backend("user-v1").await;
    let user_v2 = start_backend("user-v2").await;
    let legacy = start_backend("legacy-v1").await;

    let mut services = BTreeMap::new();
    services.insert(
        "user".to_string(),
        vec![instance("user-v1", &user_v1, "v1"), instance("user-v2", &user_v2, "v2")],
    );
    services.insert("legacy".to_string(), vec![instance("legacy-v1", &legacy, "v1")]);

    Config {
        role,
        routing: RoutingConfig::with_versions("v1", "v2"),
        defaults: Defaults::default(),
        routes: vec![route("/user/*", "user"), route("/legacy/*", "legacy")],
        services,
    }
}

async fn start_test_server(
    config: Config,
) -> (SocketAddr, Arc<AppState>, tokio::sync::oneshot::Sender<()>) {
    let state = Arc::new(AppState::new(
        LoadedConfig::new(config, ConfigVersion::Hash("test-hash-0001".into()), "test"),
        server::build_http_client(),
    ));

    let router = server::build_router(Arc::clone(&state), 1_048_576);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
        .unwrap();
    });

    (addr, state, shutdown_tx)
}

async fn get(url: &str, headers: &[(&str, &str)]) -> reqwest::Response {
    let mut req = reqwest::Client::new().get(url);
    for (name, value) in headers {
        req = req.header(*name, *value);
    }
    req.send().await.unwrap()
}

async fn get_json(url: &str, headers: &[(&str, &str)]) -> Value {
    let resp = get(url, headers).await;
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn gray_header_routes_to_the_gray_version() {
    let (addr, _state, shutdown) = start_test_server(gateway_config(Role::Gateway).await).await;

    for _ in 0..4 {
        let body = get_json(&format!("http://{addr}/user/1"), &[("gray", "gray-996")]).await;
        assert_eq!(body["id"], "user-v2");
        assert_eq!(body["tag"], "GRAY");
    }

    let _ = shutdown.send(());
}

#[tokio::test]
async fn untagged_request_routes_to_the_prod_version() {
    let (addr, _state, shutdown) = start_test_server(gateway_config(Role::Gateway).await).await;

    for _ in 0..4 {
        let body = get_json(&format!("http://{addr}/user/1?page=2"), &[]).await;
        assert_eq!(body["id"], "user-v1");
        assert_eq!(body["tag"], "PROD");
        assert_eq!(body["uri"], "/user/1?page=2");
    }

    let _ = shutdown.send(());
}

#[tokio::test]
async fn gateway_overwrites_a_client_supplied_tag() {
    let (addr, _state, shutdown) = start_test_server(gateway_config(Role::Gateway).await).await;

    let body = get_json(&format!("http://{addr}/user/1"), &[("gray-tag", "GRAY")]).await;
    assert_eq!(body["id"], "user-v1");
    assert_eq!(body["tag"], "PROD");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn wrong_header_value_is_prod() {
    let (addr, _state, shutdown) = start_test_server(gateway_config(Role::Gateway).await).await;

    let body = get_json(&format!("http://{addr}/user/1"), &[("gray", "gray-997")]).await;
    assert_eq!(body["id"], "user-v1");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn disabled_routing_tags_all_and_rotates() {
    let mut config = gateway_config(Role::Gateway).await;
    config.routing.enabled = false;
    let (addr, _state, shutdown) = start_test_server(config).await;

    let first = get_json(&format!("http://{addr}/user/1"), &[("gray", "gray-996")]).await;
    let second = get_json(&format!("http://{addr}/user/1"), &[("gray", "gray-996")]).await;
    assert_eq!(first["tag"], "ALL");
    assert_ne!(first["id"], second["id"]);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn missing_gray_pool_is_service_unavailable() {
    let (addr, state, shutdown) = start_test_server(gateway_config(Role::Gateway).await).await;

    let resp = get(&format!("http://{addr}/legacy/report"), &[("gray", "gray-996")]).await;
    assert_eq!(resp.status(), 503);
    assert_eq!(resp.headers().get("retry-after").unwrap(), "1");
    assert_eq!(
        state.stats.unavailable.load(std::sync::atomic::Ordering::Relaxed),
        1
    );

    let body = get_json(&format!("http://{addr}/legacy/report"), &[]).await;
    assert_eq!(body["id"], "legacy-v1");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn unmatched_route_returns_404() {
    let (addr, _state, shutdown) = start_test_server(gateway_config(Role::Gateway).await).await;

    let resp = get(&format!("http://{addr}/nonexistent"), &[]).await;
    assert_eq!(resp.status(), 404);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn unreachable_upstream_returns_502() {
    let mut config = gateway_config(Role::Gateway).await;
    let dead = dead_url().await;
    config
        .services
        .insert("user".into(), vec![instance("user-v1", &dead, "v1")]);
    let (addr, _state, shutdown) = start_test_server(config).await;

    let resp = get(&format!("http://{addr}/user/1"), &[]).await;
    assert_eq!(resp.status(), 502);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn sidecar_trusts_the_propagated_tag() {
    let (addr, _state, shutdown) = start_test_server(gateway_config(Role::Sidecar).await).await;

    let gray = get_json(&format!("http://{addr}/user/1"), &[("gray-tag", "GRAY")]).await;
    assert_eq!(gray["id"], "user-v2");
    assert_eq!(gray["tag"], "GRAY");

    let prod = get_json(&format!("http://{addr}/user/1"), &[("gray-tag", "PROD")]).await;
    assert_eq!(prod["id"], "user-v1");

    // The gray match header means nothing to a sidecar.
    let prod = get_json(&format!("http://{addr}/user/1"), &[("gray", "gray-996"), ("gray-tag", "PROD")]).await;
    assert_eq!(prod["id"], "user-v1");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn sidecar_without_tag_sends_none_and_uses_every_version() {
    let (addr, _state, shutdown) = start_test_server(gateway_config(Role::Sidecar).await).await;

    let first = get_json(&format!("http://{addr}/user/1"), &[]).await;
    let second = get_json(&format!("http://{addr}/user/1"), &[("gray-tag", "bogus")]).await;
    assert!(first["tag"].is_null());
    assert!(second["tag"].is_null());
    assert_ne!(first["id"], second["id"]);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn reloaded_labels_apply_to_the_next_request() {
    let config = gateway_config(Role::Gateway).await;
    let mut swapped = config.clone();
    swapped.routing = RoutingConfig::with_versions("v2", "v1");
    let (addr, state, shutdown) = start_test_server(config).await;

    let before = get_json(&format!("http://{addr}/user/1"), &[]).await;
    assert_eq!(before["id"], "user-v1");

    state.apply(LoadedConfig::new(
        swapped,
        ConfigVersion::Hash("test-hash-0002".into()),
        "test",
    ));

    let after = get_json(&format!("http://{addr}/user/1"), &[]).await;
    assert_eq!(after["id"], "user-v2");

    let health: HealthResponse = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.config.version, "test-has");
    assert_eq!(health.stats.config_reloads, 1);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn health_reports_registry_and_class_counts() {
    let (addr, _state, shutdown) = start_test_server(gateway_config(Role::Gateway).await).await;

    get_json(&format!("http://{addr}/user/1"), &[("gray", "gray-996")]).await;
    get_json(&format!("http://{addr}/user/1"), &[]).await;
    get_json(&format!("http://{addr}/user/2"), &[]).await;

    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let health: HealthResponse = resp.json().await.unwrap();

    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(health.config.source, "test");
    assert_eq!(health.config.role, "gateway");
    assert!(health.config.routing_enabled);
    assert_eq!(health.config.routes, 2);
    assert_eq!(health.config.services, 2);
    assert_eq!(health.config.instances, 3);
    assert_eq!(health.stats.requests_forwarded, 3);
    assert_eq!(health.stats.classified.gray, 1);
    assert_eq!(health.stats.classified.prod, 2);
    assert_eq!(health.stats.classified.all, 0);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn graceful_shutdown_works() {
    let (addr, _state, shutdown) = start_test_server(gateway_config(Role::Gateway).await).await;

    let url = format!("http://{addr}/health");
    assert!(reqwest::get(&url).await.is_ok());

    let _ = shutdown.send(());
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert!(reqwest::get(&url).await.is_err());
}
