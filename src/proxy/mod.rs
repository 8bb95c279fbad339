//! Core HTTP request forwarding handler.
//!
//! [`forward_handler`] is the Axum fallback behind the ingress tagging
//! layer. It matches the request against configured routes, asks the
//! route's service pool for an instance of the current routing class,
//! and forwards to that single instance. Submodules handle route
//! matching ([`routing`]), header construction ([`headers`]), and the
//! upstream call ([`forward`]).

pub mod forward;
pub mod headers;
pub mod routing;

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::GrayrouteError;
use crate::middleware::RequestClass;
use crate::routing::selector::Selection;
use crate::routing::{RoutingClass, RoutingContext};
use crate::server::{AppState, LoadedConfig};

use headers::ForwardContext;

pub async fn forward_handler(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let correlation_id = parts
        .headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

    let loaded = parts
        .extensions
        .get::<Arc<LoadedConfig>>()
        .cloned()
        .unwrap_or_else(|| state.config.load_full());
    let config = &loaded.config;
    let path = parts.uri.path();

    let Some(route) = routing::match_route(&config.routes, path, parts.method.as_str()) else {
        tracing::warn!(
            correlation_id = %correlation_id,
            method = %parts.method,
            path = %path,
            "no route matched"
        );
        return StatusCode::NOT_FOUND.into_response();
    };

    // The extension covers handlers polled outside the ingress scope.
    let class = RoutingContext::get()
        .or_else(|| parts.extensions.get::<RequestClass>().and_then(|tagged| tagged.0));

    let selection = loaded
        .registry
        .get(&route.service)
        .map_or(Selection::Exhausted { attempts: 0 }, |pool| {
            pool.choose(class, &config.routing)
        });
    let Some(instance) = selection.into_instance() else {
        state.stats.unavailable.fetch_add(1, Ordering::Relaxed);
        return error_response(
            &GrayrouteError::NoBackendAvailable {
                service: route.service.clone(),
                class,
            },
            &correlation_id,
        );
    };

    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(correlation_id = %correlation_id, error = %e, "failed to read request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let path_and_query = parts.uri.path_and_query().map_or(path, |pq| pq.as_str());
    let target = format!("{}{path_and_query}", instance.url.trim_end_matches('/'));
    let target_url = match url::Url::parse(&target) {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(instance = %instance.id, target = %target, error = %e, "invalid instance URL");
            state.stats.failed.fetch_add(1, Ordering::Relaxed);
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let client_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string());
    let propagation_header = HeaderName::try_from(config.routing.propagation_header.as_str()).ok();
    let outbound_headers = headers::build_forwarded_headers(
        &parts.headers,
        &config.defaults,
        &ForwardContext {
            client_ip: &client_ip,
            target_url: &target_url,
            correlation_id: &correlation_id,
            propagation_header: propagation_header.as_ref(),
        },
    );

    tracing::info!(
        correlation_id = %correlation_id,
        method = %parts.method,
        path = %path,
        class = class.map_or("unset", RoutingClass::as_str),
        service = %route.service,
        instance = %instance.id,
        "forwarding request"
    );

    let upstream = forward::send(forward::UpstreamRequest {
        client: &state.http_client,
        instance_id: &instance.id,
        url: &target_url,
        method: &parts.method,
        headers: outbound_headers,
        body,
        timeout_ms: route.timeout.unwrap_or(config.defaults.timeout),
    })
    .await;

    match upstream {
        Ok(mut response) => {
            state.stats.forwarded.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                correlation_id = %correlation_id,
                instance = %instance.id,
                status = response.status.as_u16(),
                latency_ms = response.latency_ms,
                "upstream responded"
            );
            headers::strip_response_hop_by_hop(&mut response.headers);
            let mut builder = Response::builder().status(response.status);
            for (key, value) in &response.headers {
                builder = builder.header(key, value);
            }
            builder
                .header("x-correlation-id", &correlation_id)
                .body(Body::from(response.body))
                .unwrap_or_else(|e| {
                    tracing::error!(
                        correlation_id = %correlation_id,
                        error = %e,
                        "failed to build response"
                    );
                    StatusCode::BAD_GATEWAY.into_response()
                })
        }
        Err(e) => {
            tracing::error!(
                correlation_id = %correlation_id,
                instance = %instance.id,
                error = %e,
                "upstream request failed"
            );
            state.stats.failed.fetch_add(1, Ordering::Relaxed);
            error_response(&e, &correlation_id)
        }
    }
}

/// Status mapping for errors surfaced to the client. Retryable errors
/// carry `Retry-After`.
fn error_response(err: &GrayrouteError, correlation_id: &str) -> Response {
    let status = match err {
        GrayrouteError::NoBackendAvailable { service, class } => {
            tracing::warn!(
                correlation_id = %correlation_id,
                service = %service,
                class = class.map_or("unset", RoutingClass::as_str),
                "no backend available"
            );
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::BAD_GATEWAY,
    };
    let mut response = status.into_response();
    if err.is_retryable() {
        response
            .headers_mut()
            .insert(hyper::header::RETRY_AFTER, HeaderValue::from_static("1"));
    }
    if let Ok(val) = HeaderValue::from_str(correlation_id) {
        response.headers_mut().insert("x-correlation-id", val);
    }
    response
}
