//! Ingress tagging layer.
//!
//! [`gray_ingress`] runs before the forwarding handler. It decides the
//! request's [`RoutingClass`], records it in the request extensions and
//! the inbound propagation header, and runs the rest of the pipeline
//! inside a fresh [`RoutingContext`] scope. The class is gone once the
//! scope future finishes, however it finishes.
//!
//! The config snapshot the class was decided against is stored in the
//! extensions as well, so the handler routes and selects with the same
//! labels and instances even if a reload lands mid-request.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderName;
use axum::middleware::Next;
use axum::response::Response;

use crate::config::model::{Role, RoutingConfig};
use crate::routing::classifier::{self, RequestSignals};
use crate::routing::context::ClearOnDrop;
use crate::routing::geo::PlaceholderGeoLookup;
use crate::routing::{propagation, RoutingClass, RoutingContext};
use crate::server::AppState;

/// Class attached to a request by [`gray_ingress`], for handlers that
/// prefer an explicit extractor over the task-local slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestClass(pub Option<RoutingClass>);

pub async fn gray_ingress(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let loaded = state.config.load_full();
    let config = &loaded.config;
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let class = match config.role {
        Role::Gateway => Some(tag_at_gateway(&mut req, &config.routing, peer)),
        Role::Sidecar => header_name(&config.routing)
            .and_then(|name| propagation::extract(req.headers(), &name)),
    };

    if let Some(class) = class {
        state.stats.record_class(class);
    }
    req.extensions_mut().insert(RequestClass(class));
    req.extensions_mut().insert(Arc::clone(&loaded));

    tracing::debug!(
        role = config.role.as_str(),
        class = class.map_or("unset", RoutingClass::as_str),
        "request tagged"
    );

    RoutingContext::scope(async move {
        if let Some(class) = class {
            RoutingContext::set(class);
        }
        let _guard = ClearOnDrop::new();
        next.run(req).await
    })
    .await
}

/// Classify and overwrite whatever propagation header the client sent.
fn tag_at_gateway(req: &mut Request, routing: &RoutingConfig, peer: Option<SocketAddr>) -> RoutingClass {
    let class = {
        let signals = RequestSignals::new(req.headers(), peer);
        classifier::classify(&signals, routing, &PlaceholderGeoLookup)
    };
    if let Some(name) = header_name(routing) {
        propagation::inject(req.headers_mut(), &name, class);
    }
    class
}

fn header_name(routing: &RoutingConfig) -> Option<HeaderName> {
    match HeaderName::try_from(routing.propagation_header.as_str()) {
        Ok(name) => Some(name),
        Err(e) => {
            tracing::warn!(
                header = %routing.propagation_header,
                error = %e,
                "invalid propagation header name"
            );
            None
        }
    }
}
