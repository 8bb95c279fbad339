//! Outbound header construction.
//!
//! [`build_forwarded_headers`] starts from the client headers (when
//! forwarding is enabled), strips hop-by-hop headers, rewrites `Host` for
//! the chosen instance, appends the proxy metadata headers, and finally
//! replaces the propagation header with the class held by the current
//! routing scope.

use std::sync::LazyLock;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::model::Defaults;
use crate::routing::propagation;

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
        "proxy-authorization",
        "proxy-authenticate",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

/// Strip hop-by-hop headers and `content-length` from an upstream response.
///
/// The body has already been collected, so the origin's framing headers
/// no longer apply.
pub fn strip_response_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove(hyper::header::CONTENT_LENGTH);
}

pub struct ForwardContext<'a> {
    pub client_ip: &'a str,
    pub target_url: &'a url::Url,
    pub correlation_id: &'a str,
    /// `None` when the configured name is not a valid header name.
    pub propagation_header: Option<&'a HeaderName>,
}

pub fn build_forwarded_headers(
    original: &HeaderMap,
    defaults: &Defaults,
    ctx: &ForwardContext<'_>,
) -> HeaderMap {
    let mut headers = if defaults.forward_headers {
        original.clone()
    } else {
        HeaderMap::new()
    };

    if defaults.strip_hop_by_hop {
        for name in HOP_BY_HOP.iter() {
            headers.remove(name);
        }
    }
    headers.remove(hyper::header::CONTENT_LENGTH);

    if let Some(host) = ctx.target_url.host_str() {
        let host_value = ctx
            .target_url
            .port()
            .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));
        if let Ok(val) = HeaderValue::from_str(&host_value) {
            headers.insert(hyper::header::HOST, val);
        }
    }

    if defaults.proxy_headers {
        append_proxy_headers(&mut headers, original, ctx);
    }

    if let Some(name) = ctx.propagation_header {
        propagation::inject_current(&mut headers, name);
    }

    headers
}

fn append_proxy_headers(headers: &mut HeaderMap, original: &HeaderMap, ctx: &ForwardContext<'_>) {
    let client_ip = ctx.client_ip;
    let xff = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map_or_else(
            || client_ip.to_string(),
            |existing| format!("{existing}, {client_ip}"),
        );
    if let Ok(val) = HeaderValue::from_str(&xff) {
        headers.insert("x-forwarded-for", val);
    }

    // First hop of the chain.
    let real_ip = xff.split(',').next().unwrap_or(client_ip).trim();
    if let Ok(val) = HeaderValue::from_str(real_ip) {
        headers.insert("x-real-ip", val);
    }

    let proto = if ctx.target_url.scheme() == "https" {
        "https"
    } else {
        "http"
    };
    headers.insert("x-forwarded-proto", HeaderValue::from_static(proto));

    if let Some(original_host) = original.get(hyper::header::HOST) {
        headers.insert("x-forwarded-host", original_host.clone());
    }

    headers.insert("via", HeaderValue::from_static("1.1 grayroute"));

    if let Ok(val) = HeaderValue::from_str(ctx.correlation_id) {
        headers.insert("x-correlation-id", val);
    }
}
