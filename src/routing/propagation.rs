//! Propagation header codec.
//!
//! [`inject_current`] is the egress half: it writes the current
//! request's class onto an outbound header map, and leaves the header
//! out entirely when no class was set. [`extract`] is the ingress half
//! used by downstream services to recover the class set upstream.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use super::{RoutingClass, RoutingContext};

/// Parse the propagation header. Unknown or non-UTF-8 values are `None`.
#[must_use]
pub fn extract(headers: &HeaderMap, name: &HeaderName) -> Option<RoutingClass> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(RoutingClass::from_header_value)
}

/// Overwrite the propagation header with `class`.
pub fn inject(headers: &mut HeaderMap, name: &HeaderName, class: RoutingClass) {
    headers.insert(name.clone(), HeaderValue::from_static(class.as_str()));
}

/// Replace any inherited propagation header with the class from
/// [`RoutingContext`]. No-op (header removed) when nothing was set.
pub fn inject_current(headers: &mut HeaderMap, name: &HeaderName) -> Option<RoutingClass> {
    headers.remove(name);
    let class = RoutingContext::get()?;
    inject(headers, name, class);
    Some(class)
}
