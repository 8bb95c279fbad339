//! Inbound request classification.
//!
//! [`classify`] is a pure function of the request signals and the
//! current [`RoutingConfig`]. Signals are checked in a fixed order and
//! the first match wins:
//!
//! 1. feature disabled → `All`
//! 2. match header present with the exact configured first value → `Gray`
//! 3. client IP in the IP allow-list → `Gray`
//! 4. resolved city in the city allow-list → `Gray`
//! 5. user id in the user allow-list → `Gray`
//! 6. otherwise → `Prod`
//!
//! Missing or non-UTF-8 header values are non-matches, never errors.

use std::net::SocketAddr;

use axum::http::HeaderMap;

use crate::config::model::RoutingConfig;

use super::geo::GeoLookup;
use super::RoutingClass;

/// What the classifier is allowed to look at for one request.
#[derive(Debug, Clone, Copy)]
pub struct RequestSignals<'a> {
    pub headers: &'a HeaderMap,
    /// Transport-level peer, used when no forwarded address header is set.
    pub peer: Option<SocketAddr>,
    /// Resolved user identifier; the gateway never has one.
    pub user_no: Option<&'a str>,
}

impl<'a> RequestSignals<'a> {
    #[must_use]
    pub const fn new(headers: &'a HeaderMap, peer: Option<SocketAddr>) -> Self {
        Self {
            headers,
            peer,
            user_no: None,
        }
    }
}

#[must_use]
pub fn classify(
    signals: &RequestSignals<'_>,
    routing: &RoutingConfig,
    geo: &dyn GeoLookup,
) -> RoutingClass {
    if !routing.enabled {
        return RoutingClass::All;
    }

    if matches_gray_header(signals.headers, routing)
        || matches_ip_list(signals, routing)
        || matches_city_list(signals, routing, geo)
        || matches_user_list(signals, routing)
    {
        RoutingClass::Gray
    } else {
        RoutingClass::Prod
    }
}

/// Client address: the forwarded address header when present and
/// non-empty, otherwise the peer IP.
#[must_use]
pub fn resolve_client_ip(signals: &RequestSignals<'_>, routing: &RoutingConfig) -> Option<String> {
    signals
        .headers
        .get(routing.client_ip_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .or_else(|| signals.peer.map(|addr| addr.ip().to_string()))
}

fn matches_gray_header(headers: &HeaderMap, routing: &RoutingConfig) -> bool {
    // HeaderMap::get returns the first value for a repeated header.
    headers
        .get(routing.match_header_key.as_str())
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == routing.match_header_value)
}

fn matches_ip_list(signals: &RequestSignals<'_>, routing: &RoutingConfig) -> bool {
    if routing.ip_allow_list.is_empty() {
        return false;
    }
    resolve_client_ip(signals, routing).is_some_and(|ip| routing.ip_allow_list.contains(&ip))
}

fn matches_city_list(
    signals: &RequestSignals<'_>,
    routing: &RoutingConfig,
    geo: &dyn GeoLookup,
) -> bool {
    if routing.city_allow_list.is_empty() {
        return false;
    }
    resolve_client_ip(signals, routing)
        .and_then(|ip| geo.city(&ip))
        .is_some_and(|city| routing.city_allow_list.contains(&city))
}

fn matches_user_list(signals: &RequestSignals<'_>, routing: &RoutingConfig) -> bool {
    if routing.user_allow_list.is_empty() {
        return false;
    }
    signals
        .user_no
        .is_some_and(|user| routing.user_allow_list.contains(user))
}
