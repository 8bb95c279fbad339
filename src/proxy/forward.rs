//! Single-instance upstream request.
//!
//! Sends the rebuilt request to the instance the selector chose and
//! collects the full response body under the route's timeout.

use std::time::{Duration, Instant};

use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::StatusCode;

use crate::error::GrayrouteError;
use crate::server::HttpClient;

#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub latency_ms: u64,
}

pub struct UpstreamRequest<'a> {
    pub client: &'a HttpClient,
    pub instance_id: &'a str,
    pub url: &'a url::Url,
    pub method: &'a Method,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub timeout_ms: u64,
}

#[allow(clippy::cast_possible_truncation)]
pub async fn send(req: UpstreamRequest<'_>) -> Result<UpstreamResponse, GrayrouteError> {
    let mut outbound = hyper::Request::builder()
        .method(req.method.clone())
        .uri(req.url.as_str())
        .body(Full::new(req.body))
        .map_err(|e| GrayrouteError::UriParse { source: e.into() })?;
    *outbound.headers_mut() = req.headers;

    let start = Instant::now();
    let timeout = Duration::from_millis(req.timeout_ms);

    let response = tokio::time::timeout(timeout, req.client.request(outbound))
        .await
        .map_err(|_| GrayrouteError::UpstreamTimeout {
            instance: req.instance_id.to_string(),
            timeout_ms: req.timeout_ms,
        })?
        .map_err(|e| GrayrouteError::HttpRequest { source: e.into() })?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| GrayrouteError::HttpRequest { source: e.into() })?
        .to_bytes();

    Ok(UpstreamResponse {
        status,
        headers,
        body,
        latency_ms: start.elapsed().as_millis() as u64,
    })
}
