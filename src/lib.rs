//! Grayroute is a canary-aware HTTP gateway.
//!
//! Each inbound request is tagged with a routing class (`ALL`, `PROD` or
//! `GRAY`) from its headers, client address, and the canary switches in
//! the config. The class lives in a request-scoped slot for the rest of
//! the request. It picks the backend version the request may reach and
//! travels to downstream services in a propagation header.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, validate, health).
//! - [`config`] -- Configuration loading, validation, and hot-reloading via the
//!   [`ConfigSource`](config::ConfigSource) trait.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler returning runtime diagnostics.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`middleware`] -- Ingress tagging layer.
//! - [`proxy`] -- Route matching, outbound headers, and single-instance forwarding.
//! - [`registry`] -- In-memory backend registry with per-service round-robin pools.
//! - [`routing`] -- Routing class, classifier, request context, version filter,
//!   selector, and propagation header codec.
//! - [`server`] -- Axum server setup, shared application state, HTTP client, and
//!   graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |
//! | `file-backends` | All file format backends |
//! | `full` | All features |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod proxy;
pub mod registry;
pub mod routing;
pub mod server;
