//! Serde data structures for the grayroute configuration file.
//!
//! Contains [`Config`] (the root), [`RoutingConfig`] (the canary switches
//! and version labels), [`Route`], [`InstanceConfig`] and [`Defaults`].
//! All types derive `Serialize` and `Deserialize` with
//! `deny_unknown_fields` for strict parsing.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

const fn default_timeout() -> u64 {
    5000
}

const fn default_true() -> bool {
    true
}

fn default_methods() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_match_header_key() -> String {
    "gray".to_string()
}

fn default_match_header_value() -> String {
    "gray-996".to_string()
}

fn default_propagation_header() -> String {
    "gray-tag".to_string()
}

fn default_client_ip_header() -> String {
    "x-real-ip".to_string()
}

fn is_default_methods(v: &[String]) -> bool {
    v.len() == 1 && v[0] == "*"
}

/// Whether this process classifies traffic itself or trusts the class a
/// previous hop attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Entry point: classify every inbound request.
    #[default]
    Gateway,
    /// Downstream service: read the propagation header set upstream.
    Sidecar,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::Sidecar => "sidecar",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub role: Role,

    pub routing: RoutingConfig,

    #[serde(default)]
    pub defaults: Defaults,

    pub routes: Vec<Route>,

    #[serde(default)]
    pub services: BTreeMap<String, Vec<InstanceConfig>>,
}

impl Config {
    #[must_use]
    pub fn total_instances(&self) -> usize {
        self.services.values().map(Vec::len).sum()
    }
}

/// Canary switches and version labels.
///
/// Swapped as a whole on reload, never field by field.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// When off every request is classified `ALL`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_match_header_key")]
    pub match_header_key: String,

    #[serde(default = "default_match_header_value")]
    pub match_header_value: String,

    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub ip_allow_list: HashSet<String>,

    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub city_allow_list: HashSet<String>,

    /// Never matches at the gateway: no user identity is resolved there.
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub user_allow_list: HashSet<String>,

    pub prod_version: String,

    pub gray_version: String,

    /// Header carrying the class (`ALL`/`PROD`/`GRAY`) between hops.
    #[serde(default = "default_propagation_header")]
    pub propagation_header: String,

    /// Proxy-forwarded client address header, preferred over the peer address.
    #[serde(default = "default_client_ip_header")]
    pub client_ip_header: String,
}

impl RoutingConfig {
    /// A config with the given labels and every other field at its default.
    #[must_use]
    pub fn with_versions(prod_version: &str, gray_version: &str) -> Self {
        Self {
            enabled: true,
            match_header_key: default_match_header_key(),
            match_header_value: default_match_header_value(),
            ip_allow_list: HashSet::new(),
            city_allow_list: HashSet::new(),
            user_allow_list: HashSet::new(),
            prod_version: prod_version.to_string(),
            gray_version: gray_version.to_string(),
            propagation_header: default_propagation_header(),
            client_ip_header: default_client_ip_header(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_true")]
    pub forward_headers: bool,

    #[serde(default = "default_true")]
    pub proxy_headers: bool,

    #[serde(default = "default_true")]
    pub strip_hop_by_hop: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            forward_headers: default_true(),
            proxy_headers: default_true(),
            strip_hop_by_hop: default_true(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Route {
    pub path: String,

    #[serde(
        default = "default_methods",
        skip_serializing_if = "is_default_methods"
    )]
    pub methods: Vec<String>,

    /// Name of the service in `services` that serves this route.
    pub service: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// One backend instance as declared in the registry section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceConfig {
    pub id: String,

    pub url: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,

    #[serde(default = "default_true")]
    pub alive: bool,

    #[serde(default = "default_true")]
    pub reachable: bool,
}
