//! Configuration validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`Config`] for errors in
//! the routing switches (labels, header names, allow-lists), the route
//! table, and the service registry section. Every problem found is
//! collected into a list of [`ValidationError`] values, with
//! suggestions where a fix is obvious.

use std::collections::HashSet;
use std::net::IpAddr;

use axum::http::HeaderName;
use url::Url;

use super::model::{Config, RoutingConfig};
use crate::error::ValidationError;
use crate::registry::VERSION_KEY;

pub const VALID_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS", "*",
];

/// Validate a single route path. Returns `Ok(())` or a human-readable error.
pub fn validate_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("path cannot be empty".into());
    }
    if !path.starts_with('/') && path != "*" {
        return Err(format!(
            "path must start with '/' or be '*' (did you mean '/{path}'?)"
        ));
    }
    Ok(())
}

/// Validate a backend instance URL. Returns `Ok(())` or a human-readable error.
pub fn validate_instance_url(url: &str) -> Result<(), String> {
    match Url::parse(url) {
        Ok(parsed) => match parsed.scheme() {
            "http" | "https" if parsed.host_str().is_some() => Ok(()),
            "http" | "https" => Err(format!("'{url}' has no host")),
            scheme => Err(format!(
                "unsupported scheme '{scheme}' (expected http or https)"
            )),
        },
        Err(_) => Err(format!("'{url}' is not a valid URL")),
    }
}

/// Validate an HTTP method string. Returns `Ok(())` or a human-readable error.
pub fn validate_method(method: &str) -> Result<(), String> {
    let upper = method.to_uppercase();
    if VALID_METHODS.contains(&upper.as_str()) {
        Ok(())
    } else {
        Err(format!("'{method}' is not a valid HTTP method"))
    }
}

fn validate_header_name(
    errors: &mut Vec<ValidationError>,
    field: &str,
    value: &str,
) -> Option<HeaderName> {
    match HeaderName::from_bytes(value.as_bytes()) {
        Ok(name) => Some(name),
        Err(_) => {
            errors.push(ValidationError::new(
                "routing",
                field,
                format!("'{value}' is not a valid HTTP header name"),
            ));
            None
        }
    }
}

fn validate_routing(routing: &RoutingConfig, errors: &mut Vec<ValidationError>) {
    for (field, label) in [
        ("prod_version", &routing.prod_version),
        ("gray_version", &routing.gray_version),
    ] {
        if label.trim().is_empty() {
            errors.push(ValidationError::new(
                "routing",
                field,
                "version label cannot be empty",
            ));
        }
    }

    if !routing.prod_version.is_empty() && routing.prod_version == routing.gray_version {
        errors.push(
            ValidationError::new(
                "routing",
                "gray_version",
                format!(
                    "gray and prod labels are both '{}', gray traffic could never be isolated",
                    routing.gray_version
                ),
            )
            .with_suggestion("give the canary deployment its own version label"),
        );
    }

    let match_header = validate_header_name(errors, "match_header_key", &routing.match_header_key);
    let propagation =
        validate_header_name(errors, "propagation_header", &routing.propagation_header);
    validate_header_name(errors, "client_ip_header", &routing.client_ip_header);

    if let (Some(matched), Some(propagation)) = (match_header, propagation) {
        if matched == propagation {
            errors.push(
                ValidationError::new(
                    "routing",
                    "propagation_header",
                    format!("'{propagation}' is also the gray match header"),
                )
                .with_suggestion("use a dedicated header such as 'gray-tag'"),
            );
        }
    }

    let mut bad_ips: Vec<&str> = routing
        .ip_allow_list
        .iter()
        .filter(|ip| ip.parse::<IpAddr>().is_err())
        .map(String::as_str)
        .collect();
    bad_ips.sort_unstable();
    for ip in bad_ips {
        errors.push(ValidationError::new(
            "routing",
            "ip_allow_list",
            format!("'{ip}' is not an IP address"),
        ));
    }
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_routing(&config.routing, &mut errors);

    for (service, instances) in &config.services {
        let mut seen_ids = HashSet::new();
        for (i, instance) in instances.iter().enumerate() {
            if instance.id.is_empty() {
                errors.push(ValidationError::new(
                    service.as_str(),
                    format!("instances[{i}].id"),
                    "instance id cannot be empty",
                ));
            } else if !seen_ids.insert(instance.id.as_str()) {
                errors.push(ValidationError::new(
                    service.as_str(),
                    format!("instances[{i}].id"),
                    format!("duplicate instance id '{}'", instance.id),
                ));
            }

            if let Err(msg) = validate_instance_url(&instance.url) {
                errors.push(ValidationError::new(
                    service.as_str(),
                    format!("instances[{i}].url"),
                    msg,
                ));
            }

            if instance
                .metadata
                .get(VERSION_KEY)
                .is_some_and(|v| v.trim().is_empty())
            {
                errors.push(ValidationError::new(
                    service.as_str(),
                    format!("instances[{i}].metadata.version"),
                    "version label cannot be blank",
                ));
            }
        }
    }

    if config.routes.is_empty() {
        errors.push(ValidationError::new(
            "(root)",
            "routes",
            "at least one route must be defined",
        ));
        return Err(errors);
    }

    let mut seen_paths = HashSet::new();

    for (i, route) in config.routes.iter().enumerate() {
        let route_id = if route.path.is_empty() {
            format!("routes[{i}]")
        } else {
            route.path.clone()
        };

        if let Err(msg) = validate_path(&route.path) {
            let mut error = ValidationError::new(route_id.as_str(), "path", msg);
            if !route.path.is_empty() && !route.path.starts_with('/') {
                error = error.with_suggestion(format!("did you mean '/{}'?", route.path));
            }
            errors.push(error);
        }

        if !seen_paths.insert(&route.path) {
            errors.push(ValidationError::new(
                route_id.as_str(),
                "path",
                "duplicate route path",
            ));
        }

        for method in &route.methods {
            if let Err(msg) = validate_method(method) {
                errors.push(ValidationError::new(route_id.as_str(), "methods", msg));
            }
        }

        if !config.services.contains_key(&route.service) {
            let mut error = ValidationError::new(
                route_id.as_str(),
                "service",
                format!("unknown service '{}'", route.service),
            );
            if let Some(known) = closest_service(config, &route.service) {
                error = error.with_suggestion(format!("did you mean '{known}'?"));
            }
            errors.push(error);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// A configured service whose name is a case-insensitive match or a
/// prefix of `name` (or vice versa).
fn closest_service<'a>(config: &'a Config, name: &str) -> Option<&'a str> {
    let lower = name.to_lowercase();
    config
        .services
        .keys()
        .find(|known| {
            let known = known.to_lowercase();
            !lower.is_empty() && (known == lower || known.starts_with(&lower) || lower.starts_with(&known))
        })
        .map(String::as_str)
}

#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let routing = &config.routing;
    let mut lines = vec![format!(
        "  role: {}, gray routing {}",
        config.role.as_str(),
        if routing.enabled { "enabled" } else { "disabled" }
    )];
    lines.push(format!(
        "  versions: prod={} gray={}, propagation header: {}",
        routing.prod_version, routing.gray_version, routing.propagation_header
    ));
    lines.push(format!(
        "  {} routes, {} services, {} instances\n",
        config.routes.len(),
        config.services.len(),
        config.total_instances()
    ));

    for route in &config.routes {
        let timeout = route.timeout.map_or_else(
            || format!("{}ms (default)", config.defaults.timeout),
            |t| format!("{t}ms"),
        );
        lines.push(format!("  {}  -> {}", route.path, route.service));
        lines.push(format!("    methods: {}", route.methods.join(", ")));
        lines.push(format!("    timeout: {timeout}"));
    }

    for (service, instances) in &config.services {
        let count_for = |label: &str| {
            instances
                .iter()
                .filter(|i| i.metadata.get(VERSION_KEY).is_some_and(|v| v == label))
                .count()
        };
        lines.push(format!(
            "  service {service}: {} instances ({} prod, {} gray)",
            instances.len(),
            count_for(&routing.prod_version),
            count_for(&routing.gray_version),
        ));
    }

    format!("{} is valid\n{}", path, lines.join("\n"))
}
