//! Narrow a backend list to the version pool a routing class may use.

use std::borrow::Cow;
use std::sync::Arc;

use crate::config::model::RoutingConfig;
use crate::registry::BackendInstance;

use super::RoutingClass;

/// The version label `class` is pinned to, or `None` when unrestricted.
#[must_use]
pub fn target_version(class: Option<RoutingClass>, routing: &RoutingConfig) -> Option<&str> {
    match class {
        None | Some(RoutingClass::All) => None,
        Some(RoutingClass::Prod) => Some(routing.prod_version.as_str()),
        Some(RoutingClass::Gray) => Some(routing.gray_version.as_str()),
    }
}

/// Keep only the instances whose `version` metadata equals the label
/// `class` resolves to.
///
/// `All` and an absent class hand the input back borrowed, untouched.
/// Instances without a `version` entry never survive `Prod` or `Gray`.
#[must_use]
pub fn filter_by_version<'a>(
    instances: &'a [Arc<BackendInstance>],
    class: Option<RoutingClass>,
    routing: &RoutingConfig,
) -> Cow<'a, [Arc<BackendInstance>]> {
    let Some(wanted) = target_version(class, routing) else {
        return Cow::Borrowed(instances);
    };

    Cow::Owned(
        instances
            .iter()
            .filter(|instance| instance.version() == Some(wanted))
            .cloned()
            .collect(),
    )
}
