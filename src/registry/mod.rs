//! In-memory backend registry.
//!
//! The routing core only reads instance snapshots through the
//! [`BackendRegistry`] trait. [`ServicePool`] is the in-process
//! implementation fed from the `services` config section. [`Registry`]
//! maps service names to pools and is built once per loaded config, so
//! it is published together with the routing labels it was loaded with.
//! Only the per-service round-robin cursors outlive a reload: the new
//! registry takes them over through [`Registry::inherit_cursors`].
//!
//! [`ServicePool::set_reachable`] is the hook for health checkers that
//! track reachability between reloads. A reload resets reachability to
//! the configured values.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::model::{InstanceConfig, RoutingConfig};
use crate::routing::selector::{RoundRobinSelector, Selection};
use crate::routing::RoutingClass;

pub const VERSION_KEY: &str = "version";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInstance {
    pub id: String,
    pub url: String,
    /// Not terminated.
    pub alive: bool,
    /// Currently answers health probes.
    pub reachable: bool,
    pub metadata: HashMap<String, String>,
}

impl BackendInstance {
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.metadata.get(VERSION_KEY).map(String::as_str)
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.alive && self.reachable
    }
}

impl From<&InstanceConfig> for BackendInstance {
    fn from(cfg: &InstanceConfig) -> Self {
        Self {
            id: cfg.id.clone(),
            url: cfg.url.clone(),
            alive: cfg.alive,
            reachable: cfg.reachable,
            metadata: cfg.metadata.clone(),
        }
    }
}

/// Read side of a service registry, as seen by the selector.
pub trait BackendRegistry: Send + Sync {
    /// Instances that currently answer health probes.
    fn list_reachable(&self) -> Vec<Arc<BackendInstance>>;

    /// Every known instance, reachable or not.
    fn list_all(&self) -> Vec<Arc<BackendInstance>>;
}

/// Instances of one logical service plus the balancer that picks among them.
pub struct ServicePool {
    name: String,
    instances: ArcSwap<Vec<Arc<BackendInstance>>>,
    selector: Arc<RoundRobinSelector>,
}

impl ServicePool {
    #[must_use]
    pub fn new(name: impl Into<String>, instances: Vec<BackendInstance>) -> Self {
        Self {
            name: name.into(),
            instances: ArcSwap::from_pointee(instances.into_iter().map(Arc::new).collect()),
            selector: Arc::new(RoundRobinSelector::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flip the reachability of one instance. Returns `false` if `id` is unknown.
    pub fn set_reachable(&self, id: &str, reachable: bool) -> bool {
        let mut found = false;
        self.instances.rcu(|current| {
            found = false;
            current
                .iter()
                .map(|instance| {
                    if instance.id == id {
                        found = true;
                        let mut updated = BackendInstance::clone(instance);
                        updated.reachable = reachable;
                        Arc::new(updated)
                    } else {
                        Arc::clone(instance)
                    }
                })
                .collect::<Vec<_>>()
        });
        found
    }

    /// Pick an instance for `class` with this pool's round-robin cursor.
    pub fn choose(&self, class: Option<RoutingClass>, routing: &RoutingConfig) -> Selection {
        self.selector.choose(self, class, routing)
    }
}

impl BackendRegistry for ServicePool {
    fn list_reachable(&self) -> Vec<Arc<BackendInstance>> {
        self.instances
            .load()
            .iter()
            .filter(|instance| instance.reachable)
            .cloned()
            .collect()
    }

    fn list_all(&self) -> Vec<Arc<BackendInstance>> {
        Vec::clone(&self.instances.load())
    }
}

impl std::fmt::Debug for ServicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePool")
            .field("name", &self.name)
            .field("instances", &self.len())
            .finish_non_exhaustive()
    }
}

/// Service name to pool map for one loaded config.
#[derive(Debug, Default)]
pub struct Registry {
    pools: HashMap<String, ServicePool>,
}

impl Registry {
    /// Pools for every configured service, each with a fresh cursor.
    #[must_use]
    pub fn from_config(services: &BTreeMap<String, Vec<InstanceConfig>>) -> Self {
        let pools = services
            .iter()
            .map(|(name, instances)| {
                let instances = instances.iter().map(BackendInstance::from).collect();
                (name.clone(), ServicePool::new(name.clone(), instances))
            })
            .collect();
        Self { pools }
    }

    #[must_use]
    pub fn get(&self, service: &str) -> Option<&ServicePool> {
        self.pools.get(service)
    }

    #[must_use]
    pub fn service_count(&self) -> usize {
        self.pools.len()
    }

    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.pools.values().map(ServicePool::len).sum()
    }

    /// Take over the cursors of services that `previous` also knows, so
    /// rotation continues where it stopped.
    pub fn inherit_cursors(&mut self, previous: &Self) {
        for (name, pool) in &mut self.pools {
            match previous.pools.get(name) {
                Some(old) => pool.selector = Arc::clone(&old.selector),
                None => tracing::debug!(service = %name, "registering service pool"),
            }
        }
        for name in previous.pools.keys().filter(|name| !self.pools.contains_key(*name)) {
            tracing::info!(service = %name, "service removed from registry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str, version: &str, reachable: bool) -> InstanceConfig {
        InstanceConfig {
            id: id.into(),
            url: format!("http://{id}:80"),
            metadata: HashMap::from([(VERSION_KEY.to_string(), version.to_string())]),
            alive: true,
            reachable,
        }
    }

    #[test]
    fn reachable_listing_excludes_unreachable_instances() {
        let pool = ServicePool::new(
            "svc",
            vec![
                BackendInstance::from(&instance("a", "v1", true)),
                BackendInstance::from(&instance("b", "v1", false)),
            ],
        );
        assert_eq!(pool.list_all().len(), 2);
        let reachable = pool.list_reachable();
        assert_eq!(reachable.len(), 1);
        assert_eq!(reachable[0].id, "a");
    }

    #[test]
    fn set_reachable_swaps_a_single_instance() {
        let pool = ServicePool::new("svc", vec![BackendInstance::from(&instance("a", "v1", true))]);
        assert!(pool.set_reachable("a", false));
        assert!(pool.list_reachable().is_empty());
        assert!(!pool.set_reachable("missing", true));
    }

    #[test]
    fn inherited_cursor_keeps_rotating() {
        let mut services = BTreeMap::new();
        services.insert(
            "svc".to_string(),
            vec![instance("a", "v1", true), instance("b", "v1", true)],
        );
        let routing = RoutingConfig::with_versions("v1", "v2");
        let previous = Registry::from_config(&services);
        let first = previous.get("svc").unwrap().choose(None, &routing);
        assert_eq!(first.into_instance().unwrap().id, "b");

        services.insert("other".to_string(), vec![instance("c", "v1", true)]);
        let mut next = Registry::from_config(&services);
        next.inherit_cursors(&previous);

        let second = next.get("svc").unwrap().choose(None, &routing);
        assert_eq!(second.into_instance().unwrap().id, "a");
        assert_eq!(next.service_count(), 2);
        assert_eq!(next.instance_count(), 3);
    }

    #[test]
    fn reload_does_not_touch_the_previous_registry() {
        let mut services = BTreeMap::new();
        services.insert("svc".to_string(), vec![instance("a", "v1", true)]);
        let previous = Registry::from_config(&services);

        let mut next = Registry::from_config(&BTreeMap::new());
        next.inherit_cursors(&previous);
        assert!(next.get("svc").is_none());
        assert_eq!(next.service_count(), 0);
        assert_eq!(previous.get("svc").unwrap().len(), 1);
    }

    #[test]
    fn missing_version_metadata_reads_as_none() {
        let mut cfg = instance("a", "v1", true);
        cfg.metadata.clear();
        assert_eq!(BackendInstance::from(&cfg).version(), None);
    }
}
