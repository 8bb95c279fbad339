//! Version-aware round-robin selection with a bounded retry loop.
//!
//! Each attempt takes fresh reachable/all snapshots from the registry,
//! narrows both with [`filter_by_version`], then advances a shared cursor
//! modulo the size of the filtered *all* set. The candidate is accepted
//! only if it is alive and reachable. An empty filtered set ends the
//! call at once; otherwise at most [`MAX_ATTEMPTS`] candidates are tried.
//!
//! The cursor rotates over the full population rather than the
//! reachable subset, so rotation order stays stable while instances
//! flap in and out of reachability.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::model::RoutingConfig;
use crate::registry::{BackendInstance, BackendRegistry};

use super::filter::filter_by_version;
use super::RoutingClass;

pub const MAX_ATTEMPTS: u32 = 10;

/// Outcome of one [`RoundRobinSelector::choose`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Chosen(Arc<BackendInstance>),
    /// No viable backend. `attempts` counts the candidates that were
    /// rejected; it stays 0 when the filtered set was empty.
    Exhausted { attempts: u32 },
}

impl Selection {
    #[must_use]
    pub fn into_instance(self) -> Option<Arc<BackendInstance>> {
        match self {
            Self::Chosen(instance) => Some(instance),
            Self::Exhausted { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Round-robin balancer state for one logical service.
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    cursor: AtomicUsize,
}

impl RoundRobinSelector {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn choose(
        &self,
        registry: &dyn BackendRegistry,
        class: Option<RoutingClass>,
        routing: &RoutingConfig,
    ) -> Selection {
        let mut attempts = 0;

        while attempts < MAX_ATTEMPTS {
            let reachable = registry.list_reachable();
            let all = registry.list_all();
            let reachable = filter_by_version(&reachable, class, routing);
            let all = filter_by_version(&all, class, routing);

            if reachable.is_empty() || all.is_empty() {
                tracing::warn!(
                    class = class.map_or("none", RoutingClass::as_str),
                    reachable = reachable.len(),
                    known = all.len(),
                    "no up backends available for routing class"
                );
                return Selection::Exhausted { attempts };
            }

            // In bounds: the cursor is reduced modulo `all.len()`.
            let candidate = &all[self.increment_and_get_modulo(all.len())];

            if candidate.is_ready() {
                return Selection::Chosen(Arc::clone(candidate));
            }

            tracing::trace!(instance = %candidate.id, "candidate not ready, trying next");
            attempts += 1;
        }

        tracing::warn!(
            class = class.map_or("none", RoutingClass::as_str),
            attempts,
            "no available alive backends after {MAX_ATTEMPTS} tries"
        );
        Selection::Exhausted { attempts }
    }

    /// Current raw cursor position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    fn increment_and_get_modulo(&self, modulo: usize) -> usize {
        let mut current = self.cursor.load(Ordering::Relaxed);
        loop {
            let next = (current + 1) % modulo;
            match self.cursor.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;

    use super::*;
    use crate::registry::{ServicePool, VERSION_KEY};

    fn instance(id: &str, version: &str, alive: bool, reachable: bool) -> BackendInstance {
        BackendInstance {
            id: id.into(),
            url: format!("http://{id}:80"),
            alive,
            reachable,
            metadata: HashMap::from([(VERSION_KEY.to_string(), version.to_string())]),
        }
    }

    fn routing() -> RoutingConfig {
        RoutingConfig::with_versions("v1", "v2")
    }

    fn pick(pool: &ServicePool, class: Option<RoutingClass>) -> String {
        pool.choose(class, &routing())
            .into_instance()
            .map(|i| i.id.clone())
            .unwrap_or_default()
    }

    /// Registry that counts how often it is asked for snapshots.
    struct CountingRegistry {
        instances: Vec<Arc<BackendInstance>>,
        reads: AtomicU32,
    }

    impl BackendRegistry for CountingRegistry {
        fn list_reachable(&self) -> Vec<Arc<BackendInstance>> {
            self.reads.fetch_add(1, Ordering::Relaxed);
            self.instances.iter().filter(|i| i.reachable).cloned().collect()
        }

        fn list_all(&self) -> Vec<Arc<BackendInstance>> {
            self.instances.clone()
        }
    }

    #[test]
    fn all_class_alternates_between_instances() {
        let pool = ServicePool::new(
            "svc",
            vec![
                instance("a", "v1", true, true),
                instance("b", "v2", true, true),
            ],
        );
        let picks: Vec<String> = (0..6).map(|_| pick(&pool, Some(RoutingClass::All))).collect();
        for pair in picks.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn gray_and_prod_are_pinned_to_their_version() {
        let pool = ServicePool::new(
            "svc",
            vec![
                instance("a", "v1", true, true),
                instance("b", "v2", true, true),
            ],
        );
        for _ in 0..5 {
            assert_eq!(pick(&pool, Some(RoutingClass::Gray)), "b");
            assert_eq!(pick(&pool, Some(RoutingClass::Prod)), "a");
        }
    }

    #[test]
    fn empty_filtered_set_exhausts_without_retrying() {
        let registry = CountingRegistry {
            instances: vec![Arc::new(instance("a", "v1", true, true))],
            reads: AtomicU32::new(0),
        };
        let selector = RoundRobinSelector::new();
        let selection = selector.choose(&registry, Some(RoutingClass::Gray), &routing());
        assert_eq!(selection, Selection::Exhausted { attempts: 0 });
        assert_eq!(registry.reads.load(Ordering::Relaxed), 1);
        assert_eq!(selector.position(), 0);
    }

    #[test]
    fn unreachable_only_pool_exhausts_immediately() {
        let pool = ServicePool::new("svc", vec![instance("a", "v1", true, false)]);
        let selection = pool.choose(Some(RoutingClass::Prod), &routing());
        assert_eq!(selection, Selection::Exhausted { attempts: 0 });
    }

    #[test]
    fn dead_but_reachable_instance_is_retried_to_the_bound() {
        let registry = CountingRegistry {
            instances: vec![Arc::new(instance("a", "v1", false, true))],
            reads: AtomicU32::new(0),
        };
        let selector = RoundRobinSelector::new();
        let selection = selector.choose(&registry, None, &routing());
        assert_eq!(
            selection,
            Selection::Exhausted {
                attempts: MAX_ATTEMPTS
            }
        );
        assert_eq!(registry.reads.load(Ordering::Relaxed), MAX_ATTEMPTS);
    }

    #[test]
    fn unready_candidates_are_skipped() {
        let pool = ServicePool::new(
            "svc",
            vec![
                instance("a", "v1", true, true),
                instance("b", "v1", true, false),
                instance("c", "v1", true, true),
            ],
        );
        for _ in 0..9 {
            assert_ne!(pick(&pool, Some(RoutingClass::Prod)), "b");
        }
    }

    #[test]
    fn first_pick_follows_the_incremented_cursor() {
        let pool = ServicePool::new(
            "svc",
            vec![
                instance("a", "v1", true, true),
                instance("b", "v1", true, true),
                instance("c", "v1", true, true),
            ],
        );
        assert_eq!(pick(&pool, None), "b");
        assert_eq!(pick(&pool, None), "c");
        assert_eq!(pick(&pool, None), "a");
    }

    #[test]
    fn concurrent_selection_is_fair() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 300;

        let pool = Arc::new(ServicePool::new(
            "svc",
            vec![
                instance("a", "v1", true, true),
                instance("b", "v1", true, true),
                instance("c", "v1", true, true),
            ],
        ));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    let mut counts: HashMap<String, usize> = HashMap::new();
                    for _ in 0..PER_THREAD {
                        *counts.entry(pick(&pool, None)).or_default() += 1;
                    }
                    counts
                })
            })
            .collect();

        let mut totals: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for (id, n) in handle.join().unwrap() {
                *totals.entry(id).or_default() += n;
            }
        }

        let total = THREADS * PER_THREAD;
        assert_eq!(totals.values().sum::<usize>(), total);
        for id in ["a", "b", "c"] {
            assert_eq!(totals[id], total / 3, "instance {id} was picked unevenly");
        }
    }
}
