//! Request-scoped storage for the routing class.
//!
//! The class lives in a tokio task-local slot that exists only inside
//! [`RoutingContext::scope`]. Code running anywhere in that request's
//! future (handlers, outbound header builders) reads it through
//! [`RoutingContext::get`] without a reference to the ingress stage.
//! The slot is created empty for each request and disappears with the
//! scope future, whether it completes, fails, panics or is dropped, so
//! a worker thread that picks up the next request never sees the
//! previous class.
//!
//! Spawned tasks do not inherit the slot. Handlers that fan work out to
//! `tokio::spawn` wrap the future with [`RoutingContext::propagate`] to
//! carry the class across.

use std::cell::Cell;
use std::future::Future;

use super::RoutingClass;

tokio::task_local! {
    static CURRENT: Cell<Option<RoutingClass>>;
}

/// Accessors for the current request's routing class.
#[derive(Debug, Clone, Copy)]
pub struct RoutingContext;

impl RoutingContext {
    /// Run `f` with a fresh, empty routing slot.
    pub async fn scope<F: Future>(f: F) -> F::Output {
        CURRENT.scope(Cell::new(None), f).await
    }

    /// Blocking counterpart of [`scope`](Self::scope) for synchronous code.
    pub fn sync_scope<R>(f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(Cell::new(None), f)
    }

    /// Carry the current class (if any) into a future that will run on
    /// another task.
    pub fn propagate<F: Future>(f: F) -> impl Future<Output = F::Output> {
        CURRENT.scope(Cell::new(Self::get()), f)
    }

    /// Record the class for this request. Returns `false` outside a scope.
    pub fn set(class: RoutingClass) -> bool {
        CURRENT.try_with(|slot| slot.set(Some(class))).is_ok()
    }

    /// The class set for this request, or `None` if none was set or no
    /// scope is active.
    #[must_use]
    pub fn get() -> Option<RoutingClass> {
        CURRENT.try_with(Cell::get).ok().flatten()
    }

    pub fn clear() {
        let _ = CURRENT.try_with(|slot| slot.set(None));
    }

    #[must_use]
    pub fn is_active() -> bool {
        CURRENT.try_with(|_| ()).is_ok()
    }
}

/// Clears the routing slot when dropped.
///
/// Held by the ingress stage for the lifetime of the request so the
/// clear runs on normal return, early return and unwinding alike.
#[derive(Debug)]
#[must_use = "the slot is cleared when the guard is dropped"]
pub struct ClearOnDrop(());

impl ClearOnDrop {
    pub const fn new() -> Self {
        Self(())
    }
}

impl Default for ClearOnDrop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        RoutingContext::clear();
    }
}
