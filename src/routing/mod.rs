//! Canary routing core.
//!
//! - [`class`] -- the `ALL` / `PROD` / `GRAY` routing class.
//! - [`classifier`] -- maps inbound request signals to a class.
//! - [`context`] -- request-scoped storage read by outbound code.
//! - [`propagation`] -- carries the class across hops in a header.
//! - [`filter`] -- narrows a backend list to the class's version label.
//! - [`selector`] -- round-robin pick with bounded retries.
//! - [`geo`] -- pluggable city lookup behind the city allow-list.

pub mod class;
pub mod classifier;
pub mod context;
pub mod filter;
pub mod geo;
pub mod propagation;
pub mod selector;

pub use class::RoutingClass;
pub use context::RoutingContext;
