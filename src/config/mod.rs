//! Configuration loading, validation, and hot-reloading.
//!
//! Defines the [`ConfigSource`] trait for pluggable config backends and
//! the [`ConfigVersion`] enum for change detection. Submodules provide
//! the data model, validation logic, and concrete source implementations.
//! The running server holds the loaded config behind an `ArcSwap` (see
//! [`server::AppState`](crate::server::AppState)), so a reload is a
//! single pointer swap.

pub mod model;
pub mod sources;
pub mod validation;

use async_trait::async_trait;

use crate::error::GrayrouteError;
use model::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigVersion {
    Hash(String),
}

impl ConfigVersion {
    /// First eight characters, for logs and the health endpoint.
    #[must_use]
    pub fn short(&self) -> &str {
        match self {
            Self::Hash(h) => h.get(..8).unwrap_or(h),
        }
    }
}

#[async_trait]
pub trait ConfigSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn load(&self) -> Result<(Config, ConfigVersion), GrayrouteError>;
    async fn has_changed(&self, current: &ConfigVersion) -> Result<bool, GrayrouteError>;
}
