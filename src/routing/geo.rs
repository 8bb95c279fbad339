//! City lookup for the city allow-list.
//!
//! Real geo-IP resolution is an external collaborator. The default
//! implementation answers the same placeholder city for every address.

pub const PLACEHOLDER_CITY: &str = "local";

pub trait GeoLookup: Send + Sync {
    /// City name for `ip`, or `None` when it cannot be resolved.
    fn city(&self, ip: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderGeoLookup;

impl GeoLookup for PlaceholderGeoLookup {
    fn city(&self, _ip: &str) -> Option<String> {
        Some(PLACEHOLDER_CITY.to_string())
    }
}
