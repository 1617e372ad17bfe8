//! Distance/service-area provider trait
//!
//! Providers are strategy objects iterated in order by the resolver;
//! each either produces a usable distance or an error for diagnostics.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Road distance and travel time between two addresses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistanceResult {
    pub distance_km: f64,
    pub duration_minutes: u32,
    pub origin: String,
    pub destination: String,
}

#[async_trait]
pub trait DistanceProvider: Send + Sync + 'static {
    /// Resolve distance and duration between two addresses. An empty
    /// address is a validation error, never zero distance.
    async fn resolve(&self, origin: &str, destination: &str) -> Result<DistanceResult>;

    /// Provider name for logging and error diagnostics.
    fn name(&self) -> &'static str;
}
