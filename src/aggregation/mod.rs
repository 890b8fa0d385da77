// ============================================================================
// Aggregation - running statistics per product and overall
// ============================================================================

mod engine;
mod store;

use async_trait::async_trait;
use crate::models::{AggregateResult, OrderEvent};
use crate::routing::ProcessingError;

pub use engine::AggregationEngine;
pub use store::AggregateStore;

/// What the consumption loop runs for every decoded order. Errors are
/// classified by the router; transient ones are retried in place first.
#[async_trait]
pub trait OrderProcessor: Send + Sync {
    async fn process(&self, event: &OrderEvent) -> Result<AggregateResult, ProcessingError>;
}
