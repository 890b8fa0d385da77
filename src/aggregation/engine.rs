use std::sync::Arc;
use async_trait::async_trait;
use crate::metrics::Metrics;
use crate::models::{AggregateResult, OrderEvent};
use crate::routing::ProcessingError;
use super::{AggregateStore, OrderProcessor};

/// Applies decoded orders to the shared store and publishes the outcome to
/// logs and metrics.
pub struct AggregationEngine {
    store: Arc<AggregateStore>,
    metrics: Option<Arc<Metrics>>,
}

impl AggregationEngine {
    pub fn new(store: Arc<AggregateStore>) -> Self {
        Self { store, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[cfg(test)]
    pub fn store(&self) -> &Arc<AggregateStore> {
        &self.store
    }

    pub fn apply(&self, event: &OrderEvent) -> Result<AggregateResult, ProcessingError> {
        // The store trusts its input; anything invalid stops here.
        event.validate()?;

        let result = self.store.apply(&event.product, event.price);

        tracing::info!(
            order_id = %event.order_id,
            product = %event.product,
            price = event.price,
            product_avg = result.category.average,
            product_count = result.category.count,
            global_avg = result.global.average,
            global_count = result.global.count,
            "Processed order"
        );

        if let Some(ref metrics) = self.metrics {
            metrics.record_aggregate(&event.product, &result);
        }

        Ok(result)
    }
}

#[async_trait]
impl OrderProcessor for AggregationEngine {
    async fn process(&self, event: &OrderEvent) -> Result<AggregateResult, ProcessingError> {
        self.apply(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_returns_post_update_snapshot() {
        let engine = AggregationEngine::new(Arc::new(AggregateStore::new()));

        engine.apply(&OrderEvent::new("p1", "A", 10.0)).unwrap();
        engine.apply(&OrderEvent::new("p2", "A", 20.0)).unwrap();
        let result = engine.apply(&OrderEvent::new("p3", "B", 5.0)).unwrap();

        assert_eq!(result.category.count, 1);
        assert_eq!(result.category.total, 5.0);
        assert_eq!(result.global.count, 3);
        assert_eq!(result.global.total, 35.0);
    }

    #[test]
    fn test_invalid_price_never_reaches_store() {
        let engine = AggregationEngine::new(Arc::new(AggregateStore::new()));

        let err = engine.apply(&OrderEvent::new("p1", "A", -1.0)).unwrap_err();

        assert!(matches!(err, ProcessingError::Validation(_)));
        assert!(engine.store().snapshot().is_empty());
        assert!(engine.store().global().is_none());
    }

    #[tokio::test]
    async fn test_records_metrics_when_attached() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let engine = AggregationEngine::new(Arc::new(AggregateStore::new()))
            .with_metrics(metrics.clone());

        engine.process(&OrderEvent::new("p1", "Phone", 100.0)).await.unwrap();
        engine.process(&OrderEvent::new("p2", "Phone", 300.0)).await.unwrap();

        let gathered = metrics.registry().gather();
        let avg = gathered.iter().find(|m| m.name() == "category_average").unwrap();
        assert_eq!(avg.metric[0].gauge.value, Some(200.0));
    }
}
