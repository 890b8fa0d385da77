use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::routing::ProcessingError;

// ============================================================================
// Domain Models
// ============================================================================

/// An order as published to the primary channel by the ingress service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub order_id: String,
    pub product: String,
    pub price: f64,
    pub created_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn new(order_id: impl Into<String>, product: impl Into<String>, price: f64) -> Self {
        Self {
            order_id: order_id.into(),
            product: product.into(),
            price,
            created_at: Utc::now(),
        }
    }

    /// Decode and validate a raw payload. Every failure here is non-retryable.
    pub fn decode(payload: Option<&[u8]>) -> Result<Self, ProcessingError> {
        let bytes = payload.ok_or_else(|| ProcessingError::Decode("empty payload".to_string()))?;

        let event: OrderEvent = serde_json::from_slice(bytes)
            .map_err(|e| ProcessingError::Decode(e.to_string()))?;

        event.validate()?;
        Ok(event)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn validate(&self) -> Result<(), ProcessingError> {
        if self.order_id.trim().is_empty() {
            return Err(ProcessingError::Validation("orderId is required".to_string()));
        }
        if self.product.trim().is_empty() {
            return Err(ProcessingError::Validation("product is required".to_string()));
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(ProcessingError::Validation(format!(
                "price must be > 0, got {}",
                self.price
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Aggregates
// ============================================================================

/// Running count/total/average for one product. Replaced wholesale on every
/// update, never mutated in place by readers.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct CategoryAggregate {
    pub count: u64,
    pub total: f64,
    pub average: f64,
}

/// The process-wide rollup has the same shape as a category.
pub type GlobalAggregate = CategoryAggregate;

impl CategoryAggregate {
    /// First observation for a category.
    pub fn first(price: f64) -> Self {
        Self {
            count: 1,
            total: price,
            average: price,
        }
    }

    /// Value after folding in one more price. Count is always >= 1 afterwards,
    /// so the division is well defined.
    pub fn with(&self, price: f64) -> Self {
        let count = self.count + 1;
        let total = self.total + price;
        Self {
            count,
            total,
            average: total / count as f64,
        }
    }
}

/// Category and global aggregates as they stood right after one apply.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct AggregateResult {
    pub category: CategoryAggregate,
    pub global: GlobalAggregate,
}

// ============================================================================
// Delivery bookkeeping
// ============================================================================

/// How many times a message has been redelivered, and why it was dead-lettered.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DeliveryAttempt {
    pub count: u32,
    pub failure_reason: Option<String>,
}

impl DeliveryAttempt {
    pub fn next(&self) -> Self {
        Self {
            count: self.count + 1,
            failure_reason: self.failure_reason.clone(),
        }
    }

    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_camel_case_payload() {
        let json = br#"{"orderId":"o-1","product":"Laptop","price":999.99,"createdAt":"2024-05-01T10:00:00Z"}"#;
        let event = OrderEvent::decode(Some(json)).unwrap();

        assert_eq!(event.order_id, "o-1");
        assert_eq!(event.product, "Laptop");
        assert_eq!(event.price, 999.99);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = OrderEvent::decode(Some(b"not json")).unwrap_err();
        assert!(matches!(err, ProcessingError::Decode(_)));

        let err = OrderEvent::decode(None).unwrap_err();
        assert!(matches!(err, ProcessingError::Decode(_)));
    }

    #[test]
    fn test_decode_rejects_non_positive_price() {
        for price in ["0", "-5.5"] {
            let json = format!(
                r#"{{"orderId":"o-1","product":"Laptop","price":{},"createdAt":"2024-05-01T10:00:00Z"}}"#,
                price
            );
            let err = OrderEvent::decode(Some(json.as_bytes())).unwrap_err();
            assert!(matches!(err, ProcessingError::Validation(_)), "price {}", price);
        }
    }

    #[test]
    fn test_validate_rejects_blank_product() {
        let event = OrderEvent::new("o-1", "  ", 10.0);
        assert!(matches!(event.validate(), Err(ProcessingError::Validation(_))));
    }

    #[test]
    fn test_encode_decode_preserves_event() {
        let event = OrderEvent::new("o-7", "Phone", 12.5);
        let bytes = event.encode().unwrap();
        assert_eq!(OrderEvent::decode(Some(&bytes)).unwrap(), event);
    }

    #[test]
    fn test_aggregate_folding() {
        let agg = CategoryAggregate::first(10.0).with(20.0);
        assert_eq!(agg.count, 2);
        assert_eq!(agg.total, 30.0);
        assert_eq!(agg.average, 15.0);
    }

    #[test]
    fn test_delivery_attempt_next_keeps_reason() {
        let attempt = DeliveryAttempt::default().failed("boom").next();
        assert_eq!(attempt.count, 1);
        assert_eq!(attempt.failure_reason.as_deref(), Some("boom"));
    }
}
