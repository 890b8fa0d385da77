use std::sync::Arc;
use rand::Rng;
use serde::Deserialize;
use uuid::Uuid;
use crate::messaging::{MessagingError, OutboundRecord, Publisher};
use crate::models::OrderEvent;

// ============================================================================
// Ingress - publishing validated orders to the primary channel
// ============================================================================
//
// The aggregation core trusts that anything on the primary channel was
// validated here first: non-blank orderId and product, price > 0. Records
// are keyed by orderId so the broker keeps per-order ordering.
//
// ============================================================================

const DEFAULT_PRODUCTS: [&str; 7] = [
    "Laptop",
    "Phone",
    "Headphones",
    "Monitor",
    "Keyboard",
    "Mouse",
    "Printer",
];

#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    #[error("{0}")]
    Validation(String),

    #[error("orders list cannot be empty")]
    EmptyBatch,

    #[error("Failed to encode order: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Publish(#[from] MessagingError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub order_id: String,
    pub product: String,
    pub price: f64,
}

impl OrderRequest {
    pub fn validate(&self) -> Result<(), IngressError> {
        if self.order_id.trim().is_empty() {
            return Err(IngressError::Validation("orderId is required".to_string()));
        }
        if self.product.trim().is_empty() {
            return Err(IngressError::Validation("product is required".to_string()));
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(IngressError::Validation("price must be > 0".to_string()));
        }
        Ok(())
    }

    /// A random order, for demos and load generation.
    pub fn random(preferred_product: Option<&str>) -> Self {
        let mut rng = rand::rng();

        let product = match preferred_product {
            Some(p) if !p.trim().is_empty() => p.to_string(),
            _ => DEFAULT_PRODUCTS[rng.random_range(0..DEFAULT_PRODUCTS.len())].to_string(),
        };
        // [5, 1000) rounded to cents
        let price = ((5.0 + rng.random::<f64>() * 995.0) * 100.0).round() / 100.0;

        Self {
            order_id: Uuid::new_v4().to_string(),
            product,
            price,
        }
    }
}

pub struct OrderPublisher {
    publisher: Arc<dyn Publisher>,
    topic: String,
}

impl OrderPublisher {
    pub fn new(publisher: Arc<dyn Publisher>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }

    pub async fn send_order(&self, request: OrderRequest) -> Result<(), IngressError> {
        request.validate()?;

        let event = OrderEvent::new(request.order_id, request.product, request.price);
        let record = OutboundRecord {
            topic: self.topic.clone(),
            key: Some(event.order_id.clone()),
            partition: None,
            payload: Some(event.encode()?),
            headers: Vec::new(),
        };

        if let Err(e) = self.publisher.publish(record).await {
            tracing::error!(order_id = %event.order_id, error = %e, "Failed to publish order");
            return Err(e.into());
        }

        tracing::info!(order_id = %event.order_id, product = %event.product, "Published order");
        Ok(())
    }

    /// Validates the whole batch before publishing any of it.
    pub async fn send_orders(&self, requests: Vec<OrderRequest>) -> Result<usize, IngressError> {
        if requests.is_empty() {
            return Err(IngressError::EmptyBatch);
        }
        for request in &requests {
            request.validate()?;
        }

        let count = requests.len();
        for request in requests {
            self.send_order(request).await?;
        }
        Ok(count)
    }

    pub async fn send_random_orders(
        &self,
        count: usize,
        preferred_product: Option<&str>,
    ) -> Result<usize, IngressError> {
        tracing::info!(count = count, "Publishing auto-generated orders");
        let requests = (0..count)
            .map(|_| OrderRequest::random(preferred_product))
            .collect();
        self.send_orders(requests).await
    }
}
