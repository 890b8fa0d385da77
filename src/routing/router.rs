use std::sync::Arc;
use crate::messaging::{
    Channel, InboundMessage, MessagingError, OutboundRecord, Publisher, Topology,
    HEADER_DELIVERY_ATTEMPT, HEADER_FAILURE_CLASS, HEADER_FAILURE_REASON, HEADER_SOURCE_OFFSET,
    HEADER_SOURCE_PARTITION, HEADER_SOURCE_TOPIC,
};
use crate::metrics::Metrics;
use crate::models::DeliveryAttempt;
use super::{FailureClass, ProcessingError};

// ============================================================================
// Retry / Dead-Letter Router
// ============================================================================
//
// One retry stage only. A retryable failure on the primary channel hops to
// the retry channel; anything failing on the retry channel, and anything
// non-retryable from anywhere, goes to dead-letter. The router owns no
// aggregate state: it picks a destination and republishes the original
// bytes there with the original key and partition.
//
// ============================================================================

/// (source channel, failure class) -> destination. Every pair is listed.
pub const ROUTING_TABLE: [(Channel, FailureClass, Channel); 6] = [
    (Channel::Primary, FailureClass::Retryable, Channel::Retry),
    (Channel::Primary, FailureClass::NonRetryable, Channel::DeadLetter),
    (Channel::Retry, FailureClass::Retryable, Channel::DeadLetter),
    (Channel::Retry, FailureClass::NonRetryable, Channel::DeadLetter),
    (Channel::DeadLetter, FailureClass::Retryable, Channel::DeadLetter),
    (Channel::DeadLetter, FailureClass::NonRetryable, Channel::DeadLetter),
];

pub struct Router {
    topology: Topology,
    publisher: Arc<dyn Publisher>,
    metrics: Option<Arc<Metrics>>,
}

impl Router {
    pub fn new(topology: Topology, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            topology,
            publisher,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Table lookup. The table is total, the fallback only guards edits to it.
    pub fn destination(source: Channel, class: FailureClass) -> Channel {
        ROUTING_TABLE
            .iter()
            .find(|(from, c, _)| *from == source && *c == class)
            .map(|(_, _, to)| *to)
            .unwrap_or(Channel::DeadLetter)
    }

    /// Where a failed delivery of `message` must go.
    pub fn route(&self, message: &InboundMessage, failure: &ProcessingError) -> Channel {
        Self::destination(message.channel, failure.class())
    }

    /// Republish `message` to its destination and wait for the broker's ack.
    ///
    /// `attempt` is the bookkeeping after any in-place retries. An error here
    /// means the message was not moved anywhere and its offset must not be
    /// committed.
    pub async fn reroute(
        &self,
        message: &InboundMessage,
        failure: &ProcessingError,
        attempt: &DeliveryAttempt,
    ) -> Result<Channel, MessagingError> {
        let destination = self.route(message, failure);
        let class = failure.class();

        let attempt = match destination {
            Channel::DeadLetter => attempt.clone().failed(failure.to_string()),
            _ => attempt.next(),
        };

        let mut headers = vec![
            (HEADER_DELIVERY_ATTEMPT.to_string(), attempt.count.to_string()),
            (HEADER_SOURCE_TOPIC.to_string(), message.topic.clone()),
            (HEADER_SOURCE_PARTITION.to_string(), message.partition.to_string()),
            (HEADER_SOURCE_OFFSET.to_string(), message.offset.to_string()),
            (HEADER_FAILURE_CLASS.to_string(), class.as_str().to_string()),
        ];
        if let Some(reason) = attempt.failure_reason.as_ref() {
            headers.push((HEADER_FAILURE_REASON.to_string(), reason.clone()));
        }

        let record = OutboundRecord {
            topic: self.topology.topic(destination).to_string(),
            key: message.key.clone(),
            partition: Some(message.partition),
            payload: message.payload.clone(),
            headers,
        };

        self.publisher.publish(record).await?;

        match destination {
            Channel::DeadLetter => tracing::error!(
                key = ?message.key,
                source = %message.channel,
                partition = message.partition,
                offset = message.offset,
                failure_class = class.as_str(),
                error = %failure,
                attempts = attempt.count,
                "💀 Routed order to dead-letter"
            ),
            _ => tracing::warn!(
                key = ?message.key,
                source = %message.channel,
                destination = %destination,
                error = %failure,
                attempts = attempt.count,
                "Routed order to retry channel"
            ),
        }

        if let Some(ref metrics) = self.metrics {
            metrics.record_reroute(message.channel, destination);
        }

        Ok(destination)
    }
}
