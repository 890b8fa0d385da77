// ============================================================================
// Messaging - broker-facing seams
// ============================================================================
//
// The consumption loop and router only see two traits:
// - Publisher      publish(record) with key, partition and headers
// - MessageSource  recv / commit / rewind over the merged primary+retry group
//
// redpanda.rs implements both on top of rdkafka. memory.rs is an in-process
// broker used by the tests.
//
// ============================================================================

mod channel;
mod redpanda;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use crate::models::DeliveryAttempt;

pub use channel::{Channel, Topology};
pub use redpanda::{RedpandaClient, RedpandaSource};

pub const HEADER_DELIVERY_ATTEMPT: &str = "x-delivery-attempt";
pub const HEADER_SOURCE_TOPIC: &str = "x-source-topic";
pub const HEADER_SOURCE_PARTITION: &str = "x-source-partition";
pub const HEADER_SOURCE_OFFSET: &str = "x-source-offset";
pub const HEADER_FAILURE_CLASS: &str = "x-failure-class";
pub const HEADER_FAILURE_REASON: &str = "x-failure-reason";

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Circuit breaker open for {0}")]
    CircuitOpen(String),

    #[error("Failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },

    #[error("Failed to receive: {0}")]
    Receive(String),

    #[error("Failed to commit offset: {0}")]
    Commit(String),

    #[error("Failed to rewind to offset: {0}")]
    Rewind(String),

    #[error("Kafka client error: {0}")]
    Client(#[from] rdkafka::error::KafkaError),
}

/// A record pulled from the primary or retry channel, detached from the client.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel: Channel,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Option<Vec<u8>>,
    pub attempt: DeliveryAttempt,
}

/// A record to be produced.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: Option<String>,
    /// `None` lets the producer partition by key
    pub partition: Option<i32>,
    /// `None` is a tombstone
    pub payload: Option<Vec<u8>>,
    pub headers: Vec<(String, String)>,
}

impl OutboundRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Resolves once the broker has acknowledged the record.
    async fn publish(&self, record: OutboundRecord) -> Result<(), MessagingError>;
}

#[async_trait]
pub trait MessageSource: Send {
    /// Blocks until a message is available on any subscribed channel.
    async fn recv(&mut self) -> Result<InboundMessage, MessagingError>;

    /// Marks the message and everything before it on its partition as done.
    async fn commit(&mut self, message: &InboundMessage) -> Result<(), MessagingError>;

    /// Moves the partition position back so the message is delivered again.
    async fn rewind(&mut self, message: &InboundMessage) -> Result<(), MessagingError>;
}

/// Rebuild delivery bookkeeping from record headers. Missing or malformed
/// headers mean a first delivery.
pub fn attempt_from_headers<'a, I>(headers: I) -> DeliveryAttempt
where
    I: IntoIterator<Item = (&'a str, Option<&'a [u8]>)>,
{
    let mut attempt = DeliveryAttempt::default();

    for (key, value) in headers {
        let Some(value) = value.and_then(|v| std::str::from_utf8(v).ok()) else {
            continue;
        };
        match key {
            HEADER_DELIVERY_ATTEMPT => attempt.count = value.parse().unwrap_or(0),
            HEADER_FAILURE_REASON => attempt.failure_reason = Some(value.to_string()),
            _ => {}
        }
    }

    attempt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_from_headers() {
        let headers = [
            (HEADER_DELIVERY_ATTEMPT, Some(&b"3"[..])),
            (HEADER_FAILURE_REASON, Some(&b"timeout"[..])),
            ("unrelated", None),
        ];

        let attempt = attempt_from_headers(headers);
        assert_eq!(attempt.count, 3);
        assert_eq!(attempt.failure_reason.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_attempt_defaults_on_garbage() {
        let headers = [(HEADER_DELIVERY_ATTEMPT, Some(&b"many"[..]))];
        assert_eq!(attempt_from_headers(headers), DeliveryAttempt::default());
    }
}
