use std::time::Duration;
use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::{Header, Headers, Message, OwnedHeaders},
    producer::{FutureProducer, FutureRecord},
    util::Timeout,
    Offset, TopicPartitionList,
};
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
use super::{
    attempt_from_headers, InboundMessage, MessageSource, MessagingError, OutboundRecord,
    Publisher, Topology,
};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Producer
// ============================================================================

pub struct RedpandaClient {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
}

impl RedpandaClient {
    pub fn new(brokers: &str) -> Result<Self, MessagingError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .create()?;

        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
            success_threshold: 3,
        };

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new("redpanda-producer", cb_config),
        })
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }
}

#[async_trait]
impl Publisher for RedpandaClient {
    async fn publish(&self, record: OutboundRecord) -> Result<(), MessagingError> {
        let result = self.circuit_breaker.call(async {
            let headers = record.headers.iter().fold(OwnedHeaders::new(), |acc, (k, v)| {
                acc.insert(Header { key: k, value: Some(v.as_str()) })
            });

            let mut future_record = FutureRecord::<str, [u8]>::to(&record.topic).headers(headers);
            if let Some(payload) = record.payload.as_deref() {
                future_record = future_record.payload(payload);
            }
            if let Some(key) = record.key.as_deref() {
                future_record = future_record.key(key);
            }
            if let Some(partition) = record.partition {
                future_record = future_record.partition(partition);
            }

            self.producer
                .send(future_record, Timeout::After(SEND_TIMEOUT))
                .await
                .map_err(|(e, _)| e)
        }).await;

        match result {
            Ok(_) => {
                tracing::debug!(
                    topic = %record.topic,
                    key = ?record.key,
                    partition = ?record.partition,
                    "Published to Redpanda"
                );
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(
                    topic = %record.topic,
                    "Circuit breaker open - Redpanda unavailable"
                );
                Err(MessagingError::CircuitOpen(record.topic))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(
                    error = %e,
                    topic = %record.topic,
                    "Failed to publish to Redpanda"
                );
                Err(MessagingError::Publish {
                    topic: record.topic,
                    message: e.to_string(),
                })
            }
        }
    }
}

// ============================================================================
// Consumer
// ============================================================================
//
// One StreamConsumer per worker, all in the same group, subscribed to both
// primary and retry topics. Auto-commit is off: offsets move only through
// commit(), and rewind() seeks back so an unacknowledged record is fetched
// again.
//
// ============================================================================

pub struct RedpandaSource {
    consumer: StreamConsumer,
    topology: Topology,
}

impl RedpandaSource {
    pub fn new(brokers: &str, group_id: &str, topology: Topology) -> Result<Self, MessagingError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "10000")
            .create()?;

        consumer.subscribe(&topology.consumed_topics())?;

        tracing::info!(
            group_id = %group_id,
            topics = ?topology.consumed_topics(),
            "Subscribed to order channels"
        );

        Ok(Self { consumer, topology })
    }
}

#[async_trait]
impl MessageSource for RedpandaSource {
    async fn recv(&mut self) -> Result<InboundMessage, MessagingError> {
        loop {
            let msg = self
                .consumer
                .recv()
                .await
                .map_err(|e| MessagingError::Receive(e.to_string()))?;

            let Some(channel) = self.topology.channel_for(msg.topic()) else {
                tracing::warn!(topic = %msg.topic(), "Skipping record from unexpected topic");
                continue;
            };

            let attempt = msg
                .headers()
                .map(|h| attempt_from_headers(h.iter().map(|hd| (hd.key, hd.value))))
                .unwrap_or_default();

            return Ok(InboundMessage {
                channel,
                topic: msg.topic().to_string(),
                partition: msg.partition(),
                offset: msg.offset(),
                key: msg.key().map(|k| String::from_utf8_lossy(k).into_owned()),
                payload: msg.payload().map(|p| p.to_vec()),
                attempt,
            });
        }
    }

    async fn commit(&mut self, message: &InboundMessage) -> Result<(), MessagingError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .map_err(|e| MessagingError::Commit(e.to_string()))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| MessagingError::Commit(e.to_string()))
    }

    async fn rewind(&mut self, message: &InboundMessage) -> Result<(), MessagingError> {
        self.consumer
            .seek(&message.topic, message.partition, Offset::Offset(message.offset), SEEK_TIMEOUT)
            .map_err(|e| MessagingError::Rewind(e.to_string()))
    }
}
