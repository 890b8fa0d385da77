use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use crate::aggregation::OrderProcessor;
use crate::health::{HealthRegistry, HealthStatus};
use crate::messaging::{Channel, InboundMessage, MessageSource, MessagingError};
use crate::metrics::Metrics;
use crate::models::{AggregateResult, DeliveryAttempt, OrderEvent};
use crate::routing::{ProcessingError, Router};
use crate::utils::{retry_on_transient, RetryPolicy, RetryResult};

const RECV_ERROR_BACKOFF: Duration = Duration::from_secs(1);

// ============================================================================
// Consumption Loop
// ============================================================================
//
//   RECEIVING -> PROCESSING -> COMMITTED
//                           -> REROUTING -> (ack) COMMITTED
//                                        -> (no ack) rewind, offset untouched
//
// - Decode and validation failures go straight to REROUTING, no retries.
// - Transient failures are retried in place under the fixed RetryPolicy,
//   then handed to the router.
// - The offset is committed only after a successful apply or after the
//   broker acknowledged the reroute publish.
// - Shutdown interrupts receive, backoff and the reroute ack wait; whatever
//   is in flight stays uncommitted and is redelivered on restart.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Receiving,
    Processing,
    Rerouting,
    Committed,
}

/// Terminal result for one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Committed(AggregateResult),
    Rerouted(Channel),
    /// Reroute not acknowledged: rewound for redelivery, offset not committed.
    Redelivering,
    /// Shutdown arrived first, offset not committed.
    Interrupted,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Worker {worker} halted, could not rewind {topic}/{partition}@{offset}: {source}")]
    RewindFailed {
        worker: usize,
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: MessagingError,
    },
}

/// Shared pieces every worker gets a handle to.
pub struct WorkerContext<P> {
    pub processor: Arc<P>,
    pub router: Arc<Router>,
    pub policy: RetryPolicy,
    pub metrics: Option<Arc<Metrics>>,
    pub health: Option<HealthRegistry>,
}

// Manual impl: derive would demand `P: Clone`.
impl<P> Clone for WorkerContext<P> {
    fn clone(&self) -> Self {
        Self {
            processor: self.processor.clone(),
            router: self.router.clone(),
            policy: self.policy.clone(),
            metrics: self.metrics.clone(),
            health: self.health.clone(),
        }
    }
}

pub struct ConsumptionLoop<S, P> {
    id: usize,
    source: S,
    ctx: WorkerContext<P>,
    shutdown: watch::Receiver<bool>,
    state: LoopState,
    /// Set while reroute publishes are failing; cleared by the next terminal outcome.
    degraded: bool,
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    // A dropped sender also means stop.
    let _ = rx.wait_for(|stop| *stop).await;
}

impl<S, P> ConsumptionLoop<S, P>
where
    S: MessageSource,
    P: OrderProcessor + 'static,
{
    pub fn new(id: usize, source: S, ctx: WorkerContext<P>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            id,
            source,
            ctx,
            shutdown,
            state: LoopState::Receiving,
            degraded: false,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> LoopState {
        self.state
    }

    fn name(&self) -> String {
        format!("worker-{}", self.id)
    }

    fn transition(&mut self, next: LoopState) {
        tracing::trace!(worker = self.id, from = ?self.state, to = ?next, "State transition");
        self.state = next;
    }

    async fn report(&self, status: HealthStatus, details: &str) {
        if let Some(ref health) = self.ctx.health {
            health.update(self.name(), status, Some(details.to_string())).await;
        }
    }

    async fn recovered(&mut self) {
        if self.degraded {
            self.degraded = false;
            tracing::info!(worker = self.id, "✅ Reroute publishing recovered");
            self.report(HealthStatus::Healthy, "consuming").await;
        }
    }

    pub async fn run(mut self) -> Result<(), WorkerError> {
        tracing::info!(worker = self.id, "Consumption loop started");
        self.report(HealthStatus::Healthy, "consuming").await;

        loop {
            self.transition(LoopState::Receiving);

            let received = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => break,
                received = self.source.recv() => received,
            };

            let message = match received {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(worker = self.id, error = %e, "Receive failed");
                    tokio::select! {
                        _ = shutdown_requested(&mut self.shutdown) => break,
                        _ = tokio::time::sleep(RECV_ERROR_BACKOFF) => continue,
                    }
                }
            };

            match self.handle(message).await {
                Ok(Outcome::Interrupted) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(worker = self.id, error = %e, "Consumption loop halted");
                    self.report(HealthStatus::Unhealthy(e.to_string()), "halted").await;
                    return Err(e);
                }
            }
        }

        tracing::info!(worker = self.id, "Consumption loop stopped");
        self.report(HealthStatus::Unhealthy("stopped".to_string()), "shutdown").await;
        Ok(())
    }

    /// Drive one message to a terminal state.
    pub async fn handle(&mut self, message: InboundMessage) -> Result<Outcome, WorkerError> {
        let started = Instant::now();
        self.transition(LoopState::Processing);

        tracing::debug!(
            worker = self.id,
            channel = %message.channel,
            partition = message.partition,
            offset = message.offset,
            key = ?message.key,
            delivery_attempt = message.attempt.count,
            "Received order"
        );

        let event = match OrderEvent::decode(message.payload.as_deref()) {
            Ok(event) => event,
            Err(failure) => {
                let attempt = message.attempt.clone();
                return self.fail(message, failure, attempt, started).await;
            }
        };

        let processor = self.ctx.processor.clone();
        let metrics = self.ctx.metrics.clone();
        let worker = self.id;
        let mut retries = 0u32;

        let processing = retry_on_transient(&self.ctx.policy, |attempt| {
            if attempt > 0 {
                retries = attempt;
                tracing::warn!(
                    worker = worker,
                    attempt = attempt,
                    key = ?message.key,
                    "Retrying order in place"
                );
                if let Some(ref m) = metrics {
                    m.record_retry_attempt(attempt);
                }
            }
            let processor = processor.clone();
            let event = &event;
            async move { processor.process(event).await }
        });

        let result = tokio::select! {
            result = processing => result,
            _ = shutdown_requested(&mut self.shutdown) => {
                tracing::info!(worker = self.id, key = ?message.key, "Shutdown during processing, leaving offset uncommitted");
                return Ok(Outcome::Interrupted);
            }
        };

        match result {
            RetryResult::Success(aggregate) => {
                self.commit(&message).await;
                self.transition(LoopState::Committed);
                self.observe(started);
                self.recovered().await;
                Ok(Outcome::Committed(aggregate))
            }
            RetryResult::Failed(failure) | RetryResult::PermanentFailure(failure) => {
                let attempt = DeliveryAttempt {
                    count: message.attempt.count + retries,
                    failure_reason: message.attempt.failure_reason.clone(),
                };
                self.fail(message, failure, attempt, started).await
            }
        }
    }

    async fn fail(
        &mut self,
        message: InboundMessage,
        failure: ProcessingError,
        attempt: DeliveryAttempt,
        started: Instant,
    ) -> Result<Outcome, WorkerError> {
        self.transition(LoopState::Rerouting);

        if let Some(ref m) = self.ctx.metrics {
            m.record_failure(message.channel, failure.class());
        }

        let router = self.ctx.router.clone();
        let rerouted = tokio::select! {
            result = router.reroute(&message, &failure, &attempt) => result,
            _ = shutdown_requested(&mut self.shutdown) => return Ok(Outcome::Interrupted),
        };

        match rerouted {
            Ok(destination) => {
                self.commit(&message).await;
                self.transition(LoopState::Committed);
                self.observe(started);
                self.recovered().await;
                Ok(Outcome::Rerouted(destination))
            }
            Err(e) => {
                tracing::error!(
                    worker = self.id,
                    error = %e,
                    key = ?message.key,
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    "Reroute publish not acknowledged, offset left uncommitted"
                );
                if let Some(ref m) = self.ctx.metrics {
                    m.record_reroute_publish_failure();
                }
                self.degraded = true;
                self.report(HealthStatus::Degraded(e.to_string()), "reroute publish failing").await;

                tokio::select! {
                    _ = tokio::time::sleep(self.ctx.policy.delay) => {}
                    _ = shutdown_requested(&mut self.shutdown) => return Ok(Outcome::Interrupted),
                }

                self.source
                    .rewind(&message)
                    .await
                    .map_err(|source| WorkerError::RewindFailed {
                        worker: self.id,
                        topic: message.topic.clone(),
                        partition: message.partition,
                        offset: message.offset,
                        source,
                    })?;

                Ok(Outcome::Redelivering)
            }
        }
    }

    async fn commit(&mut self, message: &InboundMessage) {
        // The message is already handled; a lost commit only means a duplicate.
        if let Err(e) = self.source.commit(message).await {
            tracing::warn!(
                worker = self.id,
                error = %e,
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                "Offset commit failed"
            );
        }
    }

    fn observe(&self, started: Instant) {
        if let Some(ref m) = self.ctx.metrics {
            m.record_processing_time(started.elapsed().as_secs_f64());
        }
    }
}
