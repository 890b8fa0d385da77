// Private module declaration
mod server;

use prometheus::{
    Gauge, GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry,
};
use crate::messaging::Channel;
use crate::models::AggregateResult;
use crate::routing::FailureClass;
use crate::utils::CircuitState;

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the order pipeline
// ============================================================================
//
// - Order throughput and processing latency
// - Failures by source channel and failure class
// - In-place retry attempts, reroutes and dead-letters
// - Current per-product and global aggregates as gauges
// - Producer circuit breaker state
//
// Scraped via /metrics on the metrics server.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub orders_processed: IntCounterVec,
    pub orders_failed: IntCounterVec,
    pub processing_duration: Histogram,

    pub retry_attempts: IntCounterVec,
    pub orders_rerouted: IntCounterVec,
    pub dlq_messages_total: IntCounter,
    pub reroute_publish_failures: IntCounter,

    pub category_average: GaugeVec,
    pub category_count: GaugeVec,
    pub global_average: Gauge,
    pub global_count: IntGauge,

    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let orders_processed = IntCounterVec::new(
            Opts::new("orders_processed_total", "Orders applied to the aggregates"),
            &["product"],
        )?;
        registry.register(Box::new(orders_processed.clone()))?;

        let orders_failed = IntCounterVec::new(
            Opts::new("orders_failed_total", "Order deliveries that failed processing"),
            &["channel", "class"],
        )?;
        registry.register(Box::new(orders_failed.clone()))?;

        let processing_duration = Histogram::with_opts(
            HistogramOpts::new("order_processing_duration_seconds", "Time from receive to terminal state")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(processing_duration.clone()))?;

        let retry_attempts = IntCounterVec::new(
            Opts::new("retry_attempts_total", "In-place retry attempts"),
            &["attempt"],
        )?;
        registry.register(Box::new(retry_attempts.clone()))?;

        let orders_rerouted = IntCounterVec::new(
            Opts::new("orders_rerouted_total", "Orders republished to another channel"),
            &["from", "to"],
        )?;
        registry.register(Box::new(orders_rerouted.clone()))?;

        let dlq_messages_total = IntCounter::new(
            "dlq_messages_total",
            "Orders routed to the dead-letter channel",
        )?;
        registry.register(Box::new(dlq_messages_total.clone()))?;

        let reroute_publish_failures = IntCounter::new(
            "reroute_publish_failures_total",
            "Reroutes the broker did not acknowledge",
        )?;
        registry.register(Box::new(reroute_publish_failures.clone()))?;

        let category_average = GaugeVec::new(
            Opts::new("category_average", "Running average price per product"),
            &["product"],
        )?;
        registry.register(Box::new(category_average.clone()))?;

        let category_count = GaugeVec::new(
            Opts::new("category_count", "Orders counted per product"),
            &["product"],
        )?;
        registry.register(Box::new(category_count.clone()))?;

        let global_average = Gauge::new("global_average", "Running average price over all orders")?;
        registry.register(Box::new(global_average.clone()))?;

        let global_count = IntGauge::new("global_count", "Orders counted over all products")?;
        registry.register(Box::new(global_count.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Producer circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            orders_processed,
            orders_failed,
            processing_duration,
            retry_attempts,
            orders_rerouted,
            dlq_messages_total,
            reroute_publish_failures,
            category_average,
            category_count,
            global_average,
            global_count,
            circuit_breaker_state,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_aggregate(&self, product: &str, result: &AggregateResult) {
        self.orders_processed.with_label_values(&[product]).inc();
        self.category_average
            .with_label_values(&[product])
            .set(result.category.average);
        self.category_count
            .with_label_values(&[product])
            .set(result.category.count as f64);
        self.global_average.set(result.global.average);
        self.global_count.set(result.global.count as i64);
    }

    pub fn record_processing_time(&self, duration_secs: f64) {
        self.processing_duration.observe(duration_secs);
    }

    pub fn record_failure(&self, channel: Channel, class: FailureClass) {
        self.orders_failed
            .with_label_values(&[channel.as_str(), class.as_str()])
            .inc();
    }

    pub fn record_retry_attempt(&self, attempt: u32) {
        self.retry_attempts
            .with_label_values(&[attempt.to_string().as_str()])
            .inc();
    }

    pub fn record_reroute(&self, from: Channel, to: Channel) {
        self.orders_rerouted
            .with_label_values(&[from.as_str(), to.as_str()])
            .inc();
        if to == Channel::DeadLetter {
            self.dlq_messages_total.inc();
        }
    }

    pub fn record_reroute_publish_failure(&self) {
        self.reroute_publish_failures.inc();
    }

    pub fn update_circuit_breaker_state(&self, state: CircuitState) {
        self.circuit_breaker_state.set(state.as_gauge());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CategoryAggregate;

    fn find<'a>(
        gathered: &'a [prometheus::proto::MetricFamily],
        name: &str,
    ) -> &'a prometheus::proto::MetricFamily {
        gathered.iter().find(|m| m.name() == name).unwrap()
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_processing_time(0.01);
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn test_record_aggregate() {
        let metrics = Metrics::new().unwrap();
        let result = AggregateResult {
            category: CategoryAggregate { count: 2, total: 30.0, average: 15.0 },
            global: CategoryAggregate { count: 3, total: 35.0, average: 35.0 / 3.0 },
        };
        metrics.record_aggregate("A", &result);

        let gathered = metrics.registry().gather();
        assert_eq!(find(&gathered, "orders_processed_total").metric[0].counter.value, Some(1.0));
        assert_eq!(find(&gathered, "category_count").metric[0].gauge.value, Some(2.0));
        assert_eq!(find(&gathered, "global_count").metric[0].gauge.value, Some(3.0));
    }

    #[test]
    fn test_dead_letter_reroute_counts_dlq() {
        let metrics = Metrics::new().unwrap();
        metrics.record_reroute(Channel::Primary, Channel::Retry);
        metrics.record_reroute(Channel::Retry, Channel::DeadLetter);
        metrics.record_reroute(Channel::Primary, Channel::DeadLetter);

        let gathered = metrics.registry().gather();
        assert_eq!(find(&gathered, "dlq_messages_total").metric[0].counter.value, Some(2.0));
        assert_eq!(find(&gathered, "orders_rerouted_total").metric.len(), 3);
    }

    #[test]
    fn test_retry_attempts_by_label() {
        let metrics = Metrics::new().unwrap();
        metrics.record_retry_attempt(1);
        metrics.record_retry_attempt(2);
        metrics.record_retry_attempt(1);

        let gathered = metrics.registry().gather();
        assert_eq!(find(&gathered, "retry_attempts_total").metric.len(), 2);
    }

    #[test]
    fn test_circuit_breaker_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.update_circuit_breaker_state(CircuitState::Open);

        let gathered = metrics.registry().gather();
        assert_eq!(find(&gathered, "circuit_breaker_state").metric[0].gauge.value, Some(1.0));
    }
}
