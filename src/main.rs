use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod aggregation;
mod config;
mod consumer;
mod health;
mod ingress;
mod messaging;
mod metrics;
mod models;
mod routing;
mod utils;

use aggregation::{AggregateStore, AggregationEngine};
use config::AppConfig;
use consumer::{WorkerContext, WorkerPool};
use health::{HealthRegistry, HealthStatus};
use ingress::OrderPublisher;
use messaging::{RedpandaClient, RedpandaSource};
use routing::Router;
use utils::CircuitState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging, overridable with RUST_LOG
    // Example: RUST_LOG=order_aggregator=trace cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_aggregator=debug"))
        )
        .init();

    let config = AppConfig::from_env()?;
    let topology = config.topology();

    tracing::info!("🚀 Starting order aggregator");
    tracing::info!(
        brokers = %config.brokers,
        topic = %config.topic,
        retry_topic = %config.retry_topic,
        dlq_topic = %config.dlq_topic,
        workers = config.workers,
        retry_max_attempts = config.retry.max_attempts,
        retry_delay_ms = config.retry.delay.as_millis() as u64,
        "Loaded configuration"
    );

    // === 1. Metrics and health ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    let health = HealthRegistry::new();

    // actix-web needs its own system; keep it off the tokio runtime
    let metrics_registry = Arc::new(metrics.registry().clone());
    let server_health = health.clone();
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let result = actix_web::rt::System::new()
            .block_on(metrics::start_metrics_server(metrics_registry, server_health, metrics_port));
        if let Err(e) = result {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    // === 2. Broker clients ===
    let redpanda = Arc::new(RedpandaClient::new(&config.brokers)?);

    // === 3. Aggregation core ===
    let store = Arc::new(AggregateStore::new());
    let engine = AggregationEngine::new(store.clone()).with_metrics(metrics.clone());
    let router = Router::new(topology.clone(), redpanda.clone()).with_metrics(metrics.clone());

    let ctx = WorkerContext {
        processor: Arc::new(engine),
        router: Arc::new(router),
        policy: config.retry.clone(),
        metrics: Some(metrics.clone()),
        health: Some(health.clone()),
    };

    // === 4. Consumption loops ===
    let pool = WorkerPool::spawn(
        config.workers,
        |_| RedpandaSource::new(&config.brokers, &config.group_id, topology.clone()),
        ctx,
    )?;

    // === 5. Background reporters ===
    let reporters = spawn_reporters(
        store.clone(),
        redpanda.clone(),
        metrics.clone(),
        health.clone(),
        Duration::from_secs(config.snapshot_interval_secs),
    );

    // === 6. Optional demo traffic ===
    if config.demo_orders > 0 {
        let publisher = OrderPublisher::new(redpanda.clone(), config.topic.clone());
        match publisher.send_random_orders(config.demo_orders, None).await {
            Ok(n) => tracing::info!(published = n, "✅ Demo orders published"),
            Err(e) => tracing::error!(error = %e, "Failed to publish demo orders"),
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    pool.shutdown().await;
    reporters.abort();
    log_snapshot(&store);

    tracing::info!("🛑 Order aggregator stopped");
    Ok(())
}

/// Periodically log aggregates and refresh producer health.
fn spawn_reporters(
    store: Arc<AggregateStore>,
    redpanda: Arc<RedpandaClient>,
    metrics: Arc<metrics::Metrics>,
    health: HealthRegistry,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut snapshot_tick = tokio::time::interval(interval);
        let mut health_tick = tokio::time::interval(Duration::from_secs(10));

        loop {
            tokio::select! {
                _ = snapshot_tick.tick() => log_snapshot(&store),
                _ = health_tick.tick() => {
                    let state = redpanda.circuit_state().await;
                    metrics.update_circuit_breaker_state(state);

                    let status = match state {
                        CircuitState::Closed => HealthStatus::Healthy,
                        CircuitState::HalfOpen => HealthStatus::Degraded("Circuit breaker half-open".to_string()),
                        CircuitState::Open => HealthStatus::Unhealthy("Circuit breaker open".to_string()),
                    };
                    health.update("redpanda_producer", status, None).await;
                }
            }
        }
    })
}

fn log_snapshot(store: &AggregateStore) {
    let mut categories: Vec<_> = store.snapshot().into_iter().collect();
    categories.sort_by(|a, b| a.0.cmp(&b.0));

    for (product, agg) in &categories {
        tracing::info!(
            product = %product,
            count = agg.count,
            total = agg.total,
            average = agg.average,
            "Category aggregate"
        );
    }

    if let Some(global) = store.global() {
        tracing::info!(
            categories = categories.len(),
            count = global.count,
            total = global.total,
            average = global.average,
            "Global aggregate"
        );
    }
}
