use std::str::FromStr;
use std::time::Duration;
use serde::Deserialize;
use crate::messaging::Topology;
use crate::utils::RetryPolicy;

// ============================================================================
// Configuration
// ============================================================================
//
// Everything has a default that matches a local single-broker setup; each
// field can be overridden with an ORDERS_* environment variable.
//
// ============================================================================

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub brokers: String,
    pub group_id: String,
    pub topic: String,
    pub retry_topic: String,
    pub dlq_topic: String,
    /// Independent consumption loops; matches the partition count by default
    pub workers: usize,
    pub retry: RetryPolicy,
    pub metrics_port: u16,
    pub snapshot_interval_secs: u64,
    /// Random orders to publish at startup (0 = none)
    pub demo_orders: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            brokers: "127.0.0.1:9092".to_string(),
            group_id: "order-aggregator".to_string(),
            topic: "orders".to_string(),
            retry_topic: "orders-retry".to_string(),
            dlq_topic: "orders-dlq".to_string(),
            workers: 3,
            retry: RetryPolicy::default(),
            metrics_port: 9090,
            snapshot_interval_secs: 30,
            demo_orders: 0,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            brokers: lookup("ORDERS_BROKERS").unwrap_or(defaults.brokers),
            group_id: lookup("ORDERS_GROUP_ID").unwrap_or(defaults.group_id),
            topic: lookup("ORDERS_TOPIC").unwrap_or(defaults.topic),
            retry_topic: lookup("ORDERS_RETRY_TOPIC").unwrap_or(defaults.retry_topic),
            dlq_topic: lookup("ORDERS_DLQ_TOPIC").unwrap_or(defaults.dlq_topic),
            workers: parse(&lookup, "ORDERS_WORKERS", defaults.workers)?,
            retry: RetryPolicy {
                max_attempts: parse(&lookup, "ORDERS_RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
                delay: Duration::from_millis(parse(
                    &lookup,
                    "ORDERS_RETRY_DELAY_MS",
                    defaults.retry.delay.as_millis() as u64,
                )?),
            },
            metrics_port: parse(&lookup, "ORDERS_METRICS_PORT", defaults.metrics_port)?,
            snapshot_interval_secs: parse(
                &lookup,
                "ORDERS_SNAPSHOT_INTERVAL_SECS",
                defaults.snapshot_interval_secs,
            )?,
            demo_orders: parse(&lookup, "ORDERS_DEMO_ORDERS", defaults.demo_orders)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Zero("ORDERS_WORKERS"));
        }
        if self.snapshot_interval_secs == 0 {
            return Err(ConfigError::Zero("ORDERS_SNAPSHOT_INTERVAL_SECS"));
        }
        Ok(())
    }

    pub fn topology(&self) -> Topology {
        Topology::new(&self.topic, &self.retry_topic, &self.dlq_topic)
    }
}

fn parse<T, L>(lookup: &L, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}
