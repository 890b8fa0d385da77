use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

// ============================================================================
// Health Tracking
// ============================================================================
//
// Workers and the producer report their state here; /health rolls it up.
// Any unhealthy component makes the whole service unhealthy, any degraded
// one makes it degraded.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    #[cfg(test)]
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn update(&self, component: impl Into<String>, status: HealthStatus, details: Option<String>) {
        let name = component.into();

        tracing::debug!(
            component = %name,
            status = ?status,
            "Updated component health"
        );

        let health = ComponentHealth {
            name: name.clone(),
            status,
            last_check: Utc::now(),
            details,
        };
        self.components.write().await.insert(name, health);
    }

    pub async fn system_health(&self) -> SystemHealth {
        let components = self.components.read().await.clone();

        SystemHealth {
            overall_status: Self::overall(&components),
            components,
            check_time: Utc::now(),
        }
    }

    fn overall(components: &HashMap<String, ComponentHealth>) -> HealthStatus {
        let mut unhealthy: Vec<String> = components
            .values()
            .filter_map(|c| match &c.status {
                HealthStatus::Unhealthy(msg) => Some(format!("{}: {}", c.name, msg)),
                _ => None,
            })
            .collect();
        unhealthy.sort();

        if !unhealthy.is_empty() {
            HealthStatus::Unhealthy(unhealthy.join(", "))
        } else if components.values().any(|c| matches!(c.status, HealthStatus::Degraded(_))) {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }
}
