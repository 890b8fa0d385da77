use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;
use crate::health::{HealthRegistry, HealthStatus};

/// Start the metrics HTTP server.
/// Needs an actix system; run it on its own thread (see main).
pub async fn start_metrics_server(
    registry: Arc<Registry>,
    health: HealthRegistry,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!("📊 Starting metrics server on http://0.0.0.0:{}/metrics", port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(health.clone()))
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
    })
    .workers(1)
    .disable_signals()
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

async fn metrics_handler(registry: web::Data<Arc<Registry>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(health: web::Data<HealthRegistry>) -> impl Responder {
    let system = health.system_health().await;

    let mut response = match system.overall_status {
        HealthStatus::Unhealthy(_) => HttpResponse::ServiceUnavailable(),
        _ => HttpResponse::Ok(),
    };

    response.json(serde_json::json!({
        "service": "order-aggregator",
        "health": system,
    }))
}
