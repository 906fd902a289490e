use std::sync::atomic::{AtomicU64, Ordering};

use autoscale_core::{AutoscalerDecision, AutoscalerOperator};
use axum::extract::State;
use axum::response::IntoResponse;

use crate::registry::ServiceRegistry;

/// Shared metrics for the service, safe for concurrent access.
#[derive(Debug, Default)]
pub struct SharedMetrics {
    pub tick_total: AtomicU64,
    pub tick_errors: AtomicU64,
    pub ingest_samples_total: AtomicU64,
    pub ingest_rejected_total: AtomicU64,
    pub scale_up_total: AtomicU64,
    pub scale_down_total: AtomicU64,
}

impl SharedMetrics {
    pub fn record_decisions(&self, decisions: &[AutoscalerDecision]) {
        for d in decisions {
            match d.operator {
                AutoscalerOperator::ScaleUp => {
                    self.scale_up_total.fetch_add(1, Ordering::Relaxed);
                }
                AutoscalerOperator::ScaleDown => {
                    self.scale_down_total.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

/// GET /metrics — Prometheus text exposition format.
pub async fn metrics_handler(State(registry): State<ServiceRegistry>) -> impl IntoResponse {
    let m = &registry.metrics;
    let body = format!(
        "# HELP autoscale_tick_total Total control loop iterations.\n\
         # TYPE autoscale_tick_total counter\n\
         autoscale_tick_total {}\n\
         # HELP autoscale_tick_errors Total control loop errors.\n\
         # TYPE autoscale_tick_errors counter\n\
         autoscale_tick_errors {}\n\
         # HELP autoscale_ingest_samples_total Metric samples admitted.\n\
         # TYPE autoscale_ingest_samples_total counter\n\
         autoscale_ingest_samples_total {}\n\
         # HELP autoscale_ingest_rejected_total Metric samples rejected as malformed.\n\
         # TYPE autoscale_ingest_rejected_total counter\n\
         autoscale_ingest_rejected_total {}\n\
         # HELP autoscale_scale_up_total SCALE_UP decisions emitted.\n\
         # TYPE autoscale_scale_up_total counter\n\
         autoscale_scale_up_total {}\n\
         # HELP autoscale_scale_down_total SCALE_DOWN decisions emitted.\n\
         # TYPE autoscale_scale_down_total counter\n\
         autoscale_scale_down_total {}\n\
         # HELP autoscale_services_total Services currently registered.\n\
         # TYPE autoscale_services_total gauge\n\
         autoscale_services_total {}\n",
        m.tick_total.load(Ordering::Relaxed),
        m.tick_errors.load(Ordering::Relaxed),
        m.ingest_samples_total.load(Ordering::Relaxed),
        m.ingest_rejected_total.load(Ordering::Relaxed),
        m.scale_up_total.load(Ordering::Relaxed),
        m.scale_down_total.load(Ordering::Relaxed),
        registry.len(),
    );
    (axum::http::StatusCode::OK, body)
}

pub async fn healthz_handler() -> impl IntoResponse {
    (axum::http::StatusCode::OK, "ok")
}
