mod args;
mod ingest;
mod metrics;
mod registry;
mod telemetry;

use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use axum::routing::{get, post, put};
use axum::Router;
use clap::Parser;
use tracing::{debug, info, warn};

use crate::args::Args;
use crate::ingest::{
    get_checkpoint, get_decisions, ingest_metrics, register_service, report_qps, report_replicas,
};
use crate::metrics::{healthz_handler, metrics_handler};
use crate::registry::ServiceRegistry;

fn unix_now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init_tracing(&args.log_format);
    info!("autoscale-service starting...");

    let registry = ServiceRegistry::new();

    let control_registry = registry.clone();
    let strict_max_capacity = args.strict_max_capacity;
    let tick_interval = Duration::from_secs(args.tick_interval_secs);
    tokio::spawn(async move {
        control_loop(control_registry, strict_max_capacity, tick_interval).await;
    });

    let app = Router::new()
        .route("/services/:name", post(register_service))
        .route("/services/:name/metrics", post(ingest_metrics))
        .route("/services/:name/qps", put(report_qps))
        .route("/services/:name/replicas", put(report_replicas))
        .route("/services/:name/decisions", get(get_decisions))
        .route("/services/:name/checkpoint", get(get_checkpoint))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(registry);

    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    info!("listening on {}", args.listen_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Ticks every registered service on a fixed interval. One service's
/// decision generation never blocks another's.
async fn control_loop(registry: ServiceRegistry, strict_max_capacity: bool, tick_interval: Duration) {
    let mut interval = tokio::time::interval(tick_interval);
    loop {
        interval.tick().await;
        let now = unix_now();
        for name in registry.iter_names() {
            let Some(runtime) = registry.get(&name) else { continue };
            registry.metrics.tick_total.fetch_add(1, Ordering::Relaxed);
            let decisions = runtime.tick(strict_max_capacity, now);
            registry.metrics.record_decisions(&decisions);
            if decisions.is_empty() {
                debug!(service = %name, "tick produced no decisions");
            } else {
                info!(service = %name, count = decisions.len(), "tick produced decisions");
            }
        }
        if registry.len() == 0 {
            warn!("control loop tick with no registered services");
        }
    }
}
