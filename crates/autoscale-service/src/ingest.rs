use std::sync::atomic::Ordering;

use autoscale_core::model::RawMetricSample;
use autoscale_core::parse_batch;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::registry::ServiceRegistry;

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub rejected: usize,
    pub warnings: Vec<String>,
}

/// POST /services/:name/metrics — §6 metric ingestion endpoint. Accepts a
/// batch of raw samples, admits what it can, and reports per-sample
/// rejection reasons rather than failing the whole request.
pub async fn ingest_metrics(
    Path(service_name): Path<String>,
    State(registry): State<ServiceRegistry>,
    Json(raw): Json<Vec<RawMetricSample>>,
) -> Result<Json<IngestResponse>, StatusCode> {
    let runtime = registry.get(&service_name).ok_or(StatusCode::NOT_FOUND)?;

    let (samples, warnings) = parse_batch(raw);
    registry.metrics.ingest_samples_total.fetch_add(samples.len() as u64, Ordering::Relaxed);
    registry.metrics.ingest_rejected_total.fetch_add(warnings.len() as u64, Ordering::Relaxed);

    let state = runtime.state.lock().unwrap();
    state.metric_window.ingest(&samples);

    Ok(Json(IngestResponse {
        accepted: samples.len(),
        rejected: warnings.len(),
        warnings: warnings.into_iter().map(|w| w.reason).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct QpsReport {
    pub qps_total: f64,
}

/// PUT /services/:name/qps — reports the current total request rate, as
/// observed by an external request aggregator. Only consumed by the
/// `Qps` autoscaler variant.
pub async fn report_qps(
    Path(service_name): Path<String>,
    State(registry): State<ServiceRegistry>,
    Json(report): Json<QpsReport>,
) -> Result<StatusCode, StatusCode> {
    let runtime = registry.get(&service_name).ok_or(StatusCode::NOT_FOUND)?;
    runtime.qps.set(report.qps_total);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ReplicaInfosReport {
    pub replicas: Vec<autoscale_core::ReplicaInfo>,
}

/// PUT /services/:name/replicas — reports the current replica snapshot
/// owned by the external provisioner. Replaces the previous snapshot in
/// full; the decision generator only ever reads the latest report.
pub async fn report_replicas(
    Path(service_name): Path<String>,
    State(registry): State<ServiceRegistry>,
    Json(report): Json<ReplicaInfosReport>,
) -> Result<StatusCode, StatusCode> {
    let runtime = registry.get(&service_name).ok_or(StatusCode::NOT_FOUND)?;
    *runtime.replica_infos.lock().unwrap() = report.replicas;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /services/:name/decisions — the decision list from the most
/// recently completed control-loop tick.
pub async fn get_decisions(
    Path(service_name): Path<String>,
    State(registry): State<ServiceRegistry>,
) -> Result<Json<Vec<autoscale_core::AutoscalerDecision>>, StatusCode> {
    let runtime = registry.get(&service_name).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(runtime.last_decisions.lock().unwrap().clone()))
}

/// GET /services/:name/checkpoint — dumps the serializable state
/// snapshot for persistence by the caller.
pub async fn get_checkpoint(
    Path(service_name): Path<String>,
    State(registry): State<ServiceRegistry>,
) -> Result<Json<autoscale_core::AutoscalerCheckpoint>, StatusCode> {
    let runtime = registry.get(&service_name).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(runtime.state.lock().unwrap().dump()))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub spec: autoscale_core::ServiceSpec,
}

/// POST /services/:name — registers (or replaces) a service's
/// autoscaling policy. Rejects an invalid spec outright.
pub async fn register_service(
    Path(service_name): Path<String>,
    State(registry): State<ServiceRegistry>,
    Json(req): Json<RegisterRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    req.spec.validate().map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    registry.register(service_name, req.spec);
    Ok(StatusCode::CREATED)
}
