use std::sync::{Arc, Mutex};

use autoscale_core::{
    generate_scaling_decisions, Autoscaler, AutoscalerDecision, AutoscalerState, MetricWindow,
    ReplicaInfo, RequestAggregatorInfo, ServiceSpec,
};
use dashmap::DashMap;

use crate::metrics::SharedMetrics;

/// Request-rate aggregator fed by `PUT /services/:name/qps`. Holds the
/// latest externally-reported total, distinct from "never observed".
#[derive(Debug, Default)]
pub struct QpsAggregator {
    total: Mutex<Option<f64>>,
}

impl QpsAggregator {
    pub fn set(&self, value: f64) {
        *self.total.lock().unwrap() = Some(value);
    }
}

impl RequestAggregatorInfo for QpsAggregator {
    fn get_qps_total(&self) -> Option<f64> {
        *self.total.lock().unwrap()
    }
}

/// Everything one running service needs across ticks: its target
/// calculator, mutable state, last-reported replica snapshot, the QPS
/// aggregator (if the variant reads one), and the most recent decisions.
pub struct ServiceRuntime {
    pub autoscaler: Autoscaler,
    pub state: Mutex<AutoscalerState>,
    pub replica_infos: Mutex<Vec<ReplicaInfo>>,
    pub qps: QpsAggregator,
    pub last_decisions: Mutex<Vec<AutoscalerDecision>>,
}

impl ServiceRuntime {
    pub fn new(service_name: String, spec: ServiceSpec) -> Self {
        let window = spec
            .autoscaling_metric
            .as_ref()
            .map(MetricWindow::from_spec)
            .unwrap_or_else(|| MetricWindow::new(60.0, 60.0));
        let autoscaler = Autoscaler::from_spec(&spec);
        let state = AutoscalerState::new(service_name, spec, window);
        Self {
            autoscaler,
            state: Mutex::new(state),
            replica_infos: Mutex::new(Vec::new()),
            qps: QpsAggregator::default(),
            last_decisions: Mutex::new(Vec::new()),
        }
    }

    /// Runs one control-loop tick: prunes the window, recomputes the
    /// target, and produces the ordered decision list for this tick.
    pub fn tick(&self, strict_max_capacity: bool, now: f64) -> Vec<AutoscalerDecision> {
        let mut state = self.state.lock().unwrap();
        state.metric_window.prune(now);
        let replica_infos = self.replica_infos.lock().unwrap().clone();
        let qps_total = self.qps.get_qps_total();

        let decisions = generate_scaling_decisions(
            &self.autoscaler,
            &mut state,
            &replica_infos,
            qps_total,
            strict_max_capacity,
            now,
        );
        *self.last_decisions.lock().unwrap() = decisions.clone();
        decisions
    }
}

struct RegistryInner {
    services: DashMap<String, Arc<ServiceRuntime>>,
}

/// Multi-service registry keyed by service name. Cheap to clone: shares
/// the underlying `DashMap` and metrics via an `Arc`.
#[derive(Clone)]
pub struct ServiceRegistry {
    inner: Arc<RegistryInner>,
    pub metrics: Arc<SharedMetrics>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner { services: DashMap::new() }),
            metrics: Arc::new(SharedMetrics::default()),
        }
    }

    pub fn register(&self, service_name: String, spec: ServiceSpec) -> Arc<ServiceRuntime> {
        let runtime = Arc::new(ServiceRuntime::new(service_name.clone(), spec));
        self.inner.services.insert(service_name, runtime.clone());
        runtime
    }

    pub fn get(&self, service_name: &str) -> Option<Arc<ServiceRuntime>> {
        self.inner.services.get(service_name).map(|e| e.value().clone())
    }

    pub fn remove(&self, service_name: &str) -> Option<Arc<ServiceRuntime>> {
        self.inner.services.remove(service_name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.inner.services.len()
    }

    pub fn iter_names(&self) -> Vec<String> {
        self.inner.services.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
