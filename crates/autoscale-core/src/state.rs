use serde::{Deserialize, Serialize};

use crate::model::ServiceSpec;
use crate::window::{MetricWindow, MetricWindowSnapshot};

/// Per-service autoscaler state: constructed from a `ServiceSpec`, mutated
/// only by the control loop, serialized on checkpoint, re-hydrated on
/// restart. Invariant: `min_replicas <= target_num_replicas <=
/// max_replicas + num_overprovision`.
#[derive(Debug)]
pub struct AutoscalerState {
    pub service_name: String,
    pub spec: ServiceSpec,
    pub target_num_replicas: u32,
    pub latest_version: u64,
    pub latest_version_ever_ready: u64,
    pub metric_window: MetricWindow,
}

impl AutoscalerState {
    pub fn new(service_name: String, spec: ServiceSpec, metric_window: MetricWindow) -> Self {
        let target_num_replicas = spec.min_replicas;
        Self {
            service_name,
            spec,
            target_num_replicas,
            latest_version: 0,
            latest_version_ever_ready: 0,
            metric_window,
        }
    }

    /// §6 checkpoint contract: `{ target_num_replicas, latest_version,
    /// latest_version_ever_ready, dynamic_state }`.
    pub fn dump(&self) -> AutoscalerCheckpoint {
        AutoscalerCheckpoint {
            target_num_replicas: self.target_num_replicas,
            latest_version: self.latest_version,
            latest_version_ever_ready: self.latest_version_ever_ready,
            dynamic_state: DynamicState { metric_window: self.metric_window.dump() },
        }
    }

    /// Round-trip requirement: `load(dump(state))` yields a state
    /// indistinguishable by subsequent decisions given the same inputs.
    pub fn load(service_name: String, spec: ServiceSpec, checkpoint: AutoscalerCheckpoint) -> Self {
        let metric_window = MetricWindow::load(
            spec.autoscaling_metric.as_ref().map(|m| m.window_seconds).unwrap_or(60.0),
            spec.autoscaling_metric
                .as_ref()
                .map(|m| m.window_seconds.max(m.stale_after_seconds))
                .unwrap_or(60.0),
            checkpoint.dynamic_state.metric_window,
        );
        Self {
            service_name,
            spec,
            target_num_replicas: checkpoint.target_num_replicas,
            latest_version: checkpoint.latest_version,
            latest_version_ever_ready: checkpoint.latest_version_ever_ready,
            metric_window,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicState {
    pub metric_window: MetricWindowSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoscalerCheckpoint {
    pub target_num_replicas: u32,
    pub latest_version: u64,
    pub latest_version_ever_ready: u64,
    pub dynamic_state: DynamicState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ServiceSpec;

    fn spec() -> ServiceSpec {
        ServiceSpec {
            min_replicas: 1,
            max_replicas: 5,
            target_qps_per_replica: Some(1.0),
            autoscaling_metric: None,
            num_overprovision: 0,
            base_ondemand_fallback_replicas: 0,
            readiness_path: "/".into(),
            initial_delay_seconds: 0,
            readiness_timeout_seconds: 1,
        }
    }

    #[test]
    fn checkpoint_roundtrip_preserves_fields() {
        let mut state = AutoscalerState::new("svc".into(), spec(), MetricWindow::new(60.0, 60.0));
        state.target_num_replicas = 3;
        state.latest_version = 5;
        state.latest_version_ever_ready = 4;
        state.metric_window.ingest(&[crate::model::MetricSample {
            name: "x".into(),
            value: 1.0,
            timestamp: 10.0,
            source_id: "default".into(),
        }]);

        let checkpoint = state.dump();
        let reloaded = AutoscalerState::load("svc".into(), spec(), checkpoint);

        assert_eq!(reloaded.target_num_replicas, 3);
        assert_eq!(reloaded.latest_version, 5);
        assert_eq!(reloaded.latest_version_ever_ready, 4);
    }
}
