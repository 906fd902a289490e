use crate::model::{MetricSpec, ServiceSpec};
use crate::state::AutoscalerState;
use crate::window::MetricWindow;

/// Opaque external collaborator supplying the request-rate signal
/// consumed by [`AutoscalerVariant::Qps`]. The autoscaler calls this once
/// per tick and never interprets it further.
///
/// `None` means no QPS has ever been observed, distinct from an observed
/// rate of zero.
pub trait RequestAggregatorInfo {
    fn get_qps_total(&self) -> Option<f64>;
}

/// A target freshly computed this tick (overprovision is still to be
/// applied by the decision generator) versus one held over unchanged
/// because the input signal was stale or absent (fail-static; already
/// final, overprovision was baked in on the tick that produced it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSignal {
    Fresh(u32),
    FailStatic(u32),
}

impl TargetSignal {
    pub fn value(self) -> u32 {
        match self {
            Self::Fresh(v) | Self::FailStatic(v) => v,
        }
    }
}

/// Variant-polymorphic target calculator, selected once at construction
/// from the [`ServiceSpec`] and never re-dispatched afterwards.
#[derive(Debug, Clone)]
pub enum AutoscalerVariant {
    Qps,
    External(MetricSpec),
    FallbackExternal { metric: MetricSpec, floor: u32 },
}

/// The active target-calculator variant for one service, paired with its
/// [`ServiceSpec`] for bounds.
#[derive(Debug, Clone)]
pub struct Autoscaler {
    variant: AutoscalerVariant,
}

impl Autoscaler {
    /// Selects the variant implied by `spec`. `spec` must already be
    /// validated (see [`ServiceSpec::validate`]) — this never fails.
    pub fn from_spec(spec: &ServiceSpec) -> Self {
        let variant = match &spec.autoscaling_metric {
            Some(metric) if spec.base_ondemand_fallback_replicas > 0 => {
                AutoscalerVariant::FallbackExternal {
                    metric: metric.clone(),
                    floor: spec.base_ondemand_fallback_replicas,
                }
            }
            Some(metric) => AutoscalerVariant::External(metric.clone()),
            None => AutoscalerVariant::Qps,
        };
        Self { variant }
    }

    pub fn variant(&self) -> &AutoscalerVariant {
        &self.variant
    }

    /// Whether this variant consumes the metric window at all (QPS relies
    /// solely on the request aggregator).
    pub fn uses_metric_window(&self) -> bool {
        !matches!(self.variant, AutoscalerVariant::Qps)
    }

    /// Per §4.2: deterministic for identical (window contents, now, spec).
    pub fn calculate_target_num_replicas(
        &self,
        state: &AutoscalerState,
        window: &MetricWindow,
        qps_total: Option<f64>,
        now: f64,
    ) -> TargetSignal {
        match &self.variant {
            AutoscalerVariant::Qps => Self::qps_target(&state.spec, qps_total),
            AutoscalerVariant::External(metric) => Self::external_target(metric, state, window, now),
            AutoscalerVariant::FallbackExternal { metric, floor } => {
                match Self::external_target(metric, state, window, now) {
                    TargetSignal::Fresh(v) => TargetSignal::Fresh(v.max(*floor)),
                    TargetSignal::FailStatic(v) => TargetSignal::FailStatic(v.max(*floor)),
                }
            }
        }
    }

    fn qps_target(spec: &ServiceSpec, qps_total: Option<f64>) -> TargetSignal {
        let Some(qps) = qps_total else {
            return TargetSignal::Fresh(spec.min_replicas);
        };
        let target_per_replica = spec
            .target_qps_per_replica
            .expect("QPS variant requires target_qps_per_replica");
        let raw = (qps.max(0.0) / target_per_replica).ceil() as u32;
        TargetSignal::Fresh(raw.clamp(spec.min_replicas, spec.max_replicas))
    }

    fn external_target(
        metric: &MetricSpec,
        state: &AutoscalerState,
        window: &MetricWindow,
        now: f64,
    ) -> TargetSignal {
        if window.is_stale(metric, now) {
            return TargetSignal::FailStatic(state.target_num_replicas);
        }
        match window.aggregate(metric, now) {
            None => TargetSignal::FailStatic(state.target_num_replicas),
            Some(v) => {
                let raw = (v.max(0.0) / metric.target_per_replica).ceil() as u32;
                TargetSignal::Fresh(raw.clamp(state.spec.min_replicas, state.spec.max_replicas))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Aggregation, MetricKind};

    fn base_spec(min: u32, max: u32) -> ServiceSpec {
        ServiceSpec {
            min_replicas: min,
            max_replicas: max,
            target_qps_per_replica: Some(1.0),
            autoscaling_metric: None,
            num_overprovision: 0,
            base_ondemand_fallback_replicas: 0,
            readiness_path: "/".into(),
            initial_delay_seconds: 0,
            readiness_timeout_seconds: 1,
        }
    }

    fn metric_spec() -> MetricSpec {
        MetricSpec {
            name: "concurrent_users".into(),
            target_per_replica: 5.0,
            kind: MetricKind::Gauge,
            aggregation: Aggregation::Max,
            window_seconds: 60.0,
            stale_after_seconds: 180.0,
        }
    }

    #[test]
    fn qps_never_observed_returns_min() {
        let spec = base_spec(0, 3);
        let state = AutoscalerState::new("svc".into(), spec, MetricWindow::new(60.0, 60.0));
        let autoscaler = Autoscaler::from_spec(&state.spec);
        let signal = autoscaler.calculate_target_num_replicas(&state, &state.metric_window, None, 0.0);
        assert_eq!(signal, TargetSignal::Fresh(0));
    }

    #[test]
    fn qps_below_target_clamps_to_max() {
        let mut spec = base_spec(0, 3);
        spec.target_qps_per_replica = Some(1.0);
        let state = AutoscalerState::new("svc".into(), spec, MetricWindow::new(60.0, 60.0));
        let autoscaler = Autoscaler::from_spec(&state.spec);
        let signal = autoscaler.calculate_target_num_replicas(&state, &state.metric_window, Some(2.5), 0.0);
        assert_eq!(signal, TargetSignal::Fresh(3));
    }

    #[test]
    fn external_gauge_max_single_source() {
        let mut spec = base_spec(1, 10);
        spec.target_qps_per_replica = None;
        spec.autoscaling_metric = Some(metric_spec());
        let window = MetricWindow::new(60.0, 180.0);
        let now = 1_000.0;
        window.ingest(&[
            crate::model::MetricSample { name: "concurrent_users".into(), value: 4.0, timestamp: now - 5.0, source_id: "default".into() },
            crate::model::MetricSample { name: "concurrent_users".into(), value: 11.0, timestamp: now - 2.0, source_id: "default".into() },
        ]);
        let state = AutoscalerState::new("svc".into(), spec, window);
        let autoscaler = Autoscaler::from_spec(&state.spec);
        let signal = autoscaler.calculate_target_num_replicas(&state, &state.metric_window, None, now);
        assert_eq!(signal, TargetSignal::Fresh(3));
    }

    #[test]
    fn external_fail_static_on_stale_metrics() {
        let mut spec = base_spec(1, 5);
        spec.target_qps_per_replica = None;
        let mut metric = metric_spec();
        metric.stale_after_seconds = 10.0;
        spec.autoscaling_metric = Some(metric.clone());
        let window = MetricWindow::new(60.0, 180.0);
        let now = 1_000.0;
        window.ingest(&[crate::model::MetricSample {
            name: "concurrent_users".into(),
            value: 100.0,
            timestamp: now - 20.0,
            source_id: "default".into(),
        }]);
        let mut state = AutoscalerState::new("svc".into(), spec, window);
        state.target_num_replicas = 3;
        let autoscaler = Autoscaler::from_spec(&state.spec);
        let signal = autoscaler.calculate_target_num_replicas(&state, &state.metric_window, None, now);
        assert_eq!(signal, TargetSignal::FailStatic(3));
    }

    #[test]
    fn fallback_raises_floor_even_when_stale() {
        let mut spec = base_spec(0, 10);
        spec.target_qps_per_replica = None;
        let mut metric = metric_spec();
        metric.stale_after_seconds = 10.0;
        spec.autoscaling_metric = Some(metric);
        spec.base_ondemand_fallback_replicas = 2;
        let window = MetricWindow::new(60.0, 180.0);
        let mut state = AutoscalerState::new("svc".into(), spec, window);
        state.target_num_replicas = 0;
        let autoscaler = Autoscaler::from_spec(&state.spec);
        let signal = autoscaler.calculate_target_num_replicas(&state, &state.metric_window, None, 1_000.0);
        assert_eq!(signal, TargetSignal::FailStatic(2));
    }
}
