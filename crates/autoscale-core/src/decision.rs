use serde::{Deserialize, Serialize};

use crate::model::ReplicaInfo;
use crate::state::AutoscalerState;
use crate::target::{Autoscaler, TargetSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoscalerOperator {
    ScaleUp,
    ScaleDown,
}

/// `target` is the `replica_id` for `SCALE_DOWN`, `None` for `SCALE_UP`
/// (the provisioner allocates the id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoscalerDecision {
    pub operator: AutoscalerOperator,
    pub target: Option<u32>,
}

impl AutoscalerDecision {
    pub fn scale_down(replica_id: u32) -> Self {
        Self { operator: AutoscalerOperator::ScaleDown, target: Some(replica_id) }
    }

    pub fn scale_up() -> Self {
        Self { operator: AutoscalerOperator::ScaleUp, target: None }
    }
}

/// Reconciles (desired, replicas, version) into an ordered list of scaling
/// decisions. Pure and CPU-bound: no I/O, no retries. `SCALE_DOWN`
/// decisions always precede `SCALE_UP` decisions in the result.
///
/// Reads `state.metric_window` for the target calculation; takes `state`
/// by `&mut` only to record the newly computed `target_num_replicas`.
pub fn generate_scaling_decisions(
    autoscaler: &Autoscaler,
    state: &mut AutoscalerState,
    replica_infos: &[ReplicaInfo],
    qps_total: Option<f64>,
    strict_max_capacity: bool,
    now: f64,
) -> Vec<AutoscalerDecision> {
    let effective_cap = state.spec.effective_cap();

    let signal = autoscaler.calculate_target_num_replicas(state, &state.metric_window, qps_total, now);
    let target = match signal {
        TargetSignal::Fresh(v) => {
            v.saturating_add(state.spec.num_overprovision).clamp(state.spec.min_replicas, effective_cap)
        }
        TargetSignal::FailStatic(v) => v.clamp(state.spec.min_replicas, effective_cap),
    };
    state.target_num_replicas = target;

    let rolling_gate_open = state.latest_version_ever_ready == state.latest_version;
    let latest_version = state.latest_version;

    let mut decisions = Vec::new();
    let mut alive: Vec<&ReplicaInfo> = Vec::new();
    for r in replica_infos {
        if r.is_terminal {
            decisions.push(AutoscalerDecision::scale_down(r.replica_id));
        } else {
            alive.push(r);
        }
    }
    let alive_count = alive.len() as u32;

    let mut excess_removed = 0u32;
    if alive_count > target {
        // Rolling-update gate: old replicas aren't pruning candidates until
        // a replica of the latest version has ever reached READY.
        let mut excess: Vec<&ReplicaInfo> = alive
            .iter()
            .copied()
            .filter(|r| rolling_gate_open || r.version >= latest_version)
            .collect();
        excess.sort_by(|a, b| {
            (a.is_ready as u8)
                .cmp(&(b.is_ready as u8))
                .then(a.version.cmp(&b.version))
                .then(b.replica_id.cmp(&a.replica_id))
        });
        let to_remove = (alive_count - target) as usize;
        for r in excess.into_iter().take(to_remove) {
            decisions.push(AutoscalerDecision::scale_down(r.replica_id));
            excess_removed += 1;
        }
    }

    let alive_after_downs = alive_count - excess_removed;
    let deficit = target.saturating_sub(alive_after_downs);
    for _ in 0..deficit {
        decisions.push(AutoscalerDecision::scale_up());
    }

    // Legacy behaviour when `strict_max_capacity` is false: the deficit
    // above may already exceed the cap; the provisioner clamps if needed.
    clamp_scale_ups_to_capacity(decisions, replica_infos, effective_cap, strict_max_capacity)
}

/// Generic safety net applied after decisions are produced, regardless of
/// how they were generated: under `strict_max_capacity`, scale-ups beyond
/// `effective_cap - alive_count` are dropped; scale-downs are always kept.
fn clamp_scale_ups_to_capacity(
    decisions: Vec<AutoscalerDecision>,
    replica_infos: &[ReplicaInfo],
    effective_cap: u32,
    strict_max_capacity: bool,
) -> Vec<AutoscalerDecision> {
    if !strict_max_capacity {
        return decisions;
    }
    let alive_count = replica_infos.iter().filter(|r| !r.is_terminal).count() as u32;
    let room = effective_cap.saturating_sub(alive_count);

    let mut out = Vec::with_capacity(decisions.len());
    let mut kept_scale_ups = 0u32;
    for d in decisions {
        match d.operator {
            AutoscalerOperator::ScaleDown => out.push(d),
            AutoscalerOperator::ScaleUp => {
                if kept_scale_ups < room {
                    kept_scale_ups += 1;
                    out.push(d);
                }
            }
        }
    }
    out
}
