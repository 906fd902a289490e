pub mod decision;
pub mod error;
pub mod model;
pub mod state;
pub mod target;
pub mod window;

pub use decision::{generate_scaling_decisions, AutoscalerDecision, AutoscalerOperator};
pub use error::{ConfigError, IngestionWarning};
pub use model::{
    parse_batch, Aggregation, MetricKind, MetricSample, MetricSpec, RawMetricSample, ReplicaInfo,
    ReplicaStatus, ServiceSpec,
};
pub use state::{AutoscalerCheckpoint, AutoscalerState, DynamicState};
pub use target::{Autoscaler, AutoscalerVariant, RequestAggregatorInfo, TargetSignal};
pub use window::{MetricWindow, MetricWindowSnapshot};
