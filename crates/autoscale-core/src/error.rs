use thiserror::Error;

/// Fatal at construction time; never reached once a [`crate::ServiceSpec`]
/// has been validated into an [`crate::Autoscaler`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("target_qps_per_replica and autoscaling_metric are mutually exclusive")]
    ConflictingAutoscalingMode,

    #[error("at least one of target_qps_per_replica or autoscaling_metric must be set")]
    NoAutoscalingModeConfigured,

    #[error("min_replicas ({min}) must be <= max_replicas ({max})")]
    MinExceedsMax { min: u32, max: u32 },

    #[error("target_qps_per_replica must be > 0, got {0}")]
    InvalidQpsTarget(f64),

    #[error("autoscaling_metric.target_per_replica must be > 0, got {0}")]
    InvalidMetricTarget(f64),

    #[error("autoscaling_metric.window_seconds must be > 0, got {0}")]
    InvalidWindowSeconds(f64),

    #[error("autoscaling_metric.stale_after_seconds must be > 0, got {0}")]
    InvalidStaleAfterSeconds(f64),

    #[error("unrecognized metric kind {0:?}")]
    UnknownMetricKind(String),

    #[error("unrecognized aggregation {0:?}")]
    UnknownAggregation(String),
}

/// A single malformed sample rejected at ingestion. Ingestion of the
/// remaining samples in a batch continues; this is surfaced to the caller
/// as a structured warning, not propagated as an error.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("malformed metric sample: {reason}")]
pub struct IngestionWarning {
    pub reason: String,
}

impl IngestionWarning {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}
