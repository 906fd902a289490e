use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, IngestionWarning};

/// One telemetry observation for a named metric from a given source.
///
/// `source_id` is always populated once a sample is admitted — the legacy
/// `proxy_id` alias and the `"default"` fallback are resolved at the
/// ingestion boundary, never carried past it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub timestamp: f64,
    pub source_id: String,
}

/// Wire-format payload for `§6`'s metric ingestion endpoint: every field is
/// optional so a batch can be validated sample-by-sample rather than
/// failing the whole request on one malformed entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMetricSample {
    pub name: Option<String>,
    pub value: Option<serde_json::Value>,
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub proxy_id: Option<String>,
}

impl RawMetricSample {
    /// Normalizes `source_id` (falling back to the legacy `proxy_id`, then
    /// `"default"`) and validates required fields, producing either an
    /// admitted sample or a rejection reason.
    pub fn into_sample(self) -> Result<MetricSample, IngestionWarning> {
        let name = self
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| IngestionWarning::new("missing name"))?;
        let timestamp = self
            .timestamp
            .ok_or_else(|| IngestionWarning::new("missing timestamp"))?;
        let value = self
            .value
            .ok_or_else(|| IngestionWarning::new("missing value"))?
            .as_f64()
            .ok_or_else(|| IngestionWarning::new("value is not numeric"))?;
        let source_id = self
            .source_id
            .or(self.proxy_id)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "default".to_string());

        Ok(MetricSample { name, value, timestamp, source_id })
    }
}

/// Parses a batch of raw samples, rejecting malformed entries individually
/// and continuing with the rest. Never fails the whole batch.
pub fn parse_batch(raw: Vec<RawMetricSample>) -> (Vec<MetricSample>, Vec<IngestionWarning>) {
    let mut samples = Vec::with_capacity(raw.len());
    let mut warnings = Vec::new();
    for r in raw {
        match r.into_sample() {
            Ok(s) => samples.push(s),
            Err(w) => warnings.push(w),
        }
    }
    (samples, warnings)
}

/// `kind=rate` treats values as a cumulative counter; `kind=gauge` as an
/// instantaneous reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Rate,
}

impl MetricKind {
    fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "gauge" => Ok(Self::Gauge),
            "rate" => Ok(Self::Rate),
            other => Err(ConfigError::UnknownMetricKind(other.to_string())),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Rate => "rate",
        }
    }
}

impl Serialize for MetricKind {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MetricKind {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Cross-source combination applied after each source's own gauge/rate
/// reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Avg,
    Max,
    Min,
    Latest,
}

impl Aggregation {
    fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "avg" => Ok(Self::Avg),
            "max" => Ok(Self::Max),
            "min" => Ok(Self::Min),
            "latest" => Ok(Self::Latest),
            other => Err(ConfigError::UnknownAggregation(other.to_string())),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Max => "max",
            Self::Min => "min",
            Self::Latest => "latest",
        }
    }
}

impl Serialize for Aggregation {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Aggregation {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Configuration for the external-metric target calculator. Enum fields
/// are case-insensitive on input, always emitted lower-cased.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    pub target_per_replica: f64,
    pub kind: MetricKind,
    pub aggregation: Aggregation,
    pub window_seconds: f64,
    pub stale_after_seconds: f64,
}

impl MetricSpec {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.target_per_replica > 0.0) {
            return Err(ConfigError::InvalidMetricTarget(self.target_per_replica));
        }
        if !(self.window_seconds > 0.0) {
            return Err(ConfigError::InvalidWindowSeconds(self.window_seconds));
        }
        if !(self.stale_after_seconds > 0.0) {
            return Err(ConfigError::InvalidStaleAfterSeconds(self.stale_after_seconds));
        }
        Ok(())
    }
}

/// Per-service autoscaling policy. `target_qps_per_replica` and
/// `autoscaling_metric` are mutually exclusive — exactly one selects the
/// active [`crate::Autoscaler`] variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub min_replicas: u32,
    pub max_replicas: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_qps_per_replica: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling_metric: Option<MetricSpec>,
    #[serde(default)]
    pub num_overprovision: u32,
    #[serde(default)]
    pub base_ondemand_fallback_replicas: u32,
    pub readiness_path: String,
    pub initial_delay_seconds: u64,
    pub readiness_timeout_seconds: u64,
}

impl ServiceSpec {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_replicas > self.max_replicas {
            return Err(ConfigError::MinExceedsMax { min: self.min_replicas, max: self.max_replicas });
        }
        match (self.target_qps_per_replica, &self.autoscaling_metric) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingAutoscalingMode),
            (None, None) => return Err(ConfigError::NoAutoscalingModeConfigured),
            (Some(q), None) => {
                if !(q > 0.0) {
                    return Err(ConfigError::InvalidQpsTarget(q));
                }
            }
            (None, Some(metric)) => metric.validate()?,
        }
        Ok(())
    }

    /// Effective cap on alive replicas: `max_replicas + num_overprovision`.
    pub fn effective_cap(&self) -> u32 {
        self.max_replicas.saturating_add(self.num_overprovision)
    }
}

/// Lifecycle states a replica passes through, observed (never driven) by
/// the decision generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaStatus {
    Provisioning,
    Starting,
    Ready,
    NotReady,
    ShuttingDown,
    Failed,
}

/// Read-only snapshot of one replica, as consumed by the decision
/// generator. Owned and mutated by the external provisioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaInfo {
    pub replica_id: u32,
    pub version: u64,
    pub status: ReplicaStatus,
    pub is_ready: bool,
    pub is_terminal: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_sample_aliases_proxy_id() {
        let raw = RawMetricSample {
            name: Some("qps".into()),
            value: Some(serde_json::json!(1.5)),
            timestamp: Some(10.0),
            source_id: None,
            proxy_id: Some("proxy-1".into()),
        };
        let sample = raw.into_sample().unwrap();
        assert_eq!(sample.source_id, "proxy-1");
    }

    #[test]
    fn raw_sample_defaults_source_id() {
        let raw = RawMetricSample {
            name: Some("qps".into()),
            value: Some(serde_json::json!(1.5)),
            timestamp: Some(10.0),
            source_id: None,
            proxy_id: None,
        };
        assert_eq!(raw.into_sample().unwrap().source_id, "default");
    }

    #[test]
    fn raw_sample_rejects_missing_timestamp() {
        let raw = RawMetricSample {
            name: Some("qps".into()),
            value: Some(serde_json::json!(1.5)),
            timestamp: None,
            source_id: None,
            proxy_id: None,
        };
        assert!(raw.into_sample().is_err());
    }

    #[test]
    fn raw_sample_rejects_non_numeric_value() {
        let raw = RawMetricSample {
            name: Some("qps".into()),
            value: Some(serde_json::json!("oops")),
            timestamp: Some(1.0),
            source_id: None,
            proxy_id: None,
        };
        assert!(raw.into_sample().is_err());
    }

    #[test]
    fn parse_batch_continues_past_bad_samples() {
        let raw = vec![
            RawMetricSample {
                name: Some("qps".into()),
                value: Some(serde_json::json!(1.0)),
                timestamp: Some(1.0),
                source_id: None,
                proxy_id: None,
            },
            RawMetricSample { name: None, value: None, timestamp: None, source_id: None, proxy_id: None },
        ];
        let (samples, warnings) = parse_batch(raw);
        assert_eq!(samples.len(), 1);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn service_spec_rejects_conflicting_modes() {
        let spec = ServiceSpec {
            min_replicas: 0,
            max_replicas: 3,
            target_qps_per_replica: Some(1.0),
            autoscaling_metric: Some(MetricSpec {
                name: "x".into(),
                target_per_replica: 1.0,
                kind: MetricKind::Gauge,
                aggregation: Aggregation::Sum,
                window_seconds: 60.0,
                stale_after_seconds: 60.0,
            }),
            num_overprovision: 0,
            base_ondemand_fallback_replicas: 0,
            readiness_path: "/".into(),
            initial_delay_seconds: 0,
            readiness_timeout_seconds: 1,
        };
        assert_eq!(spec.validate(), Err(ConfigError::ConflictingAutoscalingMode));
    }

    #[test]
    fn metric_kind_case_insensitive_roundtrip() {
        let v: MetricKind = serde_json::from_str("\"GAUGE\"").unwrap();
        assert_eq!(v, MetricKind::Gauge);
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"gauge\"");
    }
}
