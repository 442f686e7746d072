//! Resolved, immutable configuration produced by the resolver.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::export::ExportConfig;
use super::settings::SettingsConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClockConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock: Option<ClockConfig>,
    /// Set only when `clock` came from a clock instance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock_ref: Option<String>,
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformConfig {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValueConfig {
    pub source: SourceConfig,
    /// Set only when `source` came from a source instance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    /// Overrides the source clock for this value only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock: Option<ClockConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock_ref: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<TransformConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset: Option<ResetConfig>,
}

impl ValueConfig {
    /// The clock that drives this value: its own override, else the source clock.
    pub fn effective_clock(&self) -> Option<(&ClockConfig, Option<&str>)> {
        match &self.clock {
            Some(clock) => Some((clock, self.clock_ref.as_deref())),
            None => self
                .source
                .clock
                .as_ref()
                .map(|clock| (clock, self.source.clock_ref.as_deref())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(Self::Counter),
            "gauge" => Ok(Self::Gauge),
            other => Err(format!("invalid type {other:?} (must be counter or gauge)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricNames {
    pub prometheus: String,
    pub otel: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricConfig {
    pub names: MetricNames,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    pub description: String,
    pub value: ValueConfig,
    pub attributes: BTreeMap<String, String>,
}

impl MetricConfig {
    pub fn display_name(&self) -> &str {
        &self.names.prometheus
    }
}

/// Named instances, kept in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstanceRegistry {
    pub clocks: IndexMap<String, ClockConfig>,
    pub sources: IndexMap<String, SourceConfig>,
    pub values: IndexMap<String, ValueConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub instances: InstanceRegistry,
    pub metrics: Vec<MetricConfig>,
    pub export: ExportConfig,
    pub settings: SettingsConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(secs: u64) -> ClockConfig {
        ClockConfig {
            kind: "periodic".to_string(),
            interval: Duration::from_secs(secs),
        }
    }

    #[test]
    fn test_effective_clock_prefers_value_override() {
        let mut value = ValueConfig {
            source: SourceConfig {
                kind: "random_int".to_string(),
                clock: Some(clock(1)),
                clock_ref: Some("c1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let (effective, reference) = value.effective_clock().unwrap();
        assert_eq!(effective.interval, Duration::from_secs(1));
        assert_eq!(reference, Some("c1"));

        value.clock = Some(clock(5));
        let (effective, reference) = value.effective_clock().unwrap();
        assert_eq!(effective.interval, Duration::from_secs(5));
        assert_eq!(reference, None);
    }

    #[test]
    fn test_metric_kind_parsing() {
        assert_eq!("counter".parse::<MetricKind>(), Ok(MetricKind::Counter));
        assert_eq!("gauge".parse::<MetricKind>(), Ok(MetricKind::Gauge));
        assert_eq!(
            "histogram".parse::<MetricKind>().unwrap_err(),
            "invalid type \"histogram\" (must be counter or gauge)"
        );
    }

    #[test]
    fn test_serialized_shape() {
        let value = ValueConfig {
            source: SourceConfig {
                kind: "random_int".to_string(),
                clock: Some(clock(2)),
                min: 0,
                max: 10,
                ..Default::default()
            },
            source_ref: Some("s1".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&value).unwrap();

        assert_eq!(json["source"]["type"], "random_int");
        assert_eq!(json["source"]["clock"]["interval"], "2s");
        assert_eq!(json["source_ref"], "s1");
        assert!(json.get("clock").is_none());
        assert!(json.get("transforms").is_none());
    }
}
