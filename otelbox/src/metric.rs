//! Protocol-agnostic view of the materialized metrics, consumed by exporters.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use simulation::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{MetricConfig, MetricKind};
use crate::generator::Generator;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Metric {index} ({metric}) has no value in the generator")]
    MissingValue { index: usize, metric: String },
}

/// One exported series and the value that backs it.
#[derive(Clone)]
pub struct MetricDescriptor {
    pub prometheus_name: String,
    pub otel_name: String,
    pub kind: MetricKind,
    pub description: String,
    pub attributes: BTreeMap<String, String>,
    value: Arc<dyn Value>,
}

impl MetricDescriptor {
    /// Reads the value, applying its reset-on-read policy.
    pub fn read(&self) -> i64 {
        self.value.read()
    }

    pub fn peek(&self) -> i64 {
        self.value.peek()
    }
}

impl std::fmt::Debug for MetricDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricDescriptor")
            .field("prometheus_name", &self.prometheus_name)
            .field("otel_name", &self.otel_name)
            .field("kind", &self.kind)
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// A single reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub name: String,
    pub otel_name: String,
    pub kind: MetricKind,
    pub value: i64,
    pub timestamp: DateTime<Utc>,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct MetricRegistry {
    descriptors: Vec<MetricDescriptor>,
}

impl MetricRegistry {
    /// Pairs every configured metric with the generator value of the same index.
    pub fn new(metrics: &[MetricConfig], generator: &Generator) -> Result<Self, RegistryError> {
        let descriptors = metrics
            .iter()
            .enumerate()
            .map(|(index, metric)| {
                let value = generator
                    .value(index)
                    .cloned()
                    .ok_or_else(|| RegistryError::MissingValue {
                        index,
                        metric: metric.display_name().to_string(),
                    })?;
                Ok(MetricDescriptor {
                    prometheus_name: metric.names.prometheus.clone(),
                    otel_name: metric.names.otel.clone(),
                    kind: metric.kind,
                    description: metric.description.clone(),
                    attributes: metric.attributes.clone(),
                    value,
                })
            })
            .collect::<Result<Vec<_>, RegistryError>>()?;

        Ok(Self { descriptors })
    }

    pub fn descriptors(&self) -> &[MetricDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Reads every metric once, in declaration order.
    pub fn snapshot(&self) -> Vec<MetricPoint> {
        let timestamp = Utc::now();
        self.descriptors
            .iter()
            .map(|descriptor| MetricPoint {
                name: descriptor.prometheus_name.clone(),
                otel_name: descriptor.otel_name.clone(),
                kind: descriptor.kind,
                value: descriptor.read(),
                timestamp,
                attributes: descriptor.attributes.clone(),
            })
            .collect()
    }

    /// Renders a scrape in the Prometheus text format. Series sharing a name
    /// are grouped under one HELP/TYPE header.
    pub fn render_prometheus(&self) -> String {
        let mut families: IndexMap<&str, Vec<(&MetricDescriptor, i64)>> = IndexMap::new();
        for descriptor in &self.descriptors {
            families
                .entry(descriptor.prometheus_name.as_str())
                .or_default()
                .push((descriptor, descriptor.read()));
        }

        let mut output = String::new();
        for (name, series) in families {
            let (first, _) = series[0];
            output.push_str(&format!(
                "# HELP {} {}\n",
                name,
                escape_help(&first.description)
            ));
            output.push_str(&format!("# TYPE {} {}\n", name, first.kind));

            for (descriptor, value) in series {
                output.push_str(&format!(
                    "{}{} {}\n",
                    name,
                    render_labels(&descriptor.attributes),
                    value
                ));
            }
        }
        output
    }
}

fn render_labels(attributes: &BTreeMap<String, String>) -> String {
    if attributes.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = attributes
        .iter()
        .map(|(key, value)| format!("{}=\"{}\"", key, escape_label(value)))
        .collect();
    format!("{{{}}}", pairs.join(","))
}

fn escape_help(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
