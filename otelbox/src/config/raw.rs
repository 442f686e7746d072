//! Document model exactly as written by the user.
//!
//! Every struct rejects unknown fields, so a misspelled key fails at parse
//! time instead of being silently ignored. References keep the flat document
//! shape; [`RawClock::reference`] and friends classify them into a
//! [`Reference`] for the resolver.

use indexmap::IndexMap;
use serde::Deserialize;
use std::time::Duration;

use super::expand::ExpansionError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    #[serde(default)]
    pub iterators: IndexMap<String, RawIterator>,
    #[serde(default)]
    pub templates: RawTemplates,
    #[serde(default)]
    pub instances: RawInstances,
    #[serde(default)]
    pub metrics: Vec<RawMetric>,
    #[serde(default)]
    pub export: RawExport,
    #[serde(default)]
    pub settings: RawSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTemplates {
    #[serde(default)]
    pub clocks: Vec<RawClock>,
    #[serde(default)]
    pub sources: Vec<RawSource>,
    #[serde(default)]
    pub values: Vec<RawValue>,
    #[serde(default)]
    pub metrics: Vec<RawMetricTemplate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawInstances {
    #[serde(default)]
    pub clocks: Vec<RawClock>,
    #[serde(default)]
    pub sources: Vec<RawSource>,
    #[serde(default)]
    pub values: Vec<RawValue>,
}

/// Iterator domain: a list of scalars or an integer range.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawIterator {
    Values(Vec<IteratorScalar>),
    Range(RawRangeIterator),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IteratorScalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRangeIterator {
    pub range: RawRange,
}

/// Half-open integer range `[start, end)`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRange {
    pub start: i64,
    pub end: i64,
    #[serde(default = "default_step")]
    pub step: i64,
}

fn default_step() -> i64 {
    1
}

impl RawIterator {
    pub fn values(&self, name: &str) -> Result<Vec<String>, ExpansionError> {
        match self {
            Self::Values(values) => Ok(values.iter().map(IteratorScalar::render).collect()),
            Self::Range(RawRangeIterator { range }) => {
                if range.step <= 0 {
                    return Err(ExpansionError::InvalidRange {
                        name: name.to_string(),
                        reason: format!("step must be positive, got {}", range.step),
                    });
                }
                let step = usize::try_from(range.step).map_err(|_| ExpansionError::InvalidRange {
                    name: name.to_string(),
                    reason: format!("step {} is too large", range.step),
                })?;
                Ok((range.start..range.end)
                    .step_by(step)
                    .map(|v| v.to_string())
                    .collect())
            }
        }
    }
}

impl IteratorScalar {
    fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Integer(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Boolean(value) => value.to_string(),
        }
    }
}

/// How a clock, source or value field names what it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference<'a> {
    /// Shared, singly-built object; no overrides allowed.
    Instance(&'a str),
    /// Copy of a template with the present fields overridden.
    Template(&'a str),
    /// Every mandatory field given directly.
    Inline,
}

fn classify<'a>(instance: &'a Option<String>, template: &'a Option<String>) -> Reference<'a> {
    match (instance, template) {
        (Some(instance), _) => Reference::Instance(instance),
        (None, Some(template)) => Reference::Template(template),
        (None, None) => Reference::Inline,
    }
}

/// Clock declaration or reference.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawClock {
    pub name: Option<String>,
    pub instance: Option<String>,
    pub template: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
}

impl RawClock {
    pub fn reference(&self) -> Reference<'_> {
        classify(&self.instance, &self.template)
    }

    /// Fields that would override an instance if set next to `instance`.
    pub fn has_overrides(&self) -> bool {
        self.template.is_some() || self.kind.is_some() || self.interval.is_some()
    }
}

/// Source declaration or reference.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSource {
    pub name: Option<String>,
    pub instance: Option<String>,
    pub template: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub clock: Option<RawClock>,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl RawSource {
    pub fn reference(&self) -> Reference<'_> {
        classify(&self.instance, &self.template)
    }

    pub fn has_overrides(&self) -> bool {
        self.template.is_some()
            || self.kind.is_some()
            || self.clock.is_some()
            || self.min.is_some()
            || self.max.is_some()
    }
}

/// Value declaration or reference.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawValue {
    pub name: Option<String>,
    pub instance: Option<String>,
    pub template: Option<String>,
    pub source: Option<RawSource>,
    pub clock: Option<RawClock>,
    pub transforms: Option<Vec<RawTransform>>,
    pub reset: Option<RawReset>,
}

impl RawValue {
    pub fn reference(&self) -> Reference<'_> {
        classify(&self.instance, &self.template)
    }

    pub fn has_overrides(&self) -> bool {
        self.template.is_some()
            || self.source.is_some()
            || self.clock.is_some()
            || self.transforms.is_some()
            || self.reset.is_some()
    }
}

/// `accumulate` or `{type: accumulate}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTransform {
    Short(String),
    Long(RawTransformObject),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTransformObject {
    #[serde(rename = "type")]
    pub kind: String,
}

impl RawTransform {
    pub fn kind(&self) -> &str {
        match self {
            Self::Short(kind) => kind,
            Self::Long(object) => &object.kind,
        }
    }
}

/// `on_read` or `{type: on_read, value: N}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawReset {
    Short(String),
    Long(RawResetObject),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawResetObject {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: i64,
}

impl RawReset {
    pub fn kind(&self) -> &str {
        match self {
            Self::Short(kind) => kind,
            Self::Long(object) => &object.kind,
        }
    }

    /// Short form resets to 0.
    pub fn value(&self) -> i64 {
        match self {
            Self::Short(_) => 0,
            Self::Long(object) => object.value,
        }
    }
}

/// Metric name: one string for every protocol, or one per protocol.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawMetricName {
    Short(String),
    Long(RawMetricNameForms),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawMetricNameForms {
    pub prometheus: Option<String>,
    pub otel: Option<String>,
}

impl RawMetricName {
    /// A missing form falls back to the other one.
    pub fn prometheus(&self) -> &str {
        match self {
            Self::Short(name) => name,
            Self::Long(forms) => non_empty(&forms.prometheus)
                .or_else(|| non_empty(&forms.otel))
                .unwrap_or_default(),
        }
    }

    pub fn otel(&self) -> &str {
        match self {
            Self::Short(name) => name,
            Self::Long(forms) => non_empty(&forms.otel)
                .or_else(|| non_empty(&forms.prometheus))
                .unwrap_or_default(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawMetric {
    pub name: RawMetricName,
    pub template: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub description: Option<String>,
    pub value: Option<RawValue>,
    pub attributes: Option<IndexMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawMetricTemplate {
    pub name: Option<String>,
    pub template: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub description: Option<String>,
    pub value: Option<RawValue>,
    pub attributes: Option<IndexMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawExport {
    pub prometheus: Option<RawPrometheusExport>,
    pub otel: Option<RawOtelExport>,
}

/// Pull endpoint. A present section is enabled unless `enabled: false`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPrometheusExport {
    pub enabled: Option<bool>,
    pub port: Option<i64>,
    pub path: Option<String>,
}

/// Push collector. A present section is enabled unless `enabled: false`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawOtelExport {
    pub enabled: Option<bool>,
    pub transport: Option<String>,
    pub host: Option<String>,
    pub port: Option<i64>,
    pub interval: Option<RawInterval>,
    pub resource: Option<IndexMap<String, String>>,
    pub headers: Option<IndexMap<String, String>>,
}

/// `10s` sets both intervals, `{read, push}` sets them separately.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawInterval {
    Simple(#[serde(with = "humantime_serde")] Duration),
    Detailed(RawIntervalForms),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawIntervalForms {
    #[serde(default, with = "humantime_serde")]
    pub read: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub push: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSettings {
    pub seed: Option<u64>,
    #[serde(default)]
    pub internal_metrics: RawInternalMetrics,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawInternalMetrics {
    #[serde(default)]
    pub enabled: bool,
    pub format: Option<String>,
}

/// Structural checks that need no name resolution.
pub fn validate_raw(raw: &RawConfig) -> Result<(), String> {
    if raw.metrics.is_empty() {
        return Err("at least one metric must be defined".to_string());
    }

    for (index, metric) in raw.metrics.iter().enumerate() {
        if metric.name.prometheus().is_empty() {
            return Err(format!("metric at index {index}: name cannot be empty"));
        }
        if let Some(value) = &metric.value {
            check_value_reference(value, &format!("metric {:?}", metric.name.prometheus()))?;
        }
    }

    for (section, clocks) in [
        ("templates.clocks", &raw.templates.clocks),
        ("instances.clocks", &raw.instances.clocks),
    ] {
        for (index, clock) in clocks.iter().enumerate() {
            check_declared_name(section, index, &clock.name)?;
        }
    }

    for (section, sources) in [
        ("templates.sources", &raw.templates.sources),
        ("instances.sources", &raw.instances.sources),
    ] {
        for (index, source) in sources.iter().enumerate() {
            check_declared_name(section, index, &source.name)?;
            if let Some(clock) = &source.clock {
                check_clock_reference(clock, &format!("{section}[{index}]"))?;
            }
        }
    }

    for (section, values) in [
        ("templates.values", &raw.templates.values),
        ("instances.values", &raw.instances.values),
    ] {
        for (index, value) in values.iter().enumerate() {
            check_declared_name(section, index, &value.name)?;
            check_value_children(value, &format!("{section}[{index}]"))?;
        }
    }

    for (index, metric) in raw.templates.metrics.iter().enumerate() {
        check_declared_name("templates.metrics", index, &metric.name)?;
        if let Some(value) = &metric.value {
            check_value_reference(value, &format!("templates.metrics[{index}]"))?;
        }
    }

    Ok(())
}

fn check_declared_name(section: &str, index: usize, name: &Option<String>) -> Result<(), String> {
    match name.as_deref() {
        Some(name) if !name.is_empty() => Ok(()),
        _ => Err(format!("{section}[{index}]: name cannot be empty")),
    }
}

fn nested_name_error(owner: &str, kind: &str) -> String {
    format!("{owner}: {kind} reference cannot declare a name")
}

fn check_clock_reference(clock: &RawClock, owner: &str) -> Result<(), String> {
    if clock.name.is_some() {
        return Err(nested_name_error(owner, "clock"));
    }
    Ok(())
}

fn check_source_reference(source: &RawSource, owner: &str) -> Result<(), String> {
    if source.name.is_some() {
        return Err(nested_name_error(owner, "source"));
    }
    if let Some(clock) = &source.clock {
        check_clock_reference(clock, owner)?;
    }
    Ok(())
}

fn check_value_reference(value: &RawValue, owner: &str) -> Result<(), String> {
    if value.name.is_some() {
        return Err(nested_name_error(owner, "value"));
    }
    check_value_children(value, owner)
}

fn check_value_children(value: &RawValue, owner: &str) -> Result<(), String> {
    if let Some(source) = &value.source {
        check_source_reference(source, owner)?;
    }
    if let Some(clock) = &value.clock {
        check_clock_reference(clock, owner)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<RawConfig, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    #[test]
    fn test_polymorphic_short_and_long_forms() {
        let raw = parse(
            r#"
metrics:
  - name: requests_total
    type: counter
    description: Requests
    value:
      source: {type: random_int, min: 0, max: 10, clock: {type: periodic, interval: 1s}}
      transforms: [accumulate, {type: accumulate}]
      reset: on_read
  - name: {prometheus: queue_depth, otel: queue.depth}
    type: gauge
    description: Depth
    value:
      source: {instance: s1}
      reset: {type: on_read, value: 5}
"#,
        )
        .unwrap();

        let first = raw.metrics[0].value.as_ref().unwrap();
        let transforms = first.transforms.as_ref().unwrap();
        assert_eq!(transforms[0].kind(), "accumulate");
        assert_eq!(transforms[1].kind(), "accumulate");
        assert_eq!(first.reset.as_ref().unwrap().kind(), "on_read");
        assert_eq!(first.reset.as_ref().unwrap().value(), 0);
        assert_eq!(
            first.source.as_ref().unwrap().clock.as_ref().unwrap().interval,
            Some(Duration::from_secs(1))
        );

        let second = &raw.metrics[1];
        assert_eq!(second.name.prometheus(), "queue_depth");
        assert_eq!(second.name.otel(), "queue.depth");
        assert_eq!(second.value.as_ref().unwrap().reset.as_ref().unwrap().value(), 5);
        assert_eq!(
            second.value.as_ref().unwrap().source.as_ref().unwrap().reference(),
            Reference::Instance("s1")
        );
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(parse("metricz: []").is_err());
        assert!(parse(
            r#"
metrics:
  - name: x
    value: {source: {type: random_int, colour: red}}
"#
        )
        .is_err());
        assert!(parse("export: {prometheus: {port: 1, verbose: true}}").is_err());
    }

    #[test]
    fn test_reference_classification() {
        let instance = RawClock {
            instance: Some("c1".to_string()),
            template: Some("t".to_string()),
            ..Default::default()
        };
        assert_eq!(instance.reference(), Reference::Instance("c1"));
        assert!(instance.has_overrides());

        let template = RawClock {
            template: Some("t".to_string()),
            ..Default::default()
        };
        assert_eq!(template.reference(), Reference::Template("t"));

        assert_eq!(RawClock::default().reference(), Reference::Inline);
        assert!(!RawClock::default().has_overrides());
    }

    #[test]
    fn test_iterator_forms() {
        let raw = parse(
            r#"
iterators:
  region: [us, eu]
  shard: {range: {start: 0, end: 6, step: 2}}
  mixed: [1, 2.5, true]
metrics:
  - name: x
"#,
        )
        .unwrap();

        assert_eq!(raw.iterators["region"].values("region").unwrap(), vec!["us", "eu"]);
        assert_eq!(raw.iterators["shard"].values("shard").unwrap(), vec!["0", "2", "4"]);
        assert_eq!(raw.iterators["mixed"].values("mixed").unwrap(), vec!["1", "2.5", "true"]);
    }

    #[test]
    fn test_invalid_range_step() {
        let iterator = RawIterator::Range(RawRangeIterator {
            range: RawRange {
                start: 0,
                end: 3,
                step: 0,
            },
        });
        assert!(iterator.values("bad").is_err());
    }

    #[test]
    fn test_validate_raw() {
        let empty = RawConfig::default();
        assert!(validate_raw(&empty).unwrap_err().contains("at least one metric"));

        let unnamed = parse(
            r#"
instances:
  clocks: [{type: periodic, interval: 1s}]
metrics: [{name: x}]
"#,
        )
        .unwrap();
        assert!(validate_raw(&unnamed)
            .unwrap_err()
            .contains("instances.clocks[0]: name cannot be empty"));

        let nested_name = parse(
            r#"
metrics:
  - name: x
    value: {source: {name: oops, type: random_int}}
"#,
        )
        .unwrap();
        assert!(validate_raw(&nested_name)
            .unwrap_err()
            .contains("cannot declare a name"));

        let blank_name = parse("metrics: [{name: ''}]").unwrap();
        assert!(validate_raw(&blank_name).unwrap_err().contains("index 0"));
    }
}
