use indexmap::IndexMap;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use super::context::{ResolveContext, ResolveResult};
use super::namespace::{Entity, EntityKind};
use super::Resolver;
use crate::config::raw::{RawMetric, RawMetricTemplate};
use crate::config::types::{MetricConfig, MetricKind, MetricNames, ValueConfig};

static ATTRIBUTE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("attribute key pattern is valid")
});

/// Resolved metric template. Only the type is mandatory.
#[derive(Debug, Clone)]
pub(super) struct MetricTemplate {
    kind: MetricKind,
    description: Option<String>,
    value: Option<ValueConfig>,
    attributes: Option<BTreeMap<String, String>>,
}

fn parse_kind(kind: &str, ctx: &ResolveContext) -> ResolveResult<MetricKind> {
    kind.parse().map_err(|message: String| ctx.error(message))
}

fn attributes(
    raw: &IndexMap<String, String>,
    ctx: &ResolveContext,
) -> ResolveResult<BTreeMap<String, String>> {
    for key in raw.keys() {
        if key.starts_with("__") || !ATTRIBUTE_KEY.is_match(key) {
            return Err(ctx.error(format!("invalid attribute name {key:?}")));
        }
    }
    Ok(raw.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

impl Resolver {
    pub(super) fn build_metric_template(
        &self,
        raw: &RawMetricTemplate,
        base: Option<&MetricTemplate>,
        ctx: &ResolveContext,
    ) -> ResolveResult<MetricTemplate> {
        let kind = match (&raw.kind, base) {
            (Some(kind), _) => parse_kind(kind, ctx)?,
            (None, Some(base)) => base.kind,
            (None, None) => return Err(ctx.error("type required")),
        };

        let value = match &raw.value {
            Some(value) => Some(self.resolve_value(value, ctx)?),
            None => base.and_then(|base| base.value.clone()),
        };
        let attributes = match &raw.attributes {
            Some(raw) => Some(attributes(raw, ctx)?),
            None => base.and_then(|base| base.attributes.clone()),
        };

        Ok(MetricTemplate {
            kind,
            description: raw
                .description
                .clone()
                .or_else(|| base.and_then(|base| base.description.clone())),
            value,
            attributes,
        })
    }

    pub(super) fn resolve_metrics(&self, raw: &[RawMetric]) -> ResolveResult<Vec<MetricConfig>> {
        let mut metrics = Vec::with_capacity(raw.len());
        let mut series: HashMap<(String, BTreeMap<String, String>), usize> = HashMap::new();

        for (index, raw) in raw.iter().enumerate() {
            let ctx = ResolveContext::root().push("metric", raw.name.prometheus());
            let metric = self.resolve_metric(raw, &ctx)?;

            let key = (metric.names.prometheus.clone(), metric.attributes.clone());
            if let Some(previous) = series.insert(key, index) {
                return Err(ctx.error(format!(
                    "duplicate series: metric at index {previous} has the same name and attributes"
                )));
            }
            metrics.push(metric);
        }

        Ok(metrics)
    }

    /// Metric fields override the template; `attributes` replaces the
    /// template's set wholesale, as does `value`.
    fn resolve_metric(&self, raw: &RawMetric, ctx: &ResolveContext) -> ResolveResult<MetricConfig> {
        let template = match &raw.template {
            Some(name) => Some(self.template_metrics.get(name).ok_or_else(|| {
                self.missing(Entity::template(EntityKind::Metric), name, ctx)
            })?),
            None => None,
        };
        let ctx = match &raw.template {
            Some(name) => ctx.push("metric template", name),
            None => ctx.clone(),
        };

        let kind = match (&raw.kind, template) {
            (Some(kind), _) => parse_kind(kind, &ctx)?,
            (None, Some(template)) => template.kind,
            (None, None) => return Err(ctx.error("type required")),
        };

        let description = raw
            .description
            .clone()
            .or_else(|| template.and_then(|t| t.description.clone()))
            .filter(|description| !description.is_empty())
            .ok_or_else(|| ctx.error("description required"))?;

        let value = match &raw.value {
            Some(value) => self.resolve_value(value, &ctx)?,
            None => template
                .and_then(|t| t.value.clone())
                .ok_or_else(|| ctx.error("value required"))?,
        };

        let attributes = match &raw.attributes {
            Some(raw) => attributes(raw, &ctx)?,
            None => template
                .and_then(|t| t.attributes.clone())
                .unwrap_or_default(),
        };

        Ok(MetricConfig {
            names: MetricNames {
                prometheus: raw.name.prometheus().to_string(),
                otel: raw.name.otel().to_string(),
            },
            kind,
            description,
            value,
            attributes,
        })
    }
}
