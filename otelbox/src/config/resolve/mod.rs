//! Template and instance resolution.
//!
//! Resolution runs in four phases, one per entity kind: clocks, sources,
//! values, metrics. Within a phase templates are resolved before instances,
//! so a declaration can only ever reach entities of an earlier kind or
//! templates of its own kind. Document order is irrelevant; everything is
//! looked up by name.

mod context;
mod metrics;
mod namespace;
mod references;

pub use context::{ResolveContext, ResolveError, ResolveResult};
pub use namespace::{Entity, EntityKind, Namespace, Origin};

use indexmap::IndexMap;
use tracing::{debug, info};

use super::export::resolve_export;
use super::raw::{RawClock, RawConfig, RawMetricTemplate, RawSource, RawValue};
use super::settings::resolve_settings;
use super::types::{ClockConfig, Config, InstanceRegistry, SourceConfig, ValueConfig};
use metrics::MetricTemplate;
use references::build_clock;

/// A named entry of `templates.*` or `instances.*`.
trait Declaration {
    fn declared_name(&self) -> &str;

    /// Template this declaration is based on, if any.
    fn base_template(&self) -> Option<&str>;

    fn instance_field(&self) -> Option<&str> {
        None
    }
}

impl Declaration for RawClock {
    fn declared_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    fn base_template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    fn instance_field(&self) -> Option<&str> {
        self.instance.as_deref()
    }
}

impl Declaration for RawSource {
    fn declared_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    fn base_template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    fn instance_field(&self) -> Option<&str> {
        self.instance.as_deref()
    }
}

impl Declaration for RawValue {
    fn declared_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    fn base_template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    fn instance_field(&self) -> Option<&str> {
        self.instance.as_deref()
    }
}

impl Declaration for RawMetricTemplate {
    fn declared_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    fn base_template(&self) -> Option<&str> {
        self.template.as_deref()
    }
}

/// Per-compilation resolver state. Every field starts empty; nothing is shared
/// between compilations.
#[derive(Debug, Default)]
pub struct Resolver {
    namespace: Namespace,

    template_clocks: IndexMap<String, ClockConfig>,
    template_sources: IndexMap<String, SourceConfig>,
    template_values: IndexMap<String, ValueConfig>,
    template_metrics: IndexMap<String, MetricTemplate>,

    instance_clocks: IndexMap<String, ClockConfig>,
    instance_sources: IndexMap<String, SourceConfig>,
    instance_values: IndexMap<String, ValueConfig>,
}

/// Resolves an expanded document into the final configuration.
pub fn resolve(raw: &RawConfig) -> ResolveResult<Config> {
    let mut resolver = Resolver::default();

    debug!("Resolving clocks");
    resolver.register(EntityKind::Clock, &raw.templates.clocks, &raw.instances.clocks)?;
    resolver.template_clocks = resolver.resolve_templates(
        EntityKind::Clock,
        &raw.templates.clocks,
        |_, raw, base, ctx| build_clock(raw, base, ctx),
    )?;
    resolver.instance_clocks = resolver.resolve_instances(
        EntityKind::Clock,
        &raw.instances.clocks,
        &resolver.template_clocks,
        |_, raw, base, ctx| build_clock(raw, base, ctx),
    )?;

    debug!("Resolving sources");
    resolver.register(EntityKind::Source, &raw.templates.sources, &raw.instances.sources)?;
    resolver.template_sources = resolver.resolve_templates(
        EntityKind::Source,
        &raw.templates.sources,
        Resolver::build_source,
    )?;
    resolver.instance_sources = resolver.resolve_instances(
        EntityKind::Source,
        &raw.instances.sources,
        &resolver.template_sources,
        Resolver::build_source,
    )?;

    debug!("Resolving values");
    resolver.register(EntityKind::Value, &raw.templates.values, &raw.instances.values)?;
    resolver.template_values = resolver.resolve_templates(
        EntityKind::Value,
        &raw.templates.values,
        Resolver::build_value,
    )?;
    resolver.instance_values = resolver.resolve_instances(
        EntityKind::Value,
        &raw.instances.values,
        &resolver.template_values,
        Resolver::build_value,
    )?;

    debug!("Resolving metrics");
    resolver.register(EntityKind::Metric, &raw.templates.metrics, &[] as &[RawMetricTemplate])?;
    resolver.template_metrics = resolver.resolve_templates(
        EntityKind::Metric,
        &raw.templates.metrics,
        Resolver::build_metric_template,
    )?;
    let metrics = resolver.resolve_metrics(&raw.metrics)?;

    let export = resolve_export(&raw.export)?;
    let settings = resolve_settings(&raw.settings)?;

    info!(
        metrics = metrics.len(),
        clocks = resolver.instance_clocks.len(),
        sources = resolver.instance_sources.len(),
        values = resolver.instance_values.len(),
        "Configuration resolved"
    );

    Ok(Config {
        instances: InstanceRegistry {
            clocks: resolver.instance_clocks,
            sources: resolver.instance_sources,
            values: resolver.instance_values,
        },
        metrics,
        export,
        settings,
    })
}

impl Resolver {
    /// Claims the names of one kind's templates and instances.
    fn register<T: Declaration, I: Declaration>(
        &mut self,
        kind: EntityKind,
        templates: &[T],
        instances: &[I],
    ) -> ResolveResult<()> {
        for declaration in templates {
            let name = declaration.declared_name();
            let ctx = ResolveContext::root().push(&template_label(kind), name);
            self.namespace.register(name, Entity::template(kind), &ctx)?;
        }
        for declaration in instances {
            let name = declaration.declared_name();
            let ctx = ResolveContext::root().push(&instance_label(kind), name);
            self.namespace.register(name, Entity::instance(kind), &ctx)?;
        }
        Ok(())
    }

    /// Resolves one kind's templates, each after the template it extends.
    ///
    /// Repeats passes over the unresolved templates until none remain; a pass
    /// that resolves nothing means the remaining templates form a cycle.
    fn resolve_templates<D, T, F>(
        &self,
        kind: EntityKind,
        declarations: &[D],
        build: F,
    ) -> ResolveResult<IndexMap<String, T>>
    where
        D: Declaration,
        F: Fn(&Self, &D, Option<&T>, &ResolveContext) -> ResolveResult<T>,
    {
        let label = template_label(kind);

        for declaration in declarations {
            let ctx = ResolveContext::root().push(&label, declaration.declared_name());
            check_declaration(declaration, &ctx)?;
            if let Some(base) = declaration.base_template() {
                if !declarations.iter().any(|d| d.declared_name() == base) {
                    return Err(self.missing(Entity::template(kind), base, &ctx));
                }
            }
        }

        let mut resolved: IndexMap<String, T> = IndexMap::with_capacity(declarations.len());
        let mut pending: Vec<&D> = declarations.iter().collect();
        let mut pass = 0;

        while !pending.is_empty() {
            pass += 1;
            let mut deferred = Vec::new();

            for &declaration in &pending {
                let name = declaration.declared_name();
                let base = match declaration.base_template() {
                    None => None,
                    Some(base) => match resolved.get(base) {
                        Some(template) => Some(template),
                        None => {
                            deferred.push(declaration);
                            continue;
                        }
                    },
                };

                let ctx = ResolveContext::root().push(&label, name);
                let template = build(self, declaration, base, &ctx)?;
                resolved.insert(name.to_string(), template);
            }

            if deferred.len() == pending.len() {
                let names: Vec<&str> = deferred.iter().map(|d| d.declared_name()).collect();
                return Err(ResolveContext::root().error(format!(
                    "cycle detected between {label}s: {}",
                    names.join(", ")
                )));
            }
            pending = deferred;
        }

        debug!(kind = kind.as_str(), count = resolved.len(), passes = pass, "Templates resolved");
        Ok(resolved)
    }

    fn resolve_instances<D, T, F>(
        &self,
        kind: EntityKind,
        declarations: &[D],
        templates: &IndexMap<String, T>,
        build: F,
    ) -> ResolveResult<IndexMap<String, T>>
    where
        D: Declaration,
        F: Fn(&Self, &D, Option<&T>, &ResolveContext) -> ResolveResult<T>,
    {
        let label = instance_label(kind);
        let mut resolved = IndexMap::with_capacity(declarations.len());

        for declaration in declarations {
            let name = declaration.declared_name();
            let ctx = ResolveContext::root().push(&label, name);
            check_declaration(declaration, &ctx)?;

            let base = match declaration.base_template() {
                None => None,
                Some(base) => Some(
                    templates
                        .get(base)
                        .ok_or_else(|| self.missing(Entity::template(kind), base, &ctx))?,
                ),
            };
            resolved.insert(name.to_string(), build(self, declaration, base, &ctx)?);
        }

        debug!(kind = kind.as_str(), count = resolved.len(), "Instances resolved");
        Ok(resolved)
    }

    /// Not-found error, naming what the name actually is when it exists elsewhere.
    fn missing(&self, wanted: Entity, name: &str, ctx: &ResolveContext) -> ResolveError {
        match self.namespace.lookup(name) {
            Some(actual) if actual != wanted => {
                ctx.error(format!("{wanted} {name:?} not found ({name:?} is a {actual})"))
            }
            _ => ctx.error(format!("{wanted} {name:?} not found")),
        }
    }
}

fn template_label(kind: EntityKind) -> String {
    Entity::template(kind).to_string()
}

fn instance_label(kind: EntityKind) -> String {
    Entity::instance(kind).to_string()
}

fn check_declaration<D: Declaration>(declaration: &D, ctx: &ResolveContext) -> ResolveResult<()> {
    if let Some(instance) = declaration.instance_field() {
        return Err(ctx.error(format!(
            "declaration cannot reference instance {instance:?} (use template)"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::raw::RawConfig;
    use std::time::Duration;

    fn resolve_yaml(yaml: &str) -> ResolveResult<Config> {
        let raw: RawConfig = serde_yaml::from_str(yaml).unwrap();
        resolve(&raw)
    }

    const METRIC: &str = r#"
metrics:
  - name: m
    type: gauge
    description: d
    value: {source: {template: base}}
"#;

    #[test]
    fn test_template_inheritance_any_order() {
        let config = resolve_yaml(&format!(
            r#"
templates:
  clocks:
    - {{name: fast, template: slow, interval: 100ms}}
    - {{name: slow, type: periodic, interval: 10s}}
  sources:
    - {{name: narrow, template: base, max: 5}}
    - {{name: base, type: random_int, clock: {{template: fast}}, min: 1, max: 100}}
{METRIC}"#
        ))
        .unwrap();

        let source = &config.metrics[0].value.source;
        assert_eq!(source.max, 100);
        assert_eq!(
            source.clock.as_ref().unwrap().interval,
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_template_cycle_is_reported() {
        let err = resolve_yaml(&format!(
            r#"
templates:
  sources:
    - {{name: base, template: other}}
    - {{name: other, template: base}}
{METRIC}"#
        ))
        .unwrap_err();

        assert_eq!(
            err.message,
            "cycle detected between source templates: base, other"
        );
    }

    #[test]
    fn test_unknown_base_template() {
        let err = resolve_yaml(
            r#"
instances:
  clocks: [{name: c1, template: nowhere}]
metrics: [{name: m, type: gauge, description: d}]
"#,
        )
        .unwrap_err();

        assert_eq!(err.message, "clock template \"nowhere\" not found");
        assert_eq!(err.path, vec!["clock instance \"c1\""]);
    }

    #[test]
    fn test_declaration_cannot_use_instance() {
        let err = resolve_yaml(
            r#"
instances:
  clocks:
    - {name: c1, type: periodic, interval: 1s}
    - {name: c2, instance: c1}
metrics: [{name: m, type: gauge, description: d}]
"#,
        )
        .unwrap_err();

        assert!(err.message.contains("cannot reference instance \"c1\""));
    }

    #[test]
    fn test_name_collision_between_kinds() {
        let err = resolve_yaml(
            r#"
templates:
  clocks: [{name: shared, type: periodic, interval: 1s}]
instances:
  sources: [{name: shared, type: random_int, clock: {template: shared}}]
metrics: [{name: m, type: gauge, description: d}]
"#,
        )
        .unwrap_err();

        assert_eq!(
            err.message,
            "name \"shared\" already used by clock template, cannot reuse for source instance"
        );
    }

    #[test]
    fn test_not_found_names_actual_entity() {
        let err = resolve_yaml(
            r#"
templates:
  sources: [{name: s1, type: random_int, clock: {type: periodic, interval: 1s}}]
metrics:
  - {name: m, type: gauge, description: d, value: {source: {instance: s1}}}
"#,
        )
        .unwrap_err();

        assert_eq!(
            err.message,
            "source instance \"s1\" not found (\"s1\" is a source template)"
        );
    }
}
