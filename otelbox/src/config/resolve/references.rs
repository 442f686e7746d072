//! Three-way reference resolution shared by every phase.
//!
//! A reference names an instance (no other field allowed), names a template
//! (a copy of its snapshot with the present fields overwritten), or spells
//! the entity out inline (every mandatory field present).

use super::context::{ResolveContext, ResolveError, ResolveResult};
use super::namespace::{Entity, EntityKind};
use super::Resolver;
use crate::config::raw::{RawClock, RawSource, RawValue, Reference};
use crate::config::types::{ClockConfig, ResetConfig, SourceConfig, TransformConfig, ValueConfig};

fn cannot_override(name: &str, ctx: &ResolveContext) -> ResolveError {
    ctx.error(format!("cannot override instance {name:?}"))
}

/// Applies the clock fields of `raw` on top of `base`.
pub(super) fn build_clock(
    raw: &RawClock,
    base: Option<&ClockConfig>,
    ctx: &ResolveContext,
) -> ResolveResult<ClockConfig> {
    let kind = raw
        .kind
        .clone()
        .or_else(|| base.map(|clock| clock.kind.clone()))
        .filter(|kind| !kind.is_empty())
        .ok_or_else(|| ctx.error("clock type required"))?;
    let interval = raw
        .interval
        .or_else(|| base.map(|clock| clock.interval))
        .ok_or_else(|| ctx.error("clock interval required"))?;
    if interval.is_zero() {
        return Err(ctx.error("clock interval must be greater than 0"));
    }

    Ok(ClockConfig { kind, interval })
}

impl Resolver {
    /// Resolves a clock reference, returning the instance name when shared.
    pub(super) fn resolve_clock(
        &self,
        raw: &RawClock,
        ctx: &ResolveContext,
    ) -> ResolveResult<(ClockConfig, Option<String>)> {
        match raw.reference() {
            Reference::Instance(name) => {
                if raw.has_overrides() {
                    return Err(cannot_override(name, ctx));
                }
                let clock = self.instance_clocks.get(name).ok_or_else(|| {
                    self.missing(Entity::instance(EntityKind::Clock), name, ctx)
                })?;
                Ok((clock.clone(), Some(name.to_string())))
            }
            Reference::Template(name) => {
                let template = self.template_clocks.get(name).ok_or_else(|| {
                    self.missing(Entity::template(EntityKind::Clock), name, ctx)
                })?;
                let ctx = ctx.push("clock template", name);
                Ok((build_clock(raw, Some(template), &ctx)?, None))
            }
            Reference::Inline => Ok((build_clock(raw, None, ctx)?, None)),
        }
    }

    /// Applies the source fields of `raw` on top of `base`.
    pub(super) fn build_source(
        &self,
        raw: &RawSource,
        base: Option<&SourceConfig>,
        ctx: &ResolveContext,
    ) -> ResolveResult<SourceConfig> {
        let mut source = base.cloned().unwrap_or_default();

        if let Some(kind) = &raw.kind {
            source.kind = kind.clone();
        }
        if let Some(clock) = &raw.clock {
            let (clock, clock_ref) = self.resolve_clock(clock, ctx)?;
            source.clock = Some(clock);
            source.clock_ref = clock_ref;
        }
        if let Some(min) = raw.min {
            source.min = min;
        }
        if let Some(max) = raw.max {
            source.max = max;
        }

        if source.kind.is_empty() {
            return Err(ctx.error("source type required"));
        }
        if source.min > source.max {
            return Err(ctx.error(format!(
                "source min {} exceeds max {}",
                source.min, source.max
            )));
        }
        Ok(source)
    }

    /// Resolves a source reference, returning the instance name when shared.
    pub(super) fn resolve_source(
        &self,
        raw: &RawSource,
        ctx: &ResolveContext,
    ) -> ResolveResult<(SourceConfig, Option<String>)> {
        match raw.reference() {
            Reference::Instance(name) => {
                if raw.has_overrides() {
                    return Err(cannot_override(name, ctx));
                }
                let source = self.instance_sources.get(name).ok_or_else(|| {
                    self.missing(Entity::instance(EntityKind::Source), name, ctx)
                })?;
                Ok((source.clone(), Some(name.to_string())))
            }
            Reference::Template(name) => {
                let template = self.template_sources.get(name).ok_or_else(|| {
                    self.missing(Entity::template(EntityKind::Source), name, ctx)
                })?;
                let ctx = ctx.push("source template", name);
                Ok((self.build_source(raw, Some(template), &ctx)?, None))
            }
            Reference::Inline => Ok((self.build_source(raw, None, ctx)?, None)),
        }
    }

    /// Applies the value fields of `raw` on top of `base`.
    ///
    /// A value `clock` changes only this value's effective clock; the source
    /// keeps its own.
    pub(super) fn build_value(
        &self,
        raw: &RawValue,
        base: Option<&ValueConfig>,
        ctx: &ResolveContext,
    ) -> ResolveResult<ValueConfig> {
        let mut value = base.cloned().unwrap_or_default();

        if let Some(source) = &raw.source {
            let (source, source_ref) = self.resolve_source(source, ctx)?;
            value.source = source;
            value.source_ref = source_ref;
        }
        if let Some(clock) = &raw.clock {
            let (clock, clock_ref) = self.resolve_clock(clock, ctx)?;
            value.clock = Some(clock);
            value.clock_ref = clock_ref;
        }
        if let Some(transforms) = &raw.transforms {
            value.transforms = transforms
                .iter()
                .map(|transform| TransformConfig {
                    kind: transform.kind().to_string(),
                })
                .collect();
        }
        if let Some(reset) = &raw.reset {
            value.reset = Some(ResetConfig {
                kind: reset.kind().to_string(),
                value: reset.value(),
            });
        }

        validate_value(&value, ctx)?;
        Ok(value)
    }

    /// Resolves a value reference. Instance values keep their source and
    /// clock markers, so sharing decisions survive the copy.
    pub(super) fn resolve_value(
        &self,
        raw: &RawValue,
        ctx: &ResolveContext,
    ) -> ResolveResult<ValueConfig> {
        match raw.reference() {
            Reference::Instance(name) => {
                if raw.has_overrides() {
                    return Err(cannot_override(name, ctx));
                }
                self.instance_values.get(name).cloned().ok_or_else(|| {
                    self.missing(Entity::instance(EntityKind::Value), name, ctx)
                })
            }
            Reference::Template(name) => {
                let template = self.template_values.get(name).ok_or_else(|| {
                    self.missing(Entity::template(EntityKind::Value), name, ctx)
                })?;
                let ctx = ctx.push("value template", name);
                self.build_value(raw, Some(template), &ctx)
            }
            Reference::Inline => self.build_value(raw, None, ctx),
        }
    }
}

fn validate_value(value: &ValueConfig, ctx: &ResolveContext) -> ResolveResult<()> {
    if value.source.kind.is_empty() {
        return Err(ctx.error("source required"));
    }
    if value.effective_clock().is_none() {
        return Err(ctx.error("clock required (either on value or source)"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::raw::RawConfig;
    use crate::config::resolve::{resolve, ResolveResult};
    use crate::config::types::{Config, ValueConfig};
    use std::time::Duration;

    const SHARED: &str = r#"
templates:
  clocks: [{name: second, type: periodic, interval: 1s}]
  sources: [{name: dice, type: random_int, clock: {template: second}, min: 1, max: 6}]
  values:
    - {name: counter, source: {template: dice}, transforms: [accumulate], reset: {type: on_read, value: 0}}
instances:
  clocks: [{name: c1, type: periodic, interval: 1s}]
  sources: [{name: s1, type: random_int, clock: {instance: c1}, min: 0, max: 10}]
  values: [{name: v1, source: {instance: s1}}]
"#;

    fn resolve_metric_value(value: &str) -> ResolveResult<ValueConfig> {
        let yaml = format!(
            "{SHARED}\nmetrics:\n  - {{name: m, type: gauge, description: d, value: {value}}}\n"
        );
        let raw: RawConfig = serde_yaml::from_str(&yaml).unwrap();
        resolve(&raw).map(|config: Config| config.metrics[0].value.clone())
    }

    #[test]
    fn test_instance_reference_carries_marker() {
        let value = resolve_metric_value("{source: {instance: s1}}").unwrap();
        assert_eq!(value.source_ref.as_deref(), Some("s1"));
        assert_eq!(value.source.clock_ref.as_deref(), Some("c1"));
        assert_eq!(value.source.max, 10);
    }

    #[test]
    fn test_template_reference_has_no_marker() {
        let value = resolve_metric_value("{source: {template: dice}}").unwrap();
        assert_eq!(value.source_ref, None);
        assert_eq!(value.source.clock_ref, None);
        assert_eq!(value.source.kind, "random_int");
    }

    #[test]
    fn test_instance_override_is_rejected() {
        for reference in [
            "{source: {instance: s1, max: 99}}",
            "{source: {instance: s1, template: dice}}",
            "{source: {instance: s1, clock: {type: periodic, interval: 1s}}}",
            "{instance: v1, reset: on_read}",
            "{instance: v1, transforms: []}",
            "{source: {template: dice, clock: {instance: c1, interval: 5s}}}",
        ] {
            let err = resolve_metric_value(reference).unwrap_err();
            assert!(
                err.message.starts_with("cannot override instance"),
                "{reference}: {err}"
            );
        }
    }

    #[test]
    fn test_template_without_overrides_is_verbatim() {
        let value = resolve_metric_value("{template: counter}").unwrap();
        let again = resolve_metric_value(
            "{source: {template: dice}, transforms: [accumulate], reset: {type: on_read, value: 0}}",
        )
        .unwrap();
        assert_eq!(value, again);
        assert_eq!(value.transforms[0].kind, "accumulate");
        assert_eq!(value.reset.as_ref().unwrap().kind, "on_read");
        assert_eq!(value.reset.as_ref().unwrap().value, 0);
    }

    #[test]
    fn test_template_override_touches_only_present_fields() {
        let value = resolve_metric_value("{template: counter, reset: {type: on_read, value: 7}}")
            .unwrap();
        assert_eq!(value.transforms.len(), 1);
        assert_eq!(value.source.max, 6);
        assert_eq!(value.reset.unwrap().value, 7);

        let narrowed = resolve_metric_value("{source: {template: dice, max: 3}}").unwrap();
        assert_eq!((narrowed.source.min, narrowed.source.max), (1, 3));
    }

    #[test]
    fn test_value_clock_overrides_only_the_value() {
        let value = resolve_metric_value(
            "{source: {instance: s1}, clock: {type: periodic, interval: 250ms}}",
        )
        .unwrap();

        assert_eq!(
            value.clock.as_ref().unwrap().interval,
            Duration::from_millis(250)
        );
        assert_eq!(
            value.source.clock.as_ref().unwrap().interval,
            Duration::from_secs(1)
        );
        let (effective, marker) = value.effective_clock().unwrap();
        assert_eq!(effective.interval, Duration::from_millis(250));
        assert_eq!(marker, None);
    }

    #[test]
    fn test_missing_source_and_clock() {
        let err = resolve_metric_value("{transforms: [accumulate]}").unwrap_err();
        assert_eq!(err.message, "source required");
        assert_eq!(err.path, vec!["metric \"m\""]);

        let err = resolve_metric_value("{source: {type: random_int}}").unwrap_err();
        assert_eq!(err.message, "clock required (either on value or source)");
    }

    #[test]
    fn test_inline_requires_mandatory_fields() {
        let err = resolve_metric_value("{source: {type: random_int, clock: {type: periodic}}}")
            .unwrap_err();
        assert_eq!(err.message, "clock interval required");

        let err = resolve_metric_value(
            "{source: {type: random_int, min: 5, max: 1, clock: {instance: c1}}}",
        )
        .unwrap_err();
        assert_eq!(err.message, "source min 5 exceeds max 1");
    }
}
