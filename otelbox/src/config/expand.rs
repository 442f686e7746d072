//! Placeholder expansion.
//!
//! A declaration whose name-bearing strings mention `{iterator}` tokens is
//! replaced by one substituted copy per iterator combination. Typed fields
//! (kinds, durations, bounds) are never scanned.

use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use std::mem::take;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

use super::iterator::{Combination, IteratorRegistry};
use super::raw::{
    RawClock, RawConfig, RawMetric, RawMetricName, RawMetricTemplate, RawSource, RawValue,
};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

#[derive(Error, Debug)]
pub enum ExpansionError {
    #[error("iterator {name:?} not declared")]
    UnknownIterator { name: String },

    #[error("iterator {name:?} produces zero results")]
    EmptyIterator { name: String },

    #[error("iterator {name:?} declares value {value:?} more than once")]
    DuplicateValue { name: String, value: String },

    #[error("invalid iterator name {name:?}")]
    InvalidName { name: String },

    #[error("iterator {name:?} has an invalid range: {reason}")]
    InvalidRange { name: String, reason: String },

    #[error("expansion produces zero results")]
    ZeroCombinations,

    #[error("{section} at index {index}: {source}")]
    Entry {
        section: &'static str,
        index: usize,
        #[source]
        source: Box<ExpansionError>,
    },
}

/// Declarations that carry `{iterator}` placeholders.
pub trait Expandable: Clone {
    /// Adds every placeholder name, in order of first appearance.
    fn collect_placeholders(&self, found: &mut IndexSet<String>);

    /// Replaces every `{name}` token whose name is part of `combination`.
    fn substitute(&mut self, combination: &Combination<'_>);

    fn placeholders(&self) -> IndexSet<String> {
        let mut found = IndexSet::new();
        self.collect_placeholders(&mut found);
        found
    }
}

fn scan(text: &str, found: &mut IndexSet<String>) {
    for capture in PLACEHOLDER.captures_iter(text) {
        found.insert(capture[1].to_string());
    }
}

fn scan_opt(text: &Option<String>, found: &mut IndexSet<String>) {
    if let Some(text) = text {
        scan(text, found);
    }
}

pub fn substitute_placeholders(text: &str, combination: &Combination<'_>) -> String {
    PLACEHOLDER
        .replace_all(text, |captures: &regex::Captures<'_>| {
            match combination.get(&captures[1]) {
                Some(value) => value.to_string(),
                None => captures[0].to_string(),
            }
        })
        .into_owned()
}

fn substitute_opt(text: &mut Option<String>, combination: &Combination<'_>) {
    if let Some(text) = text {
        *text = substitute_placeholders(text, combination);
    }
}

impl Expandable for RawClock {
    fn collect_placeholders(&self, found: &mut IndexSet<String>) {
        scan_opt(&self.name, found);
        scan_opt(&self.instance, found);
        scan_opt(&self.template, found);
    }

    fn substitute(&mut self, combination: &Combination<'_>) {
        substitute_opt(&mut self.name, combination);
        substitute_opt(&mut self.instance, combination);
        substitute_opt(&mut self.template, combination);
    }
}

impl Expandable for RawSource {
    fn collect_placeholders(&self, found: &mut IndexSet<String>) {
        scan_opt(&self.name, found);
        scan_opt(&self.instance, found);
        scan_opt(&self.template, found);
        if let Some(clock) = &self.clock {
            clock.collect_placeholders(found);
        }
    }

    fn substitute(&mut self, combination: &Combination<'_>) {
        substitute_opt(&mut self.name, combination);
        substitute_opt(&mut self.instance, combination);
        substitute_opt(&mut self.template, combination);
        if let Some(clock) = &mut self.clock {
            clock.substitute(combination);
        }
    }
}

impl Expandable for RawValue {
    fn collect_placeholders(&self, found: &mut IndexSet<String>) {
        scan_opt(&self.name, found);
        scan_opt(&self.instance, found);
        scan_opt(&self.template, found);
        if let Some(source) = &self.source {
            source.collect_placeholders(found);
        }
        if let Some(clock) = &self.clock {
            clock.collect_placeholders(found);
        }
    }

    fn substitute(&mut self, combination: &Combination<'_>) {
        substitute_opt(&mut self.name, combination);
        substitute_opt(&mut self.instance, combination);
        substitute_opt(&mut self.template, combination);
        if let Some(source) = &mut self.source {
            source.substitute(combination);
        }
        if let Some(clock) = &mut self.clock {
            clock.substitute(combination);
        }
    }
}

impl Expandable for RawMetricName {
    fn collect_placeholders(&self, found: &mut IndexSet<String>) {
        match self {
            Self::Short(name) => scan(name, found),
            Self::Long(forms) => {
                scan_opt(&forms.prometheus, found);
                scan_opt(&forms.otel, found);
            }
        }
    }

    fn substitute(&mut self, combination: &Combination<'_>) {
        match self {
            Self::Short(name) => *name = substitute_placeholders(name, combination),
            Self::Long(forms) => {
                substitute_opt(&mut forms.prometheus, combination);
                substitute_opt(&mut forms.otel, combination);
            }
        }
    }
}

fn collect_metric_fields(
    template: &Option<String>,
    description: &Option<String>,
    attributes: &Option<IndexMap<String, String>>,
    value: &Option<RawValue>,
    found: &mut IndexSet<String>,
) {
    scan_opt(template, found);
    scan_opt(description, found);
    if let Some(attributes) = attributes {
        for value in attributes.values() {
            scan(value, found);
        }
    }
    if let Some(value) = value {
        value.collect_placeholders(found);
    }
}

fn substitute_metric_fields(
    template: &mut Option<String>,
    description: &mut Option<String>,
    attributes: &mut Option<IndexMap<String, String>>,
    value: &mut Option<RawValue>,
    combination: &Combination<'_>,
) {
    substitute_opt(template, combination);
    substitute_opt(description, combination);
    if let Some(attributes) = attributes {
        for value in attributes.values_mut() {
            *value = substitute_placeholders(value, combination);
        }
    }
    if let Some(value) = value {
        value.substitute(combination);
    }
}

impl Expandable for RawMetric {
    fn collect_placeholders(&self, found: &mut IndexSet<String>) {
        self.name.collect_placeholders(found);
        collect_metric_fields(
            &self.template,
            &self.description,
            &self.attributes,
            &self.value,
            found,
        );
    }

    fn substitute(&mut self, combination: &Combination<'_>) {
        self.name.substitute(combination);
        substitute_metric_fields(
            &mut self.template,
            &mut self.description,
            &mut self.attributes,
            &mut self.value,
            combination,
        );
    }
}

impl Expandable for RawMetricTemplate {
    fn collect_placeholders(&self, found: &mut IndexSet<String>) {
        scan_opt(&self.name, found);
        collect_metric_fields(
            &self.template,
            &self.description,
            &self.attributes,
            &self.value,
            found,
        );
    }

    fn substitute(&mut self, combination: &Combination<'_>) {
        substitute_opt(&mut self.name, combination);
        substitute_metric_fields(
            &mut self.template,
            &mut self.description,
            &mut self.attributes,
            &mut self.value,
            combination,
        );
    }
}

/// Expands one list of declarations.
///
/// Entries without placeholders are kept verbatim; every other entry is
/// replaced, in place, by its combinations.
pub fn expand_entries<T: Expandable>(
    section: &'static str,
    entries: Vec<T>,
    registry: &IteratorRegistry,
) -> Result<Vec<T>, ExpansionError> {
    let mut expanded = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let wrap = |source: ExpansionError| ExpansionError::Entry {
            section,
            index,
            source: Box::new(source),
        };

        let used = entry.placeholders();
        if used.is_empty() {
            expanded.push(entry);
            continue;
        }

        let generator = registry.get_iterators(&used).map_err(wrap)?;
        if generator.total() == 0 {
            return Err(wrap(ExpansionError::ZeroCombinations));
        }

        generator.for_each(|combination| {
            let mut clone = entry.clone();
            clone.substitute(combination);
            expanded.push(clone);
            Ok::<(), ExpansionError>(())
        })
        .map_err(wrap)?;

        debug!(
            section,
            index,
            combinations = generator.total(),
            "Expanded declaration"
        );
    }

    Ok(expanded)
}

/// Expands every template, instance and metric declaration of `raw`.
pub fn expand(raw: &mut RawConfig) -> Result<(), ExpansionError> {
    let registry = IteratorRegistry::from_raw(&raw.iterators)?;
    if !registry.is_empty() {
        debug!(iterators = registry.len(), "Iterators declared");
    }

    let templates = &mut raw.templates;
    templates.clocks = expand_entries("templates.clocks", take(&mut templates.clocks), &registry)?;
    templates.sources =
        expand_entries("templates.sources", take(&mut templates.sources), &registry)?;
    templates.values = expand_entries("templates.values", take(&mut templates.values), &registry)?;
    templates.metrics =
        expand_entries("templates.metrics", take(&mut templates.metrics), &registry)?;

    let instances = &mut raw.instances;
    instances.clocks = expand_entries("instances.clocks", take(&mut instances.clocks), &registry)?;
    instances.sources =
        expand_entries("instances.sources", take(&mut instances.sources), &registry)?;
    instances.values = expand_entries("instances.values", take(&mut instances.values), &registry)?;

    raw.metrics = expand_entries("metrics", take(&mut raw.metrics), &registry)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> IteratorRegistry {
        let mut registry = IteratorRegistry::new();
        registry
            .declare("region", vec!["us".to_string(), "eu".to_string()])
            .unwrap();
        registry
            .declare("env", vec!["prod".to_string(), "dev".to_string(), "qa".to_string()])
            .unwrap();
        registry
    }

    fn source(name: &str) -> RawSource {
        RawSource {
            name: Some(name.to_string()),
            kind: Some("random_int".to_string()),
            min: Some(0),
            max: Some(10),
            ..Default::default()
        }
    }

    #[test]
    fn test_placeholder_free_entries_are_identity() {
        let entries = vec![source("a"), source("b")];
        let expanded = expand_entries("instances.sources", entries.clone(), &registry()).unwrap();
        assert_eq!(expanded, entries);
    }

    #[test]
    fn test_single_iterator_expansion() {
        let expanded =
            expand_entries("instances.sources", vec![source("api-{region}")], &registry()).unwrap();

        let names: Vec<_> = expanded.iter().map(|s| s.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["api-us", "api-eu"]);
        assert!(expanded.iter().all(|s| s.kind.as_deref() == Some("random_int")));
    }

    #[test]
    fn test_nested_placeholders_multiply() {
        let mut value = RawValue {
            name: Some("v-{region}".to_string()),
            source: Some(RawSource {
                instance: Some("src-{env}".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        value.clock = Some(RawClock {
            instance: Some("clk-{region}".to_string()),
            ..Default::default()
        });

        assert_eq!(
            value.placeholders().into_iter().collect::<Vec<_>>(),
            vec!["region", "env"]
        );

        let expanded = expand_entries("instances.values", vec![value], &registry()).unwrap();
        assert_eq!(expanded.len(), 6);
        for value in &expanded {
            let name = value.name.as_deref().unwrap();
            let source = value.source.as_ref().unwrap().instance.as_deref().unwrap();
            let clock = value.clock.as_ref().unwrap().instance.as_deref().unwrap();
            assert!(!name.contains('{') && !source.contains('{') && !clock.contains('{'));
            assert_eq!(&name[2..], &clock[4..]);
        }
        assert_eq!(expanded[0].name.as_deref(), Some("v-us"));
        assert_eq!(
            expanded[1].source.as_ref().unwrap().instance.as_deref(),
            Some("src-dev")
        );
    }

    #[test]
    fn test_unknown_iterator_is_index_qualified() {
        let entries = vec![source("ok"), source("api-{zone}")];
        let err = expand_entries("instances.sources", entries, &registry()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "instances.sources at index 1: iterator \"zone\" not declared"
        );
    }

    #[test]
    fn test_typed_fields_are_not_scanned() {
        let mut clock = RawClock {
            name: Some("c".to_string()),
            kind: Some("{region}".to_string()),
            ..Default::default()
        };
        assert!(clock.placeholders().is_empty());

        let combination: Combination<'_> = [("region", "us")].into_iter().collect();
        clock.substitute(&combination);
        assert_eq!(clock.kind.as_deref(), Some("{region}"));
    }

    #[test]
    fn test_metric_expansion_covers_names_and_attributes() {
        let metric: RawMetric = serde_yaml::from_str(
            r#"
name: {prometheus: "requests_{region}", otel: "requests.{region}"}
description: "Requests in {region}"
attributes: {region: "{region}"}
value: {instance: "v-{region}"}
"#,
        )
        .unwrap();

        let expanded = expand_entries("metrics", vec![metric], &registry()).unwrap();
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[1].name.prometheus(), "requests_eu");
        assert_eq!(expanded[1].name.otel(), "requests.eu");
        assert_eq!(expanded[1].description.as_deref(), Some("Requests in eu"));
        assert_eq!(expanded[1].attributes.as_ref().unwrap()["region"], "eu");
        assert_eq!(
            expanded[1].value.as_ref().unwrap().instance.as_deref(),
            Some("v-eu")
        );
    }

    #[test]
    fn test_expand_document_rejects_empty_iterator() {
        let mut raw: RawConfig = serde_yaml::from_str(
            r#"
iterators:
  region: []
metrics: [{name: x}]
"#,
        )
        .unwrap();
        assert!(matches!(
            expand(&mut raw),
            Err(ExpansionError::EmptyIterator { .. })
        ));
    }
}
