use indexmap::IndexMap;
use std::fmt;

use super::context::{ResolveContext, ResolveResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Clock,
    Source,
    Value,
    Metric,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clock => "clock",
            Self::Source => "source",
            Self::Value => "value",
            Self::Metric => "metric",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Template,
    Instance,
}

/// Kind and registry of a declared name, e.g. "source instance".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entity {
    pub kind: EntityKind,
    pub origin: Origin,
}

impl Entity {
    pub fn template(kind: EntityKind) -> Self {
        Self {
            kind,
            origin: Origin::Template,
        }
    }

    pub fn instance(kind: EntityKind) -> Self {
        Self {
            kind,
            origin: Origin::Instance,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = match self.origin {
            Origin::Template => "template",
            Origin::Instance => "instance",
        };
        write!(f, "{} {origin}", self.kind.as_str())
    }
}

/// One flat set of names shared by every kind and both registries.
#[derive(Debug, Default)]
pub struct Namespace {
    names: IndexMap<String, Entity>,
}

impl Namespace {
    pub fn register(
        &mut self,
        name: &str,
        entity: Entity,
        ctx: &ResolveContext,
    ) -> ResolveResult<()> {
        if let Some(existing) = self.names.get(name) {
            return Err(ctx.error(format!(
                "name {name:?} already used by {existing}, cannot reuse for {entity}"
            )));
        }
        self.names.insert(name.to_string(), entity);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Entity> {
        self.names.get(name).copied()
    }
}
