use std::fmt;
use thiserror::Error;

/// Breadcrumb trail describing where the resolver currently is.
///
/// Pushing returns a new context; the parent is never mutated, so sibling
/// references each carry their own path.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    frames: Vec<String>,
}

impl ResolveContext {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn push(&self, component: &str, name: &str) -> Self {
        let mut frames = self.frames.clone();
        frames.push(format!("{component} {name:?}"));
        Self { frames }
    }

    pub fn error(&self, message: impl Into<String>) -> ResolveError {
        ResolveError {
            message: message.into(),
            path: self.frames.iter().rev().cloned().collect(),
        }
    }
}

/// A resolution failure with its reference path, most specific frame first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ResolveError {
    pub message: String,
    pub path: Vec<String>,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for frame in &self.path {
            write!(f, "\n  in {frame}")?;
        }
        Ok(())
    }
}

pub type ResolveResult<T> = Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_renders_most_specific_first() {
        let ctx = ResolveContext::root()
            .push("metric", "requests_total")
            .push("value template", "counter");
        let err = ctx.error("source required");

        assert_eq!(
            err.to_string(),
            "source required\n  in value template \"counter\"\n  in metric \"requests_total\""
        );
    }

    #[test]
    fn test_push_leaves_parent_untouched() {
        let parent = ResolveContext::root().push("metric", "a");
        let child = parent.push("source instance", "s1");

        assert_eq!(parent.error("x").path, vec!["metric \"a\""]);
        assert_eq!(
            child.error("x").path,
            vec!["source instance \"s1\"", "metric \"a\""]
        );
    }

    #[test]
    fn test_root_error_has_no_path() {
        assert_eq!(ResolveContext::root().error("boom").to_string(), "boom");
    }
}
