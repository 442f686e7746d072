use crate::types::TransformKind;

/// Combines a value's current reading with an incoming update.
pub trait Transform: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, current: i64, update: i64) -> i64;
}

/// Running sum of every update since the last reset.
#[derive(Debug, Default, Clone, Copy)]
pub struct Accumulate;

impl Transform for Accumulate {
    fn name(&self) -> &'static str {
        "accumulate"
    }

    fn apply(&self, current: i64, update: i64) -> i64 {
        current.saturating_add(update)
    }
}

pub fn build_transform(kind: TransformKind) -> Box<dyn Transform> {
    match kind {
        TransformKind::Accumulate => Box::new(Accumulate),
    }
}

/// Folds `update` through `transforms` in order.
///
/// With no transforms the update replaces the current reading.
pub fn apply_chain(transforms: &[Box<dyn Transform>], current: i64, update: i64) -> i64 {
    if transforms.is_empty() {
        return update;
    }
    transforms
        .iter()
        .fold(update, |next, transform| transform.apply(current, next))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_chain_replaces() {
        assert_eq!(apply_chain(&[], 10, 3), 3);
    }

    #[test]
    fn test_accumulate() {
        let chain = vec![build_transform(TransformKind::Accumulate)];
        let mut current = 0;
        for update in [1, 2, 3, 4] {
            current = apply_chain(&chain, current, update);
        }
        assert_eq!(current, 10);
        assert_eq!(chain[0].name(), "accumulate");
    }

    #[test]
    fn test_accumulate_saturates() {
        assert_eq!(Accumulate.apply(i64::MAX, 1), i64::MAX);
    }
}
