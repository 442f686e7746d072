use std::sync::Arc;
use tracing::debug;

use crate::clock::PeriodicClock;
use crate::primitives::{Clock, PrimitiveFactory, SimulationResult, Source, Value};
use crate::seed::SeedRegistry;
use crate::source::RandomIntSource;
use crate::types::{ClockKind, ClockSpec, SourceKind, SourceSpec, ValueSpec};
use crate::value::SimValue;

/// Builds the stock primitives, seeding every source from one registry.
pub struct DefaultFactory {
    seeds: SeedRegistry,
}

impl DefaultFactory {
    pub fn new(seeds: SeedRegistry) -> Self {
        Self { seeds }
    }

    pub fn seeds(&self) -> &SeedRegistry {
        &self.seeds
    }
}

impl PrimitiveFactory for DefaultFactory {
    fn clock(&self, spec: &ClockSpec) -> SimulationResult<Arc<dyn Clock>> {
        spec.validate()?;
        match spec.kind {
            ClockKind::Periodic => Ok(Arc::new(PeriodicClock::new(spec.interval))),
        }
    }

    fn source(
        &self,
        spec: &SourceSpec,
        clock: &Arc<dyn Clock>,
    ) -> SimulationResult<Arc<dyn Source>> {
        spec.validate()?;
        match spec.kind {
            SourceKind::RandomInt => {
                let source = Arc::new(RandomIntSource::new(
                    spec.min,
                    spec.max,
                    self.seeds.next_rng(),
                ));
                clock.subscribe(source.clone());
                debug!(min = spec.min, max = spec.max, "Random int source created");
                Ok(source)
            }
        }
    }

    fn value(
        &self,
        spec: &ValueSpec,
        source: &Arc<dyn Source>,
    ) -> SimulationResult<Arc<dyn Value>> {
        let value = Arc::new(SimValue::new(spec));
        source.subscribe(value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ResetPolicy, TransformKind};
    use std::time::Duration;

    #[test]
    fn test_factory_wires_clock_source_value() {
        let factory = DefaultFactory::new(SeedRegistry::with_seed(3));
        let clock = factory
            .clock(&ClockSpec::periodic(Duration::from_secs(1)))
            .unwrap();
        let source = factory
            .source(&SourceSpec::random_int(1, 1), &clock)
            .unwrap();
        let value = factory
            .value(
                &ValueSpec::new()
                    .with_transform(TransformKind::Accumulate)
                    .with_reset(ResetPolicy::OnRead { value: 0 }),
                &source,
            )
            .unwrap();

        clock.tick();
        clock.tick();
        clock.tick();

        assert_eq!(source.latest(), Some(1));
        assert_eq!(value.read(), 3);
        assert_eq!(value.read(), 0);
        assert_eq!(factory.seeds().current(), (3, 1));
    }

    #[test]
    fn test_factory_rejects_invalid_specs() {
        let factory = DefaultFactory::new(SeedRegistry::with_seed(0));
        assert!(factory.clock(&ClockSpec::periodic(Duration::ZERO)).is_err());

        let clock = factory
            .clock(&ClockSpec::periodic(Duration::from_secs(1)))
            .unwrap();
        assert!(factory.source(&SourceSpec::random_int(2, 1), &clock).is_err());
    }
}
