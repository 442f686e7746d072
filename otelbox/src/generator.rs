//! Materializes resolved metrics into live simulation objects.
//!
//! Clocks and sources that came from an instance reference are built once and
//! shared by every metric naming that instance. Anything that came from a
//! template or an inline definition is built fresh for each metric. Every
//! metric gets its own value.

use indexmap::IndexMap;
use simulation::{
    Clock, ClockSpec, PrimitiveFactory, ResetPolicy, SimulationError, SimulationResult, Source,
    SourceSpec, TransformKind, Value, ValueSpec,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{
    ClockConfig, Config, InstanceRegistry, MetricConfig, SourceConfig, ValueConfig,
};

/// Why one metric's runtime objects could not be built.
#[derive(Error, Debug)]
pub enum ConstructionError {
    #[error("{kind} instance {name:?} not found")]
    MissingInstance { kind: &'static str, name: String },

    #[error("{owner} has no clock")]
    NoClock { owner: String },

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Failed to construct metric {index} ({metric}): {source}")]
    Construction {
        index: usize,
        metric: String,
        #[source]
        source: ConstructionError,
    },

    #[error("Failed to start generator: {0}")]
    Start(#[from] SimulationError),
}

pub type GeneratorResult<T> = Result<T, GeneratorError>;

/// Runtime objects backing one metric.
#[derive(Clone)]
pub struct MetricHandles {
    pub clock: Arc<dyn Clock>,
    pub source: Arc<dyn Source>,
    pub value: Arc<dyn Value>,
}

/// A source instance together with the clock it was subscribed to.
#[derive(Clone)]
struct SharedSource {
    clock: Arc<dyn Clock>,
    source: Arc<dyn Source>,
}

pub struct Generator {
    /// Every distinct clock, in construction order.
    clocks: Vec<Arc<dyn Clock>>,
    shared_clocks: IndexMap<String, Arc<dyn Clock>>,
    shared_sources: IndexMap<String, SharedSource>,
    source_count: usize,
    metrics: Vec<MetricHandles>,
    running: AtomicBool,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("clocks", &self.clocks.len())
            .field("sources", &self.source_count)
            .field("metrics", &self.metrics.len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Generator {
    pub fn from_config(config: &Config, factory: &dyn PrimitiveFactory) -> GeneratorResult<Self> {
        Self::new(&config.metrics, &config.instances, factory)
    }

    /// Builds the runtime graph. Metric `i` of the input is value `i` here.
    pub fn new(
        metrics: &[MetricConfig],
        instances: &InstanceRegistry,
        factory: &dyn PrimitiveFactory,
    ) -> GeneratorResult<Self> {
        let mut builder = Builder {
            factory,
            instances,
            clocks: Vec::new(),
            shared_clocks: IndexMap::new(),
            shared_sources: IndexMap::new(),
            source_count: 0,
        };

        let mut handles = Vec::with_capacity(metrics.len());
        for (index, metric) in metrics.iter().enumerate() {
            let metric_handles =
                builder
                    .metric(&metric.value)
                    .map_err(|source| GeneratorError::Construction {
                        index,
                        metric: metric.display_name().to_string(),
                        source,
                    })?;
            handles.push(metric_handles);
        }

        let generator = Self {
            clocks: builder.clocks,
            shared_clocks: builder.shared_clocks,
            shared_sources: builder.shared_sources,
            source_count: builder.source_count,
            metrics: handles,
            running: AtomicBool::new(false),
        };
        info!(
            metrics = generator.metrics.len(),
            clocks = generator.clocks.len(),
            sources = generator.source_count,
            "Generator built"
        );
        Ok(generator)
    }

    /// Starts every distinct clock once.
    pub fn start(&self) -> GeneratorResult<()> {
        self.running.store(true, Ordering::SeqCst);
        for clock in &self.clocks {
            clock.start()?;
        }
        info!(clocks = self.clocks.len(), "Generator started");
        Ok(())
    }

    /// Stops every clock, then every value, so no tick reaches a value being
    /// torn down. Does nothing unless the generator was started.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for clock in &self.clocks {
            clock.stop();
        }
        for handles in &self.metrics {
            handles.value.stop();
        }
        debug!("Generator stopped");
    }

    /// Delivers one tick from every distinct clock, on the calling thread.
    pub fn tick_all(&self) {
        for clock in &self.clocks {
            clock.tick();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn value(&self, index: usize) -> Option<&Arc<dyn Value>> {
        self.metrics.get(index).map(|handles| &handles.value)
    }

    pub fn handles(&self, index: usize) -> Option<&MetricHandles> {
        self.metrics.get(index)
    }

    pub fn shared_clock(&self, name: &str) -> Option<&Arc<dyn Clock>> {
        self.shared_clocks.get(name)
    }

    pub fn shared_source(&self, name: &str) -> Option<&Arc<dyn Source>> {
        self.shared_sources.get(name).map(|shared| &shared.source)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn clock_count(&self) -> usize {
        self.clocks.len()
    }

    pub fn source_count(&self) -> usize {
        self.source_count
    }
}

/// Construction-time state; dropped once the graph is built.
struct Builder<'a> {
    factory: &'a dyn PrimitiveFactory,
    instances: &'a InstanceRegistry,
    clocks: Vec<Arc<dyn Clock>>,
    shared_clocks: IndexMap<String, Arc<dyn Clock>>,
    shared_sources: IndexMap<String, SharedSource>,
    source_count: usize,
}

impl Builder<'_> {
    /// Builds the clock, source and value behind one metric.
    ///
    /// A source instance is shared, together with its clock, only by values
    /// that run on the source's own clock. A source follows exactly one clock,
    /// so a value with its own `clock` gets a private source built from the
    /// instance's configuration.
    fn metric(&mut self, value: &ValueConfig) -> Result<MetricHandles, ConstructionError> {
        let SharedSource { clock, source } = match (value.source_ref.as_deref(), &value.clock) {
            (Some(name), None) => self.shared_source(name)?,
            _ => {
                let (config, reference) = value.effective_clock().ok_or_else(|| {
                    ConstructionError::NoClock {
                        owner: "value".to_string(),
                    }
                })?;
                let clock = self.clock(config, reference)?;
                let source = self.build_source(&value.source, &clock)?;
                SharedSource { clock, source }
            }
        };

        let handle = self.factory.value(&value_spec(value)?, &source)?;

        Ok(MetricHandles {
            clock,
            source,
            value: handle,
        })
    }

    fn clock(
        &mut self,
        config: &ClockConfig,
        reference: Option<&str>,
    ) -> Result<Arc<dyn Clock>, ConstructionError> {
        let Some(name) = reference else {
            return self.build_clock(config);
        };
        if let Some(clock) = self.shared_clocks.get(name) {
            return Ok(clock.clone());
        }

        let instances = self.instances;
        let config = instances
            .clocks
            .get(name)
            .ok_or_else(|| ConstructionError::MissingInstance {
                kind: "clock",
                name: name.to_string(),
            })?;
        let clock = self.build_clock(config)?;
        debug!(instance = name, "Shared clock created");
        self.shared_clocks.insert(name.to_string(), clock.clone());
        Ok(clock)
    }

    fn build_clock(&mut self, config: &ClockConfig) -> Result<Arc<dyn Clock>, ConstructionError> {
        let clock = self.factory.clock(&clock_spec(config)?)?;
        self.clocks.push(clock.clone());
        Ok(clock)
    }

    /// Returns the instance's source and clock, building both on first use.
    fn shared_source(&mut self, name: &str) -> Result<SharedSource, ConstructionError> {
        if let Some(shared) = self.shared_sources.get(name) {
            return Ok(shared.clone());
        }

        let instances = self.instances;
        let config = instances
            .sources
            .get(name)
            .ok_or_else(|| ConstructionError::MissingInstance {
                kind: "source",
                name: name.to_string(),
            })?;
        let clock_config = config
            .clock
            .as_ref()
            .ok_or_else(|| ConstructionError::NoClock {
                owner: format!("source instance {name:?}"),
            })?;

        let clock = self.clock(clock_config, config.clock_ref.as_deref())?;
        let source = self.build_source(config, &clock)?;
        debug!(instance = name, "Shared source created");

        let shared = SharedSource { clock, source };
        self.shared_sources.insert(name.to_string(), shared.clone());
        Ok(shared)
    }

    fn build_source(
        &mut self,
        config: &SourceConfig,
        clock: &Arc<dyn Clock>,
    ) -> Result<Arc<dyn Source>, ConstructionError> {
        let source = self.factory.source(&source_spec(config)?, clock)?;
        self.source_count += 1;
        Ok(source)
    }
}

fn clock_spec(config: &ClockConfig) -> SimulationResult<ClockSpec> {
    Ok(ClockSpec {
        kind: config.kind.parse()?,
        interval: config.interval,
    })
}

fn source_spec(config: &SourceConfig) -> SimulationResult<SourceSpec> {
    Ok(SourceSpec {
        kind: config.kind.parse()?,
        min: config.min,
        max: config.max,
    })
}

fn value_spec(config: &ValueConfig) -> SimulationResult<ValueSpec> {
    let transforms = config
        .transforms
        .iter()
        .map(|transform| transform.kind.parse::<TransformKind>())
        .collect::<SimulationResult<Vec<_>>>()?;
    let reset = match &config.reset {
        Some(reset) => ResetPolicy::parse(&reset.kind, reset.value)?,
        None => ResetPolicy::Never,
    };
    Ok(ValueSpec { transforms, reset })
}
