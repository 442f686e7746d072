//! Telemetry signal generator.
//!
//! A declarative document is compiled by [`config`] into a resolved
//! [`Config`], materialized by [`Generator`] into live simulation objects, and
//! exposed to exporters through the [`MetricRegistry`].

pub mod config;
pub mod generator;
pub mod metric;

pub use config::{load, Config, ConfigError, ConfigResult};
pub use generator::{
    ConstructionError, Generator, GeneratorError, GeneratorResult, MetricHandles,
};
pub use metric::{MetricDescriptor, MetricPoint, MetricRegistry, RegistryError};
