use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::types::{ClockSpec, SourceSpec, ValueSpec};

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Unknown {component} type: {kind:?}")]
    UnknownKind {
        component: &'static str,
        kind: String,
    },

    #[error("Invalid {component} configuration: {message}")]
    InvalidSpec {
        component: &'static str,
        message: String,
    },

    #[error("Clock cannot start outside of a tokio runtime")]
    NoRuntime,
}

pub type SimulationResult<T> = Result<T, SimulationError>;

/// Receives ticks from a [`Clock`].
pub trait TickListener: Send + Sync {
    fn on_tick(&self);
}

/// Receives raw updates published by a [`Source`].
pub trait UpdateListener: Send + Sync {
    fn on_update(&self, value: i64);
}

/// Emits periodic ticks to its subscribers.
///
/// `start` and `stop` are idempotent: a clock shared by several sources is
/// started once no matter how many times `start` is called.
pub trait Clock: Send + Sync {
    fn interval(&self) -> Duration;

    fn subscribe(&self, listener: Arc<dyn TickListener>);

    fn start(&self) -> SimulationResult<()>;

    fn stop(&self);

    fn is_running(&self) -> bool;

    /// Delivers one tick to every subscriber on the calling thread.
    fn tick(&self);
}

/// Produces one raw value per observed tick.
pub trait Source: Send + Sync {
    fn subscribe(&self, listener: Arc<dyn UpdateListener>);

    /// Most recently published value, if any tick has been observed.
    fn latest(&self) -> Option<i64>;
}

/// Per-metric state fed by a [`Source`].
///
/// `read` may be called from an exporter thread while ticks keep arriving.
pub trait Value: Send + Sync {
    /// Returns the current reading, applying the reset-on-read policy.
    fn read(&self) -> i64;

    /// Returns the current reading without resetting it.
    fn peek(&self) -> i64;

    fn stop(&self);

    fn is_stopped(&self) -> bool;
}

/// Builds runtime primitives from typed specs.
///
/// The generator depends only on this seam; tests substitute their own
/// factories to observe how many objects get constructed.
pub trait PrimitiveFactory {
    fn clock(&self, spec: &ClockSpec) -> SimulationResult<Arc<dyn Clock>>;

    fn source(
        &self,
        spec: &SourceSpec,
        clock: &Arc<dyn Clock>,
    ) -> SimulationResult<Arc<dyn Source>>;

    fn value(
        &self,
        spec: &ValueSpec,
        source: &Arc<dyn Source>,
    ) -> SimulationResult<Arc<dyn Value>>;
}
