//! Runtime primitives behind generated signals.
//!
//! Clocks tick, sources turn ticks into raw numbers, and values fold those
//! numbers through a transform chain. [`PrimitiveFactory`] is the seam that
//! builds them; [`DefaultFactory`] is the stock implementation.

pub mod clock;
pub mod factory;
pub mod primitives;
pub mod seed;
pub mod source;
pub mod transform;
pub mod types;
pub mod value;

pub use clock::PeriodicClock;
pub use factory::DefaultFactory;
pub use primitives::{
    Clock, PrimitiveFactory, SimulationError, SimulationResult, Source, TickListener,
    UpdateListener, Value,
};
pub use seed::SeedRegistry;
pub use source::RandomIntSource;
pub use transform::{apply_chain, Accumulate, Transform};
pub use types::{
    ClockKind, ClockSpec, ResetPolicy, SourceKind, SourceSpec, TransformKind, ValueSpec,
};
pub use value::SimValue;

pub mod prelude {
    pub use crate::primitives::*;
    pub use crate::types::*;
    pub use crate::{DefaultFactory, SeedRegistry};
}
