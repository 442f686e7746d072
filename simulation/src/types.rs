use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::primitives::{SimulationError, SimulationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockKind {
    Periodic,
}

impl FromStr for ClockKind {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "periodic" => Ok(Self::Periodic),
            other => Err(SimulationError::UnknownKind {
                component: "clock",
                kind: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ClockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Periodic => f.write_str("periodic"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    RandomInt,
}

impl FromStr for SourceKind {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random_int" => Ok(Self::RandomInt),
            other => Err(SimulationError::UnknownKind {
                component: "source",
                kind: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RandomInt => f.write_str("random_int"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    Accumulate,
}

impl FromStr for TransformKind {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accumulate" => Ok(Self::Accumulate),
            "" => Err(SimulationError::InvalidSpec {
                component: "transform",
                message: "transform type cannot be empty".to_string(),
            }),
            other => Err(SimulationError::UnknownKind {
                component: "transform",
                kind: other.to_string(),
            }),
        }
    }
}

/// What happens to a value after it has been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    #[default]
    Never,
    OnRead {
        value: i64,
    },
}

impl ResetPolicy {
    /// Builds a policy from its configured type name; an empty name means no reset.
    pub fn parse(kind: &str, value: i64) -> SimulationResult<Self> {
        match kind {
            "" => Ok(Self::Never),
            "on_read" => Ok(Self::OnRead { value }),
            other => Err(SimulationError::UnknownKind {
                component: "reset",
                kind: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockSpec {
    pub kind: ClockKind,
    pub interval: Duration,
}

impl ClockSpec {
    pub fn periodic(interval: Duration) -> Self {
        Self {
            kind: ClockKind::Periodic,
            interval,
        }
    }

    pub fn validate(&self) -> SimulationResult<()> {
        if self.interval.is_zero() {
            return Err(SimulationError::InvalidSpec {
                component: "clock",
                message: "interval must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub kind: SourceKind,
    pub min: i64,
    pub max: i64,
}

impl SourceSpec {
    pub fn random_int(min: i64, max: i64) -> Self {
        Self {
            kind: SourceKind::RandomInt,
            min,
            max,
        }
    }

    pub fn validate(&self) -> SimulationResult<()> {
        if self.min > self.max {
            return Err(SimulationError::InvalidSpec {
                component: "source",
                message: format!("min {} exceeds max {}", self.min, self.max),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValueSpec {
    pub transforms: Vec<TransformKind>,
    pub reset: ResetPolicy,
}

impl ValueSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transform(mut self, transform: TransformKind) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn with_reset(mut self, reset: ResetPolicy) -> Self {
        self.reset = reset;
        self
    }
}
