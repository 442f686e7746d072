use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::primitives::{UpdateListener, Value};
use crate::transform::{apply_chain, build_transform, Transform};
use crate::types::{ResetPolicy, ValueSpec};

/// Value folding source updates through a transform chain.
pub struct SimValue {
    transforms: Vec<Box<dyn Transform>>,
    reset: ResetPolicy,
    current: Mutex<i64>,
    stopped: AtomicBool,
}

impl SimValue {
    pub fn new(spec: &ValueSpec) -> Self {
        let initial = match spec.reset {
            ResetPolicy::OnRead { value } => value,
            ResetPolicy::Never => 0,
        };
        Self {
            transforms: spec.transforms.iter().copied().map(build_transform).collect(),
            reset: spec.reset,
            current: Mutex::new(initial),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn reset_policy(&self) -> ResetPolicy {
        self.reset
    }
}

impl UpdateListener for SimValue {
    fn on_update(&self, update: i64) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let mut current = self.current.lock();
        *current = apply_chain(&self.transforms, *current, update);
    }
}

impl Value for SimValue {
    fn read(&self) -> i64 {
        let mut current = self.current.lock();
        let reading = *current;
        if let ResetPolicy::OnRead { value } = self.reset {
            *current = value;
        }
        reading
    }

    fn peek(&self) -> i64 {
        *self.current.lock()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
