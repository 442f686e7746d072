use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Arc;

use crate::primitives::{Source, TickListener, UpdateListener};

struct SourceState {
    rng: StdRng,
    latest: Option<i64>,
}

/// Draws a uniform integer in `[min, max]` on every tick.
pub struct RandomIntSource {
    min: i64,
    max: i64,
    state: Mutex<SourceState>,
    listeners: Mutex<Vec<Arc<dyn UpdateListener>>>,
}

impl RandomIntSource {
    /// `min` must not exceed `max`; [`crate::SourceSpec::validate`] checks this.
    pub fn new(min: i64, max: i64, rng: StdRng) -> Self {
        Self {
            min,
            max,
            state: Mutex::new(SourceState { rng, latest: None }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn bounds(&self) -> (i64, i64) {
        (self.min, self.max)
    }

    fn publish(&self, value: i64) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener.on_update(value);
        }
    }
}

impl TickListener for RandomIntSource {
    fn on_tick(&self) {
        let value = {
            let mut state = self.state.lock();
            let value = state.rng.gen_range(self.min..=self.max);
            state.latest = Some(value);
            value
        };
        self.publish(value);
    }
}

impl Source for RandomIntSource {
    fn subscribe(&self, listener: Arc<dyn UpdateListener>) {
        self.listeners.lock().push(listener);
    }

    fn latest(&self) -> Option<i64> {
        self.state.lock().latest
    }
}
