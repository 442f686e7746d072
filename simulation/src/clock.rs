use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::primitives::{Clock, SimulationError, SimulationResult, TickListener};

struct Listeners {
    listeners: Mutex<Vec<Arc<dyn TickListener>>>,
}

impl Listeners {
    fn fire(&self) {
        // Snapshot so a listener can never observe the lock held.
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener.on_tick();
        }
    }
}

/// Clock ticking at a fixed interval on the ambient tokio runtime.
pub struct PeriodicClock {
    interval: Duration,
    shared: Arc<Listeners>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            shared: Arc::new(Listeners {
                listeners: Mutex::new(Vec::new()),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.listeners.lock().len()
    }
}

impl Clock for PeriodicClock {
    fn interval(&self) -> Duration {
        self.interval
    }

    fn subscribe(&self, listener: Arc<dyn TickListener>) {
        self.shared.listeners.lock().push(listener);
    }

    fn start(&self) -> SimulationResult<()> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Ok(());
        }

        let handle = Handle::try_current().map_err(|_| SimulationError::NoRuntime)?;
        let shared = Arc::clone(&self.shared);
        let period = self.interval;

        *task = Some(handle.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                shared.fire();
            }
        }));
        debug!("Clock started with {:?} interval", period);
        Ok(())
    }

    fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!("Clock with {:?} interval stopped", self.interval);
        }
    }

    fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    fn tick(&self) {
        self.shared.fire();
    }
}

impl Drop for PeriodicClock {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        ticks: AtomicUsize,
    }

    impl TickListener for Counter {
        fn on_tick(&self) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_manual_tick_reaches_all_subscribers() {
        let clock = PeriodicClock::new(Duration::from_secs(1));
        let first = Arc::new(Counter::default());
        let second = Arc::new(Counter::default());
        clock.subscribe(first.clone());
        clock.subscribe(second.clone());

        clock.tick();
        clock.tick();

        assert_eq!(clock.subscriber_count(), 2);
        assert_eq!(first.ticks.load(Ordering::SeqCst), 2);
        assert_eq!(second.ticks.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_start_requires_runtime() {
        let clock = PeriodicClock::new(Duration::from_secs(1));
        assert!(matches!(clock.start(), Err(SimulationError::NoRuntime)));
        assert!(!clock.is_running());
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let clock = PeriodicClock::new(Duration::from_secs(1));
        clock.stop();
        clock.stop();
        assert!(!clock.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_ticks() {
        let clock = PeriodicClock::new(Duration::from_millis(100));
        let counter = Arc::new(Counter::default());
        clock.subscribe(counter.clone());

        clock.start().unwrap();
        clock.start().unwrap();
        assert!(clock.is_running());

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 3);

        clock.stop();
        assert!(!clock.is_running());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 3);
    }
}
