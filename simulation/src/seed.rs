use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Hands out independently seeded RNG streams derived from one master seed.
///
/// Every call to [`SeedRegistry::next_rng`] advances a stream counter, so the
/// same master seed and the same construction order reproduce the same
/// sequence of generated values.
#[derive(Debug)]
pub struct SeedRegistry {
    master: u64,
    explicit: bool,
    stream: AtomicU64,
}

impl SeedRegistry {
    /// Uses the configured seed, or the wall clock when none was given.
    pub fn new(seed: Option<u64>) -> Self {
        let (master, explicit) = match seed {
            Some(seed) => (seed, true),
            None => (wall_clock_seed(), false),
        };

        let registry = Self {
            master,
            explicit,
            stream: AtomicU64::new(0),
        };
        info!(master, explicit, "Seed initialized");
        registry
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(Some(seed))
    }

    pub fn master(&self) -> u64 {
        self.master
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Returns `(master, streams handed out so far)`.
    pub fn current(&self) -> (u64, u64) {
        (self.master, self.stream.load(Ordering::SeqCst))
    }

    pub fn next_rng(&self) -> StdRng {
        let stream = self.stream.fetch_add(1, Ordering::SeqCst);
        StdRng::seed_from_u64(derive_seed(self.master, stream))
    }
}

fn wall_clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}

// splitmix64 finalizer over the stream index
fn derive_seed(master: u64, stream: u64) -> u64 {
    let mut z = master.wrapping_add(stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
