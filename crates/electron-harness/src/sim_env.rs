//! Simulated environment with a virtual clock and seeded RNG.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use electron_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic environment for simulation.
///
/// Time starts at zero and moves only through [`SimEnv::advance`] or
/// [`Environment::sleep`]. Clones share the clock and the RNG.
#[derive(Clone)]
pub struct SimEnv {
    clock: Arc<Mutex<Duration>>,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Environment seeded with zero.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with the given RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            clock: Arc::new(Mutex::new(Duration::ZERO)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *lock(&self.clock) += by;
    }

    /// Move the clock to `at`. Earlier instants are ignored.
    pub fn advance_to(&self, at: Duration) {
        let mut clock = lock(&self.clock);
        *clock = (*clock).max(at);
    }
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").field("now", &*lock(&self.clock)).finish_non_exhaustive()
    }
}

impl Environment for SimEnv {
    type Instant = Duration;

    fn now(&self) -> Self::Instant {
        *lock(&self.clock)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        lock(&self.rng).fill_bytes(buffer);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_moves_only_when_advanced() {
        let env = SimEnv::new();
        assert_eq!(env.now(), Duration::ZERO);

        env.advance(Duration::from_secs(15));
        assert_eq!(env.now(), Duration::from_secs(15));

        env.advance_to(Duration::from_secs(10));
        assert_eq!(env.now(), Duration::from_secs(15));
    }

    #[test]
    fn clones_share_clock() {
        let env = SimEnv::new();
        let other = env.clone();

        other.advance(Duration::from_secs(1));
        assert_eq!(env.now(), Duration::from_secs(1));
    }

    #[test]
    fn same_seed_same_bytes() {
        let a = SimEnv::with_seed(7);
        let b = SimEnv::with_seed(7);

        assert_eq!(a.random_u64(), b.random_u64());
        assert_ne!(a.random_u64(), SimEnv::with_seed(8).random_u64());
    }
}
