//! Simulated environment: manual clock and seeded RNG.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use cipherlink_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Simulated wall clock start (2023-11-14T22:13:20Z).
pub const EPOCH_MS: u64 = 1_700_000_000_000;

struct State {
    now_ms: u64,
    rng: ChaCha20Rng,
}

/// Deterministic [`Environment`].
///
/// Clones share the clock and the RNG stream, so all parties in a world
/// observe the same time unless given their own `SimEnv`.
#[derive(Clone)]
pub struct SimEnv {
    state: Arc<Mutex<State>>,
}

impl SimEnv {
    /// Start at [`EPOCH_MS`] with an RNG seeded from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                now_ms: EPOCH_MS,
                rng: ChaCha20Rng::seed_from_u64(seed),
            })),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let by_ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        let mut state = self.lock();
        state.now_ms = state.now_ms.saturating_add(by_ms);
    }

    /// Set the clock. May move it backwards.
    pub fn set_time(&self, now_ms: u64) {
        self.lock().now_ms = now_ms;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Environment for SimEnv {
    fn now_millis(&self) -> u64 {
        self.lock().now_ms
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").field("now_ms", &self.now_millis()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_bytes() {
        let (a, b) = (SimEnv::with_seed(7), SimEnv::with_seed(7));
        let (mut x, mut y) = ([0u8; 32], [0u8; 32]);
        a.random_bytes(&mut x);
        b.random_bytes(&mut y);
        assert_eq!(x, y);
    }

    #[test]
    fn clones_share_the_clock() {
        let env = SimEnv::with_seed(0);
        let other = env.clone();
        env.advance(Duration::from_secs(3));
        assert_eq!(other.now_millis(), EPOCH_MS + 3_000);

        other.set_time(5);
        assert_eq!(env.now_millis(), 5);
    }
}
