//! Environment abstraction.
//!
//! All wall-clock time and randomness used by the protocol comes through
//! [`Environment`]. Production uses [`SystemEnv`]; simulation supplies a
//! manual clock and a seeded RNG so staleness and replay tests are exact.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::{CryptoRng, RngCore, rngs::OsRng};

/// Source of time and randomness.
pub trait Environment: Send + Sync {
    /// Current wall-clock time in milliseconds since the Unix epoch.
    ///
    /// Embedded in payloads and exchange contexts, so it must be comparable
    /// across machines (unlike a monotonic `Instant`).
    fn now_millis(&self) -> u64;

    /// Fill `buffer` with cryptographically secure random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);
}

/// System clock and OS CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        OsRng.fill_bytes(buffer);
    }
}

/// Adapts an [`Environment`] to the `rand` traits the crypto layer takes.
pub struct EnvRng<'a, E: ?Sized> {
    env: &'a E,
}

impl<'a, E: Environment + ?Sized> EnvRng<'a, E> {
    /// Borrow `env` as an RNG.
    pub fn new(env: &'a E) -> Self {
        Self { env }
    }
}

impl<E: Environment + ?Sized> RngCore for EnvRng<'_, E> {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.env.random_bytes(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.env.random_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.env.random_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.env.random_bytes(dest);
        Ok(())
    }
}

// Sound as long as every Environment hands out CSPRNG output, which the
// trait contract requires.
impl<E: Environment + ?Sized> CryptoRng for EnvRng<'_, E> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemEnv.now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn env_rng_draws_from_environment() {
        struct Fixed;
        impl Environment for Fixed {
            fn now_millis(&self) -> u64 {
                0
            }

            fn random_bytes(&self, buffer: &mut [u8]) {
                buffer.fill(0xab);
            }
        }

        let mut rng = EnvRng::new(&Fixed);
        assert_eq!(rng.next_u32(), 0xabab_abab);

        let mut buf = [0u8; 5];
        rng.fill_bytes(&mut buf);
        assert_eq!(buf, [0xab; 5]);
    }
}
