// SPDX-License-Identifier: LGPL-3.0-only

use ring::rand::{SecureRandom, SystemRandom};

use crate::crypto::CryptoError;

/// RandomSource is the byte source for all randomness the engine consumes: DH private keys, the
/// AKE blinding key `r`, DSA signing nonces and SMP exponents. The host supplies one per
/// conversation; a deterministic implementation makes protocol runs reproducible in tests.
pub trait RandomSource {
    /// Fill `dest` entirely with random bytes.
    fn fill(&self, dest: &mut [u8]) -> Result<(), CryptoError>;
}

/// SystemRandomSource backs a conversation with the operating system's secure random generator.
pub struct SystemRandomSource(SystemRandom);

impl SystemRandomSource {
    #[must_use]
    pub fn new() -> Self {
        Self(SystemRandom::new())
    }
}

impl Default for SystemRandomSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SystemRandomSource {
    fn fill(&self, dest: &mut [u8]) -> Result<(), CryptoError> {
        self.0.fill(dest).or(Err(CryptoError::RandomnessFailure))
    }
}

#[cfg(test)]
pub mod testing {
    use std::cell::Cell;

    use super::RandomSource;
    use crate::crypto::CryptoError;

    /// TestRandom is a deterministic random source seeded per test. The byte stream is produced
    /// by a 64-bit LCG, good enough to make every drawn exponent distinct and reproducible.
    pub struct TestRandom(Cell<u64>);

    impl TestRandom {
        pub fn new(seed: u64) -> Self {
            TestRandom(Cell::new(seed | 1))
        }
    }

    impl RandomSource for TestRandom {
        fn fill(&self, dest: &mut [u8]) -> Result<(), CryptoError> {
            let mut state = self.0.get();
            for b in dest.iter_mut() {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                *b = (state >> 33) as u8;
            }
            self.0.set(state);
            Ok(())
        }
    }

    /// FailingRandom always reports exhaustion of the random source.
    pub struct FailingRandom;

    impl RandomSource for FailingRandom {
        fn fill(&self, _: &mut [u8]) -> Result<(), CryptoError> {
            Err(CryptoError::RandomnessFailure)
        }
    }
}
