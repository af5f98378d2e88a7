// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

//! The randomness collaborator.
//!
//! The engine never touches an OS facility directly: every draw goes through
//! [`RandomSource`], which either fills the buffer completely or reports
//! exhaustion as [`OtrError::ShortRandomRead`]. Callers sample into local
//! buffers first so a failed draw leaves no partial protocol state behind.

use rand_chacha::rand_core::{SeedableRng, TryRngCore};
use rand_chacha::ChaCha20Rng;

use crate::types::{OtrError, OtrResult};

/// A stream of cryptographic randomness with fill-or-fail semantics.
pub trait RandomSource {
    /// Fills `buf` entirely with random bytes.
    ///
    /// # Errors
    ///
    /// Returns [`OtrError::ShortRandomRead`] if the source cannot supply
    /// `buf.len()` bytes; the buffer contents are then unspecified and must
    /// not be used.
    fn fill_bytes(&mut self, buf: &mut [u8]) -> OtrResult<()>;
}

/// Cryptographically secure randomness: ChaCha20 seeded from the operating
/// system.
#[derive(Debug)]
pub struct SystemRandom {
    rng: ChaCha20Rng,
}

impl SystemRandom {
    pub fn new() -> Self {
        Self {
            rng: ChaCha20Rng::from_os_rng(),
        }
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SystemRandom {
    fn fill_bytes(&mut self, buf: &mut [u8]) -> OtrResult<()> {
        self.rng
            .try_fill_bytes(buf)
            .map_err(|_| OtrError::ShortRandomRead)
    }
}

/// Deterministic randomness for tests: replays a fixed byte string, then
/// fails with a short read.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone)]
pub struct FixedRandom {
    data: Vec<u8>,
    pos: usize,
}

#[cfg(any(test, feature = "test-utils"))]
impl FixedRandom {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl RandomSource for FixedRandom {
    fn fill_bytes(&mut self, buf: &mut [u8]) -> OtrResult<()> {
        if self.data.len() - self.pos < buf.len() {
            self.pos = self.data.len();
            return Err(OtrError::ShortRandomRead);
        }
        buf.copy_from_slice(&self.data[self.pos..self.pos + buf.len()]);
        self.pos += buf.len();
        Ok(())
    }
}

/// Deterministic ChaCha20 stream for fixtures that should not run dry.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: ChaCha20Rng,
}

#[cfg(any(test, feature = "test-utils"))]
impl SeededRandom {
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            rng: ChaCha20Rng::from_seed(seed),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl RandomSource for SeededRandom {
    fn fill_bytes(&mut self, buf: &mut [u8]) -> OtrResult<()> {
        self.rng
            .try_fill_bytes(buf)
            .map_err(|_| OtrError::ShortRandomRead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_random_fills_requested_length() {
        let mut rng = SystemRandom::new();
        let mut buf = [0u8; 64];
        rng.fill_bytes(&mut buf).unwrap();
        assert_ne!(buf, [0u8; 64]);
    }

    #[test]
    fn fixed_random_replays_and_then_runs_dry() {
        let mut rng = FixedRandom::new(vec![0xAB, 0xCD]);
        let mut buf = [0u8; 2];
        rng.fill_bytes(&mut buf).unwrap();
        assert_eq!(buf, [0xAB, 0xCD]);

        let mut more = [0u8; 1];
        assert_eq!(
            rng.fill_bytes(&mut more).unwrap_err(),
            OtrError::ShortRandomRead
        );
    }

    #[test]
    fn fixed_random_short_read_on_oversized_request() {
        let mut rng = FixedRandom::new(vec![0xAB, 0xCD]);
        let mut buf = [0u8; 3];
        assert_eq!(
            rng.fill_bytes(&mut buf).unwrap_err(),
            OtrError::ShortRandomRead
        );
    }

    #[test]
    fn seeded_random_is_deterministic() {
        let mut a = SeededRandom::new([7u8; 32]);
        let mut b = SeededRandom::new([7u8; 32]);
        let (mut buf_a, mut buf_b) = ([0u8; 32], [0u8; 32]);
        a.fill_bytes(&mut buf_a).unwrap();
        b.fill_bytes(&mut buf_b).unwrap();
        assert_eq!(buf_a, buf_b);
    }
}
