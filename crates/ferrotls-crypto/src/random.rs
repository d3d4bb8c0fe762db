//! Secure random source abstraction.

use ferrotls_types::CryptoError;

/// A cryptographically secure random source.
pub trait SecureRandom: Send {
    /// Fill `dst` with random bytes.
    fn next_bytes(&mut self, dst: &mut [u8]) -> Result<(), CryptoError>;
}

/// Random source backed by the operating system.
pub struct SystemRandom;

impl SystemRandom {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureRandom for SystemRandom {
    fn next_bytes(&mut self, dst: &mut [u8]) -> Result<(), CryptoError> {
        getrandom::getrandom(dst).map_err(|_| CryptoError::RandomFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_random_fills_buffer() {
        let mut rng = SystemRandom::new();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        rng.next_bytes(&mut a).unwrap();
        rng.next_bytes(&mut b).unwrap();
        // 2^-256 false-failure probability.
        assert_ne!(a, b);
    }
}
