//! Trait-based provider mechanism for the primitives the record layer
//! consumes.
//!
//! The record layer never names algorithms by string; it hands a typed
//! [`Transformation`] to a [`PrimitiveProvider`] and drives the returned
//! [`SymmetricCipher`] through init/update/do_final. AEAD tag
//! verification inside `do_final` must be constant-time; on mismatch a
//! single uniform error is returned.

use ferrotls_types::CryptoError;

use crate::cipher::{AesCbcCipher, AesGcmCipher, Rc4Cipher};
use crate::ec::EcParameters;
use crate::oid::Oid;
use crate::random::{SecureRandom, SystemRandom};

/// Direction a cipher instance is initialized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    Encrypt,
    Decrypt,
}

/// Symmetric cipher selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transformation {
    /// Identity transformation of the NULL cipher suite.
    Null,
    /// AES in CBC mode, no padding (the record layer pads itself).
    AesCbc { key_bits: usize },
    /// AES in Galois/Counter mode.
    AesGcm { key_bits: usize },
    /// RC4 stream cipher.
    Rc4,
    /// Triple-DES in CBC mode.
    TripleDesCbc,
}

/// Per-initialization cipher parameters.
pub enum CipherParams<'a> {
    /// No IV; CBC encryption draws a random initial chaining value.
    None,
    /// CBC initialization vector.
    Iv(&'a [u8]),
    /// Full GCM nonce plus the expected tag length in bytes.
    Gcm { tag_len: usize, nonce: &'a [u8] },
}

/// A symmetric cipher instance.
///
/// Block and stream ciphers are initialized once and fed through
/// `update`; AEAD ciphers are re-initialized per record and complete
/// through `do_final`.
pub trait SymmetricCipher: Send {
    fn init(
        &mut self,
        mode: CipherMode,
        key: &[u8],
        params: CipherParams<'_>,
        random: &mut dyn SecureRandom,
    ) -> Result<(), CryptoError>;

    /// Transform `buf` in place; returns the number of bytes produced.
    fn update(&mut self, buf: &mut [u8]) -> Result<usize, CryptoError>;

    /// Feed additional authenticated data (AEAD only).
    fn update_aad(&mut self, aad: &[u8]) -> Result<(), CryptoError>;

    /// Complete the operation in place.
    ///
    /// AEAD encryption appends the tag; AEAD decryption verifies the tag
    /// in constant time and strips it, failing with
    /// [`CryptoError::AeadTagVerifyFail`] on mismatch. Returns the new
    /// length of `buf`.
    fn do_final(&mut self, buf: &mut Vec<u8>) -> Result<usize, CryptoError>;

    /// Block size in bytes; 0 for stream ciphers.
    fn block_size(&self) -> usize;

    /// Output size for an input of `input_len` bytes in the initialized
    /// direction.
    fn output_size(&self, input_len: usize) -> usize;
}

/// Factory for the primitives the TLS core consumes.
pub trait PrimitiveProvider: Send + Sync {
    /// Create an uninitialized cipher for the transformation, or
    /// [`CryptoError::UnsupportedAlgorithm`] if this provider cannot
    /// serve it.
    fn create_cipher(
        &self,
        transformation: &Transformation,
    ) -> Result<Box<dyn SymmetricCipher>, CryptoError>;

    /// Construct EC domain parameters for a named-curve OID, or
    /// [`CryptoError::UnknownCurve`]. The groups registry uses this as
    /// its availability probe.
    fn ec_parameters(&self, oid: &Oid) -> Result<EcParameters, CryptoError>;

    /// A fresh secure random source.
    fn secure_random(&self) -> Box<dyn SecureRandom>;
}

/// Provider over the bundled cipher implementations.
pub struct DefaultProvider {
    fips_only: bool,
}

impl DefaultProvider {
    pub fn new() -> Self {
        Self { fips_only: false }
    }

    /// A provider restricted to FIPS-approved transformations.
    pub fn fips() -> Self {
        Self { fips_only: true }
    }
}

impl Default for DefaultProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PrimitiveProvider for DefaultProvider {
    fn create_cipher(
        &self,
        transformation: &Transformation,
    ) -> Result<Box<dyn SymmetricCipher>, CryptoError> {
        match *transformation {
            Transformation::AesCbc { key_bits } if key_bits == 128 || key_bits == 256 => {
                Ok(Box::new(AesCbcCipher::new(key_bits)))
            }
            Transformation::AesGcm { key_bits } if key_bits == 128 || key_bits == 256 => {
                Ok(Box::new(AesGcmCipher::new(key_bits)))
            }
            Transformation::Rc4 if !self.fips_only => Ok(Box::new(Rc4Cipher::new())),
            other => Err(CryptoError::UnsupportedAlgorithm(format!("{other:?}"))),
        }
    }

    fn ec_parameters(&self, oid: &Oid) -> Result<EcParameters, CryptoError> {
        crate::ec::parameters_for_oid(oid)
    }

    fn secure_random(&self) -> Box<dyn SecureRandom> {
        Box::new(SystemRandom::new())
    }
}
