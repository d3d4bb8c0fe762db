//! Bundled symmetric cipher implementations behind [`SymmetricCipher`].
//!
//! CBC chaining is driven here block by block over the AES core; the
//! record layer supplies already-padded, block-aligned input. AEAD
//! instances are one-shot: init stores the nonce, `update_aad`
//! accumulates AAD, `do_final` performs the operation, and the next
//! record re-initializes.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256};
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use zeroize::Zeroize;

use ferrotls_types::CryptoError;

use crate::provider::{CipherMode, CipherParams, SymmetricCipher};
use crate::random::SecureRandom;

const AES_BLOCK_SIZE: usize = 16;
const GCM_NONCE_SIZE: usize = 12;
const GCM_TAG_SIZE: usize = 16;

// The expanded key schedules zeroize themselves on drop (the `aes`
// crate's `zeroize` feature, also covering the AES core inside
// `aes-gcm`).
enum AesKey {
    Aes128(Box<Aes128>),
    Aes256(Box<Aes256>),
}

impl AesKey {
    fn new(key: &[u8], key_bits: usize) -> Result<Self, CryptoError> {
        let expected = key_bits / 8;
        if key.len() != expected {
            return Err(CryptoError::InvalidKeyLength {
                expected,
                got: key.len(),
            });
        }
        match key_bits {
            128 => Ok(Self::Aes128(Box::new(
                Aes128::new_from_slice(key).map_err(|_| CryptoError::InvalidArg)?,
            ))),
            256 => Ok(Self::Aes256(Box::new(
                Aes256::new_from_slice(key).map_err(|_| CryptoError::InvalidArg)?,
            ))),
            _ => Err(CryptoError::UnsupportedAlgorithm(format!(
                "AES-{key_bits}"
            ))),
        }
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Self::Aes128(k) => k.encrypt_block(block),
            Self::Aes256(k) => k.encrypt_block(block),
        }
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Self::Aes128(k) => k.decrypt_block(block),
            Self::Aes256(k) => k.decrypt_block(block),
        }
    }
}

/// AES in CBC mode without padding.
///
/// Initialized once per connection; the chaining value carries across
/// `update` calls so each record continues the CBC stream.
pub(crate) struct AesCbcCipher {
    key_bits: usize,
    state: Option<CbcState>,
}

struct CbcState {
    key: AesKey,
    mode: CipherMode,
    chain: [u8; AES_BLOCK_SIZE],
}

impl Drop for CbcState {
    fn drop(&mut self) {
        self.chain.zeroize();
    }
}

impl AesCbcCipher {
    pub(crate) fn new(key_bits: usize) -> Self {
        Self {
            key_bits,
            state: None,
        }
    }
}

impl SymmetricCipher for AesCbcCipher {
    fn init(
        &mut self,
        mode: CipherMode,
        key: &[u8],
        params: CipherParams<'_>,
        random: &mut dyn SecureRandom,
    ) -> Result<(), CryptoError> {
        let key = AesKey::new(key, self.key_bits)?;
        let mut chain = [0u8; AES_BLOCK_SIZE];
        match params {
            CipherParams::Iv(iv) => {
                if iv.len() != AES_BLOCK_SIZE {
                    return Err(CryptoError::InvalidIvLength);
                }
                chain.copy_from_slice(iv);
            }
            // No IV given: start from a random chaining value, as for
            // TLS 1.1+ encryption where the first record block is a
            // random explicit IV anyway.
            CipherParams::None => random.next_bytes(&mut chain)?,
            CipherParams::Gcm { .. } => return Err(CryptoError::InvalidArg),
        }
        self.state = Some(CbcState { key, mode, chain });
        Ok(())
    }

    fn update(&mut self, buf: &mut [u8]) -> Result<usize, CryptoError> {
        let state = self.state.as_mut().ok_or(CryptoError::NotInitialized)?;
        if buf.len() % AES_BLOCK_SIZE != 0 {
            return Err(CryptoError::InvalidArg);
        }
        match state.mode {
            CipherMode::Encrypt => {
                for chunk in buf.chunks_exact_mut(AES_BLOCK_SIZE) {
                    for (b, c) in chunk.iter_mut().zip(state.chain.iter()) {
                        *b ^= c;
                    }
                    state.key.encrypt_block(chunk);
                    state.chain.copy_from_slice(chunk);
                }
            }
            CipherMode::Decrypt => {
                for chunk in buf.chunks_exact_mut(AES_BLOCK_SIZE) {
                    let mut saved = [0u8; AES_BLOCK_SIZE];
                    saved.copy_from_slice(chunk);
                    state.key.decrypt_block(chunk);
                    for (b, c) in chunk.iter_mut().zip(state.chain.iter()) {
                        *b ^= c;
                    }
                    state.chain = saved;
                }
            }
        }
        Ok(buf.len())
    }

    fn update_aad(&mut self, _aad: &[u8]) -> Result<(), CryptoError> {
        Err(CryptoError::NotSupported)
    }

    fn do_final(&mut self, buf: &mut Vec<u8>) -> Result<usize, CryptoError> {
        self.update(buf)
    }

    fn block_size(&self) -> usize {
        AES_BLOCK_SIZE
    }

    fn output_size(&self, input_len: usize) -> usize {
        input_len
    }
}

enum GcmKey {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

/// AES in Galois/Counter mode.
pub(crate) struct AesGcmCipher {
    key_bits: usize,
    state: Option<GcmState>,
}

struct GcmState {
    key: GcmKey,
    mode: CipherMode,
    nonce: [u8; GCM_NONCE_SIZE],
    aad: Vec<u8>,
}

impl Drop for GcmState {
    fn drop(&mut self) {
        self.nonce.zeroize();
        self.aad.zeroize();
    }
}

impl AesGcmCipher {
    pub(crate) fn new(key_bits: usize) -> Self {
        Self {
            key_bits,
            state: None,
        }
    }
}

impl SymmetricCipher for AesGcmCipher {
    fn init(
        &mut self,
        mode: CipherMode,
        key: &[u8],
        params: CipherParams<'_>,
        _random: &mut dyn SecureRandom,
    ) -> Result<(), CryptoError> {
        let CipherParams::Gcm { tag_len, nonce } = params else {
            return Err(CryptoError::InvalidArg);
        };
        if tag_len != GCM_TAG_SIZE {
            return Err(CryptoError::InvalidTagLength);
        }
        if nonce.len() != GCM_NONCE_SIZE {
            return Err(CryptoError::InvalidIvLength);
        }
        let expected = self.key_bits / 8;
        if key.len() != expected {
            return Err(CryptoError::InvalidKeyLength {
                expected,
                got: key.len(),
            });
        }
        let key = match self.key_bits {
            128 => GcmKey::Aes128(Box::new(
                Aes128Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidArg)?,
            )),
            256 => GcmKey::Aes256(Box::new(
                Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidArg)?,
            )),
            bits => {
                return Err(CryptoError::UnsupportedAlgorithm(format!("AES-{bits}-GCM")))
            }
        };
        let mut nonce_buf = [0u8; GCM_NONCE_SIZE];
        nonce_buf.copy_from_slice(nonce);
        self.state = Some(GcmState {
            key,
            mode,
            nonce: nonce_buf,
            aad: Vec::new(),
        });
        Ok(())
    }

    fn update(&mut self, _buf: &mut [u8]) -> Result<usize, CryptoError> {
        Err(CryptoError::NotSupported)
    }

    fn update_aad(&mut self, aad: &[u8]) -> Result<(), CryptoError> {
        let state = self.state.as_mut().ok_or(CryptoError::NotInitialized)?;
        state.aad.extend_from_slice(aad);
        Ok(())
    }

    fn do_final(&mut self, buf: &mut Vec<u8>) -> Result<usize, CryptoError> {
        // One operation per initialization; the caller re-inits for the
        // next record.
        let state = self.state.take().ok_or(CryptoError::NotInitialized)?;
        let nonce = Nonce::from_slice(&state.nonce);
        let payload = Payload {
            msg: buf.as_slice(),
            aad: &state.aad,
        };
        let out = match (&state.key, state.mode) {
            (GcmKey::Aes128(k), CipherMode::Encrypt) => {
                k.encrypt(nonce, payload).map_err(|_| CryptoError::InvalidArg)?
            }
            (GcmKey::Aes256(k), CipherMode::Encrypt) => {
                k.encrypt(nonce, payload).map_err(|_| CryptoError::InvalidArg)?
            }
            (GcmKey::Aes128(k), CipherMode::Decrypt) => k
                .decrypt(nonce, payload)
                .map_err(|_| CryptoError::AeadTagVerifyFail)?,
            (GcmKey::Aes256(k), CipherMode::Decrypt) => k
                .decrypt(nonce, payload)
                .map_err(|_| CryptoError::AeadTagVerifyFail)?,
        };
        *buf = out;
        Ok(buf.len())
    }

    fn block_size(&self) -> usize {
        AES_BLOCK_SIZE
    }

    fn output_size(&self, input_len: usize) -> usize {
        match self.state.as_ref().map(|s| s.mode) {
            Some(CipherMode::Decrypt) => input_len.saturating_sub(GCM_TAG_SIZE),
            _ => input_len + GCM_TAG_SIZE,
        }
    }
}

/// RC4 stream cipher.
///
/// The key schedule and PRGA state are kept in-crate so the S-box can
/// be zeroized when the cipher is dropped.
pub(crate) struct Rc4Cipher {
    state: Option<Rc4State>,
}

struct Rc4State {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Drop for Rc4State {
    fn drop(&mut self) {
        self.s.zeroize();
        self.i = 0;
        self.j = 0;
    }
}

impl Rc4State {
    fn new(key: &[u8]) -> Self {
        let mut s = [0u8; 256];
        for (idx, v) in s.iter_mut().enumerate() {
            *v = idx as u8;
        }
        let mut j = 0u8;
        for i in 0..256 {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }
        Self { s, i: 0, j: 0 }
    }

    fn apply_keystream(&mut self, buf: &mut [u8]) {
        for b in buf {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[self.i as usize]);
            self.s.swap(self.i as usize, self.j as usize);
            let k = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
            *b ^= self.s[k as usize];
        }
    }
}

impl Rc4Cipher {
    pub(crate) fn new() -> Self {
        Self { state: None }
    }
}

impl SymmetricCipher for Rc4Cipher {
    fn init(
        &mut self,
        _mode: CipherMode,
        key: &[u8],
        _params: CipherParams<'_>,
        _random: &mut dyn SecureRandom,
    ) -> Result<(), CryptoError> {
        if key.is_empty() || key.len() > 256 {
            return Err(CryptoError::InvalidArg);
        }
        self.state = Some(Rc4State::new(key));
        Ok(())
    }

    fn update(&mut self, buf: &mut [u8]) -> Result<usize, CryptoError> {
        let state = self.state.as_mut().ok_or(CryptoError::NotInitialized)?;
        state.apply_keystream(buf);
        Ok(buf.len())
    }

    fn update_aad(&mut self, _aad: &[u8]) -> Result<(), CryptoError> {
        Err(CryptoError::NotSupported)
    }

    fn do_final(&mut self, buf: &mut Vec<u8>) -> Result<usize, CryptoError> {
        self.update(buf)
    }

    fn block_size(&self) -> usize {
        0
    }

    fn output_size(&self, input_len: usize) -> usize {
        input_len
    }
}
