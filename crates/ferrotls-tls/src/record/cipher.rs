//! Bulk data enciphering/deciphering for SSL/TLS records, one box per
//! connection direction.
//!
//! Stream ciphers need no padding; block ciphers in CBC mode do. Up to
//! TLS 1.0 the CBC IV is implicit (the last ciphertext block of the
//! previous record). From TLS 1.1 (RFC 4346 §6.2.3.2, method 2(b)) a
//! random explicit IV block is prepended to the plaintext before
//! encryption and discarded after decryption. AEAD suites build the
//! per-record nonce as `fixed_iv || sequence_number` and carry the
//! sequence number on the wire as the explicit nonce (RFC 5246
//! §6.2.3.3).
//!
//! Distinguishing MAC, padding, tag, and length failures permits
//! oracle attacks against CBC mode, so every decrypt-side failure
//! collapses to `TlsError::BadRecordMac`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use ferrotls_crypto::{
    CipherMode, CipherParams, PrimitiveProvider, SecureRandom, SymmetricCipher,
};
use ferrotls_types::{CryptoError, TlsError};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::crypt::{BulkCipher, CipherType};
use crate::record::authenticator::Authenticator;
use crate::record::ContentType;
use crate::ProtocolVersion;

/// Fixed masks by IV size: the initial decryption IVs for TLS 1.1 or
/// later CBC suites. The first decrypted block of every record is the
/// explicit IV and is discarded, so the initial IV never influences
/// plaintext; a shared zero mask avoids per-connection randomness.
/// Populated lazily; concurrent first-touch is harmless since all
/// values are equal.
static FIXED_MASKS: OnceLock<Mutex<HashMap<usize, Arc<Vec<u8>>>>> = OnceLock::new();

fn fixed_mask(iv_size: usize) -> Arc<Vec<u8>> {
    let masks = FIXED_MASKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut masks = masks.lock().unwrap_or_else(PoisonError::into_inner);
    masks
        .entry(iv_size)
        .or_insert_with(|| Arc::new(vec![0u8; iv_size]))
        .clone()
}

/// The record-layer bulk cipher for one connection direction.
pub struct CipherBox {
    protocol_version: ProtocolVersion,
    /// None for the NULL cipher box.
    cipher: Option<Box<dyn SymmetricCipher>>,
    cipher_type: CipherType,
    mode: CipherMode,
    random: Option<Box<dyn SecureRandom>>,
    /// Retained key for per-record AEAD initialization; empty otherwise.
    key: Vec<u8>,
    /// Implicit nonce part; empty for non-AEAD boxes.
    fixed_iv: Vec<u8>,
    tag_size: usize,
    record_iv_size: usize,
    block_size: usize,
    /// AEAD: the primitive has been initialized for the current record.
    record_ready: bool,
}

impl fmt::Debug for CipherBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherBox")
            .field("protocol_version", &self.protocol_version)
            .field("cipher_type", &self.cipher_type)
            .field("mode", &self.mode)
            .field("tag_size", &self.tag_size)
            .field("record_iv_size", &self.record_iv_size)
            .field("block_size", &self.block_size)
            .field("record_ready", &self.record_ready)
            .finish()
    }
}

impl Drop for CipherBox {
    fn drop(&mut self) {
        // Non-AEAD keys live only inside the primitive, which scrubs
        // its own key schedule when it is dropped.
        self.key.zeroize();
        self.fixed_iv.zeroize();
    }
}

impl CipherBox {
    /// The identity cipher box used by the NULL cipher suite.
    pub fn null() -> Self {
        Self {
            protocol_version: ProtocolVersion::TLS10,
            cipher: None,
            cipher_type: CipherType::Stream,
            mode: CipherMode::Encrypt,
            random: None,
            key: Vec::new(),
            fixed_iv: Vec::new(),
            tag_size: 0,
            record_iv_size: 0,
            block_size: 0,
            record_ready: false,
        }
    }

    /// Construct a cipher box for one direction at a cipher-spec change.
    ///
    /// For BLOCK decryption at TLS 1.1+ with no IV supplied, a
    /// process-wide zero mask of the right size stands in. For AEAD, the
    /// primitive is deliberately left uninitialized; every record
    /// re-initializes it with its own nonce.
    pub fn new(
        protocol_version: ProtocolVersion,
        bulk: &BulkCipher,
        key: &[u8],
        iv: Option<&[u8]>,
        provider: &dyn PrimitiveProvider,
        mut random: Box<dyn SecureRandom>,
        encrypt: bool,
    ) -> Result<Self, TlsError> {
        if !bulk.allowed {
            return Err(TlsError::UnsupportedCipher(bulk.name.into()));
        }
        if bulk.is_null() {
            return Ok(Self::null());
        }
        if key.len() != bulk.key_size {
            return Err(TlsError::InitializationFailed(
                CryptoError::InvalidKeyLength {
                    expected: bulk.key_size,
                    got: key.len(),
                },
            ));
        }

        let mode = if encrypt {
            CipherMode::Encrypt
        } else {
            CipherMode::Decrypt
        };
        let mut cipher = provider
            .create_cipher(&bulk.transformation)
            .map_err(TlsError::InitializationFailed)?;

        let mask = if iv.is_none()
            && bulk.iv_size != 0
            && mode == CipherMode::Decrypt
            && protocol_version >= ProtocolVersion::TLS11
        {
            Some(fixed_mask(bulk.iv_size))
        } else {
            None
        };
        let iv = iv.or(mask.as_ref().map(|m| m.as_slice()));

        match bulk.cipher_type {
            CipherType::Aead => {
                let fixed_iv = iv.ok_or_else(|| {
                    TlsError::InvariantViolation("missing AEAD fixed IV".into())
                })?;
                if fixed_iv.len() != bulk.fixed_iv_size {
                    return Err(TlsError::InvariantViolation(
                        "improper fixed IV for AEAD".into(),
                    ));
                }
                Ok(Self {
                    protocol_version,
                    cipher: Some(cipher),
                    cipher_type: bulk.cipher_type,
                    mode,
                    random: Some(random),
                    key: key.to_vec(),
                    fixed_iv: fixed_iv.to_vec(),
                    tag_size: bulk.tag_size,
                    record_iv_size: bulk.iv_size - bulk.fixed_iv_size,
                    block_size: bulk.block_size,
                    record_ready: false,
                })
            }
            _ => {
                let params = match iv {
                    Some(iv) => CipherParams::Iv(iv),
                    None => CipherParams::None,
                };
                cipher
                    .init(mode, key, params, random.as_mut())
                    .map_err(TlsError::InitializationFailed)?;
                Ok(Self {
                    protocol_version,
                    cipher: Some(cipher),
                    cipher_type: bulk.cipher_type,
                    mode,
                    random: Some(random),
                    key: Vec::new(),
                    fixed_iv: Vec::new(),
                    tag_size: 0,
                    record_iv_size: 0,
                    block_size: bulk.block_size,
                    record_ready: false,
                })
            }
        }
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    pub fn is_null(&self) -> bool {
        self.cipher.is_none()
    }

    pub fn is_cbc_mode(&self) -> bool {
        self.cipher_type == CipherType::Block
    }

    pub fn is_aead_mode(&self) -> bool {
        self.cipher_type == CipherType::Aead
    }

    /// Size of the explicit nonce/IV carried on the wire per record:
    /// the block size for CBC at TLS 1.1+, the record IV size for AEAD,
    /// 0 otherwise.
    pub fn explicit_nonce_size(&self) -> usize {
        match self.cipher_type {
            CipherType::Block => {
                if self.cipher.is_some() && self.protocol_version >= ProtocolVersion::TLS11 {
                    self.block_size
                } else {
                    0
                }
            }
            CipherType::Aead => self.record_iv_size,
            CipherType::Stream => 0,
        }
    }

    /// Encrypt a fragment in place.
    ///
    /// BLOCK mode appends TLS padding first; the caller has already
    /// prepended the explicit IV block at TLS 1.1+. AEAD appends the
    /// authentication tag and requires a prior `create_explicit_nonce`
    /// for this record.
    pub fn encrypt(&mut self, fragment: &mut Vec<u8>) -> Result<(), TlsError> {
        let Some(cipher) = self.cipher.as_mut() else {
            return Ok(());
        };
        match self.cipher_type {
            CipherType::Stream => {
                cipher
                    .update(fragment)
                    .map_err(|e| TlsError::InvariantViolation(format!("stream cipher: {e}")))?;
                Ok(())
            }
            CipherType::Block => {
                add_padding(fragment, self.block_size);
                let len = fragment.len();
                let new_len = cipher
                    .update(fragment)
                    .map_err(|e| TlsError::InvariantViolation(format!("block cipher: {e}")))?;
                if new_len != len {
                    return Err(TlsError::InvariantViolation(
                        "cipher buffering error".into(),
                    ));
                }
                Ok(())
            }
            CipherType::Aead => {
                if !self.record_ready {
                    return Err(TlsError::InvariantViolation(
                        "AEAD cipher not initialized for record".into(),
                    ));
                }
                self.record_ready = false;
                let expected = fragment.len() + self.tag_size;
                let new_len = cipher
                    .do_final(fragment)
                    .map_err(|e| TlsError::InvariantViolation(format!("AEAD cipher: {e}")))?;
                if new_len != expected {
                    return Err(TlsError::InvariantViolation(
                        "AEAD output size mismatch".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Decrypt a fragment in place.
    ///
    /// `tag_len` is the MAC length for CBC suites (the MAC itself is
    /// verified by the caller). For AEAD the explicit nonce left in the
    /// buffer by `apply_explicit_nonce` is consumed here together with
    /// the ciphertext body and tag. Any failure an attacker could
    /// influence is reported as `BadRecordMac`.
    pub fn decrypt(&mut self, fragment: &mut Vec<u8>, tag_len: usize) -> Result<(), TlsError> {
        let Some(cipher) = self.cipher.as_mut() else {
            return Ok(());
        };
        match self.cipher_type {
            CipherType::Stream => {
                cipher.update(fragment).map_err(|_| TlsError::BadRecordMac)?;
                Ok(())
            }
            CipherType::Block => {
                if !sanity_check_cbc(
                    self.protocol_version,
                    self.block_size,
                    tag_len,
                    fragment.len(),
                ) {
                    return Err(TlsError::BadRecordMac);
                }
                let len = fragment.len();
                let new_len = cipher.update(fragment).map_err(|_| TlsError::BadRecordMac)?;
                if new_len != len {
                    return Err(TlsError::InvariantViolation(
                        "cipher buffering error".into(),
                    ));
                }
                remove_padding(fragment, tag_len, self.block_size, self.protocol_version)?;
                // The explicit IV block is part of the decrypted data and
                // must still be present.
                if self.protocol_version >= ProtocolVersion::TLS11
                    && fragment.len() < self.block_size
                {
                    return Err(TlsError::BadRecordMac);
                }
                Ok(())
            }
            CipherType::Aead => {
                if !self.record_ready {
                    return Err(TlsError::InvariantViolation(
                        "AEAD cipher not initialized for record".into(),
                    ));
                }
                self.record_ready = false;
                if fragment.len() < self.record_iv_size + self.tag_size {
                    return Err(TlsError::BadRecordMac);
                }
                fragment.drain(..self.record_iv_size);
                cipher
                    .do_final(fragment)
                    .map_err(|_| TlsError::BadRecordMac)?;
                Ok(())
            }
        }
    }

    /// Create the explicit nonce/IV for an output record.
    ///
    /// CBC at TLS 1.1+: a fresh random block the caller prepends to the
    /// plaintext before `encrypt`. AEAD: the 8-byte sequence number; as
    /// a side effect the primitive is initialized for this record and
    /// the AAD is fed.
    pub fn create_explicit_nonce(
        &mut self,
        authenticator: &mut dyn Authenticator,
        content_type: ContentType,
        fragment_len: usize,
    ) -> Result<Vec<u8>, TlsError> {
        match self.cipher_type {
            CipherType::Block => {
                if self.cipher.is_some() && self.protocol_version >= ProtocolVersion::TLS11 {
                    let mut nonce = vec![0u8; self.block_size];
                    let random = self.random.as_mut().ok_or_else(|| {
                        TlsError::InvariantViolation("cipher box has no random source".into())
                    })?;
                    random
                        .next_bytes(&mut nonce)
                        .map_err(TlsError::InitializationFailed)?;
                    Ok(nonce)
                } else {
                    Ok(Vec::new())
                }
            }
            CipherType::Aead => {
                let nonce = authenticator.sequence_number();
                self.init_aead_record(&nonce)?;
                let aad = authenticator.acquire_authentication_bytes(content_type, fragment_len);
                self.feed_aad(&aad)?;
                self.record_ready = true;
                Ok(nonce.to_vec())
            }
            CipherType::Stream => Ok(Vec::new()),
        }
    }

    /// Apply the explicit nonce/IV of an input record; returns its size.
    ///
    /// CBC: sanity-checks the ciphertext length against the
    /// authenticator's MAC size before anything touches the primitive.
    /// AEAD: reads the explicit nonce from the front of `fragment`
    /// (leaving it in place for `decrypt` to consume), re-initializes
    /// the primitive, and feeds the AAD.
    pub fn apply_explicit_nonce(
        &mut self,
        authenticator: &mut dyn Authenticator,
        content_type: ContentType,
        fragment: &[u8],
    ) -> Result<usize, TlsError> {
        match self.cipher_type {
            CipherType::Block => {
                let tag_len = authenticator.mac_len();
                if tag_len != 0
                    && !sanity_check_cbc(
                        self.protocol_version,
                        self.block_size,
                        tag_len,
                        fragment.len(),
                    )
                {
                    return Err(TlsError::BadRecordMac);
                }
                if self.cipher.is_some() && self.protocol_version >= ProtocolVersion::TLS11 {
                    Ok(self.block_size)
                } else {
                    Ok(0)
                }
            }
            CipherType::Aead => {
                if fragment.len() < self.record_iv_size + self.tag_size {
                    return Err(TlsError::BadRecordMac);
                }
                let explicit = fragment[..self.record_iv_size].to_vec();
                self.init_aead_record(&explicit)?;
                let plaintext_len = fragment.len() - self.record_iv_size - self.tag_size;
                let aad = authenticator.acquire_authentication_bytes(content_type, plaintext_len);
                self.feed_aad(&aad)?;
                self.record_ready = true;
                Ok(self.record_iv_size)
            }
            CipherType::Stream => Ok(0),
        }
    }

    fn init_aead_record(&mut self, explicit: &[u8]) -> Result<(), TlsError> {
        let mut nonce = Vec::with_capacity(self.fixed_iv.len() + explicit.len());
        nonce.extend_from_slice(&self.fixed_iv);
        nonce.extend_from_slice(explicit);
        let cipher = self.cipher.as_mut().ok_or_else(|| {
            TlsError::InvariantViolation("AEAD cipher box has no primitive".into())
        })?;
        let random = self.random.as_mut().ok_or_else(|| {
            TlsError::InvariantViolation("cipher box has no random source".into())
        })?;
        cipher
            .init(
                self.mode,
                &self.key,
                CipherParams::Gcm {
                    tag_len: self.tag_size,
                    nonce: &nonce,
                },
                random.as_mut(),
            )
            .map_err(TlsError::InitializationFailed)
    }

    fn feed_aad(&mut self, aad: &[u8]) -> Result<(), TlsError> {
        let cipher = self.cipher.as_mut().ok_or_else(|| {
            TlsError::InvariantViolation("AEAD cipher box has no primitive".into())
        })?;
        cipher
            .update_aad(aad)
            .map_err(TlsError::InitializationFailed)
    }
}

/// Append TLS block padding: `pad_len + 1` bytes each valued `pad_len`,
/// bringing the total length to a multiple of the block size. The TLS
/// form is also valid SSLv3 padding.
pub(crate) fn add_padding(buf: &mut Vec<u8>, block_size: usize) {
    let pad_len = (block_size - ((buf.len() + 1) % block_size)) % block_size;
    buf.resize(buf.len() + pad_len + 1, pad_len as u8);
}

/// Constant-time padding scan bounded at 256 iterations.
///
/// Returns `(missed, matched)` byte counts. The number of comparisons
/// and the memory access pattern depend only on the scanned length,
/// never on the padding value or where a mismatch sits.
pub(crate) fn check_padding(buf: &[u8], pad: u8) -> (u32, u32) {
    let mut missed = 0u32;
    let mut matched = 0u32;
    if buf.is_empty() {
        return (missed, matched);
    }
    let mut i = 0usize;
    while i <= 256 {
        for &b in buf {
            if i > 256 {
                break;
            }
            let eq = b.ct_eq(&pad).unwrap_u8() as u32;
            matched += eq;
            missed += 1 - eq;
            i += 1;
        }
    }
    (missed, matched)
}

/// Strip CBC padding in constant time.
///
/// TLS 1.0+ requires every padding byte to equal the length byte; SSLv3
/// constrains only the length byte itself. A fragment too short to hold
/// the padding plus a MAC still gets a full dummy scan so the two
/// failure shapes are not separable by timing.
pub(crate) fn remove_padding(
    buf: &mut Vec<u8>,
    tag_len: usize,
    block_size: usize,
    version: ProtocolVersion,
) -> Result<(), TlsError> {
    let len = buf.len();
    if len == 0 {
        return Err(TlsError::BadRecordMac);
    }
    let pad_len = buf[len - 1] as usize;

    if len < tag_len + pad_len + 1 {
        check_padding(buf, pad_len as u8);
        return Err(TlsError::BadRecordMac);
    }

    let new_len = len - (pad_len + 1);
    let (missed, _matched) = check_padding(&buf[new_len..], pad_len as u8);
    if version >= ProtocolVersion::TLS10 {
        if missed != 0 {
            return Err(TlsError::BadRecordMac);
        }
    } else if pad_len > block_size {
        return Err(TlsError::BadRecordMac);
    }

    buf.truncate(new_len);
    Ok(())
}

/// CBC ciphertext length sanity check, run before the primitive is
/// touched: a positive multiple of the block size, at least
/// `max(tag_len + 1, block_size)` plus the explicit IV block at
/// TLS 1.1+.
pub(crate) fn sanity_check_cbc(
    version: ProtocolVersion,
    block_size: usize,
    tag_len: usize,
    fragment_len: usize,
) -> bool {
    if fragment_len == 0 || fragment_len % block_size != 0 {
        return false;
    }
    let mut minimal = tag_len + 1;
    if minimal < block_size {
        minimal = block_size;
    }
    if version >= ProtocolVersion::TLS11 {
        minimal += block_size;
    }
    fragment_len >= minimal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypt::{B_AES_128, B_AES_128_GCM, B_3DES, B_NULL, B_RC4_128};
    use crate::record::authenticator::RecordAuthenticator;
    use ferrotls_crypto::{DefaultProvider, SystemRandom};

    fn provider() -> DefaultProvider {
        DefaultProvider::new()
    }

    fn rng() -> Box<SystemRandom> {
        Box::new(SystemRandom::new())
    }

    fn cbc_box(version: ProtocolVersion, encrypt: bool, iv: Option<&[u8]>) -> CipherBox {
        CipherBox::new(
            version,
            &B_AES_128,
            &[0x42u8; 16],
            iv,
            &provider(),
            rng(),
            encrypt,
        )
        .unwrap()
    }

    fn gcm_box(encrypt: bool) -> CipherBox {
        CipherBox::new(
            ProtocolVersion::TLS12,
            &B_AES_128_GCM,
            &[0u8; 16],
            Some(&[0u8; 4]),
            &provider(),
            rng(),
            encrypt,
        )
        .unwrap()
    }

    // -- padding ---------------------------------------------------------

    #[test]
    fn test_add_padding_shape() {
        for block_size in [8usize, 16] {
            for len in 0..=40usize {
                let mut buf = vec![0xAAu8; len];
                add_padding(&mut buf, block_size);
                assert!(buf.len() > len);
                assert_eq!(buf.len() % block_size, 0, "len={len} bs={block_size}");
                let pad = *buf.last().unwrap() as usize;
                assert!(pad + 1 <= block_size);
                assert!(buf[buf.len() - (pad + 1)..].iter().all(|&b| b == pad as u8));
            }
        }
    }

    #[test]
    fn test_check_padding_comparison_count_is_constant() {
        // The scan must do the same number of comparisons whatever the
        // padding value or the buffer contents: missed + matched is a
        // constant for any non-empty input.
        let mut counts = std::collections::HashSet::new();
        for len in 1..=32usize {
            for pad in [0u8, 1, 7, 15, 16, 255] {
                let matching = vec![pad; len];
                let (m0, m1) = check_padding(&matching, pad);
                counts.insert(m0 + m1);

                let mismatching = vec![pad.wrapping_add(1); len];
                let (n0, n1) = check_padding(&mismatching, pad);
                counts.insert(n0 + n1);
            }
        }
        assert_eq!(counts.len(), 1, "comparison count varied: {counts:?}");
    }

    #[test]
    fn test_remove_padding_roundtrip() {
        for len in 0..=40usize {
            let mut buf: Vec<u8> = (0..len as u8).collect();
            add_padding(&mut buf, 16);
            remove_padding(&mut buf, 0, 16, ProtocolVersion::TLS10).unwrap();
            assert_eq!(buf.len(), len);
        }
    }

    #[test]
    fn test_remove_padding_rejects_corrupt_padding_tls() {
        let mut buf = vec![0u8; 13];
        add_padding(&mut buf, 16);
        // Corrupt one padding byte (not the length byte).
        let idx = buf.len() - 2;
        buf[idx] ^= 0xFF;
        assert!(matches!(
            remove_padding(&mut buf, 0, 16, ProtocolVersion::TLS10),
            Err(TlsError::BadRecordMac)
        ));
    }

    #[test]
    fn test_remove_padding_sslv3_ignores_padding_content() {
        // SSLv3 only constrains the length byte.
        let mut buf = vec![0xEEu8; 14];
        buf.push(0x99);
        buf.push(0x01); // pad_len = 1, two padding bytes total
        assert_eq!(buf.len(), 16);
        remove_padding(&mut buf, 0, 16, ProtocolVersion::SSL30).unwrap();
        assert_eq!(buf.len(), 14);

        // But an oversized length byte still fails.
        let mut buf = vec![0u8; 31];
        buf.push(0x11); // pad_len = 17 > block_size
        assert!(remove_padding(&mut buf, 0, 16, ProtocolVersion::SSL30).is_err());
    }

    #[test]
    fn test_remove_padding_short_buffer_fails() {
        // pad_len + 1 + tag_len exceeds the buffer.
        let mut buf = vec![0x0Fu8; 16];
        assert!(matches!(
            remove_padding(&mut buf, 20, 16, ProtocolVersion::TLS10),
            Err(TlsError::BadRecordMac)
        ));
    }

    #[test]
    fn test_sanity_check_cbc() {
        let v10 = ProtocolVersion::TLS10;
        let v12 = ProtocolVersion::TLS12;
        assert!(!sanity_check_cbc(v10, 16, 20, 0));
        assert!(!sanity_check_cbc(v10, 16, 20, 17)); // misaligned
        assert!(!sanity_check_cbc(v10, 16, 20, 16)); // < mac + 1
        assert!(sanity_check_cbc(v10, 16, 20, 32));
        // TLS 1.1+ needs an extra block for the explicit IV.
        assert!(!sanity_check_cbc(v12, 16, 20, 32));
        assert!(sanity_check_cbc(v12, 16, 20, 48));
        // Small MAC: minimum is one block (+ IV block).
        assert!(sanity_check_cbc(v10, 16, 0, 16));
        assert!(!sanity_check_cbc(v12, 16, 0, 16));
    }

    // -- construction ----------------------------------------------------

    #[test]
    fn test_null_box_is_identity() {
        let mut case = CipherBox::null();
        assert!(case.is_null());
        assert_eq!(case.explicit_nonce_size(), 0);
        let mut buf = b"plaintext".to_vec();
        case.encrypt(&mut buf).unwrap();
        assert_eq!(buf, b"plaintext");
        case.decrypt(&mut buf, 0).unwrap();
        assert_eq!(buf, b"plaintext");
    }

    #[test]
    fn test_null_descriptor_yields_null_box() {
        let case = CipherBox::new(
            ProtocolVersion::TLS12,
            &B_NULL,
            &[],
            None,
            &provider(),
            rng(),
            true,
        )
        .unwrap();
        assert!(case.is_null());
    }

    #[test]
    fn test_disallowed_cipher_rejected() {
        let mut disallowed = B_AES_128.clone();
        disallowed.allowed = false;
        let err = CipherBox::new(
            ProtocolVersion::TLS12,
            &disallowed,
            &[0u8; 16],
            Some(&[0u8; 16]),
            &provider(),
            rng(),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, TlsError::UnsupportedCipher(_)));
    }

    #[test]
    fn test_key_size_mismatch_rejected() {
        let err = CipherBox::new(
            ProtocolVersion::TLS12,
            &B_AES_128,
            &[0u8; 24],
            Some(&[0u8; 16]),
            &provider(),
            rng(),
            true,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TlsError::InitializationFailed(CryptoError::InvalidKeyLength { expected: 16, got: 24 })
        ));
    }

    #[test]
    fn test_unserved_transformation_fails_initialization() {
        let err = CipherBox::new(
            ProtocolVersion::TLS12,
            &B_3DES,
            &[0u8; 24],
            Some(&[0u8; 8]),
            &provider(),
            rng(),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, TlsError::InitializationFailed(_)));
    }

    #[test]
    fn test_fixed_mask_is_zero_and_shared() {
        let a = fixed_mask(16);
        let b = fixed_mask(16);
        assert_eq!(a.as_slice(), &[0u8; 16]);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(fixed_mask(8).len(), 8);
    }

    #[test]
    fn test_explicit_nonce_sizes() {
        let cbc10 = cbc_box(ProtocolVersion::TLS10, true, Some(&[0u8; 16]));
        assert_eq!(cbc10.explicit_nonce_size(), 0);
        assert_eq!(cbc10.protocol_version(), ProtocolVersion::TLS10);
        assert!(cbc10.is_cbc_mode());
        assert!(!cbc10.is_aead_mode());

        let cbc11 = cbc_box(ProtocolVersion::TLS11, true, Some(&[0u8; 16]));
        assert_eq!(cbc11.explicit_nonce_size(), 16);

        let gcm = gcm_box(true);
        assert_eq!(gcm.explicit_nonce_size(), 8);
        assert!(gcm.is_aead_mode());
        assert!(!gcm.is_cbc_mode());

        assert_eq!(CipherBox::null().explicit_nonce_size(), 0);
    }

    // -- stream ----------------------------------------------------------

    #[test]
    fn test_stream_roundtrip() {
        let key = [0x42u8; 16];
        let mut enc = CipherBox::new(
            ProtocolVersion::TLS10,
            &B_RC4_128,
            &key,
            None,
            &provider(),
            rng(),
            true,
        )
        .unwrap();
        let mut dec = CipherBox::new(
            ProtocolVersion::TLS10,
            &B_RC4_128,
            &key,
            None,
            &provider(),
            rng(),
            false,
        )
        .unwrap();

        let plain = b"stream record with mac".to_vec();
        let mut buf = plain.clone();
        enc.encrypt(&mut buf).unwrap();
        assert_eq!(buf.len(), plain.len());
        assert_ne!(buf, plain);
        dec.decrypt(&mut buf, 20).unwrap();
        assert_eq!(buf, plain);
    }

    // -- CBC -------------------------------------------------------------

    #[test]
    fn test_cbc_tls10_roundtrip_with_mac_tail() {
        // "abc" plus a 20-byte MAC: pad_len must be 8 per RFC 2246.
        let iv = [0x55u8; 16];
        let mut enc = cbc_box(ProtocolVersion::TLS10, true, Some(&iv));
        let mut dec = cbc_box(ProtocolVersion::TLS10, false, Some(&iv));

        let mut fragment = b"abc".to_vec();
        fragment.extend_from_slice(&[0xAAu8; 20]);
        let plain = fragment.clone();
        enc.encrypt(&mut fragment).unwrap();
        assert_eq!(fragment.len(), 32);

        dec.decrypt(&mut fragment, 20).unwrap();
        assert_eq!(fragment.len(), 23);
        assert_eq!(fragment, plain);
    }

    #[test]
    fn test_cbc_tls12_explicit_iv_roundtrip() {
        let key_iv = [0x11u8; 16];
        let mut enc = cbc_box(ProtocolVersion::TLS12, true, Some(&key_iv));
        // Decrypt side gets no IV: the fixed zero mask stands in.
        let mut dec = cbc_box(ProtocolVersion::TLS12, false, None);
        let mut enc_auth = RecordAuthenticator::new(ProtocolVersion::TLS12, 20);
        let mut dec_auth = RecordAuthenticator::new(ProtocolVersion::TLS12, 20);

        let plain: Vec<u8> = (0..23u8).collect(); // payload + fake 20-byte MAC would be longer; any length works
        let nonce = enc
            .create_explicit_nonce(&mut enc_auth, ContentType::ApplicationData, plain.len())
            .unwrap();
        assert_eq!(nonce.len(), 16);

        let mut fragment = nonce;
        fragment.extend_from_slice(&plain);
        enc.encrypt(&mut fragment).unwrap();
        assert_eq!(fragment.len() % 16, 0);

        let iv_len = dec
            .apply_explicit_nonce(&mut dec_auth, ContentType::ApplicationData, &fragment)
            .unwrap();
        assert_eq!(iv_len, 16);
        dec.decrypt(&mut fragment, 20).unwrap();
        // Strip the recovered explicit-IV block the way the record layer does.
        assert_eq!(&fragment[iv_len..], plain.as_slice());
    }

    #[test]
    fn test_cbc_tls11_identical_plaintexts_differ() {
        let iv = [0x77u8; 16];
        let mut enc = cbc_box(ProtocolVersion::TLS11, true, Some(&iv));
        let mut auth = RecordAuthenticator::new(ProtocolVersion::TLS11, 20);

        let plain = vec![0x33u8; 31];
        let mut records = Vec::new();
        for _ in 0..2 {
            let nonce = enc
                .create_explicit_nonce(&mut auth, ContentType::ApplicationData, plain.len())
                .unwrap();
            let mut fragment = nonce;
            fragment.extend_from_slice(&plain);
            enc.encrypt(&mut fragment).unwrap();
            records.push(fragment);
        }
        assert_ne!(records[0], records[1]);
        assert_ne!(records[0][..16], records[1][..16]);
    }

    #[test]
    fn test_cbc_decrypt_rejects_bad_lengths() {
        let iv = [0u8; 16];
        let mut dec = cbc_box(ProtocolVersion::TLS10, false, Some(&iv));
        // Misaligned.
        let mut buf = vec![0u8; 33];
        assert!(matches!(dec.decrypt(&mut buf, 20), Err(TlsError::BadRecordMac)));
        // Too short for MAC + padding.
        let mut dec = cbc_box(ProtocolVersion::TLS10, false, Some(&iv));
        let mut buf = vec![0u8; 16];
        assert!(matches!(dec.decrypt(&mut buf, 20), Err(TlsError::BadRecordMac)));
    }

    #[test]
    fn test_cbc_corrupted_padding_length_fails_uniformly() {
        // Flipping bits in the last byte of the penultimate ciphertext
        // block changes only the padding-length byte of the plaintext
        // (CBC bit-flipping), so the resulting padding value is known.
        // Every such corruption must fail with BadRecordMac and nothing
        // else.
        for corrupt in [0x01u8, 0x0F, 0x10, 0xFF] {
            let iv = [0x21u8; 16];
            let mut enc = cbc_box(ProtocolVersion::TLS10, true, Some(&iv));
            let mut dec = cbc_box(ProtocolVersion::TLS10, false, Some(&iv));

            // 23 bytes pad to 32 with nine 0x08 padding bytes.
            let mut fragment = vec![0x42u8; 23];
            enc.encrypt(&mut fragment).unwrap();
            fragment[15] ^= corrupt;
            let err = dec.decrypt(&mut fragment, 20).unwrap_err();
            assert!(matches!(err, TlsError::BadRecordMac), "corrupt={corrupt:#x}");
        }
    }

    #[test]
    fn test_cbc_apply_explicit_nonce_sanity_checks() {
        let mut dec = cbc_box(ProtocolVersion::TLS12, false, None);
        let mut auth = RecordAuthenticator::new(ProtocolVersion::TLS12, 20);
        // 32 bytes cannot hold IV block + MAC + padding at TLS 1.2.
        let fragment = vec![0u8; 32];
        assert!(matches!(
            dec.apply_explicit_nonce(&mut auth, ContentType::ApplicationData, &fragment),
            Err(TlsError::BadRecordMac)
        ));
    }

    // -- AEAD ------------------------------------------------------------

    #[test]
    fn test_aead_roundtrip_known_values() {
        // key = 16 zeros, fixed_iv = 4 zeros, seq = 1, "hello".
        let mut enc = gcm_box(true);
        let mut dec = gcm_box(false);
        let mut enc_auth = RecordAuthenticator::with_sequence(ProtocolVersion::TLS12, 0, 1);
        let mut dec_auth = RecordAuthenticator::with_sequence(ProtocolVersion::TLS12, 0, 1);

        let plain = b"hello".to_vec();
        let nonce = enc
            .create_explicit_nonce(&mut enc_auth, ContentType::ApplicationData, plain.len())
            .unwrap();
        assert_eq!(nonce, &[0, 0, 0, 0, 0, 0, 0, 1]);

        let mut body = plain.clone();
        enc.encrypt(&mut body).unwrap();
        assert_eq!(body.len(), plain.len() + 16);

        let mut wire = nonce;
        wire.extend_from_slice(&body);
        let n = dec
            .apply_explicit_nonce(&mut dec_auth, ContentType::ApplicationData, &wire)
            .unwrap();
        assert_eq!(n, 8);
        dec.decrypt(&mut wire, 0).unwrap();
        assert_eq!(wire, plain);
    }

    #[test]
    fn test_aead_bit_flips_all_fail() {
        let plain = b"authenticated data".to_vec();
        let mut enc = gcm_box(true);
        let mut enc_auth = RecordAuthenticator::new(ProtocolVersion::TLS12, 0);
        let nonce = enc
            .create_explicit_nonce(&mut enc_auth, ContentType::ApplicationData, plain.len())
            .unwrap();
        let mut body = plain.clone();
        enc.encrypt(&mut body).unwrap();
        let mut wire = nonce;
        wire.extend_from_slice(&body);

        // Flip a bit in the explicit nonce, the body, and the tag.
        for index in [0usize, 3, 8, wire.len() / 2, wire.len() - 1] {
            let mut tampered = wire.clone();
            tampered[index] ^= 0x01;
            let mut dec = gcm_box(false);
            let mut dec_auth = RecordAuthenticator::new(ProtocolVersion::TLS12, 0);
            let applied =
                dec.apply_explicit_nonce(&mut dec_auth, ContentType::ApplicationData, &tampered);
            let result = applied.and_then(|_| dec.decrypt(&mut tampered, 0));
            assert!(
                matches!(result, Err(TlsError::BadRecordMac)),
                "bit flip at {index} not caught"
            );
        }
    }

    #[test]
    fn test_aead_consecutive_records_use_distinct_nonces() {
        let mut enc = gcm_box(true);
        let mut auth = RecordAuthenticator::new(ProtocolVersion::TLS12, 0);
        let n1 = enc
            .create_explicit_nonce(&mut auth, ContentType::ApplicationData, 4)
            .unwrap();
        let mut b1 = b"msg0".to_vec();
        enc.encrypt(&mut b1).unwrap();
        let n2 = enc
            .create_explicit_nonce(&mut auth, ContentType::ApplicationData, 4)
            .unwrap();
        assert_ne!(n1, n2);
    }

    #[test]
    fn test_aead_encrypt_without_nonce_setup_is_fatal() {
        let mut enc = gcm_box(true);
        let mut buf = b"data".to_vec();
        assert!(matches!(
            enc.encrypt(&mut buf),
            Err(TlsError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_aead_short_fragment_rejected() {
        let mut dec = gcm_box(false);
        let mut auth = RecordAuthenticator::new(ProtocolVersion::TLS12, 0);
        // Shorter than explicit nonce + tag.
        let fragment = vec![0u8; 23];
        assert!(matches!(
            dec.apply_explicit_nonce(&mut auth, ContentType::ApplicationData, &fragment),
            Err(TlsError::BadRecordMac)
        ));
    }

    #[test]
    fn test_aead_wrong_fixed_iv_size_rejected() {
        let err = CipherBox::new(
            ProtocolVersion::TLS12,
            &B_AES_128_GCM,
            &[0u8; 16],
            Some(&[0u8; 12]),
            &provider(),
            rng(),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, TlsError::InvariantViolation(_)));
    }
}
