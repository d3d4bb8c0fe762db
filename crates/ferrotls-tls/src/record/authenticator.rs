//! Per-direction record authentication state: sequence numbers and the
//! additional-authenticated-data block.

use crate::record::ContentType;
use crate::ProtocolVersion;

/// Contract between the record layer and the bulk cipher.
///
/// The implementor owns the per-direction 64-bit sequence number.
/// `acquire_authentication_bytes` must be called exactly once per
/// record, immediately before the corresponding encrypt or decrypt on
/// AEAD paths; calling it advances the sequence number.
pub trait Authenticator {
    /// Current 8-byte big-endian sequence number, without advancing it.
    fn sequence_number(&self) -> [u8; 8];

    /// MAC length in bytes; 0 for AEAD cipher suites.
    fn mac_len(&self) -> usize;

    /// Return the authentication block for one record and advance the
    /// sequence number.
    fn acquire_authentication_bytes(
        &mut self,
        content_type: ContentType,
        length: usize,
    ) -> Vec<u8>;

    /// True once the sequence number is about to wrap; the connection
    /// must be renegotiated or closed before the next record.
    fn sequence_overflow(&self) -> bool;
}

/// Authenticator producing the standard 13-byte block:
/// `seq(8) || content_type(1) || version(2) || length(2)`.
pub struct RecordAuthenticator {
    version: ProtocolVersion,
    mac_len: usize,
    seq: u64,
}

impl RecordAuthenticator {
    pub fn new(version: ProtocolVersion, mac_len: usize) -> Self {
        Self {
            version,
            mac_len,
            seq: 0,
        }
    }

    /// Resume at a given sequence number (host-restored state).
    pub fn with_sequence(version: ProtocolVersion, mac_len: usize, seq: u64) -> Self {
        Self {
            version,
            mac_len,
            seq,
        }
    }
}

impl Authenticator for RecordAuthenticator {
    fn sequence_number(&self) -> [u8; 8] {
        self.seq.to_be_bytes()
    }

    fn mac_len(&self) -> usize {
        self.mac_len
    }

    fn acquire_authentication_bytes(
        &mut self,
        content_type: ContentType,
        length: usize,
    ) -> Vec<u8> {
        let mut block = Vec::with_capacity(13);
        block.extend_from_slice(&self.seq.to_be_bytes());
        block.push(content_type as u8);
        block.push(self.version.major());
        block.push(self.version.minor());
        block.extend_from_slice(&(length as u16).to_be_bytes());
        self.seq = self.seq.wrapping_add(1);
        block
    }

    fn sequence_overflow(&self) -> bool {
        self.seq == u64::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aad_layout() {
        let mut auth = RecordAuthenticator::with_sequence(ProtocolVersion::TLS12, 0, 42);
        let aad = auth.acquire_authentication_bytes(ContentType::ApplicationData, 100);
        assert_eq!(aad.len(), 13);
        assert_eq!(&aad[..8], &[0, 0, 0, 0, 0, 0, 0, 42]);
        assert_eq!(aad[8], 23);
        assert_eq!(&aad[9..11], &[0x03, 0x03]);
        assert_eq!(&aad[11..13], &[0x00, 0x64]);
    }

    #[test]
    fn test_acquire_advances_sequence() {
        let mut auth = RecordAuthenticator::new(ProtocolVersion::TLS12, 0);
        assert_eq!(auth.sequence_number(), [0u8; 8]);
        auth.acquire_authentication_bytes(ContentType::Handshake, 1);
        assert_eq!(auth.sequence_number(), [0, 0, 0, 0, 0, 0, 0, 1]);
        auth.acquire_authentication_bytes(ContentType::Handshake, 1);
        assert_eq!(auth.sequence_number(), [0, 0, 0, 0, 0, 0, 0, 2]);
    }

    #[test]
    fn test_sequence_number_reads_do_not_advance() {
        let auth = RecordAuthenticator::new(ProtocolVersion::TLS12, 20);
        assert_eq!(auth.sequence_number(), auth.sequence_number());
        assert_eq!(auth.mac_len(), 20);
    }

    #[test]
    fn test_overflow_flag() {
        let auth = RecordAuthenticator::with_sequence(ProtocolVersion::TLS12, 0, u64::MAX);
        assert!(auth.sequence_overflow());
        let auth = RecordAuthenticator::new(ProtocolVersion::TLS12, 0);
        assert!(!auth.sequence_overflow());
    }
}
