/// Cryptographic primitive errors.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("operation not supported")]
    NotSupported,
    #[error("invalid argument")]
    InvalidArg,
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("invalid iv length")]
    InvalidIvLength,
    #[error("invalid tag length")]
    InvalidTagLength,
    #[error("cipher not initialized")]
    NotInitialized,
    #[error("aead: tag verification failed")]
    AeadTagVerifyFail,
    #[error("unknown curve: {0}")]
    UnknownCurve(String),
    #[error("random source failure")]
    RandomFailure,
    #[error("asn1 decode failed")]
    Asn1Error,
}

/// TLS protocol errors.
///
/// Every record-layer decryption failure an attacker could influence is
/// reported as [`TlsError::BadRecordMac`] with no sub-cause, so that MAC,
/// padding, tag, and length failures are indistinguishable on the wire
/// and in timing.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("unsupported cipher: {0}")]
    UnsupportedCipher(String),
    #[error("cipher initialization failed: {0}")]
    InitializationFailed(#[source] CryptoError),
    #[error("bad record MAC")]
    BadRecordMac,
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error("malformed extension: {0}")]
    DecodeError(String),
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}
