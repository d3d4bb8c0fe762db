#![forbid(unsafe_code)]
#![doc = "Primitive provider layer for ferrotls: symmetric ciphers, randomness, and EC parameter probing."]

mod cipher;

pub mod ec;
pub mod oid;
pub mod provider;
pub mod random;

pub use ec::EcParameters;
pub use oid::Oid;
pub use provider::{
    CipherMode, CipherParams, DefaultProvider, PrimitiveProvider, SymmetricCipher, Transformation,
};
pub use random::{SecureRandom, SystemRandom};
