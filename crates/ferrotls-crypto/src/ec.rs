//! EC domain parameter construction for the provider probe.

use ferrotls_types::CryptoError;

use crate::oid::Oid;

/// Constructed EC domain parameters for a named curve.
///
/// Opaque to the negotiation layer: it only hands these to
/// algorithm-constraint checks and key-agreement setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcParameters {
    pub name: &'static str,
    pub oid: Oid,
    pub field_bits: u16,
}

/// Curves the bundled provider can construct parameters for.
const CONSTRUCTIBLE: &[(&str, &str, u16)] = &[
    ("1.2.840.10045.3.1.7", "secp256r1", 256),
    ("1.3.132.0.34", "secp384r1", 384),
    ("1.3.132.0.35", "secp521r1", 521),
    ("1.3.132.0.10", "secp256k1", 256),
];

pub fn parameters_for_oid(oid: &Oid) -> Result<EcParameters, CryptoError> {
    let dotted = oid.to_dot_string();
    for &(known, name, bits) in CONSTRUCTIBLE {
        if known == dotted {
            return Ok(EcParameters {
                name,
                oid: oid.clone(),
                field_bits: bits,
            });
        }
    }
    Err(CryptoError::UnknownCurve(dotted))
}
