//! Supported-groups (elliptic-curves) registry and hello extension.
//!
//! The registry is built once at startup from configuration: an ordered
//! preference list of curve names, or the built-in defaults (NIST
//! curves first; FIPS mode restricts to FIPS-approved curves). Each
//! candidate is probed against the primitive provider and dropped if
//! its EC parameters cannot be constructed.

use std::collections::HashMap;

use ferrotls_crypto::{EcParameters, Oid, PrimitiveProvider};
use ferrotls_types::TlsError;

/// Extension number of supported_groups (formerly elliptic_curves).
pub const EXT_SUPPORTED_GROUPS: u16 = 10;

/// A registered named elliptic curve.
#[derive(Debug, Clone, Copy)]
pub struct NamedCurve {
    pub id: u16,
    pub name: &'static str,
    pub oid: &'static str,
    pub fips_approved: bool,
}

/// Registered named curves, by IANA curve id.
pub const NAMED_CURVES: [NamedCurve; 25] = [
    NamedCurve { id: 1, name: "sect163k1", oid: "1.3.132.0.1", fips_approved: true },
    NamedCurve { id: 2, name: "sect163r1", oid: "1.3.132.0.2", fips_approved: false },
    NamedCurve { id: 3, name: "sect163r2", oid: "1.3.132.0.15", fips_approved: true },
    NamedCurve { id: 4, name: "sect193r1", oid: "1.3.132.0.24", fips_approved: false },
    NamedCurve { id: 5, name: "sect193r2", oid: "1.3.132.0.25", fips_approved: false },
    NamedCurve { id: 6, name: "sect233k1", oid: "1.3.132.0.26", fips_approved: true },
    NamedCurve { id: 7, name: "sect233r1", oid: "1.3.132.0.27", fips_approved: true },
    NamedCurve { id: 8, name: "sect239k1", oid: "1.3.132.0.3", fips_approved: false },
    NamedCurve { id: 9, name: "sect283k1", oid: "1.3.132.0.16", fips_approved: true },
    NamedCurve { id: 10, name: "sect283r1", oid: "1.3.132.0.17", fips_approved: true },
    NamedCurve { id: 11, name: "sect409k1", oid: "1.3.132.0.36", fips_approved: true },
    NamedCurve { id: 12, name: "sect409r1", oid: "1.3.132.0.37", fips_approved: true },
    NamedCurve { id: 13, name: "sect571k1", oid: "1.3.132.0.38", fips_approved: true },
    NamedCurve { id: 14, name: "sect571r1", oid: "1.3.132.0.39", fips_approved: true },
    NamedCurve { id: 15, name: "secp160k1", oid: "1.3.132.0.9", fips_approved: false },
    NamedCurve { id: 16, name: "secp160r1", oid: "1.3.132.0.8", fips_approved: false },
    NamedCurve { id: 17, name: "secp160r2", oid: "1.3.132.0.30", fips_approved: false },
    NamedCurve { id: 18, name: "secp192k1", oid: "1.3.132.0.31", fips_approved: false },
    NamedCurve { id: 19, name: "secp192r1", oid: "1.2.840.10045.3.1.1", fips_approved: true },
    NamedCurve { id: 20, name: "secp224k1", oid: "1.3.132.0.32", fips_approved: false },
    NamedCurve { id: 21, name: "secp224r1", oid: "1.3.132.0.33", fips_approved: true },
    NamedCurve { id: 22, name: "secp256k1", oid: "1.3.132.0.10", fips_approved: false },
    NamedCurve { id: 23, name: "secp256r1", oid: "1.2.840.10045.3.1.7", fips_approved: true },
    NamedCurve { id: 24, name: "secp384r1", oid: "1.3.132.0.34", fips_approved: true },
    NamedCurve { id: 25, name: "secp521r1", oid: "1.3.132.0.35", fips_approved: true },
];

/// Default preference order: NIST curves first, non-NIST second.
const DEFAULT_CURVES: &[u16] = &[23, 24, 25, 9, 10, 11, 12, 13, 14, 22];

/// Default preference order in FIPS mode: NIST curves only.
const DEFAULT_FIPS_CURVES: &[u16] = &[23, 24, 25, 9, 10, 11, 12, 13, 14];

pub fn curve_by_id(id: u16) -> Option<&'static NamedCurve> {
    NAMED_CURVES.iter().find(|c| c.id == id)
}

pub fn curve_by_name(name: &str, require_fips: bool) -> Option<&'static NamedCurve> {
    NAMED_CURVES
        .iter()
        .find(|c| c.name == name && (!require_fips || c.fips_approved))
}

pub fn curve_oid(id: u16) -> Option<&'static str> {
    curve_by_id(id).map(|c| c.oid)
}

pub fn id_for_oid(oid: &str) -> Option<u16> {
    NAMED_CURVES.iter().find(|c| c.oid == oid).map(|c| c.id)
}

/// Cryptographic operation categories for algorithm constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoPrimitive {
    KeyAgreement,
}

/// Policy hook deciding which curves may be negotiated.
pub trait AlgorithmConstraints {
    fn permits(&self, primitive: CryptoPrimitive, parameters: &EcParameters) -> bool;
}

/// Constraints permitting every constructible curve.
pub struct PermitAll;

impl AlgorithmConstraints for PermitAll {
    fn permits(&self, _primitive: CryptoPrimitive, _parameters: &EcParameters) -> bool {
        true
    }
}

/// Constraints permitting only FIPS-approved curves.
pub struct FipsConstraints;

impl AlgorithmConstraints for FipsConstraints {
    fn permits(&self, _primitive: CryptoPrimitive, parameters: &EcParameters) -> bool {
        let dotted = parameters.oid.to_dot_string();
        NAMED_CURVES
            .iter()
            .any(|c| c.oid == dotted && c.fips_approved)
    }
}

/// Process-wide configuration for the groups registry.
#[derive(Debug, Clone, Default)]
pub struct GroupsConfig {
    /// Ordered comma-separated curve names, optionally surrounded by
    /// double quotes. None or empty selects the defaults.
    pub preferred: Option<String>,
    /// Restrict curves to the FIPS-approved set.
    pub fips_mode: bool,
}

impl GroupsConfig {
    /// Read `FERROTLS_NAMED_GROUPS` and `FERROTLS_FIPS_MODE` from the
    /// environment.
    pub fn from_env() -> Self {
        let preferred = std::env::var("FERROTLS_NAMED_GROUPS")
            .ok()
            .filter(|s| !s.is_empty());
        let fips_mode = std::env::var("FERROTLS_FIPS_MODE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self {
            preferred,
            fips_mode,
        }
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if s.len() > 1 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// The curves this endpoint supports, in preference order, with their
/// constructed EC parameters.
#[derive(Debug)]
pub struct NamedGroupRegistry {
    supported: Vec<u16>,
    params: HashMap<u16, EcParameters>,
}

impl NamedGroupRegistry {
    pub fn new(
        config: &GroupsConfig,
        provider: &dyn PrimitiveProvider,
    ) -> Result<Self, TlsError> {
        let mut supported = Vec::new();
        let mut params = HashMap::new();

        let preferred = config
            .preferred
            .as_deref()
            .map(strip_quotes)
            .filter(|s| !s.is_empty());

        match preferred {
            Some(list) => {
                for name in list.split(',') {
                    let name = name.trim();
                    if name.is_empty() {
                        continue;
                    }
                    // Unknown names are ignored, not fatal.
                    let Some(curve) = curve_by_name(name, config.fips_mode) else {
                        continue;
                    };
                    if supported.contains(&curve.id) {
                        continue;
                    }
                    if let Some(p) = probe_curve(curve, provider) {
                        supported.push(curve.id);
                        params.insert(curve.id, p);
                    }
                }
                if supported.is_empty() {
                    return Err(TlsError::ConfigError(format!(
                        "preferred groups ({list}) contain no supported elliptic curves"
                    )));
                }
            }
            None => {
                let defaults = if config.fips_mode {
                    DEFAULT_FIPS_CURVES
                } else {
                    DEFAULT_CURVES
                };
                for &id in defaults {
                    let Some(curve) = curve_by_id(id) else {
                        continue;
                    };
                    if let Some(p) = probe_curve(curve, provider) {
                        supported.push(id);
                        params.insert(id, p);
                    }
                }
            }
        }

        Ok(Self { supported, params })
    }

    pub fn from_env(provider: &dyn PrimitiveProvider) -> Result<Self, TlsError> {
        Self::new(&GroupsConfig::from_env(), provider)
    }

    /// Supported curve ids in local preference order.
    pub fn supported_ids(&self) -> &[u16] {
        &self.supported
    }

    pub fn is_supported(&self, id: u16) -> bool {
        self.supported.contains(&id)
    }

    /// Constructed EC parameters for a supported curve.
    pub fn parameters(&self, id: u16) -> Option<&EcParameters> {
        self.params.get(&id)
    }

    /// Pick the curve to negotiate against a peer's offered ids.
    ///
    /// The walk is over the local supported list in local preference
    /// order; the peer's ordering carries no weight. Returns the first
    /// id that the peer offered and the constraints permit for key
    /// agreement, or None when no usable intersection exists.
    pub fn preferred_curve(
        &self,
        peer_ids: &[u16],
        constraints: &dyn AlgorithmConstraints,
    ) -> Option<u16> {
        self.supported.iter().copied().find(|id| {
            peer_ids.contains(id)
                && self
                    .params
                    .get(id)
                    .is_some_and(|p| constraints.permits(CryptoPrimitive::KeyAgreement, p))
        })
    }

    /// Build the supported_groups extension this endpoint advertises:
    /// locally supported curves the constraints permit, local order.
    pub fn create_extension(
        &self,
        constraints: &dyn AlgorithmConstraints,
    ) -> Option<SupportedGroupsExtension> {
        let ids: Vec<u16> = self
            .supported
            .iter()
            .copied()
            .filter(|id| {
                self.params
                    .get(id)
                    .is_some_and(|p| constraints.permits(CryptoPrimitive::KeyAgreement, p))
            })
            .collect();
        if ids.is_empty() {
            None
        } else {
            Some(SupportedGroupsExtension::new(ids))
        }
    }
}

fn probe_curve(curve: &NamedCurve, provider: &dyn PrimitiveProvider) -> Option<EcParameters> {
    let oid = Oid::from_dot_string(curve.oid).ok()?;
    provider.ec_parameters(&oid).ok()
}

/// The supported_groups hello extension: an ordered list of curve ids,
/// most preferred first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedGroupsExtension {
    curve_ids: Vec<u16>,
}

impl SupportedGroupsExtension {
    pub fn new(curve_ids: Vec<u16>) -> Self {
        Self { curve_ids }
    }

    /// Parse from the extension_data payload:
    /// `list_len(2) || curve_id(2)*`.
    ///
    /// Unknown ids are preserved; selection ignores them later.
    pub fn parse(extension_data: &[u8]) -> Result<Self, TlsError> {
        if extension_data.len() < 2 {
            return Err(TlsError::DecodeError("supported_groups: too short".into()));
        }
        let list_len = u16::from_be_bytes([extension_data[0], extension_data[1]]) as usize;
        if list_len % 2 != 0 || list_len + 2 != extension_data.len() {
            return Err(TlsError::DecodeError(
                "supported_groups: invalid length".into(),
            ));
        }
        let mut curve_ids = Vec::with_capacity(list_len / 2);
        for i in (0..list_len).step_by(2) {
            curve_ids.push(u16::from_be_bytes([
                extension_data[2 + i],
                extension_data[2 + i + 1],
            ]));
        }
        Ok(Self { curve_ids })
    }

    /// Encode the extension_data payload: `list_len || ids`.
    pub fn extension_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(2 + self.curve_ids.len() * 2);
        data.extend_from_slice(&((self.curve_ids.len() * 2) as u16).to_be_bytes());
        for id in &self.curve_ids {
            data.extend_from_slice(&id.to_be_bytes());
        }
        data
    }

    /// Full wire encoding: `type(2) || total_len(2) || list_len(2) || ids`
    /// with `total_len = list_len + 2`.
    pub fn encode(&self) -> Vec<u8> {
        let list_len = (self.curve_ids.len() * 2) as u16;
        let mut data = Vec::with_capacity(6 + self.curve_ids.len() * 2);
        data.extend_from_slice(&EXT_SUPPORTED_GROUPS.to_be_bytes());
        data.extend_from_slice(&(list_len + 2).to_be_bytes());
        data.extend_from_slice(&list_len.to_be_bytes());
        for id in &self.curve_ids {
            data.extend_from_slice(&id.to_be_bytes());
        }
        data
    }

    pub fn curve_ids(&self) -> &[u16] {
        &self.curve_ids
    }

    pub fn contains(&self, id: u16) -> bool {
        self.curve_ids.contains(&id)
    }
}
