
use sha2::{Digest, Sha256};

/// The only hash this endpoint negotiates.
pub const ALGORITHM_SHA256: &str = "sha-256";

/// A certificate fingerprint as exchanged in SDP: the hash algorithm name and
/// the colon-separated uppercase hex digest.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub algorithm: String,
    pub value: String,
}

impl Fingerprint {
    /// Computes the sha-256 fingerprint of a raw DER certificate body.
    pub fn sha256(cert_der: &[u8]) -> Self {
        Fingerprint {
            algorithm: ALGORITHM_SHA256.to_owned(),
            value: digest_sha256(cert_der),
        }
    }

    /// Compares against another fingerprint value. Comparison is string
    /// equality after both sides go through the same formatting, so a
    /// lowercase peer value still matches.
    pub fn matches_value(&self, other: &str) -> bool {
        self.value == other.to_uppercase()
    }
}

/// Hashes a DER certificate body and formats the digest the way SDP
/// `a=fingerprint` carries it: uppercase hex, one `:` between byte pairs.
pub fn digest_sha256(cert_der: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(cert_der);
    let hashed = h.finalize();

    let values: Vec<String> = hashed.iter().map(|x| format!("{x:02X}")).collect();
    values.join(":")
}
