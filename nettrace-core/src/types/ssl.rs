use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public key algorithm of a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    Rsa,
    Ecdsa,
    Ed25519,
    Dsa,
    Unknown,
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Rsa => "RSA",
            Self::Ecdsa => "ECDSA",
            Self::Ed25519 => "Ed25519",
            Self::Dsa => "DSA",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Public key summary with an explicit size per algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyInfo {
    pub algorithm: KeyAlgorithm,
    /// Key size in bits (modulus for RSA/DSA, curve size for ECDSA, 256 for Ed25519).
    pub bits: Option<u32>,
}

impl PublicKeyInfo {
    pub const fn rsa_bits(&self) -> Option<u32> {
        match self.algorithm {
            KeyAlgorithm::Rsa => self.bits,
            _ => None,
        }
    }

    pub const fn ecdsa_bits(&self) -> Option<u32> {
        match self.algorithm {
            KeyAlgorithm::Ecdsa => self.bits,
            _ => None,
        }
    }

    pub const fn dsa_bits(&self) -> Option<u32> {
        match self.algorithm {
            KeyAlgorithm::Dsa => self.bits,
            _ => None,
        }
    }
}

/// Parsed X.509 certificate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateInfo {
    pub subject: String,
    /// Certificate issuer (e.g. `"CN=R11, O=Let's Encrypt"`).
    pub issuer: String,
    /// Certificate serial number (hex).
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Signature algorithm name (e.g. `"sha256WithRSAEncryption"`), or the dotted OID.
    pub signature_algorithm: String,
    pub public_key: PublicKeyInfo,
    /// Subject Alternative Names (DNS names and IP addresses).
    pub sans: Vec<String>,
    /// Whether this is a CA certificate.
    pub is_ca: bool,
}

impl CertificateInfo {
    pub fn is_self_signed(&self) -> bool {
        self.issuer == self.subject
    }
}

/// TLS certificate check result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslResult {
    pub host: String,
    pub port: u16,
    /// Leaf certificate.
    pub certificate: Option<CertificateInfo>,
    /// Full chain as presented by the server, leaf first.
    pub chain: Vec<CertificateInfo>,
    /// False as soon as any error-level finding exists.
    pub valid: bool,
    /// Human-readable errors and warnings.
    pub errors: Vec<String>,
    pub expires: Option<DateTime<Utc>>,
    /// Whole days until expiry (negative if expired).
    pub days_until_expiry: i64,
    pub issuer: String,
    pub subject: String,
    pub sans: Vec<String>,
    /// Negotiated protocol (e.g. `"TLSv1_3"`).
    pub protocol_version: Option<String>,
    /// Negotiated cipher suite.
    pub cipher_suite: Option<String>,
}

/// Overall verdict derived from an [`SslResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityLevel {
    Insecure,
    Weak,
    Warning,
    Secure,
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Insecure => "INSECURE",
            Self::Weak => "WEAK",
            Self::Warning => "WARNING",
            Self::Secure => "SECURE",
        };
        f.write_str(s)
    }
}

/// Certificate check plus its classification, as returned by the SSL tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslReport {
    pub result: SslResult,
    pub security_level: SecurityLevel,
    pub recommendations: Vec<String>,
}
