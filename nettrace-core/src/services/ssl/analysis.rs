//! Certificate security analysis.
//!
//! Pure functions over an [`SslResult`]: [`analyze`] appends findings to
//! `errors` (never removing what the handshake recorded), [`security_level`]
//! and [`recommendations`] classify the result afterwards.

use chrono::{DateTime, Utc};

use crate::types::{CertificateInfo, KeyAlgorithm, SecurityLevel, SslResult};

/// Certificates expiring within this many days get a warning.
pub const EXPIRY_WARNING_DAYS: i64 = 30;

const MIN_RSA_BITS: u32 = 2048;
const MIN_DSA_BITS: u32 = 2048;
const MIN_ECDSA_BITS: u32 = 256;

pub(crate) const EXPIRED: &str = "certificate has expired";
pub(crate) const NOT_YET_VALID: &str = "certificate is not yet valid";
const SELF_SIGNED: &str = "warning: self-signed certificate";
const INCOMPLETE_CHAIN: &str = "warning: incomplete certificate chain (server sent only the leaf)";

/// sha1WithRSA, md5WithRSA, md2WithRSA, ecdsa-with-SHA1, dsa-with-sha1.
const WEAK_SIGNATURE_OIDS: &[&str] = &[
    "1.2.840.113549.1.1.5",
    "1.2.840.113549.1.1.4",
    "1.2.840.113549.1.1.2",
    "1.2.840.10045.4.1",
    "1.2.840.10040.4.3",
];

/// Whether a signature algorithm (name or dotted OID) relies on SHA-1 or an older digest.
pub fn is_weak_signature(algorithm: &str) -> bool {
    if WEAK_SIGNATURE_OIDS.contains(&algorithm) {
        return true;
    }
    let lower = algorithm.to_ascii_lowercase();
    ["sha1", "sha-1", "md5", "md2"]
        .iter()
        .any(|digest| lower.contains(digest))
}

/// Key size below the accepted minimum for its algorithm, as `(algorithm, bits)`.
pub fn weak_key(cert: &CertificateInfo) -> Option<(KeyAlgorithm, u32)> {
    let key = cert.public_key;
    let minimum = match key.algorithm {
        KeyAlgorithm::Rsa => MIN_RSA_BITS,
        KeyAlgorithm::Dsa => MIN_DSA_BITS,
        KeyAlgorithm::Ecdsa => MIN_ECDSA_BITS,
        KeyAlgorithm::Ed25519 | KeyAlgorithm::Unknown => return None,
    };
    key.bits
        .filter(|bits| *bits < minimum)
        .map(|bits| (key.algorithm, bits))
}

/// Run every rule against the leaf certificate and append the findings.
///
/// Error-level findings clear `valid`; warnings leave it untouched.
pub fn analyze(result: &mut SslResult, now: DateTime<Utc>) {
    let Some(cert) = result.certificate.clone() else {
        return;
    };

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if is_weak_signature(&cert.signature_algorithm) {
        errors.push(format!(
            "weak signature algorithm: {}",
            cert.signature_algorithm
        ));
    }
    if let Some((algorithm, bits)) = weak_key(&cert) {
        errors.push(format!("weak {algorithm} key: {bits} bits"));
    }

    result.expires = Some(cert.not_after);
    result.days_until_expiry = (cert.not_after - now).num_days();
    // Less than a whole day left counts as expired.
    if cert.not_after <= now || result.days_until_expiry <= 0 {
        errors.push(EXPIRED.to_string());
    } else if cert.not_before > now {
        errors.push(NOT_YET_VALID.to_string());
    } else if result.days_until_expiry <= EXPIRY_WARNING_DAYS {
        warnings.push(format!(
            "warning: certificate expires in {} days",
            result.days_until_expiry
        ));
    }

    if cert.is_self_signed() {
        warnings.push(SELF_SIGNED.to_string());
    }
    if result.chain.len() == 1 {
        warnings.push(INCOMPLETE_CHAIN.to_string());
    }

    // The handshake verifier stops at its first problem, so a name mismatch
    // behind an untrusted issuer would otherwise go unreported.
    let name_reported = result
        .errors
        .iter()
        .any(|e| e.to_ascii_lowercase().contains("name"));
    if !name_reported && !check_domain_match(&result.host, common_name(&cert.subject), &cert.sans)
    {
        errors.push(format!("certificate does not match host {}", result.host));
    }

    if !errors.is_empty() {
        result.valid = false;
    }
    result.errors.extend(errors);
    result.errors.extend(warnings);
}

/// Classify an analysed result.
///
/// `Insecure` whenever the result is not valid, so an expired certificate is
/// always insecure; a valid result with no findings is always `Secure`.
pub fn security_level(result: &SslResult) -> SecurityLevel {
    if !result.valid {
        return SecurityLevel::Insecure;
    }
    let weak = result.errors.iter().any(|e| {
        let lower = e.to_ascii_lowercase();
        ["expired", "weak", "sha-1", "sha1"]
            .iter()
            .any(|keyword| lower.contains(keyword))
    });
    if weak {
        SecurityLevel::Weak
    } else if result.errors.is_empty() {
        SecurityLevel::Secure
    } else {
        SecurityLevel::Warning
    }
}

/// Remediation advice derived from the certificate itself. Never empty.
pub fn recommendations(result: &SslResult) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(cert) = &result.certificate {
        if is_weak_signature(&cert.signature_algorithm) {
            out.push("Reissue the certificate with a SHA-256 or stronger signature".to_string());
        }
        if let Some((algorithm, _)) = weak_key(cert) {
            let advice = match algorithm {
                KeyAlgorithm::Ecdsa => "Use an ECDSA key on P-256 or a larger curve",
                _ => "Use an RSA key of at least 2048 bits",
            };
            out.push(advice.to_string());
        }
        if result.days_until_expiry <= 0 {
            out.push("Renew the certificate immediately".to_string());
        } else if result.days_until_expiry <= EXPIRY_WARNING_DAYS {
            out.push(format!(
                "Renew the certificate within {} days",
                result.days_until_expiry
            ));
        }
        if cert.is_self_signed() {
            out.push(
                "Replace the self-signed certificate with one issued by a trusted CA".to_string(),
            );
        }
    } else {
        out.push("Serve a certificate on this port".to_string());
    }

    if result.chain.len() == 1 {
        out.push("Configure the server to send its intermediate certificates".to_string());
    }
    if !result.valid && out.is_empty() {
        out.push("Review the certificate errors reported for this host".to_string());
    }
    if out.is_empty() {
        out.push("Certificate configuration appears secure".to_string());
    }
    out
}

/// Extract the `CN=` component of a distinguished name string.
pub(crate) fn common_name(dn: &str) -> Option<&str> {
    dn.split(", ")
        .find_map(|part| part.trim().strip_prefix("CN="))
}

/// Check whether the queried host matches the certificate's CN or SANs.
pub(crate) fn check_domain_match(query: &str, cn: Option<&str>, san: &[String]) -> bool {
    let query_lower = query.to_lowercase();

    if let Some(cn) = cn
        && matches_domain(&query_lower, &cn.to_lowercase())
    {
        return true;
    }

    san.iter()
        .any(|name| matches_domain(&query_lower, &name.to_lowercase()))
}

/// Domain matching with wildcard support.
fn matches_domain(query: &str, pattern: &str) -> bool {
    if query == pattern {
        return true;
    }

    // Wildcards match exactly one label: *.example.com covers foo.example.com only.
    if let Some(suffix) = pattern.strip_prefix("*.")
        && let Some(prefix) = query.strip_suffix(suffix)
        && let Some(label) = prefix.strip_suffix('.')
    {
        return !label.is_empty() && !label.contains('.');
    }

    false
}
