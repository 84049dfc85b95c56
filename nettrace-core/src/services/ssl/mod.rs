//! TLS certificate inspection.
//!
//! The handshake runs with a diagnostic verifier: the WebPKI verdict against
//! `webpki-roots` is recorded instead of enforced, so an untrusted or
//! mismatched certificate still comes back for analysis.

pub mod analysis;

use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, trace, warn};
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use x509_parser::prelude::*;

use crate::error::{ErrorCode, NetTraceError, NetTraceResult};
use crate::retry::RetryPolicy;
use crate::services::validate_host;
use crate::types::{CertificateInfo, KeyAlgorithm, PublicKeyInfo, SslResult};

const OID_ED25519: &str = "1.3.101.112";

/// Signature algorithm names for the OIDs seen in the wild.
const SIGNATURE_NAMES: &[(&str, &str)] = &[
    ("1.2.840.113549.1.1.2", "md2WithRSAEncryption"),
    ("1.2.840.113549.1.1.4", "md5WithRSAEncryption"),
    ("1.2.840.113549.1.1.5", "sha1WithRSAEncryption"),
    ("1.2.840.113549.1.1.10", "rsassaPss"),
    ("1.2.840.113549.1.1.11", "sha256WithRSAEncryption"),
    ("1.2.840.113549.1.1.12", "sha384WithRSAEncryption"),
    ("1.2.840.113549.1.1.13", "sha512WithRSAEncryption"),
    ("1.2.840.10045.4.1", "ecdsa-with-SHA1"),
    ("1.2.840.10045.4.3.2", "ecdsa-with-SHA256"),
    ("1.2.840.10045.4.3.3", "ecdsa-with-SHA384"),
    ("1.2.840.10045.4.3.4", "ecdsa-with-SHA512"),
    ("1.2.840.10040.4.3", "dsa-with-sha1"),
    ("1.3.101.112", "Ed25519"),
];

/// Initialize the rustls `CryptoProvider` (once).
///
/// `install_default` only fails when a provider is already installed, which is fine.
fn ensure_crypto_provider() {
    let _ = CryptoProvider::install_default(rustls::crypto::ring::default_provider());
}

/// Accepts any chain, recording what WebPKI would have rejected it for.
///
/// Expiry is skipped here; the analysis pass reports it with exact dates.
#[derive(Debug)]
struct DiagnosticVerifier {
    inner: Arc<WebPkiServerVerifier>,
    findings: Arc<Mutex<Vec<String>>>,
}

impl DiagnosticVerifier {
    fn record(&self, finding: String) {
        if let Ok(mut findings) = self.findings.lock() {
            findings.push(finding);
        }
    }

    /// Keys WebPKI refuses to verify with (RSA under 2048 bits, for one) must
    /// not abort the handshake before the certificate is captured.
    fn signature_rejected(&self, err: &rustls::Error) -> HandshakeSignatureValid {
        trace!("[SSL] Handshake signature rejected: {err}");
        self.record(format!("handshake signature rejected: {err}"));
        HandshakeSignatureValid::assertion()
    }
}

impl ServerCertVerifier for DiagnosticVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if let Err(e) = self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            trace!("[SSL] WebPKI verification failed: {e}");
            if !is_validity_error(&e) {
                self.record(describe_verification_error(&e));
            }
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(self
            .inner
            .verify_tls12_signature(message, cert, dss)
            .unwrap_or_else(|e| self.signature_rejected(&e)))
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(self
            .inner
            .verify_tls13_signature(message, cert, dss)
            .unwrap_or_else(|e| self.signature_rejected(&e)))
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

fn is_validity_error(err: &rustls::Error) -> bool {
    matches!(
        err,
        rustls::Error::InvalidCertificate(
            CertificateError::Expired
                | CertificateError::ExpiredContext { .. }
                | CertificateError::NotValidYet
                | CertificateError::NotValidYetContext { .. }
        )
    )
}

fn describe_verification_error(err: &rustls::Error) -> String {
    match err {
        rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer) => {
            "certificate issuer is not trusted".to_string()
        }
        rustls::Error::InvalidCertificate(
            CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. },
        ) => {
            "certificate is not valid for this host name".to_string()
        }
        rustls::Error::InvalidCertificate(CertificateError::Revoked) => {
            "certificate has been revoked".to_string()
        }
        rustls::Error::InvalidCertificate(CertificateError::BadSignature) => {
            "certificate signature is invalid".to_string()
        }
        other => other.to_string(),
    }
}

/// What one successful handshake yielded.
struct Handshake {
    certificates: Vec<CertificateDer<'static>>,
    protocol_version: Option<String>,
    cipher_suite: Option<String>,
    findings: Vec<String>,
}

/// Connect to `host:port`, capture the presented chain and analyse it.
///
/// An `Ok` result always carries the leaf certificate; a server that presents
/// none fails with `SSL_CHECK_FAILED`.
pub(crate) async fn ssl_check(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    host: &str,
    port: u16,
) -> NetTraceResult<SslResult> {
    let host = validate_host(host, ErrorCode::SslValidationFailed)?;
    if port == 0 {
        return Err(NetTraceError::validation(
            ErrorCode::SslValidationFailed,
            "Port must be between 1 and 65535",
        )
        .with_context("port", port));
    }
    let server_name = ServerName::try_from(host.clone()).map_err(|e| {
        NetTraceError::validation(ErrorCode::SslValidationFailed, "Invalid host name")
            .with_context("host", &host)
            .with_source(e)
    })?;

    ensure_crypto_provider();
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let roots = Arc::new(roots);

    debug!("[SSL] Starting check for {host}:{port}");
    let start = Instant::now();

    let handshake = policy
        .run(cancel, "ssl", |attempt| {
            if attempt > 0 {
                debug!("[SSL] Retrying handshake with {host}:{port} (attempt {attempt})");
            }
            handshake(Arc::clone(&roots), server_name.clone(), &host, port)
        })
        .await
        .map_err(|e| {
            e.with_code(ErrorCode::SslCheckFailed)
                .with_context("host", &host)
                .with_context("port", port)
        })?;

    let mut ders = handshake.certificates.iter();
    let leaf = ders
        .next()
        .ok_or_else(|| no_certificate(&host, port))
        .and_then(|der| parse_certificate(der.as_ref()))?;
    let mut chain = vec![leaf.clone()];
    for der in ders {
        match parse_certificate(der.as_ref()) {
            Ok(cert) => chain.push(cert),
            Err(e) => warn!("[SSL] Skipping unparseable chain certificate from {host}: {e}"),
        }
    }

    let mut result = SslResult {
        host: host.clone(),
        port,
        valid: handshake.findings.is_empty(),
        errors: handshake.findings,
        expires: Some(leaf.not_after),
        days_until_expiry: 0,
        issuer: leaf.issuer.clone(),
        subject: leaf.subject.clone(),
        sans: leaf.sans.clone(),
        certificate: Some(leaf),
        chain,
        protocol_version: handshake.protocol_version,
        cipher_suite: handshake.cipher_suite,
    };
    analysis::analyze(&mut result, Utc::now());

    debug!(
        "[SSL] Check completed: {host}:{port} - valid={}, days_remaining={}, chain_length={}, findings={}, total_time={:?}",
        result.valid,
        result.days_until_expiry,
        result.chain.len(),
        result.errors.len(),
        start.elapsed()
    );
    Ok(result)
}

async fn handshake(
    roots: Arc<RootCertStore>,
    server_name: ServerName<'static>,
    host: &str,
    port: u16,
) -> NetTraceResult<Handshake> {
    let findings = Arc::new(Mutex::new(Vec::new()));
    let inner = WebPkiServerVerifier::builder(roots).build().map_err(|e| {
        NetTraceError::system(ErrorCode::Internal, "Failed to build certificate verifier")
            .with_source(e)
    })?;
    let verifier = DiagnosticVerifier {
        inner,
        findings: Arc::clone(&findings),
    };
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    trace!("[SSL] Establishing TCP connection...");
    let stream = TcpStream::connect((host, port)).await.map_err(|e| {
        warn!("[SSL] TCP connection failed: {e}");
        NetTraceError::network(ErrorCode::SslCheckFailed, format!("Connection failed: {e}"))
            .with_source(e)
    })?;

    trace!("[SSL] Performing TLS handshake...");
    let tls = connector.connect(server_name, stream).await.map_err(|e| {
        warn!("[SSL] TLS handshake failed: {e}");
        NetTraceError::network(
            ErrorCode::SslCheckFailed,
            format!("TLS handshake failed: {e}"),
        )
        .with_source(e)
    })?;

    let (_, conn) = tls.get_ref();
    let certificates = conn
        .peer_certificates()
        .filter(|certs| !certs.is_empty())
        .map(<[CertificateDer<'static>]>::to_vec)
        .ok_or_else(|| no_certificate(host, port))?;
    trace!("[SSL] Retrieved {} certificate(s)", certificates.len());

    let protocol_version = conn.protocol_version().map(|v| format!("{v:?}"));
    let cipher_suite = conn
        .negotiated_cipher_suite()
        .map(|cs| format!("{:?}", cs.suite()));
    let findings = findings
        .lock()
        .map(|mut f| std::mem::take(&mut *f))
        .unwrap_or_default();

    Ok(Handshake {
        certificates,
        protocol_version,
        cipher_suite,
        findings,
    })
}

fn no_certificate(host: &str, port: u16) -> NetTraceError {
    NetTraceError::network(ErrorCode::SslCheckFailed, "No certificate presented")
        .with_context("host", host)
        .with_context("port", port)
}

/// Parse one DER certificate into [`CertificateInfo`].
pub(crate) fn parse_certificate(der: &[u8]) -> NetTraceResult<CertificateInfo> {
    let (_, cert) = X509Certificate::from_der(der).map_err(|e| {
        NetTraceError::network(
            ErrorCode::SslCheckFailed,
            format!("Certificate parsing failed: {e}"),
        )
    })?;

    let validity = cert.validity();
    let not_before = timestamp(validity.not_before.timestamp())?;
    let not_after = timestamp(validity.not_after.timestamp())?;

    let sans = cert
        .subject_alternative_name()
        .ok()
        .flatten()
        .map(|ext| {
            ext.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some((*dns).to_string()),
                    GeneralName::IPAddress(bytes) => ip_from_bytes(bytes).map(|ip| ip.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let signature_oid = cert.signature_algorithm.algorithm.to_id_string();

    Ok(CertificateInfo {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial_number: cert.serial.to_str_radix(16).to_uppercase(),
        not_before,
        not_after,
        signature_algorithm: signature_name(&signature_oid),
        public_key: public_key_info(&cert),
        sans,
        is_ca: cert.is_ca(),
    })
}

fn timestamp(secs: i64) -> NetTraceResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        NetTraceError::network(
            ErrorCode::SslCheckFailed,
            format!("Certificate validity out of range: {secs}"),
        )
    })
}

fn signature_name(oid: &str) -> String {
    SIGNATURE_NAMES
        .iter()
        .find(|(known, _)| *known == oid)
        .map_or_else(|| oid.to_string(), |(_, name)| (*name).to_string())
}

fn public_key_info(cert: &X509Certificate<'_>) -> PublicKeyInfo {
    let spki = cert.public_key();
    if spki.algorithm.algorithm.to_id_string() == OID_ED25519 {
        return PublicKeyInfo {
            algorithm: KeyAlgorithm::Ed25519,
            bits: Some(256),
        };
    }
    match spki.parsed() {
        Ok(x509_parser::public_key::PublicKey::RSA(rsa)) => PublicKeyInfo {
            algorithm: KeyAlgorithm::Rsa,
            bits: integer_bits(rsa.modulus),
        },
        Ok(x509_parser::public_key::PublicKey::EC(point)) => PublicKeyInfo {
            algorithm: KeyAlgorithm::Ecdsa,
            bits: ec_point_bits(point.data()),
        },
        Ok(x509_parser::public_key::PublicKey::DSA(y)) => PublicKeyInfo {
            algorithm: KeyAlgorithm::Dsa,
            bits: integer_bits(y),
        },
        _ => PublicKeyInfo {
            algorithm: KeyAlgorithm::Unknown,
            bits: None,
        },
    }
}

/// Bit length of a big-endian unsigned integer.
fn integer_bits(bytes: &[u8]) -> Option<u32> {
    let start = bytes.iter().position(|b| *b != 0)?;
    let significant = u32::try_from(bytes.len() - start).ok()?;
    Some(significant * 8 - bytes[start].leading_zeros())
}

/// Field size of an encoded EC point (SEC 1 uncompressed or compressed form).
fn ec_point_bits(point: &[u8]) -> Option<u32> {
    let bytes = match point.split_first()? {
        (0x04, coords) if !coords.is_empty() => coords.len() / 2,
        (0x02 | 0x03, x) if !x.is_empty() => x.len(),
        _ => return None,
    };
    u32::try_from(bytes * 8).ok()
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rustls::ServerConfig;
    use rustls::server::{ClientHello, ResolvesServerCert};
    use rustls::sign::CertifiedKey;
    use rustls_pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
    use tokio::net::TcpListener;
    use tokio_rustls::TlsAcceptor;

    use super::*;
    use crate::types::SecurityLevel;

    const RSA_SELF_SIGNED: &[u8] = include_bytes!("../../../tests/fixtures/rsa_self_signed.der");
    const EC_CA: &[u8] = include_bytes!("../../../tests/fixtures/ec_ca.der");
    const RSA_1024_LOCALHOST: &[u8] =
        include_bytes!("../../../tests/fixtures/rsa1024_localhost.der");
    const P256_SIGNING_KEY: &[u8] = include_bytes!("../../../tests/fixtures/p256_signing_key.pk8");

    /// Serves the 1024-bit RSA certificate. ring cannot sign with a key that
    /// small, so the handshake is signed with an unrelated P-256 key; the
    /// client's signature check fails either way.
    #[derive(Debug)]
    struct WeakRsaServer(Arc<CertifiedKey>);

    impl ResolvesServerCert for WeakRsaServer {
        fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
            Some(Arc::clone(&self.0))
        }
    }

    /// Accept one TLS connection on a loopback port and return that port.
    async fn spawn_weak_rsa_server() -> u16 {
        ensure_crypto_provider();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(P256_SIGNING_KEY));
        let signing_key = rustls::crypto::ring::sign::any_supported_type(&key).unwrap();
        let certified = CertifiedKey::new(
            vec![CertificateDer::from(RSA_1024_LOCALHOST.to_vec())],
            signing_key,
        );
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_cert_resolver(Arc::new(WeakRsaServer(Arc::new(certified))));
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let _ = acceptor.accept(stream).await;
            }
        });
        port
    }

    #[test]
    fn test_parse_rsa_certificate() {
        let cert = parse_certificate(RSA_SELF_SIGNED).unwrap();
        assert_eq!(cert.subject, "O=NetTrace Test, CN=example.com");
        assert!(cert.is_self_signed());
        assert!(!cert.is_ca);
        assert_eq!(cert.signature_algorithm, "sha256WithRSAEncryption");
        assert_eq!(cert.public_key.rsa_bits(), Some(2048));
        assert_eq!(
            cert.sans,
            vec!["example.com", "*.example.com", "192.0.2.10"]
        );
        assert!(cert.not_after > cert.not_before);
        assert!(!cert.serial_number.is_empty());
    }

    #[test]
    fn test_parse_ec_certificate() {
        let cert = parse_certificate(EC_CA).unwrap();
        assert_eq!(cert.subject, "CN=ec.example.com");
        assert!(cert.is_ca);
        assert_eq!(cert.signature_algorithm, "ecdsa-with-SHA256");
        assert_eq!(cert.public_key.ecdsa_bits(), Some(256));
    }

    #[test]
    fn test_parse_garbage_fails() {
        let err = parse_certificate(b"not a certificate").unwrap_err();
        assert_eq!(err.code(), ErrorCode::SslCheckFailed);
    }

    #[test]
    fn test_self_signed_fixture_analysis() {
        let leaf = parse_certificate(RSA_SELF_SIGNED).unwrap();
        let mut result = SslResult {
            host: "www.example.com".to_string(),
            port: 443,
            certificate: Some(leaf.clone()),
            chain: vec![leaf.clone()],
            valid: false,
            errors: vec!["certificate issuer is not trusted".to_string()],
            expires: Some(leaf.not_after),
            days_until_expiry: 0,
            issuer: leaf.issuer.clone(),
            subject: leaf.subject.clone(),
            sans: leaf.sans.clone(),
            protocol_version: None,
            cipher_suite: None,
        };
        analysis::analyze(&mut result, leaf.not_before + chrono::Duration::days(1));
        assert!(!result.valid);
        assert_eq!(result.errors[0], "certificate issuer is not trusted");
        assert!(result.errors.iter().any(|e| e.contains("self-signed")));
        assert!(result.errors.iter().any(|e| e.contains("incomplete")));
        assert_eq!(analysis::security_level(&result), SecurityLevel::Insecure);
    }

    #[test]
    fn test_integer_bits() {
        assert_eq!(integer_bits(&[0x00, 0x80, 0x00]), Some(16));
        assert_eq!(integer_bits(&[0x01, 0xff]), Some(9));
        assert_eq!(integer_bits(&[0x00, 0x00]), None);
        assert_eq!(integer_bits(&[]), None);
    }

    #[test]
    fn test_ec_point_bits() {
        let mut p256 = vec![0x04];
        p256.extend([0u8; 64]);
        assert_eq!(ec_point_bits(&p256), Some(256));
        let mut compressed = vec![0x02];
        compressed.extend([0u8; 48]);
        assert_eq!(ec_point_bits(&compressed), Some(384));
        assert_eq!(ec_point_bits(&[0x05, 1, 2]), None);
        assert_eq!(ec_point_bits(&[]), None);
    }

    #[test]
    fn test_signature_name_falls_back_to_oid() {
        assert_eq!(signature_name("1.2.840.113549.1.1.5"), "sha1WithRSAEncryption");
        assert_eq!(signature_name("1.2.3.4"), "1.2.3.4");
    }

    #[test]
    fn test_ip_from_bytes() {
        assert_eq!(
            ip_from_bytes(&[192, 0, 2, 1]),
            Some("192.0.2.1".parse().unwrap())
        );
        assert!(ip_from_bytes(&[0u8; 16]).is_some());
        assert_eq!(ip_from_bytes(&[1, 2, 3]), None);
    }

    #[test]
    fn test_verification_error_text() {
        let unknown = rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer);
        assert_eq!(
            describe_verification_error(&unknown),
            "certificate issuer is not trusted"
        );
        assert!(!is_validity_error(&unknown));
        assert!(is_validity_error(&rustls::Error::InvalidCertificate(
            CertificateError::Expired
        )));
        assert!(is_validity_error(&rustls::Error::InvalidCertificate(
            CertificateError::NotValidYet
        )));
    }

    #[tokio::test]
    async fn test_invalid_host_rejected_without_connecting() {
        let policy = RetryPolicy::no_retry(std::time::Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let err = ssl_check(&policy, &cancel, "bad..host", 443).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SslValidationFailed);

        let err = ssl_check(&policy, &cancel, "example.com", 0).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SslValidationFailed);
    }

    #[tokio::test]
    async fn test_cancelled_before_connect() {
        let policy = RetryPolicy::no_retry(std::time::Duration::from_secs(5));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ssl_check(&policy, &cancel, "example.com", 443).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_weak_rsa_server_is_reported_not_rejected() {
        let port = spawn_weak_rsa_server().await;
        let policy = RetryPolicy::no_retry(std::time::Duration::from_secs(5));
        let cancel = CancellationToken::new();

        let result = ssl_check(&policy, &cancel, "127.0.0.1", port)
            .await
            .unwrap_or_else(|e| panic!("weak certificate should be analysed, got {e}"));

        let cert = result.certificate.as_ref().expect("leaf certificate is always present");
        assert_eq!(cert.public_key.rsa_bits(), Some(1024));
        assert_eq!(result.chain.len(), 1);
        assert!(result.protocol_version.is_some());
        assert!(!result.valid);
        assert!(
            result.errors.contains(&"weak RSA key: 1024 bits".to_string()),
            "{:?}",
            result.errors
        );
        assert!(
            result
                .errors
                .iter()
                .any(|e| e.starts_with("handshake signature rejected")),
            "{:?}",
            result.errors
        );
        assert!(
            result
                .errors
                .contains(&"certificate issuer is not trusted".to_string())
        );
        assert!(!result.errors.iter().any(|e| e.contains("does not match host")));
        assert_eq!(analysis::security_level(&result), SecurityLevel::Insecure);
    }

    #[test]
    fn test_context_validity_errors_are_skipped() {
        let expired = rustls::Error::InvalidCertificate(CertificateError::ExpiredContext {
            time: UnixTime::since_unix_epoch(std::time::Duration::from_secs(2_000_000_000)),
            not_after: UnixTime::since_unix_epoch(std::time::Duration::from_secs(1_900_000_000)),
        });
        assert!(is_validity_error(&expired));
        let name = rustls::Error::InvalidCertificate(CertificateError::NotValidForName);
        assert!(!is_validity_error(&name));
        assert!(!is_validity_error(&rustls::Error::General("expired".to_string())));
    }

    // NOTE: These tests depend on external networks; failures may be due to firewall/proxy issues

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_ssl_check_https_site_real() {
        let policy = RetryPolicy::no_retry(std::time::Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let result = ssl_check(&policy, &cancel, "google.com", 443)
            .await
            .unwrap_or_else(|e| panic!("SSL check failed: {e}"));
        let cert = result.certificate.expect("leaf certificate is always present");
        assert!(result.days_until_expiry > 0);
        assert!(!cert.sans.is_empty(), "SAN should not be empty");
        assert!(result.chain.len() > 1);
        assert!(result.protocol_version.is_some());
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_ssl_check_unresolvable_host_real() {
        let policy = RetryPolicy::no_retry(std::time::Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let err = ssl_check(&policy, &cancel, "this-domain-does-not-exist-12345.com", 443)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SslCheckFailed);
    }
}
