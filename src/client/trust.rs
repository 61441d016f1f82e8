//! Leap-of-faith certificate checks.
//!
//! # Responsibilities
//! - Match the target hostname against the certificate's names
//! - Check the validity window against the current time
//! - Expose a SHA-512 fingerprint for callers that pin certificates
//!
//! # Design Decisions
//! - No chain-of-trust: self-signed certificates are the norm
//! - subjectAltName wins; the Common Name is only consulted without one
//! - Nothing is remembered between connections

use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use sha2::{Digest, Sha512};
use thiserror::Error;
use x509_parser::prelude::*;

/// Why a peer certificate was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustError {
    #[error("hostname verification failed")]
    HostnameMismatch,

    #[error("certificate is either expired or not yet valid")]
    NotValidNow,

    #[error("unparsable certificate: {0}")]
    Unparsable(String),
}

/// Result of judging one certificate against one hostname.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustDecision {
    pub hostname_matches: bool,
    pub within_validity_window: bool,
}

impl TrustDecision {
    /// Hostname first, then validity, matching the order of the checks.
    pub fn into_result(self) -> Result<(), TrustError> {
        if !self.hostname_matches {
            return Err(TrustError::HostnameMismatch);
        }
        if !self.within_validity_window {
            return Err(TrustError::NotValidNow);
        }
        Ok(())
    }
}

/// Judges peer certificates by hostname and validity window alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustValidator;

impl TrustValidator {
    pub fn new() -> Self {
        Self
    }

    /// Verify `der` for `hostname` at the current time.
    pub fn verify(&self, der: &[u8], hostname: &str) -> Result<(), TrustError> {
        self.verify_at(der, hostname, SystemTime::now())
    }

    pub fn verify_at(&self, der: &[u8], hostname: &str, now: SystemTime) -> Result<(), TrustError> {
        self.evaluate(der, hostname, now)?.into_result()
    }

    /// Compute both checks without failing fast.
    pub fn evaluate(
        &self,
        der: &[u8],
        hostname: &str,
        now: SystemTime,
    ) -> Result<TrustDecision, TrustError> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| TrustError::Unparsable(e.to_string()))?;

        Ok(TrustDecision {
            hostname_matches: matches_hostname(&cert, hostname)?,
            within_validity_window: within_validity(&cert, now),
        })
    }
}

fn within_validity(cert: &X509Certificate<'_>, now: SystemTime) -> bool {
    let now = match now.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as i64,
        Err(before) => -(before.duration().as_secs() as i64),
    };
    let validity = cert.validity();
    validity.not_before.timestamp() <= now && now <= validity.not_after.timestamp()
}

fn matches_hostname(cert: &X509Certificate<'_>, hostname: &str) -> Result<bool, TrustError> {
    let hostname = hostname
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.');
    let ip: Option<IpAddr> = hostname.parse().ok();

    let san = cert
        .subject_alternative_name()
        .map_err(|e| TrustError::Unparsable(e.to_string()))?;

    if let Some(san) = san {
        return Ok(san.value.general_names.iter().any(|name| match (name, ip) {
            (GeneralName::DNSName(dns), None) => dns_matches(dns, hostname),
            (GeneralName::IPAddress(bytes), Some(ip)) => ip_matches(bytes, ip),
            _ => false,
        }));
    }

    if ip.is_some() {
        return Ok(false);
    }
    Ok(cert
        .subject()
        .iter_common_name()
        .filter_map(|cn| cn.as_str().ok())
        .any(|cn| dns_matches(cn, hostname)))
}

/// Case-insensitive match with a single left-most `*` label.
fn dns_matches(pattern: &str, hostname: &str) -> bool {
    let pattern = pattern.trim_end_matches('.');
    if pattern.eq_ignore_ascii_case(hostname) {
        return true;
    }

    let Some(suffix) = pattern.strip_prefix("*.") else {
        return false;
    };
    match hostname.split_once('.') {
        Some((label, rest)) => !label.is_empty() && rest.eq_ignore_ascii_case(suffix),
        None => false,
    }
}

fn ip_matches(bytes: &[u8], ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => bytes == v4.octets(),
        IpAddr::V6(v6) => bytes == v6.octets(),
    }
}

/// SHA-512 digest of a certificate's DER encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 64]);

impl Fingerprint {
    pub fn of(der: &[u8]) -> Self {
        let mut out = [0u8; 64];
        out.copy_from_slice(&Sha512::digest(der));
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_base64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn self_signed(names: &[&str]) -> Vec<u8> {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        rcgen::generate_simple_self_signed(names)
            .unwrap()
            .serialize_der()
            .unwrap()
    }

    fn with_validity(name: &str, from: (i32, u8, u8), to: (i32, u8, u8)) -> Vec<u8> {
        let mut params = rcgen::CertificateParams::new(vec![name.to_string()]);
        params.not_before = rcgen::date_time_ymd(from.0, from.1, from.2);
        params.not_after = rcgen::date_time_ymd(to.0, to.1, to.2);
        rcgen::Certificate::from_params(params)
            .unwrap()
            .serialize_der()
            .unwrap()
    }

    #[test]
    fn accepts_matching_hostname() {
        let der = self_signed(&["localhost"]);
        assert_eq!(TrustValidator::new().verify(&der, "localhost"), Ok(()));
        assert_eq!(TrustValidator::new().verify(&der, "LOCALHOST."), Ok(()));
    }

    #[test]
    fn rejects_other_hostname() {
        let der = self_signed(&["example.org"]);
        assert_eq!(
            TrustValidator::new().verify(&der, "localhost"),
            Err(TrustError::HostnameMismatch)
        );
    }

    #[test]
    fn wildcard_covers_one_label() {
        let der = self_signed(&["*.example.org"]);
        let validator = TrustValidator::new();
        assert_eq!(validator.verify(&der, "gemini.example.org"), Ok(()));
        assert_eq!(
            validator.verify(&der, "a.b.example.org"),
            Err(TrustError::HostnameMismatch)
        );
        assert_eq!(
            validator.verify(&der, "example.org"),
            Err(TrustError::HostnameMismatch)
        );
    }

    #[test]
    fn ip_addresses_match_ip_names() {
        let mut params = rcgen::CertificateParams::default();
        params.subject_alt_names = vec![rcgen::SanType::IpAddress("127.0.0.1".parse().unwrap())];
        let der = rcgen::Certificate::from_params(params)
            .unwrap()
            .serialize_der()
            .unwrap();
        assert_eq!(TrustValidator::new().verify(&der, "127.0.0.1"), Ok(()));
        assert_eq!(
            TrustValidator::new().verify(&der, "127.0.0.2"),
            Err(TrustError::HostnameMismatch)
        );
    }

    #[test]
    fn expired_certificate_rejected_even_if_hostname_matches() {
        let der = with_validity("localhost", (2000, 1, 1), (2001, 1, 1));
        let decision = TrustValidator::new()
            .evaluate(&der, "localhost", SystemTime::now())
            .unwrap();
        assert!(decision.hostname_matches);
        assert!(!decision.within_validity_window);
        assert_eq!(
            TrustValidator::new().verify(&der, "localhost"),
            Err(TrustError::NotValidNow)
        );
    }

    #[test]
    fn not_yet_valid_rejected() {
        let der = with_validity("localhost", (2090, 1, 1), (2095, 1, 1));
        assert_eq!(
            TrustValidator::new().verify(&der, "localhost"),
            Err(TrustError::NotValidNow)
        );
    }

    #[test]
    fn validity_window_is_inclusive_of_now() {
        let der = with_validity("localhost", (2020, 1, 1), (2030, 1, 1));
        let inside = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let after = UNIX_EPOCH + Duration::from_secs(2_000_000_000);
        let validator = TrustValidator::new();
        assert_eq!(validator.verify_at(&der, "localhost", inside), Ok(()));
        assert_eq!(
            validator.verify_at(&der, "localhost", after),
            Err(TrustError::NotValidNow)
        );
    }

    #[test]
    fn hostname_checked_before_validity() {
        let der = with_validity("example.org", (2000, 1, 1), (2001, 1, 1));
        assert_eq!(
            TrustValidator::new().verify(&der, "localhost"),
            Err(TrustError::HostnameMismatch)
        );
    }

    #[test]
    fn common_name_used_without_san() {
        let mut params = rcgen::CertificateParams::default();
        params.subject_alt_names.clear();
        params.distinguished_name = rcgen::DistinguishedName::new();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "capsule.example");
        let der = rcgen::Certificate::from_params(params)
            .unwrap()
            .serialize_der()
            .unwrap();

        let validator = TrustValidator::new();
        assert_eq!(validator.verify(&der, "capsule.example"), Ok(()));
        assert_eq!(
            validator.verify(&der, "other.example"),
            Err(TrustError::HostnameMismatch)
        );
    }

    #[test]
    fn garbage_is_unparsable() {
        assert!(matches!(
            TrustValidator::new().verify(b"not a certificate", "localhost"),
            Err(TrustError::Unparsable(_))
        ));
    }

    #[test]
    fn fingerprint_is_sha512() {
        let der = self_signed(&["localhost"]);
        let fp = Fingerprint::of(&der);
        assert_eq!(fp.as_bytes().len(), 64);
        assert_eq!(fp, Fingerprint::of(&der));
        assert_eq!(fp.to_base64().len(), 88);
        assert_ne!(fp, Fingerprint::of(&self_signed(&["localhost"])));
    }
}
