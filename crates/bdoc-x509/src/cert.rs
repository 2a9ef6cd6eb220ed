#![forbid(unsafe_code)]

//! A thin semantic layer over parsed X.509 certificates.

use bdoc_core::{algorithm, Error, Result};
use der::{Decode, Encode};
use x509_cert::Certificate;

// sha1WithRSAEncryption, sha224WithRSAEncryption, sha256WithRSAEncryption
const SHA1_RSA: &str = "1.2.840.113549.1.1.5";
const SHA224_RSA: &str = "1.2.840.113549.1.1.14";
const SHA256_RSA: &str = "1.2.840.113549.1.1.11";

/// A certificate: the original DER bytes plus the parsed structure.
#[derive(Clone)]
pub struct X509Cert {
    der: Vec<u8>,
    cert: Certificate,
}

impl X509Cert {
    /// Parse a certificate from DER bytes, keeping the bytes verbatim.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let cert = Certificate::from_der(der)
            .map_err(|e| Error::DerParse(format!("certificate: {e}")))?;
        Ok(Self {
            der: der.to_vec(),
            cert,
        })
    }

    /// The DER encoding this certificate was parsed from.
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    pub fn encode_der(&self) -> Vec<u8> {
        self.der.clone()
    }

    pub fn certificate(&self) -> &Certificate {
        &self.cert
    }

    /// Subject DN rendered as `ATTR=value` pairs joined with `,`.
    pub fn subject_name(&self) -> String {
        format_name(&self.cert.tbs_certificate.subject)
    }

    /// Issuer DN rendered as `ATTR=value` pairs joined with `,`.
    pub fn issuer_name(&self) -> String {
        format_name(&self.cert.tbs_certificate.issuer)
    }

    /// DER encoding of the subject Name.
    pub fn subject_der(&self) -> Vec<u8> {
        self.cert
            .tbs_certificate
            .subject
            .to_der()
            .unwrap_or_default()
    }

    /// DER encoding of the issuer Name.
    pub fn issuer_der(&self) -> Vec<u8> {
        self.cert
            .tbs_certificate
            .issuer
            .to_der()
            .unwrap_or_default()
    }

    /// Serial number as a decimal string, as it appears in
    /// `X509SerialNumber` elements.
    pub fn serial_decimal(&self) -> String {
        decimal_from_be_bytes(self.cert.tbs_certificate.serial_number.as_bytes())
    }

    /// First `commonName` attribute of the issuer DN.
    ///
    /// Falls back to scanning the formatted DN for `CN=` up to the next
    /// `,`, which is what configuration keys were historically authored
    /// against.
    pub fn issuer_common_name(&self) -> Result<String> {
        if let Some(cn) = first_common_name(&self.cert.tbs_certificate.issuer) {
            return Ok(cn);
        }
        let issuer = self.issuer_name();
        let pos = issuer
            .find("CN=")
            .ok_or_else(|| Error::Certificate(format!("issuer has no CN: {issuer}")))?
            + 3;
        let rest = &issuer[pos..];
        let end = rest.find(',').unwrap_or(rest.len());
        Ok(rest[..end].to_owned())
    }

    /// Compare the issuer DN against a DN string from a signature,
    /// tolerating whitespace after the component separators.
    pub fn issuer_matches(&self, dn: &str) -> bool {
        names_equal(&self.issuer_name(), dn)
    }

    /// The RSA public key from the SubjectPublicKeyInfo.
    pub fn rsa_public_key(&self) -> Result<rsa::RsaPublicKey> {
        use spki::DecodePublicKey;
        let spki_der = self
            .cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::DerParse(format!("SPKI: {e}")))?;
        rsa::RsaPublicKey::from_public_key_der(&spki_der)
            .map_err(|e| Error::Certificate(format!("not an RSA public key: {e}")))
    }

    /// The raw subjectPublicKey bits (without the SPKI wrapper).
    pub fn public_key_bits(&self) -> &[u8] {
        self.cert
            .tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .raw_bytes()
    }

    /// Verify a detached RSA PKCS#1 v1.5 signature over an already-computed
    /// digest, under this certificate's public key.
    pub fn verify_signature(
        &self,
        digest_uri: &str,
        digest_value: &[u8],
        signature_value: &[u8],
    ) -> Result<bool> {
        use signature::hazmat::PrehashVerifier;
        let public_key = self.rsa_public_key()?;
        let sig = rsa::pkcs1v15::Signature::try_from(signature_value)
            .map_err(|e| Error::Crypto(format!("invalid RSA signature: {e}")))?;
        macro_rules! do_verify {
            ($hasher:ty) => {{
                let vk = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public_key);
                Ok(vk.verify_prehash(digest_value, &sig).is_ok())
            }};
        }
        match digest_uri {
            algorithm::SHA1 => do_verify!(sha1::Sha1),
            algorithm::SHA224 => do_verify!(sha2::Sha224),
            algorithm::SHA256 => do_verify!(sha2::Sha256),
            _ => Err(Error::UnsupportedAlgorithm(format!(
                "digest algorithm: {digest_uri}"
            ))),
        }
    }

    /// Verify this certificate's own signature under the issuer's key.
    pub fn verify_issued_by(&self, issuer: &X509Cert) -> Result<()> {
        let tbs_der = self
            .cert
            .tbs_certificate
            .to_der()
            .map_err(|e| Error::DerParse(format!("TBS: {e}")))?;
        let sig_bytes = self
            .cert
            .signature
            .as_bytes()
            .ok_or_else(|| Error::Certificate("certificate has no signature bits".into()))?;
        let oid = self.cert.signature_algorithm.oid.to_string();
        let issuer_key = issuer.rsa_public_key()?;
        let ok = verify_rsa_by_oid(&oid, &issuer_key, &tbs_der, sig_bytes)?;
        if ok {
            Ok(())
        } else {
            Err(Error::Certificate(
                "certificate signature verification failed".into(),
            ))
        }
    }

    /// Whether the certificate's validity window contains `at`.
    pub fn valid_at(&self, at: &der::DateTime) -> bool {
        let validity = &self.cert.tbs_certificate.validity;
        let not_before = validity.not_before.to_date_time();
        let not_after = validity.not_after.to_date_time();
        *at >= not_before && *at <= not_after
    }

    /// Whether subject and issuer DNs are identical.
    pub fn is_self_issued(&self) -> bool {
        self.subject_der() == self.issuer_der()
    }
}

impl std::fmt::Debug for X509Cert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "X509Cert(subject={}, serial={})",
            self.subject_name(),
            self.serial_decimal()
        )
    }
}

/// Verify an RSA PKCS#1 v1.5 signature, selecting the hash from the
/// signature-algorithm OID.
pub fn verify_rsa_by_oid(
    oid: &str,
    public_key: &rsa::RsaPublicKey,
    data: &[u8],
    sig_bytes: &[u8],
) -> Result<bool> {
    use signature::Verifier;
    let sig = rsa::pkcs1v15::Signature::try_from(sig_bytes)
        .map_err(|e| Error::Crypto(format!("invalid RSA signature: {e}")))?;
    macro_rules! do_verify {
        ($hasher:ty) => {{
            let vk = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public_key.clone());
            Ok(vk.verify(data, &sig).is_ok())
        }};
    }
    match oid {
        SHA1_RSA => do_verify!(sha1::Sha1),
        SHA224_RSA => do_verify!(sha2::Sha224),
        SHA256_RSA => do_verify!(sha2::Sha256),
        _ => Err(Error::UnsupportedAlgorithm(format!(
            "signature algorithm OID: {oid}"
        ))),
    }
}

// ── DN handling ──────────────────────────────────────────────────────

const OID_CN: &str = "2.5.4.3";

fn attr_short_name(oid: &str) -> Option<&'static str> {
    match oid {
        "2.5.4.3" => Some("CN"),
        "2.5.4.5" => Some("serialNumber"),
        "2.5.4.6" => Some("C"),
        "2.5.4.7" => Some("L"),
        "2.5.4.8" => Some("ST"),
        "2.5.4.10" => Some("O"),
        "2.5.4.11" => Some("OU"),
        "1.2.840.113549.1.9.1" => Some("emailAddress"),
        _ => None,
    }
}

fn attr_string_value(value: &der::Any) -> Option<String> {
    // PrintableString, UTF8String, IA5String and TeletexString all carry
    // their text directly in the content octets.
    std::str::from_utf8(value.value()).ok().map(str::to_owned)
}

/// Render a Name as `ATTR=value` pairs joined with `,`, in certificate
/// order.
fn format_name(name: &x509_cert::name::Name) -> String {
    let mut parts = Vec::new();
    for rdn in name.0.iter() {
        for atv in rdn.0.iter() {
            let oid = atv.oid.to_string();
            let attr = attr_short_name(&oid)
                .map(str::to_owned)
                .unwrap_or(oid);
            let value = attr_string_value(&atv.value).unwrap_or_default();
            parts.push(format!("{attr}={value}"));
        }
    }
    parts.join(",")
}

fn first_common_name(name: &x509_cert::name::Name) -> Option<String> {
    for rdn in name.0.iter() {
        for atv in rdn.0.iter() {
            if atv.oid.to_string() == OID_CN {
                return attr_string_value(&atv.value);
            }
        }
    }
    None
}

/// Compare two DN strings, tolerating whitespace after the component
/// separators ("CN=Foo, O=Bar" equals "CN=Foo,O=Bar"). Component order
/// is significant: this backs the binding between the signing
/// certificate and the issuer string asserted inside SignedProperties.
fn names_equal(a: &str, b: &str) -> bool {
    let left = name_components(a);
    let right = name_components(b);
    !left.is_empty() && left == right
}

fn name_components(dn: &str) -> Vec<&str> {
    dn.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

/// Big-endian bytes to decimal string.
fn decimal_from_be_bytes(bytes: &[u8]) -> String {
    let mut digits: Vec<u8> = vec![0];
    for &byte in bytes {
        let mut carry = byte as u32;
        for d in digits.iter_mut() {
            let v = (*d as u32) * 256 + carry;
            *d = (v % 10) as u8;
            carry = v / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }
    digits
        .iter()
        .rev()
        .map(|d| char::from(b'0' + d))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dn_comparison_tolerates_spacing_only() {
        assert!(names_equal("CN=Foo, O=Bar", "CN=Foo,O=Bar"));
        assert!(names_equal("CN=Foo,O=Bar", "CN=Foo, O=Bar"));
        assert!(!names_equal("CN=Foo,O=Bar", "CN=Foo,O=Baz"));
        assert!(!names_equal("CN=Foo", "CN=Foo,O=Bar"));
        // Reordered components are a different name, not a formatting
        // variation.
        assert!(!names_equal("C=EE,O=AS Sert,CN=Klient", "CN=Klient, O=AS Sert, C=EE"));
        assert!(!names_equal("", ""));
    }

    #[test]
    fn decimal_conversion() {
        assert_eq!(decimal_from_be_bytes(&[0x00]), "0");
        assert_eq!(decimal_from_be_bytes(&[0x2a]), "42");
        assert_eq!(decimal_from_be_bytes(&[0x01, 0x00]), "256");
        assert_eq!(decimal_from_be_bytes(&[0xff, 0xff]), "65535");
        assert_eq!(
            decimal_from_be_bytes(&[0x01, 0x00, 0x00, 0x00, 0x00]),
            "4294967296"
        );
    }

    #[test]
    fn unknown_oid_renders_dotted() {
        assert_eq!(attr_short_name("2.5.4.3"), Some("CN"));
        assert_eq!(attr_short_name("2.5.4.99"), None);
    }
}
