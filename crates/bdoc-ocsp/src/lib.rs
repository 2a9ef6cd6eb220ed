#![forbid(unsafe_code)]

//! OCSP client for BDOC Time-Mark validation.
//!
//! Builds nonce-carrying requests, talks to the responder over HTTP, and
//! verifies responses offline: responder signature, responder trust, and
//! freshness of `producedAt` against the configured clock skew and maximum
//! age.

pub mod request;
pub mod response;
pub mod transport;

pub use response::{CertStatus, ParsedResponse};
pub use transport::{HttpTransport, OcspTransport};

use bdoc_core::{Error, Result};
use bdoc_x509::{CertStore, X509Cert};

/// Outcome of an online certificate status check.
#[derive(Debug)]
pub struct CheckResult {
    pub status: CertStatus,
    /// The raw OCSPResponse bytes as received.
    pub response: Vec<u8>,
    /// producedAt as seconds since the Unix epoch.
    pub produced_at_unix: i64,
    /// producedAt as an xsd:dateTime string.
    pub produced_at: String,
}

/// An OCSP client bound to one responder endpoint.
pub struct OcspClient {
    url: String,
    skew: i64,
    max_age: i64,
    responder_certs: Vec<X509Cert>,
    transport: Box<dyn OcspTransport>,
}

impl OcspClient {
    /// Create a client using the blocking HTTP transport.
    pub fn new(url: String, skew: i64, max_age: i64, responder_certs: Vec<X509Cert>) -> Self {
        Self::with_transport(url, skew, max_age, responder_certs, Box::new(HttpTransport::new()))
    }

    /// Create a client with an explicit transport.
    pub fn with_transport(
        url: String,
        skew: i64,
        max_age: i64,
        responder_certs: Vec<X509Cert>,
        transport: Box<dyn OcspTransport>,
    ) -> Self {
        Self {
            url,
            skew,
            max_age,
            responder_certs,
            transport,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Ask the responder for the status of `signer`, binding the exchange
    /// with `nonce`.
    ///
    /// The response signature, nonce echo, and freshness are verified
    /// before the status is returned. A REVOKED status is returned, not
    /// rejected; that policy belongs to the caller.
    pub fn check_cert(
        &self,
        signer: &X509Cert,
        issuer: &X509Cert,
        nonce: &[u8],
    ) -> Result<CheckResult> {
        let request = request::build_request(signer, issuer, nonce)?;
        let body = self.transport.post(&self.url, &request)?;
        let parsed = self.verify_signature_and_freshness(&body)?;

        match &parsed.nonce {
            Some(echoed) if echoed.as_slice() == nonce => {}
            Some(_) => {
                return Err(Error::NonceMismatch(
                    "responder echoed a different nonce".into(),
                ))
            }
            None => {
                return Err(Error::NonceMismatch(
                    "responder did not echo the nonce".into(),
                ))
            }
        }

        log::debug!(
            "OCSP status {:?} produced at {}",
            parsed.status,
            parsed.produced_at_xsd()
        );
        Ok(CheckResult {
            status: parsed.status,
            response: body,
            produced_at_unix: parsed.produced_at_unix,
            produced_at: parsed.produced_at_xsd(),
        })
    }

    /// Verify a stored OCSP response: responder signature under one of the
    /// configured responder certificates, responder trust against `store`,
    /// and freshness.
    pub fn verify_response(&self, data: &[u8], store: &CertStore) -> Result<ParsedResponse> {
        let parsed = self.verify_signature_and_freshness(data)?;

        let signer = self.signing_responder(&parsed).ok_or_else(|| {
            Error::OcspBadSignature(
                "no configured responder certificate verifies the response signature".into(),
            )
        })?;
        store
            .verify(signer)
            .map_err(|e| Error::OcspResponderUntrusted(format!("{}: {e}", signer.subject_name())))?;

        Ok(parsed)
    }

    /// Extract the nonce from a stored OCSP response.
    pub fn nonce(&self, data: &[u8]) -> Result<Vec<u8>> {
        let parsed = response::parse_response(data)?;
        parsed
            .nonce
            .ok_or_else(|| Error::NonceMismatch("OCSP response carries no nonce".into()))
    }

    fn verify_signature_and_freshness(&self, data: &[u8]) -> Result<ParsedResponse> {
        let parsed = response::parse_response(data)?;

        if self.signing_responder(&parsed).is_none() {
            return Err(Error::OcspBadSignature(
                "no configured responder certificate verifies the response signature".into(),
            ));
        }

        let now = unix_now()?;
        let age = now - parsed.produced_at_unix;
        if age < -self.skew {
            return Err(Error::OcspStale(format!(
                "producedAt {} is {}s in the future (skew {}s)",
                parsed.produced_at_xsd(),
                -age,
                self.skew
            )));
        }
        if age > self.max_age + self.skew {
            return Err(Error::OcspStale(format!(
                "producedAt {} is {}s old (max age {}s, skew {}s)",
                parsed.produced_at_xsd(),
                age,
                self.max_age,
                self.skew
            )));
        }
        Ok(parsed)
    }

    /// The configured responder certificate that signed this response.
    fn signing_responder(&self, parsed: &ParsedResponse) -> Option<&X509Cert> {
        self.responder_certs.iter().find(|cert| {
            cert.rsa_public_key()
                .ok()
                .map(|key| {
                    bdoc_x509::cert::verify_rsa_by_oid(
                        &parsed.signature_alg_oid,
                        &key,
                        &parsed.tbs_der,
                        &parsed.signature,
                    )
                    .unwrap_or(false)
                })
                .unwrap_or(false)
        })
    }
}

fn unix_now() -> Result<i64> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| Error::Crypto(format!("system time error: {e}")))?;
    Ok(now.as_secs() as i64)
}
