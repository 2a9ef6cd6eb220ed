#![forbid(unsafe_code)]

//! Orchestration of OCSP-backed validation: online BES confirmation,
//! offline Time-Mark verification, and TM augmentation.

use crate::augment::{self, TmMaterial};
use crate::config::Configuration;
use crate::signature::Signature;
use bdoc_core::{Error, Result};
use bdoc_crypto::digest;
use bdoc_ocsp::{CertStatus, OcspClient, OcspTransport};
use bdoc_x509::X509Cert;

/// Drives OCSP lookup and Time-Mark handling for one signature.
///
/// Not safe for concurrent use: prepared state (certificates, the captured
/// OCSP response) is cached across calls.
pub struct SignatureValidator<'a> {
    signature: &'a Signature,
    conf: &'a Configuration,
    signing_cert: Option<X509Cert>,
    issuer_cert: Option<X509Cert>,
    responder_certs: Vec<X509Cert>,
    ocsp_response: Vec<u8>,
    produced_at: String,
    transport: Option<Box<dyn OcspTransport>>,
}

impl<'a> SignatureValidator<'a> {
    pub fn new(signature: &'a Signature, conf: &'a Configuration) -> Self {
        Self {
            signature,
            conf,
            signing_cert: None,
            issuer_cert: None,
            responder_certs: Vec::new(),
            ocsp_response: Vec::new(),
            produced_at: String::new(),
            transport: None,
        }
    }

    /// Substitute the OCSP transport (tests use a canned responder).
    pub fn with_transport(mut self, transport: Box<dyn OcspTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// producedAt of the last OCSP exchange, as an xsd:dateTime string.
    pub fn produced_at(&self) -> &str {
        &self.produced_at
    }

    /// The captured OCSP response bytes of the last exchange.
    pub fn ocsp_response(&self) -> &[u8] {
        &self.ocsp_response
    }

    /// Shared prelude: resolve the signing certificate, its issuer, and
    /// the responder configuration for the issuer's CN.
    fn prepare(&mut self) -> Result<OcspClient> {
        let signing_cert = self.signature.signing_certificate()?;

        let issuer_cn = signing_cert.issuer_common_name()?;
        let ocsp_conf = self.conf.get_ocsp_conf(&issuer_cn).ok_or_else(|| {
            Error::NoOcspResponder(format!("no OCSP responder for issuer '{issuer_cn}'"))
        })?;

        let issuer_cert = self
            .conf
            .cert_store()
            .find_issuer(&signing_cert)
            .cloned()
            .ok_or_else(|| {
                Error::IssuerUnknown(format!("no issuer certificate for '{issuer_cn}' in store"))
            })?;

        let mut responder_certs = Vec::new();
        for der in &ocsp_conf.responder_certs {
            responder_certs.push(X509Cert::from_der(der)?);
        }

        let client = match self.transport.take() {
            Some(transport) => OcspClient::with_transport(
                ocsp_conf.url.clone(),
                ocsp_conf.skew,
                ocsp_conf.max_age,
                responder_certs.clone(),
                transport,
            ),
            None => OcspClient::new(
                ocsp_conf.url.clone(),
                ocsp_conf.skew,
                ocsp_conf.max_age,
                responder_certs.clone(),
            ),
        };

        self.signing_cert = Some(signing_cert);
        self.issuer_cert = Some(issuer_cert);
        self.responder_certs = responder_certs;
        Ok(client)
    }

    /// Confirm the signing certificate online.
    ///
    /// The nonce is the digest of the SignatureValue under the configured
    /// default digest, binding the responder's answer to this signature.
    /// The status is returned as-is; rejecting REVOKED is the caller's
    /// policy decision.
    pub fn validate_bes_online(&mut self) -> Result<CertStatus> {
        let ocsp = self.prepare()?;
        let nonce = digest::digest(self.conf.digest_uri(), self.signature.signature_value())?;

        let signing = self.signing_cert.as_ref().ok_or_else(|| {
            Error::Crypto("validator not prepared".into())
        })?;
        let issuer = self.issuer_cert.as_ref().ok_or_else(|| {
            Error::Crypto("validator not prepared".into())
        })?;

        let result = ocsp.check_cert(signing, issuer, &nonce)?;
        self.ocsp_response = result.response;
        self.produced_at = result.produced_at;
        log::debug!(
            "online BES confirmation: {:?} at {}",
            result.status,
            self.produced_at
        );
        Ok(result.status)
    }

    /// Verify the Time-Mark of an existing TM signature offline.
    ///
    /// Assumes BES validity was already established by the caller. Checks,
    /// in order: the encapsulated OCSP response is signed by a trusted
    /// responder and fresh; the responder nonce equals the hash of the
    /// SignatureValue under the OCSPRef digest algorithm; the OCSPRef
    /// digest matches the encapsulated response bytes.
    pub fn validate_tm_offline(&mut self) -> Result<()> {
        let ocsp = self.prepare()?;

        let response = self.signature.ocsp_response_value()?;
        let parsed = ocsp.verify_response(&response, self.conf.cert_store())?;

        let responder_nonce = parsed
            .nonce
            .clone()
            .ok_or_else(|| Error::NonceMismatch("OCSP response carries no nonce".into()))?;

        let method = self.signature.ocsp_digest_algorithm()?;
        let nonce = digest::digest(&method, self.signature.signature_value())?;
        if nonce != responder_nonce {
            return Err(Error::NonceMismatch(
                "calculated signature hash does not match the OCSP responder nonce".into(),
            ));
        }

        let (ref_value, ref_method) = self.signature.revocation_ocsp_ref()?;
        let response_hash = digest::digest(&ref_method, &response)?;
        if response_hash != ref_value {
            return Err(Error::OcspRefMismatch(
                "OCSPRef value does not match the hash of the OCSP response".into(),
            ));
        }

        self.ocsp_response = response;
        self.produced_at = parsed.produced_at_xsd();
        Ok(())
    }

    /// Serialize the TM augmentation of a signature whose online BES
    /// confirmation already ran on this validator.
    ///
    /// Appends `UnsignedSignatureProperties` carrying the responder and
    /// issuer certificates, the encapsulated OCSP response, and the
    /// certificate/revocation references, then re-serializes the whole
    /// document canonically behind an XML declaration.
    pub fn get_tm_signature(&self) -> Result<String> {
        if self.ocsp_response.is_empty() {
            return Err(Error::MissingElement(
                "no OCSP response captured; run online BES validation first".into(),
            ));
        }
        let issuer_cert = self.issuer_cert.as_ref().ok_or_else(|| {
            Error::IssuerUnknown("validator holds no issuer certificate".into())
        })?;
        let responder_cert = self.responder_certs.first().ok_or_else(|| {
            Error::NoOcspResponder("validator holds no responder certificate".into())
        })?;

        // The certificate references cover the responder's own issuer.
        let responder_issuer = self
            .conf
            .cert_store()
            .find_issuer(responder_cert)
            .ok_or_else(|| {
                Error::IssuerUnknown(format!(
                    "no issuer certificate for OCSP responder {}",
                    responder_cert.subject_name()
                ))
            })?;
        let digest_uri = self.conf.digest_uri();
        let responder_issuer_digest =
            digest::digest(digest_uri, responder_issuer.as_der())?;
        let response_digest = digest::digest(digest_uri, &self.ocsp_response)?;

        let material = TmMaterial {
            certificate_values: vec![
                responder_cert.encode_der(),
                issuer_cert.encode_der(),
            ],
            ocsp_response: &self.ocsp_response,
            cert_ref_digest_method: digest_uri,
            cert_ref_digest: &responder_issuer_digest,
            cert_ref_issuer: responder_issuer.issuer_name(),
            cert_ref_serial: responder_issuer.serial_decimal(),
            responder_id: responder_cert.subject_name(),
            produced_at: &self.produced_at,
            ocsp_ref_digest_method: digest_uri,
            ocsp_ref_digest: &response_digest,
        };
        augment::build_tm_signature(self.signature, &material)
    }
}
