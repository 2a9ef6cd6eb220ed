#![forbid(unsafe_code)]

//! Certificate trust store.
//!
//! Holds trust anchors plus known intermediates, looks up issuers by
//! subject DN, and verifies that a certificate chains to an anchor. Chain
//! details never leave this module; callers get a yes/no answer.

use crate::cert::X509Cert;
use bdoc_core::{Error, Result};

const MAX_CHAIN_DEPTH: usize = 10;

#[derive(Default, Clone)]
pub struct CertStore {
    trusted: Vec<X509Cert>,
    intermediates: Vec<X509Cert>,
}

impl CertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trust anchor.
    pub fn add_trusted(&mut self, cert: X509Cert) {
        self.trusted.push(cert);
    }

    /// Add an intermediate certificate usable for chain building.
    pub fn add_intermediate(&mut self, cert: X509Cert) {
        self.intermediates.push(cert);
    }

    pub fn is_empty(&self) -> bool {
        self.trusted.is_empty() && self.intermediates.is_empty()
    }

    /// Find the certificate whose subject matches `cert`'s issuer.
    pub fn find_issuer(&self, cert: &X509Cert) -> Option<&X509Cert> {
        let issuer_der = cert.issuer_der();
        self.trusted
            .iter()
            .chain(self.intermediates.iter())
            .find(|candidate| candidate.subject_der() == issuer_der)
    }

    /// Verify that `cert` chains to a trust anchor and every certificate
    /// along the chain is valid right now.
    pub fn verify(&self, cert: &X509Cert) -> Result<()> {
        if self.trusted.is_empty() {
            return Err(Error::CertificateUntrusted(
                "trust store holds no anchors".into(),
            ));
        }
        let now = current_time()?;
        if !cert.valid_at(&now) {
            return Err(Error::CertificateUntrusted(format!(
                "certificate outside its validity window: {}",
                cert.subject_name()
            )));
        }

        // A certificate that is itself an anchor verifies against its own
        // key.
        if self
            .trusted
            .iter()
            .any(|anchor| anchor.as_der() == cert.as_der())
        {
            return cert.verify_issued_by(cert).map_err(|_| {
                Error::CertificateUntrusted(format!(
                    "anchor self-signature invalid: {}",
                    cert.subject_name()
                ))
            });
        }

        let mut current = cert.clone();
        let mut visited: Vec<Vec<u8>> = vec![cert.as_der().to_vec()];

        for _ in 0..MAX_CHAIN_DEPTH {
            // Prefer anchors over intermediates when both match.
            if let Some(anchor) = self.matching_issuer(&self.trusted, &current, &visited) {
                if current.verify_issued_by(anchor).is_ok() && anchor.valid_at(&now) {
                    return Ok(());
                }
            }

            match self.matching_issuer(&self.intermediates, &current, &visited) {
                Some(intermediate)
                    if current.verify_issued_by(intermediate).is_ok()
                        && intermediate.valid_at(&now) =>
                {
                    visited.push(intermediate.as_der().to_vec());
                    current = intermediate.clone();
                }
                _ => {
                    return Err(Error::CertificateUntrusted(format!(
                        "no chain to a trust anchor for {}",
                        cert.subject_name()
                    )))
                }
            }
        }

        Err(Error::CertificateUntrusted(format!(
            "certificate chain longer than {MAX_CHAIN_DEPTH} for {}",
            cert.subject_name()
        )))
    }

    fn matching_issuer<'a>(
        &self,
        pool: &'a [X509Cert],
        cert: &X509Cert,
        visited: &[Vec<u8>],
    ) -> Option<&'a X509Cert> {
        let issuer_der = cert.issuer_der();
        pool.iter().find(|candidate| {
            candidate.subject_der() == issuer_der
                && !visited.iter().any(|seen| seen == candidate.as_der())
        })
    }
}

impl std::fmt::Debug for CertStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CertStore({} trusted, {} intermediates)",
            self.trusted.len(),
            self.intermediates.len()
        )
    }
}

/// Current system time as a DER DateTime.
pub fn current_time() -> Result<der::DateTime> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| Error::Certificate(format!("system time error: {e}")))?;
    der::DateTime::from_unix_duration(now)
        .map_err(|e| Error::Certificate(format!("time conversion error: {e}")))
}
