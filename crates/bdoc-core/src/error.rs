#![forbid(unsafe_code)]

/// Errors produced while validating BDOC signatures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("DER parsing error: {0}")]
    DerParse(String),

    #[error("invalid signature structure: {0}")]
    InvalidStructure(String),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("digest mismatch: {0}")]
    DigestMismatch(String),

    #[error("signature value verification failed: {0}")]
    SignatureInvalid(String),

    #[error("certificate not trusted: {0}")]
    CertificateUntrusted(String),

    #[error("no OCSP responder configured: {0}")]
    NoOcspResponder(String),

    #[error("issuer certificate unknown: {0}")]
    IssuerUnknown(String),

    #[error("OCSP response signature invalid: {0}")]
    OcspBadSignature(String),

    #[error("OCSP responder not trusted: {0}")]
    OcspResponderUntrusted(String),

    #[error("OCSP response too old or skewed: {0}")]
    OcspStale(String),

    #[error("OCSP nonce does not match signature hash: {0}")]
    NonceMismatch(String),

    #[error("OCSPRef digest does not match OCSP response: {0}")]
    OcspRefMismatch(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Accumulated failures from offline validation.
///
/// Offline BES validation runs three independent check groups and reports
/// every failure at once instead of stopping at the first one.
#[derive(Debug, Default)]
pub struct ValidationFailure {
    causes: Vec<Error>,
}

impl ValidationFailure {
    pub fn new() -> Self {
        Self { causes: Vec::new() }
    }

    /// Record the outcome of one check group.
    pub fn add<T>(&mut self, result: Result<T>) {
        if let Err(err) = result {
            self.causes.push(err);
        }
    }

    pub fn has_causes(&self) -> bool {
        !self.causes.is_empty()
    }

    pub fn causes(&self) -> &[Error] {
        &self.causes
    }

    /// Return `Ok(())` if no check failed, otherwise `self` as the error.
    pub fn into_result(self) -> std::result::Result<(), ValidationFailure> {
        if self.has_causes() {
            Err(self)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "signature is invalid")?;
        for cause in &self.causes {
            write!(f, "; {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}
