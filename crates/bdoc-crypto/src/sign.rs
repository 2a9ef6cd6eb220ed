#![forbid(unsafe_code)]

//! Signature-method verification.
//!
//! The BDOC profile permits exactly three signature methods: RSA PKCS#1
//! v1.5 with SHA-1, SHA-224 or SHA-256. Anything else is rejected before
//! any cryptography runs.

use bdoc_core::{algorithm, Error, Result};

/// The permitted signature methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureMethod {
    RsaSha1,
    RsaSha224,
    RsaSha256,
}

impl SignatureMethod {
    /// Parse a signature-method URI, rejecting everything outside the
    /// permitted set.
    pub fn from_uri(uri: &str) -> Result<Self> {
        match uri {
            algorithm::RSA_SHA1 => Ok(Self::RsaSha1),
            algorithm::RSA_SHA224 => Ok(Self::RsaSha224),
            algorithm::RSA_SHA256 => Ok(Self::RsaSha256),
            _ => Err(Error::UnsupportedAlgorithm(format!(
                "signature method: {uri}"
            ))),
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Self::RsaSha1 => algorithm::RSA_SHA1,
            Self::RsaSha224 => algorithm::RSA_SHA224,
            Self::RsaSha256 => algorithm::RSA_SHA256,
        }
    }

    /// The URI of the digest this method is built on.
    pub fn digest_uri(&self) -> &'static str {
        match self {
            Self::RsaSha1 => algorithm::SHA1,
            Self::RsaSha224 => algorithm::SHA224,
            Self::RsaSha256 => algorithm::SHA256,
        }
    }

    /// Verify `sig_bytes` over `data` under an RSA public key.
    pub fn verify(
        &self,
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
        match self {
            Self::RsaSha1 => do_verify!(sha1::Sha1),
            Self::RsaSha224 => do_verify!(sha2::Sha224),
            Self::RsaSha256 => do_verify!(sha2::Sha256),
        }
    }
}
