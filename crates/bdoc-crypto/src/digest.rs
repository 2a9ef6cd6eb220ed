#![forbid(unsafe_code)]

//! Digest (hash) algorithm implementations.
//!
//! BDOC signatures name their hash algorithms by URI. The registry here
//! covers the algorithms the validation pipeline accepts: SHA-1, SHA-224
//! and SHA-256.

use bdoc_core::{algorithm, Error, Result};
use digest::Digest;

/// Trait for digest algorithms with streaming input.
pub trait DigestAlgorithm: Send {
    /// Feed data into the hash.
    fn update(&mut self, data: &[u8]);
    /// Finalize and return the hash value.
    fn finalize(self: Box<Self>) -> Vec<u8>;
    /// Algorithm URI.
    fn uri(&self) -> &'static str;
    /// Digest size in octets.
    fn size(&self) -> usize;
}

/// Create a digest algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn DigestAlgorithm>> {
    match uri {
        algorithm::SHA1 => Ok(Box::new(Sha1Digest::new())),
        algorithm::SHA224 => Ok(Box::new(Sha224Digest::new())),
        algorithm::SHA256 => Ok(Box::new(Sha256Digest::new())),
        _ => Err(Error::UnsupportedAlgorithm(format!(
            "digest algorithm: {uri}"
        ))),
    }
}

/// Whether a digest URI is in the registry.
pub fn is_supported(uri: &str) -> bool {
    matches!(uri, algorithm::SHA1 | algorithm::SHA224 | algorithm::SHA256)
}

/// Compute a digest in one shot.
pub fn digest(uri: &str, data: &[u8]) -> Result<Vec<u8>> {
    let mut hasher = from_uri(uri)?;
    hasher.update(data);
    Ok(hasher.finalize())
}

/// Map a signature-method URI to the digest URI it is built on.
///
/// This is the reverse map used when recomputing the SignedInfo digest for
/// signature verification.
pub fn digest_uri_for_signature_method(uri: &str) -> Result<&'static str> {
    match uri {
        algorithm::RSA_SHA1 => Ok(algorithm::SHA1),
        algorithm::RSA_SHA224 => Ok(algorithm::SHA224),
        algorithm::RSA_SHA256 => Ok(algorithm::SHA256),
        _ => Err(Error::UnsupportedAlgorithm(format!(
            "signature method: {uri}"
        ))),
    }
}

// ── Concrete implementations ─────────────────────────────────────────

macro_rules! impl_digest {
    ($name:ident, $hasher:ty, $uri:expr, $size:expr) => {
        struct $name {
            inner: $hasher,
        }

        impl $name {
            fn new() -> Self {
                Self {
                    inner: <$hasher>::new(),
                }
            }
        }

        impl DigestAlgorithm for $name {
            fn update(&mut self, data: &[u8]) {
                Digest::update(&mut self.inner, data);
            }

            fn finalize(self: Box<Self>) -> Vec<u8> {
                Digest::finalize(self.inner).to_vec()
            }

            fn uri(&self) -> &'static str {
                $uri
            }

            fn size(&self) -> usize {
                $size
            }
        }
    };
}

impl_digest!(Sha1Digest, sha1::Sha1, algorithm::SHA1, 20);
impl_digest!(Sha224Digest, sha2::Sha224, algorithm::SHA224, 28);
impl_digest!(Sha256Digest, sha2::Sha256, algorithm::SHA256, 32);
