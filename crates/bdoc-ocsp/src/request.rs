#![forbid(unsafe_code)]

//! OCSP request construction (RFC 6960).
//!
//! ```asn1
//! OCSPRequest ::= SEQUENCE {
//!     tbsRequest          TBSRequest }
//! TBSRequest ::= SEQUENCE {
//!     requestList         SEQUENCE OF Request,
//!     requestExtensions   [2] EXPLICIT Extensions OPTIONAL }
//! Request ::= SEQUENCE {
//!     reqCert             CertID }
//! CertID ::= SEQUENCE {
//!     hashAlgorithm       AlgorithmIdentifier,
//!     issuerNameHash      OCTET STRING,
//!     issuerKeyHash       OCTET STRING,
//!     serialNumber        INTEGER }
//! ```
//!
//! The CertID hashes use SHA-1, as deployed responders expect.

use bdoc_core::{algorithm, Result};
use bdoc_crypto::digest;
use bdoc_x509::X509Cert;
use der::Encode;
use yasna::models::ObjectIdentifier;
use yasna::Tag;

const OID_SHA1: &[u64] = &[1, 3, 14, 3, 2, 26];
const OID_NONCE: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 48, 1, 2];

/// Build a DER-encoded OCSPRequest for one certificate with a nonce
/// extension carrying exactly the caller-supplied bytes.
pub fn build_request(signer: &X509Cert, issuer: &X509Cert, nonce: &[u8]) -> Result<Vec<u8>> {
    let issuer_name_hash = digest::digest(algorithm::SHA1, &signer.issuer_der())?;
    let issuer_key_hash = digest::digest(algorithm::SHA1, issuer.public_key_bits())?;
    let serial_der = signer
        .certificate()
        .tbs_certificate
        .serial_number
        .to_der()
        .map_err(|e| bdoc_core::Error::DerParse(format!("serial number: {e}")))?;

    // extnValue wraps the DER encoding of an OCTET STRING holding the nonce.
    let nonce_inner = yasna::construct_der(|w| w.write_bytes(nonce));

    let request = yasna::construct_der(|w| {
        w.write_sequence(|w| {
            // tbsRequest
            w.next().write_sequence(|w| {
                // requestList
                w.next().write_sequence(|w| {
                    // Request
                    w.next().write_sequence(|w| {
                        // reqCert CertID
                        w.next().write_sequence(|w| {
                            w.next().write_sequence(|w| {
                                w.next().write_oid(&ObjectIdentifier::from_slice(OID_SHA1));
                                w.next().write_null();
                            });
                            w.next().write_bytes(&issuer_name_hash);
                            w.next().write_bytes(&issuer_key_hash);
                            w.next().write_der(&serial_der);
                        });
                    });
                });
                // requestExtensions [2] EXPLICIT
                w.next().write_tagged(Tag::context(2), |w| {
                    w.write_sequence(|w| {
                        w.next().write_sequence(|w| {
                            w.next().write_oid(&ObjectIdentifier::from_slice(OID_NONCE));
                            w.next().write_bytes(&nonce_inner);
                        });
                    });
                });
            });
        });
    });
    Ok(request)
}
