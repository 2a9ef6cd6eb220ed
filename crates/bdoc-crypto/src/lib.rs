#![forbid(unsafe_code)]

//! Cryptographic primitives for bdoc: digest algorithms keyed by their
//! XML-DSig URIs and RSA PKCS#1 v1.5 signature verification.

pub mod digest;
pub mod sign;
