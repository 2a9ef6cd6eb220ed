#![forbid(unsafe_code)]

//! XAdES-BES/TM signature validation for BDOC (Estonian i-voting)
//! containers.
//!
//! The heavy lifting lives in the member crates; this facade stitches them
//! together under one name.

pub use bdoc_c14n as c14n;
pub use bdoc_core as core;
pub use bdoc_crypto as crypto;
pub use bdoc_ocsp as ocsp;
pub use bdoc_x509 as x509;
pub use bdoc_xades as xades;
pub use bdoc_xml as xml;

pub use bdoc_core::{Error, Result, ValidationFailure};
pub use bdoc_ocsp::CertStatus;
pub use bdoc_x509::{CertStore, X509Cert};
pub use bdoc_xades::{
    Configuration, ContainerInfo, Dialect, OcspConf, SchemaDir, Signature, SignatureValidator,
};
