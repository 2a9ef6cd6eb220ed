#![forbid(unsafe_code)]

//! X.509 support for bdoc: a semantic wrapper over parsed certificates and
//! a trust store with chain verification.

pub mod cert;
pub mod store;

pub use cert::X509Cert;
pub use store::CertStore;
