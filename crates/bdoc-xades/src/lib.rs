#![forbid(unsafe_code)]

//! XAdES-BES/TM signature validation for BDOC containers.
//!
//! The flow mirrors how the signatures are produced and checked in
//! deployment: parse the signature XML into an immutable model, run the
//! offline BES checks against the container's documents and a trust
//! store, then either verify an embedded Time-Mark offline or obtain a
//! fresh OCSP confirmation online and serialize the TM augmentation.

mod augment;
pub mod config;
pub mod container;
pub mod model;
mod parse;
pub mod schema;
pub mod signature;
pub mod validator;

pub use config::{Configuration, OcspConf, SchemaDir};
pub use container::ContainerInfo;
pub use model::Dialect;
pub use signature::Signature;
pub use validator::SignatureValidator;
