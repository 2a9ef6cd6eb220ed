#![forbid(unsafe_code)]

//! Shared definitions for the bdoc signature validation workspace.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result, ValidationFailure};
