#![forbid(unsafe_code)]

//! XML document abstraction for bdoc.
//!
//! Provides a thin, whitespace-preserving layer over `roxmltree` plus the
//! `NodeSet` operations needed for document-subset canonicalization.

pub mod document;
pub mod nodeset;

pub use document::XmlDocument;
pub use nodeset::NodeSet;

/// Parsing options used everywhere a signature document is (re-)parsed.
///
/// DTDs are tolerated because deployed BDOC containers occasionally carry
/// doctype declarations; entity expansion stays at roxmltree's defaults.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    }
}
