#![forbid(unsafe_code)]

//! Owned XML document that preserves the original bytes.
//!
//! Canonical XML needs every whitespace character of the input exactly as
//! written; a digest computed over a normalized tree will not match one
//! computed by the signer. The document therefore owns the raw text and
//! hands out temporary `roxmltree` trees re-parsed from it whenever a
//! subtree digest is needed.

use bdoc_core::{Error, Result};
use roxmltree::Document;

/// An owned XML document.
#[derive(Debug)]
pub struct XmlDocument {
    text: String,
}

impl XmlDocument {
    /// Parse and validate XML from a string, taking ownership of the text.
    pub fn parse(text: String) -> Result<Self> {
        let _doc = roxmltree::Document::parse_with_options(&text, crate::parsing_options())
            .map_err(|e| Error::XmlParse(e.to_string()))?;
        Ok(Self { text })
    }

    /// Parse and validate XML from bytes.
    pub fn parse_bytes(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))?
            .to_owned();
        Self::parse(text)
    }

    /// The raw XML text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Re-parse the stored text and return a temporary document.
    ///
    /// Call once at the top of a processing pipeline and pass the result
    /// down through the call chain.
    pub fn parse_doc(&self) -> Result<Document<'_>> {
        roxmltree::Document::parse_with_options(&self.text, crate::parsing_options())
            .map_err(|e| Error::XmlParse(e.to_string()))
    }

    /// Find the unique descendant element with the given namespace and
    /// local name.
    ///
    /// Digest targets are addressed by (namespace, local-name); the pair
    /// must select exactly one element or the digest is ill-defined.
    pub fn find_unique<'a>(
        doc: &'a Document<'a>,
        ns_uri: &str,
        local_name: &str,
    ) -> Result<roxmltree::Node<'a, 'a>> {
        let mut matches = doc.descendants().filter(|n| {
            n.is_element()
                && n.tag_name().name() == local_name
                && n.tag_name().namespace().unwrap_or("") == ns_uri
        });
        let first = matches.next().ok_or_else(|| {
            Error::MissingElement(format!("{local_name} in namespace {ns_uri}"))
        })?;
        if matches.next().is_some() {
            return Err(Error::InvalidStructure(format!(
                "more than one {local_name} element in namespace {ns_uri}"
            )));
        }
        Ok(first)
    }
}
