#![forbid(unsafe_code)]

//! XML Canonicalization (C14N) for bdoc signature digests.
//!
//! Implements the canonicalization variants XML-DSig verification needs:
//! - Canonical XML 1.0 (with and without comments)
//! - Canonical XML 1.1 (with and without comments)
//! - Exclusive Canonical XML 1.0 (with and without comments)
//!
//! Output is deterministic bytes; callers digest it in bounded chunks via
//! [`for_each_chunk`].

pub mod exclusive;
pub mod inclusive;
pub mod render;

use bdoc_core::{algorithm, Error, Result};
use bdoc_xml::NodeSet;
use render::Attr;
use std::collections::BTreeMap;

/// Canonicalizer output is handed to digests in chunks of at most this size.
pub const OUTPUT_CHUNK: usize = 4096;

/// The canonicalization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C14nMode {
    /// Canonical XML 1.0
    Inclusive,
    /// Canonical XML 1.0 with comments
    InclusiveWithComments,
    /// Canonical XML 1.1
    Inclusive11,
    /// Canonical XML 1.1 with comments
    Inclusive11WithComments,
    /// Exclusive Canonical XML 1.0
    Exclusive,
    /// Exclusive Canonical XML 1.0 with comments
    ExclusiveWithComments,
}

impl C14nMode {
    /// The algorithm URI for this mode.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Inclusive => algorithm::C14N,
            Self::InclusiveWithComments => algorithm::C14N_WITH_COMMENTS,
            Self::Inclusive11 => algorithm::C14N11,
            Self::Inclusive11WithComments => algorithm::C14N11_WITH_COMMENTS,
            Self::Exclusive => algorithm::EXC_C14N,
            Self::ExclusiveWithComments => algorithm::EXC_C14N_WITH_COMMENTS,
        }
    }

    /// Parse a C14N mode from an algorithm URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            algorithm::C14N => Some(Self::Inclusive),
            algorithm::C14N_WITH_COMMENTS => Some(Self::InclusiveWithComments),
            algorithm::C14N11 => Some(Self::Inclusive11),
            algorithm::C14N11_WITH_COMMENTS => Some(Self::Inclusive11WithComments),
            algorithm::EXC_C14N => Some(Self::Exclusive),
            algorithm::EXC_C14N_WITH_COMMENTS => Some(Self::ExclusiveWithComments),
            _ => None,
        }
    }

    pub fn with_comments(&self) -> bool {
        matches!(
            self,
            Self::InclusiveWithComments
                | Self::Inclusive11WithComments
                | Self::ExclusiveWithComments
        )
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive | Self::ExclusiveWithComments)
    }
}

/// Canonicalize raw XML text.
///
/// - `mode`: which C14N variant to use
/// - `node_set`: optional node set for document-subset canonicalization
/// - `inclusive_prefixes`: for exclusive C14N, the InclusiveNamespaces
///   PrefixList
pub fn canonicalize(
    xml: &str,
    mode: C14nMode,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>> {
    let doc = roxmltree::Document::parse_with_options(xml, bdoc_xml::parsing_options())
        .map_err(|e| Error::XmlParse(e.to_string()))?;
    canonicalize_doc(&doc, mode, node_set, inclusive_prefixes)
}

/// Canonicalize a pre-parsed document.
pub fn canonicalize_doc(
    doc: &roxmltree::Document<'_>,
    mode: C14nMode,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>> {
    match mode {
        C14nMode::Inclusive | C14nMode::InclusiveWithComments => {
            inclusive::canonicalize(doc, mode.with_comments(), node_set)
        }
        C14nMode::Inclusive11 | C14nMode::Inclusive11WithComments => {
            inclusive::canonicalize_with_options(doc, mode.with_comments(), node_set, true)
        }
        C14nMode::Exclusive | C14nMode::ExclusiveWithComments => {
            exclusive::canonicalize(doc, mode.with_comments(), node_set, inclusive_prefixes)
        }
    }
}

/// Feed canonical output to `f` in chunks of at most [`OUTPUT_CHUNK`] bytes.
pub fn for_each_chunk(bytes: &[u8], mut f: impl FnMut(&[u8])) {
    for chunk in bytes.chunks(OUTPUT_CHUNK) {
        f(chunk);
    }
}

// ── Shared DOM helpers ───────────────────────────────────────────────

/// The qualified name of an element exactly as written in the source.
///
/// The original prefix matters for the canonical form, so it is read back
/// out of the element's start tag in the input text.
pub(crate) fn qualified_element_name(node: &roxmltree::Node<'_, '_>) -> String {
    let text = node.document().input_text();
    if let Some(tag) = text.get(node.range()) {
        if let Some(rest) = tag.strip_prefix('<') {
            let name: String = rest
                .chars()
                .take_while(|c| !c.is_whitespace() && *c != '>' && *c != '/')
                .collect();
            if !name.is_empty() {
                return name;
            }
        }
    }
    // Unreachable for documents parsed from this text; resolve via the
    // namespace scope as a last resort.
    match node.tag_name().namespace() {
        Some(uri) => match node.lookup_prefix(uri) {
            Some(prefix) if !prefix.is_empty() => {
                format!("{prefix}:{}", node.tag_name().name())
            }
            _ => node.tag_name().name().to_owned(),
        },
        None => node.tag_name().name().to_owned(),
    }
}

/// Build the render entry for one attribute.
pub(crate) fn attr_entry(
    node: &roxmltree::Node<'_, '_>,
    attr: &roxmltree::Attribute<'_, '_>,
) -> Attr {
    match attr.namespace() {
        None => Attr {
            ns_uri: String::new(),
            local_name: attr.name().to_owned(),
            qualified_name: attr.name().to_owned(),
            value: attr.value().to_owned(),
        },
        Some(uri) if uri == bdoc_core::ns::XML => Attr {
            ns_uri: uri.to_owned(),
            local_name: attr.name().to_owned(),
            qualified_name: format!("xml:{}", attr.name()),
            value: attr.value().to_owned(),
        },
        Some(uri) => {
            let prefix = node.lookup_prefix(uri).unwrap_or("");
            let qualified_name = if prefix.is_empty() {
                attr.name().to_owned()
            } else {
                format!("{prefix}:{}", attr.name())
            };
            Attr {
                ns_uri: uri.to_owned(),
                local_name: attr.name().to_owned(),
                qualified_name,
                value: attr.value().to_owned(),
            }
        }
    }
}

/// All namespaces in scope for an element, keyed by prefix.
///
/// roxmltree resolves namespace inheritance at parse time, so the node's
/// own namespace list is already the complete in-scope set.
pub(crate) fn collect_inscope_namespaces(
    node: &roxmltree::Node<'_, '_>,
) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    for ns in node.namespaces() {
        if ns.uri().is_empty() {
            continue;
        }
        result.insert(ns.name().unwrap_or("").to_owned(), ns.uri().to_owned());
    }
    result
}

pub(crate) fn has_preceding_element(node: roxmltree::Node<'_, '_>) -> bool {
    let mut sib = node.prev_sibling();
    while let Some(s) = sib {
        if s.is_element() {
            return true;
        }
        sib = s.prev_sibling();
    }
    false
}

pub(crate) fn has_following_element(node: roxmltree::Node<'_, '_>) -> bool {
    let mut sib = node.next_sibling();
    while let Some(s) = sib {
        if s.is_element() {
            return true;
        }
        sib = s.next_sibling();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_uri_round_trip() {
        for mode in [
            C14nMode::Inclusive,
            C14nMode::InclusiveWithComments,
            C14nMode::Inclusive11,
            C14nMode::Inclusive11WithComments,
            C14nMode::Exclusive,
            C14nMode::ExclusiveWithComments,
        ] {
            assert_eq!(C14nMode::from_uri(mode.uri()), Some(mode));
        }
        assert_eq!(C14nMode::from_uri("urn:nonsense"), None);
    }

    #[test]
    fn chunking_covers_everything() {
        let data = vec![7u8; OUTPUT_CHUNK * 2 + 17];
        let mut total = 0;
        let mut chunks = 0;
        for_each_chunk(&data, |c| {
            assert!(c.len() <= OUTPUT_CHUNK);
            total += c.len();
            chunks += 1;
        });
        assert_eq!(total, data.len());
        assert_eq!(chunks, 3);
    }

    #[test]
    fn reparse_produces_identical_canonical_form() {
        // Whitespace between markup is content in C14N; re-parsing the
        // same text must yield byte-identical output.
        let xml = "<a xmlns:p=\"urn:p\">\n  <p:b attr=\"v\"> text </p:b>\n</a>";
        let one = canonicalize(xml, C14nMode::Inclusive, None, &[]).unwrap();
        let two = canonicalize(xml, C14nMode::Inclusive, None, &[]).unwrap();
        assert_eq!(one, two);
        assert_eq!(
            String::from_utf8(one).unwrap(),
            "<a xmlns:p=\"urn:p\">\n  <p:b attr=\"v\"> text </p:b>\n</a>"
        );
    }
}
