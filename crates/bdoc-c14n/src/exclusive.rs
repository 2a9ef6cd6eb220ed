#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! URI: `http://www.w3.org/2001/10/xml-exc-c14n#` (and `#WithComments`).
//!
//! The difference from inclusive C14N: only "visibly utilized" namespace
//! declarations are output. A namespace is visibly utilized when:
//! 1. its prefix is used by the element's tag name, or
//! 2. its prefix is used by one of the element's attributes, or
//! 3. the prefix appears in the InclusiveNamespaces PrefixList
//!    (`#default` standing in for the default namespace).

use crate::render::{Attr, NsDecl};
use crate::{attr_entry, collect_inscope_namespaces, qualified_element_name};
use bdoc_core::Result;
use bdoc_xml::NodeSet;
use std::collections::{BTreeMap, HashSet};

/// Canonicalize using Exclusive C14N 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>> {
    let prefix_set: HashSet<String> = inclusive_prefixes.iter().cloned().collect();
    let mut output = Vec::new();
    let ctx = ExcC14nContext {
        with_comments,
        node_set,
        inclusive_prefixes: prefix_set,
    };
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new())?;
    Ok(output)
}

struct ExcC14nContext<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    inclusive_prefixes: HashSet<String>,
}

impl<'a> ExcC14nContext<'a> {
    fn is_visible(&self, node: &roxmltree::Node<'_, '_>) -> bool {
        match self.node_set {
            None => true,
            Some(set) => set.contains(node),
        }
    }

    fn process_node(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<()> {
        match node.node_type() {
            roxmltree::NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, output, rendered_ns)?;
                }
            }
            roxmltree::NodeType::Element => {
                self.process_element(node, output, rendered_ns)?;
            }
            roxmltree::NodeType::Text => {
                if self.is_visible(&node) {
                    let text = node.text().unwrap_or("");
                    output.extend_from_slice(crate::render::escape_text(text).as_bytes());
                }
            }
            roxmltree::NodeType::Comment => {
                if self.with_comments && self.is_visible(&node) {
                    output.extend_from_slice(b"<!--");
                    output.extend_from_slice(node.text().unwrap_or("").as_bytes());
                    output.extend_from_slice(b"-->");
                }
            }
            roxmltree::NodeType::PI => {
                if self.is_visible(&node) {
                    let pi = node.pi().expect("PI node");
                    output.extend_from_slice(b"<?");
                    output.extend_from_slice(pi.target.as_bytes());
                    if let Some(value) = pi.value {
                        if !value.is_empty() {
                            output.push(b' ');
                            output
                                .extend_from_slice(crate::render::escape_pi(value).as_bytes());
                        }
                    }
                    output.extend_from_slice(b"?>");
                }
            }
        }
        Ok(())
    }

    fn process_element(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<()> {
        if !self.is_visible(&node) {
            // Exclusive C14N renders namespace declarations only on visible
            // start tags; excluded elements just pass the rendered context
            // through to their included descendants.
            for child in node.children() {
                self.process_node(child, output, rendered_ns)?;
            }
            return Ok(());
        }

        let elem_name = qualified_element_name(&node);

        // Determine the visibly utilized prefixes.
        let mut utilized: HashSet<String> = HashSet::new();
        utilized.insert(element_prefix(&elem_name));
        let mut attrs: Vec<Attr> = Vec::new();
        for attr in node.attributes() {
            let entry = attr_entry(&node, &attr);
            if let Some((prefix, _)) = entry.qualified_name.split_once(':') {
                utilized.insert(prefix.to_owned());
            }
            attrs.push(entry);
        }
        for p in &self.inclusive_prefixes {
            if p == "#default" {
                utilized.insert(String::new());
            } else {
                utilized.insert(p.clone());
            }
        }
        attrs.sort();

        let inscope = collect_inscope_namespaces(&node);

        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for prefix in &utilized {
            if prefix == "xml" {
                continue;
            }
            if let Some(uri) = inscope.get(prefix) {
                if rendered_ns.get(prefix) != Some(uri) {
                    ns_decls.push(NsDecl {
                        prefix: prefix.clone(),
                        uri: uri.clone(),
                    });
                }
            } else if prefix.is_empty() {
                // The element is in no default namespace; undeclare if an
                // ancestor rendered a non-empty one.
                if rendered_ns.get("").map_or(false, |uri| !uri.is_empty()) {
                    ns_decls.push(NsDecl {
                        prefix: String::new(),
                        uri: String::new(),
                    });
                }
            }
        }
        ns_decls.sort();

        output.push(b'<');
        output.extend_from_slice(elem_name.as_bytes());
        for ns_decl in &ns_decls {
            output.extend_from_slice(ns_decl.render().as_bytes());
        }
        for attr in &attrs {
            output.extend_from_slice(attr.render().as_bytes());
        }
        output.push(b'>');

        let mut child_rendered_ns = rendered_ns.clone();
        for ns_decl in &ns_decls {
            child_rendered_ns.insert(ns_decl.prefix.clone(), ns_decl.uri.clone());
        }

        for child in node.children() {
            self.process_node(child, output, &child_rendered_ns)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
        Ok(())
    }
}

fn element_prefix(qualified_name: &str) -> String {
    match qualified_name.split_once(':') {
        Some((prefix, _)) => prefix.to_owned(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exc_c14n(xml: &str, prefixes: &[&str]) -> String {
        let doc = roxmltree::Document::parse(xml).unwrap();
        let prefixes: Vec<String> = prefixes.iter().map(|s| s.to_string()).collect();
        String::from_utf8(canonicalize(&doc, false, None, &prefixes).unwrap()).unwrap()
    }

    #[test]
    fn unused_namespace_is_dropped() {
        let out = exc_c14n(
            r#"<r xmlns:used="urn:u" xmlns:unused="urn:n"><used:a/></r>"#,
            &[],
        );
        assert_eq!(out, r#"<r><used:a xmlns:used="urn:u"></used:a></r>"#);
    }

    #[test]
    fn inclusive_prefix_list_forces_output() {
        let out = exc_c14n(
            r#"<r xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><a/></r>"#,
            &["ds"],
        );
        assert_eq!(
            out,
            "<r xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\"><a></a></r>"
        );
    }

    #[test]
    fn declaration_not_repeated_on_children() {
        let out = exc_c14n(r#"<u:r xmlns:u="urn:u"><u:a><u:b/></u:a></u:r>"#, &[]);
        assert_eq!(
            out,
            r#"<u:r xmlns:u="urn:u"><u:a><u:b></u:b></u:a></u:r>"#
        );
    }

    #[test]
    fn subset_redeclares_on_subtree_root() {
        let xml = r#"<ds:r xmlns:ds="urn:d"><ds:inner>x</ds:inner></ds:r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let inner = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "inner")
            .unwrap();
        let set = bdoc_xml::NodeSet::tree_without_comments(inner);
        let out = String::from_utf8(
            canonicalize(&doc, false, Some(&set), &[]).unwrap(),
        )
        .unwrap();
        assert_eq!(out, r#"<ds:inner xmlns:ds="urn:d">x</ds:inner>"#);
    }
}
