#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0 and 1.1.
//!
//! URIs: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315` (1.0),
//! `http://www.w3.org/2006/12/xml-c14n11` (1.1), each with a
//! `#WithComments` variant.
//!
//! The canonical form outputs namespace declarations sorted by prefix
//! (default first), attributes sorted by (namespace-URI, local-name), and
//! escapes text and attribute values per C14N rules. Document-subset
//! canonicalization is driven by a `NodeSet`.
//!
//! The 1.1 variant differs from 1.0 in the treatment of `xml:*` attributes
//! for document subsets: 1.0 pulls them down from excluded ancestors, 1.1
//! does not (simple inheritance).

use crate::render::{Attr, NsDecl};
use crate::{attr_entry, collect_inscope_namespaces, qualified_element_name};
use bdoc_core::{ns, Result};
use bdoc_xml::NodeSet;
use std::collections::BTreeMap;

/// Canonicalize a document using Inclusive C14N 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>> {
    canonicalize_with_options(doc, with_comments, node_set, false)
}

/// Canonicalize with an explicit C14N 1.1 flag.
pub fn canonicalize_with_options(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    xml11: bool,
) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let ctx = C14nContext {
        with_comments,
        node_set,
        xml11,
    };
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new())?;
    Ok(output)
}

struct C14nContext<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    xml11: bool,
}

impl<'a> C14nContext<'a> {
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
        inherited_ns: &BTreeMap<String, String>,
    ) -> Result<()> {
        match node.node_type() {
            roxmltree::NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, output, inherited_ns)?;
                }
            }
            roxmltree::NodeType::Element => {
                self.process_element(node, output, inherited_ns)?;
            }
            roxmltree::NodeType::Text => {
                if self.is_visible(&node) {
                    let text = node.text().unwrap_or("");
                    output.extend_from_slice(crate::render::escape_text(text).as_bytes());
                }
            }
            roxmltree::NodeType::Comment => {
                if self.with_comments && self.is_visible(&node) {
                    let mut content = Vec::new();
                    content.extend_from_slice(b"<!--");
                    content.extend_from_slice(node.text().unwrap_or("").as_bytes());
                    content.extend_from_slice(b"-->");
                    self.emit_top_level(node, output, &content);
                }
            }
            roxmltree::NodeType::PI => {
                if self.is_visible(&node) {
                    let pi = node.pi().expect("PI node");
                    let mut content = Vec::new();
                    content.extend_from_slice(b"<?");
                    content.extend_from_slice(pi.target.as_bytes());
                    if let Some(value) = pi.value {
                        if !value.is_empty() {
                            content.push(b' ');
                            content
                                .extend_from_slice(crate::render::escape_pi(value).as_bytes());
                        }
                    }
                    content.extend_from_slice(b"?>");
                    self.emit_top_level(node, output, &content);
                }
            }
        }
        Ok(())
    }

    /// Emit a comment or PI, adding the newline separators C14N requires
    /// around nodes that sit directly under the document node.
    fn emit_top_level(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        content: &[u8],
    ) {
        let parent_is_root = node
            .parent()
            .is_some_and(|p| p.node_type() == roxmltree::NodeType::Root);
        if parent_is_root && crate::has_preceding_element(node) {
            output.push(b'\n');
        }
        output.extend_from_slice(content);
        if parent_is_root && crate::has_following_element(node) {
            output.push(b'\n');
        }
    }

    fn process_element(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        inherited_ns: &BTreeMap<String, String>,
    ) -> Result<()> {
        if !self.is_visible(&node) {
            // An excluded element contributes nothing of its own; its
            // included descendants render against the same inherited
            // namespace context.
            for child in node.children() {
                self.process_node(child, output, inherited_ns)?;
            }
            return Ok(());
        }

        let inscope = collect_inscope_namespaces(&node);

        // A namespace declaration is output when it is new or changed
        // relative to the nearest rendered ancestor.
        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for (prefix, uri) in &inscope {
            if prefix == "xml" {
                continue;
            }
            if inherited_ns.get(prefix) != Some(uri) {
                ns_decls.push(NsDecl {
                    prefix: prefix.clone(),
                    uri: uri.clone(),
                });
            }
        }
        // Undeclare the default namespace when a rendered ancestor had a
        // non-empty one and this element is outside any default namespace.
        if let Some(inherited_default) = inherited_ns.get("") {
            if !inherited_default.is_empty() && !inscope.contains_key("") {
                ns_decls.push(NsDecl {
                    prefix: String::new(),
                    uri: String::new(),
                });
            }
        }
        ns_decls.sort();

        let mut attrs: Vec<Attr> = Vec::new();
        for attr in node.attributes() {
            attrs.push(attr_entry(&node, &attr));
        }

        // C14N 1.0 document subsets pull xml:* attributes down from
        // excluded ancestors; C14N 1.1 uses simple inheritance instead.
        if self.node_set.is_some() && !self.xml11 {
            let parent_not_visible = node
                .parent()
                .map_or(true, |p| !p.is_element() || !self.is_visible(&p));
            if parent_not_visible {
                let extra = inherited_xml_attrs(&node, &attrs);
                attrs.extend(extra);
            }
        }
        attrs.sort();

        let elem_name = qualified_element_name(&node);

        output.push(b'<');
        output.extend_from_slice(elem_name.as_bytes());
        for ns_decl in &ns_decls {
            output.extend_from_slice(ns_decl.render().as_bytes());
        }
        for attr in &attrs {
            output.extend_from_slice(attr.render().as_bytes());
        }
        output.push(b'>');

        // After this start tag, the rendered namespace context seen by the
        // children is exactly the element's in-scope set.
        let mut child_ns: BTreeMap<String, String> = BTreeMap::new();
        for (prefix, uri) in &inscope {
            if prefix != "xml" {
                child_ns.insert(prefix.clone(), uri.clone());
            }
        }

        for child in node.children() {
            self.process_node(child, output, &child_ns)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
        Ok(())
    }
}

/// Collect `xml:*` attributes inherited from ancestors of a subset root.
///
/// Walks all ancestors (visible or not), nearest declaration wins, and
/// drops any name already present on the element itself.
fn inherited_xml_attrs(
    node: &roxmltree::Node<'_, '_>,
    existing_attrs: &[Attr],
) -> Vec<Attr> {
    let mut inherited: BTreeMap<String, String> = BTreeMap::new();

    let mut current = node.parent();
    while let Some(ancestor) = current {
        if ancestor.is_element() {
            for attr in ancestor.attributes() {
                if attr.namespace() == Some(ns::XML)
                    && !inherited.contains_key(attr.name())
                {
                    inherited.insert(attr.name().to_owned(), attr.value().to_owned());
                }
            }
        }
        current = ancestor.parent();
    }

    let mut result = Vec::new();
    for (name, value) in &inherited {
        let already_present = existing_attrs
            .iter()
            .any(|a| a.ns_uri == ns::XML && a.local_name == *name);
        if !already_present {
            result.push(Attr {
                ns_uri: ns::XML.to_owned(),
                local_name: name.clone(),
                qualified_name: format!("xml:{name}"),
                value: value.clone(),
            });
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c14n(xml: &str) -> String {
        let doc = roxmltree::Document::parse(xml).unwrap();
        String::from_utf8(canonicalize(&doc, false, None).unwrap()).unwrap()
    }

    #[test]
    fn attributes_are_sorted() {
        assert_eq!(
            c14n(r#"<root><a b="1" a="2"/></root>"#),
            r#"<root><a a="2" b="1"></a></root>"#
        );
    }

    #[test]
    fn empty_element_is_expanded() {
        assert_eq!(c14n("<root/>"), "<root></root>");
    }

    #[test]
    fn whitespace_is_preserved() {
        assert_eq!(
            c14n("<root>\n  <a>  x  </a>\n</root>"),
            "<root>\n  <a>  x  </a>\n</root>"
        );
    }

    #[test]
    fn namespaces_render_sorted_by_prefix() {
        let out = c14n(r#"<r xmlns:b="http://b" xmlns:a="http://a"><a:c/></r>"#);
        assert_eq!(
            out,
            r#"<r xmlns:a="http://a" xmlns:b="http://b"><a:c></a:c></r>"#
        );
    }

    #[test]
    fn inherited_namespace_not_redeclared() {
        let out = c14n(r#"<r xmlns="http://d"><c xmlns="http://d"/></r>"#);
        assert_eq!(out, r#"<r xmlns="http://d"><c></c></r>"#);
    }

    #[test]
    fn text_escaping() {
        assert_eq!(
            c14n("<root>a &amp; b &lt; c</root>"),
            "<root>a &amp; b &lt; c</root>"
        );
    }

    #[test]
    fn comments_stripped_without_comments_mode() {
        assert_eq!(c14n("<r><!--x--><a/></r>"), "<r><a></a></r>");
        let doc = roxmltree::Document::parse("<r><!--x--><a/></r>").unwrap();
        let out =
            String::from_utf8(canonicalize(&doc, true, None).unwrap()).unwrap();
        assert_eq!(out, "<r><!--x--><a></a></r>");
    }

    #[test]
    fn subset_renders_inscope_namespaces_on_root() {
        let xml = r#"<r xmlns:s="urn:s"><s:inner><s:leaf/></s:inner></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let inner = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "inner")
            .unwrap();
        let set = bdoc_xml::NodeSet::tree_without_comments(inner);
        let out =
            String::from_utf8(canonicalize(&doc, false, Some(&set)).unwrap()).unwrap();
        assert_eq!(
            out,
            r#"<s:inner xmlns:s="urn:s"><s:leaf></s:leaf></s:inner>"#
        );
    }

    #[test]
    fn equivalent_infoset_different_quoting_matches() {
        let a = c14n("<r attr='x &quot;y&quot;'/>");
        let b = c14n("<r attr=\"x &#34;y&#34;\"/>");
        assert_eq!(a, b);
        assert_eq!(a, "<r attr=\"x &quot;y&quot;\"></r>");
    }
}
