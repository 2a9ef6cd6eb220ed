#![forbid(unsafe_code)]

//! Schema-driven structural validation.
//!
//! Interprets the subset of XML Schema that `xmldsig-core-schema.xsd`,
//! `XAdES111.xsd` and `XAdES.xsd` are written in: top-level and local
//! element declarations, named and inline complex types, `sequence` /
//! `choice` / `any` particles with occurrence bounds, simple content,
//! `complexContent` extensions, and attribute uses. Every parsed
//! signature document is checked against the loaded declarations before
//! the model is built, so a document with children out of order, an
//! element the content model does not allow, or a missing required
//! attribute is rejected as a schema violation.
//!
//! Both schema families declare `elementFormDefault="qualified"`; local
//! element declarations are therefore registered under their file's
//! target namespace. Content is matched greedily without backtracking,
//! which is sufficient for these content models (their alternatives are
//! distinct element names).

use bdoc_core::{Error, Result};
use std::collections::HashMap;

const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";

const MAX_TYPE_DEPTH: usize = 32;

type Node<'a> = roxmltree::Node<'a, 'a>;

/// One schema source: the expected target namespace (the
/// namespace-location hint) plus the file's text.
pub struct SchemaSource<'a> {
    pub file: &'a str,
    pub namespace: &'a str,
    pub text: &'a str,
}

/// The element declarations of a set of schema files, ready to validate
/// documents.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    /// (namespace, local name) → content model.
    elements: HashMap<(String, String), ContentModel>,
}

#[derive(Debug, Clone)]
struct ContentModel {
    content: Content,
    required_attrs: Vec<String>,
}

#[derive(Debug, Clone)]
enum Content {
    /// Anything goes (`xs:anyType`, unresolvable types).
    Open,
    /// No element children (simple types, simple content, empty types).
    Empty,
    /// A model group constrains the element children.
    Model(Particle),
}

#[derive(Debug, Clone)]
struct Particle {
    term: Term,
    min: u32,
    /// `None` means unbounded.
    max: Option<u32>,
}

#[derive(Debug, Clone)]
enum Term {
    /// An element child, by (namespace, local name).
    Element(String, String),
    Sequence(Vec<Particle>),
    Choice(Vec<Particle>),
    /// `xs:any` — one arbitrary element.
    Any,
}

impl SchemaSet {
    /// Load a set of schema files.
    ///
    /// Each file must be an `xs:schema` document whose `targetNamespace`
    /// matches the namespace it was registered under.
    pub fn load(sources: &[SchemaSource<'_>]) -> Result<Self> {
        let mut docs = Vec::new();
        for source in sources {
            let doc = roxmltree::Document::parse_with_options(
                source.text,
                bdoc_xml::parsing_options(),
            )
            .map_err(|e| Error::XmlParse(format!("schema {}: {e}", source.file)))?;
            docs.push(doc);
        }

        // First pass: named complex types, keyed by the defining file's
        // target namespace so same-named types in the two XAdES dialects
        // stay apart.
        let mut loader = Loader {
            types: HashMap::new(),
        };
        let mut roots = Vec::new();
        for (doc, source) in docs.iter().zip(sources) {
            let root = doc.root_element();
            if !is_xsd(root, "schema") {
                return Err(Error::XmlParse(format!(
                    "schema {}: root element is not xs:schema",
                    source.file
                )));
            }
            let target_ns = root.attribute("targetNamespace").unwrap_or("");
            if target_ns != source.namespace {
                return Err(Error::XmlParse(format!(
                    "schema {}: targetNamespace is '{target_ns}', expected '{}'",
                    source.file, source.namespace
                )));
            }
            for child in root.children() {
                if is_xsd(child, "complexType") {
                    if let Some(name) = child.attribute("name") {
                        loader
                            .types
                            .insert((target_ns.to_owned(), name.to_owned()), child);
                    }
                }
            }
            roots.push((root, target_ns));
        }

        // Second pass: every element declaration, top-level or local.
        let mut elements = HashMap::new();
        for &(root, target_ns) in &roots {
            for node in root.descendants() {
                if !is_xsd(node, "element") {
                    continue;
                }
                let Some(name) = node.attribute("name") else {
                    continue; // ref= particles carry no declaration
                };
                let model = loader.element_model(node, target_ns, 0)?;
                elements
                    .entry((target_ns.to_string(), name.to_owned()))
                    .or_insert(model);
            }
        }
        Ok(Self { elements })
    }

    /// Validate a document against the loaded declarations.
    ///
    /// Every element with a declaration is checked; elements the schemas
    /// do not declare (wildcard content) are left alone.
    pub fn validate(&self, doc: &roxmltree::Document<'_>) -> Result<()> {
        for node in doc.descendants().filter(|n| n.is_element()) {
            let key = (
                node.tag_name().namespace().unwrap_or("").to_owned(),
                node.tag_name().name().to_owned(),
            );
            if let Some(model) = self.elements.get(&key) {
                self.check_element(node, model)?;
            }
        }
        Ok(())
    }

    /// Number of element declarations loaded.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn check_element(&self, node: Node<'_>, model: &ContentModel) -> Result<()> {
        for attr in &model.required_attrs {
            if node.attribute(attr.as_str()).is_none() {
                return Err(Error::InvalidStructure(format!(
                    "schema violation: element '{}' is missing required attribute '{attr}'",
                    node.tag_name().name()
                )));
            }
        }

        let children: Vec<(String, String)> = node
            .children()
            .filter(|n| n.is_element())
            .map(|n| {
                (
                    n.tag_name().namespace().unwrap_or("").to_owned(),
                    n.tag_name().name().to_owned(),
                )
            })
            .collect();

        let consumed = match &model.content {
            Content::Open => children.len(),
            Content::Empty => 0,
            Content::Model(particle) => {
                match_particle(particle, &children, 0).ok_or_else(|| {
                    Error::InvalidStructure(format!(
                        "schema violation: invalid content of element '{}'",
                        node.tag_name().name()
                    ))
                })?
            }
        };
        if consumed != children.len() {
            return Err(Error::InvalidStructure(format!(
                "schema violation: element '{}' not allowed inside '{}'",
                children[consumed].1,
                node.tag_name().name()
            )));
        }
        Ok(())
    }
}

//------------ Content matching ----------------------------------------

fn match_particle(particle: &Particle, children: &[(String, String)], pos: usize) -> Option<usize> {
    let mut cur = pos;
    let mut count = 0u32;
    loop {
        if let Some(max) = particle.max {
            if count >= max {
                break;
            }
        }
        match try_term(&particle.term, children, cur) {
            Some(next) if next > cur => {
                cur = next;
                count += 1;
            }
            // The term matches without consuming anything, so any
            // remaining required occurrences are trivially satisfied.
            Some(_) => return Some(cur),
            None => break,
        }
    }
    (count >= particle.min).then_some(cur)
}

fn try_term(term: &Term, children: &[(String, String)], pos: usize) -> Option<usize> {
    match term {
        Term::Element(ns, local) => match children.get(pos) {
            Some((child_ns, child_local)) if child_ns == ns && child_local == local => {
                Some(pos + 1)
            }
            _ => None,
        },
        Term::Any => (pos < children.len()).then_some(pos + 1),
        Term::Sequence(parts) => {
            let mut cur = pos;
            for part in parts {
                cur = match_particle(part, children, cur)?;
            }
            Some(cur)
        }
        Term::Choice(parts) => parts
            .iter()
            .find_map(|part| try_term(&part.term, children, pos)),
    }
}

//------------ Schema interpretation -----------------------------------

struct Loader<'a> {
    /// (namespace, type name) → defining complexType node.
    types: HashMap<(String, String), Node<'a>>,
}

impl<'a> Loader<'a> {
    /// Content model of one element declaration.
    fn element_model(
        &self,
        element: Node<'a>,
        target_ns: &str,
        depth: usize,
    ) -> Result<ContentModel> {
        if depth > MAX_TYPE_DEPTH {
            return Err(Error::XmlParse("schema type nesting too deep".into()));
        }
        if let Some(type_ref) = element.attribute("type") {
            return self.named_type_model(element, type_ref, depth);
        }
        if let Some(inline) = xsd_child(element, "complexType") {
            return self.complex_type_model(inline, target_ns, depth);
        }
        // No type information: the ur-type, anything goes.
        Ok(ContentModel {
            content: Content::Open,
            required_attrs: Vec::new(),
        })
    }

    /// Resolve a `type="prefix:Name"` reference from the node it appears
    /// on.
    fn named_type_model(
        &self,
        at: Node<'a>,
        type_ref: &str,
        depth: usize,
    ) -> Result<ContentModel> {
        let (ns, local) = resolve_qname(at, type_ref)?;
        if ns == XSD_NS {
            // Built-in simple types carry text only; anyType is open.
            let content = if local == "anyType" {
                Content::Open
            } else {
                Content::Empty
            };
            return Ok(ContentModel {
                content,
                required_attrs: Vec::new(),
            });
        }
        match self.types.get(&(ns.clone(), local.clone())) {
            Some(ct) => self.complex_type_model(*ct, &ns, depth + 1),
            // A type the loaded files do not define (an unimported
            // schema); nothing to enforce.
            None => Ok(ContentModel {
                content: Content::Open,
                required_attrs: Vec::new(),
            }),
        }
    }

    /// Content model of a complexType node.
    fn complex_type_model(
        &self,
        ct: Node<'a>,
        target_ns: &str,
        depth: usize,
    ) -> Result<ContentModel> {
        if depth > MAX_TYPE_DEPTH {
            return Err(Error::XmlParse("schema type nesting too deep".into()));
        }

        let mut required_attrs = Vec::new();
        collect_required_attrs(ct, &mut required_attrs);

        if let Some(simple) = xsd_child(ct, "simpleContent") {
            if let Some(ext) = xsd_child(simple, "extension") {
                collect_required_attrs(ext, &mut required_attrs);
            }
            return Ok(ContentModel {
                content: Content::Empty,
                required_attrs,
            });
        }

        if let Some(complex) = xsd_child(ct, "complexContent") {
            let derivation = xsd_child(complex, "extension")
                .or_else(|| xsd_child(complex, "restriction"));
            let Some(derivation) = derivation else {
                return Ok(ContentModel {
                    content: Content::Open,
                    required_attrs,
                });
            };
            collect_required_attrs(derivation, &mut required_attrs);
            let own = match group_child(derivation) {
                Some(group) => Some(self.particle(group, target_ns, depth + 1)?),
                None => None,
            };
            // Extensions append their own content after the base's; a
            // restriction replaces it.
            let base = if is_xsd(derivation, "extension") {
                match derivation.attribute("base") {
                    Some(base_ref) => {
                        let model = self.named_type_model(derivation, base_ref, depth + 1)?;
                        required_attrs.extend(model.required_attrs);
                        match model.content {
                            Content::Model(p) => Some(p),
                            _ => None,
                        }
                    }
                    None => None,
                }
            } else {
                None
            };
            let content = match (base, own) {
                (Some(base), Some(own)) => Content::Model(Particle {
                    term: Term::Sequence(vec![base, own]),
                    min: 1,
                    max: Some(1),
                }),
                (Some(base), None) => Content::Model(base),
                (None, Some(own)) => Content::Model(own),
                (None, None) => Content::Empty,
            };
            return Ok(ContentModel {
                content,
                required_attrs,
            });
        }

        let content = match group_child(ct) {
            Some(group) => Content::Model(self.particle(group, target_ns, depth + 1)?),
            None => Content::Empty,
        };
        Ok(ContentModel {
            content,
            required_attrs,
        })
    }

    /// Build the particle for a `sequence`, `choice`, `all`, `element`
    /// or `any` node.
    fn particle(&self, node: Node<'a>, target_ns: &str, depth: usize) -> Result<Particle> {
        if depth > MAX_TYPE_DEPTH {
            return Err(Error::XmlParse("schema type nesting too deep".into()));
        }
        let min = node
            .attribute("minOccurs")
            .map(|v| v.parse().unwrap_or(1))
            .unwrap_or(1);
        let max = match node.attribute("maxOccurs") {
            Some("unbounded") => None,
            Some(v) => Some(v.parse().unwrap_or(1)),
            None => Some(1),
        };

        let term = if is_xsd(node, "sequence") {
            Term::Sequence(self.child_particles(node, target_ns, depth)?)
        } else if is_xsd(node, "choice") {
            Term::Choice(self.child_particles(node, target_ns, depth)?)
        } else if is_xsd(node, "all") {
            // Order-free; approximated as a repeatable choice.
            return Ok(Particle {
                term: Term::Choice(self.child_particles(node, target_ns, depth)?),
                min: 0,
                max: None,
            });
        } else if is_xsd(node, "any") {
            Term::Any
        } else if is_xsd(node, "element") {
            if let Some(reference) = node.attribute("ref") {
                let (ns, local) = resolve_qname(node, reference)?;
                Term::Element(ns, local)
            } else if let Some(name) = node.attribute("name") {
                // elementFormDefault="qualified": local declarations live
                // in the file's target namespace.
                Term::Element(target_ns.to_owned(), name.to_owned())
            } else {
                return Err(Error::XmlParse(
                    "schema element particle has neither name nor ref".into(),
                ));
            }
        } else {
            return Err(Error::XmlParse(format!(
                "unsupported schema construct xs:{}",
                node.tag_name().name()
            )));
        };
        Ok(Particle { term, min, max })
    }

    fn child_particles(
        &self,
        node: Node<'a>,
        target_ns: &str,
        depth: usize,
    ) -> Result<Vec<Particle>> {
        let mut parts = Vec::new();
        for child in node.children() {
            if child.is_element()
                && child.tag_name().namespace() == Some(XSD_NS)
                && matches!(
                    child.tag_name().name(),
                    "sequence" | "choice" | "all" | "element" | "any"
                )
            {
                parts.push(self.particle(child, target_ns, depth + 1)?);
            }
        }
        Ok(parts)
    }
}

fn is_xsd(node: Node<'_>, local: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local
        && node.tag_name().namespace() == Some(XSD_NS)
}

/// The single model-group child of a complexType or derivation node.
fn group_child<'a>(parent: Node<'a>) -> Option<Node<'a>> {
    parent.children().find(|n| {
        n.is_element()
            && n.tag_name().namespace() == Some(XSD_NS)
            && matches!(n.tag_name().name(), "sequence" | "choice" | "all")
    })
}

fn xsd_child<'a>(parent: Node<'a>, local: &str) -> Option<Node<'a>> {
    parent.children().find(|n| is_xsd(*n, local))
}

fn collect_required_attrs(node: Node<'_>, out: &mut Vec<String>) {
    for child in node.children() {
        if is_xsd(child, "attribute")
            && child.attribute("use") == Some("required")
        {
            if let Some(name) = child.attribute("name") {
                out.push(name.to_owned());
            }
        }
    }
}

/// Resolve `prefix:Name` against the namespaces in scope at `node`.
fn resolve_qname(node: Node<'_>, qname: &str) -> Result<(String, String)> {
    match qname.split_once(':') {
        Some((prefix, local)) => {
            let ns = node
                .lookup_namespace_uri(Some(prefix))
                .ok_or_else(|| {
                    Error::XmlParse(format!("schema: undeclared prefix in '{qname}'"))
                })?;
            Ok((ns.to_owned(), local.to_owned()))
        }
        None => {
            // Unprefixed references resolve against the default namespace.
            let ns = node.lookup_namespace_uri(None).unwrap_or("");
            Ok((ns.to_owned(), qname.to_owned()))
        }
    }
}
