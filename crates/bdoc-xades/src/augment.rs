#![forbid(unsafe_code)]

//! Time-Mark augmentation.
//!
//! Takes a BES signature whose online OCSP confirmation succeeded and
//! produces the XAdES-TM document: the `UnsignedSignatureProperties`
//! subtree is built as new XML, spliced into a copy of the original text
//! at the existing `UnsignedProperties` element, and the whole document is
//! re-serialized in canonical form behind an XML declaration. The parsed
//! model is never mutated.

use crate::model::Dialect;
use crate::signature::Signature;
use base64::Engine;
use bdoc_c14n::C14nMode;
use bdoc_core::{ns, Error, Result};
use bdoc_xml::XmlDocument;

/// Everything the augmentation subtree carries.
pub(crate) struct TmMaterial<'a> {
    /// DER certificates for `CertificateValues`, responder first.
    pub certificate_values: Vec<Vec<u8>>,
    pub ocsp_response: &'a [u8],
    pub cert_ref_digest_method: &'a str,
    pub cert_ref_digest: &'a [u8],
    pub cert_ref_issuer: String,
    pub cert_ref_serial: String,
    pub responder_id: String,
    pub produced_at: &'a str,
    pub ocsp_ref_digest_method: &'a str,
    pub ocsp_ref_digest: &'a [u8],
}

/// Build the augmented TM document.
pub(crate) fn build_tm_signature(signature: &Signature, material: &TmMaterial) -> Result<String> {
    let text = signature.xml();
    let xades = signature.dialect().xades_ns();

    let (range, tag_text, xades_prefix, ds_binding) = {
        let doc = signature.document().parse_doc()?;
        let node = XmlDocument::find_unique(&doc, xades, ns::node::UNSIGNED_PROPERTIES)?;
        let range = node.range();
        let tag_text = text[range.clone()].to_owned();
        (
            range,
            tag_text,
            prefix_for(&node, xades).flatten(),
            prefix_for(&node, ns::DSIG),
        )
    };

    // When the dsig namespace has no binding at the splice point, the
    // inserted subtree declares its own `ds` prefix.
    let (ds_prefix, extra_ns_decl) = match &ds_binding {
        Some(binding) => (binding.clone(), None),
        None => (
            Some("ds".to_owned()),
            Some(format!(" xmlns:ds=\"{}\"", ns::DSIG)),
        ),
    };

    let content = unsigned_signature_properties(
        signature.dialect(),
        material,
        xades_prefix.as_deref(),
        ds_prefix.as_deref(),
        extra_ns_decl.as_deref(),
    );

    let spliced = splice_into_element(text, &range, &tag_text, &content)?;

    // Well-formedness gate before serialization.
    let augmented = XmlDocument::parse(spliced)?;
    let canonical = bdoc_c14n::canonicalize(augmented.text(), C14nMode::Inclusive, None, &[])?;
    let canonical = String::from_utf8(canonical)
        .map_err(|e| Error::XmlParse(format!("canonical output is not UTF-8: {e}")))?;

    Ok(format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{canonical}"
    ))
}

/// Insert `content` as the last child of the element occupying `range` in
/// `text`, expanding a self-closing tag when needed.
fn splice_into_element(
    text: &str,
    range: &std::ops::Range<usize>,
    tag_text: &str,
    content: &str,
) -> Result<String> {
    if let Some(head) = tag_text.strip_suffix("/>") {
        let qname: String = head
            .trim_start_matches('<')
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != '>')
            .collect();
        let replacement = format!("{}>{content}</{qname}>", head.trim_end());
        Ok(format!(
            "{}{replacement}{}",
            &text[..range.start],
            &text[range.end..]
        ))
    } else {
        let close_at = tag_text.rfind("</").ok_or_else(|| {
            Error::XmlParse("UnsignedProperties element has no closing tag".into())
        })?;
        let insert_at = range.start + close_at;
        Ok(format!(
            "{}{content}{}",
            &text[..insert_at],
            &text[insert_at..]
        ))
    }
}

fn unsigned_signature_properties(
    dialect: Dialect,
    material: &TmMaterial,
    xades_prefix: Option<&str>,
    ds_prefix: Option<&str>,
    extra_ns_decl: Option<&str>,
) -> String {
    let x = |local: &str| qname(xades_prefix, local);
    let d = |local: &str| qname(ds_prefix, local);
    let b64 = |data: &[u8]| base64::engine::general_purpose::STANDARD.encode(data);

    let mut out = String::new();
    out.push_str(&format!(
        "<{}{}>",
        x(ns::node::UNSIGNED_SIGNATURE_PROPERTIES),
        extra_ns_decl.unwrap_or("")
    ));

    // CertificateValues: responder certificate, then the signer's issuer.
    out.push_str(&format!("<{}>", x(ns::node::CERTIFICATE_VALUES)));
    for cert in &material.certificate_values {
        out.push_str(&format!(
            "<{0}>{1}</{0}>",
            x(ns::node::ENCAPSULATED_X509_CERTIFICATE),
            b64(cert)
        ));
    }
    out.push_str(&format!("</{}>", x(ns::node::CERTIFICATE_VALUES)));

    // RevocationValues with the encapsulated OCSP response.
    out.push_str(&format!(
        "<{0}><{1}><{2}>{3}</{2}></{1}></{0}>",
        x(ns::node::REVOCATION_VALUES),
        x(ns::node::OCSP_VALUES),
        x(ns::node::ENCAPSULATED_OCSP_VALUE),
        b64(material.ocsp_response)
    ));

    // CompleteCertificateRefs for the responder's issuer.
    out.push_str(&format!(
        "<{0}><{1}><{2}>",
        x(ns::node::COMPLETE_CERTIFICATE_REFS),
        x(ns::node::CERT_REFS),
        x(ns::node::CERT)
    ));
    out.push_str(&digest_alg_and_value(
        &x(ns::node::CERT_DIGEST),
        &d(ns::node::DIGEST_METHOD),
        &d(ns::node::DIGEST_VALUE),
        material.cert_ref_digest_method,
        &b64(material.cert_ref_digest),
    ));
    out.push_str(&format!(
        "<{0}><{1}>{2}</{1}><{3}>{4}</{3}></{0}>",
        x(ns::node::ISSUER_SERIAL),
        d(ns::node::X509_ISSUER_NAME),
        xml_escape(&material.cert_ref_issuer),
        d(ns::node::X509_SERIAL_NUMBER),
        xml_escape(&material.cert_ref_serial)
    ));
    out.push_str(&format!(
        "</{0}></{1}></{2}>",
        x(ns::node::CERT),
        x(ns::node::CERT_REFS),
        x(ns::node::COMPLETE_CERTIFICATE_REFS)
    ));

    // CompleteRevocationRefs binding the OCSP response.
    out.push_str(&format!(
        "<{0}><{1}><{2}><{3}>",
        x(ns::node::COMPLETE_REVOCATION_REFS),
        x(ns::node::OCSP_REFS),
        x(ns::node::OCSP_REF),
        x(ns::node::OCSP_IDENTIFIER)
    ));
    match dialect {
        // In v1.3.2 ResponderID is a choice; by-name is used here.
        Dialect::V132 => out.push_str(&format!(
            "<{0}><{1}>{2}</{1}></{0}>",
            x(ns::node::RESPONDER_ID),
            x("ByName"),
            xml_escape(&material.responder_id)
        )),
        Dialect::V111 => out.push_str(&format!(
            "<{0}>{1}</{0}>",
            x(ns::node::RESPONDER_ID),
            xml_escape(&material.responder_id)
        )),
    }
    out.push_str(&format!(
        "<{0}>{1}</{0}></{2}>",
        x(ns::node::PRODUCED_AT),
        xml_escape(material.produced_at),
        x(ns::node::OCSP_IDENTIFIER)
    ));
    out.push_str(&digest_alg_and_value(
        &x(ns::node::DIGEST_ALG_AND_VALUE),
        &d(ns::node::DIGEST_METHOD),
        &d(ns::node::DIGEST_VALUE),
        material.ocsp_ref_digest_method,
        &b64(material.ocsp_ref_digest),
    ));
    out.push_str(&format!(
        "</{0}></{1}></{2}>",
        x(ns::node::OCSP_REF),
        x(ns::node::OCSP_REFS),
        x(ns::node::COMPLETE_REVOCATION_REFS)
    ));

    out.push_str(&format!(
        "</{}>",
        x(ns::node::UNSIGNED_SIGNATURE_PROPERTIES)
    ));
    out
}

fn digest_alg_and_value(
    wrapper: &str,
    method_qname: &str,
    value_qname: &str,
    method_uri: &str,
    value_b64: &str,
) -> String {
    format!(
        "<{wrapper}><{method_qname} Algorithm=\"{}\"/><{value_qname}>{value_b64}</{value_qname}></{wrapper}>",
        xml_escape(method_uri)
    )
}

/// Binding of `uri` in the node's scope: `None` when unbound,
/// `Some(None)` when it is the default namespace, `Some(Some(prefix))`
/// otherwise.
fn prefix_for(node: &roxmltree::Node<'_, '_>, uri: &str) -> Option<Option<String>> {
    node.namespaces()
        .find(|ns| ns.uri() == uri)
        .map(|ns| ns.name().map(str::to_owned))
}

fn qname(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
        _ => local.to_owned(),
    }
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
