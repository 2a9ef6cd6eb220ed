#![forbid(unsafe_code)]

//! Parsing of signature documents into the [`SignatureModel`].
//!
//! The document is first validated against the loaded XML-DSig and XAdES
//! schema declarations, then the model builder enforces the constraints
//! the schemas cannot express: a single `Object` and dialect exclusivity
//! of the qualifying properties. Whitespace is never normalized; digests
//! are computed later from the owned original text.

use crate::config::SchemaDir;
use crate::model::{
    Dialect, OcspRef, QualifyingProperties, Reference, SignatureModel, SignedInfo,
    SigningCertRef, UnsignedSignatureProperties, X509Data,
};
use base64::Engine;
use bdoc_core::{ns, Error, Result};
use bdoc_xml::XmlDocument;

type Node<'a> = roxmltree::Node<'a, 'a>;

/// Parse a signature document.
pub(crate) fn parse_signature(
    schema: &SchemaDir,
    data: &[u8],
) -> Result<(XmlDocument, SignatureModel, Dialect)> {
    log::debug!(
        "parsing signature against schemas in {}",
        schema.path().display()
    );
    let document = XmlDocument::parse_bytes(data)?;
    let (model, dialect) = {
        let doc = document.parse_doc()?;
        schema.schemas().validate(&doc)?;
        let root = doc.root_element();
        if !is_named(root, ns::DSIG, ns::node::SIGNATURE) {
            return Err(Error::InvalidStructure(format!(
                "document root is {}, expected ds:Signature",
                root.tag_name().name()
            )));
        }
        build_model(root)?
    };
    Ok((document, model, dialect))
}

fn build_model(root: Node) -> Result<(SignatureModel, Dialect)> {
    let id = root.attribute(ns::attr::ID).map(str::to_owned);

    let signed_info_node = child(root, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;
    let signed_info = parse_signed_info(signed_info_node)?;

    let signature_value_node = child(root, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .ok_or_else(|| Error::MissingElement("SignatureValue".into()))?;
    let signature_value = decode_base64(text_of(signature_value_node), "SignatureValue")?;

    let key_info = match child(root, ns::DSIG, ns::node::KEY_INFO) {
        Some(key_info_node) => Some(parse_key_info(key_info_node)?),
        None => None,
    };

    let objects = children(root, ns::DSIG, ns::node::OBJECT);
    if objects.is_empty() {
        return Err(Error::InvalidStructure(
            "Signature block 'Object' is missing".into(),
        ));
    }
    if objects.len() != 1 {
        return Err(Error::InvalidStructure(
            "Signature block contains more than one 'Object' block".into(),
        ));
    }
    let object = objects[0];

    // Both dialects name the element QualifyingProperties; only the
    // namespace tells them apart.
    let qp132 = children(object, ns::XADES132, ns::node::QUALIFYING_PROPERTIES);
    let qp111 = children(object, ns::XADES111, ns::node::QUALIFYING_PROPERTIES);

    let (dialect, qp_nodes) = match (qp111.is_empty(), qp132.is_empty()) {
        (true, true) => {
            return Err(Error::InvalidStructure(
                "Signature block 'QualifyingProperties' is missing".into(),
            ))
        }
        (false, true) => (Dialect::V111, qp111),
        (true, false) => (Dialect::V132, qp132),
        (false, false) => {
            return Err(Error::InvalidStructure(
                "Signature block 'Object' contains more than one 'QualifyingProperties' block"
                    .into(),
            ))
        }
    };
    if qp_nodes.len() != 1 {
        return Err(Error::InvalidStructure(
            "Signature block 'Object' contains more than one 'QualifyingProperties' block".into(),
        ));
    }

    let mut qualifying_properties = Vec::new();
    for node in qp_nodes {
        qualifying_properties.push(parse_qualifying_properties(node, dialect)?);
    }

    Ok((
        SignatureModel {
            id,
            signed_info,
            signature_value,
            key_info,
            qualifying_properties,
        },
        dialect,
    ))
}

fn parse_signed_info(node: Node) -> Result<SignedInfo> {
    let c14n_node = child(node, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
        .ok_or_else(|| Error::MissingElement("CanonicalizationMethod".into()))?;
    let canonicalization_method = algorithm_of(c14n_node, "CanonicalizationMethod")?;

    let method_node = child(node, ns::DSIG, ns::node::SIGNATURE_METHOD)
        .ok_or_else(|| Error::MissingElement("SignatureMethod".into()))?;
    let signature_method = algorithm_of(method_node, "SignatureMethod")?;

    let mut references = Vec::new();
    for reference in children(node, ns::DSIG, ns::node::REFERENCE) {
        references.push(parse_reference(reference)?);
    }

    Ok(SignedInfo {
        canonicalization_method,
        signature_method,
        references,
    })
}

fn parse_reference(node: Node) -> Result<Reference> {
    let digest_node = child(node, ns::DSIG, ns::node::DIGEST_METHOD)
        .ok_or_else(|| Error::MissingElement("Reference DigestMethod".into()))?;
    let digest_method = algorithm_of(digest_node, "DigestMethod")?;
    let value_node = child(node, ns::DSIG, ns::node::DIGEST_VALUE)
        .ok_or_else(|| Error::MissingElement("Reference DigestValue".into()))?;
    let digest_value = decode_base64(text_of(value_node), "DigestValue")?;
    Ok(Reference {
        uri: node.attribute(ns::attr::URI).map(str::to_owned),
        ref_type: node.attribute(ns::attr::TYPE).map(str::to_owned),
        digest_method,
        digest_value,
    })
}

fn parse_key_info(node: Node) -> Result<Vec<X509Data>> {
    let mut result = Vec::new();
    for x509_data in children(node, ns::DSIG, ns::node::X509_DATA) {
        let mut certificates = Vec::new();
        for cert in children(x509_data, ns::DSIG, ns::node::X509_CERTIFICATE) {
            certificates.push(decode_base64(text_of(cert), "X509Certificate")?);
        }
        result.push(X509Data { certificates });
    }
    Ok(result)
}

fn parse_qualifying_properties(node: Node, dialect: Dialect) -> Result<QualifyingProperties> {
    let xades = dialect.xades_ns();
    let target = node.attribute(ns::attr::TARGET).map(str::to_owned);

    let signed_properties = child(node, xades, ns::node::SIGNED_PROPERTIES);
    let mut signing_certificate = Vec::new();
    let mut has_signature_policy = false;
    if let Some(signed_properties) = signed_properties {
        if let Some(ssp) = child(
            signed_properties,
            xades,
            ns::node::SIGNED_SIGNATURE_PROPERTIES,
        ) {
            has_signature_policy =
                child(ssp, xades, ns::node::SIGNATURE_POLICY_IDENTIFIER).is_some();
            if let Some(signing_cert) = child(ssp, xades, ns::node::SIGNING_CERTIFICATE) {
                for cert in children(signing_cert, xades, ns::node::CERT) {
                    signing_certificate.push(parse_signing_cert_ref(cert, xades)?);
                }
            }
        }
    }

    let unsigned = child(node, xades, ns::node::UNSIGNED_PROPERTIES);
    let mut has_unsigned_data_object_properties = false;
    let mut unsigned_signature_properties = None;
    if let Some(unsigned) = unsigned {
        has_unsigned_data_object_properties = child(
            unsigned,
            xades,
            ns::node::UNSIGNED_DATA_OBJECT_PROPERTIES,
        )
        .is_some();
        if let Some(usp) = child(unsigned, xades, ns::node::UNSIGNED_SIGNATURE_PROPERTIES) {
            unsigned_signature_properties =
                Some(parse_unsigned_signature_properties(usp, xades)?);
        }
    }

    Ok(QualifyingProperties {
        target,
        has_signed_properties: signed_properties.is_some(),
        signing_certificate,
        has_signature_policy,
        has_unsigned_properties: unsigned.is_some(),
        has_unsigned_data_object_properties,
        unsigned_signature_properties,
    })
}

fn parse_signing_cert_ref(node: Node, xades: &str) -> Result<SigningCertRef> {
    let cert_digest = child(node, xades, ns::node::CERT_DIGEST)
        .ok_or_else(|| Error::MissingElement("SigningCertificate CertDigest".into()))?;
    let (digest_method, digest_value) = parse_digest_alg_and_value(cert_digest, xades)?;

    let issuer_serial = child(node, xades, ns::node::ISSUER_SERIAL)
        .ok_or_else(|| Error::MissingElement("SigningCertificate IssuerSerial".into()))?;
    let issuer_name = dsig_child(issuer_serial, xades, ns::node::X509_ISSUER_NAME)
        .map(text_of)
        .ok_or_else(|| Error::MissingElement("IssuerSerial X509IssuerName".into()))?;
    let serial_number = dsig_child(issuer_serial, xades, ns::node::X509_SERIAL_NUMBER)
        .map(text_of)
        .ok_or_else(|| Error::MissingElement("IssuerSerial X509SerialNumber".into()))?;

    Ok(SigningCertRef {
        digest_method,
        digest_value,
        issuer_name: issuer_name.trim().to_owned(),
        serial_number: serial_number.trim().to_owned(),
    })
}

fn parse_unsigned_signature_properties(
    node: Node,
    xades: &str,
) -> Result<UnsignedSignatureProperties> {
    let mut props = UnsignedSignatureProperties::default();

    // Optional-single in v1.1.1, a sequence in v1.3.2; iterating covers
    // both cardinalities.
    for revocation_values in children(node, xades, ns::node::REVOCATION_VALUES) {
        if let Some(ocsp_values) = child(revocation_values, xades, ns::node::OCSP_VALUES) {
            for value in children(ocsp_values, xades, ns::node::ENCAPSULATED_OCSP_VALUE) {
                props
                    .ocsp_values
                    .push(decode_base64(text_of(value), "EncapsulatedOCSPValue")?);
            }
        }
    }

    for refs in children(node, xades, ns::node::COMPLETE_REVOCATION_REFS) {
        if let Some(ocsp_refs) = child(refs, xades, ns::node::OCSP_REFS) {
            for ocsp_ref in children(ocsp_refs, xades, ns::node::OCSP_REF) {
                props.ocsp_refs.push(parse_ocsp_ref(ocsp_ref, xades)?);
            }
        }
    }

    Ok(props)
}

fn parse_ocsp_ref(node: Node, xades: &str) -> Result<OcspRef> {
    let identifier = child(node, xades, ns::node::OCSP_IDENTIFIER)
        .ok_or_else(|| Error::MissingElement("OCSPRef OCSPIdentifier".into()))?;
    let produced_at = child(identifier, xades, ns::node::PRODUCED_AT)
        .map(text_of)
        .ok_or_else(|| Error::MissingElement("OCSPIdentifier ProducedAt".into()))?;

    let mut digest_method = None;
    let mut digest_value = None;
    if let Some(alg_and_value) = child(node, xades, ns::node::DIGEST_ALG_AND_VALUE) {
        let (method, value) = parse_digest_alg_and_value(alg_and_value, xades)?;
        digest_method = Some(method);
        digest_value = Some(value);
    }

    Ok(OcspRef {
        produced_at: produced_at.trim().to_owned(),
        digest_method,
        digest_value,
    })
}

/// Parse a `DigestAlgAndValueType` body: `DigestMethod` + `DigestValue`.
fn parse_digest_alg_and_value(node: Node, xades: &str) -> Result<(String, Vec<u8>)> {
    let method_node = dsig_child(node, xades, ns::node::DIGEST_METHOD)
        .ok_or_else(|| Error::MissingElement("DigestMethod".into()))?;
    let method = algorithm_of(method_node, "DigestMethod")?;
    let value_node = dsig_child(node, xades, ns::node::DIGEST_VALUE)
        .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;
    let value = decode_base64(text_of(value_node), "DigestValue")?;
    Ok((method, value))
}

// ── Element navigation ───────────────────────────────────────────────

fn is_named(node: Node, ns_uri: &str, local: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local
        && node.tag_name().namespace().unwrap_or("") == ns_uri
}

fn child<'a>(parent: Node<'a>, ns_uri: &str, local: &str) -> Option<Node<'a>> {
    parent.children().find(|n| is_named(*n, ns_uri, local))
}

fn children<'a>(parent: Node<'a>, ns_uri: &str, local: &str) -> Vec<Node<'a>> {
    parent
        .children()
        .filter(|n| is_named(*n, ns_uri, local))
        .collect()
}

/// Find a child the schema puts in the ds namespace, tolerating producers
/// that left it in the surrounding XAdES namespace.
fn dsig_child<'a>(parent: Node<'a>, xades: &str, local: &str) -> Option<Node<'a>> {
    child(parent, ns::DSIG, local).or_else(|| child(parent, xades, local))
}

fn text_of(node: Node) -> String {
    node.text().unwrap_or("").to_owned()
}

fn algorithm_of(node: Node, what: &str) -> Result<String> {
    node.attribute(ns::attr::ALGORITHM)
        .map(str::to_owned)
        .ok_or_else(|| Error::InvalidStructure(format!("{what} has no Algorithm attribute")))
}

/// Decode xsd:base64Binary text, which may carry arbitrary whitespace.
pub(crate) fn decode_base64(text: impl AsRef<str>, what: &str) -> Result<Vec<u8>> {
    let clean: String = text
        .as_ref()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(clean)
        .map_err(|e| Error::Base64(format!("{what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_tolerates_whitespace() {
        assert_eq!(
            decode_base64("aGVs\n  bG8=", "test").unwrap(),
            b"hello".to_vec()
        );
        assert!(decode_base64("not base64!", "test").is_err());
    }
}
