#![forbid(unsafe_code)]

//! The `Signature` entity and its offline BES validation.
//!
//! A `Signature` owns the parsed model and the original document text.
//! Every digest is recomputed by canonicalizing a subtree of a fresh
//! re-parse of that text; the model itself is never serialized.

use crate::config::SchemaDir;
use crate::container::ContainerInfo;
use crate::model::{
    Dialect, QualifyingProperties, SignatureModel, UnsignedSignatureProperties,
};
use bdoc_c14n::C14nMode;
use bdoc_core::{algorithm, ns, Error, Result, ValidationFailure};
use bdoc_crypto::{digest, sign::SignatureMethod};
use bdoc_x509::{CertStore, X509Cert};
use bdoc_xml::{NodeSet, XmlDocument};

/// A parsed XAdES signature bound to its original bytes.
#[derive(Debug)]
pub struct Signature {
    document: XmlDocument,
    model: SignatureModel,
    dialect: Dialect,
}

impl Signature {
    /// Parse a signature document.
    ///
    /// The dialect is determined by the namespace of the single
    /// `QualifyingProperties` block; a document carrying both dialects is
    /// rejected.
    pub fn parse(schema: &SchemaDir, data: &[u8]) -> Result<Self> {
        let (document, model, dialect) = crate::parse::parse_signature(schema, data)?;
        log::debug!(
            "parsed {} signature with {} references",
            match dialect {
                Dialect::V111 => "XAdES v1.1.1",
                Dialect::V132 => "XAdES v1.3.2",
            },
            model.signed_info.references.len()
        );
        Ok(Self {
            document,
            model,
            dialect,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn model(&self) -> &SignatureModel {
        &self.model
    }

    /// The original document text.
    pub fn xml(&self) -> &str {
        self.document.text()
    }

    pub(crate) fn document(&self) -> &XmlDocument {
        &self.document
    }

    /// The decoded SignatureValue bytes.
    pub fn signature_value(&self) -> &[u8] {
        &self.model.signature_value
    }

    /// Subject DN of the signing certificate.
    pub fn subject(&self) -> Result<String> {
        Ok(self.signing_certificate()?.subject_name())
    }

    /// The unique signing certificate out of `KeyInfo/X509Data`.
    pub fn signing_certificate(&self) -> Result<X509Cert> {
        let key_info = self
            .model
            .key_info
            .as_ref()
            .ok_or_else(|| Error::MissingElement("Signature does not contain signer certificate".into()))?;
        if key_info.is_empty() {
            return Err(Error::MissingElement(
                "Signature does not contain signer certificate".into(),
            ));
        }
        if key_info.len() != 1 {
            return Err(Error::InvalidStructure(
                "Signature contains more than one signer certificate".into(),
            ));
        }
        let certs = &key_info[0].certificates;
        if certs.is_empty() {
            return Err(Error::MissingElement(
                "Signature does not contain signer certificate".into(),
            ));
        }
        if certs.len() != 1 {
            return Err(Error::InvalidStructure(
                "Signature contains more than one signer certificate".into(),
            ));
        }
        X509Cert::from_der(&certs[0])
    }

    /// Run the offline BES checks.
    ///
    /// Three independent groups run to completion so the caller sees every
    /// defect at once: the qualifying-properties structure, the
    /// algorithmic integrity of references and the signature value, and
    /// the trust of the signing certificate.
    pub fn validate_offline(
        &self,
        store: Option<&CertStore>,
        container: &mut dyn ContainerInfo,
    ) -> std::result::Result<(), ValidationFailure> {
        let mut failure = ValidationFailure::new();
        failure.add(self.check_qualifying_properties());
        failure.add(self.check_integrity(container));
        failure.add(self.check_signing_certificate(store));
        failure.into_result()
    }

    // ── Group A: qualifying properties ───────────────────────────────

    fn check_qualifying_properties(&self) -> Result<()> {
        let qp = self.the_qualifying_properties()?;

        let id = self
            .model
            .id
            .as_deref()
            .ok_or_else(|| Error::InvalidStructure(
                "Signature element mandatory attribute 'Id' is missing".into(),
            ))?;
        if id.is_empty() {
            return Err(Error::InvalidStructure(
                "Signature element mandatory attribute 'Id' is empty".into(),
            ));
        }
        let expected_target = format!("#{id}");
        if qp.target.as_deref() != Some(expected_target.as_str()) {
            return Err(Error::InvalidStructure(
                "QualifyingProperties target is not Signature".into(),
            ));
        }

        if !qp.has_signed_properties {
            return Err(Error::MissingElement(
                "QualifyingProperties block 'SignedProperties' is missing".into(),
            ));
        }

        match self.dialect {
            Dialect::V132 => {
                if qp.has_signature_policy {
                    return Err(Error::InvalidStructure(
                        "Signature policy is not valid".into(),
                    ));
                }
            }
            Dialect::V111 => {
                // Read but never enforced in the v1.1.1 profile.
                if qp.has_signature_policy {
                    log::warn!("v1.1.1 signature carries a SignaturePolicyIdentifier; ignoring");
                }
            }
        }

        if qp.has_unsigned_data_object_properties {
            return Err(Error::InvalidStructure(
                "unexpected UnsignedDataObjectProperties in Signature".into(),
            ));
        }
        Ok(())
    }

    // ── Group B: algorithmic integrity ───────────────────────────────

    fn check_integrity(&self, container: &mut dyn ContainerInfo) -> Result<()> {
        self.check_signature_method()?;
        self.check_references(container)?;
        self.check_key_info()?;
        self.check_signature_value()
    }

    fn check_signature_method(&self) -> Result<()> {
        SignatureMethod::from_uri(&self.model.signed_info.signature_method).map(|_| ())
    }

    fn check_references(&self, container: &mut dyn ContainerInfo) -> Result<()> {
        let references = &self.model.signed_info.references;
        let expected = container.document_count() + 1;
        if references.len() != expected {
            return Err(Error::InvalidStructure(format!(
                "Number of references in SignedInfo is invalid: found {}, expected {expected}",
                references.len()
            )));
        }

        let mut got_signed_properties_ref = false;
        for reference in references {
            if reference.is_signed_properties_ref() {
                if got_signed_properties_ref {
                    return Err(Error::InvalidStructure(
                        "SignedInfo element refers to more than one SignedProperties".into(),
                    ));
                }
                got_signed_properties_ref = true;
                self.check_signed_properties_ref(reference)?;
            }
        }
        if !got_signed_properties_ref {
            return Err(Error::InvalidStructure(
                "SignedInfo does not contain reference to SignedProperties".into(),
            ));
        }

        container.check_documents_begin();
        for reference in references {
            if reference.is_signed_properties_ref() {
                continue;
            }
            let uri = reference.uri.as_deref().ok_or_else(|| {
                Error::InvalidStructure(
                    "Document reference is missing attribute 'URI'".into(),
                )
            })?;
            // Manifest entries carry no leading slash.
            let uri = uri.strip_prefix('/').unwrap_or(uri);
            container.check_document(uri, &reference.digest_method, &reference.digest_value);
        }
        if !container.check_documents_result() {
            return Err(Error::DigestMismatch(
                "Document references didn't match".into(),
            ));
        }
        Ok(())
    }

    fn check_signed_properties_ref(&self, reference: &crate::model::Reference) -> Result<()> {
        if reference.uri.is_none() {
            return Err(Error::InvalidStructure(
                "SignedInfo reference to SignedProperties does not have attribute 'URI'".into(),
            ));
        }
        if !digest::is_supported(&reference.digest_method) {
            return Err(Error::UnsupportedAlgorithm(format!(
                "reference to SignedProperties digest method: {}",
                reference.digest_method
            )));
        }
        let computed = self.digest_subtree(
            &reference.digest_method,
            self.dialect.xades_ns(),
            ns::node::SIGNED_PROPERTIES,
        )?;
        if computed.len() != reference.digest_value.len() {
            return Err(Error::DigestMismatch(
                "SignedProperties digest lengths do not match".into(),
            ));
        }
        if computed != reference.digest_value {
            return Err(Error::DigestMismatch(
                "SignedProperties digest values do not match".into(),
            ));
        }
        Ok(())
    }

    fn check_key_info(&self) -> Result<()> {
        let x509 = self.signing_certificate()?;
        let qp = self.the_qualifying_properties()?;

        if !qp.has_signed_properties {
            return Err(Error::MissingElement("SignedProperties not found".into()));
        }
        if qp.signing_certificate.is_empty() {
            return Err(Error::MissingElement("SigningCertificate not found".into()));
        }
        if qp.signing_certificate.len() != 1 {
            return Err(Error::InvalidStructure(format!(
                "Number of SigningCertificates is {}, must be 1",
                qp.signing_certificate.len()
            )));
        }
        let cert_ref = &qp.signing_certificate[0];

        if !digest::is_supported(&cert_ref.digest_method) {
            return Err(Error::UnsupportedAlgorithm(format!(
                "signing certificate digest: {}",
                cert_ref.digest_method
            )));
        }

        if !x509.issuer_matches(&cert_ref.issuer_name)
            || x509.serial_decimal() != cert_ref.serial_number
        {
            return Err(Error::InvalidStructure(
                "Signing certificate issuer information invalid".into(),
            ));
        }

        let mut calc = digest::from_uri(&cert_ref.digest_method)?;
        calc.update(x509.as_der());
        let size = calc.size();
        let computed = calc.finalize();
        if cert_ref.digest_value.len() != size {
            return Err(Error::DigestMismatch(
                "Wrong length for signing certificate digest".into(),
            ));
        }
        if computed != cert_ref.digest_value {
            return Err(Error::DigestMismatch(
                "Signing certificate digest does not match".into(),
            ));
        }
        Ok(())
    }

    fn check_signature_value(&self) -> Result<()> {
        let cert = self.signing_certificate()?;
        let method = SignatureMethod::from_uri(&self.model.signed_info.signature_method)?;
        let digest_value =
            self.digest_subtree(method.digest_uri(), ns::DSIG, ns::node::SIGNED_INFO)?;
        let valid = cert.verify_signature(
            method.digest_uri(),
            &digest_value,
            &self.model.signature_value,
        )?;
        if !valid {
            return Err(Error::SignatureInvalid("Signature is not valid".into()));
        }
        Ok(())
    }

    // ── Group C: trust ───────────────────────────────────────────────

    fn check_signing_certificate(&self, store: Option<&CertStore>) -> Result<()> {
        let cert = self.signing_certificate()?;
        let store = store.ok_or_else(|| {
            Error::CertificateUntrusted(format!(
                "Unable to verify signing certificate {}",
                cert.subject_name()
            ))
        })?;
        store.verify(&cert).map_err(|e| {
            Error::CertificateUntrusted(format!(
                "Unable to verify signing certificate {}: {e}",
                cert.subject_name()
            ))
        })
    }

    // ── Canonicalization and digests ─────────────────────────────────

    /// Canonicalize the unique (namespace, local-name) subtree of a fresh
    /// re-parse of the original text and stream it into a digest.
    pub(crate) fn digest_subtree(
        &self,
        digest_uri: &str,
        ns_uri: &str,
        local_name: &str,
    ) -> Result<Vec<u8>> {
        let mut calc = digest::from_uri(digest_uri)?;
        let doc = self.document.parse_doc()?;
        let node = XmlDocument::find_unique(&doc, ns_uri, local_name)?;
        let (mode, prefixes) = self.c14n_dispatch()?;
        let set = if mode.with_comments() {
            NodeSet::tree_with_comments(node)
        } else {
            NodeSet::tree_without_comments(node)
        };
        let bytes = bdoc_c14n::canonicalize_doc(&doc, mode, Some(&set), &prefixes)?;
        bdoc_c14n::for_each_chunk(&bytes, |chunk| calc.update(chunk));
        Ok(calc.finalize())
    }

    /// Map the SignedInfo canonicalization method to a mode and prefix
    /// list.
    ///
    /// Exclusive canonicalization always carries the `ds` prefix in its
    /// inclusive list for interoperability with deployed signers, whether
    /// or not the signature says so.
    fn c14n_dispatch(&self) -> Result<(C14nMode, Vec<String>)> {
        let uri = &self.model.signed_info.canonicalization_method;
        match uri.as_str() {
            algorithm::C14N => Ok((C14nMode::Inclusive, Vec::new())),
            algorithm::C14N_WITH_COMMENTS => Ok((C14nMode::InclusiveWithComments, Vec::new())),
            algorithm::EXC_C14N => Ok((C14nMode::Exclusive, vec!["ds".to_owned()])),
            algorithm::C14N11 => Ok((C14nMode::Inclusive11, Vec::new())),
            algorithm::C14N11_WITH_COMMENTS => {
                Ok((C14nMode::Inclusive11WithComments, Vec::new()))
            }
            _ => Err(Error::UnsupportedAlgorithm(format!(
                "SignedInfo canonicalization method: {uri}"
            ))),
        }
    }

    // ── Variant navigation ───────────────────────────────────────────

    fn the_qualifying_properties(&self) -> Result<&QualifyingProperties> {
        if self.model.qualifying_properties.len() != 1 {
            return Err(Error::InvalidStructure(format!(
                "Number of QualifyingProperties is {}, must be 1",
                self.model.qualifying_properties.len()
            )));
        }
        Ok(&self.model.qualifying_properties[0])
    }

    fn unsigned_signature_properties(&self) -> Result<&UnsignedSignatureProperties> {
        let qp = self.the_qualifying_properties()?;
        if !qp.has_unsigned_properties {
            return Err(Error::MissingElement("UnsignedProperties".into()));
        }
        qp.unsigned_signature_properties
            .as_ref()
            .ok_or_else(|| Error::MissingElement("UnsignedSignatureProperties".into()))
    }

    /// The encapsulated OCSP response bytes of a TM signature.
    pub fn ocsp_response_value(&self) -> Result<Vec<u8>> {
        self.unsigned_signature_properties()?
            .ocsp_values
            .first()
            .cloned()
            .ok_or_else(|| Error::MissingElement("RevocationValues".into()))
    }

    /// `OCSPIdentifier/ProducedAt` of the first OCSPRef.
    pub fn produced_at(&self) -> Result<String> {
        self.unsigned_signature_properties()?
            .ocsp_refs
            .first()
            .map(|r| r.produced_at.clone())
            .ok_or_else(|| Error::MissingElement("CompleteRevocationRefs OCSPRef".into()))
    }

    /// Digest algorithm named by the first OCSPRef.
    pub fn ocsp_digest_algorithm(&self) -> Result<String> {
        self.unsigned_signature_properties()?
            .ocsp_refs
            .first()
            .and_then(|r| r.digest_method.clone())
            .ok_or_else(|| {
                Error::MissingElement(
                    "CompleteRevocationRefs/OCSPRefs/OCSPRef/DigestAlgAndValue".into(),
                )
            })
    }

    /// Digest value and algorithm of the first OCSPRef.
    pub fn revocation_ocsp_ref(&self) -> Result<(Vec<u8>, String)> {
        let props = self.unsigned_signature_properties()?;
        if let Some(r) = props.ocsp_refs.first() {
            if let (Some(value), Some(method)) = (&r.digest_value, &r.digest_method) {
                return Ok((value.clone(), method.clone()));
            }
        }
        Err(Error::MissingElement(
            "UnsignedProperties/UnsignedSignatureProperties/CompleteRevocationRefs/OCSPRefs/OCSPRef/DigestAlgAndValue".into(),
        ))
    }
}
