#![forbid(unsafe_code)]

//! The parsed signature model.
//!
//! An immutable, plain-data view over one `ds:Signature` document plus its
//! XAdES qualifying properties. Base64 payloads are decoded at parse time;
//! the original bytes stay with the owning `Signature`, and nothing here
//! is ever mutated after parsing.

use bdoc_core::ns;

/// The XAdES dialect a signature was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// XAdES v1.1.1
    V111,
    /// XAdES v1.3.2
    V132,
}

impl Dialect {
    /// The namespace URI of this dialect.
    pub fn xades_ns(&self) -> &'static str {
        match self {
            Dialect::V111 => ns::XADES111,
            Dialect::V132 => ns::XADES132,
        }
    }
}

/// One `ds:Reference` out of SignedInfo.
#[derive(Debug, Clone)]
pub struct Reference {
    pub uri: Option<String>,
    pub ref_type: Option<String>,
    pub digest_method: String,
    pub digest_value: Vec<u8>,
}

impl Reference {
    /// Whether this reference targets the SignedProperties subtree.
    ///
    /// BDOC 1.0 wrote `http://uri.etsi.org/01903#SignedProperties`, XAdES
    /// writes versioned forms; every variant in between is accepted.
    pub fn is_signed_properties_ref(&self) -> bool {
        match &self.ref_type {
            Some(t) => {
                t.starts_with(bdoc_core::algorithm::SIGNED_PROPERTIES_TYPE_PREFIX)
                    && t.ends_with(bdoc_core::algorithm::SIGNED_PROPERTIES_TYPE_SUFFIX)
            }
            None => false,
        }
    }
}

/// `ds:SignedInfo`.
#[derive(Debug, Clone)]
pub struct SignedInfo {
    pub canonicalization_method: String,
    pub signature_method: String,
    pub references: Vec<Reference>,
}

/// `ds:KeyInfo/ds:X509Data`, one entry per X509Data element.
#[derive(Debug, Clone, Default)]
pub struct X509Data {
    /// Decoded DER of each X509Certificate child.
    pub certificates: Vec<Vec<u8>>,
}

/// One `Cert` entry of `SigningCertificate`.
#[derive(Debug, Clone)]
pub struct SigningCertRef {
    pub digest_method: String,
    pub digest_value: Vec<u8>,
    pub issuer_name: String,
    /// Decimal serial as written in `X509SerialNumber`.
    pub serial_number: String,
}

/// One `OCSPRef` of `CompleteRevocationRefs`.
#[derive(Debug, Clone)]
pub struct OcspRef {
    /// `OCSPIdentifier/ProducedAt` as xsd:dateTime text.
    pub produced_at: String,
    pub digest_method: Option<String>,
    pub digest_value: Option<Vec<u8>>,
}

/// `UnsignedSignatureProperties`, reduced to the paths TM validation
/// reads.
#[derive(Debug, Clone, Default)]
pub struct UnsignedSignatureProperties {
    /// Decoded `RevocationValues/OCSPValues/EncapsulatedOCSPValue`
    /// payloads, in document order across all RevocationValues.
    pub ocsp_values: Vec<Vec<u8>>,
    /// `CompleteRevocationRefs/OCSPRefs/OCSPRef` entries, in document
    /// order across all CompleteRevocationRefs.
    pub ocsp_refs: Vec<OcspRef>,
}

/// One `QualifyingProperties` block.
#[derive(Debug, Clone)]
pub struct QualifyingProperties {
    pub target: Option<String>,
    pub has_signed_properties: bool,
    /// `SigningCertificate/Cert` entries; empty when the whole
    /// SigningCertificate element is absent.
    pub signing_certificate: Vec<SigningCertRef>,
    pub has_signature_policy: bool,
    pub has_unsigned_properties: bool,
    pub has_unsigned_data_object_properties: bool,
    pub unsigned_signature_properties: Option<UnsignedSignatureProperties>,
}

/// The whole parsed `ds:Signature`.
#[derive(Debug, Clone)]
pub struct SignatureModel {
    pub id: Option<String>,
    pub signed_info: SignedInfo,
    /// Decoded SignatureValue.
    pub signature_value: Vec<u8>,
    /// KeyInfo, if present.
    pub key_info: Option<Vec<X509Data>>,
    /// The QualifyingProperties blocks of the single Object, all in the
    /// same dialect.
    pub qualifying_properties: Vec<QualifyingProperties>,
}
