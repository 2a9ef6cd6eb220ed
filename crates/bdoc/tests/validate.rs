//! End-to-end validation scenarios.
//!
//! Keys and certificates are generated on the fly, signatures are authored
//! with the same canonicalizer the verifier uses, and the OCSP responder
//! is a canned transport, so every cryptographic binding in the pipeline
//! is exercised for real.

use base64::Engine;
use bdoc::{
    CertStatus, CertStore, Configuration, ContainerInfo, Error, OcspConf, SchemaDir, Signature,
    SignatureValidator, X509Cert,
};
use signature::{SignatureEncoding, Signer};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
const XADES111_NS: &str = "http://uri.etsi.org/01903/v1.1.1#";
const XADES132_NS: &str = "http://uri.etsi.org/01903/v1.3.2#";
const SHA1_URI: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
const SHA256_URI: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
const RSA_SHA1_URI: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
const RSA_SHA256_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
const C14N_URI: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
const EXC_C14N_URI: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

const VOTE_CONTENT: &[u8] = b"candidate-42\n";

// ── Key and certificate fixtures ─────────────────────────────────────

struct Fixture {
    ca_der: Vec<u8>,
    signer_key: rsa::RsaPrivateKey,
    signer_der: Vec<u8>,
    responder_key: rsa::RsaPrivateKey,
    responder_der: Vec<u8>,
}

static FIXTURE: OnceLock<Fixture> = OnceLock::new();

fn fixture() -> &'static Fixture {
    FIXTURE.get_or_init(|| {
        let mut rng = rand::thread_rng();
        let ca_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let signer_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let responder_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();

        let ca_subject = "CN=Test CA,O=Validation Exercises";
        let ca_der = build_cert(&ca_key, None, ca_subject, 1, &ca_key);
        let signer_der = build_cert(
            &signer_key,
            Some(ca_subject),
            "CN=Test Signer,O=Validation Exercises",
            7,
            &ca_key,
        );
        let responder_der = build_cert(
            &responder_key,
            Some(ca_subject),
            "CN=Test OCSP Responder,O=Validation Exercises",
            9,
            &ca_key,
        );
        Fixture {
            ca_der,
            signer_key,
            signer_der,
            responder_key,
            responder_der,
        }
    })
}

/// Build a certificate; `issuer` of `None` makes a self-signed root.
fn build_cert(
    key: &rsa::RsaPrivateKey,
    issuer: Option<&str>,
    subject: &str,
    serial: u32,
    issuer_key: &rsa::RsaPrivateKey,
) -> Vec<u8> {
    use der::Encode;
    use rsa::pkcs8::EncodePublicKey;
    use x509_cert::builder::{Builder, CertificateBuilder, Profile};
    use x509_cert::name::Name;
    use x509_cert::serial_number::SerialNumber;
    use x509_cert::spki::SubjectPublicKeyInfoOwned;
    use x509_cert::time::Validity;

    let profile = match issuer {
        None => Profile::Root,
        Some(issuer) => Profile::Leaf {
            issuer: Name::from_str(issuer).unwrap(),
            enable_key_agreement: false,
            enable_key_encipherment: false,
        },
    };
    let spki_der = key.to_public_key().to_public_key_der().unwrap();
    let spki = SubjectPublicKeyInfoOwned::try_from(spki_der.as_bytes()).unwrap();
    let ca_signer = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(issuer_key.clone());
    let builder = CertificateBuilder::new(
        profile,
        SerialNumber::from(serial),
        Validity::from_now(Duration::from_secs(86_400)).unwrap(),
        Name::from_str(subject).unwrap(),
        spki,
        &ca_signer,
    )
    .unwrap();
    builder
        .build::<rsa::pkcs1v15::Signature>()
        .unwrap()
        .to_der()
        .unwrap()
}

fn trust_store() -> CertStore {
    let mut store = CertStore::new();
    store.add_trusted(X509Cert::from_der(&fixture().ca_der).unwrap());
    store
}

fn schema_dir() -> SchemaDir {
    let dir = std::env::temp_dir().join("bdoc-e2e-schema");
    std::fs::create_dir_all(&dir).unwrap();
    for (file, text) in [
        (
            "xmldsig-core-schema.xsd",
            include_str!("../../bdoc-xades/test-data/xmldsig-core-schema.xsd"),
        ),
        (
            "XAdES111.xsd",
            include_str!("../../bdoc-xades/test-data/XAdES111.xsd"),
        ),
        (
            "XAdES.xsd",
            include_str!("../../bdoc-xades/test-data/XAdES.xsd"),
        ),
    ] {
        std::fs::write(dir.join(file), text).unwrap();
    }
    SchemaDir::new(&dir).unwrap()
}

fn b64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn hash(uri: &str, data: &[u8]) -> Vec<u8> {
    bdoc::crypto::digest::digest(uri, data).unwrap()
}

// ── In-memory container ──────────────────────────────────────────────

struct MemoryContainer {
    files: HashMap<String, Vec<u8>>,
    seen: HashMap<String, usize>,
    mismatched: bool,
}

impl MemoryContainer {
    fn new(files: &[(&str, &[u8])]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
            seen: HashMap::new(),
            mismatched: false,
        }
    }
}

impl ContainerInfo for MemoryContainer {
    fn document_count(&self) -> usize {
        self.files.len()
    }

    fn check_documents_begin(&mut self) {
        self.seen.clear();
        self.mismatched = false;
    }

    fn check_document(&mut self, uri: &str, digest_alg_uri: &str, digest_value: &[u8]) {
        match self.files.get(uri) {
            Some(content) => {
                *self.seen.entry(uri.to_owned()).or_insert(0) += 1;
                let computed =
                    bdoc::crypto::digest::digest(digest_alg_uri, content).unwrap_or_default();
                if computed != digest_value {
                    self.mismatched = true;
                }
            }
            None => self.mismatched = true,
        }
    }

    fn check_documents_result(&self) -> bool {
        !self.mismatched && self.files.keys().all(|k| self.seen.get(k) == Some(&1))
    }
}

// ── Signature authoring ──────────────────────────────────────────────

struct BesParams {
    dialect_ns: &'static str,
    c14n_uri: &'static str,
    signature_method: &'static str,
    digest_uri: &'static str,
}

/// Author a complete BES signature document; returns the XML and the
/// base64 SignatureValue.
fn author_bes(params: &BesParams) -> (String, String) {
    finish_bes(bes_template(params), params)
}

/// The document with digest and signature placeholders still unfilled.
fn bes_template(params: &BesParams) -> String {
    let fx = fixture();
    let signer_cert = X509Cert::from_der(&fx.signer_der).unwrap();

    format!(
        "<ds:Signature xmlns:ds=\"{dsig}\" Id=\"S0\">\
         <ds:SignedInfo>\
         <ds:CanonicalizationMethod Algorithm=\"{c14n}\"></ds:CanonicalizationMethod>\
         <ds:SignatureMethod Algorithm=\"{sm}\"></ds:SignatureMethod>\
         <ds:Reference URI=\"/vote.txt\">\
         <ds:DigestMethod Algorithm=\"{du}\"></ds:DigestMethod>\
         <ds:DigestValue>{doc_digest}</ds:DigestValue>\
         </ds:Reference>\
         <ds:Reference Type=\"http://uri.etsi.org/01903#SignedProperties\" URI=\"#S0-SignedProperties\">\
         <ds:DigestMethod Algorithm=\"{du}\"></ds:DigestMethod>\
         <ds:DigestValue>__SP_DIGEST__</ds:DigestValue>\
         </ds:Reference>\
         </ds:SignedInfo>\
         <ds:SignatureValue Id=\"S0-SIG\">__SIGNATURE__</ds:SignatureValue>\
         <ds:KeyInfo><ds:X509Data><ds:X509Certificate>{cert}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>\
         <ds:Object>\
         <QualifyingProperties xmlns=\"{xades}\" Target=\"#S0\">\
         <SignedProperties Id=\"S0-SignedProperties\">\
         <SignedSignatureProperties>\
         <SigningTime>2024-03-01T12:00:00Z</SigningTime>\
         <SigningCertificate><Cert>\
         <CertDigest>\
         <ds:DigestMethod Algorithm=\"{du}\"></ds:DigestMethod>\
         <ds:DigestValue>{cert_digest}</ds:DigestValue>\
         </CertDigest>\
         <IssuerSerial>\
         <ds:X509IssuerName>{issuer}</ds:X509IssuerName>\
         <ds:X509SerialNumber>{serial}</ds:X509SerialNumber>\
         </IssuerSerial>\
         </Cert></SigningCertificate>\
         </SignedSignatureProperties>\
         </SignedProperties>\
         <UnsignedProperties></UnsignedProperties>\
         </QualifyingProperties>\
         </ds:Object>\
         </ds:Signature>",
        dsig = DSIG_NS,
        c14n = params.c14n_uri,
        sm = params.signature_method,
        du = params.digest_uri,
        doc_digest = b64(&hash(params.digest_uri, VOTE_CONTENT)),
        cert = b64(&fx.signer_der),
        xades = params.dialect_ns,
        cert_digest = b64(&hash(params.digest_uri, &fx.signer_der)),
        issuer = signer_cert.issuer_name(),
        serial = signer_cert.serial_decimal(),
    )
}

/// Fill the SignedProperties digest and sign the SignedInfo.
fn finish_bes(template: String, params: &BesParams) -> (String, String) {
    let fx = fixture();
    let sp_digest = b64(&subtree_digest(
        &template,
        params,
        params.dialect_ns,
        "SignedProperties",
    ));
    let with_sp = template.replace("__SP_DIGEST__", &sp_digest);

    let signed_info = subtree_c14n(&with_sp, params, DSIG_NS, "SignedInfo");
    let sig_bytes = match params.signature_method {
        RSA_SHA1_URI => rsa::pkcs1v15::SigningKey::<sha1::Sha1>::new(fx.signer_key.clone())
            .sign(&signed_info)
            .to_vec(),
        _ => rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(fx.signer_key.clone())
            .sign(&signed_info)
            .to_vec(),
    };
    let sig_b64 = b64(&sig_bytes);
    (with_sp.replace("__SIGNATURE__", &sig_b64), sig_b64)
}

fn subtree_c14n(xml: &str, params: &BesParams, ns_uri: &str, local: &str) -> Vec<u8> {
    let doc = roxmltree::Document::parse(xml).unwrap();
    let node = doc
        .descendants()
        .find(|n| {
            n.is_element()
                && n.tag_name().name() == local
                && n.tag_name().namespace().unwrap_or("") == ns_uri
        })
        .unwrap();
    let set = bdoc::xml::NodeSet::tree_without_comments(node);
    let mode = bdoc::c14n::C14nMode::from_uri(params.c14n_uri).unwrap();
    let prefixes = if mode.is_exclusive() {
        vec!["ds".to_owned()]
    } else {
        Vec::new()
    };
    bdoc::c14n::canonicalize_doc(&doc, mode, Some(&set), &prefixes).unwrap()
}

fn subtree_digest(xml: &str, params: &BesParams, ns_uri: &str, local: &str) -> Vec<u8> {
    hash(params.digest_uri, &subtree_c14n(xml, params, ns_uri, local))
}

// ── Canned OCSP responder ────────────────────────────────────────────

struct StubTransport {
    response: Vec<u8>,
}

impl bdoc::ocsp::OcspTransport for StubTransport {
    fn post(&self, _url: &str, _request_der: &[u8]) -> bdoc::Result<Vec<u8>> {
        Ok(self.response.clone())
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

fn generalized_time_der(compact: &str) -> Vec<u8> {
    let mut tlv = vec![0x18, compact.len() as u8];
    tlv.extend_from_slice(compact.as_bytes());
    tlv
}

fn unix_to_generalized(secs: i64) -> String {
    let days = secs.div_euclid(86_400);
    let rem = secs.rem_euclid(86_400);
    let (y, m, d) = civil_from_days(days);
    format!(
        "{y:04}{m:02}{d:02}{:02}{:02}{:02}Z",
        rem / 3_600,
        (rem % 3_600) / 60,
        rem % 60
    )
}

fn civil_from_days(z: i64) -> (i64, i64, i64) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// Build a signed OCSPResponse with the given nonce and producedAt.
fn build_ocsp_response(nonce: &[u8], produced_at_unix: i64, revoked: bool) -> Vec<u8> {
    use yasna::models::ObjectIdentifier;
    use yasna::Tag;

    let fx = fixture();
    let produced_at = unix_to_generalized(produced_at_unix);
    let time_tlv = generalized_time_der(&produced_at);

    let cert_id = yasna::construct_der(|w| {
        w.write_sequence(|w| {
            w.next().write_sequence(|w| {
                w.next()
                    .write_oid(&ObjectIdentifier::from_slice(&[1, 3, 14, 3, 2, 26]));
                w.next().write_null();
            });
            w.next().write_bytes(&[0u8; 20]);
            w.next().write_bytes(&[0u8; 20]);
            w.next().write_der(&[0x02, 0x01, 0x07]);
        });
    });

    let status_tlv: Vec<u8> = if revoked {
        // revoked [1] IMPLICIT RevokedInfo { revocationTime }
        let mut tlv = vec![0xa1, time_tlv.len() as u8];
        tlv.extend_from_slice(&time_tlv);
        tlv
    } else {
        vec![0x80, 0x00]
    };

    let single = yasna::construct_der(|w| {
        w.write_sequence(|w| {
            w.next().write_der(&cert_id);
            w.next().write_der(&status_tlv);
            w.next().write_der(&time_tlv);
        });
    });

    let nonce_ext_value = yasna::construct_der(|w| w.write_bytes(nonce));

    let tbs = yasna::construct_der(|w| {
        w.write_sequence(|w| {
            // responderID byKey [2]
            w.next()
                .write_tagged(Tag::context(2), |w| w.write_bytes(&[0u8; 20]));
            w.next().write_der(&time_tlv);
            w.next().write_sequence(|w| {
                w.next().write_der(&single);
            });
            // responseExtensions [1] with the nonce
            w.next().write_tagged(Tag::context(1), |w| {
                w.write_sequence(|w| {
                    w.next().write_sequence(|w| {
                        w.next().write_oid(&ObjectIdentifier::from_slice(&[
                            1, 3, 6, 1, 5, 5, 7, 48, 1, 2,
                        ]));
                        w.next().write_bytes(&nonce_ext_value);
                    });
                });
            });
        });
    });

    let signature = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(fx.responder_key.clone())
        .sign(&tbs)
        .to_vec();

    let basic = yasna::construct_der(|w| {
        w.write_sequence(|w| {
            w.next().write_der(&tbs);
            w.next().write_sequence(|w| {
                // sha256WithRSAEncryption
                w.next().write_oid(&ObjectIdentifier::from_slice(&[
                    1, 2, 840, 113_549, 1, 1, 11,
                ]));
                w.next().write_null();
            });
            let bits = signature.len() * 8;
            w.next().write_bitvec_bytes(&signature, bits);
            w.next().write_tagged(Tag::context(0), |w| {
                w.write_sequence(|w| {
                    w.next().write_der(&fx.responder_der);
                });
            });
        });
    });

    yasna::construct_der(|w| {
        w.write_sequence(|w| {
            // responseStatus: successful
            w.next().write_der(&[0x0a, 0x01, 0x00]);
            w.next().write_tagged(Tag::context(0), |w| {
                w.write_sequence(|w| {
                    w.next().write_oid(&ObjectIdentifier::from_slice(&[
                        1, 3, 6, 1, 5, 5, 7, 48, 1, 1,
                    ]));
                    w.next().write_bytes(&basic);
                });
            });
        });
    })
}

fn configuration(store: CertStore) -> Configuration {
    let mut conf = Configuration::new(SHA256_URI, Arc::new(store));
    conf.add_ocsp_conf(
        "Test CA",
        OcspConf {
            url: "http://ocsp.invalid/respond".into(),
            responder_certs: vec![fixture().responder_der.clone()],
            skew: 300,
            max_age: 3_600,
        },
    );
    conf
}

const V132_PARAMS: BesParams = BesParams {
    dialect_ns: XADES132_NS,
    c14n_uri: C14N_URI,
    signature_method: RSA_SHA256_URI,
    digest_uri: SHA256_URI,
};

const V111_PARAMS: BesParams = BesParams {
    dialect_ns: XADES111_NS,
    c14n_uri: EXC_C14N_URI,
    signature_method: RSA_SHA1_URI,
    digest_uri: SHA1_URI,
};

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn valid_bes_v132_validates_offline() {
    let (xml, _) = author_bes(&V132_PARAMS);
    let sig = Signature::parse(&schema_dir(), xml.as_bytes()).unwrap();
    assert_eq!(sig.dialect(), bdoc::Dialect::V132);
    assert!(sig.subject().unwrap().contains("Test Signer"));

    let store = trust_store();
    let mut container = MemoryContainer::new(&[("vote.txt", VOTE_CONTENT)]);
    sig.validate_offline(Some(&store), &mut container).unwrap();
}

#[test]
fn valid_bes_v111_exclusive_sha1_validates_offline() {
    let (xml, _) = author_bes(&V111_PARAMS);
    let sig = Signature::parse(&schema_dir(), xml.as_bytes()).unwrap();
    assert_eq!(sig.dialect(), bdoc::Dialect::V111);

    let store = trust_store();
    let mut container = MemoryContainer::new(&[("vote.txt", VOTE_CONTENT)]);
    sig.validate_offline(Some(&store), &mut container).unwrap();
}

#[test]
fn tampered_document_fails_with_digest_mismatch() {
    let (xml, _) = author_bes(&V132_PARAMS);
    let sig = Signature::parse(&schema_dir(), xml.as_bytes()).unwrap();

    let store = trust_store();
    let mut container = MemoryContainer::new(&[("vote.txt", b"candidate-43\n")]);
    let failure = sig
        .validate_offline(Some(&store), &mut container)
        .unwrap_err();
    assert!(
        failure
            .causes()
            .iter()
            .any(|e| matches!(e, Error::DigestMismatch(_))),
        "causes: {failure}"
    );
}

#[test]
fn tampered_certificate_digest_fails_key_info_binding() {
    // Corrupt the CertDigest in the template, then author a signature
    // that is otherwise fully consistent: only the certificate binding
    // inside SignedProperties is wrong.
    let cert_digest_b64 = b64(&hash(SHA256_URI, &fixture().signer_der));
    let template = bes_template(&V132_PARAMS)
        .replace(&cert_digest_b64, &flip_first_char(&cert_digest_b64));
    let (xml, _) = finish_bes(template, &V132_PARAMS);
    let sig = Signature::parse(&schema_dir(), xml.as_bytes()).unwrap();

    let store = trust_store();
    let mut container = MemoryContainer::new(&[("vote.txt", VOTE_CONTENT)]);
    let failure = sig
        .validate_offline(Some(&store), &mut container)
        .unwrap_err();
    assert!(
        failure
            .causes()
            .iter()
            .any(|e| matches!(e, Error::DigestMismatch(msg) if msg.contains("certificate"))),
        "causes: {failure}"
    );
}

#[test]
fn tampered_signature_value_fails_verification() {
    let (xml, sig_b64) = author_bes(&V132_PARAMS);
    let tampered_b64 = flip_first_char(&sig_b64);
    let tampered = xml.replace(&sig_b64, &tampered_b64);
    let sig = Signature::parse(&schema_dir(), tampered.as_bytes()).unwrap();

    let store = trust_store();
    let mut container = MemoryContainer::new(&[("vote.txt", VOTE_CONTENT)]);
    let failure = sig
        .validate_offline(Some(&store), &mut container)
        .unwrap_err();
    assert!(
        failure
            .causes()
            .iter()
            .any(|e| matches!(e, Error::SignatureInvalid(_))),
        "causes: {failure}"
    );
}

#[test]
fn unknown_issuer_cn_fails_prepare() {
    let (xml, _) = author_bes(&V132_PARAMS);
    let sig = Signature::parse(&schema_dir(), xml.as_bytes()).unwrap();

    // Configuration without any OCSP entry for "Test CA".
    let conf = Configuration::new(SHA256_URI, Arc::new(trust_store()));
    let mut validator = SignatureValidator::new(&sig, &conf);
    assert!(matches!(
        validator.validate_bes_online(),
        Err(Error::NoOcspResponder(_))
    ));
}

#[test]
fn online_bes_returns_status_and_produced_at() {
    let (xml, _) = author_bes(&V132_PARAMS);
    let sig = Signature::parse(&schema_dir(), xml.as_bytes()).unwrap();
    let conf = configuration(trust_store());

    let nonce = hash(SHA256_URI, sig.signature_value());
    let response = build_ocsp_response(&nonce, unix_now(), false);
    let mut validator = SignatureValidator::new(&sig, &conf)
        .with_transport(Box::new(StubTransport { response }));

    assert_eq!(validator.validate_bes_online().unwrap(), CertStatus::Good);
    assert!(validator.produced_at().ends_with('Z'));
}

#[test]
fn revoked_status_is_returned_not_rejected() {
    let (xml, _) = author_bes(&V132_PARAMS);
    let sig = Signature::parse(&schema_dir(), xml.as_bytes()).unwrap();
    let conf = configuration(trust_store());

    let nonce = hash(SHA256_URI, sig.signature_value());
    let response = build_ocsp_response(&nonce, unix_now(), true);
    let mut validator = SignatureValidator::new(&sig, &conf)
        .with_transport(Box::new(StubTransport { response }));

    // Acting on REVOKED is the caller's policy, not the core's.
    assert_eq!(
        validator.validate_bes_online().unwrap(),
        CertStatus::Revoked
    );
}

#[test]
fn stale_ocsp_response_is_rejected() {
    let (xml, _) = author_bes(&V132_PARAMS);
    let sig = Signature::parse(&schema_dir(), xml.as_bytes()).unwrap();
    let conf = configuration(trust_store());

    let nonce = hash(SHA256_URI, sig.signature_value());
    let response = build_ocsp_response(&nonce, unix_now() - 2 * 86_400, false);
    let mut validator = SignatureValidator::new(&sig, &conf)
        .with_transport(Box::new(StubTransport { response }));

    assert!(matches!(
        validator.validate_bes_online(),
        Err(Error::OcspStale(_))
    ));
}

#[test]
fn wrong_nonce_in_response_is_rejected() {
    let (xml, _) = author_bes(&V132_PARAMS);
    let sig = Signature::parse(&schema_dir(), xml.as_bytes()).unwrap();
    let conf = configuration(trust_store());

    let response = build_ocsp_response(&[0x55; 32], unix_now(), false);
    let mut validator = SignatureValidator::new(&sig, &conf)
        .with_transport(Box::new(StubTransport { response }));

    assert!(matches!(
        validator.validate_bes_online(),
        Err(Error::NonceMismatch(_))
    ));
}

/// The full Time-Mark life cycle: online confirmation, augmentation,
/// re-parse, offline BES + TM verification of the augmented document.
#[test]
fn tm_augmentation_round_trips() {
    let schema = schema_dir();
    let (xml, _) = author_bes(&V132_PARAMS);
    let sig = Signature::parse(&schema, xml.as_bytes()).unwrap();
    let conf = configuration(trust_store());

    let nonce = hash(SHA256_URI, sig.signature_value());
    let response = build_ocsp_response(&nonce, unix_now(), false);
    let mut validator = SignatureValidator::new(&sig, &conf)
        .with_transport(Box::new(StubTransport { response }));
    assert_eq!(validator.validate_bes_online().unwrap(), CertStatus::Good);
    let produced_at = validator.produced_at().to_owned();

    let augmented = validator.get_tm_signature().unwrap();
    assert!(augmented.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));

    // The augmented document is still a valid BES...
    let tm_sig = Signature::parse(&schema, augmented.as_bytes()).unwrap();
    let store = trust_store();
    let mut container = MemoryContainer::new(&[("vote.txt", VOTE_CONTENT)]);
    tm_sig
        .validate_offline(Some(&store), &mut container)
        .unwrap();

    // ...and its Time-Mark verifies offline with the same producedAt.
    let mut tm_validator = SignatureValidator::new(&tm_sig, &conf)
        .with_transport(Box::new(StubTransport { response: Vec::new() }));
    tm_validator.validate_tm_offline().unwrap();
    assert_eq!(tm_validator.produced_at(), produced_at);
    assert_eq!(tm_sig.produced_at().unwrap(), produced_at);
}

#[test]
fn tm_nonce_binding_detects_signature_value_mutation() {
    let schema = schema_dir();
    let (xml, sig_b64) = author_bes(&V132_PARAMS);
    let sig = Signature::parse(&schema, xml.as_bytes()).unwrap();
    let conf = configuration(trust_store());

    let nonce = hash(SHA256_URI, sig.signature_value());
    let response = build_ocsp_response(&nonce, unix_now(), false);
    let mut validator = SignatureValidator::new(&sig, &conf)
        .with_transport(Box::new(StubTransport { response }));
    validator.validate_bes_online().unwrap();
    let augmented = validator.get_tm_signature().unwrap();

    // Mutate the SignatureValue inside the augmented document.
    let tampered = augmented.replace(&sig_b64, &flip_first_char(&sig_b64));
    let tm_sig = Signature::parse(&schema, tampered.as_bytes()).unwrap();
    let mut tm_validator = SignatureValidator::new(&tm_sig, &conf)
        .with_transport(Box::new(StubTransport { response: Vec::new() }));
    assert!(matches!(
        tm_validator.validate_tm_offline(),
        Err(Error::NonceMismatch(_))
    ));
}

#[test]
fn tm_ocsp_ref_binding_detects_reference_mutation() {
    let schema = schema_dir();
    let (xml, _) = author_bes(&V132_PARAMS);
    let sig = Signature::parse(&schema, xml.as_bytes()).unwrap();
    let conf = configuration(trust_store());

    let nonce = hash(SHA256_URI, sig.signature_value());
    let response = build_ocsp_response(&nonce, unix_now(), false);
    let mut validator = SignatureValidator::new(&sig, &conf)
        .with_transport(Box::new(StubTransport { response }));
    validator.validate_bes_online().unwrap();
    let augmented = validator.get_tm_signature().unwrap();

    // Corrupt the OCSPRef digest so it no longer matches the (intact)
    // encapsulated response.
    let ref_digest_b64 = b64(&hash(SHA256_URI, validator.ocsp_response()));
    let tampered = augmented.replace(&ref_digest_b64, &flip_first_char(&ref_digest_b64));
    assert_ne!(tampered, augmented);

    let tm_sig = Signature::parse(&schema, tampered.as_bytes()).unwrap();
    let mut tm_validator = SignatureValidator::new(&tm_sig, &conf)
        .with_transport(Box::new(StubTransport { response: Vec::new() }));
    assert!(matches!(
        tm_validator.validate_tm_offline(),
        Err(Error::OcspRefMismatch(_))
    ));
}

#[test]
fn tm_augmentation_round_trips_for_v111() {
    let schema = schema_dir();
    let (xml, _) = author_bes(&V111_PARAMS);
    let sig = Signature::parse(&schema, xml.as_bytes()).unwrap();
    let conf = configuration(trust_store());

    let nonce = hash(SHA256_URI, sig.signature_value());
    let response = build_ocsp_response(&nonce, unix_now(), false);
    let mut validator = SignatureValidator::new(&sig, &conf)
        .with_transport(Box::new(StubTransport { response }));
    assert_eq!(validator.validate_bes_online().unwrap(), CertStatus::Good);

    let augmented = validator.get_tm_signature().unwrap();
    let tm_sig = Signature::parse(&schema, augmented.as_bytes()).unwrap();
    assert_eq!(tm_sig.dialect(), bdoc::Dialect::V111);

    let store = trust_store();
    let mut container = MemoryContainer::new(&[("vote.txt", VOTE_CONTENT)]);
    tm_sig
        .validate_offline(Some(&store), &mut container)
        .unwrap();

    let mut tm_validator = SignatureValidator::new(&tm_sig, &conf)
        .with_transport(Box::new(StubTransport { response: Vec::new() }));
    tm_validator.validate_tm_offline().unwrap();
}

fn flip_first_char(b64: &str) -> String {
    let replacement = if b64.starts_with('A') { "B" } else { "A" };
    format!("{replacement}{}", &b64[1..])
}
