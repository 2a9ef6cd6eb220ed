#![forbid(unsafe_code)]

//! Validation configuration: default digest, trust store, schema
//! directory, and per-issuer OCSP responder settings.
//!
//! Loading these from files is the job of the outer layers; the core only
//! consumes the assembled values.

use crate::schema::{SchemaSet, SchemaSource};
use bdoc_core::{ns, Error, Result};
use bdoc_x509::CertStore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// OCSP responder settings for one certificate issuer.
#[derive(Debug, Clone)]
pub struct OcspConf {
    /// Responder endpoint.
    pub url: String,
    /// DER certificates the responder signs with.
    pub responder_certs: Vec<Vec<u8>>,
    /// Permitted clock skew in seconds.
    pub skew: i64,
    /// Maximum acceptable response age in seconds.
    pub max_age: i64,
}

/// Assembled validation configuration.
pub struct Configuration {
    digest_uri: String,
    cert_store: Arc<CertStore>,
    ocsp: HashMap<String, OcspConf>,
}

impl Configuration {
    pub fn new(digest_uri: impl Into<String>, cert_store: Arc<CertStore>) -> Self {
        Self {
            digest_uri: digest_uri.into(),
            cert_store,
            ocsp: HashMap::new(),
        }
    }

    /// Register responder settings under an issuer common name.
    pub fn add_ocsp_conf(&mut self, issuer_cn: impl Into<String>, conf: OcspConf) {
        self.ocsp.insert(issuer_cn.into(), conf);
    }

    /// Default digest URI used for online nonces and TM augmentation.
    pub fn digest_uri(&self) -> &str {
        &self.digest_uri
    }

    pub fn cert_store(&self) -> &CertStore {
        &self.cert_store
    }

    pub fn has_ocsp_conf(&self, issuer_cn: &str) -> bool {
        self.ocsp.contains_key(issuer_cn)
    }

    pub fn get_ocsp_conf(&self, issuer_cn: &str) -> Option<&OcspConf> {
        self.ocsp.get(issuer_cn)
    }
}

/// The three schema files and the namespace each one describes — the
/// namespace-location hints the parser validates against.
const SCHEMA_FILES: [(&str, &str); 3] = [
    ("xmldsig-core-schema.xsd", ns::DSIG),
    ("XAdES111.xsd", ns::XADES111),
    ("XAdES.xsd", ns::XADES132),
];

/// The directory holding the XML-DSig and XAdES schemas.
///
/// Construction reads and interprets all three schema files; the loaded
/// declarations drive the structural validation of every parsed
/// signature document.
#[derive(Debug, Clone)]
pub struct SchemaDir {
    path: PathBuf,
    schemas: SchemaSet,
}

impl SchemaDir {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut texts = Vec::new();
        for (file, _) in SCHEMA_FILES {
            let schema = path.join(file);
            if !schema.is_file() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("schema file missing: {}", schema.display()),
                )));
            }
            texts.push(std::fs::read_to_string(&schema)?);
        }
        let sources: Vec<SchemaSource<'_>> = SCHEMA_FILES
            .iter()
            .zip(&texts)
            .map(|(&(file, namespace), text)| SchemaSource {
                file,
                namespace,
                text: text.as_str(),
            })
            .collect();
        let schemas = SchemaSet::load(&sources)?;
        Ok(Self { path, schemas })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The loaded element declarations.
    pub fn schemas(&self) -> &SchemaSet {
        &self.schemas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixtures(dir: &Path) {
        std::fs::write(
            dir.join("xmldsig-core-schema.xsd"),
            include_str!("../test-data/xmldsig-core-schema.xsd"),
        )
        .unwrap();
        std::fs::write(
            dir.join("XAdES111.xsd"),
            include_str!("../test-data/XAdES111.xsd"),
        )
        .unwrap();
        std::fs::write(dir.join("XAdES.xsd"), include_str!("../test-data/XAdES.xsd"))
            .unwrap();
    }

    #[test]
    fn schema_dir_requires_all_files() {
        let dir = std::env::temp_dir().join(format!("bdoc-schema-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        assert!(SchemaDir::new(&dir).is_err());
        write_fixtures(&dir);
        let schema = SchemaDir::new(&dir).unwrap();
        assert!(!schema.schemas().is_empty());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn schema_dir_rejects_misplaced_namespaces() {
        let dir =
            std::env::temp_dir().join(format!("bdoc-schema-swap-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        write_fixtures(&dir);
        // Swap the two XAdES schemas; the namespace-location hints no
        // longer line up.
        let v111 = std::fs::read(dir.join("XAdES111.xsd")).unwrap();
        let v132 = std::fs::read(dir.join("XAdES.xsd")).unwrap();
        std::fs::write(dir.join("XAdES111.xsd"), v132).unwrap();
        std::fs::write(dir.join("XAdES.xsd"), v111).unwrap();
        assert!(matches!(SchemaDir::new(&dir), Err(Error::XmlParse(_))));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
