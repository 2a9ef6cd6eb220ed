#![forbid(unsafe_code)]

//! HTTP transport for OCSP exchanges.

use bdoc_core::{Error, Result};
use std::time::Duration;

/// Sends a DER-encoded OCSP request and returns the raw response body.
///
/// The production implementation posts over HTTP; tests substitute a
/// canned responder.
pub trait OcspTransport: Send + Sync {
    fn post(&self, url: &str, request_der: &[u8]) -> Result<Vec<u8>>;
}

/// Blocking HTTP POST transport.
pub struct HttpTransport {
    http: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client build");
        Self { http }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl OcspTransport for HttpTransport {
    fn post(&self, url: &str, request_der: &[u8]) -> Result<Vec<u8>> {
        log::debug!("posting OCSP request ({} bytes) to {url}", request_der.len());
        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/ocsp-request")
            .body(request_der.to_vec())
            .send()
            .map_err(|e| Error::Http(format!("{url}: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "{url}: responder returned HTTP {}",
                response.status()
            )));
        }
        let body = response
            .bytes()
            .map_err(|e| Error::Http(format!("{url}: {e}")))?;
        Ok(body.to_vec())
    }
}
