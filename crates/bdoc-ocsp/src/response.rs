#![forbid(unsafe_code)]

//! OCSP response parsing (RFC 6960).
//!
//! The parser keeps the raw DER of `tbsResponseData` so the responder
//! signature can be verified bit-exactly, and surfaces only the fields the
//! Time-Mark checks need: certificate status, producedAt, the nonce, and
//! the embedded certificate chain.

use bdoc_core::{Error, Result};
use yasna::models::ObjectIdentifier;
use yasna::Tag;

const OID_BASIC: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 48, 1, 1];
const OID_NONCE: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 48, 1, 2];

/// Certificate status asserted by the responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStatus {
    Good,
    Revoked,
    Unknown,
}

/// A parsed view over one OCSP response.
#[derive(Debug)]
pub struct ParsedResponse {
    pub status: CertStatus,
    /// producedAt as the raw GeneralizedTime digits, e.g. `20240301120000Z`.
    pub produced_at: String,
    /// producedAt as seconds since the Unix epoch.
    pub produced_at_unix: i64,
    /// Nonce from the response extensions, if present.
    pub nonce: Option<Vec<u8>>,
    /// Raw DER of tbsResponseData, the bytes the responder signed.
    pub tbs_der: Vec<u8>,
    /// Signature algorithm OID in dotted form.
    pub signature_alg_oid: String,
    /// Signature bits.
    pub signature: Vec<u8>,
    /// Certificates embedded in the response, as DER.
    pub certs: Vec<Vec<u8>>,
}

impl ParsedResponse {
    /// producedAt as an xsd:dateTime string (`YYYY-MM-DDTHH:MM:SSZ`).
    pub fn produced_at_xsd(&self) -> String {
        generalized_to_xsd(&self.produced_at)
    }
}

/// Parse a DER-encoded OCSPResponse.
pub fn parse_response(data: &[u8]) -> Result<ParsedResponse> {
    let (status_code, response_bytes) = yasna::parse_der(data, |r| {
        r.read_sequence(|r| {
            let status = r.next().read_enum()?;
            let body = r.read_optional(|r| {
                r.read_tagged(Tag::context(0), |r| {
                    r.read_sequence(|r| {
                        let oid = r.next().read_oid()?;
                        let bytes = r.next().read_bytes()?;
                        Ok((oid, bytes))
                    })
                })
            })?;
            Ok((status, body))
        })
    })
    .map_err(|e| Error::DerParse(format!("OCSPResponse: {e}")))?;

    if status_code != 0 {
        return Err(Error::DerParse(format!(
            "OCSP responder status {status_code} (not successful)"
        )));
    }
    let (response_type, basic_der) = response_bytes
        .ok_or_else(|| Error::DerParse("OCSPResponse has no responseBytes".into()))?;
    if response_type != ObjectIdentifier::from_slice(OID_BASIC) {
        return Err(Error::DerParse(format!(
            "unexpected OCSP responseType {response_type}"
        )));
    }

    parse_basic_response(&basic_der)
}

/// Parse a DER-encoded BasicOCSPResponse.
fn parse_basic_response(data: &[u8]) -> Result<ParsedResponse> {
    let (tbs_der, signature_alg_oid, signature, certs) = yasna::parse_der(data, |r| {
        r.read_sequence(|r| {
            let tbs = r.next().read_der()?;
            let alg = r.next().read_sequence(|r| {
                let oid = r.next().read_oid()?;
                let _ = r.read_optional(|r| r.read_null())?;
                Ok(oid)
            })?;
            let (sig, _bits) = r.next().read_bitvec_bytes()?;
            let certs = r.read_optional(|r| {
                r.read_tagged(Tag::context(0), |r| {
                    r.collect_sequence_of(|r| r.read_der())
                })
            })?;
            Ok((tbs, alg, sig, certs))
        })
    })
    .map_err(|e| Error::DerParse(format!("BasicOCSPResponse: {e}")))?;

    let tbs = parse_response_data(&tbs_der)?;

    Ok(ParsedResponse {
        status: tbs.status,
        produced_at: tbs.produced_at.clone(),
        produced_at_unix: unix_from_generalized(&tbs.produced_at)?,
        nonce: tbs.nonce,
        tbs_der,
        signature_alg_oid: signature_alg_oid.to_string(),
        signature,
        certs: certs.unwrap_or_default(),
    })
}

struct ResponseData {
    status: CertStatus,
    produced_at: String,
    nonce: Option<Vec<u8>>,
}

fn parse_response_data(data: &[u8]) -> Result<ResponseData> {
    let (produced_at_tlv, singles, extensions) = yasna::parse_der(data, |r| {
        r.read_sequence(|r| {
            // version [0] EXPLICIT INTEGER DEFAULT v1
            let _version = r.read_optional(|r| {
                r.read_tagged(Tag::context(0), |r| r.read_u32())
            })?;
            // responderID CHOICE { byName [1], byKey [2] }
            let _responder_id = r.next().read_der()?;
            let produced_at = r.next().read_der()?;
            let singles = r.next().collect_sequence_of(|r| r.read_der())?;
            // responseExtensions [1] EXPLICIT Extensions OPTIONAL
            let extensions = r.read_optional(|r| {
                r.read_tagged(Tag::context(1), |r| {
                    r.collect_sequence_of(|r| {
                        r.read_sequence(|r| {
                            let oid = r.next().read_oid()?;
                            let _critical = r.read_optional(|r| r.read_bool())?;
                            let value = r.next().read_bytes()?;
                            Ok((oid, value))
                        })
                    })
                })
            })?;
            Ok((produced_at, singles, extensions))
        })
    })
    .map_err(|e| Error::DerParse(format!("ResponseData: {e}")))?;

    let produced_at = generalized_time_content(&produced_at_tlv)?;

    let single = singles
        .first()
        .ok_or_else(|| Error::DerParse("OCSP response carries no SingleResponse".into()))?;
    let status = parse_single_status(single)?;

    let nonce_oid = ObjectIdentifier::from_slice(OID_NONCE);
    let mut nonce = None;
    for (oid, value) in extensions.unwrap_or_default() {
        if oid == nonce_oid {
            // RFC 6960 wraps the nonce in an inner OCTET STRING; some
            // responders put the raw bytes in extnValue directly.
            nonce = Some(
                yasna::parse_der(&value, |r| r.read_bytes()).unwrap_or(value),
            );
        }
    }

    Ok(ResponseData {
        status,
        produced_at,
        nonce,
    })
}

fn parse_single_status(single_der: &[u8]) -> Result<CertStatus> {
    let status_tlv = yasna::parse_der(single_der, |r| {
        r.read_sequence(|r| {
            let _cert_id = r.next().read_der()?;
            let status = r.next().read_der()?;
            // thisUpdate, then optional nextUpdate / singleExtensions,
            // none of which the Time-Mark checks consume.
            let _this_update = r.next().read_der()?;
            let _ = r.read_optional(|r| r.read_der())?;
            let _ = r.read_optional(|r| r.read_der())?;
            Ok(status)
        })
    })
    .map_err(|e| Error::DerParse(format!("SingleResponse: {e}")))?;

    // certStatus CHOICE: [0] IMPLICIT NULL = good,
    // [1] IMPLICIT RevokedInfo, [2] IMPLICIT NULL = unknown.
    match status_tlv.first() {
        Some(0x80) => Ok(CertStatus::Good),
        Some(0xa1) => Ok(CertStatus::Revoked),
        Some(0x82) => Ok(CertStatus::Unknown),
        other => Err(Error::DerParse(format!(
            "unrecognized certStatus tag {other:?}"
        ))),
    }
}

// ── GeneralizedTime handling ─────────────────────────────────────────

/// Extract `YYYYMMDDHHMMSSZ` content from a GeneralizedTime TLV.
fn generalized_time_content(tlv: &[u8]) -> Result<String> {
    if tlv.len() < 2 || tlv[0] != 0x18 || tlv[1] as usize != tlv.len() - 2 || tlv[1] >= 0x80 {
        return Err(Error::DerParse("malformed GeneralizedTime".into()));
    }
    let content = std::str::from_utf8(&tlv[2..])
        .map_err(|_| Error::DerParse("GeneralizedTime is not ASCII".into()))?;
    Ok(content.to_owned())
}

/// Convert `YYYYMMDDHHMMSSZ` to seconds since the Unix epoch.
pub fn unix_from_generalized(s: &str) -> Result<i64> {
    let digits = s.trim_end_matches('Z');
    if digits.len() < 14 || !digits[..14].bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::DerParse(format!("bad GeneralizedTime: {s}")));
    }
    let num = |range: std::ops::Range<usize>| -> i64 { digits[range].parse().unwrap_or(0) };
    let (year, month, day) = (num(0..4), num(4..6), num(6..8));
    let (hour, minute, second) = (num(8..10), num(10..12), num(12..14));
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(Error::DerParse(format!("bad GeneralizedTime: {s}")));
    }
    Ok(days_from_civil(year, month, day) * 86_400 + hour * 3_600 + minute * 60 + second)
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// `YYYYMMDDHHMMSSZ` → `YYYY-MM-DDTHH:MM:SSZ`.
pub fn generalized_to_xsd(s: &str) -> String {
    let digits = s.trim_end_matches('Z');
    if digits.len() < 14 {
        return s.to_owned();
    }
    format!(
        "{}-{}-{}T{}:{}:{}Z",
        &digits[0..4],
        &digits[4..6],
        &digits[6..8],
        &digits[8..10],
        &digits[10..12],
        &digits[12..14]
    )
}

/// `YYYY-MM-DDTHH:MM:SSZ` → seconds since the Unix epoch.
pub fn unix_from_xsd(s: &str) -> Result<i64> {
    let compact: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    unix_from_generalized(&format!("{compact}Z"))
}
