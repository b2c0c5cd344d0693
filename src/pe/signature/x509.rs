//! X.509 certificates as carried in PKCS#7 SignedData.
//!
//! Only the fields needed for Authenticode checks are decoded: serial,
//! issuer, subject, validity and the subject public key. Extensions are
//! kept in the raw DER but not interpreted.

use chrono::{NaiveDate, NaiveDateTime};
use der::asn1::Any;
use der::{Decode, Encode, Tag, Tagged};
use ed25519_dalek::{Signature as Ed25519Signature, Verifier, VerifyingKey};
use log::trace;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use serde::Serialize;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use std::fmt;
use x509_cert::certificate::Version;
use x509_cert::time::Time;

use super::algorithms::{DigestAlgorithm, KeyAlgorithm};
use crate::exceptions::{ForgeError, Result};
use crate::pe::constants::{NAME_ATTRIBUTES, OID_ED25519, OID_RSA_ENCRYPTION};
use crate::utils::{colon_hex, hex_bytes, serial_hex};

/// Distinguished name; equality is on the DER encoding
#[derive(Debug, Clone, Serialize)]
pub struct Name {
    #[serde(skip)]
    raw: Vec<u8>,
    #[serde(skip)]
    attributes: Vec<(String, String)>,
    #[serde(rename = "name")]
    rendered: String,
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Name {}

impl std::hash::Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl Name {
    pub(crate) fn from_x509(name: &x509_cert::name::Name) -> Result<Self> {
        let attributes: Vec<(String, String)> = name
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .map(|atv| (atv.oid.to_string(), directory_string(&atv.value)))
            .collect();
        let rendered = render_name(&attributes);
        Ok(Name {
            raw: name.to_der()?,
            attributes,
            rendered,
        })
    }

    /// DER encoding of the whole Name
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// (OID, value) pairs in encoding order
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// First value for an attribute OID
    pub fn get(&self, oid: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(o, _)| o == oid)
            .map(|(_, v)| v.as_str())
    }

    pub fn common_name(&self) -> Option<&str> {
        self.get("2.5.4.3")
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// Directory string value as text; unknown string types fall back to hex
fn directory_string(value: &Any) -> String {
    match value.tag() {
        Tag::Utf8String
        | Tag::PrintableString
        | Tag::TeletexString
        | Tag::Ia5String
        | Tag::VisibleString => String::from_utf8_lossy(value.value()).into_owned(),
        Tag::BmpString => decode_bmp(value.value()),
        _ => hex::encode(value.value()),
    }
}

/// UTF-16BE as used by BMPString
pub(crate) fn decode_bmp(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// UTCTime / GeneralizedTime as a naive UTC timestamp
pub(crate) fn naive_time(time: &Time) -> Result<NaiveDateTime> {
    let dt = time.to_date_time();
    NaiveDate::from_ymd_opt(i32::from(dt.year()), u32::from(dt.month()), u32::from(dt.day()))
        .and_then(|d| {
            d.and_hms_opt(
                u32::from(dt.hour()),
                u32::from(dt.minutes()),
                u32::from(dt.seconds()),
            )
        })
        .ok_or_else(|| ForgeError::MalformedEncoding(format!("invalid date {dt}")))
}

fn render_name(attributes: &[(String, String)]) -> String {
    attributes
        .iter()
        .map(|(oid, value)| {
            let label = NAME_ATTRIBUTES
                .iter()
                .find(|(o, _)| o == oid)
                .map(|(_, l)| *l)
                .unwrap_or(oid.as_str());
            format!("{label}={value}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Subject public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "algorithm", rename_all = "lowercase")]
pub enum PublicKey {
    /// PKCS#1 RSAPublicKey DER
    Rsa {
        #[serde(serialize_with = "hex_bytes::serialize")]
        der: Vec<u8>,
    },
    Ed25519 {
        #[serde(serialize_with = "hex_bytes::serialize")]
        key: Vec<u8>,
    },
    Other {
        oid: String,
        #[serde(serialize_with = "hex_bytes::serialize")]
        key: Vec<u8>,
    },
}

impl PublicKey {
    fn from_spki(oid: String, key: &[u8]) -> Self {
        match oid.as_str() {
            OID_RSA_ENCRYPTION => PublicKey::Rsa { der: key.to_vec() },
            OID_ED25519 => PublicKey::Ed25519 { key: key.to_vec() },
            _ => PublicKey::Other {
                oid,
                key: key.to_vec(),
            },
        }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            PublicKey::Rsa { .. } => KeyAlgorithm::Rsa,
            PublicKey::Ed25519 { .. } => KeyAlgorithm::Ed25519,
            PublicKey::Other { oid, .. } => KeyAlgorithm::from_oid(oid),
        }
    }

    /// Check `signature` over a precomputed `digest`.
    ///
    /// RSA keys verify PKCS#1 v1.5 with the DigestInfo prefix of `algorithm`.
    /// Ed25519 keys verify the digest bytes as the message. `Ok(false)` means
    /// the signature does not match; errors mean the check could not run.
    pub fn verify_digest(
        &self,
        algorithm: DigestAlgorithm,
        digest: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        match self {
            PublicKey::Rsa { der } => {
                let scheme = match algorithm {
                    DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
                    DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
                    DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
                    DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
                    other => {
                        return Err(ForgeError::UnsupportedAlgorithm(format!(
                            "RSA with {other}"
                        )));
                    }
                };
                let key = RsaPublicKey::from_pkcs1_der(der).map_err(|e| {
                    ForgeError::MalformedEncoding(format!("RSA public key: {e}"))
                })?;
                Ok(key.verify(scheme, digest, signature).is_ok())
            }
            PublicKey::Ed25519 { key } => {
                let bytes: [u8; 32] = key.as_slice().try_into().map_err(|_| {
                    ForgeError::MalformedEncoding(format!(
                        "Ed25519 key must be 32 bytes, got {}",
                        key.len()
                    ))
                })?;
                let verifying_key = VerifyingKey::from_bytes(&bytes).map_err(|e| {
                    ForgeError::MalformedEncoding(format!("Ed25519 public key: {e}"))
                })?;
                match Ed25519Signature::from_slice(signature) {
                    Ok(sig) => Ok(verifying_key.verify(digest, &sig).is_ok()),
                    Err(_) => Ok(false),
                }
            }
            PublicKey::Other { oid, .. } => Err(ForgeError::UnsupportedAlgorithm(format!(
                "public key algorithm {oid}"
            ))),
        }
    }
}

/// Decoded X.509 certificate
#[derive(Debug, Clone, Serialize)]
pub struct Certificate {
    pub(crate) version: u32,
    #[serde(serialize_with = "serial_hex::serialize")]
    pub(crate) serial_number: Vec<u8>,
    pub(crate) signature_algorithm: String,
    pub(crate) issuer: Name,
    pub(crate) subject: Name,
    pub(crate) valid_from: NaiveDateTime,
    pub(crate) valid_to: NaiveDateTime,
    pub(crate) public_key: PublicKey,
    #[serde(skip)]
    pub(crate) raw: Vec<u8>,
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Certificate {}

impl Certificate {
    /// Decode a standalone DER certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let cert = x509_cert::Certificate::from_der(der)
            .map_err(|e| ForgeError::MalformedEncoding(format!("Certificate: {e}")))?;
        Self::from_x509(&cert, der.to_vec())
    }

    /// Build from a decoded certificate; `raw` is its DER encoding
    pub(crate) fn from_x509(cert: &x509_cert::Certificate, raw: Vec<u8>) -> Result<Self> {
        let tbs = &cert.tbs_certificate;
        let version = match tbs.version {
            Version::V1 => 1,
            Version::V2 => 2,
            Version::V3 => 3,
        };
        let serial_number = tbs.serial_number.as_bytes().to_vec();
        let spki = &tbs.subject_public_key_info;
        let key_bits = spki.subject_public_key.as_bytes().ok_or_else(|| {
            ForgeError::MalformedEncoding("subjectPublicKey has unused bits".into())
        })?;
        let public_key = PublicKey::from_spki(spki.algorithm.oid.to_string(), key_bits);
        let subject = Name::from_x509(&tbs.subject)?;

        trace!(
            "Certificate serial={} subject='{}' key={}",
            colon_hex(&serial_number),
            subject,
            public_key.algorithm()
        );

        Ok(Certificate {
            version,
            serial_number,
            signature_algorithm: tbs.signature.oid.to_string(),
            issuer: Name::from_x509(&tbs.issuer)?,
            subject,
            valid_from: naive_time(&tbs.validity.not_before)?,
            valid_to: naive_time(&tbs.validity.not_after)?,
            public_key,
            raw,
        })
    }

    /// X.509 version (1, 2 or 3)
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Serial number contents octets as encoded
    pub fn serial_number(&self) -> &[u8] {
        &self.serial_number
    }

    /// OID of the issuer's signature algorithm
    pub fn signature_algorithm(&self) -> &str {
        &self.signature_algorithm
    }

    pub fn issuer(&self) -> &Name {
        &self.issuer
    }

    pub fn subject(&self) -> &Name {
        &self.subject
    }

    pub fn valid_from(&self) -> NaiveDateTime {
        self.valid_from
    }

    pub fn valid_to(&self) -> NaiveDateTime {
        self.valid_to
    }

    pub fn is_valid_at(&self, when: NaiveDateTime) -> bool {
        self.valid_from <= when && when <= self.valid_to
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Issuer and serial match, serials compared by magnitude
    pub fn matches(&self, issuer: &Name, serial: &[u8]) -> bool {
        self.issuer == *issuer && strip_sign_byte(&self.serial_number) == strip_sign_byte(serial)
    }
}

fn strip_sign_byte(serial: &[u8]) -> &[u8] {
    match serial {
        [0, rest @ ..] if !rest.is_empty() => rest,
        other => other,
    }
}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Version:       {}", self.version)?;
        writeln!(f, "Serial Number: {}", colon_hex(&self.serial_number))?;
        writeln!(f, "Signature Alg: {}", self.signature_algorithm)?;
        writeln!(f, "Valid from:    {}", self.valid_from)?;
        writeln!(f, "Valid to:      {}", self.valid_to)?;
        writeln!(f, "Issuer:        {}", self.issuer)?;
        writeln!(f, "Subject:       {}", self.subject)?;
        write!(f, "Key:           {}", self.public_key.algorithm())
    }
}
