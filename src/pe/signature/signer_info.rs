//! PKCS#7 SignerInfo and its authenticated attributes.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

use super::algorithms::{DigestAlgorithm, KeyAlgorithm};
use super::x509::Name;
use crate::utils::{colon_hex, hex_bytes, serial_hex};

/// Decoded authenticated attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Attribute {
    /// PKCS#9 contentType
    ContentType { oid: String },
    /// PKCS#9 messageDigest
    MessageDigest {
        #[serde(serialize_with = "hex_bytes::serialize")]
        digest: Vec<u8>,
    },
    /// PKCS#9 signingTime
    SigningTime { time: NaiveDateTime },
    /// Program name and more-info link shown by Windows
    SpcSpOpusInfo {
        program_name: Option<String>,
        more_info: Option<String>,
    },
    /// Individual or commercial code signing purposes
    SpcStatementType { purposes: Vec<String> },
    /// Anything else, kept as the DER of its value SET
    Generic {
        oid: String,
        #[serde(serialize_with = "hex_bytes::serialize")]
        raw: Vec<u8>,
    },
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::ContentType { oid } => write!(f, "contentType: {oid}"),
            Attribute::MessageDigest { digest } => {
                write!(f, "messageDigest: {}", hex::encode(digest))
            }
            Attribute::SigningTime { time } => write!(f, "signingTime: {time}"),
            Attribute::SpcSpOpusInfo {
                program_name,
                more_info,
            } => write!(
                f,
                "spcSpOpusInfo: {} {}",
                program_name.as_deref().unwrap_or("-"),
                more_info.as_deref().unwrap_or("-")
            ),
            Attribute::SpcStatementType { purposes } => {
                write!(f, "spcStatementType: {}", purposes.join(", "))
            }
            Attribute::Generic { oid, raw } => write!(f, "{oid}: {} bytes", raw.len()),
        }
    }
}

/// One signer of a SignedData
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignerInfo {
    pub(crate) version: u32,
    pub(crate) issuer: Name,
    #[serde(serialize_with = "serial_hex::serialize")]
    pub(crate) serial_number: Vec<u8>,
    pub(crate) digest_algorithm: DigestAlgorithm,
    pub(crate) signature_algorithm: KeyAlgorithm,
    pub(crate) signature_algorithm_oid: String,
    #[serde(serialize_with = "hex_bytes::serialize")]
    pub(crate) encrypted_digest: Vec<u8>,
    pub(crate) authenticated_attributes: Vec<Attribute>,
    pub(crate) unauthenticated_attributes: usize,
}

impl SignerInfo {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn issuer(&self) -> &Name {
        &self.issuer
    }

    pub fn serial_number(&self) -> &[u8] {
        &self.serial_number
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    pub fn signature_algorithm(&self) -> KeyAlgorithm {
        self.signature_algorithm
    }

    pub fn signature_algorithm_oid(&self) -> &str {
        &self.signature_algorithm_oid
    }

    /// The signature value
    pub fn encrypted_digest(&self) -> &[u8] {
        &self.encrypted_digest
    }

    pub fn authenticated_attributes(&self) -> &[Attribute] {
        &self.authenticated_attributes
    }

    /// Number of unauthenticated attributes (timestamps, nested signatures)
    pub fn unauthenticated_attribute_count(&self) -> usize {
        self.unauthenticated_attributes
    }

    pub fn message_digest(&self) -> Option<&[u8]> {
        self.authenticated_attributes.iter().find_map(|a| match a {
            Attribute::MessageDigest { digest } => Some(digest.as_slice()),
            _ => None,
        })
    }

    pub fn signing_time(&self) -> Option<NaiveDateTime> {
        self.authenticated_attributes.iter().find_map(|a| match a {
            Attribute::SigningTime { time } => Some(*time),
            _ => None,
        })
    }

    pub fn program_name(&self) -> Option<&str> {
        self.authenticated_attributes.iter().find_map(|a| match a {
            Attribute::SpcSpOpusInfo { program_name, .. } => program_name.as_deref(),
            _ => None,
        })
    }

    pub fn more_info(&self) -> Option<&str> {
        self.authenticated_attributes.iter().find_map(|a| match a {
            Attribute::SpcSpOpusInfo { more_info, .. } => more_info.as_deref(),
            _ => None,
        })
    }
}

impl fmt::Display for SignerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Issuer:    {}", self.issuer)?;
        writeln!(f, "Serial:    {}", colon_hex(&self.serial_number))?;
        writeln!(
            f,
            "Algorithms: {} / {}",
            self.digest_algorithm, self.signature_algorithm
        )?;
        for attribute in &self.authenticated_attributes {
            writeln!(f, "  {attribute}")?;
        }
        write!(f, "Signature: {} bytes", self.encrypted_digest.len())
    }
}
