//! Digest and public-key algorithm identifiers.

use serde::Serialize;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;

use crate::exceptions::{ForgeError, Result};
use crate::pe::constants::*;

/// Digest algorithms that may appear in Authenticode structures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Unknown,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Md5,
    Md4,
    Md2,
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Unknown => write!(f, "unknown"),
            DigestAlgorithm::Sha1 => write!(f, "sha1"),
            DigestAlgorithm::Sha256 => write!(f, "sha256"),
            DigestAlgorithm::Sha384 => write!(f, "sha384"),
            DigestAlgorithm::Sha512 => write!(f, "sha512"),
            DigestAlgorithm::Md5 => write!(f, "md5"),
            DigestAlgorithm::Md4 => write!(f, "md4"),
            DigestAlgorithm::Md2 => write!(f, "md2"),
        }
    }
}

impl DigestAlgorithm {
    pub fn from_oid(oid: &str) -> Self {
        match oid {
            OID_SHA1 => DigestAlgorithm::Sha1,
            OID_SHA256 => DigestAlgorithm::Sha256,
            OID_SHA384 => DigestAlgorithm::Sha384,
            OID_SHA512 => DigestAlgorithm::Sha512,
            OID_MD5 => DigestAlgorithm::Md5,
            OID_MD4 => DigestAlgorithm::Md4,
            OID_MD2 => DigestAlgorithm::Md2,
            _ => DigestAlgorithm::Unknown,
        }
    }

    pub fn oid(self) -> Option<&'static str> {
        match self {
            DigestAlgorithm::Sha1 => Some(OID_SHA1),
            DigestAlgorithm::Sha256 => Some(OID_SHA256),
            DigestAlgorithm::Sha384 => Some(OID_SHA384),
            DigestAlgorithm::Sha512 => Some(OID_SHA512),
            DigestAlgorithm::Md5 => Some(OID_MD5),
            DigestAlgorithm::Md4 => Some(OID_MD4),
            DigestAlgorithm::Md2 => Some(OID_MD2),
            DigestAlgorithm::Unknown => None,
        }
    }

    /// Algorithms this crate can compute
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            DigestAlgorithm::Sha1
                | DigestAlgorithm::Sha256
                | DigestAlgorithm::Sha384
                | DigestAlgorithm::Sha512
        )
    }

    pub fn output_size(self) -> Option<usize> {
        match self {
            DigestAlgorithm::Sha1 => Some(20),
            DigestAlgorithm::Sha256 => Some(32),
            DigestAlgorithm::Sha384 => Some(48),
            DigestAlgorithm::Sha512 => Some(64),
            DigestAlgorithm::Md5 | DigestAlgorithm::Md4 | DigestAlgorithm::Md2 => Some(16),
            DigestAlgorithm::Unknown => None,
        }
    }
}

/// Public key algorithm of a certificate or signer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    #[default]
    Unknown,
    Rsa,
    Ed25519,
    Ecdsa,
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Unknown => write!(f, "unknown"),
            KeyAlgorithm::Rsa => write!(f, "rsa"),
            KeyAlgorithm::Ed25519 => write!(f, "ed25519"),
            KeyAlgorithm::Ecdsa => write!(f, "ecdsa"),
        }
    }
}

impl KeyAlgorithm {
    /// Accepts both key OIDs and `<digest>WithRSAEncryption` signature OIDs
    pub fn from_oid(oid: &str) -> Self {
        match oid {
            OID_RSA_ENCRYPTION | OID_SHA1_WITH_RSA | OID_SHA256_WITH_RSA | OID_SHA384_WITH_RSA
            | OID_SHA512_WITH_RSA => KeyAlgorithm::Rsa,
            OID_ED25519 => KeyAlgorithm::Ed25519,
            OID_EC_PUBLIC_KEY => KeyAlgorithm::Ecdsa,
            _ => KeyAlgorithm::Unknown,
        }
    }
}

fn digest_chunks<'a, D: Digest>(chunks: impl IntoIterator<Item = &'a [u8]>) -> Vec<u8> {
    let mut hasher = D::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    hasher.finalize().to_vec()
}

/// Hash the concatenation of `chunks`
pub fn hash_chunks<'a>(
    chunks: impl IntoIterator<Item = &'a [u8]>,
    algorithm: DigestAlgorithm,
) -> Result<Vec<u8>> {
    match algorithm {
        DigestAlgorithm::Sha1 => Ok(digest_chunks::<Sha1>(chunks)),
        DigestAlgorithm::Sha256 => Ok(digest_chunks::<Sha256>(chunks)),
        DigestAlgorithm::Sha384 => Ok(digest_chunks::<Sha384>(chunks)),
        DigestAlgorithm::Sha512 => Ok(digest_chunks::<Sha512>(chunks)),
        other => Err(ForgeError::UnsupportedAlgorithm(format!(
            "digest algorithm {other} is not implemented"
        ))),
    }
}

pub fn hash(data: &[u8], algorithm: DigestAlgorithm) -> Result<Vec<u8>> {
    hash_chunks([data], algorithm)
}
