//! Authenticode signatures
//!
//! A [`Signature`] is an immutable snapshot of one PKCS#7 SignedData blob
//! taken from the security directory. It keeps the exact encoding it was
//! decoded from plus the byte ranges that verification has to re-hash:
//!
//! - the contents of the `SpcIndirectDataContent` SEQUENCE
//! - the `[0]` authenticated attributes of the signer, if any
//!
//! [`verifier::verify`] checks a signature against a [`CertificateStore`]
//! and reports every failure it finds as a [`VerificationFlags`] set.

pub mod algorithms;
pub mod content_info;
mod parser;
pub mod signer_info;
pub mod store;
#[cfg(test)]
pub(crate) mod testing;
pub mod verifier;
pub mod x509;

use serde::Serialize;
use std::fmt;
use std::ops::Range;

pub use algorithms::{DigestAlgorithm, KeyAlgorithm, hash, hash_chunks};
pub use content_info::ContentInfo;
pub use parser::decode_pkcs7;
pub use signer_info::{Attribute, SignerInfo};
pub use store::CertificateStore;
pub use verifier::{VerificationFlags, verify};
pub use x509::{Certificate, Name, PublicKey};

use der::{Reader, SliceReader, Tag, TagNumber};

use crate::exceptions::{ForgeError, Result};

/// `[0] IMPLICIT SET OF Attribute` inside SignerInfo
pub(crate) const ATTRIBUTES_TAG: Tag = Tag::ContextSpecific {
    constructed: true,
    number: TagNumber::N0,
};

/// Decoded PKCS#7 SignedData
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signature {
    version: u32,
    digest_algorithm: DigestAlgorithm,
    content_info: ContentInfo,
    certificates: Vec<Certificate>,
    signers: Vec<SignerInfo>,
    #[serde(skip)]
    content_info_range: Range<usize>,
    #[serde(skip)]
    auth_range: Range<usize>,
    #[serde(skip)]
    raw: Vec<u8>,
}

/// Assembles a [`Signature`]; only the decoder and tests inside the crate build one
#[derive(Debug, Default)]
pub(crate) struct SignatureBuilder {
    pub(crate) version: u32,
    pub(crate) digest_algorithm: DigestAlgorithm,
    pub(crate) content_info: ContentInfo,
    pub(crate) certificates: Vec<Certificate>,
    pub(crate) signers: Vec<SignerInfo>,
    pub(crate) content_info_range: Range<usize>,
    pub(crate) auth_range: Range<usize>,
    pub(crate) raw: Vec<u8>,
}

impl SignatureBuilder {
    pub(crate) fn build(self) -> Signature {
        Signature {
            version: self.version,
            digest_algorithm: self.digest_algorithm,
            content_info: self.content_info,
            certificates: self.certificates,
            signers: self.signers,
            content_info_range: self.content_info_range,
            auth_range: self.auth_range,
            raw: self.raw,
        }
    }
}

impl Signature {
    /// SignedData version
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Digest algorithm declared in SignedData.digestAlgorithms
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    pub fn content_info(&self) -> &ContentInfo {
        &self.content_info
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    pub fn signers(&self) -> &[SignerInfo] {
        &self.signers
    }

    /// Exact encoding this signature was decoded from
    pub fn raw_der(&self) -> &[u8] {
        &self.raw
    }

    /// `(start, end)` of the signed content inside [`Self::raw_der`]
    pub fn content_info_offsets(&self) -> (usize, usize) {
        (self.content_info_range.start, self.content_info_range.end)
    }

    /// `(start, end)` of the authenticated attributes, `(0, 0)` when absent
    pub fn auth_offsets(&self) -> (usize, usize) {
        (self.auth_range.start, self.auth_range.end)
    }

    pub fn has_authenticated_attributes(&self) -> bool {
        self.auth_range.start < self.auth_range.end
    }

    /// Bytes the file digest was computed over, validated as a run of TLVs
    pub fn content_info_region(&self) -> Result<&[u8]> {
        let region = self
            .raw
            .get(self.content_info_range.clone())
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                ForgeError::MalformedEncoding(format!(
                    "content info region {:?} outside {} byte encoding",
                    self.content_info_range,
                    self.raw.len()
                ))
            })?;
        let mut reader = SliceReader::new(region)?;
        while !reader.is_finished() {
            reader.tlv_bytes()?;
        }
        Ok(region)
    }

    /// Authenticated attributes re-tagged as a SET, ready for hashing
    pub fn authenticated_attributes_der(&self) -> Result<Vec<u8>> {
        let region = self
            .raw
            .get(self.auth_range.clone())
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                ForgeError::MalformedEncoding(format!(
                    "authenticated attributes {:?} outside {} byte encoding",
                    self.auth_range,
                    self.raw.len()
                ))
            })?;
        let mut reader = SliceReader::new(region)?;
        let found = reader.peek_tag()?;
        if found != ATTRIBUTES_TAG {
            return Err(ForgeError::MalformedEncoding(format!(
                "authenticated attributes: expected {ATTRIBUTES_TAG}, found {found}"
            )));
        }
        let mut der = reader.tlv_bytes()?.to_vec();
        if !reader.is_finished() {
            return Err(ForgeError::MalformedEncoding(format!(
                "{} stray bytes after authenticated attributes",
                reader.remaining_len()
            )));
        }
        der[0] = u8::from(Tag::Set);
        Ok(der)
    }

    /// Verify against the certificates embedded in this signature
    pub fn check(&self) -> VerificationFlags {
        verify(self, &CertificateStore::from(self))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Version:          {}", self.version)?;
        writeln!(f, "Digest Algorithm: {}", self.digest_algorithm)?;
        writeln!(f, "Content Info:")?;
        writeln!(f, "{}", self.content_info)?;
        writeln!(f, "Certificates:     {}", self.certificates.len())?;
        for cert in &self.certificates {
            writeln!(f, "  {}", cert.subject())?;
        }
        write!(f, "Signers:          {}", self.signers.len())?;
        for signer in &self.signers {
            write!(f, "\n{signer}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::testing::SignedDataFixture;
    use super::*;
    use crate::pe::LoadConfiguration;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_shared_types_are_send_and_sync() {
        assert_send_sync::<Signature>();
        assert_send_sync::<CertificateStore>();
        assert_send_sync::<Certificate>();
        assert_send_sync::<LoadConfiguration>();
    }

    #[test]
    fn test_concurrent_checks() {
        let signatures: Vec<Signature> = (0..4u8)
            .map(|seed| {
                let mut fixture = SignedDataFixture::new().with_authenticated_attributes();
                fixture.signing_key = ed25519_dalek::SigningKey::from_bytes(&[seed + 1; 32]);
                decode_pkcs7(&fixture.build()).unwrap()
            })
            .collect();
        let store: CertificateStore = signatures
            .iter()
            .flat_map(|s| s.certificates().iter().cloned())
            .collect();

        std::thread::scope(|scope| {
            let handles: Vec<_> = signatures
                .iter()
                .map(|sig| scope.spawn(|| (sig.check(), verify(sig, &store))))
                .collect();
            for handle in handles {
                let (own, shared) = handle.join().unwrap();
                assert_eq!(own, VerificationFlags::OK);
                // every certificate shares issuer and serial, the first one wins
                assert!(shared == VerificationFlags::OK || shared == VerificationFlags::BAD_SIGNATURE);
            }
        });
    }

    #[test]
    fn test_authenticated_attributes_are_retagged() {
        let fixture = SignedDataFixture::new().with_authenticated_attributes();
        let sig = decode_pkcs7(&fixture.build()).unwrap();
        let der = sig.authenticated_attributes_der().unwrap();
        assert_eq!(der[0], 0x31);
        assert_eq!(der, fixture.attributes_der());
        assert!(sig.content_info_region().is_ok());
    }
}
