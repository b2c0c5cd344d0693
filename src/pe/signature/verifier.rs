//! Authenticode signature verification

use bitflags::bitflags;
use log::{debug, trace};
use std::fmt;

use super::Signature;
use super::algorithms::{DigestAlgorithm, hash};
use super::signer_info::SignerInfo;
use super::store::CertificateStore;
use super::x509::Certificate;
use crate::exceptions::ForgeError;

bitflags! {
    /// Independent verification failures; empty means the signature checks out
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VerificationFlags: u32 {
        const INVALID_SIGNER = 1 << 0;
        const UNSUPPORTED_ALGORITHM = 1 << 1;
        const INCONSISTENT_DIGEST_ALGORITHM = 1 << 2;
        const CERT_NOT_FOUND = 1 << 3;
        const CORRUPTED_CONTENT_INFO = 1 << 4;
        const CORRUPTED_AUTH_DATA = 1 << 5;
        const MISSING_PKCS9_MESSAGE_DIGEST = 1 << 6;
        const BAD_DIGEST = 1 << 7;
        const BAD_SIGNATURE = 1 << 8;
        const NO_SIGNATURE = 1 << 9;
    }
}

impl VerificationFlags {
    pub const OK: Self = Self::empty();

    pub fn is_ok(self) -> bool {
        self.is_empty()
    }
}

impl fmt::Display for VerificationFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "OK");
        }
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        write!(f, "{}", names.join(" | "))
    }
}

impl serde::Serialize for VerificationFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter_names().map(|(name, _)| name))
    }
}

/// Check `signature` against `store`.
///
/// Every rule runs unless an earlier failure makes it meaningless, so the
/// result lists all the ways the signature is broken.
pub fn verify(signature: &Signature, store: &CertificateStore) -> VerificationFlags {
    let signer = match signature.signers() {
        [] => {
            debug!("No signer in SignedData");
            return VerificationFlags::NO_SIGNATURE;
        }
        [signer] => signer,
        many => {
            debug!("Expected one signer, found {}", many.len());
            return VerificationFlags::INVALID_SIGNER;
        }
    };

    let mut flags = VerificationFlags::OK;
    let algorithm = signature.digest_algorithm();

    if algorithm != signature.content_info().digest_algorithm()
        || algorithm != signer.digest_algorithm()
    {
        debug!(
            "Digest algorithms disagree: signed data {}, content {}, signer {}",
            algorithm,
            signature.content_info().digest_algorithm(),
            signer.digest_algorithm()
        );
        flags |= VerificationFlags::INCONSISTENT_DIGEST_ALGORITHM;
    }
    if !algorithm.is_supported() {
        debug!("Digest algorithm {algorithm} is not supported");
        flags |= VerificationFlags::UNSUPPORTED_ALGORITHM;
    }

    match store.find(signer.issuer(), signer.serial_number()) {
        None => {
            debug!("No certificate for signer issued by '{}'", signer.issuer());
            flags |= VerificationFlags::CERT_NOT_FOUND;
        }
        Some(_) if !algorithm.is_supported() => {}
        Some(cert) => flags |= check_signed_digest(signature, signer, cert, algorithm),
    }

    if signature.has_authenticated_attributes() && algorithm.is_supported() {
        flags |= check_message_digest(signature, signer, algorithm);
    }

    trace!("Verification result: {flags}");
    flags
}

/// Verify `encrypted_digest` over the authenticated attributes, or over the
/// signed content when there are none.
fn check_signed_digest(
    signature: &Signature,
    signer: &SignerInfo,
    cert: &Certificate,
    algorithm: DigestAlgorithm,
) -> VerificationFlags {
    let signed = if signature.has_authenticated_attributes() {
        match signature.authenticated_attributes_der() {
            Ok(der) => hash(&der, algorithm),
            Err(e) => {
                debug!("Authenticated attributes: {e}");
                return VerificationFlags::CORRUPTED_AUTH_DATA;
            }
        }
    } else {
        match signature.content_info_region() {
            Ok(region) => hash(region, algorithm),
            Err(e) => {
                debug!("Content info: {e}");
                return VerificationFlags::CORRUPTED_CONTENT_INFO;
            }
        }
    };
    let Ok(digest) = signed else {
        return VerificationFlags::UNSUPPORTED_ALGORITHM;
    };

    match cert
        .public_key()
        .verify_digest(algorithm, &digest, signer.encrypted_digest())
    {
        Ok(true) => VerificationFlags::OK,
        Ok(false) => {
            debug!("Signature does not match certificate '{}'", cert.subject());
            VerificationFlags::BAD_SIGNATURE
        }
        Err(ForgeError::UnsupportedAlgorithm(msg)) => {
            debug!("Cannot verify signature: {msg}");
            VerificationFlags::UNSUPPORTED_ALGORITHM
        }
        Err(e) => {
            debug!("Cannot use certificate key: {e}");
            VerificationFlags::BAD_SIGNATURE
        }
    }
}

/// The PKCS#9 messageDigest must equal the hash of the signed content
fn check_message_digest(
    signature: &Signature,
    signer: &SignerInfo,
    algorithm: DigestAlgorithm,
) -> VerificationFlags {
    let Some(expected) = signer.message_digest() else {
        debug!("Authenticated attributes lack a messageDigest");
        return VerificationFlags::MISSING_PKCS9_MESSAGE_DIGEST;
    };
    let region = match signature.content_info_region() {
        Ok(region) => region,
        Err(e) => {
            debug!("Content info: {e}");
            return VerificationFlags::CORRUPTED_CONTENT_INFO;
        }
    };
    match hash(region, algorithm) {
        Ok(actual) if actual == expected => VerificationFlags::OK,
        Ok(actual) => {
            debug!(
                "messageDigest mismatch: expected {}, computed {}",
                hex::encode(expected),
                hex::encode(actual)
            );
            VerificationFlags::BAD_DIGEST
        }
        Err(_) => VerificationFlags::UNSUPPORTED_ALGORITHM,
    }
}
