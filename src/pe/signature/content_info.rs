//! Authenticode `SpcIndirectDataContent` as wrapped by PKCS#7 ContentInfo.

use serde::Serialize;
use std::fmt;

use super::algorithms::DigestAlgorithm;
use crate::utils::hex_bytes;

/// Signed content: what was hashed and the resulting image digest
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ContentInfo {
    pub(crate) content_type: String,
    pub(crate) spc_type: String,
    pub(crate) digest_algorithm: DigestAlgorithm,
    #[serde(serialize_with = "hex_bytes::serialize")]
    pub(crate) digest: Vec<u8>,
}

impl ContentInfo {
    /// ContentInfo content type, `SPC_INDIRECT_DATA` for Authenticode
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Type of the hashed data, `SPC_PE_IMAGE_DATA` for PE files
    pub fn spc_type(&self) -> &str {
        &self.spc_type
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    /// Authentihash claimed by the signer
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }
}

impl fmt::Display for ContentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Content type: {}", self.content_type)?;
        writeln!(f, "Type:         {}", self.spc_type)?;
        write!(
            f,
            "Digest:       {} {}",
            self.digest_algorithm,
            hex::encode(&self.digest)
        )
    }
}
