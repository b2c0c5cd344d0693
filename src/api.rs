//! High-level API for peforge operations

use log::debug;
use serde::Serialize;
use std::path::Path;

use crate::exceptions::{ForgeError, Result};
use crate::pe::backends::{AccessMode, create_backend};
use crate::pe::signature::VerificationFlags;
use crate::pe::{self, Binary, BinaryFormat, ParserConfig};

/// Result of image verification
#[derive(Debug, Clone, Serialize)]
pub struct VerifyResult {
    pub format: String,
    pub pe_type: String,
    pub signature_count: usize,
    /// Result for the image as a whole, see [`Binary::verify_signature`]
    pub flags: VerificationFlags,
    /// `Signature::check` for every signature, in directory order
    pub signature_flags: Vec<VerificationFlags>,
    /// Hex authentihash under the first signature's algorithm
    pub authentihash: Option<String>,
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        self.flags.is_ok()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ForgeError::Generic(format!("Failed to serialize result: {e}")))
    }
}

/// Parse a PE file from disk
pub fn parse_binary(path: &Path, config: ParserConfig) -> Result<Binary> {
    let mut backend = create_backend(path, AccessMode::Memory)?;
    let data = backend.read_all()?;

    match pe::detect_format(&data)? {
        BinaryFormat::Pe => Binary::parse(data, &config),
        other => Err(ForgeError::UnsupportedFormat(format!(
            "{other} images are recognised but not parsed"
        ))),
    }
}

/// Parse a PE file and verify its Authenticode signature
pub fn verify_binary(path: &Path) -> Result<VerifyResult> {
    let binary = parse_binary(path, ParserConfig::signatures_only())?;
    let signature_flags: Vec<VerificationFlags> =
        binary.signatures().iter().map(|s| s.check()).collect();
    let authentihash = binary
        .signatures()
        .first()
        .map(|s| binary.authentihash(s.content_info().digest_algorithm()))
        .transpose()
        .ok()
        .flatten()
        .map(hex::encode);
    let flags = binary.verify_signature();

    debug!(
        "Verified {}: {} signature(s), result {}",
        path.display(),
        signature_flags.len(),
        flags
    );

    Ok(VerifyResult {
        format: BinaryFormat::Pe.to_string(),
        pe_type: binary.pe_type().to_string(),
        signature_count: binary.signatures().len(),
        flags,
        signature_flags,
        authentihash,
    })
}
