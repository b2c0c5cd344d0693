//! Parsed PE image
//!
//! [`Binary`] owns the image bytes and the structures decoded from them:
//! every Authenticode signature in the security directory and the load
//! configuration directory. Malformed entries are logged and skipped so one
//! bad record does not hide the rest of the image.

use log::{debug, info, trace, warn};
use std::ops::Range;
use std::path::Path;
use std::time::Instant;

use super::backends::{AccessMode, Backend, create_backend};
use super::constants::*;
use super::defaults::ParserConfig;
use super::load_config::{LoadConfiguration, decode_load_config};
use super::pe_utils::{self, PeHeaders, PeType};
use super::signature::{DigestAlgorithm, Signature, VerificationFlags, decode_pkcs7, hash_chunks};
use crate::exceptions::{ForgeError, Result};

/// One WIN_CERTIFICATE header from the security directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinCertificate {
    pub offset: usize,
    pub length: u32,
    pub revision: u16,
    pub certificate_type: u16,
}

/// A parsed PE image
#[derive(Debug, Clone)]
pub struct Binary {
    data: Vec<u8>,
    headers: PeHeaders,
    certificate_table: Option<Range<usize>>,
    win_certificates: Vec<WinCertificate>,
    signatures: Vec<Signature>,
    load_config: Option<LoadConfiguration>,
    load_config_offset: Option<usize>,
}

impl Binary {
    /// Parse an image held in memory
    pub fn parse(data: Vec<u8>, config: &ParserConfig) -> Result<Self> {
        let timer = Instant::now();
        let headers = pe_utils::parse_headers(&data)
            .map_err(|e| ForgeError::UnsupportedFormat(format!("not a PE image: {e:#}")))?;
        debug!(
            "📦 {} image, machine 0x{:04x}, {} section(s)",
            headers.pe_type,
            headers.machine,
            headers.sections.len()
        );

        let mut binary = Binary {
            data,
            headers,
            certificate_table: None,
            win_certificates: Vec::new(),
            signatures: Vec::new(),
            load_config: None,
            load_config_offset: None,
        };

        if config.parse_signatures {
            binary.parse_security_directory(config.max_signatures)?;
        }
        if config.parse_load_config {
            binary.parse_load_config()?;
        }

        info!(
            "✅ Parsed PE image ({} bytes): {} signature(s), load config {} in {:?}",
            binary.data.len(),
            binary.signatures.len(),
            binary
                .load_config
                .as_ref()
                .map_or_else(|| "absent".to_string(), |lc| lc.version().to_string()),
            timer.elapsed()
        );
        Ok(binary)
    }

    /// Parse the whole image exposed by `backend`
    pub fn from_backend(backend: &mut dyn Backend, config: &ParserConfig) -> Result<Self> {
        let data = backend.read_all()?;
        Self::parse(data, config)
    }

    pub fn from_path(path: &Path, config: &ParserConfig) -> Result<Self> {
        let mut backend = create_backend(path, AccessMode::Memory)?;
        Self::from_backend(backend.as_mut(), config)
    }

    fn parse_security_directory(&mut self, max_signatures: usize) -> Result<()> {
        let dir = self.headers.data_directory(&self.data, DIR_SECURITY)?;
        if dir.is_empty() {
            debug!("No security directory");
            return Ok(());
        }

        // The security directory holds a file offset, not an RVA
        let start = dir.rva as usize;
        let Some(end) = start
            .checked_add(dir.size as usize)
            .filter(|end| *end <= self.data.len())
        else {
            warn!(
                "Security directory 0x{:x}+0x{:x} exceeds image size 0x{:x}",
                dir.rva,
                dir.size,
                self.data.len()
            );
            return Ok(());
        };
        self.certificate_table = Some(start..end);

        let mut pos = start;
        while pos + WIN_CERTIFICATE_HEADER_SIZE <= end {
            let length = pe_utils::read_u32(&self.data, pos)?;
            let entry = WinCertificate {
                offset: pos,
                length,
                revision: pe_utils::read_u16(&self.data, pos + 4)?,
                certificate_type: pe_utils::read_u16(&self.data, pos + 6)?,
            };
            let entry_end = pos.checked_add(length as usize).filter(|e| *e <= end);
            let Some(entry_end) = entry_end.filter(|_| length as usize >= WIN_CERTIFICATE_HEADER_SIZE)
            else {
                warn!("WIN_CERTIFICATE at 0x{pos:x} has invalid length {length}");
                break;
            };
            trace!(
                "WIN_CERTIFICATE at 0x{:x}: length={} revision=0x{:04x} type=0x{:04x}",
                pos,
                length,
                entry.revision,
                entry.certificate_type
            );
            self.win_certificates.push(entry);

            if entry.revision != WIN_CERT_REVISION_2_0 && entry.revision != WIN_CERT_REVISION_1_0 {
                debug!("Unexpected WIN_CERTIFICATE revision 0x{:04x}", entry.revision);
            }
            if entry.certificate_type == WIN_CERT_TYPE_PKCS_SIGNED_DATA {
                if self.signatures.len() >= max_signatures {
                    warn!("Signature limit {max_signatures} reached, ignoring the rest");
                    break;
                }
                let content = &self.data[pos + WIN_CERTIFICATE_HEADER_SIZE..entry_end];
                match decode_pkcs7(content) {
                    Ok(signature) => self.signatures.push(signature),
                    Err(e) => warn!("Skipping signature at 0x{pos:x}: {e}"),
                }
            } else {
                debug!(
                    "Skipping WIN_CERTIFICATE type 0x{:04x} at 0x{:x}",
                    entry.certificate_type, pos
                );
            }

            pos = align_up(entry_end, WIN_CERTIFICATE_ALIGNMENT);
        }
        Ok(())
    }

    fn parse_load_config(&mut self) -> Result<()> {
        let dir = self.headers.data_directory(&self.data, DIR_LOAD_CONFIG)?;
        if dir.is_empty() {
            debug!("No load configuration directory");
            return Ok(());
        }
        let Some(offset) = self
            .headers
            .rva_to_offset(dir.rva)
            .filter(|o| *o < self.data.len())
        else {
            warn!("Load configuration RVA 0x{:x} is not mapped", dir.rva);
            return Ok(());
        };

        match decode_load_config(&self.data[offset..], self.headers.pe_type.layout()) {
            Ok(load_config) => {
                debug!("Load configuration at 0x{offset:x}: {}", load_config.version());
                self.load_config = Some(load_config);
                self.load_config_offset = Some(offset);
            }
            Err(e) => warn!("Skipping load configuration at 0x{offset:x}: {e}"),
        }
        Ok(())
    }

    /// Signatures in the order they appear in the security directory
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Every WIN_CERTIFICATE header, including non-PKCS#7 entries
    pub fn win_certificates(&self) -> &[WinCertificate] {
        &self.win_certificates
    }

    pub fn has_signatures(&self) -> bool {
        !self.signatures.is_empty()
    }

    pub fn load_configuration(&self) -> Option<&LoadConfiguration> {
        self.load_config.as_ref()
    }

    /// Mutable access; changes are written back by [`Self::to_bytes`]
    pub fn load_configuration_mut(&mut self) -> Option<&mut LoadConfiguration> {
        self.load_config.as_mut()
    }

    pub fn pe_type(&self) -> PeType {
        self.headers.pe_type
    }

    pub fn headers(&self) -> &PeHeaders {
        &self.headers
    }

    /// Image bytes as parsed
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Authenticode image digest: the file without its CheckSum, the
    /// security directory entry and the certificate table
    pub fn authentihash(&self, algorithm: DigestAlgorithm) -> Result<Vec<u8>> {
        let exclusions =
            pe_utils::authentihash_exclusions(&self.headers, self.certificate_table.clone());
        let chunks = pe_utils::included_chunks(&self.data, &exclusions);
        hash_chunks(chunks, algorithm)
    }

    /// Check the first signature and that it covers this image
    pub fn verify_signature(&self) -> VerificationFlags {
        let Some(signature) = self.signatures.first() else {
            return VerificationFlags::NO_SIGNATURE;
        };
        let mut flags = signature.check();

        let algorithm = signature.content_info().digest_algorithm();
        match self.authentihash(algorithm) {
            Ok(digest) if digest == signature.content_info().digest() => {}
            Ok(digest) => {
                debug!(
                    "Authentihash mismatch: signed {}, image {}",
                    hex::encode(signature.content_info().digest()),
                    hex::encode(digest)
                );
                flags |= VerificationFlags::BAD_DIGEST;
            }
            Err(e) => {
                debug!("Cannot compute authentihash: {e}");
                flags |= VerificationFlags::UNSUPPORTED_ALGORITHM;
            }
        }
        flags
    }

    /// Image bytes with the load configuration written back in place
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = self.data.clone();
        if let (Some(load_config), Some(offset)) = (&self.load_config, self.load_config_offset) {
            let encoded = load_config.encode();
            let end = (offset + encoded.len()).min(data.len());
            data[offset..end].copy_from_slice(&encoded[..end - offset]);
        }
        data
    }
}

fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}
