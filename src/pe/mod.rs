//! Executable format support

pub mod backends;
pub mod binary;
pub mod constants;
pub mod defaults;
pub mod load_config;
pub mod pe_utils;
pub mod signature;
#[cfg(test)]
pub(crate) mod testing;

pub use backends::{AccessMode, Backend, FileBackend, MemoryBackend, create_backend};
pub use binary::{Binary, WinCertificate};
pub use defaults::ParserConfig;
pub use load_config::{
    CodeIntegrity, GuardFlags, LoadConfigField, LoadConfigVersion, LoadConfiguration,
    decode_load_config,
};
pub use pe_utils::PeType;

use crate::exceptions::{ForgeError, Result};
use constants::*;
use std::fmt;

/// Container formats recognised by their magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryFormat {
    Pe,
    Elf,
    MachO,
    MachOFat,
    Dex,
    Oat,
    Art,
    Vdex,
}

impl fmt::Display for BinaryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinaryFormat::Pe => "PE",
            BinaryFormat::Elf => "ELF",
            BinaryFormat::MachO => "Mach-O",
            BinaryFormat::MachOFat => "Mach-O (fat)",
            BinaryFormat::Dex => "DEX",
            BinaryFormat::Oat => "OAT",
            BinaryFormat::Art => "ART",
            BinaryFormat::Vdex => "VDEX",
        };
        f.write_str(name)
    }
}

/// Detect the format of an image by reading its magic bytes
pub fn detect_format(data: &[u8]) -> Result<BinaryFormat> {
    log::trace!("Detecting format of {} bytes", data.len());

    if pe_utils::get_pe_header_offset(data).is_some() {
        return Ok(BinaryFormat::Pe);
    }

    let format = match data.get(..4) {
        Some(magic) if magic == ELF_MAGIC => Some(BinaryFormat::Elf),
        Some(magic) if MACHO_MAGICS.iter().any(|m| m == magic) => Some(BinaryFormat::MachO),
        Some(magic) if magic == MACHO_FAT_MAGIC => Some(BinaryFormat::MachOFat),
        Some(magic) if magic == DEX_MAGIC => Some(BinaryFormat::Dex),
        Some(magic) if magic == OAT_MAGIC => Some(BinaryFormat::Oat),
        Some(magic) if magic == ART_MAGIC => Some(BinaryFormat::Art),
        Some(magic) if magic == VDEX_MAGIC => Some(BinaryFormat::Vdex),
        _ => None,
    };

    match format {
        Some(format) => {
            log::debug!("Detected {format} image");
            Ok(format)
        }
        None if pe_utils::is_pe_executable(data) => Err(ForgeError::UnsupportedFormat(
            "MZ header without a PE signature".to_string(),
        )),
        None => Err(ForgeError::UnsupportedFormat(
            "Unknown binary format".to_string(),
        )),
    }
}
