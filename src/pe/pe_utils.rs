//! Windows PE header utilities
//!
//! Locates the NT headers, data directories and section table of a PE image
//! held in memory. Every read is bounds-checked; failures carry context for
//! the caller instead of panicking on short buffers.

use anyhow::{Context, Result, bail};
use log::{trace, warn};
use std::ops::Range;

use super::constants::*;
use crate::record::Layout;

/// Optional header flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeType {
    Pe32,
    Pe32Plus,
}

impl PeType {
    pub fn layout(self) -> Layout {
        match self {
            PeType::Pe32 => Layout::Pe32,
            PeType::Pe32Plus => Layout::Pe64,
        }
    }
}

impl std::fmt::Display for PeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeType::Pe32 => write!(f, "PE32"),
            PeType::Pe32Plus => write!(f, "PE32+"),
        }
    }
}

/// One data directory slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataDirectory {
    pub rva: u32,
    pub size: u32,
}

impl DataDirectory {
    pub fn is_empty(&self) -> bool {
        self.rva == 0 || self.size == 0
    }
}

/// One section table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub name: String,
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
}

/// Header locations of a parsed image
#[derive(Debug, Clone)]
pub struct PeHeaders {
    pub pe_offset: usize,
    pub machine: u16,
    pub optional_header_offset: usize,
    pub pe_type: PeType,
    pub size_of_headers: u32,
    pub number_of_rva_and_sizes: u32,
    pub sections: Vec<SectionHeader>,
}

/// Check if data starts with a valid Windows PE executable header.
pub fn is_pe_executable(data: &[u8]) -> bool {
    data.len() >= 2 && &data[..2] == DOS_MAGIC
}

/// Read the PE header offset from the DOS header.
///
/// The offset is stored at position 0x3C (e_lfanew field) as a 4-byte
/// little-endian integer. Returns None when the signature is missing.
pub fn get_pe_header_offset(data: &[u8]) -> Option<usize> {
    if data.len() < DOS_HEADER_SIZE {
        return None;
    }

    let pe_offset = read_u32(data, E_LFANEW_OFFSET).ok()? as usize;
    let pe_signature = data.get(pe_offset..pe_offset.checked_add(4)?)?;
    if pe_signature != PE_SIGNATURE {
        warn!(
            "Invalid PE signature at offset 0x{:x}: expected 'PE\\x00\\x00', got {:?}",
            pe_offset,
            String::from_utf8_lossy(pe_signature)
        );
        return None;
    }

    Some(pe_offset)
}

pub fn read_u16(data: &[u8], offset: usize) -> Result<u16> {
    let bytes = data
        .get(offset..offset.saturating_add(2))
        .with_context(|| format!("u16 at 0x{offset:x} is past end of image"))?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    let bytes = data
        .get(offset..offset.saturating_add(4))
        .with_context(|| format!("u32 at 0x{offset:x} is past end of image"))?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Parse DOS, COFF and optional headers plus the section table.
pub fn parse_headers(data: &[u8]) -> Result<PeHeaders> {
    if !is_pe_executable(data) {
        bail!("missing MZ signature");
    }
    let pe_offset = get_pe_header_offset(data).context("missing PE signature")?;
    let coff_offset = pe_offset + 4;

    let machine = read_u16(data, coff_offset).context("reading COFF machine")?;
    let number_of_sections = read_u16(data, coff_offset + 2)? as usize;
    let size_of_optional_header = read_u16(data, coff_offset + 16)? as usize;
    let optional_header_offset = coff_offset + COFF_HEADER_SIZE;

    let magic = read_u16(data, optional_header_offset).context("reading optional header magic")?;
    let pe_type = match magic {
        PE32_MAGIC => PeType::Pe32,
        PE32_PLUS_MAGIC => PeType::Pe32Plus,
        other => bail!("unknown optional header magic 0x{other:x}"),
    };

    let size_of_headers = read_u32(data, optional_header_offset + 60)?;
    let rva_count_offset = optional_header_offset
        + match pe_type {
            PeType::Pe32 => NUMBER_OF_RVA_AND_SIZES_OFFSET_PE32,
            PeType::Pe32Plus => NUMBER_OF_RVA_AND_SIZES_OFFSET_PE64,
        };
    let number_of_rva_and_sizes = read_u32(data, rva_count_offset)?;

    let section_table_offset = optional_header_offset + size_of_optional_header;
    let mut sections = Vec::with_capacity(number_of_sections);
    for i in 0..number_of_sections {
        let base = section_table_offset + i * SECTION_HEADER_SIZE;
        let raw_name = data
            .get(base..base + 8)
            .with_context(|| format!("section header {i} is past end of image"))?;
        let name_len = raw_name.iter().position(|b| *b == 0).unwrap_or(8);
        let section = SectionHeader {
            name: String::from_utf8_lossy(&raw_name[..name_len]).into_owned(),
            virtual_size: read_u32(data, base + 8)?,
            virtual_address: read_u32(data, base + 12)?,
            size_of_raw_data: read_u32(data, base + 16)?,
            pointer_to_raw_data: read_u32(data, base + 20)?,
        };
        trace!(
            "Section {} '{}': va=0x{:x} raw=0x{:x}+0x{:x}",
            i,
            section.name,
            section.virtual_address,
            section.pointer_to_raw_data,
            section.size_of_raw_data
        );
        sections.push(section);
    }

    Ok(PeHeaders {
        pe_offset,
        machine,
        optional_header_offset,
        pe_type,
        size_of_headers,
        number_of_rva_and_sizes,
        sections,
    })
}

impl PeHeaders {
    /// File offset of the optional header CheckSum field
    pub fn checksum_offset(&self) -> usize {
        self.optional_header_offset + CHECKSUM_OFFSET
    }

    /// File offset of data directory entry `index`
    pub fn data_directory_entry_offset(&self, index: usize) -> usize {
        let base = match self.pe_type {
            PeType::Pe32 => DATA_DIRECTORY_OFFSET_PE32,
            PeType::Pe32Plus => DATA_DIRECTORY_OFFSET_PE64,
        };
        self.optional_header_offset + base + index * DATA_DIRECTORY_ENTRY_SIZE
    }

    pub fn data_directory(&self, data: &[u8], index: usize) -> Result<DataDirectory> {
        if index as u32 >= self.number_of_rva_and_sizes {
            return Ok(DataDirectory::default());
        }
        let offset = self.data_directory_entry_offset(index);
        Ok(DataDirectory {
            rva: read_u32(data, offset).with_context(|| format!("data directory {index}"))?,
            size: read_u32(data, offset + 4).with_context(|| format!("data directory {index}"))?,
        })
    }

    /// Convert RVA to file offset by walking the section table.
    pub fn rva_to_offset(&self, rva: u32) -> Option<usize> {
        if rva < self.size_of_headers {
            return Some(rva as usize);
        }
        self.sections.iter().find_map(|section| {
            let span = section.virtual_size.max(section.size_of_raw_data);
            let end = section.virtual_address.checked_add(span)?;
            if rva >= section.virtual_address && rva < end {
                let offset =
                    (rva - section.virtual_address).checked_add(section.pointer_to_raw_data)?;
                Some(offset as usize)
            } else {
                None
            }
        })
    }
}

/// Byte ranges excluded from the Authenticode image hash: the CheckSum field,
/// the security directory entry and the certificate table.
pub fn authentihash_exclusions(headers: &PeHeaders, cert_table: Option<Range<usize>>) -> Vec<Range<usize>> {
    let checksum = headers.checksum_offset();
    let security = headers.data_directory_entry_offset(DIR_SECURITY);
    let mut ranges = vec![checksum..checksum + 4, security..security + DATA_DIRECTORY_ENTRY_SIZE];
    ranges.extend(cert_table);
    ranges.sort_by_key(|r| r.start);
    ranges
}

/// Slices of `data` that remain after removing `exclusions` (sorted, non-overlapping).
pub fn included_chunks<'a>(data: &'a [u8], exclusions: &[Range<usize>]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::with_capacity(exclusions.len() + 1);
    let mut cursor = 0usize;
    for range in exclusions {
        let start = range.start.min(data.len());
        if start > cursor {
            chunks.push(&data[cursor..start]);
        }
        cursor = cursor.max(range.end.min(data.len()));
    }
    if cursor < data.len() {
        chunks.push(&data[cursor..]);
    }
    chunks
}
