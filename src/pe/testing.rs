//! Minimal PE32+ images for tests.

use super::constants::*;
use super::pe_utils;
use super::signature::testing::SignedDataFixture;
use super::signature::{DigestAlgorithm, hash_chunks};

const IMAGE_SIZE: usize = 0x400;
const OPTIONAL_HEADER: usize = 0x98;
const LOAD_CONFIG_OFFSET: usize = 0x200;
const LOAD_CONFIG_RVA: u32 = 0x1000;

pub(crate) const SECURITY_COOKIE: u64 = 0x0000_2b99_2ddf_a232;

fn put(data: &mut [u8], offset: usize, bytes: &[u8]) {
    data[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn set_directory(data: &mut [u8], index: usize, rva: u32, size: u32) {
    let entry = OPTIONAL_HEADER + DATA_DIRECTORY_OFFSET_PE64 + index * DATA_DIRECTORY_ENTRY_SIZE;
    put(data, entry, &rva.to_le_bytes());
    put(data, entry + 4, &size.to_le_bytes());
}

/// PE32+ image with one `.text` section mapping RVA 0x1000 to file 0x200
#[derive(Debug, Clone)]
pub(crate) struct PeImage {
    /// Size of the load configuration directory; `None` leaves it out
    pub(crate) load_config_size: Option<u32>,
    pub(crate) signature: Option<SignedDataFixture>,
}

impl PeImage {
    pub(crate) fn new() -> Self {
        PeImage {
            load_config_size: None,
            signature: None,
        }
    }

    pub(crate) fn with_load_config(mut self, size: u32) -> Self {
        self.load_config_size = Some(size);
        self
    }

    pub(crate) fn signed(mut self, fixture: SignedDataFixture) -> Self {
        self.signature = Some(fixture);
        self
    }

    fn headers(&self) -> Vec<u8> {
        let mut data = vec![0u8; IMAGE_SIZE];
        put(&mut data, 0, b"MZ");
        put(&mut data, 0x3C, &0x80u32.to_le_bytes());
        put(&mut data, 0x80, b"PE\0\0");
        let coff = 0x84;
        put(&mut data, coff, &0x8664u16.to_le_bytes());
        put(&mut data, coff + 2, &1u16.to_le_bytes());
        put(&mut data, coff + 16, &240u16.to_le_bytes());
        let opt = OPTIONAL_HEADER;
        put(&mut data, opt, &PE32_PLUS_MAGIC.to_le_bytes());
        put(&mut data, opt + 60, &0x200u32.to_le_bytes());
        put(&mut data, opt + CHECKSUM_OFFSET, &0x1234_5678u32.to_le_bytes());
        put(&mut data, opt + NUMBER_OF_RVA_AND_SIZES_OFFSET_PE64, &16u32.to_le_bytes());
        let sec = opt + 240;
        put(&mut data, sec, b".text");
        put(&mut data, sec + 8, &0x100u32.to_le_bytes());
        put(&mut data, sec + 12, &0x1000u32.to_le_bytes());
        put(&mut data, sec + 16, &0x200u32.to_le_bytes());
        put(&mut data, sec + 20, &0x200u32.to_le_bytes());
        // Some code bytes so the image digest depends on the section
        put(&mut data, 0x300, &[0xCC; 16]);
        data
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut data = self.headers();

        if let Some(size) = self.load_config_size {
            let mut config = vec![0u8; size as usize];
            put(&mut config, 0, &size.to_le_bytes());
            // SecurityCookie sits at 88 in the PE32+ layout
            if config.len() >= 96 {
                put(&mut config, 88, &SECURITY_COOKIE.to_le_bytes());
            }
            put(&mut data, LOAD_CONFIG_OFFSET, &config);
            set_directory(&mut data, DIR_LOAD_CONFIG, LOAD_CONFIG_RVA, size);
        }

        if let Some(fixture) = &self.signature {
            let mut fixture = fixture.clone();
            fixture.image_digest = authentihash(&data, fixture.digest_algorithm);
            append_certificate(&mut data, &fixture.build());
        }
        data
    }
}

/// Image digest of an image without a certificate table
pub(crate) fn authentihash(data: &[u8], algorithm: DigestAlgorithm) -> Vec<u8> {
    let headers = pe_utils::parse_headers(data).unwrap();
    let exclusions = pe_utils::authentihash_exclusions(&headers, None);
    hash_chunks(pe_utils::included_chunks(data, &exclusions), algorithm).unwrap()
}

/// Append a PKCS#7 WIN_CERTIFICATE and point the security directory at it
pub(crate) fn append_certificate(data: &mut Vec<u8>, blob: &[u8]) {
    let start = data.len();
    let length = WIN_CERTIFICATE_HEADER_SIZE + blob.len();
    data.extend_from_slice(&(length as u32).to_le_bytes());
    data.extend_from_slice(&WIN_CERT_REVISION_2_0.to_le_bytes());
    data.extend_from_slice(&WIN_CERT_TYPE_PKCS_SIGNED_DATA.to_le_bytes());
    data.extend_from_slice(blob);
    data.resize(start + length.div_ceil(WIN_CERTIFICATE_ALIGNMENT) * WIN_CERTIFICATE_ALIGNMENT, 0);
    let table_size = (data.len() - start) as u32;
    set_directory(data, DIR_SECURITY, start as u32, table_size);
}
