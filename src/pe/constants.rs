// Core PE / Authenticode constants that never change
// For parser configuration, see defaults.rs

// DOS header
pub const DOS_MAGIC: &[u8] = b"MZ";
pub const E_LFANEW_OFFSET: usize = 0x3C;
pub const DOS_HEADER_SIZE: usize = 0x40;

// NT headers
pub const PE_SIGNATURE: &[u8] = b"PE\x00\x00";
pub const COFF_HEADER_SIZE: usize = 20;
pub const SECTION_HEADER_SIZE: usize = 40;

// Optional header magic
pub const PE32_MAGIC: u16 = 0x10B;
pub const PE32_PLUS_MAGIC: u16 = 0x20B;

// Offsets inside the optional header
pub const CHECKSUM_OFFSET: usize = 64;
pub const NUMBER_OF_RVA_AND_SIZES_OFFSET_PE32: usize = 92;
pub const NUMBER_OF_RVA_AND_SIZES_OFFSET_PE64: usize = 108;
pub const DATA_DIRECTORY_OFFSET_PE32: usize = 96;
pub const DATA_DIRECTORY_OFFSET_PE64: usize = 112;
pub const DATA_DIRECTORY_ENTRY_SIZE: usize = 8;

// Data directory indices
pub const DIR_SECURITY: usize = 4; // file offset, not an RVA
pub const DIR_LOAD_CONFIG: usize = 10;

// WIN_CERTIFICATE
pub const WIN_CERTIFICATE_HEADER_SIZE: usize = 8;
pub const WIN_CERTIFICATE_ALIGNMENT: usize = 8;
pub const WIN_CERT_REVISION_1_0: u16 = 0x0100;
pub const WIN_CERT_REVISION_2_0: u16 = 0x0200;
pub const WIN_CERT_TYPE_X509: u16 = 0x0001;
pub const WIN_CERT_TYPE_PKCS_SIGNED_DATA: u16 = 0x0002;

// Other container magics (recognised, not parsed)
pub const ELF_MAGIC: &[u8] = b"\x7fELF";
pub const MACHO_MAGICS: &[[u8; 4]] = &[
    [0xFE, 0xED, 0xFA, 0xCE],
    [0xCE, 0xFA, 0xED, 0xFE],
    [0xFE, 0xED, 0xFA, 0xCF],
    [0xCF, 0xFA, 0xED, 0xFE],
];
pub const MACHO_FAT_MAGIC: &[u8] = &[0xCA, 0xFE, 0xBA, 0xBE];
pub const DEX_MAGIC: &[u8] = b"dex\n";
pub const OAT_MAGIC: &[u8] = b"oat\n";
pub const ART_MAGIC: &[u8] = b"art\n";
pub const VDEX_MAGIC: &[u8] = b"vdex";

// PKCS#7 / CMS object identifiers
pub const OID_SIGNED_DATA: &str = "1.2.840.113549.1.7.2";
pub const OID_CONTENT_TYPE: &str = "1.2.840.113549.1.9.3";
pub const OID_MESSAGE_DIGEST: &str = "1.2.840.113549.1.9.4";
pub const OID_SIGNING_TIME: &str = "1.2.840.113549.1.9.5";

// Authenticode (SPC) object identifiers
pub const OID_SPC_INDIRECT_DATA: &str = "1.3.6.1.4.1.311.2.1.4";
pub const OID_SPC_STATEMENT_TYPE: &str = "1.3.6.1.4.1.311.2.1.11";
pub const OID_SPC_SP_OPUS_INFO: &str = "1.3.6.1.4.1.311.2.1.12";
pub const OID_SPC_PE_IMAGE_DATA: &str = "1.3.6.1.4.1.311.2.1.15";

// Digest algorithms
pub const OID_SHA1: &str = "1.3.14.3.2.26";
pub const OID_SHA256: &str = "2.16.840.1.101.3.4.2.1";
pub const OID_SHA384: &str = "2.16.840.1.101.3.4.2.2";
pub const OID_SHA512: &str = "2.16.840.1.101.3.4.2.3";
pub const OID_MD5: &str = "1.2.840.113549.2.5";
pub const OID_MD4: &str = "1.2.840.113549.2.4";
pub const OID_MD2: &str = "1.2.840.113549.2.2";

// Public key / signature algorithms
pub const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
pub const OID_SHA1_WITH_RSA: &str = "1.2.840.113549.1.1.5";
pub const OID_SHA256_WITH_RSA: &str = "1.2.840.113549.1.1.11";
pub const OID_SHA384_WITH_RSA: &str = "1.2.840.113549.1.1.12";
pub const OID_SHA512_WITH_RSA: &str = "1.2.840.113549.1.1.13";
pub const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
pub const OID_ED25519: &str = "1.3.101.112";

// X.520 attribute types used when rendering names
pub const NAME_ATTRIBUTES: &[(&str, &str)] = &[
    ("2.5.4.3", "CN"),
    ("2.5.4.4", "SN"),
    ("2.5.4.5", "serialNumber"),
    ("2.5.4.6", "C"),
    ("2.5.4.7", "L"),
    ("2.5.4.8", "ST"),
    ("2.5.4.9", "street"),
    ("2.5.4.10", "O"),
    ("2.5.4.11", "OU"),
    ("2.5.4.12", "title"),
    ("1.2.840.113549.1.9.1", "emailAddress"),
    ("0.9.2342.19200300.100.1.25", "DC"),
];
