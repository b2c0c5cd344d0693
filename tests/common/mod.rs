//! Shared fixtures for integration tests: Authenticode blobs and PE images.
//! Encodings are built with the `der` crate's encoders.

#![allow(dead_code)]

use der::asn1::{
    BitStringRef, GeneralizedTime, Null, ObjectIdentifier, OctetStringRef, PrintableStringRef,
    UintRef, UtcTime, Utf8StringRef,
};
use der::{DateTime, Encode, Header, Tag, TagNumber};
use ed25519_dalek::{Signer, SigningKey};
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use std::sync::OnceLock;

use peforge::pe::constants::*;
use peforge::pe::signature::{DigestAlgorithm, hash};
use peforge::{Binary, ParserConfig};

pub fn tlv(tag: Tag, content: &[u8]) -> Vec<u8> {
    let mut out = Header::new(tag, content.len()).unwrap().to_der().unwrap();
    out.extend_from_slice(content);
    out
}

pub fn sequence(parts: &[Vec<u8>]) -> Vec<u8> {
    tlv(Tag::Sequence, &parts.concat())
}

/// SET OF with its elements in DER order
pub fn set(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut sorted = parts.to_vec();
    sorted.sort();
    tlv(Tag::Set, &sorted.concat())
}

pub fn explicit(number: u8, parts: &[Vec<u8>]) -> Vec<u8> {
    let tag = Tag::ContextSpecific {
        constructed: true,
        number: TagNumber::new(number),
    };
    tlv(tag, &parts.concat())
}

pub fn oid(dotted: &str) -> Vec<u8> {
    ObjectIdentifier::new(dotted).unwrap().to_der().unwrap()
}

pub fn integer(bytes: &[u8]) -> Vec<u8> {
    UintRef::new(bytes).unwrap().to_der().unwrap()
}

pub fn octet_string(bytes: &[u8]) -> Vec<u8> {
    OctetStringRef::new(bytes).unwrap().to_der().unwrap()
}

pub fn bit_string(bytes: &[u8]) -> Vec<u8> {
    BitStringRef::from_bytes(bytes).unwrap().to_der().unwrap()
}

pub fn algorithm_identifier(dotted: &str) -> Vec<u8> {
    sequence(&[oid(dotted), Null.to_der().unwrap()])
}

pub fn time(year: u16, month: u8, day: u8, hour: u8, minute: u8) -> Vec<u8> {
    let when = DateTime::new(year, month, day, hour, minute, 0).unwrap();
    if year < 2050 {
        UtcTime::from_date_time(when).unwrap().to_der().unwrap()
    } else {
        GeneralizedTime::from_date_time(when).to_der().unwrap()
    }
}

/// BMPString contents
pub fn bmp_bytes(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

pub const ISSUER: &str = "peforge integration CA";
pub const PROGRAM_NAME: &str = "peforge integration";

/// One RSA key per test binary; generation dominates test time otherwise
pub fn rsa_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap())
}

#[derive(Clone)]
pub enum TestKey {
    Ed25519(SigningKey),
    Rsa(RsaPrivateKey),
}

impl TestKey {
    pub fn ed25519(seed: u8) -> Self {
        TestKey::Ed25519(SigningKey::from_bytes(&[seed; 32]))
    }

    pub fn rsa() -> Self {
        TestKey::Rsa(rsa_key().clone())
    }

    fn algorithm(&self) -> Vec<u8> {
        match self {
            TestKey::Ed25519(_) => sequence(&[oid(OID_ED25519)]),
            TestKey::Rsa(_) => algorithm_identifier(OID_RSA_ENCRYPTION),
        }
    }

    fn public_key_info(&self) -> Vec<u8> {
        let key = match self {
            TestKey::Ed25519(key) => key.verifying_key().as_bytes().to_vec(),
            TestKey::Rsa(key) => key
                .to_public_key()
                .to_pkcs1_der()
                .unwrap()
                .as_bytes()
                .to_vec(),
        };
        sequence(&[self.algorithm(), bit_string(&key)])
    }

    pub fn sign(&self, digest: &[u8], algorithm: DigestAlgorithm) -> Vec<u8> {
        match self {
            TestKey::Ed25519(key) => key.sign(digest).to_bytes().to_vec(),
            TestKey::Rsa(key) => {
                let scheme = match algorithm {
                    DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
                    DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
                    DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
                    DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
                    _ => Pkcs1v15Sign::new_unprefixed(),
                };
                key.sign(scheme, digest).unwrap()
            }
        }
    }
}

pub fn name(cn: &str) -> Vec<u8> {
    let rdn = |oid_str: &str, value: Vec<u8>| set(&[sequence(&[oid(oid_str), value])]);
    let utf8 = |text: &str| Utf8StringRef::new(text).unwrap().to_der().unwrap();
    sequence(&[
        rdn("2.5.4.6", PrintableStringRef::new("US").unwrap().to_der().unwrap()),
        rdn("2.5.4.10", utf8("peforge")),
        rdn("2.5.4.3", utf8(cn)),
    ])
}

pub fn certificate(issuer_cn: &str, serial: &[u8], key: &TestKey) -> Vec<u8> {
    let tbs = sequence(&[
        explicit(0, &[integer(&[2])]),
        integer(serial),
        key.algorithm(),
        name(issuer_cn),
        sequence(&[time(2021, 3, 1, 12, 0), time(2051, 3, 1, 12, 0)]),
        name("peforge integration signer"),
        key.public_key_info(),
    ]);
    // The issuer signature is never checked, a placeholder is enough
    sequence(&[tbs, key.algorithm(), bit_string(&[0u8; 64])])
}

fn attribute(oid_str: &str, value: Vec<u8>) -> Vec<u8> {
    sequence(&[oid(oid_str), set(&[value])])
}

/// Builder for Authenticode PKCS#7 SignedData blobs
#[derive(Clone)]
pub struct Authenticode {
    pub key: TestKey,
    pub image_digest: Vec<u8>,
    pub digest_algorithm: DigestAlgorithm,
    pub signer_digest_algorithm: DigestAlgorithm,
    pub serial: Vec<u8>,
    pub authenticated: bool,
    pub message_digest: bool,
    pub embed_certificate: bool,
    pub signers: usize,
}

impl Authenticode {
    pub fn new(key: TestKey) -> Self {
        Authenticode {
            key,
            image_digest: hash(b"integration image", DigestAlgorithm::Sha256).unwrap(),
            digest_algorithm: DigestAlgorithm::Sha256,
            signer_digest_algorithm: DigestAlgorithm::Sha256,
            serial: vec![0x00, 0x9A, 0x41],
            authenticated: false,
            message_digest: true,
            embed_certificate: true,
            signers: 1,
        }
    }

    pub fn with_authenticated_attributes(mut self) -> Self {
        self.authenticated = true;
        self
    }

    pub fn certificate(&self) -> Vec<u8> {
        certificate(ISSUER, &self.serial, &self.key)
    }

    /// Contents of the SpcIndirectDataContent SEQUENCE
    pub fn content_region(&self) -> Vec<u8> {
        let data = sequence(&[oid(OID_SPC_PE_IMAGE_DATA), sequence(&[bit_string(&[])])]);
        let digest_info = sequence(&[
            algorithm_identifier(self.digest_algorithm.oid().unwrap()),
            octet_string(&self.image_digest),
        ]);
        [data, digest_info].concat()
    }

    /// messageDigest value over the content region, if this algorithm can hash
    pub fn content_digest(&self) -> Option<Vec<u8>> {
        hash(&self.content_region(), self.digest_algorithm).ok()
    }

    /// Authenticated attributes as the SET the signature covers
    pub fn attributes_der(&self) -> Vec<u8> {
        let opus = sequence(&[explicit(
            0,
            &[tlv(
                Tag::ContextSpecific {
                    constructed: false,
                    number: TagNumber::N0,
                },
                &bmp_bytes(PROGRAM_NAME),
            )],
        )]);
        let mut attributes = vec![
            attribute(OID_CONTENT_TYPE, oid(OID_SPC_INDIRECT_DATA)),
            attribute(OID_SIGNING_TIME, time(2025, 2, 14, 9, 30)),
            attribute(OID_SPC_SP_OPUS_INFO, opus),
        ];
        if self.message_digest {
            let digest = self.content_digest().unwrap();
            attributes.push(attribute(OID_MESSAGE_DIGEST, octet_string(&digest)));
        }
        set(&attributes)
    }

    fn signer(&self, serial: &[u8]) -> Vec<u8> {
        let attributes = self.attributes_der();
        let signed = if self.authenticated {
            attributes.clone()
        } else {
            self.content_region()
        };
        // Algorithms the crate cannot hash get a placeholder signature
        let encrypted_digest = match hash(&signed, self.digest_algorithm) {
            Ok(digest) => self.key.sign(&digest, self.digest_algorithm),
            Err(_) => vec![0u8; 64],
        };

        let mut signer = vec![
            integer(&[1]),
            sequence(&[name(ISSUER), integer(serial)]),
            algorithm_identifier(self.signer_digest_algorithm.oid().unwrap()),
        ];
        if self.authenticated {
            // [0] IMPLICIT SET OF Attribute
            let mut implicit_set = attributes;
            implicit_set[0] = 0xA0;
            signer.push(implicit_set);
        }
        signer.push(self.key.algorithm());
        signer.push(octet_string(&encrypted_digest));
        sequence(&signer)
    }

    pub fn build(&self) -> Vec<u8> {
        // Extra signers get distinct serials so the SET has no duplicates
        let signers: Vec<Vec<u8>> = (0..self.signers)
            .map(|index| match index {
                0 => self.signer(&self.serial),
                n => self.signer(&[self.serial.as_slice(), &[n as u8]].concat()),
            })
            .collect();

        let mut signed_data = vec![
            integer(&[1]),
            set(&[algorithm_identifier(self.digest_algorithm.oid().unwrap())]),
            sequence(&[
                oid(OID_SPC_INDIRECT_DATA),
                explicit(0, &[sequence(&[self.content_region()])]),
            ]),
        ];
        if self.embed_certificate {
            signed_data.push(explicit(0, &[self.certificate()]));
        }
        signed_data.push(set(&signers));

        sequence(&[oid(OID_SIGNED_DATA), explicit(0, &[sequence(&signed_data)])])
    }
}

fn put(data: &mut [u8], offset: usize, bytes: &[u8]) {
    data[offset..offset + bytes.len()].copy_from_slice(bytes);
}

const OPTIONAL_HEADER: usize = 0x98;

fn set_directory(data: &mut [u8], index: usize, rva: u32, size: u32) {
    let entry = OPTIONAL_HEADER + DATA_DIRECTORY_OFFSET_PE64 + index * DATA_DIRECTORY_ENTRY_SIZE;
    put(data, entry, &rva.to_le_bytes());
    put(data, entry + 4, &size.to_le_bytes());
}

/// PE32+ image with a `.text` section at RVA 0x1000 / file 0x200 and an
/// optional load configuration of `load_config_size` bytes at its start
pub fn pe_image(load_config_size: Option<u32>) -> Vec<u8> {
    let mut data = vec![0u8; 0x600];
    put(&mut data, 0, b"MZ");
    put(&mut data, 0x3C, &0x80u32.to_le_bytes());
    put(&mut data, 0x80, b"PE\0\0");
    put(&mut data, 0x84, &0x8664u16.to_le_bytes());
    put(&mut data, 0x86, &1u16.to_le_bytes());
    put(&mut data, 0x94, &240u16.to_le_bytes());
    put(&mut data, OPTIONAL_HEADER, &PE32_PLUS_MAGIC.to_le_bytes());
    put(&mut data, OPTIONAL_HEADER + 60, &0x200u32.to_le_bytes());
    put(
        &mut data,
        OPTIONAL_HEADER + NUMBER_OF_RVA_AND_SIZES_OFFSET_PE64,
        &16u32.to_le_bytes(),
    );
    let section = OPTIONAL_HEADER + 240;
    put(&mut data, section, b".text");
    put(&mut data, section + 8, &0x400u32.to_le_bytes());
    put(&mut data, section + 12, &0x1000u32.to_le_bytes());
    put(&mut data, section + 16, &0x400u32.to_le_bytes());
    put(&mut data, section + 20, &0x200u32.to_le_bytes());
    put(&mut data, 0x500, b"\x48\x83\xEC\x28\xC3");

    if let Some(size) = load_config_size {
        let mut config = vec![0u8; size as usize];
        put(&mut config, 0, &size.to_le_bytes());
        put(&mut data, 0x200, &config);
        set_directory(&mut data, DIR_LOAD_CONFIG, 0x1000, size);
    }
    data
}

/// Append `blob` as a PKCS#7 WIN_CERTIFICATE and point the security directory at it
pub fn append_certificate(data: &mut Vec<u8>, blob: &[u8]) {
    let start = data.len();
    let length = WIN_CERTIFICATE_HEADER_SIZE + blob.len();
    data.extend_from_slice(&(length as u32).to_le_bytes());
    data.extend_from_slice(&WIN_CERT_REVISION_2_0.to_le_bytes());
    data.extend_from_slice(&WIN_CERT_TYPE_PKCS_SIGNED_DATA.to_le_bytes());
    data.extend_from_slice(blob);
    let padded = length.div_ceil(WIN_CERTIFICATE_ALIGNMENT) * WIN_CERTIFICATE_ALIGNMENT;
    data.resize(start + padded, 0);
    set_directory(data, DIR_SECURITY, start as u32, padded as u32);
}

/// Sign `image` with `authenticode`, filling in the image's real digest
pub fn sign_image(image: &[u8], authenticode: &Authenticode) -> Vec<u8> {
    let binary = Binary::parse(image.to_vec(), &ParserConfig::default()).unwrap();
    let mut authenticode = authenticode.clone();
    authenticode.image_digest = binary.authentihash(authenticode.digest_algorithm).unwrap();
    let mut signed = image.to_vec();
    append_certificate(&mut signed, &authenticode.build());
    signed
}
