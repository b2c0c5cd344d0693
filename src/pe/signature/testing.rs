//! Fixture builder for SignedData blobs used by unit tests.

use der::asn1::{
    BitStringRef, GeneralizedTime, Null, ObjectIdentifier, OctetStringRef,
    PrintableStringRef, UintRef, UtcTime, Utf8StringRef,
};
use der::{DateTime, Encode, Header, Tag, TagNumber};
use ed25519_dalek::{Signer, SigningKey};

use super::algorithms::{DigestAlgorithm, hash};
use crate::pe::constants::*;

pub(crate) fn tlv(tag: Tag, content: &[u8]) -> Vec<u8> {
    let mut out = Header::new(tag, content.len()).unwrap().to_der().unwrap();
    out.extend_from_slice(content);
    out
}

pub(crate) fn sequence(parts: &[Vec<u8>]) -> Vec<u8> {
    tlv(Tag::Sequence, &parts.concat())
}

/// SET OF in DER order
pub(crate) fn set(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut sorted = parts.to_vec();
    sorted.sort();
    tlv(Tag::Set, &sorted.concat())
}

pub(crate) fn explicit(number: u8, parts: &[Vec<u8>]) -> Vec<u8> {
    let tag = Tag::ContextSpecific {
        constructed: true,
        number: TagNumber::new(number),
    };
    tlv(tag, &parts.concat())
}

pub(crate) fn implicit(number: u8, content: &[u8]) -> Vec<u8> {
    let tag = Tag::ContextSpecific {
        constructed: false,
        number: TagNumber::new(number),
    };
    tlv(tag, content)
}

pub(crate) fn oid(dotted: &str) -> Vec<u8> {
    ObjectIdentifier::new(dotted).unwrap().to_der().unwrap()
}

pub(crate) fn integer(bytes: &[u8]) -> Vec<u8> {
    UintRef::new(bytes).unwrap().to_der().unwrap()
}

pub(crate) fn octet_string(bytes: &[u8]) -> Vec<u8> {
    OctetStringRef::new(bytes).unwrap().to_der().unwrap()
}

pub(crate) fn bit_string(bytes: &[u8]) -> Vec<u8> {
    BitStringRef::from_bytes(bytes).unwrap().to_der().unwrap()
}

pub(crate) fn algorithm_identifier(dotted: &str) -> Vec<u8> {
    sequence(&[oid(dotted), Null.to_der().unwrap()])
}

/// UTCTime through 2049, GeneralizedTime after
pub(crate) fn time(year: u16, month: u8, day: u8) -> Vec<u8> {
    let when = DateTime::new(year, month, day, 7, 8, 9).unwrap();
    if year < 2050 {
        UtcTime::from_date_time(when).unwrap().to_der().unwrap()
    } else {
        GeneralizedTime::from_date_time(when).to_der().unwrap()
    }
}

pub(crate) fn bmp_bytes(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

fn rdn(oid_str: &str, value: Vec<u8>) -> Vec<u8> {
    set(&[sequence(&[oid(oid_str), value])])
}

pub(crate) fn name(cn: &str) -> Vec<u8> {
    sequence(&[
        rdn("2.5.4.6", PrintableStringRef::new("US").unwrap().to_der().unwrap()),
        rdn("2.5.4.3", Utf8StringRef::new(cn).unwrap().to_der().unwrap()),
    ])
}

pub(crate) fn ed25519_certificate(issuer_cn: &str, serial: &[u8], key: &[u8; 32]) -> Vec<u8> {
    let ed25519 = sequence(&[oid(OID_ED25519)]);
    let tbs = sequence(&[
        explicit(0, &[integer(&[2])]),
        integer(serial),
        ed25519.clone(),
        name(issuer_cn),
        sequence(&[time(2020, 1, 1), time(2051, 1, 1)]),
        name("peforge signer"),
        sequence(&[ed25519.clone(), bit_string(key)]),
    ]);
    sequence(&[tbs, ed25519, bit_string(&[0u8; 64])])
}

fn attribute(oid_str: &str, value: Vec<u8>) -> Vec<u8> {
    sequence(&[oid(oid_str), set(&[value])])
}

/// Ed25519 Authenticode SignedData
#[derive(Debug, Clone)]
pub(crate) struct SignedDataFixture {
    pub(crate) signing_key: SigningKey,
    pub(crate) image_digest: Vec<u8>,
    pub(crate) digest_algorithm: DigestAlgorithm,
    pub(crate) signer_digest_algorithm: DigestAlgorithm,
    pub(crate) serial: Vec<u8>,
    pub(crate) authenticated: bool,
    pub(crate) message_digest: bool,
    /// Signers after the first carry the serial with their index appended
    pub(crate) signers: usize,
}

impl SignedDataFixture {
    pub(crate) fn new() -> Self {
        SignedDataFixture {
            signing_key: SigningKey::from_bytes(&[42u8; 32]),
            image_digest: hash(b"image", DigestAlgorithm::Sha256).unwrap(),
            digest_algorithm: DigestAlgorithm::Sha256,
            signer_digest_algorithm: DigestAlgorithm::Sha256,
            serial: vec![0x01, 0x23],
            authenticated: false,
            message_digest: true,
            signers: 1,
        }
    }

    pub(crate) fn with_authenticated_attributes(mut self) -> Self {
        self.authenticated = true;
        self
    }

    pub(crate) fn certificate(&self) -> Vec<u8> {
        ed25519_certificate(
            "peforge test CA",
            &self.serial,
            self.signing_key.verifying_key().as_bytes(),
        )
    }

    /// Contents of the SpcIndirectDataContent SEQUENCE
    pub(crate) fn content_region(&self) -> Vec<u8> {
        let data = sequence(&[oid(OID_SPC_PE_IMAGE_DATA), sequence(&[bit_string(&[])])]);
        let digest_oid = self.digest_algorithm.oid().unwrap_or(OID_SHA256);
        let digest_info = sequence(&[
            algorithm_identifier(digest_oid),
            octet_string(&self.image_digest),
        ]);
        [data, digest_info].concat()
    }

    fn attributes(&self) -> Vec<Vec<u8>> {
        let opus = sequence(&[
            explicit(0, &[implicit(0, &bmp_bytes("peforge test"))]),
            explicit(1, &[implicit(0, b"https://example.invalid")]),
        ]);
        let mut attributes = vec![
            attribute(OID_CONTENT_TYPE, oid(OID_SPC_INDIRECT_DATA)),
            attribute(OID_SIGNING_TIME, time(2024, 5, 6)),
            attribute(OID_SPC_SP_OPUS_INFO, opus),
            attribute(
                OID_SPC_STATEMENT_TYPE,
                sequence(&[oid("1.3.6.1.4.1.311.2.1.21")]),
            ),
        ];
        if self.message_digest {
            let digest = hash(&self.content_region(), self.digest_algorithm).unwrap();
            attributes.push(attribute(OID_MESSAGE_DIGEST, octet_string(&digest)));
        }
        attributes
    }

    /// Authenticated attributes as the SET the signature covers
    pub(crate) fn attributes_der(&self) -> Vec<u8> {
        set(&self.attributes())
    }

    fn signer(&self, serial: &[u8]) -> Vec<u8> {
        let attributes = self.attributes_der();
        let signed_bytes = if self.authenticated {
            attributes.clone()
        } else {
            self.content_region()
        };
        let digest = hash(&signed_bytes, self.digest_algorithm).unwrap();
        let signature = self.signing_key.sign(&digest).to_bytes();

        let mut signer = vec![
            integer(&[1]),
            sequence(&[name("peforge test CA"), integer(serial)]),
            algorithm_identifier(self.signer_digest_algorithm.oid().unwrap()),
        ];
        if self.authenticated {
            // [0] IMPLICIT keeps the SET contents
            let mut implicit_set = attributes;
            implicit_set[0] = 0xA0;
            signer.push(implicit_set);
        }
        signer.push(sequence(&[oid(OID_ED25519)]));
        signer.push(octet_string(&signature));
        sequence(&signer)
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let signers: Vec<Vec<u8>> = (0..self.signers)
            .map(|index| match index {
                0 => self.signer(&self.serial),
                n => self.signer(&[self.serial.as_slice(), &[n as u8]].concat()),
            })
            .collect();

        let signed_data = sequence(&[
            integer(&[1]),
            set(&[algorithm_identifier(self.digest_algorithm.oid().unwrap())]),
            sequence(&[
                oid(OID_SPC_INDIRECT_DATA),
                explicit(0, &[tlv(Tag::Sequence, &self.content_region())]),
            ]),
            explicit(0, &[self.certificate()]),
            set(&signers),
        ]);
        sequence(&[oid(OID_SIGNED_DATA), explicit(0, &[signed_data])])
    }
}
