//! PKCS#7 SignedData decoder for the Authenticode profile.
//!
//! The structure is decoded with the `cms` and `x509-cert` types. A second
//! pass over the same bytes with a [`SliceReader`] records where the signed
//! content and the first signer's authenticated attributes sit, since those
//! byte ranges are what the signatures were computed over.

use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo as CmsContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo as CmsSignerInfo};
use der::asn1::{Any, ObjectIdentifier, OctetString};
use der::{Decode, DecodeOwned, Encode, Reader, Sequence, SliceReader, Tag, TagNumber, Tagged};
use log::{debug, trace, warn};
use std::ops::Range;
use x509_cert::attr::Attribute as X509Attribute;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::time::Time;

use super::algorithms::{DigestAlgorithm, KeyAlgorithm};
use super::content_info::ContentInfo;
use super::signer_info::{Attribute, SignerInfo};
use super::x509::{Certificate, Name, decode_bmp, naive_time};
use super::{ATTRIBUTES_TAG, Signature, SignatureBuilder};
use crate::exceptions::{ForgeError, Result};
use crate::pe::constants::*;

/// SpcAttributeTypeAndOptionalValue
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct SpcAttributeTypeAndOptionalValue {
    value_type: ObjectIdentifier,
    #[asn1(optional = "true")]
    value: Option<Any>,
}

/// DigestInfo as embedded in SpcIndirectDataContent
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct DigestInfo {
    digest_algorithm: AlgorithmIdentifierOwned,
    digest: OctetString,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct SpcIndirectDataContent {
    data: SpcAttributeTypeAndOptionalValue,
    message_digest: DigestInfo,
}

fn malformed(msg: impl Into<String>) -> ForgeError {
    ForgeError::MalformedEncoding(msg.into())
}

/// Prefix der errors with the element being decoded
fn context(what: &'static str) -> impl FnOnce(der::Error) -> ForgeError {
    move |err| malformed(format!("{what}: {err}"))
}

fn decode_any<T: DecodeOwned>(value: &Any, what: &'static str) -> Result<T> {
    T::from_der(&value.to_der()?).map_err(context(what))
}

fn oid_string(oid: &ObjectIdentifier) -> String {
    oid.to_string()
}

/// Decode a DER PKCS#7 ContentInfo carrying Authenticode SignedData.
///
/// Bytes after the outer ContentInfo (WIN_CERTIFICATE padding) are ignored
/// and not part of [`Signature::raw_der`].
pub fn decode_pkcs7(bytes: &[u8]) -> Result<Signature> {
    let mut top = SliceReader::new(bytes)?;
    let raw = top.tlv_bytes().map_err(context("ContentInfo"))?;
    if !top.is_finished() {
        trace!("Ignoring {} byte(s) after ContentInfo", top.remaining_len());
    }

    let info = CmsContentInfo::from_der(raw).map_err(context("ContentInfo"))?;
    let content_type = oid_string(&info.content_type);
    if content_type != OID_SIGNED_DATA {
        return Err(malformed(format!(
            "expected signedData ({OID_SIGNED_DATA}), found {content_type}"
        )));
    }
    let signed_data = info
        .content
        .decode_as::<SignedData>()
        .map_err(context("SignedData"))?;

    let declared = signed_data.digest_algorithms.as_slice();
    if declared.len() > 1 {
        warn!("SignedData declares {} digest algorithms, using the first", declared.len());
    }
    let digest_algorithm = declared
        .first()
        .map(|alg| DigestAlgorithm::from_oid(&oid_string(&alg.oid)))
        .unwrap_or_default();

    let content_info = content_info(&signed_data)?;

    let mut certificates = Vec::new();
    if let Some(set) = &signed_data.certificates {
        for choice in set.0.iter() {
            match choice {
                CertificateChoices::Certificate(cert) => {
                    certificates.push(Certificate::from_x509(cert, cert.to_der()?)?);
                }
                _ => debug!("Skipping non-X.509 certificate choice"),
            }
        }
    }
    if signed_data.crls.is_some() {
        trace!("Skipping CRLs");
    }

    let signers = signed_data
        .signer_infos
        .0
        .iter()
        .map(signer_info)
        .collect::<Result<Vec<_>>>()?;

    let (content_info_range, auth_range) = locate_regions(raw)?;

    debug!(
        "🔏 Decoded SignedData: {} certificate(s), {} signer(s), {}",
        certificates.len(),
        signers.len(),
        digest_algorithm
    );

    Ok(SignatureBuilder {
        version: signed_data.version as u32,
        digest_algorithm,
        content_info,
        certificates,
        signers,
        content_info_range,
        auth_range,
        raw: raw.to_vec(),
    }
    .build())
}

/// ContentInfo { SPC_INDIRECT_DATA, [0] SpcIndirectDataContent }
fn content_info(signed_data: &SignedData) -> Result<ContentInfo> {
    let encap = &signed_data.encap_content_info;
    let content_type = oid_string(&encap.econtent_type);
    if content_type != OID_SPC_INDIRECT_DATA {
        return Err(malformed(format!(
            "expected SPC_INDIRECT_DATA ({OID_SPC_INDIRECT_DATA}), found {content_type}"
        )));
    }
    let econtent = encap
        .econtent
        .as_ref()
        .ok_or_else(|| malformed("SpcIndirectDataContent is missing"))?;
    let spc: SpcIndirectDataContent = decode_any(econtent, "SpcIndirectDataContent")?;

    let spc_type = oid_string(&spc.data.value_type);
    if spc_type != OID_SPC_PE_IMAGE_DATA {
        debug!("Signed content type {spc_type} is not PE image data");
    }
    let digest_info = spc.message_digest;
    Ok(ContentInfo {
        content_type,
        spc_type,
        digest_algorithm: DigestAlgorithm::from_oid(&oid_string(
            &digest_info.digest_algorithm.oid,
        )),
        digest: digest_info.digest.as_bytes().to_vec(),
    })
}

fn signer_info(signer: &CmsSignerInfo) -> Result<SignerInfo> {
    let SignerIdentifier::IssuerAndSerialNumber(id) = &signer.sid else {
        return Err(malformed(
            "SignerInfo names its certificate by key identifier, not issuer and serial",
        ));
    };

    let authenticated_attributes = match &signer.signed_attrs {
        Some(attributes) => attributes
            .iter()
            .map(attribute)
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    let signature_algorithm_oid = oid_string(&signer.signature_algorithm.oid);

    Ok(SignerInfo {
        version: signer.version as u32,
        issuer: Name::from_x509(&id.issuer)?,
        serial_number: id.serial_number.as_bytes().to_vec(),
        digest_algorithm: DigestAlgorithm::from_oid(&oid_string(&signer.digest_alg.oid)),
        signature_algorithm: KeyAlgorithm::from_oid(&signature_algorithm_oid),
        signature_algorithm_oid,
        encrypted_digest: signer.signature.as_bytes().to_vec(),
        authenticated_attributes,
        unauthenticated_attributes: signer.unsigned_attrs.as_ref().map_or(0, |a| a.len()),
    })
}

fn attribute(attribute: &X509Attribute) -> Result<Attribute> {
    let oid = oid_string(&attribute.oid);
    let first = attribute
        .values
        .iter()
        .next()
        .ok_or_else(|| malformed(format!("attribute {oid} has no value")))?;

    let decoded = match oid.as_str() {
        OID_CONTENT_TYPE => Attribute::ContentType {
            oid: oid_string(&decode_any::<ObjectIdentifier>(first, "contentType")?),
        },
        OID_MESSAGE_DIGEST => Attribute::MessageDigest {
            digest: decode_any::<OctetString>(first, "messageDigest")?
                .as_bytes()
                .to_vec(),
        },
        OID_SIGNING_TIME => Attribute::SigningTime {
            time: naive_time(&decode_any::<Time>(first, "signingTime")?)?,
        },
        OID_SPC_SP_OPUS_INFO => opus_info(first)?,
        OID_SPC_STATEMENT_TYPE => Attribute::SpcStatementType {
            purposes: decode_any::<Vec<ObjectIdentifier>>(first, "SpcStatementType")?
                .iter()
                .map(oid_string)
                .collect(),
        },
        _ => Attribute::Generic {
            oid,
            raw: attribute.values.to_der()?,
        },
    };
    trace!("Authenticated attribute {decoded}");
    Ok(decoded)
}

const fn explicit(number: TagNumber) -> Tag {
    Tag::ContextSpecific {
        constructed: true,
        number,
    }
}

const fn implicit(number: TagNumber) -> Tag {
    Tag::ContextSpecific {
        constructed: false,
        number,
    }
}

/// Contents of an EXPLICIT wrapper, `None` when it is empty
fn unwrap_explicit(field: &Any) -> Result<Option<Any>> {
    if field.value().is_empty() {
        return Ok(None);
    }
    Any::from_der(field.value()).map(Some).map_err(context("explicit tag"))
}

/// SpcSpOpusInfo ::= SEQUENCE { [0] SpcString OPTIONAL, [1] SpcLink OPTIONAL }
fn opus_info(value: &Any) -> Result<Attribute> {
    let mut program_name = None;
    let mut more_info = None;
    for field in decode_any::<Vec<Any>>(value, "SpcSpOpusInfo")? {
        let Some(inner) = unwrap_explicit(&field)? else {
            continue;
        };
        match field.tag() {
            t if t == explicit(TagNumber::N0) => program_name = Some(spc_string(&inner)?),
            t if t == explicit(TagNumber::N1) => more_info = spc_link(&inner)?,
            other => trace!("Ignoring SpcSpOpusInfo field {other}"),
        }
    }
    Ok(Attribute::SpcSpOpusInfo {
        program_name,
        more_info,
    })
}

/// SpcString ::= CHOICE { [0] IMPLICIT BMPString, [1] IMPLICIT IA5String }
fn spc_string(value: &Any) -> Result<String> {
    match value.tag() {
        t if t == implicit(TagNumber::N0) => Ok(decode_bmp(value.value())),
        t if t == implicit(TagNumber::N1) => Ok(String::from_utf8_lossy(value.value()).into_owned()),
        other => Err(malformed(format!("unknown SpcString choice {other}"))),
    }
}

/// SpcLink ::= CHOICE { [0] IMPLICIT IA5String url, [1] moniker, [2] EXPLICIT SpcString file }
fn spc_link(value: &Any) -> Result<Option<String>> {
    match value.tag() {
        t if t == implicit(TagNumber::N0) => {
            Ok(Some(String::from_utf8_lossy(value.value()).into_owned()))
        }
        t if t == explicit(TagNumber::N2) => match unwrap_explicit(value)? {
            Some(file) => spc_string(&file).map(Some),
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

fn position(reader: &SliceReader<'_>) -> Result<usize> {
    Ok(usize::try_from(reader.position())?)
}

/// Step into a constructed element carrying `tag`
fn enter(reader: &mut SliceReader<'_>, tag: Tag, what: &'static str) -> Result<()> {
    let header = reader.peek_header().map_err(context(what))?;
    if header.tag != tag {
        return Err(malformed(format!("{what}: expected {tag}, found {}", header.tag)));
    }
    der::Header::decode(reader).map_err(context(what))?;
    Ok(())
}

/// Consume one element, returning its whole encoding's range
fn skip(reader: &mut SliceReader<'_>, what: &'static str) -> Result<Range<usize>> {
    let start = position(reader)?;
    reader.tlv_bytes().map_err(context(what))?;
    Ok(start..position(reader)?)
}

/// Byte ranges inside `raw` of the SpcIndirectDataContent contents and of
/// the first signer's `[0]` authenticated attributes (`0..0` when absent)
fn locate_regions(raw: &[u8]) -> Result<(Range<usize>, Range<usize>)> {
    let mut reader = SliceReader::new(raw)?;
    enter(&mut reader, Tag::Sequence, "ContentInfo")?;
    skip(&mut reader, "ContentInfo.contentType")?;
    enter(&mut reader, explicit(TagNumber::N0), "ContentInfo.content")?;
    enter(&mut reader, Tag::Sequence, "SignedData")?;
    skip(&mut reader, "SignedData.version")?;
    skip(&mut reader, "SignedData.digestAlgorithms")?;
    enter(&mut reader, Tag::Sequence, "SignedData.contentInfo")?;
    skip(&mut reader, "contentInfo.contentType")?;
    enter(&mut reader, explicit(TagNumber::N0), "contentInfo.content")?;

    let header = reader.peek_header().map_err(context("SpcIndirectDataContent"))?;
    let spc = skip(&mut reader, "SpcIndirectDataContent")?;
    let content = spc.start + usize::try_from(header.encoded_len()?)?..spc.end;

    // certificates [0] and crls [1] come before signerInfos
    while reader.peek_tag().map_err(context("SignedData.signerInfos"))? != Tag::Set {
        skip(&mut reader, "SignedData.certificates")?;
    }
    enter(&mut reader, Tag::Set, "SignedData.signerInfos")?;
    if reader.is_finished() {
        return Ok((content, 0..0));
    }

    enter(&mut reader, Tag::Sequence, "SignerInfo")?;
    skip(&mut reader, "SignerInfo.version")?;
    skip(&mut reader, "SignerInfo.sid")?;
    skip(&mut reader, "SignerInfo.digestAlgorithm")?;
    let auth = if reader.peek_tag().map_err(context("SignerInfo"))? == ATTRIBUTES_TAG {
        skip(&mut reader, "SignerInfo.authenticatedAttributes")?
    } else {
        0..0
    };
    Ok((content, auth))
}
