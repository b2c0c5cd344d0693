//! Certificate lookup by issuer and serial number.

use log::{debug, warn};

use super::Signature;
use super::x509::{Certificate, Name};
use crate::exceptions::{ForgeError, Result};
use crate::utils::colon_hex;

/// Ordered collection of certificates searched by `(issuer, serial)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateStore {
    certificates: Vec<Certificate>,
}

impl CertificateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `CERTIFICATE` block of a PEM bundle
    pub fn from_pem(text: &str) -> Result<Self> {
        let blocks = pem::parse_many(text)
            .map_err(|e| ForgeError::MalformedEncoding(format!("PEM: {e}")))?;
        let mut store = Self::new();
        for block in blocks.iter().filter(|b| b.tag() == "CERTIFICATE") {
            store.push(Certificate::from_der(block.contents())?);
        }
        debug!("🔑 Loaded {} certificate(s) from PEM", store.len());
        Ok(store)
    }

    pub fn push(&mut self, certificate: Certificate) {
        self.certificates.push(certificate);
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Certificate> {
        self.certificates.iter()
    }

    /// First certificate issued by `issuer` with `serial`.
    ///
    /// More than one match is logged as a warning and the earliest wins.
    pub fn find(&self, issuer: &Name, serial: &[u8]) -> Option<&Certificate> {
        let mut matches = self
            .certificates
            .iter()
            .filter(|cert| cert.matches(issuer, serial));
        let first = matches.next()?;
        let others = matches.count();
        if others > 0 {
            warn!(
                "{} certificates match issuer '{}' serial {}; using the first",
                others + 1,
                issuer,
                colon_hex(serial)
            );
        }
        Some(first)
    }
}

impl From<Vec<Certificate>> for CertificateStore {
    fn from(certificates: Vec<Certificate>) -> Self {
        CertificateStore { certificates }
    }
}

impl From<&Signature> for CertificateStore {
    fn from(signature: &Signature) -> Self {
        CertificateStore {
            certificates: signature.certificates().to_vec(),
        }
    }
}

impl FromIterator<Certificate> for CertificateStore {
    fn from_iter<I: IntoIterator<Item = Certificate>>(iter: I) -> Self {
        CertificateStore {
            certificates: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{SignedDataFixture, ed25519_certificate};
    use super::*;

    fn cert(serial: &[u8], key: u8) -> Certificate {
        Certificate::from_der(&ed25519_certificate("Store CA", serial, &[key; 32])).unwrap()
    }

    #[test]
    fn test_find_by_issuer_and_serial() {
        let store: CertificateStore = vec![cert(&[1], 1), cert(&[2], 2)].into();
        let issuer = store.iter().next().unwrap().issuer().clone();

        assert_eq!(store.len(), 2);
        let found = store.find(&issuer, &[2]).unwrap();
        assert_eq!(found.serial_number(), &[2]);
        assert!(store.find(&issuer, &[3]).is_none());
        assert!(CertificateStore::new().find(&issuer, &[1]).is_none());
    }

    #[test]
    fn test_duplicate_match_uses_first() {
        let first = cert(&[7], 1);
        let second = cert(&[7], 2);
        let store: CertificateStore = vec![first.clone(), second].into();
        let found = store.find(first.issuer(), &[7]).unwrap();
        assert_eq!(found, &first);
    }

    #[test]
    fn test_from_pem_bundle() {
        let fixture = SignedDataFixture::new();
        let bundle = pem::encode_many(&[
            pem::Pem::new("CERTIFICATE", fixture.certificate()),
            pem::Pem::new("PRIVATE KEY", vec![0u8; 4]),
            pem::Pem::new("CERTIFICATE", ed25519_certificate("Other", &[9], &[3; 32])),
        ]);
        let store = CertificateStore::from_pem(&bundle).unwrap();
        assert_eq!(store.len(), 2);

        assert!(CertificateStore::from_pem("").unwrap().is_empty());
        let broken = pem::encode(&pem::Pem::new("CERTIFICATE", vec![0x30, 0x05]));
        assert!(CertificateStore::from_pem(&broken).is_err());
    }
}
