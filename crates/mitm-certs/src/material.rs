use std::fmt;
use std::fs;
use std::path::Path;

use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::symm::Cipher;
use openssl::x509::X509;
use serde::{Deserialize, Serialize};
use x509_parser::der_parser::ber::BerObjectContent;
use x509_parser::der_parser::parse_der;

use crate::error::{io_error, CertError, CertResult};
use crate::persist::write_atomic;

const ENCRYPTED_PKCS8_LABEL: &str = "ENCRYPTED PRIVATE KEY";
const ENCRYPTED_LEGACY_HEADER: &str = "Proc-Type: 4,ENCRYPTED";

/// On-disk encoding of certificates and private keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Pem,
    Der,
}

/// An optional private key paired with an optional X.509 certificate.
///
/// Issuance fills both halves. Loading from files may fill either half on its
/// own, and a certificate and key loaded from separate sources are not checked
/// against each other.
#[derive(Clone, Default)]
pub struct KeyCertMaterial {
    private_key: Option<PKey<Private>>,
    certificate: Option<X509>,
}

impl KeyCertMaterial {
    pub fn new(private_key: Option<PKey<Private>>, certificate: Option<X509>) -> Self {
        Self {
            private_key,
            certificate,
        }
    }

    /// Loads a PEM certificate and a PEM private key in one step.
    pub fn load_from_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        passphrase: Option<&str>,
    ) -> CertResult<Self> {
        let mut material = Self::default();
        material.load_certificate(cert_path, Encoding::Pem)?;
        material.load_private_key(key_path, passphrase, Encoding::Pem)?;
        Ok(material)
    }

    pub fn certificate(&self) -> Option<&X509> {
        self.certificate.as_ref()
    }

    pub fn private_key(&self) -> Option<&PKey<Private>> {
        self.private_key.as_ref()
    }

    pub fn into_parts(self) -> (Option<PKey<Private>>, Option<X509>) {
        (self.private_key, self.certificate)
    }

    pub(crate) fn replace_certificate(&mut self, certificate: X509) {
        self.certificate = Some(certificate);
    }

    /// Replaces the held certificate with the first certificate found in `path`.
    pub fn load_certificate(&mut self, path: impl AsRef<Path>, encoding: Encoding) -> CertResult<()> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(io_error(path))?;
        self.certificate = Some(parse_certificate(&bytes, encoding)?);
        Ok(())
    }

    /// Replaces the held private key with the key stored in `path`.
    ///
    /// Encrypted keys need `passphrase`; a missing or wrong passphrase yields
    /// [`CertError::Decryption`].
    pub fn load_private_key(
        &mut self,
        path: impl AsRef<Path>,
        passphrase: Option<&str>,
        encoding: Encoding,
    ) -> CertResult<()> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(io_error(path))?;
        self.private_key = Some(parse_private_key(&bytes, passphrase, encoding)?);
        Ok(())
    }

    pub fn serialize_certificate(&self, encoding: Encoding) -> CertResult<Vec<u8>> {
        let certificate = self.certificate.as_ref().ok_or(CertError::State("certificate"))?;
        let bytes = match encoding {
            Encoding::Pem => certificate.to_pem()?,
            Encoding::Der => certificate.to_der()?,
        };
        Ok(bytes)
    }

    /// Encodes the held key as PKCS#8, encrypted with AES-256-CBC when a
    /// passphrase is given.
    pub fn serialize_private_key(
        &self,
        passphrase: Option<&str>,
        encoding: Encoding,
    ) -> CertResult<Vec<u8>> {
        let key = self.private_key.as_ref().ok_or(CertError::State("private key"))?;
        let bytes = match (encoding, passphrase) {
            (Encoding::Pem, None) => key.private_key_to_pem_pkcs8()?,
            (Encoding::Pem, Some(passphrase)) => key
                .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), passphrase.as_bytes())?,
            (Encoding::Der, None) => key.private_key_to_der()?,
            (Encoding::Der, Some(passphrase)) => key
                .private_key_to_pkcs8_passphrase(Cipher::aes_256_cbc(), passphrase.as_bytes())?,
        };
        Ok(bytes)
    }

    /// Bundles certificate and key into a passphrase-protected PKCS#12 archive.
    pub fn export_pkcs12(&self, passphrase: &str) -> CertResult<Vec<u8>> {
        let certificate = self.certificate.as_ref().ok_or(CertError::State("certificate"))?;
        let key = self.private_key.as_ref().ok_or(CertError::State("private key"))?;
        let archive = Pkcs12::builder().pkey(key).cert(certificate).build2(passphrase)?;
        Ok(archive.to_der()?)
    }

    pub fn save_certificate(&self, path: impl AsRef<Path>, encoding: Encoding) -> CertResult<()> {
        let bytes = self.serialize_certificate(encoding)?;
        write_atomic(path.as_ref(), &[&bytes])
    }

    pub fn save_private_key(
        &self,
        path: impl AsRef<Path>,
        passphrase: Option<&str>,
        encoding: Encoding,
    ) -> CertResult<()> {
        let bytes = self.serialize_private_key(passphrase, encoding)?;
        write_atomic(path.as_ref(), &[&bytes])
    }

    pub fn save_pkcs12(&self, path: impl AsRef<Path>, passphrase: &str) -> CertResult<()> {
        let bytes = self.export_pkcs12(passphrase)?;
        write_atomic(path.as_ref(), &[&bytes])
    }
}

impl fmt::Debug for KeyCertMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCertMaterial")
            .field("has_private_key", &self.private_key.is_some())
            .field("has_certificate", &self.certificate.is_some())
            .finish()
    }
}

pub(crate) fn parse_certificate(bytes: &[u8], encoding: Encoding) -> CertResult<X509> {
    let parsed = match encoding {
        Encoding::Pem => X509::from_pem(bytes),
        Encoding::Der => X509::from_der(bytes),
    };
    parsed.map_err(|error| CertError::parse("certificate", error))
}

fn parse_private_key(
    bytes: &[u8],
    passphrase: Option<&str>,
    encoding: Encoding,
) -> CertResult<PKey<Private>> {
    match (encoding, passphrase) {
        (Encoding::Pem, None) => {
            // openssl falls back to an interactive prompt for encrypted PEM
            // when no passphrase callback is installed.
            if pem_is_encrypted(bytes) {
                return Err(CertError::Decryption(
                    "private key is encrypted and no passphrase was supplied".to_string(),
                ));
            }
            PKey::private_key_from_pem(bytes).map_err(|error| CertError::parse("private key", error))
        }
        (Encoding::Pem, Some(passphrase)) => {
            PKey::private_key_from_pem_passphrase(bytes, passphrase.as_bytes()).map_err(|error| {
                if pem_is_encrypted(bytes) {
                    CertError::Decryption(error.to_string())
                } else {
                    CertError::parse("private key", error)
                }
            })
        }
        (Encoding::Der, None) => {
            if der_is_encrypted_pkcs8(bytes) {
                return Err(CertError::Decryption(
                    "private key is encrypted and no passphrase was supplied".to_string(),
                ));
            }
            PKey::private_key_from_der(bytes).map_err(|error| CertError::parse("private key", error))
        }
        (Encoding::Der, Some(passphrase)) => {
            match PKey::private_key_from_pkcs8_passphrase(bytes, passphrase.as_bytes()) {
                Ok(key) => Ok(key),
                Err(decrypt_error) => PKey::private_key_from_der(bytes)
                    .map_err(|_| CertError::Decryption(decrypt_error.to_string())),
            }
        }
    }
}

fn pem_is_encrypted(bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(bytes);
    text.contains(ENCRYPTED_PKCS8_LABEL) || text.contains(ENCRYPTED_LEGACY_HEADER)
}

// EncryptedPrivateKeyInfo is SEQUENCE { AlgorithmIdentifier, OCTET STRING },
// while plain PKCS#8 and PKCS#1 keys open with an INTEGER version.
fn der_is_encrypted_pkcs8(bytes: &[u8]) -> bool {
    let Ok((_, outer)) = parse_der(bytes) else {
        return false;
    };
    matches!(
        outer.as_sequence().map(Vec::as_slice),
        Ok([algorithm, data])
            if matches!(algorithm.content, BerObjectContent::Sequence(_))
                && matches!(data.content, BerObjectContent::OctetString(_))
    )
}
