use std::fmt;
use std::path::Path;

use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{BasicConstraints, KeyUsage, SubjectKeyIdentifier};
use openssl::x509::{X509Builder, X509};
use tracing::info;
use x509_parser::parse_x509_certificate;

use crate::error::{CertError, CertResult};
use crate::material::{Encoding, KeyCertMaterial};
use crate::params::{
    generate_rsa_key, random_hex, serial_number, subject_name, validity_window, X509_VERSION_3,
};

const CA_ORGANIZATION_PREFIX: &str = "mitm-certs";
const CA_BACKDATE_DAYS: i64 = 60;

/// A trust anchor: a self-issued `CA:true` certificate together with its key.
#[derive(Clone)]
pub struct CertificateAuthority {
    certificate: X509,
    private_key: PKey<Private>,
}

impl CertificateAuthority {
    /// Wraps existing material after checking that it can act as a root
    /// issuer: key and certificate agree, the certificate is self-issued and
    /// carries `CA:true`.
    pub fn from_material(material: KeyCertMaterial) -> CertResult<Self> {
        let (private_key, certificate) = material.into_parts();
        let certificate = certificate.ok_or(CertError::State("CA certificate"))?;
        let private_key = private_key.ok_or(CertError::State("CA private key"))?;

        if !certificate.public_key()?.public_eq(&private_key) {
            return Err(CertError::InvalidConfiguration(
                "CA certificate and private key do not match".to_string(),
            ));
        }
        if certificate.issuer_name().to_der()? != certificate.subject_name().to_der()? {
            return Err(CertError::InvalidConfiguration(
                "CA certificate is not self-issued".to_string(),
            ));
        }
        if !has_ca_basic_constraints(&certificate)? {
            return Err(CertError::InvalidConfiguration(
                "CA certificate does not carry basicConstraints CA:true".to_string(),
            ));
        }
        Ok(Self {
            certificate,
            private_key,
        })
    }

    pub fn load(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        passphrase: Option<&str>,
    ) -> CertResult<Self> {
        Self::from_material(KeyCertMaterial::load_from_files(
            cert_path, key_path, passphrase,
        )?)
    }

    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }

    pub fn private_key(&self) -> &PKey<Private> {
        &self.private_key
    }

    /// Both halves as a [`KeyCertMaterial`], e.g. for [`crate::resign`].
    pub fn to_material(&self) -> KeyCertMaterial {
        KeyCertMaterial::new(Some(self.private_key.clone()), Some(self.certificate.clone()))
    }

    pub fn into_material(self) -> KeyCertMaterial {
        KeyCertMaterial::new(Some(self.private_key), Some(self.certificate))
    }

    pub fn certificate_pem(&self) -> CertResult<String> {
        let pem = self.certificate.to_pem()?;
        String::from_utf8(pem).map_err(|error| CertError::parse("CA certificate PEM", error))
    }

    pub fn save(
        &self,
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        passphrase: Option<&str>,
    ) -> CertResult<()> {
        let material = self.to_material();
        material.save_certificate(cert_path, Encoding::Pem)?;
        material.save_private_key(key_path, passphrase, Encoding::Pem)
    }
}

impl fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("key_bits", &self.private_key.bits())
            .finish_non_exhaustive()
    }
}

/// Creates a self-signed RSA root CA.
///
/// The organization carries a random suffix so that two roots generated with
/// the same common name never share a subject.
pub fn generate_root_ca(common_name: &str, serial: u64) -> CertResult<CertificateAuthority> {
    if common_name.trim().is_empty() {
        return Err(CertError::Validation(
            "CA common name must not be empty".to_string(),
        ));
    }

    let key = generate_rsa_key()?;
    let organization = format!("{CA_ORGANIZATION_PREFIX}-{}", random_hex(4)?);
    let name = subject_name(&organization, Some(common_name))?;
    let (not_before, not_after) = validity_window(CA_BACKDATE_DAYS)?;

    let mut builder = X509Builder::new()?;
    builder.set_version(X509_VERSION_3)?;
    let asn1_serial = serial_number(serial)?;
    builder.set_serial_number(&asn1_serial)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;
    builder.set_pubkey(&key)?;

    builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    builder.append_extension(
        KeyUsage::new()
            .critical()
            .digital_signature()
            .key_cert_sign()
            .build()?,
    )?;
    let subject_key_id = SubjectKeyIdentifier::new().build(&builder.x509v3_context(None, None))?;
    builder.append_extension(subject_key_id)?;

    builder.sign(&key, MessageDigest::sha256())?;
    let certificate = builder.build();

    info!(common_name, organization = %organization, serial, "generated root CA");
    Ok(CertificateAuthority {
        certificate,
        private_key: key,
    })
}

/// Bootstrap entry point: generates a root CA and writes it as PEM files.
pub fn generate_root_ca_files(
    out_cert_path: impl AsRef<Path>,
    out_key_path: impl AsRef<Path>,
    serial: u64,
    common_name: &str,
) -> CertResult<CertificateAuthority> {
    let ca = generate_root_ca(common_name, serial)?;
    ca.save(out_cert_path, out_key_path, None)?;
    Ok(ca)
}

fn has_ca_basic_constraints(certificate: &X509) -> CertResult<bool> {
    let der = certificate.to_der()?;
    let (_, parsed) = parse_x509_certificate(&der)
        .map_err(|error| CertError::parse("CA certificate", error))?;
    let constraints = parsed
        .basic_constraints()
        .map_err(|error| CertError::parse("CA basic constraints", error))?;
    Ok(constraints.is_some_and(|extension| extension.value.ca))
}
