use openssl::asn1::{Asn1Object, Asn1OctetString};
use openssl::hash::MessageDigest;
use openssl::x509::{X509Builder, X509Extension};
use tracing::debug;
use x509_parser::parse_x509_certificate;

use crate::error::{CertError, CertResult};
use crate::material::KeyCertMaterial;

/// Re-issues `target`'s certificate under `ca`.
///
/// Issuer and signature change; subject, serial, validity, public key and all
/// extensions are carried over byte for byte.
pub fn resign(ca: &KeyCertMaterial, target: &mut KeyCertMaterial) -> CertResult<()> {
    let certificate = target
        .certificate()
        .ok_or(CertError::State("certificate to re-sign"))?;
    let ca_certificate = ca.certificate().ok_or(CertError::State("CA certificate"))?;
    let ca_key = ca.private_key().ok_or(CertError::State("CA private key"))?;

    let der = certificate.to_der()?;
    let (_, parsed) =
        parse_x509_certificate(&der).map_err(|error| CertError::parse("certificate", error))?;

    let mut builder = X509Builder::new()?;
    builder.set_version(certificate.version())?;
    builder.set_serial_number(certificate.serial_number())?;
    builder.set_subject_name(certificate.subject_name())?;
    builder.set_issuer_name(ca_certificate.subject_name())?;
    builder.set_not_before(certificate.not_before())?;
    builder.set_not_after(certificate.not_after())?;
    let public_key = certificate.public_key()?;
    builder.set_pubkey(&public_key)?;

    for extension in parsed.extensions() {
        let oid = Asn1Object::from_str(&extension.oid.to_id_string())?;
        let contents = Asn1OctetString::new_from_bytes(extension.value)?;
        builder.append_extension(X509Extension::new_from_der(
            &oid,
            extension.critical,
            &contents,
        )?)?;
    }

    builder.sign(ca_key, MessageDigest::sha256())?;
    let resigned = builder.build();
    debug!(extensions = parsed.extensions().len(), "re-signed certificate");

    target.replace_certificate(resigned);
    Ok(())
}
