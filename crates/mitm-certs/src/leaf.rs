use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

use openssl::hash::MessageDigest;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
    SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509Ref};
use tracing::debug;

use crate::authority::CertificateAuthority;
use crate::error::{CertError, CertResult};
use crate::identity::HostIdentitySet;
use crate::material::{Encoding, KeyCertMaterial};
use crate::params::{generate_rsa_key, serial_number, subject_name, validity_window, X509_VERSION_3};
use crate::persist::{commit_all, stage};

const LEAF_ORGANIZATION: &str = "Server";
const LEAF_BACKDATE_DAYS: i64 = 30;
pub const DEFAULT_LEAF_SERIAL: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectAltName {
    Dns(String),
    Ip(IpAddr),
}

impl fmt::Display for SubjectAltName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dns(name) => write!(f, "DNS:{name}"),
            Self::Ip(addr) => write!(f, "IP:{addr}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafProfile {
    Server,
    Client,
}

impl LeafProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafRequest {
    pub dns_names: Vec<String>,
    pub ip_addrs: Vec<String>,
    pub common_name: Option<String>,
    pub serial: u64,
}

impl Default for LeafRequest {
    fn default() -> Self {
        Self {
            dns_names: Vec::new(),
            ip_addrs: Vec::new(),
            common_name: None,
            serial: DEFAULT_LEAF_SERIAL,
        }
    }
}

impl LeafRequest {
    pub fn new<D, I>(dns_names: D, ip_addrs: I) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            dns_names: dns_names.into_iter().map(Into::into).collect(),
            ip_addrs: ip_addrs.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn for_identities(identities: &HostIdentitySet) -> Self {
        Self::new(
            identities.dns_names().iter().cloned(),
            identities.ip_addrs().iter().cloned(),
        )
    }

    pub fn with_common_name(mut self, common_name: impl Into<String>) -> Self {
        self.common_name = Some(common_name.into());
        self
    }

    pub fn with_serial(mut self, serial: u64) -> Self {
        self.serial = serial;
        self
    }

    /// DNS entries first, then IP entries, each in the order given.
    pub fn subject_alt_names(&self) -> CertResult<Vec<SubjectAltName>> {
        let mut names = Vec::with_capacity(self.dns_names.len() + self.ip_addrs.len());
        for dns_name in &self.dns_names {
            validate_dns_name(dns_name)?;
            names.push(SubjectAltName::Dns(dns_name.clone()));
        }
        for ip_addr in &self.ip_addrs {
            let addr = ip_addr.trim().parse::<IpAddr>().map_err(|_| {
                CertError::Validation(format!("invalid IP address in subjectAltName: {ip_addr:?}"))
            })?;
            names.push(SubjectAltName::Ip(addr));
        }
        Ok(names)
    }
}

/// Where to write an issued leaf. Unset paths are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafOutput {
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    /// Append the issuing CA certificate after the leaf in the certificate file.
    pub include_ca: bool,
}

/// Issues a CA-signed server certificate.
///
/// Fails with [`CertError::Validation`] unless at least one DNS name or IP
/// address is requested; clients ignore the common name when matching hosts.
pub fn issue_server_certificate(
    ca: &CertificateAuthority,
    request: &LeafRequest,
) -> CertResult<KeyCertMaterial> {
    issue_leaf(ca, request, LeafProfile::Server)
}

/// Issues a CA-signed client certificate. An empty name list is allowed.
pub fn issue_client_certificate(
    ca: &CertificateAuthority,
    request: &LeafRequest,
) -> CertResult<KeyCertMaterial> {
    issue_leaf(ca, request, LeafProfile::Client)
}

/// Writes a leaf to the locations in `output`, optionally followed by the CA
/// certificate for chain delivery.
///
/// Both files are staged before either is moved into place; on error neither
/// path is left holding new content.
pub fn write_leaf(
    ca: &CertificateAuthority,
    leaf: &KeyCertMaterial,
    output: &LeafOutput,
) -> CertResult<()> {
    let mut staged = Vec::with_capacity(2);
    if let Some(cert_path) = &output.cert_path {
        let leaf_pem = leaf.serialize_certificate(Encoding::Pem)?;
        if output.include_ca {
            let ca_pem = ca.certificate_pem()?;
            staged.push(stage(cert_path, &[&leaf_pem, ca_pem.as_bytes()])?);
        } else {
            staged.push(stage(cert_path, &[&leaf_pem])?);
        }
    }
    if let Some(key_path) = &output.key_path {
        let key_pem = leaf.serialize_private_key(None, Encoding::Pem)?;
        staged.push(stage(key_path, &[&key_pem])?);
    }
    commit_all(staged)
}

fn issue_leaf(
    ca: &CertificateAuthority,
    request: &LeafRequest,
    profile: LeafProfile,
) -> CertResult<KeyCertMaterial> {
    let alt_names = request.subject_alt_names()?;
    if profile == LeafProfile::Server && alt_names.is_empty() {
        return Err(CertError::Validation(
            "server certificate needs at least one DNS name or IP address; common name alone is not used for host matching"
                .to_string(),
        ));
    }

    let common_name = request
        .common_name
        .as_deref()
        .filter(|common_name| !common_name.is_empty());
    let ca_cert: &X509Ref = ca.certificate();
    let key = generate_rsa_key()?;
    let name = subject_name(LEAF_ORGANIZATION, common_name)?;
    let (not_before, not_after) = validity_window(LEAF_BACKDATE_DAYS)?;

    let mut builder = X509Builder::new()?;
    builder.set_version(X509_VERSION_3)?;
    let asn1_serial = serial_number(request.serial)?;
    builder.set_serial_number(&asn1_serial)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(ca_cert.subject_name())?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;
    builder.set_pubkey(&key)?;

    builder.append_extension(BasicConstraints::new().critical().build()?)?;
    builder.append_extension(
        KeyUsage::new()
            .critical()
            .digital_signature()
            .key_encipherment()
            .build()?,
    )?;
    builder.append_extension(ExtendedKeyUsage::new().server_auth().client_auth().build()?)?;
    let authority_key_id = AuthorityKeyIdentifier::new()
        .keyid(false)
        .build(&builder.x509v3_context(Some(ca_cert), None))?;
    builder.append_extension(authority_key_id)?;
    let subject_key_id =
        SubjectKeyIdentifier::new().build(&builder.x509v3_context(Some(ca_cert), None))?;
    builder.append_extension(subject_key_id)?;

    if !alt_names.is_empty() {
        let mut san = SubjectAlternativeName::new();
        for alt_name in &alt_names {
            match alt_name {
                SubjectAltName::Dns(dns_name) => san.dns(dns_name),
                SubjectAltName::Ip(addr) => san.ip(&addr.to_string()),
            };
        }
        let san = san.build(&builder.x509v3_context(Some(ca_cert), None))?;
        builder.append_extension(san)?;
    }

    builder.sign(ca.private_key(), MessageDigest::sha256())?;
    let certificate = builder.build();

    debug!(
        profile = profile.as_str(),
        serial = request.serial,
        common_name = common_name.unwrap_or(""),
        alt_names = alt_names.len(),
        "issued leaf certificate"
    );
    Ok(KeyCertMaterial::new(Some(key), Some(certificate)))
}

// dNSName is an IA5String holding a host name or wildcard; reject anything that
// could not appear in one.
fn validate_dns_name(dns_name: &str) -> CertResult<()> {
    let valid = !dns_name.is_empty()
        && dns_name.is_ascii()
        && !dns_name
            .chars()
            .any(|c| c == ',' || c == ':' || c.is_ascii_whitespace() || c.is_ascii_control());
    if valid {
        Ok(())
    } else {
        Err(CertError::Validation(format!(
            "invalid DNS name in subjectAltName: {dns_name:?}"
        )))
    }
}
