use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tracing::{debug, info};
use uuid::Uuid;

use crate::authority::{generate_root_ca, CertificateAuthority};
use crate::config::{PoolConfig, DEFAULT_LEAF_COMMON_NAME};
use crate::error::{io_error, CertError, CertResult};
use crate::identity::{CanonicalKey, HostIdentitySet};
use crate::leaf::{issue_server_certificate, write_leaf, LeafOutput, LeafRequest, DEFAULT_LEAF_SERIAL};

const CERT_EXTENSION: &str = "crt";
const KEY_EXTENSION: &str = "key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafCacheStatus {
    Hit,
    Miss,
}

impl LeafCacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub key: CanonicalKey,
    pub cert_id: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PooledCertificate {
    pub record: CertificateRecord,
    pub cache_status: LeafCacheStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolMetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub leaves_issued: u64,
}

/// Host-identity keyed cache of CA-signed server certificates on disk.
///
/// A single lock guards the index and is held while a missing certificate is
/// issued, so lookups queue behind an in-flight issuance.
pub struct CertificatePool {
    base_dir: PathBuf,
    ca: CertificateAuthority,
    default_common_name: String,
    leaf_serial: u64,
    index: Mutex<HashMap<CanonicalKey, CertificateRecord>>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    leaves_issued: AtomicU64,
}

impl CertificatePool {
    pub fn new(base_dir: impl Into<PathBuf>, ca: CertificateAuthority) -> Self {
        Self {
            base_dir: base_dir.into(),
            ca,
            default_common_name: DEFAULT_LEAF_COMMON_NAME.to_string(),
            leaf_serial: DEFAULT_LEAF_SERIAL,
            index: Mutex::new(HashMap::new()),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            leaves_issued: AtomicU64::new(0),
        }
    }

    /// Builds a pool from configuration, loading the CA from disk or
    /// generating and persisting one when neither CA file exists yet.
    pub fn from_config(config: &PoolConfig) -> CertResult<Self> {
        config.validate()?;
        let ca = load_or_generate_ca(config)?;
        Ok(Self::new(config.base_dir.clone(), ca)
            .with_default_common_name(config.default_common_name.clone())
            .with_leaf_serial(config.leaf_serial))
    }

    pub fn with_default_common_name(mut self, common_name: impl Into<String>) -> Self {
        self.default_common_name = common_name.into();
        self
    }

    pub fn with_leaf_serial(mut self, serial: u64) -> Self {
        self.leaf_serial = serial;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn certificate_authority(&self) -> &CertificateAuthority {
        &self.ca
    }

    pub fn ca_certificate_pem(&self) -> CertResult<String> {
        self.ca.certificate_pem()
    }

    /// Returns `(cert_path, key_path)` for the given identities, issuing a
    /// certificate on first request. The certificate file holds the leaf
    /// followed by the CA certificate.
    ///
    /// `common_name` only affects a freshly issued certificate and never
    /// distinguishes otherwise identical identity sets.
    pub fn certificate_for_host<D, I>(
        &self,
        dns_names: D,
        ip_addrs: I,
        common_name: Option<&str>,
    ) -> CertResult<(PathBuf, PathBuf)>
    where
        D: IntoIterator,
        D::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let identities = HostIdentitySet::new(dns_names, ip_addrs);
        let pooled = self.lookup(&identities, common_name)?;
        Ok((pooled.record.cert_path, pooled.record.key_path))
    }

    pub fn lookup(
        &self,
        identities: &HostIdentitySet,
        common_name: Option<&str>,
    ) -> CertResult<PooledCertificate> {
        let key = identities.canonical_key();
        let common_name = common_name.unwrap_or(&self.default_common_name);
        let mut index = self.index.lock().map_err(|_| CertError::LockPoisoned)?;

        if let Some(record) = index.get(&key) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!(
                cert_id = %record.cert_id,
                common_name,
                names = %key,
                "found pooled server certificate"
            );
            return Ok(PooledCertificate {
                record: record.clone(),
                cache_status: LeafCacheStatus::Hit,
            });
        }

        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        let cert_id = Uuid::new_v4().simple().to_string();
        let cert_path = self.base_dir.join(format!("{cert_id}.{CERT_EXTENSION}"));
        let key_path = self.base_dir.join(format!("{cert_id}.{KEY_EXTENSION}"));
        info!(
            cert_id = %cert_id,
            common_name,
            dns_names = ?identities.dns_names(),
            ip_addrs = ?identities.ip_addrs(),
            "generating pooled server certificate"
        );

        let request = LeafRequest::for_identities(identities)
            .with_common_name(common_name)
            .with_serial(self.leaf_serial);
        let leaf = issue_server_certificate(&self.ca, &request)?;
        write_leaf(
            &self.ca,
            &leaf,
            &LeafOutput {
                cert_path: Some(cert_path.clone()),
                key_path: Some(key_path.clone()),
                include_ca: true,
            },
        )?;
        self.leaves_issued.fetch_add(1, Ordering::Relaxed);

        let record = CertificateRecord {
            key: key.clone(),
            cert_id,
            cert_path,
            key_path,
        };
        index.insert(key, record.clone());
        Ok(PooledCertificate {
            record,
            cache_status: LeafCacheStatus::Miss,
        })
    }

    /// Builds a rustls server configuration presenting the pooled chain for
    /// the given identities.
    pub fn server_config_for_host(
        &self,
        identities: &HostIdentitySet,
        common_name: Option<&str>,
    ) -> CertResult<Arc<ServerConfig>> {
        let pooled = self.lookup(identities, common_name)?;
        let chain = read_certificate_chain(&pooled.record.cert_path)?;
        let key = read_private_key(&pooled.record.key_path)?;
        let server_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(chain, key)?;
        Ok(Arc::new(server_config))
    }

    pub fn len(&self) -> CertResult<usize> {
        let index = self.index.lock().map_err(|_| CertError::LockPoisoned)?;
        Ok(index.len())
    }

    pub fn is_empty(&self) -> CertResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn metrics_snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            leaves_issued: self.leaves_issued.load(Ordering::Relaxed),
        }
    }
}

fn load_or_generate_ca(config: &PoolConfig) -> CertResult<CertificateAuthority> {
    match (&config.ca_cert_path, &config.ca_key_path) {
        (Some(ca_cert_path), Some(ca_key_path)) => {
            match (ca_cert_path.exists(), ca_key_path.exists()) {
                (true, true) => CertificateAuthority::load(
                    ca_cert_path,
                    ca_key_path,
                    config.ca_key_passphrase.as_deref(),
                ),
                (false, false) => {
                    let generated = generate_root_ca(&config.ca_common_name, config.ca_serial)?;
                    generated.save(
                        ca_cert_path,
                        ca_key_path,
                        config.ca_key_passphrase.as_deref(),
                    )?;
                    Ok(generated)
                }
                _ => Err(CertError::InvalidConfiguration(
                    "CA cert and key files must both exist or both be absent".to_string(),
                )),
            }
        }
        (None, None) => generate_root_ca(&config.ca_common_name, config.ca_serial),
        _ => Err(CertError::InvalidConfiguration(
            "ca_cert_path and ca_key_path must be set together".to_string(),
        )),
    }
}

fn read_certificate_chain(path: &Path) -> CertResult<Vec<CertificateDer<'static>>> {
    let pem = fs::read(path).map_err(io_error(path))?;
    CertificateDer::pem_slice_iter(&pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| CertError::parse("certificate chain", format!("{error:?}")))
}

fn read_private_key(path: &Path) -> CertResult<PrivateKeyDer<'static>> {
    let pem = fs::read(path).map_err(io_error(path))?;
    PrivateKeyDer::from_pem_slice(&pem)
        .map_err(|error| CertError::parse("private key", format!("{error:?}")))
}
