//! Certificate issuance for TLS interception.
//!
//! A root CA is generated once at bootstrap ([`generate_root_ca_files`]). A
//! [`CertificatePool`] then hands out CA-signed server certificates for any set
//! of DNS names and IP addresses, issuing and persisting each one on first
//! request and reusing it afterwards.

mod authority;
mod config;
mod error;
mod identity;
mod leaf;
mod material;
mod params;
mod persist;
mod pool;
mod resign;

pub use authority::{generate_root_ca, generate_root_ca_files, CertificateAuthority};
pub use config::{PoolConfig, DEFAULT_CA_COMMON_NAME, DEFAULT_CA_SERIAL, DEFAULT_LEAF_COMMON_NAME};
pub use error::{CertError, CertResult};
pub use identity::{CanonicalKey, HostIdentitySet};
pub use leaf::{
    issue_client_certificate, issue_server_certificate, write_leaf, LeafOutput, LeafProfile,
    LeafRequest, SubjectAltName, DEFAULT_LEAF_SERIAL,
};
pub use material::{Encoding, KeyCertMaterial};
pub use pool::{
    CertificatePool, CertificateRecord, LeafCacheStatus, PoolMetricsSnapshot, PooledCertificate,
};
pub use resign::resign;

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::fs;
    use std::net::IpAddr;
    use std::path::Path;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use openssl::pkcs12::Pkcs12;
    use openssl::x509::X509;
    use tempfile::TempDir;
    use x509_parser::certificate::X509Certificate;
    use x509_parser::extensions::GeneralName;
    use x509_parser::parse_x509_certificate;

    use super::*;

    include!("tests_support.rs");
    include!("tests_material.rs");
    include!("tests_issuance.rs");
    include!("tests_resign.rs");
    include!("tests_pool.rs");
}
