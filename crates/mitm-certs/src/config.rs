use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_error, CertError, CertResult};
use crate::leaf::DEFAULT_LEAF_SERIAL;

pub const DEFAULT_CA_COMMON_NAME: &str = "mitm-certs Local CA";
pub const DEFAULT_CA_SERIAL: u64 = 1000;
pub const DEFAULT_LEAF_COMMON_NAME: &str = "bla";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub base_dir: PathBuf,
    pub ca_cert_path: Option<PathBuf>,
    pub ca_key_path: Option<PathBuf>,
    pub ca_key_passphrase: Option<String>,
    pub ca_common_name: String,
    pub ca_serial: u64,
    pub default_common_name: String,
    pub leaf_serial: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::new(),
            ca_cert_path: None,
            ca_key_path: None,
            ca_key_passphrase: None,
            ca_common_name: DEFAULT_CA_COMMON_NAME.to_string(),
            ca_serial: DEFAULT_CA_SERIAL,
            default_common_name: DEFAULT_LEAF_COMMON_NAME.to_string(),
            leaf_serial: DEFAULT_LEAF_SERIAL,
        }
    }
}

impl PoolConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> CertResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(io_error(path))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|error| CertError::InvalidConfiguration(format!("{}: {error}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CertResult<()> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(CertError::InvalidConfiguration(
                "base_dir must not be empty".to_string(),
            ));
        }

        match (self.ca_cert_path.as_ref(), self.ca_key_path.as_ref()) {
            (Some(_), Some(_)) | (None, None) => {}
            _ => {
                return Err(CertError::InvalidConfiguration(
                    "ca_cert_path and ca_key_path must either both be set or both be unset"
                        .to_string(),
                ));
            }
        }

        if self.ca_common_name.trim().is_empty() {
            return Err(CertError::InvalidConfiguration(
                "ca_common_name must not be empty".to_string(),
            ));
        }

        if matches!(self.ca_key_passphrase.as_deref(), Some("")) {
            return Err(CertError::InvalidConfiguration(
                "ca_key_passphrase must not be empty when set".to_string(),
            ));
        }

        Ok(())
    }
}
