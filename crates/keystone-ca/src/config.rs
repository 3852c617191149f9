//! CA configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::CaError;

/// Configuration for a keystone certificate authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaConfig {
    /// Root directory for all persisted material (default: ./certs).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Storage key of the CA certificate, relative to `data_dir`.
    #[serde(default = "default_ca_cert")]
    pub ca_cert: String,

    /// Storage key of the CA private key, relative to `data_dir`.
    #[serde(default = "default_ca_key")]
    pub ca_key: String,

    /// Directory for issued chains, relative to `data_dir`.
    #[serde(default = "default_issued_dir")]
    pub issued_dir: String,

    /// Lifetime of issued leaf certificates in days.
    #[serde(default = "default_leaf_validity_days")]
    pub leaf_validity_days: u32,

    /// Also assert server authentication on issued leaves.
    #[serde(default)]
    pub leaf_server_auth: bool,

    /// Lifetime of a newly created CA certificate in years.
    #[serde(default = "default_ca_validity_years")]
    pub ca_validity_years: u32,

    /// What `issue` hands back to callers.
    #[serde(default)]
    pub output_mode: OutputMode,

    /// Hostnames that get a server certificate when the CA is first created.
    #[serde(default)]
    pub internal_hosts: Vec<String>,

    /// Subject of a newly created CA certificate.
    #[serde(default)]
    pub subject: SubjectConfig,
}

/// Subject attributes used for the CA and internal certificates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfig {
    #[serde(default = "default_common_name")]
    pub common_name: String,
    #[serde(default = "default_organization")]
    pub organization: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_province")]
    pub province: String,
    #[serde(default = "default_locality")]
    pub locality: String,
    #[serde(default = "default_street_address")]
    pub street_address: String,
    #[serde(default = "default_postal_code")]
    pub postal_code: String,
}

/// Issuance output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Leaf PEM followed by the CA PEM
    #[default]
    Chain,
    /// Leaf PEM only
    Leaf,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ca_cert: default_ca_cert(),
            ca_key: default_ca_key(),
            issued_dir: default_issued_dir(),
            leaf_validity_days: default_leaf_validity_days(),
            leaf_server_auth: false,
            ca_validity_years: default_ca_validity_years(),
            output_mode: OutputMode::default(),
            internal_hosts: Vec::new(),
            subject: SubjectConfig::default(),
        }
    }
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            common_name: default_common_name(),
            organization: default_organization(),
            country: default_country(),
            province: default_province(),
            locality: default_locality(),
            street_address: default_street_address(),
            postal_code: default_postal_code(),
        }
    }
}

impl CaConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| CaError::Config(format!("{}: {e}", path.display())))?;
            toml::from_str(&content).map_err(|e| CaError::Config(e.to_string()))?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot produce usable certificates.
    pub fn validate(&self) -> crate::Result<()> {
        if self.leaf_validity_days == 0 {
            return Err(CaError::Config("leaf_validity_days must be at least 1".into()));
        }
        if self.ca_validity_years == 0 {
            return Err(CaError::Config("ca_validity_years must be at least 1".into()));
        }
        if self.ca_cert == self.ca_key {
            return Err(CaError::Config(
                "ca_cert and ca_key must be different storage keys".into(),
            ));
        }
        for host in &self.internal_hosts {
            if !is_hostname(host) {
                return Err(CaError::Config(format!("invalid internal host: {host:?}")));
            }
            let (cert, key) = host_keys(host);
            if [&cert, &key].iter().any(|k| **k == self.ca_cert || **k == self.ca_key) {
                return Err(CaError::Config(format!(
                    "internal host {host:?} would overwrite the CA files"
                )));
            }
        }
        Ok(())
    }

    /// Render the config as TOML.
    pub fn to_toml(&self) -> crate::Result<String> {
        toml::to_string_pretty(self).map_err(|e| CaError::Config(e.to_string()))
    }
}

/// Storage keys of an internal host's certificate chain and private key.
pub(crate) fn host_keys(host: &str) -> (String, String) {
    (format!("{host}.pem"), format!("{host}.key"))
}

/// Letters, digits, `-` and `.`, not starting with `.` or `-`.
pub(crate) fn is_hostname(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 253
        && !name.starts_with(['.', '-'])
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

// Default value functions for serde.
fn default_data_dir() -> PathBuf {
    PathBuf::from("./certs")
}

fn default_ca_cert() -> String {
    String::from("ca.pem")
}

fn default_ca_key() -> String {
    String::from("ca.key")
}

fn default_issued_dir() -> String {
    String::from("clients")
}

const fn default_leaf_validity_days() -> u32 {
    1
}

const fn default_ca_validity_years() -> u32 {
    10
}

fn default_common_name() -> String {
    String::from("CA")
}

fn default_organization() -> String {
    String::from("dap2pnet")
}

fn default_country() -> String {
    String::from("ES")
}

fn default_province() -> String {
    String::from("Bizkaia")
}

fn default_locality() -> String {
    String::from("Bilbao")
}

fn default_street_address() -> String {
    String::from("Deusto")
}

fn default_postal_code() -> String {
    String::from("48015")
}
