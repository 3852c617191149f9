//! Command implementations.

pub mod ca;
pub mod config;
pub mod init;
pub mod list;
pub mod sign;

use std::path::PathBuf;

use anyhow::Result;
use keystone_ca::{CaConfig, CertificateService};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Effective configuration (file plus overrides)
    pub config: CaConfig,

    /// Where the configuration was read from
    pub config_path: PathBuf,

    /// Emit JSON instead of human output
    pub json: bool,
}

impl Context {
    /// Bootstrap the CA on a blocking thread.
    pub async fn service(&self) -> Result<CertificateService> {
        let config = self.config.clone();
        let service =
            tokio::task::spawn_blocking(move || CertificateService::open(&config)).await??;
        Ok(service)
    }
}
