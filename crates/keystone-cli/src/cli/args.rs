//! Command-line argument definitions using clap.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

/// Minimal certificate authority
///
/// Bootstraps a self-signed P-256 root on first use and signs
/// PKCS#10 requests into short-lived client certificates.
#[derive(Parser, Debug)]
#[command(name = "keystone")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, env = "KEYSTONE_CONFIG", default_value = "keystone.toml", global = true)]
    pub config: PathBuf,

    /// Directory holding CA and issued certificates (overrides config)
    #[arg(short, long, env = "KEYSTONE_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log filter, e.g. "info" or "keystone_ca=debug"
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the root CA if needed and show it
    Init,

    /// Issue client certificates for one or more CSRs
    Sign(SignArgs),

    /// List archived client certificates
    List,

    /// Print the CA certificate
    Ca(CaArgs),

    /// Inspect configuration
    Config(ConfigArgs),
}

// ============================================================================
// Sign command
// ============================================================================

#[derive(Args, Debug)]
pub struct SignArgs {
    /// PEM CSR files ("-" reads standard input)
    #[arg(required = true)]
    pub csr: Vec<PathBuf>,

    /// Return only the leaf certificate, not the chain
    #[arg(long)]
    pub leaf_only: bool,

    /// Write each result to <DIR>/<common-name>.pem instead of stdout
    #[arg(short, long, value_name = "DIR")]
    pub out: Option<PathBuf>,
}

impl SignArgs {
    /// Reject argument combinations clap cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        let stdin = self.csr.iter().filter(|p| p.as_path() == Path::new("-")).count();
        if stdin > 1 {
            anyhow::bail!("\"-\" (standard input) may be given only once");
        }
        Ok(())
    }
}

// ============================================================================
// CA command
// ============================================================================

#[derive(Args, Debug)]
pub struct CaArgs {
    /// Show a summary instead of the PEM certificate
    #[arg(long)]
    pub info: bool,
}

// ============================================================================
// Config command
// ============================================================================

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Show the configuration file path
    Path,
}
