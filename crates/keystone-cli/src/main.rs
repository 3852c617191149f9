//! keystone - minimal certificate authority
//!
//! Signs PKCS#10 requests with a self-signed P-256 root.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    keystone_cli::run().await
}
