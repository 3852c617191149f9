//! `keystone ca` - print the CA certificate.

use anyhow::Result;
use colored::Colorize;
use keystone_ca::CertificateInfo;

use super::Context;
use crate::cli::args::CaArgs;

pub async fn execute(ctx: Context, args: CaArgs) -> Result<()> {
    let service = ctx.service().await?;

    if ctx.json {
        let value = serde_json::json!({
            "info": service.ca_info(),
            "pem": service.ca_certificate_pem(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if args.info {
        print_info(service.ca_info());
    } else {
        print!("{}", service.ca_certificate_pem());
    }

    Ok(())
}

/// Human-readable certificate summary.
pub(crate) fn print_info(info: &CertificateInfo) {
    println!("  {} {}", "subject:".bold(), info.subject);
    println!("  {} {}", "issuer:".bold(), info.issuer);
    println!("  {} {}", "serial:".bold(), info.serial.cyan());
    println!("  {} {}", "not before:".bold(), info.not_before);
    println!("  {} {}", "not after:".bold(), info.not_after);
}
