//! `keystone list` - archived client certificates.

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;

use super::Context;

pub async fn execute(ctx: Context) -> Result<()> {
    let service = ctx.service().await?;
    let issued = tokio::task::spawn_blocking(move || service.issued()).await??;

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&issued)?);
        return Ok(());
    }

    if issued.is_empty() {
        println!("{}", "No certificates issued yet.".dimmed());
        return Ok(());
    }

    let now = Utc::now();
    for info in &issued {
        let cn = info.common_name.as_deref().unwrap_or("(no common name)");
        let status = if info.is_expired_at(now) {
            "expired".red()
        } else {
            "valid".green()
        };
        println!("{}  {}  {}", cn, info.not_after.format("%Y-%m-%d %H:%M:%S"), status);
    }
    println!();
    println!("{} certificate(s)", issued.len().to_string().bold());

    Ok(())
}
