//! `keystone init` - create or load the root CA.

use anyhow::Result;
use colored::Colorize;
use keystone_ca::CaOrigin;

use super::ca::print_info;
use super::Context;

pub async fn execute(ctx: Context) -> Result<()> {
    let service = ctx.service().await?;
    let created = service.ca().origin() == CaOrigin::Created;

    if ctx.json {
        let value = serde_json::json!({
            "created": created,
            "data_dir": ctx.config.data_dir,
            "ca": service.ca_info(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if created {
        println!(
            "{} Created CA in {}",
            "Success:".green().bold(),
            ctx.config.data_dir.display()
        );
    } else {
        println!(
            "{} CA already present in {}",
            "Loaded:".cyan().bold(),
            ctx.config.data_dir.display()
        );
    }
    println!();
    print_info(service.ca_info());

    Ok(())
}
