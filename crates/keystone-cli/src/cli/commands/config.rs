//! `keystone config` - configuration inspection.

use anyhow::Result;
use colored::Colorize;

use super::Context;
use crate::cli::args::{ConfigArgs, ConfigCommands};

pub async fn execute(ctx: Context, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(&ctx),
        ConfigCommands::Path => show_path(&ctx),
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&ctx.config)?);
        return Ok(());
    }

    if !ctx.config_path.exists() {
        println!(
            "{}",
            format!("# {} not found, showing defaults", ctx.config_path.display()).dimmed()
        );
    }
    print!("{}", ctx.config.to_toml()?);
    Ok(())
}

fn show_path(ctx: &Context) -> Result<()> {
    println!("{}", ctx.config_path.display());
    Ok(())
}
