//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::{Context as _, Result};
use args::{Cli, Commands};
use clap::Parser;
use keystone_ca::CaConfig;

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean PEM/JSON
    let env_filter = tracing_subscriber::EnvFilter::try_new(&cli.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(!cli.no_color)
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let mut config = CaConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    tracing::debug!(
        config = %cli.config.display(),
        data_dir = %config.data_dir.display(),
        "Configuration loaded"
    );

    let ctx = commands::Context {
        config,
        config_path: cli.config,
        json: cli.json,
    };

    match cli.command {
        Commands::Init => commands::init::execute(ctx).await,
        Commands::Sign(args) => commands::sign::execute(ctx, args).await,
        Commands::List => commands::list::execute(ctx).await,
        Commands::Ca(args) => commands::ca::execute(ctx, args).await,
        Commands::Config(args) => commands::config::execute(ctx, args).await,
    }
}
