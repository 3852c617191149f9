//! `keystone sign` - issue client certificates.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use colored::Colorize;
use keystone_ca::{Issuance, OutputMode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::Context;
use crate::cli::args::SignArgs;

/// Issued files are readable by the owner only.
#[cfg(unix)]
const OUTPUT_MODE: u32 = 0o400;

pub async fn execute(ctx: Context, args: SignArgs) -> Result<()> {
    args.validate()?;
    let service = ctx.service().await?;
    let mode = if args.leaf_only {
        OutputMode::Leaf
    } else {
        service.output_mode()
    };

    // Read all inputs first; stdin can only be consumed once.
    let mut requests = Vec::with_capacity(args.csr.len());
    for path in &args.csr {
        requests.push((path.clone(), read_input(path).await?));
    }

    let handles: Vec<_> = requests
        .into_iter()
        .map(|(path, raw)| {
            let service = service.clone();
            let handle = tokio::task::spawn_blocking(move || service.issue(&raw));
            (path, handle)
        })
        .collect();

    let mut issued = Vec::with_capacity(handles.len());
    let mut failures = 0usize;
    for (path, handle) in handles {
        match handle.await? {
            Ok(issuance) => issued.push(issuance),
            Err(e) => {
                failures += 1;
                eprintln!("{} {}: {e}", "Error:".red().bold(), path.display());
            }
        }
    }

    if let Some(dir) = &args.out {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
        for issuance in &issued {
            let path = write_output(dir, issuance, mode).await?;
            if !ctx.json {
                println!("{} {}", "Wrote".green().bold(), path.display());
            }
        }
    }

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&issued)?);
    } else if args.out.is_none() {
        for issuance in &issued {
            print!("{}", issuance.output(mode));
        }
    }

    for issuance in issued.iter().filter(|i| !i.archived) {
        eprintln!(
            "{} certificate {} was issued but not archived",
            "Warning:".yellow().bold(),
            issuance.common_name
        );
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} request(s) failed", args.csr.len());
    }
    Ok(())
}

async fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut buf = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut buf)
            .await
            .context("reading CSR from stdin")?;
        return Ok(buf);
    }
    tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

async fn write_output(dir: &Path, issuance: &Issuance, mode: OutputMode) -> Result<PathBuf> {
    let path = dir.join(format!("{}.pem", issuance.common_name));
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(OUTPUT_MODE);

    let mut file = options
        .open(&path)
        .await
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(issuance.output(mode).as_bytes())
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    file.sync_all()
        .await
        .with_context(|| format!("syncing {}", path.display()))?;
    Ok(path)
}
