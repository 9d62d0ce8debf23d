//! # Deposit subcommand
//!
//! `nbank deposit ARCHIVE FILE...` registers each file and moves it into the
//! archive. The registry is taken from the archive's `nbank.json`, not `-r`.

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use nbank_core::metadata::MetadataValue;
use nbank_ops::{deposit, DepositRequest, ItemOutcome};

use crate::{collect_metadata, parse_metadata_arg, Context};

/// Arguments for `nbank deposit`.
#[derive(Args, Debug)]
pub struct DepositArgs {
    /// Datatype of the deposited resources.
    #[arg(short = 'd', long = "dtype")]
    pub dtype: Option<String>,

    /// Hash every resource even if the archive does not require it.
    #[arg(short = 'H', long = "hash")]
    pub hash: bool,

    /// Let the archive or registry assign identifiers.
    #[arg(short = 'A', long = "auto-id")]
    pub auto_id: bool,

    /// Metadata for the deposited resources. May be repeated.
    #[arg(short = 'k', value_name = "KEY=VALUE", value_parser = parse_metadata_arg)]
    pub metadata: Vec<(String, MetadataValue)>,

    /// Print a JSON line for each stored resource.
    #[arg(short = 'j', long = "json-out")]
    pub json_out: bool,

    /// Also read file names from standard input, one per line.
    #[arg(short = '@', id = "stdin")]
    pub stdin: bool,

    /// The archive to deposit into.
    pub directory: PathBuf,

    /// Files or directories to deposit.
    #[arg(required_unless_present = "stdin")]
    pub files: Vec<PathBuf>,
}

/// Execute `nbank deposit`.
pub async fn run_deposit(args: &DepositArgs, ctx: &Context) -> Result<u8> {
    let mut files = args.files.clone();
    if args.stdin {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = line.context("failed to read file names from stdin")?;
            files.extend(stdin_path(&line));
        }
    }

    let request = DepositRequest {
        archive: args.directory.clone(),
        files,
        dtype: args.dtype.clone(),
        hash: args.hash,
        auto_id: args.auto_id,
        metadata: collect_metadata(&args.metadata),
    };
    let json_out = args.json_out;
    let report = deposit(&request, ctx.credentials.clone(), |outcome| {
        report_outcome(outcome, json_out)
    })
    .await
    .with_context(|| format!("deposit into {} failed", args.directory.display()))?;

    Ok(if report.failed > 0 { 1 } else { 0 })
}

fn stdin_path(line: &str) -> Option<PathBuf> {
    let line = line.trim();
    (!line.is_empty()).then(|| PathBuf::from(line))
}

fn report_outcome(outcome: &ItemOutcome, json_out: bool) {
    match outcome {
        ItemOutcome::Stored {
            source,
            id,
            permissions_warning,
            ..
        } => {
            if let Some(reason) = permissions_warning {
                tracing::warn!("{id}: permissions not applied: {reason}");
            }
            if json_out {
                println!("{}", serde_json::json!({ "source": source, "id": id }));
            } else {
                tracing::info!("{} -> {id}", source.display());
            }
        }
        ItemOutcome::Skipped { source, reason } => {
            tracing::warn!("{}: {reason}, skipping", source.display())
        }
        ItemOutcome::Failed { source, reason } => {
            tracing::error!("{}: {reason}", source.display())
        }
    }
}
