//! # Fetch subcommand
//!
//! `nbank fetch ID...` downloads remote copies into a local directory.
//! Results print as each download completes.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use nbank_ops::fetch::default_pool_size;
use nbank_ops::{fetch, FetchOptions, FetchOutcome};

use crate::Context;

/// Arguments for `nbank fetch`.
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Overwrite existing files.
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    /// Directory for downloaded files. Defaults to the current directory.
    #[arg(short = 'd', long = "dest")]
    pub dest: Option<PathBuf>,

    /// Extension to add to downloaded file names.
    #[arg(short = 'e', long = "extension")]
    pub extension: Option<String>,

    /// Maximum concurrent downloads.
    #[arg(short = 'j', long = "jobs", default_value_t = default_pool_size())]
    pub jobs: usize,

    #[arg(required = true, value_name = "ID")]
    pub ids: Vec<String>,
}

/// Execute `nbank fetch`.
pub async fn run_fetch(args: &FetchArgs, ctx: &Context) -> Result<u8> {
    let client = ctx.client()?;
    let options = FetchOptions {
        dest: args.dest.clone().unwrap_or_else(|| PathBuf::from(".")),
        extension: args.extension.clone(),
        force: args.force,
        pool_size: args.jobs.max(1),
    };
    let outcomes = fetch(&client, &args.ids, &options, |o| println!("{}", format_outcome(o)))
        .await
        .context("fetch failed")?;
    let failed = outcomes
        .iter()
        .any(|o| matches!(o, FetchOutcome::Failed { .. }));
    Ok(if failed { 1 } else { 0 })
}

fn format_outcome(outcome: &FetchOutcome) -> String {
    let result = match outcome {
        FetchOutcome::Downloaded { path, .. } => path.display().to_string(),
        FetchOutcome::NoLocations { .. } => "(no locations found)".to_string(),
        FetchOutcome::NotDownloadable { .. } => "(no downloadable locations)".to_string(),
        FetchOutcome::Failed { reason, .. } => format!("(failed: {reason})"),
    };
    format!("{:<20}\t-> {result}", outcome.id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn outcome_lines() {
        let line = format_outcome(&FetchOutcome::Downloaded {
            id: "st11".into(),
            path: PathBuf::from("out/st11.wav"),
        });
        assert_eq!(line, format!("st11{}\t-> out/st11.wav", " ".repeat(16)));
        let line = format_outcome(&FetchOutcome::NoLocations { id: "gone".into() });
        assert!(line.ends_with("\t-> (no locations found)"));
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from(["nbank", "fetch", "-f", "-d", "out", "-e", "wav", "a", "b"])
            .unwrap();
        let Commands::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert!(args.force);
        assert_eq!(args.dest, Some(PathBuf::from("out")));
        assert_eq!(args.extension.as_deref(), Some("wav"));
        assert_eq!(args.ids.len(), 2);
        assert!(args.jobs >= 1);
    }
}
