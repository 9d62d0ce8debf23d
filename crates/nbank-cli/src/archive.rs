//! # Archive subcommands
//!
//! `nbank init` creates and registers an archive. `nbank archive list` shows
//! the archives the registry knows; `nbank archive check` reconciles one
//! archive with the registry.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use nbank_core::config::{ArchiveOptions, DEFAULT_UMASK};
use nbank_core::location::NEUROBANK_SCHEME;
use nbank_ops::check::{check_archive, CheckReport, EntryStatus};
use nbank_ops::init::init_archive;
use nbank_registry::Archive;

use crate::{parse_octal, Context};

/// Arguments for `nbank init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path of the new archive. Created if it does not exist.
    pub directory: PathBuf,

    /// Name to register the archive under. Defaults to the directory name.
    #[arg(short = 'n', long = "name")]
    pub name: Option<String>,

    /// umask applied to deposited resources, in octal.
    #[arg(short = 'u', long = "umask", value_parser = parse_octal, default_value = "002")]
    pub umask: u32,
}

/// Arguments for `nbank archive`.
#[derive(Args, Debug)]
pub struct ArchiveArgs {
    #[command(subcommand)]
    pub command: ArchiveCommand,
}

#[derive(Subcommand, Debug)]
pub enum ArchiveCommand {
    /// List archives known to the registry.
    List {
        /// Only archives with this scheme.
        #[arg(long)]
        scheme: Option<String>,
        /// Only archives with this name.
        #[arg(short = 'n', long = "name")]
        name: Option<String>,
    },

    /// Check that stored resources match the registry.
    Check {
        /// Log every entry, not just problems.
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
        /// Path of the archive.
        path: PathBuf,
    },
}

/// Execute `nbank init`.
pub async fn run_init(args: &InitArgs, ctx: &Context) -> Result<u8> {
    let client = ctx.client()?;
    let options = ArchiveOptions {
        umask: args.umask,
        ..ArchiveOptions::default()
    };
    if options.umask != DEFAULT_UMASK {
        tracing::debug!("umask {:03o}", options.umask);
    }
    let cfg = init_archive(&client, &args.directory, args.name.as_deref(), &options)
        .await
        .with_context(|| format!("failed to initialize archive at {}", args.directory.display()))?;
    tracing::info!(
        "initialized neurobank archive in {} (registry: {})",
        cfg.path.display(),
        cfg.registry
    );
    Ok(0)
}

/// Execute `nbank archive`.
pub async fn run_archive(args: &ArchiveArgs, ctx: &Context) -> Result<u8> {
    match &args.command {
        ArchiveCommand::List { scheme, name } => cmd_list(ctx, scheme.as_deref(), name.as_deref()).await,
        ArchiveCommand::Check { verbose, path } => cmd_check(ctx, path, *verbose).await,
    }
}

async fn cmd_list(ctx: &Context, scheme: Option<&str>, name: Option<&str>) -> Result<u8> {
    let client = ctx.client()?;
    let archives = client
        .archives(name, scheme)
        .await
        .context("failed to list archives")?;
    for archive in &archives {
        println!("{}", format_archive(archive));
    }
    Ok(0)
}

async fn cmd_check(ctx: &Context, path: &std::path::Path, verbose: bool) -> Result<u8> {
    let report = check_archive(path, ctx.credentials.clone())
        .await
        .with_context(|| format!("failed to check archive {}", path.display()))?;
    log_entries(&report, verbose);
    for name in &report.missing_from_archive {
        tracing::warn!("{name}: missing from archive");
    }
    tracing::info!("{}", summary(&report));
    Ok(if report.is_clean() { 0 } else { 1 })
}

fn log_entries(report: &CheckReport, verbose: bool) {
    for entry in &report.entries {
        match &entry.status {
            EntryStatus::Ok if verbose => tracing::info!("{}: OK", entry.path.display()),
            EntryStatus::Ok => {}
            EntryStatus::NotInRegistry => {
                tracing::warn!("{}: not in registry", entry.path.display())
            }
            EntryStatus::Unreadable(reason) => {
                tracing::warn!("{}: unable to read: {reason}", entry.path.display())
            }
            EntryStatus::HashMismatch => {
                tracing::warn!("{}: hash does not match registry", entry.path.display())
            }
        }
    }
}

fn summary(report: &CheckReport) -> String {
    format!(
        "Resources in registry: {}; missing from archive: {}; missing from registry: {}; read/verify errors: {}",
        report.registry_total,
        report.missing_from_archive.len(),
        report.missing_from_registry(),
        report.error_count().saturating_sub(report.missing_from_archive.len()),
    )
}

/// Local archives print their root. Anything else prints as a URL.
fn format_archive(archive: &Archive) -> String {
    if archive.scheme == NEUROBANK_SCHEME {
        format!("{:<25}\t{}", archive.name, archive.root)
    } else {
        format!("{:<25}\t{}://{}", archive.name, archive.scheme, archive.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use nbank_ops::check::CheckedEntry;

    #[test]
    fn archive_lines_depend_on_scheme() {
        let local = Archive {
            name: "birds".into(),
            scheme: "neurobank".into(),
            root: "/home/data/birds".into(),
        };
        assert!(format_archive(&local).ends_with("\t/home/data/birds"));
        let remote = Archive {
            name: "birds-web".into(),
            scheme: "https".into(),
            root: "data.example.org/birds".into(),
        };
        assert!(format_archive(&remote).ends_with("\thttps://data.example.org/birds"));
    }

    #[test]
    fn summary_separates_missing_from_read_errors() {
        let report = CheckReport {
            registry_total: 3,
            entries: vec![
                CheckedEntry {
                    name: "a".into(),
                    path: "/x/a".into(),
                    status: EntryStatus::Ok,
                },
                CheckedEntry {
                    name: "b".into(),
                    path: "/x/b".into(),
                    status: EntryStatus::HashMismatch,
                },
                CheckedEntry {
                    name: "c".into(),
                    path: "/x/c".into(),
                    status: EntryStatus::NotInRegistry,
                },
            ],
            missing_from_archive: vec!["d".into()],
        };
        assert_eq!(
            summary(&report),
            "Resources in registry: 3; missing from archive: 1; missing from registry: 1; read/verify errors: 1"
        );
    }

    #[test]
    fn init_umask_defaults_and_parses_octal() {
        let cli = Cli::try_parse_from(["nbank", "init", "/tmp/a"]).unwrap();
        let Commands::Init(args) = cli.command else {
            panic!("expected init");
        };
        assert_eq!(args.umask, 0o002);

        let cli = Cli::try_parse_from(["nbank", "init", "-u", "027", "-n", "birds", "/tmp/a"]).unwrap();
        let Commands::Init(args) = cli.command else {
            panic!("expected init");
        };
        assert_eq!(args.umask, 0o027);
        assert_eq!(args.name.as_deref(), Some("birds"));
    }
}
