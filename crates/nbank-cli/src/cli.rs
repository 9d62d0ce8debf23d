//! Top-level argument parsing and dispatch.

use anyhow::Result;
use clap::{Parser, Subcommand};
use nbank_ops::OpsError;
use nbank_registry::{Credentials, RegistryError};

use crate::archive::{run_archive, run_init, ArchiveArgs, InitArgs};
use crate::deposit::{run_deposit, DepositArgs};
use crate::fetch::{run_fetch, FetchArgs};
use crate::registry::{run_dtype, run_registry_info, DtypeArgs};
use crate::resources::{
    run_info, run_locate, run_modify, run_search, run_verify, InfoArgs, LocateArgs, ModifyArgs,
    SearchArgs, VerifyArgs,
};
use crate::Context;

/// Deposit, locate, and manage resources in neurobank archives.
///
/// Resources are files or directories with a unique identifier. Archives
/// store them on disk; the registry records names, hashes, metadata, and
/// where each copy lives.
#[derive(Parser, Debug)]
#[command(name = "nbank", version, about, long_about = None)]
pub struct Cli {
    /// URL of the registry. Defaults to the NBANK_REGISTRY environment variable.
    #[arg(short = 'r', long = "registry", global = true)]
    pub registry: Option<String>,

    /// Credentials for the registry, as username:password.
    #[arg(short = 'a', long = "auth", global = true, value_parser = Credentials::parse)]
    pub auth: Option<Credentials>,

    /// Show verbose log messages.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show information about the registry.
    RegistryInfo,

    /// Initialize a new archive and register it.
    Init(InitArgs),

    /// Register resources and move them into an archive.
    Deposit(DepositArgs),

    /// Print the local path or URL of resources.
    Locate(LocateArgs),

    /// Search the registry for resources.
    Search(SearchArgs),

    /// Print registry records for resources.
    Info(InfoArgs),

    /// Check files against the hashes recorded in the registry.
    Verify(VerifyArgs),

    /// Set or delete metadata on resources.
    Modify(ModifyArgs),

    /// Download remote copies of resources.
    Fetch(FetchArgs),

    /// List or add datatypes.
    Dtype(DtypeArgs),

    /// List archives or check an archive's integrity.
    Archive(ArchiveArgs),
}

/// Run the parsed command. The returned value is the process exit code.
pub async fn dispatch(cli: Cli) -> Result<u8> {
    let ctx = Context::new(cli.registry, cli.auth);
    match cli.command {
        Commands::RegistryInfo => run_registry_info(&ctx).await,
        Commands::Init(args) => run_init(&args, &ctx).await,
        Commands::Deposit(args) => run_deposit(&args, &ctx).await,
        Commands::Locate(args) => run_locate(&args, &ctx).await,
        Commands::Search(args) => run_search(&args, &ctx).await,
        Commands::Info(args) => run_info(&args, &ctx).await,
        Commands::Verify(args) => run_verify(&args, &ctx).await,
        Commands::Modify(args) => run_modify(&args, &ctx).await,
        Commands::Fetch(args) => run_fetch(&args, &ctx).await,
        Commands::Dtype(args) => run_dtype(&args, &ctx).await,
        Commands::Archive(args) => run_archive(&args, &ctx).await,
    }
}

/// Whether `err` was caused by the registry refusing our credentials.
pub fn is_auth_failure(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        let registry = cause.downcast_ref::<RegistryError>().or_else(|| {
            match cause.downcast_ref::<OpsError>() {
                Some(OpsError::Registry(e)) => Some(e),
                _ => None,
            }
        });
        matches!(registry.and_then(RegistryError::status), Some(401 | 403))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "nbank", "search", "-r", "https://r.test/", "-a", "dmeliza:hunter2", "--debug", "-d",
            "wav",
        ])
        .unwrap();
        assert_eq!(cli.registry.as_deref(), Some("https://r.test/"));
        assert_eq!(cli.auth.unwrap().username, "dmeliza");
        assert!(cli.debug);
        assert!(matches!(cli.command, Commands::Search(_)));
    }

    #[test]
    fn malformed_credentials_are_rejected() {
        assert!(Cli::try_parse_from(["nbank", "-a", "nocolon", "registry-info"]).is_err());
    }

    #[test]
    fn forbidden_response_is_an_auth_failure() {
        let err: anyhow::Error = OpsError::from(RegistryError::ApiError {
            endpoint: "POST resources/".into(),
            status: 403,
            body: String::new(),
        })
        .into();
        assert!(is_auth_failure(&err));

        let err: anyhow::Error = RegistryError::ApiError {
            endpoint: "GET resources/".into(),
            status: 400,
            body: String::new(),
        }
        .into();
        assert!(!is_auth_failure(&err.context("search failed")));
    }
}
