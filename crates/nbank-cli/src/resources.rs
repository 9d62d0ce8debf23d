//! # Resource subcommands
//!
//! `locate`, `search`, `info`, `verify`, and `modify` all work on resources
//! already known to the registry.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use clap::Args;
use nbank_core::location::ResourceHandle;
use nbank_core::metadata::{Metadata, MetadataValue};
use nbank_ops::query::{self, Verification};
use nbank_registry::{parse_resource_url, RegistryClient, ResourceQuery};

use crate::{collect_metadata, parse_metadata_arg, Context};

/// Arguments for `nbank locate`.
#[derive(Args, Debug)]
pub struct LocateArgs {
    /// Create a symbolic link to each local resource in DIR.
    #[arg(short = 'L', long = "link", value_name = "DIR")]
    pub link: Option<PathBuf>,

    /// Print local paths separated by NUL, for `xargs -0`.
    #[arg(short = '0', long = "print0")]
    pub print0: bool,

    /// Identifiers or full resource URLs.
    #[arg(required = true, value_name = "ID")]
    pub ids: Vec<String>,
}

/// Arguments for `nbank search`.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Print full records as JSON instead of names.
    #[arg(short = 'j', long = "json-out")]
    pub json_out: bool,

    /// Only resources with this datatype.
    #[arg(short = 'd', long = "dtype")]
    pub dtype: Option<String>,

    /// Only resources with this SHA-1 hash.
    #[arg(short = 'H', long = "hash")]
    pub hash: Option<String>,

    /// Only resources stored in this archive.
    #[arg(short = 'n', long = "archive")]
    pub archive: Option<String>,

    /// Only resources whose metadata field equals the value. May be repeated.
    #[arg(short = 'k', value_name = "KEY=VALUE", value_parser = parse_metadata_arg)]
    pub metadata: Vec<(String, MetadataValue)>,

    /// Exclude resources whose metadata field equals the value. May be repeated.
    #[arg(short = 'K', value_name = "KEY=VALUE", value_parser = parse_metadata_arg)]
    pub metadata_neq: Vec<(String, MetadataValue)>,

    /// Resource name or fragment.
    pub name: Option<String>,
}

/// Arguments for `nbank info`.
#[derive(Args, Debug)]
pub struct InfoArgs {
    #[arg(required = true, value_name = "ID")]
    pub ids: Vec<String>,
}

/// Arguments for `nbank verify`.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Files or directories to verify.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Arguments for `nbank modify`.
#[derive(Args, Debug)]
pub struct ModifyArgs {
    /// Set a metadata field, replacing any previous value. May be repeated.
    #[arg(short = 'k', value_name = "KEY=VALUE", value_parser = parse_metadata_arg)]
    pub metadata: Vec<(String, MetadataValue)>,

    /// Delete a metadata field. May be repeated.
    #[arg(short = 'K', value_name = "KEY")]
    pub remove: Vec<String>,

    #[arg(required = true, value_name = "ID")]
    pub ids: Vec<String>,
}

/// Execute `nbank locate`.
pub async fn run_locate(args: &LocateArgs, ctx: &Context) -> Result<u8> {
    let mut stdout = std::io::stdout();
    for raw in &args.ids {
        let (client, id) = match parse_resource_url(raw) {
            Some((base, id)) => (ctx.client_for(&base)?, id),
            None if ctx.registry_url.is_some() => (ctx.client()?, raw.clone()),
            None => {
                writeln!(stdout, "{raw:<20} [no registry to resolve short identifier]")?;
                continue;
            }
        };
        let Some(locations) = query::find(&client, &id, None)
            .await
            .with_context(|| format!("failed to look up {id}"))?
        else {
            writeln!(stdout, "{id:<20}\t(not found)")?;
            continue;
        };
        for location in locations {
            let handle = match location {
                Ok(h) => h,
                Err(e) => {
                    tracing::debug!("{id}: {e}");
                    continue;
                }
            };
            if let Some(dir) = &args.link {
                if matches!(handle, ResourceHandle::Local(_)) {
                    let link = query::link_into(&handle, dir)?;
                    writeln!(stdout, "{id:<20}\t-> {}", link.display())?;
                    break;
                }
                tracing::info!("{handle} doesn't support linking");
            } else if args.print0 {
                match &handle {
                    ResourceHandle::Local(local) => {
                        write!(stdout, "{}\0", local.path.display())?;
                    }
                    ResourceHandle::Remote(_) => tracing::info!("{handle} isn't local, skipping"),
                }
            } else {
                writeln!(stdout, "{id:<20}\t{handle}")?;
            }
        }
    }
    stdout.flush()?;
    Ok(0)
}

/// Execute `nbank search`.
pub async fn run_search(args: &SearchArgs, ctx: &Context) -> Result<u8> {
    let query = search_query(args);
    if query.is_empty() {
        bail!("at least one filter parameter is required");
    }
    let client = ctx.client()?;
    let hits = query::search(&client, &query).await.context("search failed")?;
    for resource in &hits {
        if args.json_out {
            println!("{}", serde_json::to_string_pretty(resource)?);
        } else {
            println!("{}", resource.name);
        }
    }
    Ok(0)
}

fn search_query(args: &SearchArgs) -> ResourceQuery {
    ResourceQuery {
        name: args.name.clone(),
        dtype: args.dtype.clone(),
        sha1: args.hash.clone(),
        location: args.archive.clone(),
        metadata: collect_metadata(&args.metadata),
        metadata_neq: collect_metadata(&args.metadata_neq),
    }
}

/// Execute `nbank info`.
pub async fn run_info(args: &InfoArgs, ctx: &Context) -> Result<u8> {
    let client = ctx.client()?;
    let records = query::describe_many(&client, &args.ids)
        .await
        .context("failed to retrieve resource records")?;
    for record in &records {
        println!("{}", serde_json::to_string_pretty(record)?);
    }
    Ok(0)
}

/// Execute `nbank verify`.
pub async fn run_verify(args: &VerifyArgs, ctx: &Context) -> Result<u8> {
    let client = ctx.client()?;
    let mut failed = false;
    for path in &args.files {
        let lines = verify_lines(&client, path).await?;
        failed |= lines.iter().any(|(ok, _)| !ok);
        for (_, line) in lines {
            println!("{line}");
        }
    }
    Ok(if failed { 1 } else { 0 })
}

/// Report lines for one path, each flagged with whether it is a success.
async fn verify_lines(client: &RegistryClient, path: &std::path::Path) -> Result<Vec<(bool, String)>> {
    let shown = path.display();
    if !path.exists() {
        return Ok(vec![(false, format!("{shown}: no such file or directory"))]);
    }
    let verdict = query::verify(client, path)
        .await
        .with_context(|| format!("failed to verify {shown}"))?;
    Ok(match verdict {
        Verification::Match { .. } => vec![(true, format!("{shown}: OK"))],
        Verification::Mismatch { id } => {
            vec![(false, format!("{shown}: FAILED to match record for {id}"))]
        }
        Verification::HashMatches(names) if names.is_empty() => {
            vec![(false, format!("{shown}: no matches in registry"))]
        }
        Verification::HashMatches(names) => names
            .into_iter()
            .map(|name| (true, format!("{shown}: matches registry resource {name}")))
            .collect(),
    })
}

/// Execute `nbank modify`.
pub async fn run_modify(args: &ModifyArgs, ctx: &Context) -> Result<u8> {
    let patch = metadata_patch(&args.metadata, &args.remove);
    if patch.is_empty() {
        bail!("nothing to modify: supply -k KEY=VALUE or -K KEY");
    }
    let client = ctx.client()?;
    let updated = query::update(&client, &args.ids, &patch)
        .await
        .context("failed to update metadata")?;
    for record in &updated {
        println!("{}", serde_json::to_string_pretty(record)?);
    }
    Ok(0)
}

/// Merge set and delete requests. Deletions are sent as nulls and win over
/// a value set for the same key.
fn metadata_patch(set: &[(String, MetadataValue)], remove: &[String]) -> Metadata {
    let mut patch = collect_metadata(set);
    for key in remove {
        patch.insert(key.clone(), MetadataValue::Null);
    }
    patch
}
