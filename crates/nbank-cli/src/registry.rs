//! # Registry subcommands
//!
//! `nbank registry-info` and `nbank dtype list|add`.

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use nbank_registry::types::Datatype;

use crate::Context;

/// Arguments for `nbank dtype`.
#[derive(Args, Debug)]
pub struct DtypeArgs {
    #[command(subcommand)]
    pub command: DtypeCommand,
}

#[derive(Subcommand, Debug)]
pub enum DtypeCommand {
    /// List the datatypes known to the registry.
    List,

    /// Add a datatype to the registry.
    Add {
        /// Name of the new datatype.
        dtype_name: String,
        /// MIME content type of resources with this datatype.
        content_type: String,
    },
}

/// Execute `nbank registry-info`.
pub async fn run_registry_info(ctx: &Context) -> Result<u8> {
    let client = ctx.client()?;
    let info = client
        .info()
        .await
        .context("failed to retrieve registry info")?;
    tracing::info!("registry info:");
    tracing::info!("  - address: {}", client.base_url());
    for (key, value) in &info {
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        tracing::info!("  - {key}: {value}");
    }
    Ok(0)
}

/// Execute `nbank dtype`.
pub async fn run_dtype(args: &DtypeArgs, ctx: &Context) -> Result<u8> {
    let client = ctx.client()?;
    match &args.command {
        DtypeCommand::List => {
            let dtypes = client.datatypes().await.context("failed to list datatypes")?;
            for dtype in &dtypes {
                println!("{}", format_dtype(dtype));
            }
        }
        DtypeCommand::Add {
            dtype_name,
            content_type,
        } => {
            let added = client
                .add_datatype(dtype_name, content_type)
                .await
                .with_context(|| format!("failed to add datatype {dtype_name}"))?;
            tracing::info!("added datatype {} (content-type: {})", added.name, added.content_type);
        }
    }
    Ok(0)
}

fn format_dtype(dtype: &Datatype) -> String {
    format!("{:<25}\t({})", dtype.name, dtype.content_type)
}
