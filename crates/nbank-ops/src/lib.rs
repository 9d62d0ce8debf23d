//! # nbank-ops
//!
//! The neurobank workflows. Each combines the local archive (`nbank-core`)
//! with the registry (`nbank-registry`):
//!
//! - [`deposit`](deposit::deposit): register and store files in an archive
//! - [`init_archive`](init::init_archive): register and lay out a new archive
//! - [`find`](query::find) / [`get`](query::get): resolve locations to paths or URLs
//! - [`verify`](query::verify): compare a file's hash with the registry
//! - [`update`](query::update): patch metadata on many resources
//! - [`fetch`](fetch::fetch): bounded concurrent download of remote copies
//! - [`check_archive`](check::check_archive): reconcile an archive with the registry
//!
//! Batch operations report per-item outcomes through a caller-supplied sink
//! and reserve `Err` for conditions that stop the whole batch.

pub mod archive;
pub mod check;
pub mod deposit;
pub mod error;
pub mod fetch;
pub mod init;
pub mod query;

pub use deposit::{deposit, DepositReport, DepositRequest, ItemOutcome, SkipReason};
pub use error::OpsError;
pub use fetch::{fetch, FetchOptions, FetchOutcome};
