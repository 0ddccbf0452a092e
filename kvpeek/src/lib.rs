//! Library side of the kvpeek binary.
//!
//! Split from `main.rs` so the fetch and output logic can be tested against
//! an in-memory [`kvpeek_core::DocumentReader`].

pub mod cli;
pub mod fetch;
pub mod output;

use cli::Cli;
use kvpeek_core::cluster::{Cluster, ClusterOptions, DEFAULT_CONNECT_TIMEOUT};
use kvpeek_core::error::redact_connection_string;
use kvpeek_core::{Result, SecurityConfig};
use tracing::{error, info};

/// Connects, fetches and writes, in that order.
///
/// # Errors
/// Database errors and file errors both propagate; the caller decides how
/// each is reported.
pub async fn run(cli: &Cli) -> Result<fetch::DumpSummary> {
    info!(
        "Connecting to cluster {} with user {}",
        redact_connection_string(&cli.host),
        cli.username
    );

    let security = match &cli.cacert {
        Some(ca_file) => SecurityConfig::with_ca_file(ca_file),
        None => SecurityConfig::insecure(),
    };
    let options = ClusterOptions::new(cli.username.clone(), cli.password.clone())
        .with_security(security);

    let mut cluster = Cluster::connect(&cli.host, options).map_err(|e| {
        error!("Invalid cluster settings: {}", e);
        e
    })?;
    cluster.wait_until_ready(DEFAULT_CONNECT_TIMEOUT).await?;

    let bucket = cluster.bucket(&cli.bucket).await?;
    let collection = bucket
        .scope(cli.scope.as_str())
        .collection(cli.collection.as_str());

    info!(
        "Reading doc {} from {}.{}.{}",
        cli.doc_id, cli.bucket, cli.scope, cli.collection
    );

    fetch::dump_document(&collection, &cli.doc_id, &cli.output_dir).await
}
