//! Scan command - report which release resources exist in the cluster

use helmscan_core::ReleaseQuery;
use helmscan_kube::{KubeCluster, ResolverConfig, Scanner};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::display::{self, OutputFormat};
use crate::error::{CliError, Result};
use crate::exit_codes;

/// Resolves once Ctrl-C is pressed
async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for Ctrl-C, interruption disabled");
        std::future::pending::<()>().await;
    }
    debug!("Ctrl-C received");
}

/// Run the scan command, returning the process exit code
pub async fn run(query: &ReleaseQuery, config: ResolverConfig, output: OutputFormat) -> Result<i32> {
    let cluster = KubeCluster::try_default()
        .await
        .map_err(|e| CliError::cluster_connect(&e))?;
    let scanner = Scanner::new(Arc::new(cluster), config)?;

    let report = scanner.scan(query, ctrl_c()).await?;
    println!("{}", display::render(&report, output)?.trim_end());

    if report.interrupted {
        Ok(exit_codes::INTERRUPTED)
    } else {
        Ok(exit_codes::SUCCESS)
    }
}
