//! `skillcred sweep` — Run one reconciliation sweep now.

use clap::Args;
use serde::Deserialize;

use super::{error_message, unreachable, DEFAULT_ENDPOINT};

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Deserialize)]
struct SweepReport {
    examined: usize,
    mirrored: usize,
    orphaned: usize,
    refreshed: usize,
    left_pending: usize,
    transient_errors: usize,
}

pub async fn run(args: &SweepArgs) -> anyhow::Result<()> {
    let url = format!("{}/api/v1/sweep", args.endpoint);
    let resp = reqwest::Client::new().post(&url).send().await;

    match resp {
        Ok(r) if r.status().is_success() => {
            let report: SweepReport = r.json().await?;
            println!("Sweep complete:");
            println!("  Examined:         {}", report.examined);
            println!("  Mirrored:         {}", report.mirrored);
            println!("  Refreshed:        {}", report.refreshed);
            println!("  Orphaned:         {}", report.orphaned);
            println!("  Left pending:     {}", report.left_pending);
            println!("  Transient errors: {}", report.transient_errors);
        }
        Ok(r) => anyhow::bail!("sweep failed ({})", error_message(r).await),
        Err(e) => unreachable(&args.endpoint, &e),
    }

    Ok(())
}
