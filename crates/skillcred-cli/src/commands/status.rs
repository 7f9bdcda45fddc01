//! `skillcred status` — Query the status of a running node.

use clap::Args;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::{unreachable, DEFAULT_ENDPOINT};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    version: String,
    issuer: String,
    ledger_backend: String,
    uptime_secs: u64,
    mirrors: BTreeMap<String, usize>,
}

pub async fn run(args: &StatusArgs) -> anyhow::Result<()> {
    let url = format!("{}/api/v1/status", args.endpoint);
    let resp = reqwest::get(&url).await;

    match resp {
        Ok(r) if r.status().is_success() => {
            let status: StatusResponse = r.json().await?;
            println!("Node Status:");
            println!("  Version:    {}", status.version);
            println!("  Issuer:     {}", status.issuer);
            println!("  Ledger:     {}", status.ledger_backend);
            println!("  Uptime:     {}s", status.uptime_secs);
            println!("  Mirrors:");
            for (state, count) in &status.mirrors {
                println!("    {:<28} {}", state, count);
            }
        }
        Ok(r) => {
            anyhow::bail!("node returned HTTP {}", r.status());
        }
        Err(e) => unreachable(&args.endpoint, &e),
    }

    Ok(())
}
