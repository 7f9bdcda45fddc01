//! `skillcred revoke` — Revoke a credential on the ledger.

use clap::Args;

use super::{error_message, unreachable, DEFAULT_ENDPOINT};

#[derive(Args, Debug)]
pub struct RevokeArgs {
    /// Credential id.
    pub credential: String,

    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

pub async fn run(args: &RevokeArgs) -> anyhow::Result<()> {
    let url = format!("{}/api/v1/credentials/{}/revoke", args.endpoint, args.credential);
    let resp = reqwest::Client::new().post(&url).send().await;

    match resp {
        Ok(r) if r.status().is_success() => {
            println!("Credential {} revoked", args.credential);
        }
        Ok(r) => anyhow::bail!("revocation failed ({})", error_message(r).await),
        Err(e) => unreachable(&args.endpoint, &e),
    }

    Ok(())
}
