//! `skillcred verify` — Verify a credential id or holder.

use clap::Args;
use serde::Deserialize;

use super::{error_message, unreachable, DEFAULT_ENDPOINT};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Credential id or holder identity.
    pub identifier: String,

    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Deserialize)]
struct Record {
    id: String,
    holder: String,
    skill: String,
    issuer: String,
}

#[derive(Deserialize)]
struct VerificationResult {
    valid: bool,
    record: Option<Record>,
    source: String,
    staleness_ms: u64,
    #[serde(default)]
    mirror_stale: bool,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Resolution {
    Credential(VerificationResult),
    Holder {
        holder: String,
        credentials: Vec<VerificationResult>,
    },
}

fn print_result(result: &VerificationResult) {
    let verdict = if result.valid { "VALID" } else { "INVALID" };
    match &result.record {
        Some(record) => println!("  [{}] {} ({})", verdict, record.id, record.skill),
        None => println!("  [{}]", verdict),
    }
    if let Some(record) = &result.record {
        println!("      holder: {}  issuer: {}", record.holder, record.issuer);
    }
    print!("      source: {}", result.source);
    if result.staleness_ms > 0 {
        print!(" ({}s old)", result.staleness_ms / 1000);
    }
    println!();
    if result.mirror_stale {
        println!("      local mirror was stale; reconciliation scheduled");
    }
}

pub async fn run(args: &VerifyArgs) -> anyhow::Result<()> {
    let url = format!("{}/api/v1/verify/{}", args.endpoint, args.identifier);
    let resp = reqwest::get(&url).await;

    match resp {
        Ok(r) if r.status().is_success() => match r.json::<Resolution>().await? {
            Resolution::Credential(result) => {
                println!("Credential {}:", args.identifier);
                print_result(&result);
            }
            Resolution::Holder {
                holder,
                credentials,
            } => {
                println!("Holder {} has {} credential(s):", holder, credentials.len());
                for result in &credentials {
                    print_result(result);
                }
            }
        },
        Ok(r) if r.status() == reqwest::StatusCode::NOT_FOUND => {
            println!("No credential or holder named {} exists", args.identifier);
        }
        Ok(r) if r.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE => {
            println!("Could NOT CHECK {}: the ledger is unreachable", args.identifier);
            println!("  This is not a verdict; try again later.");
        }
        Ok(r) => anyhow::bail!("verification failed ({})", error_message(r).await),
        Err(e) => unreachable(&args.endpoint, &e),
    }

    Ok(())
}
