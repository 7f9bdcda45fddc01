//! `skillcred issue` — Issue the credential for an approved submission.

use clap::Args;
use serde::{Deserialize, Serialize};

use super::{error_message, unreachable, DEFAULT_ENDPOINT};

#[derive(Args, Debug)]
pub struct IssueArgs {
    /// Submission identifier.
    #[arg(short, long)]
    pub submission: String,

    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Serialize)]
struct IssueRequest<'a> {
    submission_id: &'a str,
}

#[derive(Deserialize)]
struct IssueResponse {
    status: String,
    submission_id: String,
    credential_id: Option<String>,
    mirror_status: Option<String>,
    tx_ref: Option<String>,
    reason: Option<String>,
}

pub async fn run(args: &IssueArgs) -> anyhow::Result<()> {
    let url = format!("{}/api/v1/issue", args.endpoint);
    let body = IssueRequest {
        submission_id: &args.submission,
    };
    let resp = reqwest::Client::new().post(&url).json(&body).send().await;

    let r = match resp {
        Ok(r) => r,
        Err(e) => {
            unreachable(&args.endpoint, &e);
            return Ok(());
        }
    };

    let status = r.status();
    if status.is_client_error() && status != reqwest::StatusCode::CONFLICT
        && status != reqwest::StatusCode::UNPROCESSABLE_ENTITY
    {
        anyhow::bail!("issue failed ({})", error_message(r).await);
    }

    let data: IssueResponse = r.json().await?;
    let credential = data.credential_id.as_deref().unwrap_or("-");
    match data.status.as_str() {
        "issued" => {
            println!("Credential issued for submission {}", data.submission_id);
            println!("  Credential: {}", credential);
            if let Some(tx) = &data.tx_ref {
                println!("  Tx:         {}", tx);
            }
            if data.mirror_status.as_deref() != Some("mirrored") {
                println!("  Local mirror pending; the sweeper will complete it.");
            }
        }
        "already_issued" => {
            println!("Submission {} was already issued", data.submission_id);
            println!("  Credential: {}", credential);
        }
        "indeterminate" => {
            println!("Ledger outcome UNKNOWN for submission {}", data.submission_id);
            println!("  Do not treat this as failure. Re-run `skillcred issue` later;");
            println!("  the node checks the ledger before writing again.");
        }
        "in_flight" => {
            println!("Issuance already in progress for submission {}", data.submission_id);
        }
        other => {
            println!("Issuance {} for submission {}", other.to_uppercase(), data.submission_id);
        }
    }
    if let Some(reason) = &data.reason {
        println!("  Reason:     {}", reason);
    }

    Ok(())
}
