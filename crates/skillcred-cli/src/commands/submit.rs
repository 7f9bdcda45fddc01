//! `skillcred submit` — Record an approved submission.

use base64::Engine;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{error_message, unreachable, DEFAULT_ENDPOINT};

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Submission identifier from review.
    #[arg(short, long)]
    pub submission: String,

    /// Holder identity the credential will be issued to.
    #[arg(long)]
    pub holder: String,

    /// Skill the credential asserts.
    #[arg(long)]
    pub skill: String,

    /// Existing artifact content hash.
    #[arg(long, conflicts_with = "artifact_file")]
    pub artifact_ref: Option<String>,

    /// Artifact file to upload with the submission.
    #[arg(long)]
    pub artifact_file: Option<PathBuf>,

    /// Reviewer who approved the submission.
    #[arg(long)]
    pub reviewer: Option<String>,

    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    submission_id: &'a str,
    holder: &'a str,
    skill: &'a str,
    artifact_ref: Option<&'a str>,
    reviewer: Option<&'a str>,
    artifact_base64: Option<String>,
}

#[derive(Deserialize)]
struct IssuanceView {
    submission_id: String,
    state: String,
}

pub async fn run(args: &SubmitArgs) -> anyhow::Result<()> {
    let artifact_base64 = match &args.artifact_file {
        Some(path) => {
            let bytes = std::fs::read(path)?;
            Some(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        None => None,
    };

    let body = SubmitRequest {
        submission_id: &args.submission,
        holder: &args.holder,
        skill: &args.skill,
        artifact_ref: args.artifact_ref.as_deref(),
        reviewer: args.reviewer.as_deref(),
        artifact_base64,
    };

    let url = format!("{}/api/v1/submissions", args.endpoint);
    let resp = reqwest::Client::new().post(&url).json(&body).send().await;

    match resp {
        Ok(r) if r.status().is_success() => {
            let view: IssuanceView = r.json().await?;
            println!("Submission {} recorded ({})", view.submission_id, view.state);
            println!("Issue it with: skillcred issue --submission {}", view.submission_id);
        }
        Ok(r) => anyhow::bail!("submission failed ({})", error_message(r).await),
        Err(e) => unreachable(&args.endpoint, &e),
    }

    Ok(())
}
