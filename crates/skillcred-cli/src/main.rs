//! Skillcred CLI — command-line client for a Skillcred node.
//!
//! Subcommands: init, submit, issue, verify, revoke, sweep, status.

mod commands;

use clap::{Parser, Subcommand};

/// Skillcred — skill credentials anchored on a ledger.
#[derive(Parser, Debug)]
#[command(name = "skillcred", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter node configuration file.
    Init(commands::init::InitArgs),
    /// Record an approved submission.
    Submit(commands::submit::SubmitArgs),
    /// Issue the credential for an approved submission.
    Issue(commands::issue::IssueArgs),
    /// Verify a credential id or holder.
    Verify(commands::verify::VerifyArgs),
    /// Revoke a credential on the ledger.
    Revoke(commands::revoke::RevokeArgs),
    /// Run one reconciliation sweep now.
    Sweep(commands::sweep::SweepArgs),
    /// Query the status of a running node.
    Status(commands::status::StatusArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Init(args) => commands::init::run(args),
        Commands::Submit(args) => commands::submit::run(args).await,
        Commands::Issue(args) => commands::issue::run(args).await,
        Commands::Verify(args) => commands::verify::run(args).await,
        Commands::Revoke(args) => commands::revoke::run(args).await,
        Commands::Sweep(args) => commands::sweep::run(args).await,
        Commands::Status(args) => commands::status::run(args).await,
    }
}
