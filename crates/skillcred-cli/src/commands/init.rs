//! `skillcred init` — Write a starter node configuration.

use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Where to write the configuration.
    #[arg(short, long, default_value = "skillcred.toml")]
    pub config: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

const TEMPLATE: &str = r#"# Skillcred node configuration

[api]
listen_addr = "127.0.0.1"
port = 9101

[storage]
data_dir = "./data"
# rocksdb | memory
backend = "rocksdb"

[ledger]
# memory | http
backend = "memory"
# endpoint = "http://127.0.0.1:8545"
issuer = "0xskillcred-issuer"
authorized_issuers = ["0xskillcred-issuer"]

[lifecycle]
ledger_timeout_ms = 10000
cache_max_age_secs = 300
sweep_interval_secs = 180
grace_period_secs = 60
pending_timeout_secs = 120
revalidate_after_secs = 3600

[logging]
level = "info"
# text | json
format = "text"
"#;

pub fn run(args: &InitArgs) -> anyhow::Result<()> {
    if args.config.exists() && !args.force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            args.config.display()
        );
    }
    if let Some(parent) = args.config.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(&args.config, TEMPLATE)?;
    println!("Wrote {}", args.config.display());
    println!("Start the node with: skillcred-node --config {}", args.config.display());
    Ok(())
}
