use std::path::PathBuf;

use anyhow::Context;
use bulker::{plan, AccountSet, Config, Driver, RpcLedger, Submitter};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Measures the gas cost of the batching contract's three entry points
/// against a fixed deployment, or resets the test accounts to baseline.
#[derive(Parser, Debug)]
struct Args {
    /// File containing test wallet private keys (1 per line)
    wallets: PathBuf,

    /// Deployment and endpoint configuration
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Only return every tracked token to the primary account
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let accounts = AccountSet::load(&args.wallets)?;
    println!("Accounts loaded: {:?}", accounts.addresses());

    let ledger = RpcLedger::connect(&config.rpc_url)?;
    let submitter = Submitter::new(ledger, config.submit_settings())
        .await
        .with_context(|| format!("connecting to {}", config.rpc_url))?;
    tracing::info!(chain_id = submitter.chain_id(), "connected");

    let steps = if args.reset {
        plan::reset()
    } else {
        plan::gas_comparison(&accounts, &config.scenario)
    };
    let driver = Driver::new(
        &submitter,
        &accounts,
        config.deployment,
        config.scenario.tracked_ids(),
    );
    driver
        .run_with(&steps, 0, |report| {
            for line in report.render(&config.native_symbol) {
                println!("{line}");
            }
        })
        .await?;

    Ok(())
}
