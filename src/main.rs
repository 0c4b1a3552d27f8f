//! Oracle E2E - lifecycle tester for the cross-chain order book
//!
//! Drives sell orders on the source ledger through create, lock, close and
//! settlement against a foreign ERC20 chain, and verifies the resulting balances.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{debug, error, info};

mod balance;
mod chain;
mod cli;
mod config;
mod error;
mod lifecycle;
mod metrics;
mod order;
#[cfg(test)]
mod testkit;
mod tx;

use chain::{EthereumProvider, LedgerRpcClient};
use cli::{CliArgs, Command};
use config::Settings;
use lifecycle::{cases_from_settings, Orchestrator, OrchestratorConfig, SuiteRunner};
use metrics::MetricsServer;
use order::selector::OrderTarget;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.verbose, args.json_logs);

    info!("Starting Oracle E2E v{}", env!("CARGO_PKG_VERSION"));

    let settings =
        Settings::load(args.config.as_deref()).context("Failed to load configuration")?;
    let accounts = settings
        .accounts
        .resolve()
        .context("Failed to resolve test accounts")?;
    info!(
        "Loaded {} foreign and {} ledger accounts",
        accounts.foreign.len(),
        accounts.ledger.len()
    );

    let ledger = Arc::new(LedgerRpcClient::new(&settings.ledger)?);
    let foreign = Arc::new(EthereumProvider::new(&settings.ethereum)?);
    let orchestrator = Arc::new(Orchestrator::new(
        ledger,
        foreign,
        OrchestratorConfig::from_settings(&settings)?,
        accounts,
    ));

    match &args.command {
        Command::CreateOrder => {
            let seller = args.seller(orchestrator.accounts())?;
            let receipt = orchestrator
                .create_order(args.amount, args.amount, seller.address)
                .await
                .context("Error creating order")?;
            println!("Order created successfully: {}", receipt.hash);
        }
        Command::LockOrder { target } => {
            let buyer = args.buyer(orchestrator.accounts())?;
            let receiver = args.receiver(orchestrator.accounts())?;
            let id = orchestrator
                .lock_order(target, &buyer, &receiver)
                .await
                .context("Error locking order")?;
            match target {
                OrderTarget::Id(_) => println!("Order {} locked successfully", id),
                OrderTarget::First => println!("First available order locked successfully ({})", id),
            }
        }
        Command::LockAll => {
            let buyer = args.buyer(orchestrator.accounts())?;
            let receiver = args.receiver(orchestrator.accounts())?;
            let locked = orchestrator
                .lock_all_unlocked(&buyer, &receiver)
                .await
                .context("Error locking orders")?;
            println!("All unlocked orders locked successfully ({} orders)", locked);
        }
        Command::CloseOrder { target } => {
            let buyer = args.buyer(orchestrator.accounts())?;
            let id = orchestrator
                .close_order(target, &buyer, args.amount)
                .await
                .context("Error closing order")?;
            match target {
                OrderTarget::Id(_) => println!("Order {} closed successfully", id),
                OrderTarget::First => println!("First locked order closed successfully ({})", id),
            }
        }
        Command::CloseAll => {
            let buyer = args.buyer(orchestrator.accounts())?;
            let closed = orchestrator
                .close_all_locked(&buyer, args.amount)
                .await
                .context("Error closing orders")?;
            println!("All locked orders closed successfully ({} orders)", closed);
        }
        Command::DeleteAll => {
            let deleted = orchestrator
                .delete_all_orders()
                .await
                .context("Error deleting orders")?;
            println!("Deleted {} orders", deleted);
        }
        Command::RunTests { strict } => {
            let metrics_handle = settings.metrics.enabled.then(|| {
                let server = MetricsServer::new(settings.metrics.port);
                tokio::spawn(async move {
                    if let Err(e) = server.run().await {
                        error!("Metrics server error: {}", e);
                    }
                })
            });

            let cases = cases_from_settings(&settings, orchestrator.accounts())?;
            let names: Vec<String> = cases.iter().map(|case| case.name.clone()).collect();
            let runner = SuiteRunner::new(orchestrator.clone(), settings.suite.parallel);
            let summary = runner.run(cases).await.context("Error running test suite")?;

            for name in &names {
                if let Some(case) = runner.results().case(name).await {
                    info!(
                        "Case {} ended at status {} (order {:?})",
                        name,
                        case.status(),
                        case.order_id()
                    );
                    debug!("Case {} initial balances: {:?}", name, case.initial_balances);
                }
            }
            println!("{}", summary);

            if let Some(handle) = metrics_handle {
                handle.abort();
            }
            if *strict && !summary.all_passed() {
                bail!("{} of {} test cases failed", summary.failed, summary.total);
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "info,oracle_e2e=trace,hyper=warn,reqwest=warn"
    } else {
        "info,oracle_e2e=debug,hyper=warn,reqwest=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}
