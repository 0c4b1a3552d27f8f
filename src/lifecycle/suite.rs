//! Full test-suite runs

use super::case::{Participants, TestCase};
use super::engine::Orchestrator;
use super::results::{Summary, TestResults};
use crate::config::{Accounts, Settings};
use crate::error::{E2eError, E2eResult};

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Build the configured cases against the resolved accounts
pub fn cases_from_settings(settings: &Settings, accounts: &Accounts) -> E2eResult<Vec<TestCase>> {
    settings
        .suite
        .cases
        .iter()
        .map(|config| -> E2eResult<TestCase> {
            let foreign = |index: usize| {
                accounts.foreign.get(index).cloned().ok_or_else(|| {
                    E2eError::Config(format!(
                        "Case {} references foreign account {} which is not configured",
                        config.name, index
                    ))
                })
            };
            let receiver = accounts.ledger.get(config.receiver).cloned().ok_or_else(|| {
                E2eError::Config(format!(
                    "Case {} references ledger account {} but only {} are available",
                    config.name,
                    config.receiver,
                    accounts.ledger.len()
                ))
            })?;

            Ok(TestCase::new(
                config.name.clone(),
                config.order_amount,
                config.expected_foreign_transfer,
                config.expected_native_transfer,
                Participants {
                    buyer: foreign(config.buyer)?,
                    seller: foreign(config.seller)?,
                    receiver,
                },
            ))
        })
        .collect()
}

/// Runs every case to completion and reports; case failures never abort the run
pub struct SuiteRunner {
    orchestrator: Arc<Orchestrator>,
    results: Arc<TestResults>,
    parallel: bool,
}

impl SuiteRunner {
    pub fn new(orchestrator: Arc<Orchestrator>, parallel: bool) -> Self {
        Self {
            orchestrator,
            results: Arc::new(TestResults::new()),
            parallel,
        }
    }

    pub fn results(&self) -> &Arc<TestResults> {
        &self.results
    }

    /// Clean the books, run all cases and summarize.
    ///
    /// Only cleanup and registration errors are returned; case outcomes are in the summary.
    pub async fn run(&self, cases: Vec<TestCase>) -> E2eResult<Summary> {
        let run_id = Uuid::new_v4();
        let started = Utc::now();
        info!("Starting test suite run {} with {} cases", run_id, cases.len());

        let deleted = self.orchestrator.delete_all_orders().await?;
        info!("Cleanup removed {} leftover orders", deleted);

        for case in &cases {
            self.results.record(case).await?;
        }
        let total = cases.len();

        if self.parallel {
            let handles: Vec<_> = cases
                .into_iter()
                .map(|case| {
                    let orchestrator = self.orchestrator.clone();
                    let results = self.results.clone();
                    tokio::spawn(run_one(orchestrator, results, case))
                })
                .collect();
            for handle in handles {
                if let Err(e) = handle.await {
                    error!("Test case task panicked: {}", e);
                }
            }
        } else {
            for case in cases {
                run_one(self.orchestrator.clone(), self.results.clone(), case).await;
            }
        }

        let policy = self.orchestrator.timings().suite;
        if let Err(e) = self.results.await_completion(total, policy).await {
            warn!("Not every test case reported: {}", e);
        }

        Ok(self.results.summary(run_id, started, Utc::now()).await)
    }
}

async fn run_one(orchestrator: Arc<Orchestrator>, results: Arc<TestResults>, mut case: TestCase) {
    info!("=== Running test case {} ===", case.name);

    let outcome = match orchestrator.run_case(&mut case).await {
        Ok(()) => {
            info!("Test case {} passed", case.name);
            results.pass(case).await
        }
        Err(e) => {
            error!("Test case {} failed: {}", case.name, e);
            results.fail(case, &e).await
        }
    };

    if let Err(e) = outcome {
        error!("Failed to record test case outcome: {}", e);
    }
}
