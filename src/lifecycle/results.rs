//! Pass/fail aggregate shared by concurrently running cases

use super::case::TestCase;
use super::poll::{poll_until, PollPolicy};
use super::Phase;
use crate::error::{E2eError, E2eResult};

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::RwLock;
use uuid::Uuid;

struct CaseRecord {
    case: TestCase,
    finished: bool,
}

#[derive(Default)]
struct ResultsInner {
    total: usize,
    passed: usize,
    failed: usize,
    cases: BTreeMap<String, CaseRecord>,
}

/// Counters and per-case records behind one lock
#[derive(Default)]
pub struct TestResults {
    inner: RwLock<ResultsInner>,
}

impl TestResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a case before it runs
    pub async fn record(&self, case: &TestCase) -> E2eResult<()> {
        let mut inner = self.inner.write().await;
        if inner.cases.contains_key(&case.name) {
            return Err(E2eError::DuplicateCase(case.name.clone()));
        }
        inner.cases.insert(
            case.name.clone(),
            CaseRecord {
                case: case.clone(),
                finished: false,
            },
        );
        inner.total += 1;
        Ok(())
    }

    pub async fn pass(&self, case: TestCase) -> E2eResult<()> {
        self.finish(case, true).await
    }

    pub async fn fail(&self, mut case: TestCase, error: &E2eError) -> E2eResult<()> {
        case.error = Some(error.to_string());
        self.finish(case, false).await
    }

    async fn finish(&self, case: TestCase, passed: bool) -> E2eResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .cases
            .get_mut(&case.name)
            .ok_or_else(|| E2eError::NotFound(format!("test case {} not recorded", case.name)))?;

        if record.finished {
            return Err(E2eError::InvalidStateTransition {
                from: format!("{} finished", case.name),
                to: "finished again".to_string(),
            });
        }
        record.finished = true;
        record.case = case;

        if passed {
            inner.passed += 1;
        } else {
            inner.failed += 1;
        }
        crate::metrics::record_case_outcome(passed);
        Ok(())
    }

    pub async fn finished(&self) -> usize {
        let inner = self.inner.read().await;
        inner.passed + inner.failed
    }

    /// Wait until `total` cases have reported or the policy's timeout passes
    pub async fn await_completion(&self, total: usize, policy: PollPolicy) -> E2eResult<()> {
        poll_until(policy, Phase::AwaitSuite, || async move {
            Ok((self.finished().await >= total).then_some(()))
        })
        .await
    }

    pub async fn case(&self, name: &str) -> Option<TestCase> {
        let inner = self.inner.read().await;
        inner.cases.get(name).map(|record| record.case.clone())
    }

    pub async fn summary(
        &self,
        run_id: Uuid,
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
    ) -> Summary {
        let inner = self.inner.read().await;
        Summary {
            run_id,
            started,
            finished,
            total: inner.total,
            passed: inner.passed,
            failed: inner.failed,
            failures: inner
                .cases
                .values()
                .filter_map(|record| {
                    record
                        .case
                        .error
                        .as_ref()
                        .map(|error| (record.case.name.clone(), error.clone()))
                })
                .collect(),
        }
    }
}

/// Final report of a suite run
#[derive(Debug, Clone)]
pub struct Summary {
    pub run_id: Uuid,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Failed case names with their errors
    pub failures: Vec<(String, String)>,
}

impl Summary {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.passed as f64 / self.total as f64 * 100.0
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.passed == self.total
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Test Results ===")?;
        writeln!(f, "Run:          {}", self.run_id)?;
        writeln!(f, "Started:      {}", self.started.to_rfc3339())?;
        writeln!(
            f,
            "Finished:     {} ({}s)",
            self.finished.to_rfc3339(),
            (self.finished - self.started).num_seconds()
        )?;
        writeln!(f, "Total Tests:  {}", self.total)?;
        writeln!(f, "Passed:       {}", self.passed)?;
        writeln!(f, "Failed:       {}", self.failed)?;
        write!(f, "Success Rate: {:.2}%", self.success_rate())?;

        if !self.failures.is_empty() {
            write!(f, "\n\nFailed Tests:")?;
            for (name, error) in &self.failures {
                write!(f, "\n  - {}: {}", name, error)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::case::tests::participants;
    use std::sync::Arc;
    use std::time::Duration;

    fn case(name: &str) -> TestCase {
        TestCase::new(name, 1, 1, 1, participants())
    }

    #[tokio::test]
    async fn test_counts_pass_and_fail() {
        let results = TestResults::new();
        results.record(&case("a")).await.unwrap();
        results.record(&case("b")).await.unwrap();

        results.pass(case("a")).await.unwrap();
        results
            .fail(case("b"), &E2eError::NotFound("no locked orders found".into()))
            .await
            .unwrap();

        let summary = results
            .summary(Uuid::new_v4(), Utc::now(), Utc::now())
            .await;
        assert_eq!(summary.total, 2);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.success_rate(), 50.0);
        assert_eq!(
            summary.failures,
            vec![("b".to_string(), "no locked orders found".to_string())]
        );
        assert!(!summary.all_passed());
        assert!(summary.to_string().contains("  - b: no locked orders found"));
    }

    #[tokio::test]
    async fn test_duplicate_and_unknown_cases_are_rejected() {
        let results = TestResults::new();
        results.record(&case("a")).await.unwrap();
        assert!(matches!(
            results.record(&case("a")).await,
            Err(E2eError::DuplicateCase(_))
        ));
        assert!(results.pass(case("zzz")).await.is_err());
    }

    #[tokio::test]
    async fn test_case_finishes_once() {
        let results = TestResults::new();
        results.record(&case("a")).await.unwrap();
        results.pass(case("a")).await.unwrap();
        assert!(results.pass(case("a")).await.is_err());
        assert_eq!(results.finished().await, 1);
    }

    #[tokio::test]
    async fn test_empty_run_has_zero_success_rate() {
        let summary = TestResults::new()
            .summary(Uuid::new_v4(), Utc::now(), Utc::now())
            .await;
        assert_eq!(summary.success_rate(), 0.0);
        assert!(summary.to_string().contains("Success Rate: 0.00%"));
    }

    #[tokio::test]
    async fn test_concurrent_updates_keep_counters_consistent() {
        let results = Arc::new(TestResults::new());
        for i in 0..32 {
            results.record(&case(&format!("case-{i}"))).await.unwrap();
        }

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let results = results.clone();
                tokio::spawn(async move {
                    let case = case(&format!("case-{i}"));
                    if i % 2 == 0 {
                        results.pass(case).await
                    } else {
                        results.fail(case, &E2eError::Decode("x".into())).await
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        results
            .await_completion(
                32,
                PollPolicy::new(Duration::from_millis(5), Duration::from_secs(1)),
            )
            .await
            .unwrap();
        let summary = results
            .summary(Uuid::new_v4(), Utc::now(), Utc::now())
            .await;
        assert_eq!(summary.passed, 16);
        assert_eq!(summary.failed, 16);
        assert_eq!(summary.passed + summary.failed, summary.total);
    }

    #[tokio::test]
    async fn test_await_completion_times_out() {
        let results = TestResults::new();
        results.record(&case("a")).await.unwrap();
        let err = results
            .await_completion(
                1,
                PollPolicy::new(Duration::from_millis(5), Duration::from_millis(30)),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            E2eError::LifecycleTimeout {
                phase: Phase::AwaitSuite
            }
        ));
    }
}
