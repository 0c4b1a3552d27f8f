//! Order lifecycle orchestration
//!
//! This module provides:
//! - `Orchestrator`: drives orders through create, lock, close and completion
//!   by polling the ledger's order books between side-effecting transactions
//! - `TestCase`: per-case run state with a monotonic status
//! - `TestResults`: the shared pass/fail aggregate
//! - `SuiteRunner`: cleanup, case scheduling and the final report

mod case;
mod engine;
mod poll;
mod results;
mod suite;

#[cfg(test)]
pub(crate) use case::Participants;
pub use engine::{Orchestrator, OrchestratorConfig};
pub use poll::{PollPolicy, Timings};
pub use suite::{cases_from_settings, SuiteRunner};

use std::fmt;

/// A polled wait bounded by its own timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    AwaitCreate,
    AwaitLock,
    AwaitCompletion,
    /// Waiting for every case of a suite to report
    AwaitSuite,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::AwaitCreate => "await-create",
            Phase::AwaitLock => "await-lock",
            Phase::AwaitCompletion => "await-completion",
            Phase::AwaitSuite => "await-suite",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
