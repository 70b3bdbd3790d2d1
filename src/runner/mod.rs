//! Applying an ordered script sequence to a database.

pub mod journal;

pub use journal::{JournalTable, JournaledRunner};

use async_trait::async_trait;
use serde::Serialize;

use crate::selector::OrderedScript;

/// Outcome of applying a script sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub successful: bool,
    /// Scripts applied by this run; already-journaled scripts are not counted.
    pub applied_count: usize,
    /// Name of the script that stopped the run.
    pub failed_script: Option<String>,
    pub error: Option<String>,
}

impl RunResult {
    pub fn succeeded(applied_count: usize) -> Self {
        Self {
            successful: true,
            applied_count,
            failed_script: None,
            error: None,
        }
    }

    pub fn failed(
        applied_count: usize,
        failed_script: Option<String>,
        error: impl std::fmt::Display,
    ) -> Self {
        Self {
            successful: false,
            applied_count,
            failed_script,
            error: Some(error.to_string()),
        }
    }
}

/// Applies scripts strictly in sequence order and stops at the first failure.
///
/// Implementations report failures through [`RunResult`] rather than returning
/// errors, so a failed deployment never aborts fixture construction.
#[async_trait]
pub trait MigrationRunner: Send + Sync {
    async fn apply(&self, scripts: &[OrderedScript], connection_string: &str) -> RunResult;
}
