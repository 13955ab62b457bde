//! Sweep summary (sweep_summary.json)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error as _;
use std::fs;
use std::io;
use std::path::Path;

use super::state::{transition, CombinationState, CombinationStateError};
use super::{Choice, Combination};
use crate::error::{ComposeError, ExitCode};

/// Schema version for sweep_summary.json
pub const SWEEP_SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for sweep_summary.json
pub const SWEEP_SUMMARY_SCHEMA_ID: &str = "scomp/sweep_summary@1";

/// File name of the summary inside the sweep directory
pub const SWEEP_SUMMARY_FILE: &str = "sweep_summary.json";

/// Aggregate outcome of a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepStatus {
    /// At least one combination succeeded and fail-fast did not trip
    Success,
    /// No combination succeeded, or fail-fast tripped
    Failed,
    /// Shutdown was requested before every combination started
    Cancelled,
}

impl SweepStatus {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            SweepStatus::Success => ExitCode::Success,
            SweepStatus::Failed => ExitCode::SweepFailed,
            SweepStatus::Cancelled => ExitCode::Cancelled,
        }
    }
}

/// Why a combination failed, kept as plain data for the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinationFailure {
    /// Error category (`override`, `instantiate`, ...)
    pub kind: String,
    pub exit_code: i32,
    pub message: String,
    /// Source chain below `message`, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl CombinationFailure {
    pub fn from_error(err: &ComposeError) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            kind: err.kind().to_string(),
            exit_code: err.exit_code().as_i32(),
            message: err.to_string(),
            causes,
        }
    }

    pub fn panicked(message: String) -> Self {
        Self {
            kind: "panic".to_string(),
            exit_code: ExitCode::SweepFailed.as_i32(),
            message,
            causes: Vec::new(),
        }
    }
}

/// Outcome of one combination, stored in its indexed slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinationResult {
    pub index: usize,
    pub output_id: String,
    pub choices: Vec<Choice>,
    pub state: CombinationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<CombinationFailure>,
    pub updated_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl CombinationResult {
    /// A queued result for `combination`.
    pub fn queued(combination: &Combination) -> Self {
        Self {
            index: combination.index,
            output_id: combination.output_id(),
            choices: combination.choices.clone(),
            state: CombinationState::Queued,
            failure: None,
            updated_at: Utc::now(),
            duration_ms: 0,
        }
    }

    fn transition(&mut self, next: CombinationState) -> Result<(), CombinationStateError> {
        transition(self.index, &mut self.state, next)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), CombinationStateError> {
        self.transition(CombinationState::Running)
    }

    pub fn succeed(&mut self, duration_ms: u64) -> Result<(), CombinationStateError> {
        self.transition(CombinationState::Succeeded)?;
        self.duration_ms = duration_ms;
        Ok(())
    }

    pub fn fail(
        &mut self,
        failure: CombinationFailure,
        duration_ms: u64,
    ) -> Result<(), CombinationStateError> {
        self.transition(CombinationState::Failed)?;
        self.failure = Some(failure);
        self.duration_ms = duration_ms;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), CombinationStateError> {
        self.transition(CombinationState::Cancelled)
    }

    pub fn skip(&mut self) -> Result<(), CombinationStateError> {
        self.transition(CombinationState::Skipped)
    }
}

/// Sweep summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub schema_version: u32,
    pub schema_id: String,
    pub sweep_id: String,
    pub created_at: DateTime<Utc>,
    pub status: SweepStatus,
    pub exit_code: i32,
    /// Axis labels in declaration order
    pub axes: Vec<String>,
    pub combination_count: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped: usize,
    /// True if a failure stopped the remaining combinations
    pub fail_fast_tripped: bool,
    pub duration_ms: u64,
    pub human_summary: String,
    /// One entry per combination, ordered by index
    pub results: Vec<CombinationResult>,
}

impl SweepReport {
    /// Aggregate indexed results. `results[i].index` must equal `i`.
    pub fn from_results(
        sweep_id: String,
        axes: Vec<String>,
        results: Vec<CombinationResult>,
        fail_fast_tripped: bool,
        duration_ms: u64,
    ) -> Self {
        let count = |state| results.iter().filter(|r| r.state == state).count();
        let succeeded = count(CombinationState::Succeeded);
        let failed = count(CombinationState::Failed);
        let cancelled = count(CombinationState::Cancelled);
        let skipped = count(CombinationState::Skipped);
        let combination_count = results.len();

        let status = if cancelled > 0 {
            SweepStatus::Cancelled
        } else if fail_fast_tripped || succeeded == 0 {
            SweepStatus::Failed
        } else {
            SweepStatus::Success
        };

        let human_summary = Self::generate_human_summary(
            status,
            combination_count,
            succeeded,
            failed,
            cancelled,
            skipped,
        );

        Self {
            schema_version: SWEEP_SUMMARY_SCHEMA_VERSION,
            schema_id: SWEEP_SUMMARY_SCHEMA_ID.to_string(),
            sweep_id,
            created_at: Utc::now(),
            status,
            exit_code: status.exit_code().as_i32(),
            axes,
            combination_count,
            succeeded,
            failed,
            cancelled,
            skipped,
            fail_fast_tripped,
            duration_ms,
            human_summary,
            results,
        }
    }

    fn generate_human_summary(
        status: SweepStatus,
        total: usize,
        succeeded: usize,
        failed: usize,
        cancelled: usize,
        skipped: usize,
    ) -> String {
        if total == 0 {
            return "Sweep had no combinations".to_string();
        }
        match status {
            SweepStatus::Success if failed == 0 => {
                format!("Sweep succeeded: {}/{} combinations", succeeded, total)
            }
            SweepStatus::Success => format!(
                "Sweep partially succeeded: {} succeeded, {} failed",
                succeeded, failed
            ),
            SweepStatus::Failed => format!(
                "Sweep failed: {} succeeded, {} failed, {} skipped",
                succeeded, failed, skipped
            ),
            SweepStatus::Cancelled => format!(
                "Sweep cancelled: {} succeeded, {} failed, {} cancelled",
                succeeded, failed, cancelled
            ),
        }
    }

    /// Result slot for combination `index`.
    pub fn result(&self, index: usize) -> Option<&CombinationResult> {
        self.results.get(index)
    }

    pub fn indices_in(&self, state: CombinationState) -> Vec<usize> {
        self.results
            .iter()
            .filter(|r| r.state == state)
            .map(|r| r.index)
            .collect()
    }

    pub fn succeeded_indices(&self) -> Vec<usize> {
        self.indices_in(CombinationState::Succeeded)
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.indices_in(CombinationState::Failed)
    }

    pub fn exit_code_enum(&self) -> ExitCode {
        self.status.exit_code()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write to file
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e))
        })?;
        fs::write(path, json)
    }

    pub fn from_file(path: &Path) -> io::Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e)))
    }
}
