// crates/sentinel-core/src/job.rs
// ============================================================================
// Module: Sentinel Job Entity
// Description: Job record, lifecycle state machine, and per-job statistics.
// Purpose: Give the Job Manager and Worker Runtime one shared, closed set of
// legal state transitions.
// Dependencies: serde, thiserror, sentinel_core::{identifiers, time}
// ============================================================================

//! ## Overview
//! `JobStatus` is a closed enum; [`JobStatus::transition`] is the only legal
//! way to move between states and rejects illegal transitions with
//! [`TransitionError`] rather than silently no-opping, so the Job Manager can
//! surface a Conflict to the caller.

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::identifiers::CustomerId;
use crate::identifiers::JobId;
use crate::identifiers::RuleId;
use crate::identifiers::RulesetName;
use crate::identifiers::TenantId;
use crate::time::Timestamp;

/// Lifecycle state of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, waiting on admission (license check, concurrency quota).
    Submitted,
    /// Actively running on a worker.
    Running,
    /// Completed; at least one region produced findings or completed
    /// cleanly.
    Succeeded,
    /// Completed; every region failed.
    Failed,
    /// Cancelled before or during execution.
    Cancelled,
    /// Exceeded its configured timeout while running.
    TimedOut,
}

/// A rejected attempt to move a [`Job`] between [`JobStatus`] states.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal job transition: {from:?} -> {to:?}")]
pub struct TransitionError {
    /// State the job was in.
    pub from: JobStatus,
    /// State the caller attempted to move it to.
    pub to: JobStatus,
}

impl JobStatus {
    /// Returns true if this status represents a finished job (no further
    /// transitions are legal).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled | Self::TimedOut)
    }

    /// Attempts to move from `self` to `next`, returning the new status or a
    /// [`TransitionError`] if the move is not legal.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when `next` is not reachable from `self`.
    pub const fn transition(self, next: Self) -> Result<Self, TransitionError> {
        let legal = matches!(
            (self, next),
            (Self::Submitted, Self::Running)
                | (Self::Submitted, Self::Cancelled)
                | (Self::Submitted, Self::Failed)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
                | (Self::Running, Self::TimedOut)
        );
        if legal {
            Ok(next)
        } else {
            Err(TransitionError { from: self, to: next })
        }
    }
}

/// A single scan execution against one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Stable identifier.
    pub id: JobId,
    /// Owning customer.
    pub customer_id: CustomerId,
    /// Target tenant.
    pub tenant_id: TenantId,
    /// Ruleset names applied to this run.
    pub ruleset_names: Vec<RulesetName>,
    /// Restricts execution to this subset of rules within `ruleset_names`,
    /// set by the event batcher for event-driven jobs; `None` runs every
    /// rule in the requested rulesets.
    pub rule_filter: Option<Vec<RuleId>>,
    /// Regions this job scans; empty means the tenant's default set.
    pub regions: Vec<String>,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Submission timestamp.
    pub submitted_at: Timestamp,
    /// Timestamp the job started running, if it has.
    pub started_at: Option<Timestamp>,
    /// Timestamp the job reached a terminal state, if it has.
    pub finished_at: Option<Timestamp>,
    /// Wall-clock timeout for the running state, in seconds.
    pub timeout_seconds: u64,
    /// Reason the job failed, set when `status` reaches `Failed`.
    pub failure_reason: Option<String>,
}

impl Job {
    /// Applies a status transition, recording `started_at`/`finished_at` as
    /// appropriate.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the transition is illegal.
    pub fn apply_transition(&mut self, next: JobStatus, now: Timestamp) -> Result<(), TransitionError> {
        let new_status = self.status.transition(next)?;
        if new_status == JobStatus::Running {
            self.started_at = Some(now);
        }
        if new_status.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = new_status;
        Ok(())
    }

    /// Transitions to `Failed`, recording `reason`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when `Failed` is not reachable from the
    /// current status.
    pub fn fail(&mut self, reason: impl Into<String>, now: Timestamp) -> Result<(), TransitionError> {
        self.apply_transition(JobStatus::Failed, now)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }
}

/// Observable exit code a worker reports for one region's execution
/// (`spec.md` §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerExitCode {
    /// Region completed cleanly.
    Success = 0,
    /// Non-retryable failure (unexpected error, malformed rule, panic).
    NonRetryableFailure = 1,
    /// The license manager denied admission for this region's rules.
    LicenseDenial = 2,
    /// Retryable credential failure (expired token, throttled STS call).
    RetryableCredentialFailure = 126,
}

/// Per-region and aggregate counters produced by a worker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobStatistics {
    /// Resources scanned across all regions.
    pub resources_scanned: u64,
    /// Rules evaluated across all regions.
    pub rules_evaluated: u64,
    /// Findings produced (post-exception-filtering).
    pub findings_produced: u64,
    /// Regions that completed without error.
    pub regions_succeeded: u32,
    /// Regions that raised an unrecoverable error.
    pub regions_failed: u32,
    /// Total wall-clock duration of the run, in milliseconds.
    pub duration_ms: u64,
}

impl JobStatistics {
    /// Merges per-region statistics into a running aggregate.
    pub fn accumulate(&mut self, other: Self) {
        self.resources_scanned += other.resources_scanned;
        self.rules_evaluated += other.rules_evaluated;
        self.findings_produced += other.findings_produced;
        self.regions_succeeded += other.regions_succeeded;
        self.regions_failed += other.regions_failed;
        self.duration_ms = self.duration_ms.max(other.duration_ms);
    }

    /// Derives the job's terminal [`JobStatus`] from accumulated region
    /// counts: failed only if every region failed, succeeded otherwise (at
    /// least one region produced findings or completed cleanly).
    #[must_use]
    pub const fn terminal_job_status(self) -> JobStatus {
        if self.regions_succeeded == 0 && self.regions_failed > 0 {
            JobStatus::Failed
        } else {
            JobStatus::Succeeded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::JobStatistics;
    use super::JobStatus;

    #[test]
    fn legal_transition_succeeds() {
        assert_eq!(JobStatus::Submitted.transition(JobStatus::Running), Ok(JobStatus::Running));
    }

    #[test]
    fn illegal_transition_is_rejected() {
        assert!(JobStatus::Submitted.transition(JobStatus::Succeeded).is_err());
    }

    #[test]
    fn terminal_states_accept_no_further_transitions() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Succeeded.transition(JobStatus::Running).is_err());
    }

    #[test]
    fn terminal_status_succeeds_on_mixed_region_outcomes() {
        let mut stats = JobStatistics::default();
        stats.accumulate(JobStatistics { regions_succeeded: 1, ..JobStatistics::default() });
        stats.accumulate(JobStatistics { regions_failed: 1, ..JobStatistics::default() });
        assert_eq!(stats.terminal_job_status(), JobStatus::Succeeded);
    }

    #[test]
    fn terminal_status_is_failed_when_every_region_fails() {
        let mut stats = JobStatistics::default();
        stats.accumulate(JobStatistics { regions_failed: 2, ..JobStatistics::default() });
        assert_eq!(stats.terminal_job_status(), JobStatus::Failed);
    }
}
