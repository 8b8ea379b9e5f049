//! Job Domain Entity
//!
//! The scheduler envelope around one [`PrintRequest`]. The entity owns its
//! state machine: `Queued -> Processing -> {Completed | Failed}`, with a
//! `Processing -> Queued` edge used by the retry path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PrintError, Result};
use crate::label::PrintRequest;

/// Unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn can_transition_to(&self, next: &JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Processing)
                // Admission can fail a queued job (retry re-admission into a
                // full queue) without it ever starting.
                | (JobState::Queued, JobState::Failed)
                | (JobState::Processing, JobState::Completed)
                | (JobState::Processing, JobState::Failed)
                | (JobState::Processing, JobState::Queued)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A print job and its lifecycle bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: JobId,
    pub state: JobState,
    pub request: PrintRequest,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PrintJob {
    pub fn new(request: PrintRequest) -> Self {
        Self {
            id: JobId::new(),
            state: JobState::Queued,
            request,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            last_error: None,
        }
    }

    fn transition(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_transition_to(&next) {
            return Err(PrintError::invalid_state_transition(
                self.state.as_str(),
                next.as_str(),
            ));
        }
        self.state = next;
        Ok(())
    }

    /// Move to `Processing` and stamp the start time.
    pub fn start(&mut self) -> Result<()> {
        self.transition(JobState::Processing)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Terminal success.
    pub fn complete(&mut self) -> Result<()> {
        self.transition(JobState::Completed)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Terminal failure; records the error string returned by `GET /status`.
    pub fn fail(&mut self, error: &PrintError) -> Result<()> {
        self.transition(JobState::Failed)?;
        self.finished_at = Some(Utc::now());
        self.last_error = Some(error.to_string());
        Ok(())
    }

    /// Re-enter the queue for a retry. The request body is preserved
    /// bit-for-bit; only the retry counter moves.
    pub fn requeue(&mut self, error: &PrintError) -> Result<()> {
        self.transition(JobState::Queued)?;
        self.request.retry_count += 1;
        self.last_error = Some(error.to_string());
        Ok(())
    }

    /// Milliseconds between start and finish, if both are stamped.
    pub fn processing_ms(&self) -> Option<u64> {
        match (self.started_at, self.finished_at) {
            (Some(s), Some(f)) => Some((f - s).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::{Margins, PrintLabel, PrintMedia, Priority};

    fn job() -> PrintJob {
        let label = PrintLabel {
            printer_name: "ZD420".into(),
            html: "<p>x</p>".into(),
            width: "2in".into(),
            height: "1in".into(),
            margins: Margins::zero(),
            orientation: None,
            copies: 1,
            user_id: None,
            name: None,
            media: PrintMedia::Label,
            group: None,
        };
        PrintJob::new(PrintRequest::new(label, Priority::Medium))
    }

    #[test]
    fn happy_path_transitions() {
        let mut j = job();
        assert_eq!(j.state, JobState::Queued);
        j.start().unwrap();
        assert_eq!(j.state, JobState::Processing);
        assert!(j.started_at.is_some());
        j.complete().unwrap();
        assert_eq!(j.state, JobState::Completed);
        assert!(j.finished_at.is_some());
    }

    #[test]
    fn failure_records_error_string() {
        let mut j = job();
        j.start().unwrap();
        j.fail(&PrintError::SpoolFailed("exit 2".into())).unwrap();
        assert_eq!(j.state, JobState::Failed);
        assert_eq!(j.last_error.as_deref(), Some("spool failed: exit 2"));
    }

    #[test]
    fn requeue_increments_retry_and_keeps_body() {
        let mut j = job();
        let body = j.request.label.clone();
        j.start().unwrap();
        j.requeue(&PrintError::RenderFailed("tab crashed".into()))
            .unwrap();
        assert_eq!(j.state, JobState::Queued);
        assert_eq!(j.request.retry_count, 1);
        assert_eq!(j.request.label, body);
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut j = job();
        j.start().unwrap();
        j.complete().unwrap();
        assert!(matches!(
            j.start(),
            Err(PrintError::InvalidStateTransition { .. })
        ));
        assert!(j.fail(&PrintError::Cancelled).is_err());
    }

    #[test]
    fn queued_jobs_cannot_complete_directly() {
        let mut j = job();
        assert!(j.complete().is_err());
    }
}
