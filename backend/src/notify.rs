// src/notify.rs

//! Best-effort candidate notifications.
//!
//! Delivery is fire-and-forget: the runner logs a failed notification and
//! carries on.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::attempt::AttemptStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum CandidateEvent {
    AttemptStarted {
        attempt_id: Uuid,
        session_title: String,
    },
    AttemptClosed {
        attempt_id: Uuid,
        session_title: String,
        status: AttemptStatus,
        score_percent: f64,
        passed: bool,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, candidate_id: i64, event: &CandidateEvent) -> Result<(), NotifyError>;
}

/// Writes notifications to the log. Default when no delivery channel is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, candidate_id: i64, event: &CandidateEvent) -> Result<(), NotifyError> {
        match event {
            CandidateEvent::AttemptStarted {
                attempt_id,
                session_title,
            } => {
                tracing::info!(
                    target: "notifications",
                    candidate_id,
                    %attempt_id,
                    "Candidate started '{}'",
                    session_title
                );
            }
            CandidateEvent::AttemptClosed {
                attempt_id,
                session_title,
                status,
                score_percent,
                passed,
            } => {
                tracing::info!(
                    target: "notifications",
                    candidate_id,
                    %attempt_id,
                    %status,
                    "Result for '{}': {}% (passed: {})",
                    session_title,
                    score_percent,
                    passed
                );
            }
        }
        Ok(())
    }
}
