// src/qcm/status.rs

//! Session lifecycle as seen by one candidate.
//!
//! The status is recomputed from the opening window, the current time and the
//! candidate's attempt on every read. Only the attempt's own terminal status
//! is ever persisted; "locked" and "available" around a missing attempt are
//! never stored.

use chrono::{DateTime, Utc};

use crate::models::{
    attempt::{Attempt, AttemptStatus, SessionStatus},
    session_definition::Window,
};

/// The part of an attempt the resolver looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptState {
    pub status: AttemptStatus,
    pub deadline: DateTime<Utc>,
}

impl From<&Attempt> for AttemptState {
    fn from(a: &Attempt) -> Self {
        Self {
            status: a.status,
            deadline: a.deadline(),
        }
    }
}

pub fn resolve(now: DateTime<Utc>, window: Window, attempt: Option<AttemptState>) -> SessionStatus {
    match attempt {
        None if now < window.start_at => SessionStatus::Locked,
        None if now <= window.end_at => SessionStatus::Available,
        // Window missed: no attempt will ever be created.
        None => SessionStatus::Locked,
        Some(a) => match a.status {
            AttemptStatus::Completed => SessionStatus::Completed,
            AttemptStatus::Expired => SessionStatus::Expired,
            // The personal deadline may run past the window end.
            AttemptStatus::InProgress if now > a.deadline => SessionStatus::Expired,
            AttemptStatus::InProgress => SessionStatus::Available,
        },
    }
}

/// True when a read at `now` must run the expiry path on `attempt`.
pub fn needs_expiry(now: DateTime<Utc>, attempt: &Attempt) -> bool {
    attempt.status == AttemptStatus::InProgress && now > attempt.deadline()
}
