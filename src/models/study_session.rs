use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Approval state of a study session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "lowercase")]
#[postgres(name = "session_status", rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Approved => "approved",
            SessionStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "approved" => Ok(SessionStatus::Approved),
            "rejected" => Ok(SessionStatus::Rejected),
            other => Err(format!("Unknown session status: {}", other)),
        }
    }
}

/// A closed time interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }
}

/// A paid tutoring offering, subject to admin approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub id: Uuid,
    pub tutor_email: String,
    pub tutor_name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub registration_window: TimeWindow,
    pub class_window: TimeWindow,
    pub duration_minutes: i32,
    /// Set by an admin on approval; absent before.
    pub registration_fee: Option<f64>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reapplied_at: Option<DateTime<Utc>>,
}

/// Fields a tutor supplies when submitting a session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub tutor_email: String,
    pub tutor_name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub registration_window: TimeWindow,
    pub class_window: TimeWindow,
    pub duration_minutes: i32,
}

/// A partial update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct SessionChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub registration_window: Option<TimeWindow>,
    pub class_window: Option<TimeWindow>,
    pub duration_minutes: Option<i32>,
    pub registration_fee: Option<f64>,
}

impl SessionChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.registration_window.is_none()
            && self.class_window.is_none()
            && self.duration_minutes.is_none()
            && self.registration_fee.is_none()
    }

    /// Applies the changes in place.
    pub fn apply_to(&self, session: &mut StudySession) {
        if let Some(title) = &self.title {
            session.title = title.clone();
        }
        if let Some(description) = &self.description {
            session.description = Some(description.clone());
        }
        if let Some(window) = self.registration_window {
            session.registration_window = window;
        }
        if let Some(window) = self.class_window {
            session.class_window = window;
        }
        if let Some(duration) = self.duration_minutes {
            session.duration_minutes = duration;
        }
        if let Some(fee) = self.registration_fee {
            session.registration_fee = Some(fee);
        }
    }
}

/// A status write guarded by the statuses it may start from.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub from: &'static [SessionStatus],
    pub to: SessionStatus,
    pub registration_fee: Option<f64>,
    pub reapplied: bool,
    pub at: DateTime<Utc>,
}

/// Result of a guarded write against one session.
#[derive(Debug, Clone)]
pub enum Transition {
    /// No session with that id.
    Missing,
    /// The session exists but its status was not an allowed origin.
    Skipped(StudySession),
    /// The write happened.
    Applied(StudySession),
}

/// An immutable note explaining one rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub reason: String,
    pub feedback: Option<String>,
    pub rejected_at: DateTime<Utc>,
}

/// What a hard delete removed.
#[derive(Debug, Clone, Copy)]
pub struct DeletedSession {
    pub bookings_removed: u64,
}
