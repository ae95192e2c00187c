use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Approval status of a tutor application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "lowercase")]
#[postgres(name = "application_status", rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
    Deactivated,
}

impl ApplicationStatus {
    /// Statuses that block a new application for the same email.
    pub const ACTIVE: [ApplicationStatus; 2] =
        [ApplicationStatus::Pending, ApplicationStatus::Approved];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Deactivated => "deactivated",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApplicationStatus::Pending),
            "approved" => Ok(ApplicationStatus::Approved),
            "rejected" => Ok(ApplicationStatus::Rejected),
            "deactivated" => Ok(ApplicationStatus::Deactivated),
            other => Err(format!("Unknown application status: {}", other)),
        }
    }
}

/// What the applicant tells the admins about themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantDetails {
    pub name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub experience: Option<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
}

/// A tutor candidacy. Never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: Uuid,
    pub applicant_email: String,
    pub details: ApplicantDetails,
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
