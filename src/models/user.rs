use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Authorization level of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "lowercase")]
#[postgres(name = "user_role", rename_all = "lowercase")]
pub enum Role {
    Student,
    Tutor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Tutor => "tutor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a user in the system.
///
/// `role` is a projection of the application and admin events that touched
/// this email; it is never taken from a registration payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// The user's email address, unique.
    pub email: String,
    /// The user's display name.
    pub name: Option<String>,
    /// The user's avatar URL.
    pub photo_url: Option<String>,
    /// The user's current role.
    pub role: Role,
    /// The timestamp when the user was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp of the user's last login.
    pub last_login: Option<DateTime<Utc>>,
}

/// Fields supplied when a user first signs in.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub photo_url: Option<String>,
}

/// What an upsert of a user's role did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleWrite {
    /// No user existed; one was created with the role.
    Inserted,
    /// The stored role differed and was replaced.
    Changed,
    /// The user already held the role.
    Unchanged,
}
