use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The identity resolved from a verified token.
///
/// Inserted into request extensions by the auth middleware. Carries no role:
/// roles are looked up fresh by the access policy because they may have
/// changed since the token was issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caller {
    /// The email the token was issued for.
    pub email: String,
    /// The timestamp when the token expires.
    pub expires_at: DateTime<Utc>,
}
