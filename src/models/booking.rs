use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::study_session::SessionStatus;

/// A student's enrollment in an approved session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub session_id: Uuid,
    pub student_email: String,
    pub booked_at: DateTime<Utc>,
    /// Opaque reference returned by the payment gateway.
    pub payment_ref: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub session_id: Uuid,
    pub student_email: String,
    pub payment_ref: Option<String>,
}

/// Outcome of a booking insert conditioned on the session being approved.
#[derive(Debug, Clone)]
pub enum BookingInsert {
    Inserted(Booking),
    SessionMissing,
    SessionNotApproved(SessionStatus),
}
