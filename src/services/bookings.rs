use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        booking::{Booking, BookingInsert, NewBooking},
        page::{Page, PageRequest},
    },
    repositories::store::{BookingRepository, SessionRepository},
};

/// Records student enrollments in approved sessions.
#[derive(Clone)]
pub struct BookingLedger {
    bookings: Arc<dyn BookingRepository>,
    sessions: Arc<dyn SessionRepository>,
}

impl BookingLedger {
    pub fn new(bookings: Arc<dyn BookingRepository>, sessions: Arc<dyn SessionRepository>) -> Self {
        Self { bookings, sessions }
    }

    /// Books `session_id` for `student_email`.
    ///
    /// The approved-status check and the uniqueness check happen inside the
    /// insert itself; the read of the session beforehand only decides whether
    /// a payment reference is required.
    pub async fn book(
        &self,
        session_id: Uuid,
        student_email: &str,
        payment_ref: Option<String>,
    ) -> Result<Booking> {
        let payment_ref = payment_ref
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let session = self
            .sessions
            .find(session_id)
            .await?
            .ok_or(AppError::NotFound("Session"))?;

        if session.registration_fee.unwrap_or(0.0) > 0.0 && payment_ref.is_none() {
            return Err(AppError::Validation(
                "A payment reference is required for paid sessions".to_string(),
            ));
        }

        let insert = self
            .bookings
            .insert_if_approved(NewBooking {
                session_id,
                student_email: student_email.to_string(),
                payment_ref,
            })
            .await?;

        match insert {
            BookingInsert::Inserted(booking) => {
                tracing::info!(booking = %booking.id, session = %session_id, student = student_email, "session booked");
                Ok(booking)
            }
            BookingInsert::SessionMissing => Err(AppError::NotFound("Session")),
            BookingInsert::SessionNotApproved(status) => Err(AppError::Conflict(format!(
                "Session is {} and cannot be booked",
                status
            ))),
        }
    }

    pub async fn check_existing(&self, session_id: Uuid, student_email: &str) -> Result<bool> {
        self.bookings.exists(session_id, student_email).await
    }

    pub async fn list_by_student(&self, email: &str, page: PageRequest) -> Result<Page<Booking>> {
        self.bookings.list_by_student(email, page).await
    }
}
