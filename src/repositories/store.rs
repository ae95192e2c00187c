//! Datastore ports consumed by the services.
//!
//! Each trait is implemented by the PostgreSQL adapter (`PgStore`) and the
//! in-memory adapter (`MemoryStore`). Uniqueness rules are the adapter's
//! job: a write that would break one returns `AppError::Conflict` instead of
//! relying on a prior read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        application::{ApplicantDetails, Application, ApplicationStatus},
        booking::{Booking, BookingInsert, NewBooking},
        page::{Page, PageRequest},
        study_session::{
            DeletedSession, NewSession, RejectionRecord, SessionChanges, SessionStatus,
            StatusChange, StudySession, Transition,
        },
        user::{NewUser, Role, RoleWrite, User},
    },
};

use super::{memory::MemoryStore, postgres::PgStore};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Inserts a student, or returns `None` when the email is already known.
    async fn insert_if_absent(&self, user: NewUser) -> Result<Option<User>>;

    async fn upsert_role(&self, email: &str, role: Role) -> Result<RoleWrite>;

    /// Returns whether a user matched.
    async fn touch_last_login(&self, email: &str) -> Result<bool>;
}

#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    /// Fails with `Conflict` while the email has an active application.
    async fn insert_pending(
        &self,
        email: &str,
        details: ApplicantDetails,
        at: DateTime<Utc>,
    ) -> Result<Application>;

    async fn find(&self, id: Uuid) -> Result<Option<Application>>;

    async fn find_active(&self, email: &str) -> Result<Option<Application>>;

    async fn latest_for(&self, email: &str) -> Result<Option<Application>>;

    async fn list_by_status(&self, status: ApplicationStatus) -> Result<Vec<Application>>;

    /// Writes the status and, when `role` is set, the applicant's role in one
    /// unit. A promotion to tutor leaves an admin as admin. Returns the
    /// previous status with the updated record.
    async fn set_status(
        &self,
        id: Uuid,
        status: ApplicationStatus,
        role: Option<Role>,
        at: DateTime<Utc>,
    ) -> Result<Option<(ApplicationStatus, Application)>>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Fails with `Conflict` if a non-rejected session shares title and tutor.
    async fn insert(&self, session: NewSession, at: DateTime<Utc>) -> Result<StudySession>;

    async fn find(&self, id: Uuid) -> Result<Option<StudySession>>;

    async fn change_status(&self, id: Uuid, change: &StatusChange) -> Result<Transition>;

    /// Records the rejection and flips the status together, from any status.
    async fn reject(
        &self,
        id: Uuid,
        reason: String,
        feedback: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<(StudySession, RejectionRecord)>>;

    async fn update(
        &self,
        id: Uuid,
        changes: &SessionChanges,
        from: &[SessionStatus],
        at: DateTime<Utc>,
    ) -> Result<Transition>;

    /// Removes the session and its bookings.
    async fn delete(&self, id: Uuid) -> Result<Option<DeletedSession>>;

    /// Newest first.
    async fn list_by_status(
        &self,
        status: SessionStatus,
        page: PageRequest,
    ) -> Result<Page<StudySession>>;

    async fn list_by_tutor(&self, email: &str) -> Result<Vec<StudySession>>;

    /// Oldest first.
    async fn rejections(&self, session_id: Uuid) -> Result<Vec<RejectionRecord>>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Inserts only while the session is approved, in the same atomic write.
    /// A duplicate `(session, student)` pair fails with `Conflict`.
    async fn insert_if_approved(&self, booking: NewBooking) -> Result<BookingInsert>;

    async fn exists(&self, session_id: Uuid, student_email: &str) -> Result<bool>;

    /// Most recent first.
    async fn list_by_student(&self, email: &str, page: PageRequest) -> Result<Page<Booking>>;
}

/// The repositories handed to the services at construction.
#[derive(Clone)]
pub struct Store {
    pub users: Arc<dyn UserRepository>,
    pub applications: Arc<dyn ApplicationRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub bookings: Arc<dyn BookingRepository>,
}

impl Store {
    pub fn postgres(pool: Pool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            users: store.clone(),
            applications: store.clone(),
            sessions: store.clone(),
            bookings: store,
        }
    }

    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self {
            users: store.clone(),
            applications: store.clone(),
            sessions: store.clone(),
            bookings: store,
        }
    }
}
