//! Study-session state machine.
//!
//! ```text
//! create ──> pending ──approve──> approved
//!               │  ^                  │
//!          reject  reapply         reject
//!               v  │                  │
//!            rejected <───────────────┘
//! ```
//!
//! `reject` is an admin override valid from any status. `approve` accepts
//! `pending` and `rejected` origins. Every status write is conditioned on
//! the origin status inside the store, so two racing admins cannot both
//! apply a transition from the same state.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        outcome::{DeleteOutcome, UpdateOutcome},
        page::{Page, PageRequest},
        study_session::{
            NewSession, RejectionRecord, SessionChanges, SessionStatus, StatusChange,
            StudySession, TimeWindow, Transition,
        },
        user::Role,
    },
    repositories::store::SessionRepository,
};

const APPROVABLE_FROM: &[SessionStatus] = &[SessionStatus::Pending, SessionStatus::Rejected];
const REAPPLIABLE_FROM: &[SessionStatus] = &[SessionStatus::Rejected];
const TUTOR_EDITABLE: &[SessionStatus] = &[SessionStatus::Pending, SessionStatus::Rejected];
const ADMIN_EDITABLE: &[SessionStatus] = &[
    SessionStatus::Pending,
    SessionStatus::Approved,
    SessionStatus::Rejected,
];
const FEE_EDITABLE: &[SessionStatus] = &[SessionStatus::Approved];

fn validate_fee(fee: f64) -> Result<()> {
    if !fee.is_finite() || fee < 0.0 {
        return Err(AppError::Validation(
            "Registration fee must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

fn validate_window(name: &str, window: &TimeWindow) -> Result<()> {
    if !window.is_ordered() {
        return Err(AppError::Validation(format!(
            "{} must start before it ends",
            name
        )));
    }
    Ok(())
}

fn validate_duration(minutes: i32) -> Result<()> {
    if minutes <= 0 {
        return Err(AppError::Validation(
            "Duration must be a positive number of minutes".to_string(),
        ));
    }
    Ok(())
}

/// Owns session state and the rejection history.
#[derive(Clone)]
pub struct SessionLifecycle {
    sessions: Arc<dyn SessionRepository>,
}

impl SessionLifecycle {
    pub fn new(sessions: Arc<dyn SessionRepository>) -> Self {
        Self { sessions }
    }

    /// Submits a new session for approval.
    pub async fn create(&self, mut session: NewSession) -> Result<StudySession> {
        session.tutor_email = session.tutor_email.trim().to_string();
        session.title = session.title.trim().to_string();

        if session.tutor_email.is_empty() {
            return Err(AppError::Validation("Tutor email is required".to_string()));
        }
        if session.title.is_empty() {
            return Err(AppError::Validation("Title is required".to_string()));
        }
        validate_window("Registration window", &session.registration_window)?;
        validate_window("Class window", &session.class_window)?;
        validate_duration(session.duration_minutes)?;

        let created = self.sessions.insert(session, Utc::now()).await?;
        tracing::info!(session = %created.id, tutor = %created.tutor_email, "study session submitted");
        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> Result<StudySession> {
        self.sessions.find(id).await?.ok_or(AppError::NotFound("Session"))
    }

    /// Approves a session and sets its fee.
    pub async fn approve(&self, id: Uuid, registration_fee: f64) -> Result<UpdateOutcome> {
        validate_fee(registration_fee)?;

        let change = StatusChange {
            from: APPROVABLE_FROM,
            to: SessionStatus::Approved,
            registration_fee: Some(registration_fee),
            reapplied: false,
            at: Utc::now(),
        };

        match self.sessions.change_status(id, &change).await? {
            Transition::Applied(session) => {
                tracing::info!(session = %id, fee = registration_fee, tutor = %session.tutor_email, "study session approved");
                Ok(UpdateOutcome::modified())
            }
            Transition::Skipped(session) => Err(AppError::Conflict(format!(
                "Session is {} and cannot be approved",
                session.status
            ))),
            Transition::Missing => Err(AppError::NotFound("Session")),
        }
    }

    /// Rejects a session from any status and records why.
    pub async fn reject(
        &self,
        id: Uuid,
        reason: &str,
        feedback: Option<String>,
    ) -> Result<RejectionRecord> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::Validation("Rejection reason is required".to_string()));
        }
        let feedback = feedback
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());

        let (session, record) = self
            .sessions
            .reject(id, reason.to_string(), feedback, Utc::now())
            .await?
            .ok_or(AppError::NotFound("Session"))?;

        tracing::info!(session = %id, tutor = %session.tutor_email, reason, "study session rejected");
        Ok(record)
    }

    /// Puts a rejected session back in the approval queue.
    ///
    /// On any other status this is a no-op reported as matched but unmodified.
    pub async fn reapply(&self, id: Uuid) -> Result<UpdateOutcome> {
        let change = StatusChange {
            from: REAPPLIABLE_FROM,
            to: SessionStatus::Pending,
            registration_fee: None,
            reapplied: true,
            at: Utc::now(),
        };

        match self.sessions.change_status(id, &change).await? {
            Transition::Applied(_) => {
                tracing::info!(session = %id, "study session reapplied");
                Ok(UpdateOutcome::modified())
            }
            Transition::Skipped(session) => {
                tracing::debug!(session = %id, status = %session.status, "reapply ignored");
                Ok(UpdateOutcome::unchanged())
            }
            Transition::Missing => Err(AppError::NotFound("Session")),
        }
    }

    /// Edits scheduling and metadata.
    ///
    /// Tutors may edit while the session is pending or rejected and never
    /// touch the fee. Admins may edit in any status; the fee only while
    /// approved.
    pub async fn update(
        &self,
        id: Uuid,
        mut changes: SessionChanges,
        editor: Role,
    ) -> Result<UpdateOutcome> {
        if changes.is_empty() {
            return Err(AppError::Validation("No fields to update".to_string()));
        }
        if let Some(title) = changes.title.as_mut() {
            *title = title.trim().to_string();
            if title.is_empty() {
                return Err(AppError::Validation("Title cannot be empty".to_string()));
            }
        }
        if let Some(window) = &changes.registration_window {
            validate_window("Registration window", window)?;
        }
        if let Some(window) = &changes.class_window {
            validate_window("Class window", window)?;
        }
        if let Some(minutes) = changes.duration_minutes {
            validate_duration(minutes)?;
        }

        let from = match (editor, changes.registration_fee) {
            (Role::Admin, Some(fee)) => {
                validate_fee(fee)?;
                FEE_EDITABLE
            }
            (Role::Admin, None) => ADMIN_EDITABLE,
            (_, Some(_)) => {
                return Err(AppError::Forbidden(
                    "Only an admin can set the registration fee".to_string(),
                ));
            }
            (_, None) => TUTOR_EDITABLE,
        };

        match self.sessions.update(id, &changes, from, Utc::now()).await? {
            Transition::Applied(_) => {
                tracing::info!(session = %id, editor = %editor, "study session updated");
                Ok(UpdateOutcome::modified())
            }
            Transition::Skipped(session) if changes.registration_fee.is_some() => {
                Err(AppError::Conflict(format!(
                    "Fee cannot be set while the session is {}",
                    session.status
                )))
            }
            Transition::Skipped(session) => Err(AppError::Conflict(format!(
                "Session is {} and can no longer be edited by its tutor",
                session.status
            ))),
            Transition::Missing => Err(AppError::NotFound("Session")),
        }
    }

    /// Hard-deletes a session in any status, along with its bookings.
    pub async fn delete(&self, id: Uuid) -> Result<DeleteOutcome> {
        let deleted = self
            .sessions
            .delete(id)
            .await?
            .ok_or(AppError::NotFound("Session"))?;

        if deleted.bookings_removed > 0 {
            tracing::warn!(
                session = %id,
                bookings = deleted.bookings_removed,
                "study session deleted together with its bookings"
            );
        } else {
            tracing::info!(session = %id, "study session deleted");
        }

        Ok(DeleteOutcome {
            acknowledged: true,
            deleted_count: 1,
            bookings_removed: deleted.bookings_removed,
        })
    }

    pub async fn list_approved(&self, page: PageRequest) -> Result<Page<StudySession>> {
        self.sessions.list_by_status(SessionStatus::Approved, page).await
    }

    pub async fn list_by_status(
        &self,
        status: SessionStatus,
        page: PageRequest,
    ) -> Result<Page<StudySession>> {
        self.sessions.list_by_status(status, page).await
    }

    pub async fn list_by_tutor(&self, email: &str) -> Result<Vec<StudySession>> {
        self.sessions.list_by_tutor(email).await
    }

    pub async fn rejections(&self, session_id: Uuid) -> Result<Vec<RejectionRecord>> {
        self.sessions.rejections(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::store::Store;
    use chrono::Duration;

    fn draft(title: &str, tutor: &str) -> NewSession {
        let now = Utc::now();
        NewSession {
            tutor_email: tutor.to_string(),
            tutor_name: Some("Tutor".to_string()),
            title: title.to_string(),
            description: None,
            registration_window: TimeWindow {
                start: now,
                end: now + Duration::days(7),
            },
            class_window: TimeWindow {
                start: now + Duration::days(8),
                end: now + Duration::days(30),
            },
            duration_minutes: 90,
        }
    }

    fn lifecycle() -> SessionLifecycle {
        SessionLifecycle::new(Store::memory().sessions)
    }

    #[tokio::test]
    async fn duplicate_live_title_conflicts() {
        let lifecycle = lifecycle();
        lifecycle.create(draft("Algebra 101", "t@x.com")).await.unwrap();

        assert!(matches!(
            lifecycle.create(draft("Algebra 101", "t@x.com")).await,
            Err(AppError::Conflict(_))
        ));
        lifecycle.create(draft("Algebra 101", "other@x.com")).await.unwrap();
    }

    #[tokio::test]
    async fn create_requires_title_and_ordered_windows() {
        let lifecycle = lifecycle();
        assert!(matches!(
            lifecycle.create(draft("   ", "t@x.com")).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            lifecycle.create(draft("Chem", "")).await,
            Err(AppError::Validation(_))
        ));

        let mut backwards = draft("Chem", "t@x.com");
        backwards.class_window = TimeWindow {
            start: backwards.class_window.end,
            end: backwards.class_window.start,
        };
        assert!(matches!(
            lifecycle.create(backwards).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn approval_stores_fee() {
        let lifecycle = lifecycle();
        let session = lifecycle.create(draft("Algebra 101", "t@x.com")).await.unwrap();
        assert_eq!(session.registration_fee, None);

        lifecycle.approve(session.id, 25.0).await.unwrap();
        let approved = lifecycle.get(session.id).await.unwrap();
        assert_eq!(approved.status, SessionStatus::Approved);
        assert_eq!(approved.registration_fee, Some(25.0));

        assert!(matches!(
            lifecycle.approve(session.id, 30.0).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn approval_rejects_bad_fees() {
        let lifecycle = lifecycle();
        let session = lifecycle.create(draft("Algebra 101", "t@x.com")).await.unwrap();
        for fee in [-1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                lifecycle.approve(session.id, fee).await,
                Err(AppError::Validation(_))
            ));
        }
        assert!(matches!(
            lifecycle.approve(Uuid::new_v4(), 10.0).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn reject_then_reapply_keeps_history() {
        let lifecycle = lifecycle();
        let session = lifecycle.create(draft("Algebra 101", "t@x.com")).await.unwrap();

        let record = lifecycle
            .reject(session.id, "incomplete syllabus", Some("add week 3".to_string()))
            .await
            .unwrap();
        assert_eq!(lifecycle.get(session.id).await.unwrap().status, SessionStatus::Rejected);

        let outcome = lifecycle.reapply(session.id).await.unwrap();
        assert_eq!(outcome.modified_count, 1);
        let reapplied = lifecycle.get(session.id).await.unwrap();
        assert_eq!(reapplied.status, SessionStatus::Pending);
        assert!(reapplied.reapplied_at.is_some());

        let history = lifecycle.rejections(session.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, record.id);
        assert_eq!(history[0].reason, "incomplete syllabus");
    }

    #[tokio::test]
    async fn each_rejection_adds_one_record() {
        let lifecycle = lifecycle();
        let session = lifecycle.create(draft("Algebra 101", "t@x.com")).await.unwrap();
        lifecycle.approve(session.id, 10.0).await.unwrap();

        lifecycle.reject(session.id, "first", None).await.unwrap();
        lifecycle.reapply(session.id).await.unwrap();
        lifecycle.reject(session.id, "second", None).await.unwrap();

        let reasons: Vec<String> = lifecycle
            .rejections(session.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.reason)
            .collect();
        assert_eq!(reasons, vec!["first".to_string(), "second".to_string()]);
        assert!(matches!(
            lifecycle.reject(session.id, "  ", None).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn reapply_outside_rejected_is_a_noop() {
        let lifecycle = lifecycle();
        let session = lifecycle.create(draft("Algebra 101", "t@x.com")).await.unwrap();

        let outcome = lifecycle.reapply(session.id).await.unwrap();
        assert_eq!(outcome.matched_count, 1);
        assert_eq!(outcome.modified_count, 0);

        lifecycle.approve(session.id, 5.0).await.unwrap();
        lifecycle.reapply(session.id).await.unwrap();
        assert_eq!(lifecycle.get(session.id).await.unwrap().status, SessionStatus::Approved);
    }

    #[tokio::test]
    async fn reapply_conflicts_with_a_newer_live_title() {
        let lifecycle = lifecycle();
        let old = lifecycle.create(draft("Algebra 101", "t@x.com")).await.unwrap();
        lifecycle.reject(old.id, "duplicate", None).await.unwrap();
        lifecycle.create(draft("Algebra 101", "t@x.com")).await.unwrap();

        assert!(matches!(
            lifecycle.reapply(old.id).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn tutors_cannot_edit_approved_sessions_or_fees() {
        let lifecycle = lifecycle();
        let session = lifecycle.create(draft("Algebra 101", "t@x.com")).await.unwrap();

        let rename = SessionChanges {
            title: Some("Algebra 102".to_string()),
            ..Default::default()
        };
        lifecycle.update(session.id, rename.clone(), Role::Tutor).await.unwrap();
        assert_eq!(lifecycle.get(session.id).await.unwrap().title, "Algebra 102");

        let fee = SessionChanges {
            registration_fee: Some(10.0),
            ..Default::default()
        };
        assert!(matches!(
            lifecycle.update(session.id, fee.clone(), Role::Tutor).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            lifecycle.update(session.id, fee.clone(), Role::Admin).await,
            Err(AppError::Conflict(_))
        ));

        lifecycle.approve(session.id, 20.0).await.unwrap();
        assert!(matches!(
            lifecycle.update(session.id, rename.clone(), Role::Tutor).await,
            Err(AppError::Conflict(_))
        ));
        lifecycle.update(session.id, fee, Role::Admin).await.unwrap();
        assert_eq!(
            lifecycle.get(session.id).await.unwrap().registration_fee,
            Some(10.0)
        );
    }

    #[tokio::test]
    async fn list_approved_is_newest_first_with_total() {
        let lifecycle = lifecycle();
        let mut ids = Vec::new();
        for i in 0..3 {
            let session = lifecycle
                .create(draft(&format!("Course {}", i), "t@x.com"))
                .await
                .unwrap();
            lifecycle.approve(session.id, 0.0).await.unwrap();
            ids.push(session.id);
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        lifecycle.create(draft("Unapproved", "t@x.com")).await.unwrap();

        let page = lifecycle
            .list_approved(PageRequest::new(Some(1), Some(2)))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, ids[2]);
        assert_eq!(page.items[1].id, ids[1]);
    }

    #[tokio::test]
    async fn delete_is_unconditional() {
        let lifecycle = lifecycle();
        let session = lifecycle.create(draft("Algebra 101", "t@x.com")).await.unwrap();
        lifecycle.approve(session.id, 0.0).await.unwrap();

        let outcome = lifecycle.delete(session.id).await.unwrap();
        assert_eq!(outcome.deleted_count, 1);
        assert!(matches!(lifecycle.get(session.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(lifecycle.delete(session.id).await, Err(AppError::NotFound(_))));
    }
}
