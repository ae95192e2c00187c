use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
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

use super::store::{ApplicationRepository, BookingRepository, SessionRepository, UserRepository};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    applications: HashMap<Uuid, Application>,
    sessions: HashMap<Uuid, StudySession>,
    rejections: Vec<RejectionRecord>,
    bookings: Vec<Booking>,
}

impl Tables {
    fn active_application_exists(&self, email: &str, except: Option<Uuid>) -> bool {
        self.applications.values().any(|a| {
            a.applicant_email == email && a.status.is_active() && Some(a.id) != except
        })
    }

    fn live_title_taken(&self, title: &str, tutor_email: &str, except: Option<Uuid>) -> bool {
        self.sessions.values().any(|s| {
            s.title == title
                && s.tutor_email == tutor_email
                && s.status != SessionStatus::Rejected
                && Some(s.id) != except
        })
    }

    fn set_role(&mut self, email: &str, role: Role) -> RoleWrite {
        match self.users.get_mut(email) {
            Some(user) if user.role == role => RoleWrite::Unchanged,
            Some(user) => {
                user.role = role;
                RoleWrite::Changed
            }
            None => {
                self.users.insert(
                    email.to_string(),
                    User {
                        email: email.to_string(),
                        name: None,
                        photo_url: None,
                        role,
                        created_at: Utc::now(),
                        last_login: None,
                    },
                );
                RoleWrite::Inserted
            }
        }
    }

    /// Rejects a write that would leave two live sessions with one title.
    fn ensure_title_free(&self, candidate: &StudySession) -> Result<()> {
        if candidate.status != SessionStatus::Rejected
            && self.live_title_taken(&candidate.title, &candidate.tutor_email, Some(candidate.id))
        {
            return Err(AppError::Conflict(
                "A session with this title already exists for this tutor".to_string(),
            ));
        }
        Ok(())
    }
}

fn paginate<T: Clone>(items: &[T], page: PageRequest) -> Page<T> {
    let slice = items
        .iter()
        .skip(page.offset())
        .take(page.limit as usize)
        .cloned()
        .collect();
    Page::new(slice, items.len() as u64, page)
}

/// In-process adapter for every repository port.
///
/// All tables sit behind one mutex, so each trait call is a single critical
/// section and the uniqueness checks below cannot interleave with writes.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.tables.lock().await.users.get(email).cloned())
    }

    async fn insert_if_absent(&self, user: NewUser) -> Result<Option<User>> {
        let mut tables = self.tables.lock().await;
        if tables.users.contains_key(&user.email) {
            return Ok(None);
        }

        let now = Utc::now();
        let record = User {
            email: user.email.clone(),
            name: user.name,
            photo_url: user.photo_url,
            role: Role::Student,
            created_at: now,
            last_login: Some(now),
        };
        tables.users.insert(user.email, record.clone());
        Ok(Some(record))
    }

    async fn upsert_role(&self, email: &str, role: Role) -> Result<RoleWrite> {
        Ok(self.tables.lock().await.set_role(email, role))
    }

    async fn touch_last_login(&self, email: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        Ok(match tables.users.get_mut(email) {
            Some(user) => {
                user.last_login = Some(Utc::now());
                true
            }
            None => false,
        })
    }
}

#[async_trait]
impl ApplicationRepository for MemoryStore {
    async fn insert_pending(
        &self,
        email: &str,
        details: ApplicantDetails,
        at: DateTime<Utc>,
    ) -> Result<Application> {
        let mut tables = self.tables.lock().await;
        if tables.active_application_exists(email, None) {
            return Err(AppError::Conflict(
                "An active tutor application already exists for this email".to_string(),
            ));
        }

        let application = Application {
            id: Uuid::new_v4(),
            applicant_email: email.to_string(),
            details,
            status: ApplicationStatus::Pending,
            applied_at: at,
            updated_at: at,
        };
        tables.applications.insert(application.id, application.clone());
        Ok(application)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Application>> {
        Ok(self.tables.lock().await.applications.get(&id).cloned())
    }

    async fn find_active(&self, email: &str) -> Result<Option<Application>> {
        Ok(self
            .tables
            .lock()
            .await
            .applications
            .values()
            .find(|a| a.applicant_email == email && a.status.is_active())
            .cloned())
    }

    async fn latest_for(&self, email: &str) -> Result<Option<Application>> {
        Ok(self
            .tables
            .lock()
            .await
            .applications
            .values()
            .filter(|a| a.applicant_email == email)
            .max_by_key(|a| a.applied_at)
            .cloned())
    }

    async fn list_by_status(&self, status: ApplicationStatus) -> Result<Vec<Application>> {
        let tables = self.tables.lock().await;
        let mut matching: Vec<Application> = tables
            .applications
            .values()
            .filter(|a| a.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.applied_at.cmp(&a.applied_at).then(a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: ApplicationStatus,
        role: Option<Role>,
        at: DateTime<Utc>,
    ) -> Result<Option<(ApplicationStatus, Application)>> {
        let mut tables = self.tables.lock().await;
        let Some(current) = tables.applications.get(&id) else {
            return Ok(None);
        };
        let previous = current.status;
        let email = current.applicant_email.clone();

        if status.is_active() && tables.active_application_exists(&email, Some(id)) {
            return Err(AppError::Conflict(
                "An active tutor application already exists for this email".to_string(),
            ));
        }

        let Some(application) = tables.applications.get_mut(&id) else {
            return Ok(None);
        };
        application.status = status;
        application.updated_at = at;
        let updated = application.clone();

        if let Some(role) = role {
            let admin = tables.users.get(&email).is_some_and(|u| u.role == Role::Admin);
            if !(admin && role == Role::Tutor) {
                tables.set_role(&email, role);
            }
        }

        Ok(Some((previous, updated)))
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn insert(&self, session: NewSession, at: DateTime<Utc>) -> Result<StudySession> {
        let mut tables = self.tables.lock().await;
        let record = StudySession {
            id: Uuid::new_v4(),
            tutor_email: session.tutor_email,
            tutor_name: session.tutor_name,
            title: session.title,
            description: session.description,
            registration_window: session.registration_window,
            class_window: session.class_window,
            duration_minutes: session.duration_minutes,
            registration_fee: None,
            status: SessionStatus::Pending,
            created_at: at,
            updated_at: at,
            reapplied_at: None,
        };
        tables.ensure_title_free(&record)?;
        tables.sessions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find(&self, id: Uuid) -> Result<Option<StudySession>> {
        Ok(self.tables.lock().await.sessions.get(&id).cloned())
    }

    async fn change_status(&self, id: Uuid, change: &StatusChange) -> Result<Transition> {
        let mut tables = self.tables.lock().await;
        let Some(current) = tables.sessions.get(&id) else {
            return Ok(Transition::Missing);
        };
        if !change.from.contains(&current.status) {
            return Ok(Transition::Skipped(current.clone()));
        }

        let mut next = current.clone();
        next.status = change.to;
        if let Some(fee) = change.registration_fee {
            next.registration_fee = Some(fee);
        }
        if change.reapplied {
            next.reapplied_at = Some(change.at);
        }
        next.updated_at = change.at;

        tables.ensure_title_free(&next)?;
        tables.sessions.insert(id, next.clone());
        Ok(Transition::Applied(next))
    }

    async fn reject(
        &self,
        id: Uuid,
        reason: String,
        feedback: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<(StudySession, RejectionRecord)>> {
        let mut tables = self.tables.lock().await;
        let Some(session) = tables.sessions.get_mut(&id) else {
            return Ok(None);
        };
        session.status = SessionStatus::Rejected;
        session.updated_at = at;
        let session = session.clone();

        let record = RejectionRecord {
            id: Uuid::new_v4(),
            session_id: id,
            reason,
            feedback,
            rejected_at: at,
        };
        tables.rejections.push(record.clone());
        Ok(Some((session, record)))
    }

    async fn update(
        &self,
        id: Uuid,
        changes: &SessionChanges,
        from: &[SessionStatus],
        at: DateTime<Utc>,
    ) -> Result<Transition> {
        let mut tables = self.tables.lock().await;
        let Some(current) = tables.sessions.get(&id) else {
            return Ok(Transition::Missing);
        };
        if !from.contains(&current.status) {
            return Ok(Transition::Skipped(current.clone()));
        }

        let mut next = current.clone();
        changes.apply_to(&mut next);
        next.updated_at = at;

        tables.ensure_title_free(&next)?;
        tables.sessions.insert(id, next.clone());
        Ok(Transition::Applied(next))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<DeletedSession>> {
        let mut tables = self.tables.lock().await;
        if tables.sessions.remove(&id).is_none() {
            return Ok(None);
        }
        let before = tables.bookings.len();
        tables.bookings.retain(|b| b.session_id != id);
        Ok(Some(DeletedSession {
            bookings_removed: (before - tables.bookings.len()) as u64,
        }))
    }

    async fn list_by_status(
        &self,
        status: SessionStatus,
        page: PageRequest,
    ) -> Result<Page<StudySession>> {
        let tables = self.tables.lock().await;
        let mut matching: Vec<StudySession> = tables
            .sessions
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(paginate(&matching, page))
    }

    async fn list_by_tutor(&self, email: &str) -> Result<Vec<StudySession>> {
        let tables = self.tables.lock().await;
        let mut matching: Vec<StudySession> = tables
            .sessions
            .values()
            .filter(|s| s.tutor_email == email)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn rejections(&self, session_id: Uuid) -> Result<Vec<RejectionRecord>> {
        Ok(self
            .tables
            .lock()
            .await
            .rejections
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn insert_if_approved(&self, booking: NewBooking) -> Result<BookingInsert> {
        let mut tables = self.tables.lock().await;
        match tables.sessions.get(&booking.session_id) {
            None => return Ok(BookingInsert::SessionMissing),
            Some(s) if s.status != SessionStatus::Approved => {
                return Ok(BookingInsert::SessionNotApproved(s.status));
            }
            Some(_) => {}
        }

        if tables.bookings.iter().any(|b| {
            b.session_id == booking.session_id && b.student_email == booking.student_email
        }) {
            return Err(AppError::Conflict(
                "This session is already booked by this student".to_string(),
            ));
        }

        let record = Booking {
            id: Uuid::new_v4(),
            session_id: booking.session_id,
            student_email: booking.student_email,
            booked_at: Utc::now(),
            payment_ref: booking.payment_ref,
        };
        tables.bookings.push(record.clone());
        Ok(BookingInsert::Inserted(record))
    }

    async fn exists(&self, session_id: Uuid, student_email: &str) -> Result<bool> {
        Ok(self
            .tables
            .lock()
            .await
            .bookings
            .iter()
            .any(|b| b.session_id == session_id && b.student_email == student_email))
    }

    async fn list_by_student(&self, email: &str, page: PageRequest) -> Result<Page<Booking>> {
        let tables = self.tables.lock().await;
        let mut matching: Vec<Booking> = tables
            .bookings
            .iter()
            .filter(|b| b.student_email == email)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.booked_at.cmp(&a.booked_at).then(a.id.cmp(&b.id)));
        Ok(paginate(&matching, page))
    }
}
