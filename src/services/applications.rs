use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        application::{ApplicantDetails, Application, ApplicationStatus},
        outcome::UpdateOutcome,
        user::{Role, RoleWrite},
    },
    repositories::store::{ApplicationRepository, UserRepository},
};

/// Tracks tutor candidacies and drives role promotion and demotion.
#[derive(Clone)]
pub struct ApplicationRegistry {
    applications: Arc<dyn ApplicationRepository>,
    users: Arc<dyn UserRepository>,
}

impl ApplicationRegistry {
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            applications,
            users,
        }
    }

    /// Files a pending application for `email`.
    ///
    /// Fails with `Conflict` while another application for the email is
    /// pending or approved.
    pub async fn apply(&self, email: &str, details: ApplicantDetails) -> Result<Application> {
        if email.trim().is_empty() {
            return Err(AppError::Validation("Applicant email is required".to_string()));
        }

        let application = self
            .applications
            .insert_pending(email, details, Utc::now())
            .await?;

        tracing::info!(application = %application.id, email, "tutor application filed");
        Ok(application)
    }

    /// Lists applications in `status`, pending when unspecified.
    pub async fn list_by_status(&self, status: Option<ApplicationStatus>) -> Result<Vec<Application>> {
        self.applications
            .list_by_status(status.unwrap_or(ApplicationStatus::Pending))
            .await
    }

    /// The applicant's most recent application, whatever its status.
    pub async fn find_for_applicant(&self, email: &str) -> Result<Application> {
        self.applications
            .latest_for(email)
            .await?
            .ok_or(AppError::NotFound("Application"))
    }

    /// Approves or rejects an application. Approval promotes the applicant
    /// to tutor in the same write; an admin applicant keeps the admin role.
    pub async fn decide(&self, id: Uuid, status: ApplicationStatus) -> Result<UpdateOutcome> {
        let role = match status {
            ApplicationStatus::Approved => Some(Role::Tutor),
            ApplicationStatus::Rejected => None,
            other => {
                return Err(AppError::Validation(format!(
                    "Cannot decide an application as {}",
                    other
                )));
            }
        };

        let (previous, application) = self
            .applications
            .set_status(id, status, role, Utc::now())
            .await?
            .ok_or(AppError::NotFound("Application"))?;

        tracing::info!(
            application = %id,
            email = %application.applicant_email,
            from = %previous,
            to = %status,
            "tutor application decided"
        );

        Ok(if previous == status {
            UpdateOutcome::unchanged()
        } else {
            UpdateOutcome::modified()
        })
    }

    /// Deactivates an application and demotes the applicant to student,
    /// regardless of any other role they hold.
    pub async fn deactivate(&self, id: Uuid) -> Result<UpdateOutcome> {
        let (previous, application) = self
            .applications
            .set_status(id, ApplicationStatus::Deactivated, Some(Role::Student), Utc::now())
            .await?
            .ok_or(AppError::NotFound("Application"))?;

        tracing::info!(
            application = %id,
            email = %application.applicant_email,
            from = %previous,
            "tutor application deactivated, applicant demoted to student"
        );

        Ok(if previous == ApplicationStatus::Deactivated {
            UpdateOutcome::unchanged()
        } else {
            UpdateOutcome::modified()
        })
    }

    /// Recomputes the user's role from their application history.
    ///
    /// An approved application means tutor; a tutor without one falls back to
    /// student. Admins are left alone.
    pub async fn reconcile_role(&self, email: &str) -> Result<UpdateOutcome> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AppError::NotFound("User"))?;

        if user.role == Role::Admin {
            return Ok(UpdateOutcome::unchanged());
        }

        let approved = matches!(
            self.applications.find_active(email).await?,
            Some(Application { status: ApplicationStatus::Approved, .. })
        );
        let expected = if approved { Role::Tutor } else { Role::Student };

        let write = self.users.upsert_role(email, expected).await?;
        if write != RoleWrite::Unchanged {
            tracing::warn!(email, from = %user.role, to = %expected, "role projection repaired");
        }
        Ok(write.into())
    }
}
