use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::types::Json;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        application::{ApplicantDetails, Application, ApplicationStatus},
        user::Role,
    },
};

use super::{
    postgres::{PgStore, column, conflict_on_unique},
    store::ApplicationRepository,
};

const ACTIVE_CONFLICT: &str = "An active tutor application already exists for this email";

fn row_to_application(row: &Row) -> Result<Application> {
    let Json(details): Json<ApplicantDetails> = column(row, "details")?;
    Ok(Application {
        id: column(row, "id")?,
        applicant_email: column(row, "applicant_email")?,
        details,
        status: column(row, "status")?,
        applied_at: column(row, "applied_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

#[async_trait]
impl ApplicationRepository for PgStore {
    async fn insert_pending(
        &self,
        email: &str,
        details: ApplicantDetails,
        at: DateTime<Utc>,
    ) -> Result<Application> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                INSERT INTO tutor_applications (id, applicant_email, details, status, applied_at, updated_at)
                VALUES ($1, $2, $3, 'pending', $4, $4)
                RETURNING id, applicant_email, details, status, applied_at, updated_at
                "#,
                &[&Uuid::new_v4(), &email, &Json(&details), &at],
            )
            .await
            .map_err(conflict_on_unique(ACTIVE_CONFLICT))?;
        row_to_application(&row)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Application>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, applicant_email, details, status, applied_at, updated_at
                FROM tutor_applications
                WHERE id = $1
                "#,
                &[&id],
            )
            .await?;
        row.map(|r| row_to_application(&r)).transpose()
    }

    async fn find_active(&self, email: &str) -> Result<Option<Application>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, applicant_email, details, status, applied_at, updated_at
                FROM tutor_applications
                WHERE applicant_email = $1 AND status IN ('pending', 'approved')
                "#,
                &[&email],
            )
            .await?;
        row.map(|r| row_to_application(&r)).transpose()
    }

    async fn latest_for(&self, email: &str) -> Result<Option<Application>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, applicant_email, details, status, applied_at, updated_at
                FROM tutor_applications
                WHERE applicant_email = $1
                ORDER BY applied_at DESC
                LIMIT 1
                "#,
                &[&email],
            )
            .await?;
        row.map(|r| row_to_application(&r)).transpose()
    }

    async fn list_by_status(&self, status: ApplicationStatus) -> Result<Vec<Application>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT id, applicant_email, details, status, applied_at, updated_at
                FROM tutor_applications
                WHERE status = $1
                ORDER BY applied_at DESC
                "#,
                &[&status],
            )
            .await?;
        rows.iter().map(row_to_application).collect()
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: ApplicationStatus,
        role: Option<Role>,
        at: DateTime<Utc>,
    ) -> Result<Option<(ApplicationStatus, Application)>> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let previous = tx
            .query_opt(
                "SELECT status FROM tutor_applications WHERE id = $1 FOR UPDATE",
                &[&id],
            )
            .await?;
        let previous: ApplicationStatus = match previous {
            Some(row) => column(&row, "status")?,
            None => return Ok(None),
        };

        let row = tx
            .query_one(
                r#"
                UPDATE tutor_applications
                SET status = $2, updated_at = $3
                WHERE id = $1
                RETURNING id, applicant_email, details, status, applied_at, updated_at
                "#,
                &[&id, &status, &at],
            )
            .await
            .map_err(conflict_on_unique(ACTIVE_CONFLICT))?;
        let application = row_to_application(&row)?;

        if let Some(role) = role {
            tx.execute(
                r#"
                INSERT INTO users (email, role, created_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
                WHERE NOT (users.role = 'admin' AND EXCLUDED.role = 'tutor')
                "#,
                &[&application.applicant_email, &role],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(Some((previous, application)))
    }
}
