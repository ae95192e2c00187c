use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        page::{Page, PageRequest},
        study_session::{
            DeletedSession, NewSession, RejectionRecord, SessionChanges, SessionStatus,
            StatusChange, StudySession, TimeWindow, Transition,
        },
    },
};

use super::{
    postgres::{PgStore, column, conflict_on_unique, limit_offset},
    store::SessionRepository,
};

const TITLE_CONFLICT: &str = "A session with this title already exists for this tutor";

const SESSION_COLUMNS: &str = "id, tutor_email, tutor_name, title, description, \
    registration_start, registration_end, class_start, class_end, duration_minutes, \
    registration_fee, status, created_at, updated_at, reapplied_at";

fn row_to_session(row: &Row) -> Result<StudySession> {
    Ok(StudySession {
        id: column(row, "id")?,
        tutor_email: column(row, "tutor_email")?,
        tutor_name: column(row, "tutor_name")?,
        title: column(row, "title")?,
        description: column(row, "description")?,
        registration_window: TimeWindow {
            start: column(row, "registration_start")?,
            end: column(row, "registration_end")?,
        },
        class_window: TimeWindow {
            start: column(row, "class_start")?,
            end: column(row, "class_end")?,
        },
        duration_minutes: column(row, "duration_minutes")?,
        registration_fee: column(row, "registration_fee")?,
        status: column(row, "status")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
        reapplied_at: column(row, "reapplied_at")?,
    })
}

fn row_to_rejection(row: &Row) -> Result<RejectionRecord> {
    Ok(RejectionRecord {
        id: column(row, "id")?,
        session_id: column(row, "session_id")?,
        reason: column(row, "reason")?,
        feedback: column(row, "feedback")?,
        rejected_at: column(row, "rejected_at")?,
    })
}

impl PgStore {
    /// Tells a missing session apart from one whose status blocked a guarded write.
    async fn skipped_or_missing(&self, id: Uuid) -> Result<Transition> {
        Ok(match SessionRepository::find(self, id).await? {
            Some(session) => Transition::Skipped(session),
            None => Transition::Missing,
        })
    }
}

#[async_trait]
impl SessionRepository for PgStore {
    async fn insert(&self, session: NewSession, at: DateTime<Utc>) -> Result<StudySession> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            INSERT INTO study_sessions (
                id, tutor_email, tutor_name, title, description,
                registration_start, registration_end, class_start, class_end,
                duration_minutes, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', $11, $11)
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let row = client
            .query_one(
                &query,
                &[
                    &Uuid::new_v4(),
                    &session.tutor_email,
                    &session.tutor_name,
                    &session.title,
                    &session.description,
                    &session.registration_window.start,
                    &session.registration_window.end,
                    &session.class_window.start,
                    &session.class_window.end,
                    &session.duration_minutes,
                    &at,
                ],
            )
            .await
            .map_err(conflict_on_unique(TITLE_CONFLICT))?;
        row_to_session(&row)
    }

    async fn find(&self, id: Uuid) -> Result<Option<StudySession>> {
        let client = self.pool.get().await?;
        let query = format!("SELECT {SESSION_COLUMNS} FROM study_sessions WHERE id = $1");
        let row = client.query_opt(&query, &[&id]).await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn change_status(&self, id: Uuid, change: &StatusChange) -> Result<Transition> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            UPDATE study_sessions
            SET status = $3,
                registration_fee = COALESCE($4, registration_fee),
                reapplied_at = CASE WHEN $5 THEN $6 ELSE reapplied_at END,
                updated_at = $6
            WHERE id = $1 AND status = ANY($2)
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let row = client
            .query_opt(
                &query,
                &[
                    &id,
                    &change.from,
                    &change.to,
                    &change.registration_fee,
                    &change.reapplied,
                    &change.at,
                ],
            )
            .await
            .map_err(conflict_on_unique(TITLE_CONFLICT))?;

        match row {
            Some(r) => Ok(Transition::Applied(row_to_session(&r)?)),
            None => self.skipped_or_missing(id).await,
        }
    }

    async fn reject(
        &self,
        id: Uuid,
        reason: String,
        feedback: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<(StudySession, RejectionRecord)>> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let query = format!(
            r#"
            UPDATE study_sessions
            SET status = 'rejected', updated_at = $2
            WHERE id = $1
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let Some(row) = tx.query_opt(&query, &[&id, &at]).await? else {
            return Ok(None);
        };
        let session = row_to_session(&row)?;

        let row = tx
            .query_one(
                r#"
                INSERT INTO session_rejections (id, session_id, reason, feedback, rejected_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, session_id, reason, feedback, rejected_at
                "#,
                &[&Uuid::new_v4(), &id, &reason, &feedback, &at],
            )
            .await?;
        let record = row_to_rejection(&row)?;

        tx.commit().await?;
        Ok(Some((session, record)))
    }

    async fn update(
        &self,
        id: Uuid,
        changes: &SessionChanges,
        from: &[SessionStatus],
        at: DateTime<Utc>,
    ) -> Result<Transition> {
        let client = self.pool.get().await?;
        let registration = changes.registration_window;
        let class = changes.class_window;
        let query = format!(
            r#"
            UPDATE study_sessions
            SET title = COALESCE($3, title),
                description = COALESCE($4, description),
                registration_start = COALESCE($5, registration_start),
                registration_end = COALESCE($6, registration_end),
                class_start = COALESCE($7, class_start),
                class_end = COALESCE($8, class_end),
                duration_minutes = COALESCE($9, duration_minutes),
                registration_fee = COALESCE($10, registration_fee),
                updated_at = $11
            WHERE id = $1 AND status = ANY($2)
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let row = client
            .query_opt(
                &query,
                &[
                    &id,
                    &from,
                    &changes.title,
                    &changes.description,
                    &registration.map(|w| w.start),
                    &registration.map(|w| w.end),
                    &class.map(|w| w.start),
                    &class.map(|w| w.end),
                    &changes.duration_minutes,
                    &changes.registration_fee,
                    &at,
                ],
            )
            .await
            .map_err(conflict_on_unique(TITLE_CONFLICT))?;

        match row {
            Some(r) => Ok(Transition::Applied(row_to_session(&r)?)),
            None => self.skipped_or_missing(id).await,
        }
    }

    async fn delete(&self, id: Uuid) -> Result<Option<DeletedSession>> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let bookings_removed = tx
            .execute("DELETE FROM bookings WHERE session_id = $1", &[&id])
            .await?;
        let deleted = tx
            .execute("DELETE FROM study_sessions WHERE id = $1", &[&id])
            .await?;

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(DeletedSession { bookings_removed }))
    }

    async fn list_by_status(
        &self,
        status: SessionStatus,
        page: PageRequest,
    ) -> Result<Page<StudySession>> {
        let client = self.pool.get().await?;
        let (limit, offset) = limit_offset(page);
        let query = format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM study_sessions
            WHERE status = $1
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = client.query(&query, &[&status, &limit, &offset]).await?;
        let total: i64 = column(
            &client
                .query_one(
                    "SELECT COUNT(*) AS total FROM study_sessions WHERE status = $1",
                    &[&status],
                )
                .await?,
            "total",
        )?;

        let items = rows.iter().map(row_to_session).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, total as u64, page))
    }

    async fn list_by_tutor(&self, email: &str) -> Result<Vec<StudySession>> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM study_sessions WHERE tutor_email = $1 ORDER BY created_at DESC"
        );
        let rows = client.query(&query, &[&email]).await?;
        rows.iter().map(row_to_session).collect()
    }

    async fn rejections(&self, session_id: Uuid) -> Result<Vec<RejectionRecord>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT id, session_id, reason, feedback, rejected_at
                FROM session_rejections
                WHERE session_id = $1
                ORDER BY rejected_at ASC
                "#,
                &[&session_id],
            )
            .await?;
        rows.iter().map(row_to_rejection).collect()
    }
}
