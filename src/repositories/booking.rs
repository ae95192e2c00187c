use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        booking::{Booking, BookingInsert, NewBooking},
        page::{Page, PageRequest},
        study_session::SessionStatus,
    },
};

use super::{
    postgres::{PgStore, column, conflict_on_unique, limit_offset},
    store::BookingRepository,
};

fn row_to_booking(row: &Row) -> Result<Booking> {
    Ok(Booking {
        id: column(row, "id")?,
        session_id: column(row, "session_id")?,
        student_email: column(row, "student_email")?,
        booked_at: column(row, "booked_at")?,
        payment_ref: column(row, "payment_ref")?,
    })
}

#[async_trait]
impl BookingRepository for PgStore {
    async fn insert_if_approved(&self, booking: NewBooking) -> Result<BookingInsert> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                INSERT INTO bookings (id, session_id, student_email, booked_at, payment_ref)
                SELECT $1, s.id, $3, $4, $5
                FROM study_sessions s
                WHERE s.id = $2 AND s.status = 'approved'
                FOR SHARE OF s
                RETURNING id, session_id, student_email, booked_at, payment_ref
                "#,
                &[
                    &Uuid::new_v4(),
                    &booking.session_id,
                    &booking.student_email,
                    &Utc::now(),
                    &booking.payment_ref,
                ],
            )
            .await
            .map_err(conflict_on_unique("This session is already booked by this student"))?;

        if let Some(row) = row {
            return Ok(BookingInsert::Inserted(row_to_booking(&row)?));
        }

        let status = client
            .query_opt(
                "SELECT status FROM study_sessions WHERE id = $1",
                &[&booking.session_id],
            )
            .await?;
        Ok(match status {
            Some(row) => BookingInsert::SessionNotApproved(column::<SessionStatus>(&row, "status")?),
            None => BookingInsert::SessionMissing,
        })
    }

    async fn exists(&self, session_id: Uuid, student_email: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM bookings WHERE session_id = $1 AND student_email = $2
                ) AS booked
                "#,
                &[&session_id, &student_email],
            )
            .await?;
        column(&row, "booked")
    }

    async fn list_by_student(&self, email: &str, page: PageRequest) -> Result<Page<Booking>> {
        let client = self.pool.get().await?;
        let (limit, offset) = limit_offset(page);
        let rows = client
            .query(
                r#"
                SELECT id, session_id, student_email, booked_at, payment_ref
                FROM bookings
                WHERE student_email = $1
                ORDER BY booked_at DESC, id
                LIMIT $2 OFFSET $3
                "#,
                &[&email, &limit, &offset],
            )
            .await?;
        let total: i64 = column(
            &client
                .query_one(
                    "SELECT COUNT(*) AS total FROM bookings WHERE student_email = $1",
                    &[&email],
                )
                .await?,
            "total",
        )?;

        let items = rows.iter().map(row_to_booking).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, total as u64, page))
    }
}
