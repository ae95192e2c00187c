use deadpool_postgres::Pool;
use postgres_types::FromSql;
use tokio_postgres::{Row, error::SqlState};

use crate::error::AppError;

/// PostgreSQL adapter for every repository port.
///
/// Uniqueness is carried by the partial unique indexes created in
/// `db::ensure_schema`; a violation surfaces as `AppError::Conflict`.
#[derive(Clone)]
pub struct PgStore {
    pub(super) pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

/// Reads a column, naming it in the error when it is absent or mistyped.
pub(super) fn column<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> crate::error::Result<T> {
    row.try_get(name)
        .map_err(|_| AppError::MissingData(name.to_string()))
}

/// Maps a unique-index violation to `Conflict`, anything else to `Database`.
pub(super) fn conflict_on_unique(message: &'static str) -> impl FnOnce(tokio_postgres::Error) -> AppError {
    move |e| {
        if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
            AppError::Conflict(message.to_string())
        } else {
            AppError::Database(e)
        }
    }
}

/// Converts a page request into `LIMIT` / `OFFSET` parameters.
pub(super) fn limit_offset(page: crate::models::page::PageRequest) -> (i64, i64) {
    (i64::from(page.limit), page.offset() as i64)
}
