use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use crate::error::{AppError, Result};
use std::time::Duration;

/// Creates a new database connection pool.
///
/// # Arguments
///
/// * `database_url` - The URL of the PostgreSQL database.
pub fn create_pool(database_url: &str) -> Result<Pool> {
    let mut cfg = Config::new();
    let pg_config: tokio_postgres::Config = database_url.parse()?;

    if let Some(host) = pg_config.get_hosts().first() {
        if let tokio_postgres::config::Host::Tcp(hostname) = host {
            cfg.host = Some(hostname.to_string());
        }
    }

    if let Some(port) = pg_config.get_ports().first() {
        cfg.port = Some(*port);
    }

    if let Some(dbname) = pg_config.get_dbname() {
        cfg.dbname = Some(dbname.to_string());
    }

    if let Some(user) = pg_config.get_user() {
        cfg.user = Some(user.to_string());
    }

    if let Some(password) = pg_config.get_password() {
        cfg.password = Some(String::from_utf8_lossy(password).to_string());
    }

    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    cfg.pool = Some(PoolConfig {
        max_size: 32,
        timeouts: deadpool_postgres::Timeouts {
            wait: Some(Duration::from_secs(5)),
            create: Some(Duration::from_secs(2)),
            recycle: Some(Duration::from_secs(1)),
        },
        ..Default::default()
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(AppError::from)
}

/// Idempotent DDL run at startup.
///
/// The two partial unique indexes carry the "one active application per
/// email" and "one live session per (title, tutor)" rules.
const SCHEMA: &str = r#"
DO $$ BEGIN
    CREATE TYPE user_role AS ENUM ('student', 'tutor', 'admin');
EXCEPTION WHEN duplicate_object THEN NULL;
END $$;

DO $$ BEGIN
    CREATE TYPE application_status AS ENUM ('pending', 'approved', 'rejected', 'deactivated');
EXCEPTION WHEN duplicate_object THEN NULL;
END $$;

DO $$ BEGIN
    CREATE TYPE session_status AS ENUM ('pending', 'approved', 'rejected');
EXCEPTION WHEN duplicate_object THEN NULL;
END $$;

CREATE TABLE IF NOT EXISTS users (
    email       TEXT PRIMARY KEY,
    name        TEXT,
    photo_url   TEXT,
    role        user_role NOT NULL DEFAULT 'student',
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    last_login  TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS tutor_applications (
    id               UUID PRIMARY KEY,
    applicant_email  TEXT NOT NULL,
    details          JSONB NOT NULL,
    status           application_status NOT NULL DEFAULT 'pending',
    applied_at       TIMESTAMPTZ NOT NULL,
    updated_at       TIMESTAMPTZ NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS tutor_applications_one_active
    ON tutor_applications (applicant_email)
    WHERE status IN ('pending', 'approved');

CREATE INDEX IF NOT EXISTS tutor_applications_status
    ON tutor_applications (status, applied_at);

CREATE TABLE IF NOT EXISTS study_sessions (
    id                  UUID PRIMARY KEY,
    tutor_email         TEXT NOT NULL,
    tutor_name          TEXT,
    title               TEXT NOT NULL,
    description         TEXT,
    registration_start  TIMESTAMPTZ NOT NULL,
    registration_end    TIMESTAMPTZ NOT NULL,
    class_start         TIMESTAMPTZ NOT NULL,
    class_end           TIMESTAMPTZ NOT NULL,
    duration_minutes    INTEGER NOT NULL CHECK (duration_minutes > 0),
    registration_fee    DOUBLE PRECISION CHECK (registration_fee >= 0),
    status              session_status NOT NULL DEFAULT 'pending',
    created_at          TIMESTAMPTZ NOT NULL,
    updated_at          TIMESTAMPTZ NOT NULL,
    reapplied_at        TIMESTAMPTZ
);

CREATE UNIQUE INDEX IF NOT EXISTS study_sessions_live_title
    ON study_sessions (title, tutor_email)
    WHERE status <> 'rejected';

CREATE INDEX IF NOT EXISTS study_sessions_status
    ON study_sessions (status, created_at DESC);

CREATE INDEX IF NOT EXISTS study_sessions_tutor
    ON study_sessions (tutor_email);

CREATE TABLE IF NOT EXISTS session_rejections (
    id           UUID PRIMARY KEY,
    session_id   UUID NOT NULL,
    reason       TEXT NOT NULL,
    feedback     TEXT,
    rejected_at  TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS session_rejections_session
    ON session_rejections (session_id, rejected_at);

CREATE TABLE IF NOT EXISTS bookings (
    id             UUID PRIMARY KEY,
    session_id     UUID NOT NULL REFERENCES study_sessions (id),
    student_email  TEXT NOT NULL,
    booked_at      TIMESTAMPTZ NOT NULL,
    payment_ref    TEXT,
    UNIQUE (session_id, student_email)
);

CREATE INDEX IF NOT EXISTS bookings_student
    ON bookings (student_email, booked_at DESC);
"#;

/// Creates the enum types, tables and indexes if they are missing.
pub async fn ensure_schema(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;
    client.batch_execute(SCHEMA).await?;
    tracing::info!("Database schema verified");
    Ok(())
}
