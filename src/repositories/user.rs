use async_trait::async_trait;
use tokio_postgres::Row;

use crate::{
    error::Result,
    models::user::{NewUser, Role, RoleWrite, User},
};

use super::{
    postgres::{PgStore, column},
    store::UserRepository,
};

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        email: column(row, "email")?,
        name: column(row, "name")?,
        photo_url: column(row, "photo_url")?,
        role: column(row, "role")?,
        created_at: column(row, "created_at")?,
        last_login: column(row, "last_login")?,
    })
}

#[async_trait]
impl UserRepository for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT email, name, photo_url, role, created_at, last_login
                FROM users
                WHERE email = $1
                "#,
                &[&email],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn insert_if_absent(&self, user: NewUser) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                INSERT INTO users (email, name, photo_url, role, created_at, last_login)
                VALUES ($1, $2, $3, 'student', NOW(), NOW())
                ON CONFLICT (email) DO NOTHING
                RETURNING email, name, photo_url, role, created_at, last_login
                "#,
                &[&user.email, &user.name, &user.photo_url],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn upsert_role(&self, email: &str, role: Role) -> Result<RoleWrite> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                INSERT INTO users (email, role, created_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (email) DO UPDATE
                SET role = EXCLUDED.role
                WHERE users.role IS DISTINCT FROM EXCLUDED.role
                RETURNING (xmax = 0) AS inserted
                "#,
                &[&email, &role],
            )
            .await?;

        Ok(match row {
            None => RoleWrite::Unchanged,
            Some(r) if column::<bool>(&r, "inserted")? => RoleWrite::Inserted,
            Some(_) => RoleWrite::Changed,
        })
    }

    async fn touch_last_login(&self, email: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE users SET last_login = NOW() WHERE email = $1",
                &[&email],
            )
            .await?;
        Ok(updated > 0)
    }
}
