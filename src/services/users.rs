use std::sync::Arc;

use crate::{
    error::{AppError, Result},
    models::{
        outcome::UpdateOutcome,
        user::{NewUser, Role, User},
    },
    repositories::store::UserRepository,
};

/// Result of a sign-in upsert.
#[derive(Debug, Clone)]
pub enum Registration {
    Created(User),
    /// The email was known; only `lastLogin` moved.
    Existing,
}

/// Identity-store operations outside the role-transition workflow.
#[derive(Clone)]
pub struct UserDirectory {
    users: Arc<dyn UserRepository>,
}

impl UserDirectory {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Saves a user after sign-up or social login. New users are students.
    pub async fn register(&self, user: NewUser) -> Result<Registration> {
        let email = user.email.clone();
        match self.users.insert_if_absent(user).await? {
            Some(created) => {
                tracing::info!(email = %created.email, "user registered");
                Ok(Registration::Created(created))
            }
            None => {
                self.users.touch_last_login(&email).await?;
                tracing::debug!(email = %email, "known user signed in");
                Ok(Registration::Existing)
            }
        }
    }

    pub async fn role_of(&self, email: &str) -> Result<Role> {
        self.users
            .find_by_email(email)
            .await?
            .map(|user| user.role)
            .ok_or(AppError::NotFound("User"))
    }

    /// `false` for unknown emails.
    pub async fn has_role(&self, email: &str, role: Role) -> Result<bool> {
        Ok(self
            .users
            .find_by_email(email)
            .await?
            .is_some_and(|user| user.role == role))
    }

    pub async fn touch_last_login(&self, email: &str) -> Result<bool> {
        self.users.touch_last_login(email).await
    }

    /// Admin action: sets a role outright, creating the user if needed.
    pub async fn assign_role(&self, email: &str, role: Role) -> Result<UpdateOutcome> {
        let write = self.users.upsert_role(email, role).await?;
        tracing::info!(email, role = %role, ?write, "role assigned by admin");
        Ok(write.into())
    }
}
