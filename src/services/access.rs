use std::sync::Arc;

use crate::{
    error::{AppError, Result},
    models::{caller::Caller, user::Role},
    repositories::store::UserRepository,
};

/// What an operation demands of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement<'a> {
    Admin,
    Tutor,
    /// The caller must be the owner of the addressed resource.
    Owner(Option<&'a str>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

/// Decides whether a caller holding `role` meets `requirement`.
///
/// `role` is `None` when the caller has no user record.
pub fn authorize(role: Option<Role>, caller_email: &str, requirement: Requirement<'_>) -> Decision {
    match requirement {
        Requirement::Admin if role == Some(Role::Admin) => Decision::Allow,
        Requirement::Admin => Decision::Deny("Admin role required".to_string()),
        Requirement::Tutor if role == Some(Role::Tutor) => Decision::Allow,
        Requirement::Tutor => Decision::Deny("Tutor role required".to_string()),
        Requirement::Owner(Some(owner)) if owner == caller_email => Decision::Allow,
        Requirement::Owner(_) => Decision::Deny("Access to another user's resource".to_string()),
    }
}

/// The single gate every protected operation goes through.
///
/// Roles are read from the identity store on each check rather than trusted
/// from the token, so promotions and demotions take effect immediately.
#[derive(Clone)]
pub struct AccessPolicy {
    users: Arc<dyn UserRepository>,
}

impl AccessPolicy {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Looks up the caller's current role, if they have a user record.
    pub async fn role_of(&self, caller: &Caller) -> Result<Option<Role>> {
        Ok(self
            .users
            .find_by_email(&caller.email)
            .await?
            .map(|user| user.role))
    }

    /// Returns `Forbidden` unless the caller meets the requirement.
    pub async fn check(&self, caller: &Caller, requirement: Requirement<'_>) -> Result<()> {
        let role = match requirement {
            Requirement::Owner(_) => None,
            Requirement::Admin | Requirement::Tutor => self.role_of(caller).await?,
        };

        match authorize(role, &caller.email, requirement) {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => {
                tracing::warn!(caller = %caller.email, ?requirement, "access denied: {}", reason);
                Err(AppError::Forbidden(reason))
            }
        }
    }

    /// Passes for the owner or an admin.
    pub async fn check_owner_or_admin(&self, caller: &Caller, owner: &str) -> Result<Role> {
        let role = self
            .role_of(caller)
            .await?
            .ok_or_else(|| AppError::Forbidden("Unknown user".to_string()))?;

        if authorize(Some(role), &caller.email, Requirement::Owner(Some(owner))) == Decision::Allow
            || role == Role::Admin
        {
            Ok(role)
        } else {
            tracing::warn!(caller = %caller.email, owner, "access denied: not owner or admin");
            Err(AppError::Forbidden("Access to another user's resource".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::store::Store;
    use chrono::Utc;

    fn caller(email: &str) -> Caller {
        Caller {
            email: email.to_string(),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn admin_requirement_matches_admin_role_only() {
        assert_eq!(authorize(Some(Role::Admin), "a@x.com", Requirement::Admin), Decision::Allow);
        assert!(matches!(
            authorize(Some(Role::Tutor), "a@x.com", Requirement::Admin),
            Decision::Deny(_)
        ));
        assert!(matches!(authorize(None, "a@x.com", Requirement::Admin), Decision::Deny(_)));
    }

    #[test]
    fn tutor_requirement_excludes_admins() {
        assert_eq!(authorize(Some(Role::Tutor), "t@x.com", Requirement::Tutor), Decision::Allow);
        assert!(matches!(
            authorize(Some(Role::Admin), "t@x.com", Requirement::Tutor),
            Decision::Deny(_)
        ));
    }

    #[test]
    fn owner_requirement_is_an_identity_match() {
        assert_eq!(
            authorize(None, "s@x.com", Requirement::Owner(Some("s@x.com"))),
            Decision::Allow
        );
        assert!(matches!(
            authorize(Some(Role::Admin), "a@x.com", Requirement::Owner(Some("s@x.com"))),
            Decision::Deny(_)
        ));
        assert!(matches!(
            authorize(Some(Role::Student), "s@x.com", Requirement::Owner(None)),
            Decision::Deny(_)
        ));
    }

    #[tokio::test]
    async fn check_reads_the_current_role() {
        let store = Store::memory();
        let policy = AccessPolicy::new(store.users.clone());
        let who = caller("t@x.com");

        assert!(matches!(
            policy.check(&who, Requirement::Tutor).await,
            Err(AppError::Forbidden(_))
        ));

        store.users.upsert_role("t@x.com", Role::Tutor).await.unwrap();
        policy.check(&who, Requirement::Tutor).await.unwrap();

        store.users.upsert_role("t@x.com", Role::Student).await.unwrap();
        assert!(policy.check(&who, Requirement::Tutor).await.is_err());
    }

    #[tokio::test]
    async fn admins_pass_ownership_override() {
        let store = Store::memory();
        let policy = AccessPolicy::new(store.users.clone());
        store.users.upsert_role("a@x.com", Role::Admin).await.unwrap();
        store.users.upsert_role("t@x.com", Role::Tutor).await.unwrap();

        assert_eq!(
            policy.check_owner_or_admin(&caller("a@x.com"), "t@x.com").await.unwrap(),
            Role::Admin
        );
        assert_eq!(
            policy.check_owner_or_admin(&caller("t@x.com"), "t@x.com").await.unwrap(),
            Role::Tutor
        );
        assert!(policy.check_owner_or_admin(&caller("x@x.com"), "t@x.com").await.is_err());
    }
}
