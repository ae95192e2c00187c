use axum::{Extension, extract::State, response::Response};
use garde::Validate;
use serde::Deserialize;

use crate::{
    error::Result,
    handlers::{
        extract::{Json, Path},
        response,
    },
    models::{
        caller::Caller,
        user::{NewUser, Role},
    },
    services::users::Registration,
    state::AppState,
    validation::params::validate_email,
};

/// The request payload for saving a user after sign-in.
#[derive(Deserialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveUserRequest {
    #[garde(email)]
    pub email: String,
    #[garde(length(max = 200))]
    pub name: Option<String>,
    #[serde(alias = "photoURL")]
    #[garde(length(max = 2048))]
    pub photo_url: Option<String>,
}

/// The request payload for an admin role assignment.
#[derive(Deserialize, Debug)]
pub struct AssignRoleRequest {
    pub role: Role,
}

/// Saves a user on first sign-in; later calls only refresh `lastLogin`.
pub async fn save_user(
    State(state): State<AppState>,
    Json(payload): Json<SaveUserRequest>,
) -> Result<Response> {
    payload.validate()?;

    let registration = state
        .users
        .register(NewUser {
            email: payload.email,
            name: payload.name,
            photo_url: payload.photo_url,
        })
        .await?;

    match registration {
        Registration::Created(user) => response::created(&user),
        Registration::Existing => response::ok(&sonic_rs::json!({
            "message": "user already exists",
            "insertedId": null
        })),
    }
}

pub async fn get_role(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Response> {
    validate_email(&email)?;
    let role = state.users.role_of(&email).await?;
    response::ok(&sonic_rs::json!({ "role": role.as_str() }))
}

/// Answers with a bare boolean.
pub async fn is_admin(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Response> {
    validate_email(&email)?;
    let admin = state.users.has_role(&email, Role::Admin).await?;
    response::ok(&admin)
}

pub async fn is_tutor(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Response> {
    validate_email(&email)?;
    let tutor = state.users.has_role(&email, Role::Tutor).await?;
    response::ok(&sonic_rs::json!({ "tutor": tutor }))
}

pub async fn assign_role(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(email): Path<String>,
    Json(payload): Json<AssignRoleRequest>,
) -> Result<Response> {
    validate_email(&email)?;
    let outcome = state.users.assign_role(&email, payload.role).await?;
    tracing::info!(admin = %caller.email, target = %email, role = %payload.role, "role assignment");
    response::ok(&outcome)
}

/// Recomputes the user's role from their application history.
pub async fn sync_role(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Response> {
    validate_email(&email)?;
    let outcome = state.applications.reconcile_role(&email).await?;
    response::ok(&outcome)
}
