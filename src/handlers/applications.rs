use axum::{Extension, extract::State, response::Response};
use garde::Validate;
use serde::Deserialize;

use crate::{
    error::Result,
    handlers::{
        extract::{Json, Path, Query},
        response,
    },
    models::{
        application::{ApplicantDetails, ApplicationStatus},
        caller::Caller,
        outcome::InsertOutcome,
    },
    services::access::Requirement,
    state::AppState,
    validation::params::{parse_id, parse_status, validate_email},
};

/// The request payload for a tutor application. The applicant is the caller.
#[derive(Deserialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    #[garde(length(min = 1, max = 200))]
    pub name: String,
    #[garde(length(max = 2048))]
    pub photo_url: Option<String>,
    #[garde(length(max = 5000))]
    pub experience: Option<String>,
    #[serde(default)]
    #[garde(length(max = 50), inner(length(min = 1, max = 100)))]
    pub subjects: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct DecideRequest {
    pub status: ApplicationStatus,
}

pub async fn apply(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<ApplyRequest>,
) -> Result<Response> {
    payload.validate()?;

    let application = state
        .applications
        .apply(
            &caller.email,
            ApplicantDetails {
                name: payload.name.trim().to_string(),
                photo_url: payload.photo_url,
                experience: payload.experience,
                subjects: payload.subjects,
            },
        )
        .await?;

    response::created(&InsertOutcome::new(application.id))
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Response> {
    let status = parse_status::<ApplicationStatus>(query.status.as_deref())?;
    let applications = state.applications.list_by_status(status).await?;
    response::ok(&applications)
}

/// The caller's own most recent application.
pub async fn find_for_applicant(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(email): Path<String>,
) -> Result<Response> {
    validate_email(&email)?;
    state.policy.check(&caller, Requirement::Owner(Some(&email))).await?;

    let application = state.applications.find_for_applicant(&email).await?;
    response::ok(&application)
}

pub async fn decide(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<DecideRequest>,
) -> Result<Response> {
    let id = parse_id(&id, "application")?;
    let outcome = state.applications.decide(id, payload.status).await?;
    response::ok(&outcome)
}

pub async fn deactivate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = parse_id(&id, "application")?;
    let outcome = state.applications.deactivate(id).await?;
    response::ok(&outcome)
}
