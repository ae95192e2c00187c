use axum::{Extension, extract::State, response::Response};
use garde::Validate;
use serde::Deserialize;

use crate::{
    error::{AppError, Result},
    handlers::{
        extract::{Json, MaybeCaller, Path, Query},
        response,
    },
    models::{
        caller::Caller,
        outcome::InsertOutcome,
        page::PageRequest,
        study_session::{NewSession, SessionChanges, SessionStatus, TimeWindow},
        user::Role,
    },
    services::access::Requirement,
    state::AppState,
    validation::params::{parse_id, parse_status, validate_email},
};

/// The request payload for submitting a session. The tutor is the caller.
#[derive(Deserialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[garde(length(min = 1, max = 200))]
    pub title: String,
    #[garde(length(max = 5000))]
    pub description: Option<String>,
    #[garde(length(max = 200))]
    pub tutor_name: Option<String>,
    #[garde(skip)]
    pub registration_window: TimeWindow,
    #[garde(skip)]
    pub class_window: TimeWindow,
    #[garde(range(min = 1, max = 1440))]
    pub duration_minutes: i32,
}

/// A partial edit. Absent fields stay as they are.
#[derive(Deserialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    #[garde(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[garde(length(max = 5000))]
    pub description: Option<String>,
    #[garde(skip)]
    pub registration_window: Option<TimeWindow>,
    #[garde(skip)]
    pub class_window: Option<TimeWindow>,
    #[garde(range(min = 1, max = 1440))]
    pub duration_minutes: Option<i32>,
    #[garde(range(min = 0.0))]
    pub registration_fee: Option<f64>,
}

#[derive(Deserialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    #[garde(range(min = 0.0))]
    pub registration_fee: f64,
}

#[derive(Deserialize, Debug, Validate)]
pub struct RejectRequest {
    #[garde(length(min = 1, max = 2000))]
    pub reason: String,
    #[garde(length(max = 5000))]
    pub feedback: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Deserialize, Debug)]
pub struct AdminListQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Response> {
    payload.validate()?;

    let session = state
        .sessions
        .create(NewSession {
            tutor_email: caller.email,
            tutor_name: payload.tutor_name,
            title: payload.title,
            description: payload.description,
            registration_window: payload.registration_window,
            class_window: payload.class_window,
            duration_minutes: payload.duration_minutes,
        })
        .await?;

    response::created(&InsertOutcome::new(session.id))
}

/// Public catalogue of approved sessions.
pub async fn list_approved(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Response> {
    let page = state
        .sessions
        .list_approved(PageRequest::new(query.page, query.limit))
        .await?;
    response::ok(&page)
}

/// Admin view by status, pending when unspecified.
pub async fn list_all(
    State(state): State<AppState>,
    Query(query): Query<AdminListQuery>,
) -> Result<Response> {
    let status = parse_status::<SessionStatus>(query.status.as_deref())?
        .unwrap_or(SessionStatus::Pending);
    let page = state
        .sessions
        .list_by_status(status, PageRequest::new(query.page, query.limit))
        .await?;
    response::ok(&page)
}

pub async fn list_by_tutor(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(email): Path<String>,
) -> Result<Response> {
    validate_email(&email)?;
    state.policy.check(&caller, Requirement::Owner(Some(&email))).await?;

    let sessions = state.sessions.list_by_tutor(&email).await?;
    response::ok(&sessions)
}

/// A single session. Sessions that are not approved are visible only to
/// their tutor and to admins; anyone else gets `NotFound`.
pub async fn get(
    State(state): State<AppState>,
    MaybeCaller(caller): MaybeCaller,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = parse_id(&id, "session")?;
    let session = state.sessions.get(id).await?;

    if session.status != SessionStatus::Approved {
        let Some(caller) = caller else {
            return Err(AppError::NotFound("Session"));
        };
        match state
            .policy
            .check_owner_or_admin(&caller, &session.tutor_email)
            .await
        {
            Ok(_) => {}
            Err(AppError::Forbidden(_)) => return Err(AppError::NotFound("Session")),
            Err(e) => return Err(e),
        }
    }

    response::ok(&session)
}

/// Edits a session. The owning tutor and admins may edit, under different rules.
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateSessionRequest>,
) -> Result<Response> {
    payload.validate()?;
    let id = parse_id(&id, "session")?;

    let session = state.sessions.get(id).await?;
    let editor = match state
        .policy
        .check_owner_or_admin(&caller, &session.tutor_email)
        .await?
    {
        Role::Admin => Role::Admin,
        Role::Tutor => Role::Tutor,
        Role::Student => {
            return Err(AppError::Forbidden("Tutor role required".to_string()));
        }
    };

    let changes = SessionChanges {
        title: payload.title,
        description: payload.description,
        registration_window: payload.registration_window,
        class_window: payload.class_window,
        duration_minutes: payload.duration_minutes,
        registration_fee: payload.registration_fee,
    };

    let outcome = state.sessions.update(id, changes, editor).await?;
    response::ok(&outcome)
}

pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ApproveRequest>,
) -> Result<Response> {
    payload.validate()?;
    let id = parse_id(&id, "session")?;

    let outcome = state.sessions.approve(id, payload.registration_fee).await?;
    response::ok(&outcome)
}

pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<RejectRequest>,
) -> Result<Response> {
    payload.validate()?;
    let id = parse_id(&id, "session")?;

    let record = state
        .sessions
        .reject(id, &payload.reason, payload.feedback)
        .await?;
    response::created(&record)
}

/// Sends a rejected session back for review. Owning tutor only.
pub async fn reapply(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = parse_id(&id, "session")?;

    let session = state.sessions.get(id).await?;
    state
        .policy
        .check(&caller, Requirement::Owner(Some(&session.tutor_email)))
        .await?;
    state.policy.check(&caller, Requirement::Tutor).await?;

    let outcome = state.sessions.reapply(id).await?;
    response::ok(&outcome)
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let id = parse_id(&id, "session")?;
    let outcome = state.sessions.delete(id).await?;
    response::ok(&outcome)
}

/// Every rejection a session has received, oldest first.
pub async fn rejections(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response> {
    let session_id = parse_id(&session_id, "session")?;
    let records = state.sessions.rejections(session_id).await?;
    response::ok(&records)
}
