use axum::{Extension, extract::State, response::Response};
use garde::Validate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::Result,
    handlers::{
        extract::{Json, Path, Query},
        response,
    },
    models::{caller::Caller, outcome::InsertOutcome, page::PageRequest},
    services::access::Requirement,
    state::AppState,
    validation::params::validate_email,
};

/// The request payload for booking a session. The student is the caller.
#[derive(Deserialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BookRequest {
    #[garde(skip)]
    pub session_id: Uuid,
    /// Accepted for compatibility; must match the caller when present.
    #[garde(email)]
    pub student_email: Option<String>,
    #[garde(length(max = 255))]
    pub payment_ref: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CheckQuery {
    pub session_id: Uuid,
    pub student_email: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn book(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<BookRequest>,
) -> Result<Response> {
    payload.validate()?;
    if let Some(student) = payload.student_email.as_deref() {
        state.policy.check(&caller, Requirement::Owner(Some(student))).await?;
    }

    let booking = state
        .bookings
        .book(payload.session_id, &caller.email, payload.payment_ref)
        .await?;

    response::created(&InsertOutcome::new(booking.id))
}

/// Whether the student already holds a booking for the session.
pub async fn check(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<CheckQuery>,
) -> Result<Response> {
    let student = query.student_email.as_deref();
    state.policy.check(&caller, Requirement::Owner(student)).await?;

    let booked = state
        .bookings
        .check_existing(query.session_id, &caller.email)
        .await?;
    response::ok(&sonic_rs::json!({ "booked": booked }))
}

pub async fn list_by_student(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(email): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response> {
    validate_email(&email)?;
    state.policy.check(&caller, Requirement::Owner(Some(&email))).await?;

    let page = state
        .bookings
        .list_by_student(&email, PageRequest::new(query.page, query.limit))
        .await?;
    response::ok(&page)
}
