use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    error::AppError,
    models::caller::Caller,
    services::access::Requirement,
    state::AppState,
};

async fn require(
    state: &AppState,
    requirement: Requirement<'static>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(caller) = request.extensions().get::<Caller>().cloned() else {
        return AppError::Unauthenticated("Unauthorized access".to_string()).into_response();
    };

    match state.policy.check(&caller, requirement).await {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

/// Layered after `require_auth`; passes admins only.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    require(&state, Requirement::Admin, request, next).await
}

/// Layered after `require_auth`; passes tutors only.
pub async fn require_tutor(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    require(&state, Requirement::Tutor, request, next).await
}
