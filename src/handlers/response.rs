use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::{AppError, Result};

/// Renders `body` with sonic-rs.
pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Result<Response> {
    let body = sonic_rs::to_string(body)
        .map_err(|e| AppError::Internal(format!("Response serialization failed: {}", e)))?;

    Ok((status, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}

pub fn ok<T: Serialize>(body: &T) -> Result<Response> {
    json(StatusCode::OK, body)
}

pub fn created<T: Serialize>(body: &T) -> Result<Response> {
    json(StatusCode::CREATED, body)
}
