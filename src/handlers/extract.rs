//! Request extractors whose rejections render as `AppError`.
//!
//! Drop-in replacements for axum's `Json`, `Query` and `Path`: a malformed
//! body, query string or path segment answers 400 with an `{error}` body
//! instead of axum's plain-text 400/422.

use std::convert::Infallible;

use axum::{
    extract::{FromRequest, FromRequestParts},
    http::request::Parts,
};

use crate::{error::AppError, models::caller::Caller};

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct Query<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct Path<T>(pub T);

/// The caller resolved by `optional_auth`, if any.
pub struct MaybeCaller(pub Option<Caller>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeCaller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Caller>().cloned()))
    }
}
