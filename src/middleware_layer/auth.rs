use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;

use crate::{error::AppError, state::AppState};

/// Name of the cookie holding the identity token.
pub const TOKEN_COOKIE: &str = "token";

/// Reads the token from the cookie, falling back to an `Authorization: Bearer` header.
fn extract_token(cookies: &Cookies, request: &Request<Body>) -> Option<String> {
    cookies
        .get(TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .or_else(|| {
            request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::to_string)
        })
        .filter(|token| !token.is_empty())
}

/// A middleware that requires a valid identity token.
///
/// On success the resolved `Caller` is inserted into the request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_token(&cookies, &request) else {
        tracing::debug!("No identity token on request");
        return AppError::Unauthenticated("Unauthorized access".to_string()).into_response();
    };

    let caller = match state.tokens.verify(&token) {
        Ok(caller) => caller,
        Err(e) => return e.into_response(),
    };

    tracing::debug!(caller = %caller.email, "Caller authenticated");
    request.extensions_mut().insert(caller);

    next.run(request).await
}

/// Resolves the caller when a valid token is present, for routes that are
/// public but show more to owners and admins. A missing or invalid token
/// leaves the request anonymous.
pub async fn optional_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(token) = extract_token(&cookies, &request) {
        match state.tokens.verify(&token) {
            Ok(caller) => {
                request.extensions_mut().insert(caller);
            }
            Err(e) => tracing::debug!("Ignoring invalid token on public route: {}", e),
        }
    }

    next.run(request).await
}
