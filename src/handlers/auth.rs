use axum::{extract::State, response::Response};
use garde::Validate;
use serde::Deserialize;
use tower_cookies::cookie::time::Duration;
use tower_cookies::{Cookie, Cookies};

use crate::{
    error::Result,
    handlers::{extract::Json, response},
    middleware_layer::auth::TOKEN_COOKIE,
    state::AppState,
};

/// The request payload for token issuance.
#[derive(Deserialize, Debug, Validate)]
pub struct TokenRequest {
    #[garde(email)]
    pub email: String,
}

/// Creates the HTTP-only identity cookie.
fn create_secure_cookie(value: String, max_age_secs: i64, production: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(TOKEN_COOKIE, value);

    cookie.set_http_only(true);
    if production {
        cookie.set_secure(true);
    }
    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_max_age(Duration::seconds(max_age_secs));
    cookie.set_path("/");

    cookie
}

/// Signs an identity token for the email and sets it as a cookie.
///
/// The email is taken as proven: identity is verified by the sign-in
/// provider before the client calls this, and every 401/403 gate trusts it.
pub async fn issue_token(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<TokenRequest>,
) -> Result<Response> {
    payload.validate()?;

    let (token, expires_at) = state.tokens.issue(&payload.email)?;
    if state.users.touch_last_login(&payload.email).await? {
        tracing::debug!(email = %payload.email, "last login updated on token issuance");
    }

    cookies.add(create_secure_cookie(
        token,
        state.tokens.validity().num_seconds(),
        state.config.production,
    ));
    tracing::info!(email = %payload.email, %expires_at, "identity token issued");

    response::ok(&sonic_rs::json!({ "success": true }))
}

/// Clears the identity cookie.
pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> Result<Response> {
    let mut cookie = create_secure_cookie(String::new(), 0, state.config.production);
    cookie.set_max_age(Duration::seconds(0));
    cookies.remove(cookie);

    tracing::debug!("identity cookie cleared");
    response::ok(&sonic_rs::json!({ "success": true }))
}
