use axum::{
    Router,
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, patch, post},
};
use http::{Method, header};
use std::sync::Arc;
use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    error::{AppError, Result},
    handlers,
    middleware_layer::{auth::{optional_auth, require_auth}, policy, rate_limit},
    state::AppState,
};

/// Largest accepted request body, in bytes.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Builds the HTTP API.
///
/// Gates are layered per route group: `require_auth` always runs first, then
/// the role gate or rate limit of the group.
pub fn build_router(state: AppState) -> Result<Router> {
    let origin = HeaderValue::from_str(&state.config.cors_origin)
        .map_err(|e| AppError::Internal(format!("Invalid CORS origin: {}", e)))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(50)
            .burst_size(200)
            .use_headers()
            .finish()
            .ok_or_else(|| AppError::Internal("Invalid governor configuration".to_string()))?,
    );

    let token_routes = Router::new()
        .route("/jwt", post(handlers::auth::issue_token))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::rate_limit_token))
        .with_state(state.clone());

    let public_routes = Router::new()
        .route("/logout", post(handlers::auth::logout))
        .route("/users", post(handlers::users::save_user))
        .route("/study-sessions", get(handlers::sessions::list_approved))
        .with_state(state.clone());

    let browse_routes = Router::new()
        .route("/study-sessions/{id}", get(handlers::sessions::get))
        .route_layer(from_fn_with_state(state.clone(), optional_auth))
        .with_state(state.clone());

    let apply_routes = Router::new()
        .route("/tutor-requests", post(handlers::applications::apply))
        .route_layer(from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_applications,
        ))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let authenticated_routes = Router::new()
        .route("/users/role/{email}", get(handlers::users::get_role))
        .route("/users/admin/{email}", get(handlers::users::is_admin))
        .route("/users/tutor/{email}", get(handlers::users::is_tutor))
        .route(
            "/tutor-requests/user/{email}",
            get(handlers::applications::find_for_applicant),
        )
        .route(
            "/study-sessions/tutor/{email}",
            get(handlers::sessions::list_by_tutor),
        )
        .route("/study-sessions/{id}", patch(handlers::sessions::update))
        .route(
            "/study-sessions/reapply/{id}",
            patch(handlers::sessions::reapply),
        )
        .route(
            "/rejections/{session_id}",
            get(handlers::sessions::rejections),
        )
        .route("/booked-sessions", post(handlers::bookings::book))
        .route("/booked-sessions/check", get(handlers::bookings::check))
        .route(
            "/booked-sessions/user/{email}",
            get(handlers::bookings::list_by_student),
        )
        .route(
            "/create-payment-intent",
            post(handlers::payments::create_payment_intent),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let tutor_routes = Router::new()
        .route("/study-sessions", post(handlers::sessions::create))
        .route_layer(from_fn_with_state(state.clone(), policy::require_tutor))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/users/role/{email}", patch(handlers::users::assign_role))
        .route("/users/role-sync/{email}", post(handlers::users::sync_role))
        .route("/tutor-requests", get(handlers::applications::list))
        .route("/tutor-requests/{id}", patch(handlers::applications::decide))
        .route(
            "/tutor-requests/deactivate/{id}",
            patch(handlers::applications::deactivate),
        )
        .route("/study-sessions/all", get(handlers::sessions::list_all))
        .route(
            "/study-sessions/approve/{id}",
            patch(handlers::sessions::approve),
        )
        .route(
            "/study-sessions/reject/{id}",
            patch(handlers::sessions::reject),
        )
        .route(
            "/study-sessions/{id}",
            axum::routing::delete(handlers::sessions::delete),
        )
        .route_layer(from_fn_with_state(state.clone(), policy::require_admin))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let app = Router::new()
        .merge(token_routes)
        .merge(public_routes)
        .merge(browse_routes)
        .merge(apply_routes)
        .merge(authenticated_routes)
        .merge(tutor_routes)
        .merge(admin_routes)
        .layer(GovernorLayer::new(governor_conf))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors);

    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config, models::user::Role, repositories::store::UserRepository,
        services::payments::DisabledGateway,
    };
    use axum::{body::Body, extract::ConnectInfo, http::{Request, StatusCode}};
    use std::net::SocketAddr;
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState::in_memory(
            Config::for_memory(b"router_test_secret_0123456789abcdef"),
            Arc::new(DisabledGateway),
        )
    }

    fn app() -> Router {
        build_router(state()).unwrap()
    }

    fn json_request(method: Method, uri: &str, body: &'static str) -> Request<Body> {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        request
    }

    async fn assert_error_body(response: axum::response::Response, status: StatusCode) {
        assert_eq!(response.status(), status);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].as_str().is_some_and(|msg| !msg.is_empty()));
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        request
    }

    #[tokio::test]
    async fn catalogue_is_public() {
        let response = app()
            .oneshot(request(Method::GET, "/study-sessions"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn gated_routes_require_a_token() {
        for (method, uri) in [
            (Method::GET, "/tutor-requests"),
            (Method::POST, "/study-sessions"),
            (Method::GET, "/booked-sessions/user/a@x.com"),
            (Method::DELETE, "/study-sessions/00000000-0000-0000-0000-000000000000"),
        ] {
            let response = app().oneshot(request(method, uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[tokio::test]
    async fn forged_token_is_rejected() {
        let mut req = request(Method::GET, "/users/role/a@x.com");
        req.headers_mut()
            .insert(header::COOKIE, HeaderValue::from_static("token=not.a.jwt"));
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_bodies_answer_with_an_error_document() {
        for body in ["{}", r#"{"email":5}"#, "not json"] {
            let response = app()
                .oneshot(json_request(Method::POST, "/users", body))
                .await
                .unwrap();
            assert_error_body(response, StatusCode::BAD_REQUEST).await;
        }
    }

    #[tokio::test]
    async fn unknown_decision_status_is_a_bad_request() {
        let state = state();
        state
            .store
            .users
            .upsert_role("admin@x.com", Role::Admin)
            .await
            .unwrap();
        let (token, _) = state.tokens.issue("admin@x.com").unwrap();
        let app = build_router(state).unwrap();

        let mut req = json_request(
            Method::PATCH,
            "/tutor-requests/00000000-0000-0000-0000-000000000000",
            r#"{"status":"bogus"}"#,
        );
        req.headers_mut().insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("token={}", token)).unwrap(),
        );
        let response = app.oneshot(req).await.unwrap();
        assert_error_body(response, StatusCode::BAD_REQUEST).await;
    }

    #[tokio::test]
    async fn bad_query_values_are_bad_requests() {
        let response = app()
            .oneshot(request(Method::GET, "/study-sessions?page=first"))
            .await
            .unwrap();
        assert_error_body(response, StatusCode::BAD_REQUEST).await;
    }

    #[tokio::test]
    async fn unapproved_session_is_hidden_from_anonymous_callers() {
        let state = state();
        let session = state
            .sessions
            .create(crate::models::study_session::NewSession {
                tutor_email: "t@x.com".to_string(),
                tutor_name: None,
                title: "Algebra 101".to_string(),
                description: None,
                registration_window: window(1, 7),
                class_window: window(8, 30),
                duration_minutes: 60,
            })
            .await
            .unwrap();
        let app = build_router(state).unwrap();

        let response = app
            .oneshot(request(Method::GET, &format!("/study-sessions/{}", session.id)))
            .await
            .unwrap();
        assert_error_body(response, StatusCode::NOT_FOUND).await;
    }

    fn window(from_days: i64, to_days: i64) -> crate::models::study_session::TimeWindow {
        let now = chrono::Utc::now();
        crate::models::study_session::TimeWindow {
            start: now + chrono::Duration::days(from_days),
            end: now + chrono::Duration::days(to_days),
        }
    }
}
