use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;

use crate::{error::AppError, models::caller::Caller, state::AppState};

/// Extracts the peer IP address from the request extensions.
fn extract_real_ip(req: &Request<Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Returns the remaining TTL in seconds when `key` has reached `limit`.
///
/// Redis failures let the request through.
async fn exhausted(redis: &ConnectionManager, key: &str, limit: u32) -> Option<i64> {
    let count: Option<u32> = redis::cmd("GET")
        .arg(key)
        .query_async(&mut redis.clone())
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("Rate limit lookup failed for {}: {}", key, e);
            None
        });

    match count {
        Some(attempts) if attempts >= limit => {
            let ttl: Option<i64> = redis::cmd("TTL")
                .arg(key)
                .query_async(&mut redis.clone())
                .await
                .unwrap_or(None);
            Some(ttl.unwrap_or(0).max(0))
        }
        _ => None,
    }
}

async fn record_hit(redis: &ConnectionManager, key: &str, window_secs: u64) {
    let count: i64 = redis::cmd("INCR")
        .arg(key)
        .query_async(&mut redis.clone())
        .await
        .unwrap_or(0);

    if count == 1 {
        let _: () = redis::cmd("EXPIRE")
            .arg(key)
            .arg(window_secs)
            .query_async(&mut redis.clone())
            .await
            .unwrap_or(());
    }
}

/// Limits token issuance per client IP.
pub async fn rate_limit_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(redis) = state.redis.as_ref() else {
        return next.run(req).await;
    };

    let key = format!("rate_limit:jwt:{}", extract_real_ip(&req));

    if let Some(ttl) = exhausted(redis, &key, state.config.token_requests_per_hour).await {
        return AppError::RateLimitExceeded(format!(
            "Too many sign-in attempts. Try again in {} minutes",
            ttl / 60 + 1
        ))
        .into_response();
    }

    record_hit(redis, &key, 3600).await;
    next.run(req).await
}

/// Limits tutor applications per caller. Only accepted applications count.
pub async fn rate_limit_applications(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(redis) = state.redis.clone() else {
        return next.run(req).await;
    };

    let email = req
        .extensions()
        .get::<Caller>()
        .map(|caller| caller.email.clone())
        .unwrap_or_else(|| extract_real_ip(&req));
    let key = format!("rate_limit:apply:{}", email);

    if let Some(ttl) = exhausted(&redis, &key, state.config.applications_per_day).await {
        return AppError::RateLimitExceeded(format!(
            "Application limit exceeded. Try again in {} hours",
            ttl / 3600 + 1
        ))
        .into_response();
    }

    let response = next.run(req).await;

    if response.status().is_success() {
        record_hit(&redis, &key, 86400).await;
    }

    response
}
