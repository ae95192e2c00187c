use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection could not be checked out of the pool.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// The pool could not be built.
    #[error("Pool creation error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A row was missing a column or held an unexpected type.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// No valid identity token accompanied the request.
    #[error("Authentication failed: {0}")]
    Unauthenticated(String),

    /// The caller is known but not allowed to perform the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A resource not found error.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A uniqueness or state precondition was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The payment gateway failed or is not configured.
    #[error("Payment gateway error: {0}")]
    Payment(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl From<garde::Report> for AppError {
    fn from(report: garde::Report) -> Self {
        AppError::Validation(report.to_string().trim().to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl AppError {
    /// The HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::CreatePool(_)
            | AppError::Redis(_)
            | AppError::MissingData(_)
            | AppError::Payment(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                "Database error".to_string()
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                "Database unavailable".to_string()
            }

            AppError::CreatePool(ref e) => {
                tracing::error!("Pool creation error: {}", e);
                "Database unavailable".to_string()
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                "Cache error".to_string()
            }

            AppError::MissingData(ref column) => {
                tracing::error!("Row decoding failed on column: {}", column);
                "Database error".to_string()
            }

            AppError::Unauthenticated(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                msg.clone()
            }

            AppError::Forbidden(ref msg) => {
                tracing::warn!("Authorization denied: {}", msg);
                msg.clone()
            }

            AppError::NotFound(what) => {
                tracing::debug!("{} not found", what);
                format!("{} not found", what)
            }

            AppError::Conflict(ref msg) => {
                tracing::warn!("Conflict: {}", msg);
                msg.clone()
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                msg.clone()
            }

            AppError::Payment(ref msg) => {
                tracing::error!("Payment gateway error: {}", msg);
                "Payment gateway error".to_string()
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }

            AppError::RateLimitExceeded(ref msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                msg.clone()
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (
            self.status(),
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}
