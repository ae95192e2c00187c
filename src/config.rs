use std::env;
use std::net::SocketAddr;
use anyhow::{Context, Result};
use zeroize::Zeroizing;

/// Minimum accepted length of the token signing secret, in bytes.
const MIN_JWT_SECRET_BYTES: usize = 32;

/// Which datastore adapter backs the repositories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The datastore adapter to use.
    pub store_backend: StoreBackend,
    /// The URL of the PostgreSQL database. Required for the postgres backend.
    pub database_url: Option<String>,
    /// The URL of the Redis server. Rate limiting is off without it.
    pub redis_url: Option<String>,
    /// The lifetime of an identity token in days.
    pub session_duration_days: i64,
    /// The HS256 secret used to sign identity tokens.
    pub jwt_secret: Zeroizing<Vec<u8>>,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// The browser origin allowed to send credentialed requests.
    pub cors_origin: String,
    /// Whether cookies are marked `Secure`.
    pub production: bool,
    /// Stripe secret key. Payments are disabled without it.
    pub stripe_secret_key: Option<Zeroizing<String>>,
    /// Base URL of the Stripe-compatible API.
    pub stripe_api_base: String,
    /// ISO currency code used for payment intents.
    pub payment_currency: String,
    /// Token issuances allowed per client IP per hour.
    pub token_requests_per_hour: u32,
    /// Tutor applications allowed per email per day.
    pub applications_per_day: u32,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env::var("JWT_SECRET")
            .context("JWT_SECRET must be set (generate with: openssl rand -hex 32)")?
            .into_bytes();

        if jwt_secret.len() < MIN_JWT_SECRET_BYTES {
            anyhow::bail!("JWT_SECRET must be at least {} bytes", MIN_JWT_SECRET_BYTES);
        }

        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .as_str()
        {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => anyhow::bail!("Unknown STORE_BACKEND: {}", other),
        };

        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when STORE_BACKEND=postgres");
        }

        Ok(Self {
            store_backend,
            database_url,
            redis_url: env::var("REDIS_URL").ok(),
            session_duration_days: env::var("SESSION_DURATION_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .context("Invalid SESSION_DURATION_DAYS")?,
            jwt_secret: Zeroizing::new(jwt_secret),
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:5000".to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            production: env::var("APP_ENV")
                .map(|v| v == "production")
                .unwrap_or(false),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").ok().map(Zeroizing::new),
            stripe_api_base: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            payment_currency: env::var("PAYMENT_CURRENCY")
                .unwrap_or_else(|_| "usd".to_string()),
            token_requests_per_hour: env::var("RATE_LIMIT_TOKENS_PER_HOUR")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid RATE_LIMIT_TOKENS_PER_HOUR")?,
            applications_per_day: env::var("RATE_LIMIT_APPLY_PER_DAY")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid RATE_LIMIT_APPLY_PER_DAY")?,
        })
    }

    /// A self-contained configuration backed by the in-memory store.
    pub fn for_memory(jwt_secret: &[u8]) -> Self {
        Self {
            store_backend: StoreBackend::Memory,
            database_url: None,
            redis_url: None,
            session_duration_days: 7,
            jwt_secret: Zeroizing::new(jwt_secret.to_vec()),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            cors_origin: "http://localhost:5173".to_string(),
            production: false,
            stripe_secret_key: None,
            stripe_api_base: "https://api.stripe.com".to_string(),
            payment_currency: "usd".to_string(),
            token_requests_per_hour: 60,
            applications_per_day: 5,
        }
    }
}
