use deadpool_postgres::Pool;
use redis::aio::ConnectionManager;
use std::sync::Arc;

use crate::{
    config::{Config, StoreBackend},
    crypto::token::TokenSigner,
    error::{AppError, Result},
    repositories::store::Store,
    services::{
        access::AccessPolicy,
        applications::ApplicationRegistry,
        bookings::BookingLedger,
        payments::{Checkout, DisabledGateway, PaymentGateway, StripeGateway},
        sessions::SessionLifecycle,
        users::UserDirectory,
    },
};

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// The repositories, kept for administrative seeding.
    pub store: Store,
    /// The database connection pool, when backed by PostgreSQL.
    pub db: Option<Pool>,
    /// The Redis connection manager. Rate limiting is off without it.
    pub redis: Option<ConnectionManager>,
    pub tokens: TokenSigner,
    pub policy: AccessPolicy,
    pub users: UserDirectory,
    pub applications: ApplicationRegistry,
    pub sessions: SessionLifecycle,
    pub bookings: BookingLedger,
    pub checkout: Checkout,
}

impl AppState {
    /// Connects the configured backends and wires the services.
    pub async fn new(config: &Config) -> Result<Self> {
        let (store, db) = match config.store_backend {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .ok_or_else(|| AppError::Internal("DATABASE_URL is not set".to_string()))?;
                let pool = crate::db::create_pool(url)?;
                crate::db::ensure_schema(&pool).await?;
                tracing::info!("PostgreSQL pool initialized");
                (Store::postgres(pool.clone()), Some(pool))
            }
            StoreBackend::Memory => {
                tracing::warn!("Using the in-memory store; data is lost on restart");
                (Store::memory(), None)
            }
        };

        let redis = match config.redis_url.as_deref() {
            Some(url) => {
                let client = redis::Client::open(url)?;
                let manager = ConnectionManager::new(client).await?;
                tracing::info!("Redis connection manager initialized");
                Some(manager)
            }
            None => {
                tracing::warn!("REDIS_URL not set; rate limiting disabled");
                None
            }
        };

        let gateway: Arc<dyn PaymentGateway> = match &config.stripe_secret_key {
            Some(key) => Arc::new(StripeGateway::new(
                config.stripe_api_base.clone(),
                key.clone(),
            )),
            None => {
                tracing::warn!("STRIPE_SECRET_KEY not set; payment intents disabled");
                Arc::new(DisabledGateway)
            }
        };

        Ok(Self::assemble(config.clone(), store, db, redis, gateway))
    }

    /// State over the in-memory store, no Redis, and the given gateway.
    pub fn in_memory(config: Config, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self::assemble(config, Store::memory(), None, None, gateway)
    }

    fn assemble(
        config: Config,
        store: Store,
        db: Option<Pool>,
        redis: Option<ConnectionManager>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let tokens = TokenSigner::new(&config.jwt_secret, config.session_duration_days);
        let sessions = SessionLifecycle::new(store.sessions.clone());
        let checkout = Checkout::new(gateway, sessions.clone(), config.payment_currency.clone());

        Self {
            tokens,
            policy: AccessPolicy::new(store.users.clone()),
            users: UserDirectory::new(store.users.clone()),
            applications: ApplicationRegistry::new(
                store.applications.clone(),
                store.users.clone(),
            ),
            bookings: BookingLedger::new(store.bookings.clone(), store.sessions.clone()),
            sessions,
            checkout,
            store,
            db,
            redis,
            config,
        }
    }
}
