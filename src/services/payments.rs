use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::{
    error::{AppError, Result},
    models::study_session::{SessionStatus, StudySession},
    services::sessions::SessionLifecycle,
};

/// External payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Returns the client secret of a new payment intent.
    async fn create_payment_intent(&self, amount_minor_units: i64, currency: &str) -> Result<String>;
}

/// Stripe `POST /v1/payment_intents`.
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: Zeroizing<String>,
}

#[derive(Deserialize)]
struct StripeIntent {
    client_secret: String,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(api_base: String, secret_key: Zeroizing<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key,
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_payment_intent(&self, amount_minor_units: i64, currency: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(self.secret_key.as_str())
            .form(&[
                ("amount", amount_minor_units.to_string()),
                ("currency", currency.to_string()),
                ("payment_method_types[]", "card".to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Payment(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| "no error message".to_string());
            return Err(AppError::Payment(format!("{}: {}", status, message)));
        }

        let intent: StripeIntent = response
            .json()
            .await
            .map_err(|e| AppError::Payment(format!("Malformed response: {}", e)))?;
        Ok(intent.client_secret)
    }
}

/// Stands in when no gateway credentials are configured.
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn create_payment_intent(&self, _amount_minor_units: i64, _currency: &str) -> Result<String> {
        Err(AppError::Payment("Payment gateway is not configured".to_string()))
    }
}

/// Payment intent handed back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub client_secret: String,
    pub amount: i64,
    pub currency: String,
}

/// Converts a fee in major units to minor units, rounding to the nearest cent.
pub fn minor_units(fee: f64) -> i64 {
    (fee * 100.0).round() as i64
}

/// Prices bookings from the session's approved fee.
#[derive(Clone)]
pub struct Checkout {
    gateway: Arc<dyn PaymentGateway>,
    sessions: SessionLifecycle,
    currency: String,
}

impl Checkout {
    pub fn new(gateway: Arc<dyn PaymentGateway>, sessions: SessionLifecycle, currency: String) -> Self {
        Self {
            gateway,
            sessions,
            currency,
        }
    }

    fn amount_for(session: &StudySession) -> Result<i64> {
        if session.status != SessionStatus::Approved {
            return Err(AppError::Conflict(format!(
                "Session is {} and cannot be paid for",
                session.status
            )));
        }
        match session.registration_fee.map(minor_units) {
            Some(amount) if amount > 0 => Ok(amount),
            _ => Err(AppError::Validation("Session is free; no payment needed".to_string())),
        }
    }

    pub async fn create_intent(&self, session_id: Uuid) -> Result<PaymentIntent> {
        let session = self.sessions.get(session_id).await?;
        let amount = Self::amount_for(&session)?;

        let client_secret = self
            .gateway
            .create_payment_intent(amount, &self.currency)
            .await?;
        tracing::info!(session = %session_id, amount, currency = %self.currency, "payment intent created");

        Ok(PaymentIntent {
            client_secret,
            amount,
            currency: self.currency.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::study_session::{NewSession, TimeWindow},
        repositories::store::Store,
    };
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingGateway {
        calls: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl PaymentGateway for RecordingGateway {
        async fn create_payment_intent(&self, amount: i64, currency: &str) -> Result<String> {
            self.calls.lock().unwrap().push((amount, currency.to_string()));
            Ok(format!("pi_{}_secret", amount))
        }
    }

    async fn approved_session(lifecycle: &SessionLifecycle, fee: Option<f64>) -> Uuid {
        let now = Utc::now();
        let window = TimeWindow {
            start: now,
            end: now + Duration::days(1),
        };
        let session = lifecycle
            .create(NewSession {
                tutor_email: "t@x.com".to_string(),
                tutor_name: None,
                title: format!("Course {}", Uuid::new_v4()),
                description: None,
                registration_window: window,
                class_window: window,
                duration_minutes: 45,
            })
            .await
            .unwrap();
        if let Some(fee) = fee {
            lifecycle.approve(session.id, fee).await.unwrap();
        }
        session.id
    }

    #[test]
    fn minor_units_rounds_to_cents() {
        assert_eq!(minor_units(25.0), 2500);
        assert_eq!(minor_units(19.999), 2000);
        assert_eq!(minor_units(0.1 + 0.2), 30);
    }

    #[tokio::test]
    async fn intent_amount_comes_from_the_approved_fee() {
        let lifecycle = SessionLifecycle::new(Store::memory().sessions);
        let gateway = Arc::new(RecordingGateway::default());
        let checkout = Checkout::new(gateway.clone(), lifecycle.clone(), "usd".to_string());

        let paid = approved_session(&lifecycle, Some(25.0)).await;
        let intent = checkout.create_intent(paid).await.unwrap();
        assert_eq!(intent.amount, 2500);
        assert_eq!(intent.client_secret, "pi_2500_secret");
        assert_eq!(gateway.calls.lock().unwrap().as_slice(), &[(2500, "usd".to_string())]);
    }

    #[tokio::test]
    async fn free_and_pending_sessions_are_refused() {
        let lifecycle = SessionLifecycle::new(Store::memory().sessions);
        let checkout = Checkout::new(
            Arc::new(RecordingGateway::default()),
            lifecycle.clone(),
            "usd".to_string(),
        );

        let free = approved_session(&lifecycle, Some(0.0)).await;
        assert!(matches!(
            checkout.create_intent(free).await,
            Err(AppError::Validation(_))
        ));

        let pending = approved_session(&lifecycle, None).await;
        assert!(matches!(
            checkout.create_intent(pending).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn disabled_gateway_fails_loudly() {
        let result = DisabledGateway.create_payment_intent(100, "usd").await;
        assert!(matches!(result, Err(AppError::Payment(_))));
    }
}
