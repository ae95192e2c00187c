use axum::{Extension, extract::State, response::Response};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::Result,
    handlers::{extract::Json, response},
    models::caller::Caller,
    state::AppState,
};

/// The amount is never taken from the client.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentRequest {
    pub session_id: Uuid,
}

pub async fn create_payment_intent(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<PaymentIntentRequest>,
) -> Result<Response> {
    let intent = state.checkout.create_intent(payload.session_id).await?;
    tracing::debug!(caller = %caller.email, session = %payload.session_id, "payment intent handed out");
    response::ok(&intent)
}
