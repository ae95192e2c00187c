use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    models::caller::Caller,
};

/// Claims carried by an identity token. The token binds an email only;
/// roles are never encoded.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signer and verifier for identity tokens.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validity: Duration,
}

impl TokenSigner {
    pub fn new(secret: &[u8], validity_days: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validity: Duration::days(validity_days),
        }
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Signs a token for `email`, returning it with its expiry.
    pub fn issue(&self, email: &str) -> Result<(String, DateTime<Utc>)> {
        self.issue_at(email, Utc::now())
    }

    fn issue_at(&self, email: &str, now: DateTime<Utc>) -> Result<(String, DateTime<Utc>)> {
        let expires_at = now + self.validity;
        let claims = Claims {
            sub: email.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Token signing failed: {}", e)))?;
        Ok((token, expires_at))
    }

    /// Verifies signature and expiry and resolves the caller.
    pub fn verify(&self, token: &str) -> Result<Caller> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| AppError::Unauthenticated(format!("Invalid token: {}", e)))?;

        let expires_at = Utc
            .timestamp_opt(data.claims.exp, 0)
            .single()
            .ok_or_else(|| AppError::Unauthenticated("Invalid token expiry".to_string()))?;

        if data.claims.sub.trim().is_empty() {
            return Err(AppError::Unauthenticated("Token has no subject".to_string()));
        }

        Ok(Caller {
            email: data.claims.sub,
            expires_at,
        })
    }
}
