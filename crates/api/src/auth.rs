//! Access-token validation
//!
//! The API only validates HS256 access tokens; issuing them is the identity
//! service's job. Tokens carry the user id and role, which is everything the
//! engine needs to route a request.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use chatline_shared::UserRole;

use crate::{error::ApiError, state::AppState};

/// JWT claims structure for Chatline access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// User role
    pub role: String,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
}

/// The authenticated caller, attached as a request extension
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_agent(&self) -> bool {
        self.role.is_agent()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token encoding failed: {0}")]
    Encoding(String),
    #[error("Invalid or expired token")]
    Invalid,
}

/// JWT manager for token operations
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Generate an access token (operational tooling and tests; the
    /// identity service issues the real ones with the same shape)
    pub fn generate_token(
        &self,
        user_id: Uuid,
        role: UserRole,
        expiry_hours: i64,
    ) -> Result<String, JwtError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: user_id,
            role: role.as_str().to_string(),
            iat: now.unix_timestamp(),
            exp: (now + Duration::hours(expiry_hours)).unix_timestamp(),
        };

        // Explicit algorithm prevents algorithm confusion attacks
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    /// Validate an access token and return its claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| JwtError::Invalid)
    }

    /// Validate a token into the engine-facing caller identity
    pub fn authenticate(&self, token: &str) -> Result<AuthUser, JwtError> {
        let claims = self.validate_token(token)?;
        let role: UserRole = claims.role.parse().map_err(|_| JwtError::Invalid)?;
        Ok(AuthUser {
            user_id: claims.sub,
            role,
        })
    }
}

/// Middleware: require a valid `Authorization: Bearer` token
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let auth_user = state.jwt.authenticate(token).map_err(|e| {
        tracing::debug!(error = %e, "token validation failed");
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(auth_user);
    Ok(next.run(req).await)
}
