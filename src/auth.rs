//! Bearer-token authentication
//!
//! Tokens are HS256 JWTs signed with the shared `JWT_SECRET`. They can arrive
//! in a cookie, an `Authorization: Bearer` header, or (for socket clients that
//! cannot set headers) a handshake field, checked in that order.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;
use crate::types::Participant;

pub const DEFAULT_COOKIE_NAME: &str = "token";

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Shared signing secret (None = every token is rejected)
    pub jwt_secret: Option<String>,
    /// Name of the cookie carrying the token
    pub cookie_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
        }
    }
}

impl AuthConfig {
    /// Load auth config from environment variables
    pub fn from_env() -> Self {
        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let cookie_name = std::env::var("AUTH_COOKIE_NAME")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string());

        if jwt_secret.is_some() {
            tracing::info!(cookie_name = %cookie_name, "Token authentication configured");
        } else {
            tracing::error!("JWT_SECRET is not set - every connection will be rejected!");
        }

        Self {
            jwt_secret,
            cookie_name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("no token presented")]
    Missing,
    #[error("token is malformed, expired or has a bad signature")]
    Invalid,
    #[error("token has been revoked")]
    Revoked,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Missing => "AUTH_MISSING",
            AuthError::Invalid => "AUTH_INVALID",
            AuthError::Revoked => "TOKEN_REVOKED",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "code": self.code(), "msg": self.to_string() });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Decoded JWT claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    pub exp: u64,
    /// Any issuer-specific claims, passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    /// Identity to stamp on outgoing messages.
    ///
    /// The id comes from `sub`, then a legacy `_id` claim, then the email.
    pub fn participant(&self) -> Option<Participant> {
        let id = self
            .sub
            .clone()
            .or_else(|| {
                self.extra
                    .get("_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .or_else(|| self.email.clone())?;
        let email = self.email.clone().unwrap_or_else(|| id.clone());
        Some(Participant { id, email })
    }
}

/// Stateless JWT verifier bound to one secret
#[derive(Clone)]
pub struct TokenValidator {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(secret: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        Self {
            key: secret.map(|s| DecodingKey::from_secret(s.as_bytes())),
            validation,
        }
    }

    /// Verify signature and expiry and return the claims
    pub fn validate(&self, raw_token: &str) -> Result<Claims, AuthError> {
        let Some(key) = &self.key else {
            return Err(AuthError::Invalid);
        };

        let claims = decode::<Claims>(raw_token, key, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token verification failed");
                AuthError::Invalid
            })?
            .claims;

        // A token must name a real, non-reserved identity
        match claims.participant() {
            Some(p) if !p.is_assistant() => Ok(claims),
            _ => {
                tracing::warn!("Token has no usable identity claim");
                Err(AuthError::Invalid)
            }
        }
    }
}

/// Pick the token from the accepted locations in precedence order:
/// cookie, `Authorization: Bearer`, handshake field. Empty values count as
/// absent.
pub fn pick_token(
    cookie: Option<&str>,
    authorization: Option<&str>,
    handshake: Option<&str>,
) -> Result<String, AuthError> {
    let bearer = authorization.and_then(|h| h.trim().strip_prefix("Bearer "));

    [cookie, bearer, handshake]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or(AuthError::Missing)
}

/// Token from the request's cookie or bearer header
pub fn token_from_request(
    jar: &CookieJar,
    headers: &HeaderMap,
    cookie_name: &str,
) -> Result<String, AuthError> {
    pick_token(
        jar.get(cookie_name).map(|c| c.value()),
        headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok()),
        None,
    )
}

/// Identity of an authenticated HTTP caller, stored in request extensions
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: Participant,
    pub claims: Claims,
    /// The raw token, kept so logout can revoke it
    pub token: String,
}

/// Middleware requiring a valid, unrevoked token on HTTP routes
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = token_from_request(&jar, request.headers(), state.gate.cookie_name())?;

    let claims = state.gate.authenticate(&token).await.map_err(|e| {
        tracing::warn!(reason = e.code(), path = %request.uri().path(), "Rejected HTTP request");
        e
    })?;

    let user = claims.participant().ok_or(AuthError::Invalid)?;
    request.extensions_mut().insert(AuthenticatedUser {
        user,
        claims,
        token,
    });

    Ok(next.run(request).await)
}
