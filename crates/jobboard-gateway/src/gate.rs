//! Handshake-time credential check for gateway connections.
//!
//! The gate runs once per upgrade request, before the socket is opened. An
//! admitted connection keeps the identity it was admitted with for its whole
//! lifetime; revoking or rotating a token does not close sockets that are
//! already open.

use axum::Json;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde_json::json;
use uuid::Uuid;

use jobboard_types::api::Claims;
use jobboard_types::models::Role;

/// Identity attached to an admitted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("authentication required")]
    Missing,
    #[error("invalid credential: {0}")]
    Invalid(&'static str),
}

impl GateError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Missing => "authentication_missing",
            Self::Invalid(_) => "authentication_invalid",
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let reason = match &self {
            Self::Missing => "no bearer credential presented",
            Self::Invalid(reason) => reason,
        };
        let body = json!({ "error": self.code(), "reason": reason });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Verifies HS256 bearer tokens against the shared secret.
#[derive(Clone)]
pub struct SessionGate {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for SessionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGate").finish()
    }
}

impl SessionGate {
    pub fn new(secret: &str) -> Self {
        // No clock-skew allowance: a token is refused as soon as `exp` has passed.
        let mut validation = Validation::default();
        validation.leeway = 0;

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Admit or reject one connection attempt.
    pub fn admit(&self, credential: Option<&str>) -> Result<Identity, GateError> {
        let token = credential
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(GateError::Missing)?;

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            GateError::Invalid(match e.kind() {
                ErrorKind::ExpiredSignature => "token expired",
                ErrorKind::InvalidSignature => "invalid signature",
                _ => "malformed token",
            })
        })?;

        Ok(data.claims.into())
    }

    /// Admit using the request's `Authorization: Bearer` header.
    pub fn admit_headers(&self, headers: &HeaderMap) -> Result<Identity, GateError> {
        self.admit(bearer_token(headers))
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header. The
/// scheme name is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim_start().split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token)
}
