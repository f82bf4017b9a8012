use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use super::DirectoryState;
use crate::{
    config::{AppConfig, Env},
    models::Identity,
};

/// Name of the cookie carrying the signed session.
pub const SESSION_COOKIE: &str = "portal_session";
/// Lifetime of an issued session.
pub const SESSION_TTL_SECS: u64 = 8 * 60 * 60;

/// Claims
///
/// Payload of the session token. Carries no role; the role is looked up in the
/// directory on every request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the identity's UUID.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

/// issue_session
///
/// Signs a session token for `user_id` with the configured secret.
pub fn issue_session(config: &AppConfig, user_id: Uuid) -> Result<String, jsonwebtoken::errors::Error> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();

    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + SESSION_TTL_SECS) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

/// Set-Cookie value for a freshly issued session.
pub fn session_cookie(token: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, SESSION_TTL_SECS
    )
}

/// Set-Cookie value that clears the session.
pub fn cleared_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

/// SessionUser
///
/// Resolved identity of a request to the development API. Rejects with 401 when no
/// valid session is present.
#[derive(Debug, Clone)]
pub struct SessionUser(pub Identity);

impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
    DirectoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // 1. Dependency Resolution
        let directory = DirectoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        // 2. Local Development Bypass
        // In Env::Local a known user id in 'x-user-id' stands in for a session.
        if config.env == Env::Local {
            let bypass = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| Uuid::parse_str(raw).ok())
                .and_then(|id| directory.find_by_id(id));
            if let Some(user) = bypass {
                return Ok(SessionUser(user.clone()));
            }
        }

        // 3. Cookie Extraction
        let token = parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|raw| raw.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value.to_string())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        // 4. Decode and Validate
        let mut validation = Validation::default();
        validation.validate_exp = true;
        let token_data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!(error = %e, "rejected session token");
            StatusCode::UNAUTHORIZED
        })?;

        // 5. Directory Lookup
        // A token for an account that no longer exists is not a session.
        let user = directory
            .find_by_id(token_data.claims.sub)
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(SessionUser(user.clone()))
    }
}
