use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::AppState;

pub const SESSION_COOKIE: &str = "access_token";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User id
    pub exp: usize,  // Expiration time
}

pub fn create_token(user_id: &str, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(24))
        .expect("valid timestamp")
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

pub fn validate_token(token: &str, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims.sub)
}

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// `Set-Cookie` value carrying a fresh session token.
pub fn session_cookie(token: &str) -> String {
    format!("{}={}; HttpOnly; Path=/; SameSite=Lax", SESSION_COOKIE, token)
}

/// `Set-Cookie` value that expires the session cookie immediately.
pub fn clear_session_cookie() -> String {
    format!("{}=; HttpOnly; Path=/; Max-Age=0", SESSION_COOKIE)
}

/// The verified identity of the requester, taken from the session cookie.
///
/// Acting identity is always derived from the token; user ids supplied in
/// request bodies or paths are cross-checked against this and never trusted
/// on their own.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl AuthUser {
    /// Rejects a client-asserted user id that disagrees with the session.
    pub fn ensure_is(&self, user_id: &str, message: &str) -> Result<(), ApiError> {
        if self.0 != user_id {
            return Err(ApiError::Unauthorized(message.to_string()));
        }
        Ok(())
    }
}

fn cookie_value(parts: &Parts, name: &str) -> Option<String> {
    let raw = parts.headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = cookie_value(parts, SESSION_COOKIE)
            .ok_or_else(|| ApiError::Unauthorized("Unauthorized".to_string()))?;
        let user_id = validate_token(&token, &state.config.jwt_secret)
            .map_err(|_| ApiError::Unauthorized("Forbidden".to_string()))?;
        Ok(AuthUser(user_id))
    }
}
