use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{AppendHeaders, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{clear_session_cookie, create_token, hash_password, session_cookie, verify_password};
use crate::error::ApiError;
use crate::models::User;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/signin", post(signin))
        .route("/google", post(google))
        .route("/signout", get(signout))
}

#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let hash = hash_password(&req.password)
        .map_err(|e| ApiError::InvalidState(format!("could not hash password: {}", e)))?;
    let user = User::new(req.username, req.email, hash);
    state.store.create_user(&user)?;
    log::info!("new user signed up: {}", user.id);
    Ok((
        StatusCode::CREATED,
        Json(json!({"success": true, "message": "User created successfully"})),
    ))
}

#[derive(Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

async fn signin(
    State(state): State<AppState>,
    Json(req): Json<SigninRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .store
        .user_by_email(&req.email)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::Unauthorized("Wrong credentials".to_string()));
    }
    let token = create_token(&user.id, &state.config.jwt_secret)
        .map_err(|_| ApiError::Unauthorized("could not issue session token".to_string()))?;
    Ok((
        AppendHeaders([(header::SET_COOKIE, session_cookie(&token))]),
        Json(user),
    ))
}

#[derive(Deserialize)]
pub struct GoogleRequest {
    pub name: String,
    pub email: String,
    pub photo: Option<String>,
}

fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

/// Federated sign-in: the identity provider already verified the email, so we
/// either match an existing account or mint one with generated credentials.
async fn google(
    State(state): State<AppState>,
    Json(req): Json<GoogleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = match state.store.user_by_email(&req.email)? {
        Some(user) => user,
        None => {
            let username = format!(
                "{}{}",
                req.name.split_whitespace().collect::<String>().to_lowercase(),
                random_suffix(4)
            );
            let generated_password = random_suffix(16);
            let hash = hash_password(&generated_password)
                .map_err(|e| ApiError::InvalidState(format!("could not hash password: {}", e)))?;
            let mut user = User::new(username, req.email, hash);
            if let Some(photo) = req.photo {
                user.avatar = photo;
            }
            state.store.create_user(&user)?;
            log::info!("new user created via federated sign-in: {}", user.id);
            user
        }
    };
    let token = create_token(&user.id, &state.config.jwt_secret)
        .map_err(|_| ApiError::Unauthorized("could not issue session token".to_string()))?;
    Ok((
        AppendHeaders([(header::SET_COOKIE, session_cookie(&token))]),
        Json(user),
    ))
}

async fn signout() -> impl IntoResponse {
    (
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie())]),
        Json(json!({"success": true, "message": "User has been logged out"})),
    )
}
