use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{AppendHeaders, IntoResponse};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{clear_session_cookie, hash_password, AuthUser};
use crate::error::ApiError;
use crate::store::UserChanges;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/update/:id", post(update_user))
        .route("/delete/:id", delete(delete_user))
        .route("/listing/:id", get(user_listings))
        .route("/:id", get(get_user))
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub avatar: Option<String>,
}

async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.ensure_is(&id, "You can only update your own account")?;
    let password_hash = match req.password.as_deref() {
        Some(password) => Some(
            hash_password(password)
                .map_err(|e| ApiError::InvalidState(format!("could not hash password: {}", e)))?,
        ),
        None => None,
    };
    let changes = UserChanges {
        username: req.username,
        email: req.email,
        password_hash,
        avatar: req.avatar,
    };
    let user = state
        .store
        .update_user(&id, &changes)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    auth.ensure_is(&id, "You can only delete your own account")?;
    // Listings owned by the account are left in place, unreassigned.
    if !state.store.delete_user(&id)? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }
    log::info!("user deleted: {}", id);
    Ok((
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie())]),
        Json(json!({"success": true, "message": "User has been deleted"})),
    ))
}

async fn user_listings(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    auth.ensure_is(&id, "You can only view your own listings")?;
    let listings = state.store.listings_by_owner(&id)?;
    Ok(Json(listings))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .store
        .user_by_id(&id)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    // The credential hash is marked skip_serializing on the model.
    Ok(Json(user))
}
