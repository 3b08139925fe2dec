use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::payment;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create-payment-intent/:listingId", post(create_payment_intent))
        .route("/confirm-payment/:paymentIntentId", post(confirm_payment))
        .route("/purchased-listings/:userId", get(purchased_listings))
        .route("/sold-listings/:userId", get(sold_listings))
        .route("/refund/:listingId", post(refund_payment))
}

/// Legacy body shape: clients still send `userId`, but the acting identity is
/// the session's. A mismatching id is rejected rather than trusted.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserIdBody {
    pub user_id: Option<String>,
}

fn actor(auth: &AuthUser, body: &UserIdBody) -> Result<String, ApiError> {
    if let Some(user_id) = &body.user_id {
        auth.ensure_is(user_id, "User does not match the authenticated session")?;
    }
    Ok(auth.0.clone())
}

async fn create_payment_intent(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(listing_id): Path<String>,
    Json(body): Json<UserIdBody>,
) -> Result<impl IntoResponse, ApiError> {
    let buyer_id = actor(&auth, &body)?;
    let created = payment::create_payment_intent(
        state.store.as_ref(),
        state.payments.as_deref(),
        &listing_id,
        &buyer_id,
    )
    .await?;
    log::info!("payment intent {} created for listing {}", created.payment_intent_id, listing_id);
    Ok(Json(created))
}

async fn confirm_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(intent_id): Path<String>,
    Json(body): Json<UserIdBody>,
) -> Result<impl IntoResponse, ApiError> {
    let buyer_id = actor(&auth, &body)?;
    payment::confirm_payment(
        state.store.as_ref(),
        state.payments.as_deref(),
        &intent_id,
        &buyer_id,
    )
    .await?;
    log::info!("payment intent {} confirmed by {}", intent_id, buyer_id);
    Ok(Json(json!({
        "success": true,
        "message": "Purchase completed successfully"
    })))
}

async fn purchased_listings(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    auth.ensure_is(&user_id, "You can only view your own purchases")?;
    let listings = payment::purchased_listings(state.store.as_ref(), &user_id)?;
    Ok(Json(listings))
}

async fn sold_listings(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    auth.ensure_is(&user_id, "You can only view your own sales")?;
    let listings = payment::sold_listings(state.store.as_ref(), &user_id)?;
    Ok(Json(listings))
}

async fn refund_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(listing_id): Path<String>,
    Json(body): Json<UserIdBody>,
) -> Result<impl IntoResponse, ApiError> {
    let requester_id = actor(&auth, &body)?;
    let refund_id = payment::refund_payment(
        state.store.as_ref(),
        state.payments.as_deref(),
        &listing_id,
        &requester_id,
    )
    .await?;
    log::info!("refund {} issued for listing {}", refund_id, listing_id);
    Ok(Json(json!({
        "success": true,
        "message": "Refund processed successfully",
        "refundId": refund_id
    })))
}
