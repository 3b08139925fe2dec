//! The purchase workflow: intent creation, confirmation, refund and the two
//! read-side queries. All state lives in the store and at the payment
//! processor; these functions only orchestrate.

use serde::Serialize;

use crate::error::ApiError;
use crate::models::{BuyerInfo, Listing, SoldListing};
use crate::store::Store;
use crate::stripe::{IntentMetadata, PaymentGateway};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentCreated {
    pub client_secret: String,
    pub payment_intent_id: String,
}

/// Charged amount in the processor's minor unit (cents). Uses the discount
/// price when an offer is active. Rounds half away from zero (`f64::round`).
pub fn amount_in_cents(listing: &Listing) -> i64 {
    let price = if listing.offer {
        listing.discount_price
    } else {
        listing.regular_price
    };
    (price * 100.0).round() as i64
}

fn require_gateway(
    gateway: Option<&dyn PaymentGateway>,
) -> Result<&dyn PaymentGateway, ApiError> {
    gateway.ok_or(ApiError::ServiceUnavailable)
}

pub async fn create_payment_intent(
    store: &dyn Store,
    gateway: Option<&dyn PaymentGateway>,
    listing_id: &str,
    buyer_id: &str,
) -> Result<IntentCreated, ApiError> {
    let gateway = require_gateway(gateway)?;

    let listing = store
        .listing_by_id(listing_id)?
        .ok_or_else(|| ApiError::NotFound("Listing not found".to_string()))?;
    if listing.is_sold {
        return Err(ApiError::InvalidState(
            "This listing has already been sold".to_string(),
        ));
    }
    if listing.user_ref == buyer_id {
        return Err(ApiError::InvalidState(
            "You cannot buy your own listing".to_string(),
        ));
    }
    let buyer = store
        .user_by_id(buyer_id)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let amount = amount_in_cents(&listing);

    // Provision the processor-side customer on first purchase, then reuse it.
    let customer_id = match buyer.stripe_customer_id {
        Some(id) => id,
        None => {
            let id = gateway.create_customer(&buyer.email, &buyer.username).await?;
            store.set_customer_id(&buyer.id, &id)?;
            id
        }
    };

    let intent = gateway
        .create_payment_intent(
            amount,
            &customer_id,
            IntentMetadata {
                listing_id: listing.id.clone(),
                user_id: buyer.id.clone(),
                listing_name: listing.name.clone(),
            },
        )
        .await?;

    store.set_payment_intent(&listing.id, &intent.id)?;

    let client_secret = intent.client_secret.ok_or_else(|| {
        ApiError::Payment(crate::stripe::PaymentError::Api(
            "intent returned without a client secret".to_string(),
        ))
    })?;
    Ok(IntentCreated {
        client_secret,
        payment_intent_id: intent.id,
    })
}

pub async fn confirm_payment(
    store: &dyn Store,
    gateway: Option<&dyn PaymentGateway>,
    intent_id: &str,
    buyer_id: &str,
) -> Result<(), ApiError> {
    let gateway = require_gateway(gateway)?;

    let intent = gateway.retrieve_payment_intent(intent_id).await?;
    if !intent.is_succeeded() {
        return Err(ApiError::InvalidState("Payment not completed".to_string()));
    }

    // The listing comes from the intent's own metadata so a tampered request
    // body cannot redirect which listing gets marked sold.
    let listing_id = intent.metadata.listing_id;
    let listing = store
        .listing_by_id(&listing_id)?
        .ok_or_else(|| ApiError::NotFound("Listing not found".to_string()))?;
    if listing.is_sold {
        return Err(ApiError::InvalidState(
            "This listing has already been sold".to_string(),
        ));
    }

    let sold_at = chrono::Utc::now().naive_utc();
    store.complete_purchase(&listing.id, buyer_id, sold_at)?;
    Ok(())
}

pub async fn refund_payment(
    store: &dyn Store,
    gateway: Option<&dyn PaymentGateway>,
    listing_id: &str,
    requester_id: &str,
) -> Result<String, ApiError> {
    let gateway = require_gateway(gateway)?;

    let listing = store
        .listing_by_id(listing_id)?
        .ok_or_else(|| ApiError::NotFound("Listing not found".to_string()))?;
    if listing.user_ref != requester_id {
        return Err(ApiError::Unauthorized(
            "You can only refund your own listings".to_string(),
        ));
    }
    if !listing.is_sold {
        return Err(ApiError::InvalidState(
            "This listing has not been sold".to_string(),
        ));
    }
    let intent_id = listing.payment_intent_id.as_deref().ok_or_else(|| {
        ApiError::InvalidState("No payment found for this listing".to_string())
    })?;

    let refund_id = gateway.create_refund(intent_id).await?;

    // Financial reversal only: the listing stays sold and is not relisted.
    store.record_refund(&listing.id)?;
    Ok(refund_id)
}

pub fn purchased_listings(store: &dyn Store, user_id: &str) -> Result<Vec<Listing>, ApiError> {
    let user = store
        .user_by_id(user_id)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(store.listings_by_ids(&user.purchased_listings)?)
}

pub fn sold_listings(store: &dyn Store, seller_id: &str) -> Result<Vec<SoldListing>, ApiError> {
    let sold = store.sold_listings_by_owner(seller_id)?;
    let mut out = Vec::with_capacity(sold.len());
    for listing in sold {
        let buyer = match listing.buyer_id.as_deref() {
            Some(buyer_id) => store.user_by_id(buyer_id)?.map(|u| BuyerInfo {
                id: u.id,
                username: u.username,
                email: u.email,
            }),
            None => None,
        };
        out.push(SoldListing { listing, buyer });
    }
    Ok(out)
}
