use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{Listing, ListingType, PaymentStatus};
use crate::store::{ListingQuery, ListingSort, ListingUpdate, SortOrder};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_listing))
        .route("/update/:id", post(update_listing))
        .route("/delete/:id", delete(delete_listing))
        .route("/get/:id", get(get_listing))
        .route("/get", get(search_listings))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRequest {
    pub name: String,
    pub description: String,
    pub address: String,
    pub regular_price: f64,
    pub discount_price: f64,
    pub bathrooms: i32,
    pub bedrooms: i32,
    pub furnished: bool,
    pub parking: bool,
    #[serde(rename = "type")]
    pub listing_type: ListingType,
    pub offer: bool,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ListingRequest {
    fn into_update(self) -> ListingUpdate {
        ListingUpdate {
            name: self.name,
            description: self.description,
            address: self.address,
            regular_price: self.regular_price,
            discount_price: self.discount_price,
            bathrooms: self.bathrooms,
            bedrooms: self.bedrooms,
            furnished: self.furnished,
            parking: self.parking,
            listing_type: self.listing_type,
            offer: self.offer,
            image_urls: self.image_urls,
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

async fn create_listing(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ListingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let now = chrono::Utc::now().naive_utc();
    let listing = Listing {
        id: uuid::Uuid::new_v4().to_string(),
        name: req.name,
        description: req.description,
        address: req.address,
        regular_price: req.regular_price,
        discount_price: req.discount_price,
        bathrooms: req.bathrooms,
        bedrooms: req.bedrooms,
        furnished: req.furnished,
        parking: req.parking,
        listing_type: req.listing_type,
        offer: req.offer,
        image_urls: req.image_urls,
        user_ref: auth.0.clone(),
        latitude: req.latitude,
        longitude: req.longitude,
        is_sold: false,
        buyer_id: None,
        sold_at: None,
        payment_intent_id: None,
        payment_status: PaymentStatus::Pending,
        created_at: now,
        updated_at: now,
    };
    state.store.create_listing(&listing)?;
    log::info!("listing created: {} by {}", listing.id, listing.user_ref);
    Ok((StatusCode::CREATED, Json(listing)))
}

async fn update_listing(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<ListingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state
        .store
        .listing_by_id(&id)?
        .ok_or_else(|| ApiError::NotFound("Listing not found".to_string()))?;
    auth.ensure_is(&listing.user_ref, "You can only update your own listings")?;
    let updated = state
        .store
        .update_listing(&id, &req.into_update())?
        .ok_or_else(|| ApiError::NotFound("Listing not found".to_string()))?;
    Ok(Json(updated))
}

async fn delete_listing(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state
        .store
        .listing_by_id(&id)?
        .ok_or_else(|| ApiError::NotFound("Listing not found".to_string()))?;
    auth.ensure_is(&listing.user_ref, "You can only delete your own listings")?;
    state.store.delete_listing(&id)?;
    Ok(Json(json!({"success": true, "message": "Listing has been deleted"})))
}

async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state
        .store
        .listing_by_id(&id)?
        .ok_or_else(|| ApiError::NotFound("Listing not found".to_string()))?;
    Ok(Json(listing))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub search_term: Option<String>,
    #[serde(rename = "type")]
    pub listing_type: Option<String>,
    pub offer: Option<String>,
    pub furnished: Option<String>,
    pub parking: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub limit: Option<i64>,
    pub start_index: Option<i64>,
}

// Flags only narrow the search when explicitly "true"; absent or "false"
// matches listings with and without the flag.
fn flag(value: &Option<String>) -> Option<bool> {
    match value.as_deref() {
        Some("true") => Some(true),
        _ => None,
    }
}

impl SearchParams {
    fn into_query(self) -> ListingQuery {
        let listing_type = match self.listing_type.as_deref() {
            Some("sale") => Some(ListingType::Sale),
            Some("rent") => Some(ListingType::Rent),
            _ => None, // "all", absent, or junk
        };
        let sort = match self.sort.as_deref() {
            Some("regularPrice") => ListingSort::RegularPrice,
            _ => ListingSort::CreatedAt,
        };
        let order = match self.order.as_deref() {
            Some("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        };
        let defaults = ListingQuery::default();
        ListingQuery {
            offer: flag(&self.offer),
            furnished: flag(&self.furnished),
            parking: flag(&self.parking),
            search_term: self.search_term,
            listing_type,
            sort,
            order,
            limit: self.limit.unwrap_or(defaults.limit),
            start_index: self.start_index.unwrap_or(defaults.start_index),
        }
    }
}

async fn search_listings(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let listings = state.store.search_listings(&params.into_query())?;
    Ok(Json(listings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_params_map_to_query() {
        let params = SearchParams {
            search_term: Some("lake".to_string()),
            listing_type: Some("rent".to_string()),
            offer: Some("true".to_string()),
            furnished: Some("false".to_string()),
            sort: Some("regularPrice".to_string()),
            order: Some("asc".to_string()),
            limit: Some(5),
            ..SearchParams::default()
        };
        let q = params.into_query();
        assert_eq!(q.listing_type, Some(ListingType::Rent));
        assert_eq!(q.offer, Some(true));
        assert_eq!(q.furnished, None, "false matches both");
        assert_eq!(q.sort, ListingSort::RegularPrice);
        assert_eq!(q.order, SortOrder::Asc);
        assert_eq!(q.limit, 5);
        assert_eq!(q.start_index, 0);
    }

    #[test]
    fn search_params_defaults() {
        let q = SearchParams::default().into_query();
        assert_eq!(q.listing_type, None);
        assert_eq!(q.sort, ListingSort::CreatedAt);
        assert_eq!(q.order, SortOrder::Desc);
        assert_eq!(q.limit, 9);
    }
}
