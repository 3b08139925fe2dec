use chrono::NaiveDateTime;
use diesel::result::DatabaseErrorKind;
use thiserror::Error;

use crate::models::{Listing, ListingType, User};

pub mod mem;
pub mod pg;

pub use mem::MemStore;
pub use pg::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Conflict(String),
    #[error("record disappeared mid-update")]
    MissingRecord,
    #[error("database error: {0}")]
    Database(diesel::result::Error),
    #[error("connection error: {0}")]
    Connection(#[from] diesel::result::ConnectionError),
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(info.message().to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// Full set of owner-editable listing fields. Updates replace these wholesale;
/// the sale-state fields are only ever touched by the payment workflow.
#[derive(Debug, Clone)]
pub struct ListingUpdate {
    pub name: String,
    pub description: String,
    pub address: String,
    pub regular_price: f64,
    pub discount_price: f64,
    pub bathrooms: i32,
    pub bedrooms: i32,
    pub furnished: bool,
    pub parking: bool,
    pub listing_type: ListingType,
    pub offer: bool,
    pub image_urls: Vec<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingSort {
    RegularPrice,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct ListingQuery {
    pub search_term: Option<String>,
    /// None matches both sale and rent.
    pub listing_type: Option<ListingType>,
    /// None matches listings with and without an offer; same for the flags below.
    pub offer: Option<bool>,
    pub furnished: Option<bool>,
    pub parking: Option<bool>,
    pub sort: ListingSort,
    pub order: SortOrder,
    pub limit: i64,
    pub start_index: i64,
}

impl Default for ListingQuery {
    fn default() -> Self {
        ListingQuery {
            search_term: None,
            listing_type: None,
            offer: None,
            furnished: None,
            parking: None,
            sort: ListingSort::CreatedAt,
            order: SortOrder::Desc,
            limit: 9,
            start_index: 0,
        }
    }
}

/// Typed accessors over the two entities. Object-safe so the HTTP layer and
/// the payment workflow can run against Postgres in production and the
/// in-memory store in tests.
pub trait Store: Send + Sync {
    fn create_user(&self, user: &User) -> Result<(), StoreError>;
    fn user_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
    fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    fn update_user(&self, id: &str, changes: &UserChanges) -> Result<Option<User>, StoreError>;
    fn delete_user(&self, id: &str) -> Result<bool, StoreError>;
    fn set_customer_id(&self, user_id: &str, customer_id: &str) -> Result<(), StoreError>;

    fn create_listing(&self, listing: &Listing) -> Result<(), StoreError>;
    fn listing_by_id(&self, id: &str) -> Result<Option<Listing>, StoreError>;
    fn update_listing(&self, id: &str, update: &ListingUpdate) -> Result<Option<Listing>, StoreError>;
    fn delete_listing(&self, id: &str) -> Result<bool, StoreError>;
    fn listings_by_owner(&self, owner_id: &str) -> Result<Vec<Listing>, StoreError>;
    fn listings_by_ids(&self, ids: &[String]) -> Result<Vec<Listing>, StoreError>;
    fn search_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>, StoreError>;

    fn set_payment_intent(&self, listing_id: &str, intent_id: &str) -> Result<(), StoreError>;

    /// Marks the listing sold and appends it to the buyer's purchased list as
    /// one transactional unit. If either write cannot be applied the whole
    /// transition is rolled back.
    fn complete_purchase(
        &self,
        listing_id: &str,
        buyer_id: &str,
        sold_at: NaiveDateTime,
    ) -> Result<(), StoreError>;

    /// Marks the payment refunded and removes the listing from the buyer's
    /// purchased list, transactionally. `is_sold` is left untouched.
    fn record_refund(&self, listing_id: &str) -> Result<(), StoreError>;

    fn sold_listings_by_owner(&self, owner_id: &str) -> Result<Vec<Listing>, StoreError>;
}
