use chrono::NaiveDateTime;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::schema::{listings, users};

pub const DEFAULT_AVATAR: &str =
    "https://i.pinimg.com/736x/a7/31/d1/a731d1ac78efdeb68872580f57540070.jpg";

/// Whether a property is offered for sale or for rent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    Sale,
    Rent,
}

impl ListingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingType::Sale => "sale",
            ListingType::Rent => "rent",
        }
    }
}

impl ToSql<Text, Pg> for ListingType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for ListingType {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match <String as FromSql<Text, Pg>>::from_sql(bytes)?.as_str() {
            "sale" => Ok(ListingType::Sale),
            "rent" => Ok(ListingType::Rent),
            other => Err(format!("unrecognized listing type: {}", other).into()),
        }
    }
}

/// Payment lifecycle of a listing. `pending -> completed` on confirmation,
/// `completed -> refunded` on refund; `refunded` is terminal. `failed` is
/// written by the processor side only, never by this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl ToSql<Text, Pg> for PaymentStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for PaymentStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match <String as FromSql<Text, Pg>>::from_sql(bytes)?.as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unrecognized payment status: {}", other).into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Queryable, Insertable)]
#[diesel(table_name = users)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub avatar: String,
    pub stripe_customer_id: Option<String>,
    pub purchased_listings: Vec<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        let now = chrono::Utc::now().naive_utc();
        User {
            id: uuid::Uuid::new_v4().to_string(),
            username,
            email,
            password_hash,
            avatar: DEFAULT_AVATAR.to_string(),
            stripe_customer_id: None,
            purchased_listings: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Queryable, Insertable)]
#[diesel(table_name = listings)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
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
    pub image_urls: Vec<String>,
    pub user_ref: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_sold: bool,
    pub buyer_id: Option<String>,
    pub sold_at: Option<NaiveDateTime>,
    pub payment_intent_id: Option<String>,
    pub payment_status: PaymentStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Minimal-disclosure projection of a buyer on the sold-listings view.
#[derive(Debug, Clone, Serialize)]
pub struct BuyerInfo {
    pub id: String,
    pub username: String,
    pub email: String,
}

/// A sold listing with its buyer partially expanded.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoldListing {
    #[serde(flatten)]
    pub listing: Listing,
    pub buyer: Option<BuyerInfo>,
}
