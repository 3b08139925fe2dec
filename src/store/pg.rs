use chrono::NaiveDateTime;
use diesel::pg::PgConnection;
use diesel::prelude::*;

use super::{ListingQuery, ListingSort, ListingUpdate, SortOrder, Store, StoreError, UserChanges};
use crate::models::{Listing, ListingType, PaymentStatus, User};
use crate::schema::{listings, users};

/// Postgres-backed store. Connections are established per call, mirroring the
/// stateless request/response model of the service.
pub struct PgStore {
    database_url: String,
}

impl PgStore {
    pub fn new(database_url: impl Into<String>) -> Self {
        PgStore {
            database_url: database_url.into(),
        }
    }

    fn conn(&self) -> Result<PgConnection, StoreError> {
        Ok(PgConnection::establish(&self.database_url)?)
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = users)]
struct UserChangeset<'a> {
    username: Option<&'a str>,
    email: Option<&'a str>,
    password_hash: Option<&'a str>,
    avatar: Option<&'a str>,
    updated_at: NaiveDateTime,
}

#[derive(AsChangeset)]
#[diesel(table_name = listings)]
struct ListingChangeset<'a> {
    name: &'a str,
    description: &'a str,
    address: &'a str,
    regular_price: f64,
    discount_price: f64,
    bathrooms: i32,
    bedrooms: i32,
    furnished: bool,
    parking: bool,
    listing_type: ListingType,
    offer: bool,
    image_urls: &'a [String],
    latitude: Option<f64>,
    longitude: Option<f64>,
    updated_at: NaiveDateTime,
}

impl Store for PgStore {
    fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        diesel::insert_into(users::table).values(user).execute(&mut conn)?;
        Ok(())
    }

    fn user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.conn()?;
        Ok(users::table.find(id).first(&mut conn).optional()?)
    }

    fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.conn()?;
        Ok(users::table
            .filter(users::email.eq(email))
            .first(&mut conn)
            .optional()?)
    }

    fn update_user(&self, id: &str, changes: &UserChanges) -> Result<Option<User>, StoreError> {
        let mut conn = self.conn()?;
        let changeset = UserChangeset {
            username: changes.username.as_deref(),
            email: changes.email.as_deref(),
            password_hash: changes.password_hash.as_deref(),
            avatar: changes.avatar.as_deref(),
            updated_at: chrono::Utc::now().naive_utc(),
        };
        Ok(diesel::update(users::table.find(id))
            .set(&changeset)
            .get_result(&mut conn)
            .optional()?)
    }

    fn delete_user(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(users::table.find(id)).execute(&mut conn)?;
        Ok(deleted > 0)
    }

    fn set_customer_id(&self, user_id: &str, customer_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        diesel::update(users::table.find(user_id))
            .set((
                users::stripe_customer_id.eq(customer_id),
                users::updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    fn create_listing(&self, listing: &Listing) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        diesel::insert_into(listings::table)
            .values(listing)
            .execute(&mut conn)?;
        Ok(())
    }

    fn listing_by_id(&self, id: &str) -> Result<Option<Listing>, StoreError> {
        let mut conn = self.conn()?;
        Ok(listings::table.find(id).first(&mut conn).optional()?)
    }

    fn update_listing(&self, id: &str, update: &ListingUpdate) -> Result<Option<Listing>, StoreError> {
        let mut conn = self.conn()?;
        let changeset = ListingChangeset {
            name: &update.name,
            description: &update.description,
            address: &update.address,
            regular_price: update.regular_price,
            discount_price: update.discount_price,
            bathrooms: update.bathrooms,
            bedrooms: update.bedrooms,
            furnished: update.furnished,
            parking: update.parking,
            listing_type: update.listing_type,
            offer: update.offer,
            image_urls: &update.image_urls,
            latitude: update.latitude,
            longitude: update.longitude,
            updated_at: chrono::Utc::now().naive_utc(),
        };
        Ok(diesel::update(listings::table.find(id))
            .set(&changeset)
            .get_result(&mut conn)
            .optional()?)
    }

    fn delete_listing(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(listings::table.find(id)).execute(&mut conn)?;
        Ok(deleted > 0)
    }

    fn listings_by_owner(&self, owner_id: &str) -> Result<Vec<Listing>, StoreError> {
        let mut conn = self.conn()?;
        Ok(listings::table
            .filter(listings::user_ref.eq(owner_id))
            .order(listings::created_at.desc())
            .load(&mut conn)?)
    }

    fn listings_by_ids(&self, ids: &[String]) -> Result<Vec<Listing>, StoreError> {
        let mut conn = self.conn()?;
        Ok(listings::table
            .filter(listings::id.eq_any(ids))
            .load(&mut conn)?)
    }

    fn search_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>, StoreError> {
        let mut conn = self.conn()?;
        let mut q = listings::table.into_boxed();

        if let Some(term) = &query.search_term {
            q = q.filter(listings::name.ilike(format!("%{}%", term)));
        }
        if let Some(listing_type) = query.listing_type {
            q = q.filter(listings::listing_type.eq(listing_type));
        }
        if let Some(offer) = query.offer {
            q = q.filter(listings::offer.eq(offer));
        }
        if let Some(furnished) = query.furnished {
            q = q.filter(listings::furnished.eq(furnished));
        }
        if let Some(parking) = query.parking {
            q = q.filter(listings::parking.eq(parking));
        }

        q = match (query.sort, query.order) {
            (ListingSort::RegularPrice, SortOrder::Asc) => q.order(listings::regular_price.asc()),
            (ListingSort::RegularPrice, SortOrder::Desc) => q.order(listings::regular_price.desc()),
            (ListingSort::CreatedAt, SortOrder::Asc) => q.order(listings::created_at.asc()),
            (ListingSort::CreatedAt, SortOrder::Desc) => q.order(listings::created_at.desc()),
        };

        Ok(q.offset(query.start_index)
            .limit(query.limit)
            .load(&mut conn)?)
    }

    fn set_payment_intent(&self, listing_id: &str, intent_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        diesel::update(listings::table.find(listing_id))
            .set((
                listings::payment_intent_id.eq(intent_id),
                listings::payment_status.eq(PaymentStatus::Pending),
                listings::updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    fn complete_purchase(
        &self,
        listing_id: &str,
        buyer_id: &str,
        sold_at: NaiveDateTime,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            // The is_sold guard makes a concurrent double-confirmation lose the
            // race inside the database rather than after it.
            let updated = diesel::update(
                listings::table
                    .filter(listings::id.eq(listing_id))
                    .filter(listings::is_sold.eq(false)),
            )
            .set((
                listings::is_sold.eq(true),
                listings::buyer_id.eq(buyer_id),
                listings::sold_at.eq(sold_at),
                listings::payment_status.eq(PaymentStatus::Completed),
                listings::updated_at.eq(sold_at),
            ))
            .execute(conn)?;
            if updated == 0 {
                return Err(StoreError::MissingRecord);
            }

            let buyer: User = users::table
                .find(buyer_id)
                .first(conn)
                .optional()?
                .ok_or(StoreError::MissingRecord)?;
            let mut purchased = buyer.purchased_listings;
            purchased.push(listing_id.to_string());
            diesel::update(users::table.find(buyer_id))
                .set((
                    users::purchased_listings.eq(purchased),
                    users::updated_at.eq(sold_at),
                ))
                .execute(conn)?;
            Ok(())
        })
    }

    fn record_refund(&self, listing_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            let listing: Listing = listings::table
                .find(listing_id)
                .first(conn)
                .optional()?
                .ok_or(StoreError::MissingRecord)?;

            let now = chrono::Utc::now().naive_utc();
            diesel::update(listings::table.find(listing_id))
                .set((
                    listings::payment_status.eq(PaymentStatus::Refunded),
                    listings::updated_at.eq(now),
                ))
                .execute(conn)?;

            if let Some(buyer_id) = listing.buyer_id.as_deref() {
                if let Some(buyer) = users::table.find(buyer_id).first::<User>(conn).optional()? {
                    let mut purchased = buyer.purchased_listings;
                    purchased.retain(|id| id != listing_id);
                    diesel::update(users::table.find(buyer_id))
                        .set((
                            users::purchased_listings.eq(purchased),
                            users::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                }
            }
            Ok(())
        })
    }

    fn sold_listings_by_owner(&self, owner_id: &str) -> Result<Vec<Listing>, StoreError> {
        let mut conn = self.conn()?;
        Ok(listings::table
            .filter(listings::user_ref.eq(owner_id))
            .filter(listings::is_sold.eq(true))
            .order(listings::created_at.desc())
            .load(&mut conn)?)
    }
}
