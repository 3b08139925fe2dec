use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDateTime;

use super::{ListingQuery, ListingSort, ListingUpdate, SortOrder, Store, StoreError, UserChanges};
use crate::models::{Listing, User};

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    listings: HashMap<String, Listing>,
}

/// In-memory store used by the test suite and for local hacking without a
/// database. Each trait call takes the mutex once, so the multi-entity
/// transitions are as atomic here as the Postgres transactions are there.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore::default()
    }
}

impl Store for MemStore {
    fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let taken = inner
            .users
            .values()
            .any(|u| u.username == user.username || u.email == user.email);
        if taken {
            return Err(StoreError::Conflict("username or email already taken".into()));
        }
        inner.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    fn user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().unwrap().users.get(id).cloned())
    }

    fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    fn update_user(&self, id: &str, changes: &UserChanges) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let conflict = inner.users.values().any(|u| {
            u.id != id
                && (changes.username.as_deref() == Some(u.username.as_str())
                    || changes.email.as_deref() == Some(u.email.as_str()))
        });
        if conflict {
            return Err(StoreError::Conflict("username or email already taken".into()));
        }
        let Some(user) = inner.users.get_mut(id) else {
            return Ok(None);
        };
        if let Some(username) = &changes.username {
            user.username = username.clone();
        }
        if let Some(email) = &changes.email {
            user.email = email.clone();
        }
        if let Some(hash) = &changes.password_hash {
            user.password_hash = hash.clone();
        }
        if let Some(avatar) = &changes.avatar {
            user.avatar = avatar.clone();
        }
        user.updated_at = chrono::Utc::now().naive_utc();
        Ok(Some(user.clone()))
    }

    fn delete_user(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().users.remove(id).is_some())
    }

    fn set_customer_id(&self, user_id: &str, customer_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner.users.get_mut(user_id).ok_or(StoreError::MissingRecord)?;
        user.stripe_customer_id = Some(customer_id.to_string());
        Ok(())
    }

    fn create_listing(&self, listing: &Listing) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.listings.insert(listing.id.clone(), listing.clone());
        Ok(())
    }

    fn listing_by_id(&self, id: &str) -> Result<Option<Listing>, StoreError> {
        Ok(self.inner.lock().unwrap().listings.get(id).cloned())
    }

    fn update_listing(&self, id: &str, update: &ListingUpdate) -> Result<Option<Listing>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(listing) = inner.listings.get_mut(id) else {
            return Ok(None);
        };
        listing.name = update.name.clone();
        listing.description = update.description.clone();
        listing.address = update.address.clone();
        listing.regular_price = update.regular_price;
        listing.discount_price = update.discount_price;
        listing.bathrooms = update.bathrooms;
        listing.bedrooms = update.bedrooms;
        listing.furnished = update.furnished;
        listing.parking = update.parking;
        listing.listing_type = update.listing_type;
        listing.offer = update.offer;
        listing.image_urls = update.image_urls.clone();
        listing.latitude = update.latitude;
        listing.longitude = update.longitude;
        listing.updated_at = chrono::Utc::now().naive_utc();
        Ok(Some(listing.clone()))
    }

    fn delete_listing(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().listings.remove(id).is_some())
    }

    fn listings_by_owner(&self, owner_id: &str) -> Result<Vec<Listing>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut found: Vec<Listing> = inner
            .listings
            .values()
            .filter(|l| l.user_ref == owner_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    fn listings_by_ids(&self, ids: &[String]) -> Result<Vec<Listing>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| inner.listings.get(id).cloned())
            .collect())
    }

    fn search_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut found: Vec<Listing> = inner
            .listings
            .values()
            .filter(|l| {
                query
                    .search_term
                    .as_ref()
                    .map_or(true, |t| l.name.to_lowercase().contains(&t.to_lowercase()))
                    && query.listing_type.map_or(true, |t| l.listing_type == t)
                    && query.offer.map_or(true, |v| l.offer == v)
                    && query.furnished.map_or(true, |v| l.furnished == v)
                    && query.parking.map_or(true, |v| l.parking == v)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            let ord = match query.sort {
                ListingSort::RegularPrice => a
                    .regular_price
                    .partial_cmp(&b.regular_price)
                    .unwrap_or(std::cmp::Ordering::Equal),
                ListingSort::CreatedAt => a.created_at.cmp(&b.created_at),
            };
            match query.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
        Ok(found
            .into_iter()
            .skip(query.start_index.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect())
    }

    fn set_payment_intent(&self, listing_id: &str, intent_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let listing = inner
            .listings
            .get_mut(listing_id)
            .ok_or(StoreError::MissingRecord)?;
        listing.payment_intent_id = Some(intent_id.to_string());
        listing.payment_status = crate::models::PaymentStatus::Pending;
        Ok(())
    }

    fn complete_purchase(
        &self,
        listing_id: &str,
        buyer_id: &str,
        sold_at: NaiveDateTime,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.users.contains_key(buyer_id) {
            return Err(StoreError::MissingRecord);
        }
        let listing = inner
            .listings
            .get_mut(listing_id)
            .filter(|l| !l.is_sold)
            .ok_or(StoreError::MissingRecord)?;
        listing.is_sold = true;
        listing.buyer_id = Some(buyer_id.to_string());
        listing.sold_at = Some(sold_at);
        listing.payment_status = crate::models::PaymentStatus::Completed;
        listing.updated_at = sold_at;
        let buyer = inner.users.get_mut(buyer_id).expect("checked above");
        buyer.purchased_listings.push(listing_id.to_string());
        Ok(())
    }

    fn record_refund(&self, listing_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let listing = inner
            .listings
            .get_mut(listing_id)
            .ok_or(StoreError::MissingRecord)?;
        listing.payment_status = crate::models::PaymentStatus::Refunded;
        listing.updated_at = chrono::Utc::now().naive_utc();
        let buyer_id = listing.buyer_id.clone();
        if let Some(buyer_id) = buyer_id {
            if let Some(buyer) = inner.users.get_mut(&buyer_id) {
                buyer.purchased_listings.retain(|id| id != listing_id);
            }
        }
        Ok(())
    }

    fn sold_listings_by_owner(&self, owner_id: &str) -> Result<Vec<Listing>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut found: Vec<Listing> = inner
            .listings
            .values()
            .filter(|l| l.user_ref == owner_id && l.is_sold)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}
