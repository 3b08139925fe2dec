//! End-to-end exercises of the purchase workflow over the in-memory store and
//! a scripted payment gateway.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use marketplace_api::error::ApiError;
use marketplace_api::models::{Listing, ListingType, PaymentStatus, User};
use marketplace_api::payment;
use marketplace_api::store::{MemStore, Store, StoreError};
use marketplace_api::stripe::{IntentMetadata, PaymentError, PaymentGateway, PaymentIntent};

#[derive(Default)]
struct MockGateway {
    customers_created: AtomicUsize,
    intents: Mutex<HashMap<String, (i64, PaymentIntent)>>,
    refunds: Mutex<Vec<String>>,
}

impl MockGateway {
    /// Stands in for the client-side card confirmation step.
    fn mark_succeeded(&self, intent_id: &str) {
        let mut intents = self.intents.lock().unwrap();
        intents.get_mut(intent_id).expect("unknown intent").1.status = "succeeded".to_string();
    }

    fn amount_of(&self, intent_id: &str) -> i64 {
        self.intents.lock().unwrap()[intent_id].0
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_customer(&self, _email: &str, _name: &str) -> Result<String, PaymentError> {
        let n = self.customers_created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("cus_test_{}", n))
    }

    async fn create_payment_intent(
        &self,
        amount_cents: i64,
        _customer_id: &str,
        metadata: IntentMetadata,
    ) -> Result<PaymentIntent, PaymentError> {
        let mut intents = self.intents.lock().unwrap();
        let id = format!("pi_test_{}", intents.len());
        let intent = PaymentIntent {
            id: id.clone(),
            client_secret: Some(format!("{}_secret", id)),
            status: "requires_payment_method".to_string(),
            metadata,
        };
        intents.insert(id, (amount_cents, intent.clone()));
        Ok(intent)
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        self.intents
            .lock()
            .unwrap()
            .get(intent_id)
            .map(|(_, intent)| intent.clone())
            .ok_or_else(|| PaymentError::Api(format!("No such payment_intent: {}", intent_id)))
    }

    async fn create_refund(&self, intent_id: &str) -> Result<String, PaymentError> {
        let mut refunds = self.refunds.lock().unwrap();
        refunds.push(intent_id.to_string());
        Ok(format!("re_test_{}", refunds.len()))
    }
}

/// Store that must never be reached; proves the unconfigured-capability check
/// happens before any persistence access.
struct UntouchableStore;

fn untouched<T>() -> T {
    panic!("store must not be touched when payments are unconfigured")
}

impl Store for UntouchableStore {
    fn create_user(&self, _: &User) -> Result<(), StoreError> {
        untouched()
    }
    fn user_by_id(&self, _: &str) -> Result<Option<User>, StoreError> {
        untouched()
    }
    fn user_by_email(&self, _: &str) -> Result<Option<User>, StoreError> {
        untouched()
    }
    fn update_user(
        &self,
        _: &str,
        _: &marketplace_api::store::UserChanges,
    ) -> Result<Option<User>, StoreError> {
        untouched()
    }
    fn delete_user(&self, _: &str) -> Result<bool, StoreError> {
        untouched()
    }
    fn set_customer_id(&self, _: &str, _: &str) -> Result<(), StoreError> {
        untouched()
    }
    fn create_listing(&self, _: &Listing) -> Result<(), StoreError> {
        untouched()
    }
    fn listing_by_id(&self, _: &str) -> Result<Option<Listing>, StoreError> {
        untouched()
    }
    fn update_listing(
        &self,
        _: &str,
        _: &marketplace_api::store::ListingUpdate,
    ) -> Result<Option<Listing>, StoreError> {
        untouched()
    }
    fn delete_listing(&self, _: &str) -> Result<bool, StoreError> {
        untouched()
    }
    fn listings_by_owner(&self, _: &str) -> Result<Vec<Listing>, StoreError> {
        untouched()
    }
    fn listings_by_ids(&self, _: &[String]) -> Result<Vec<Listing>, StoreError> {
        untouched()
    }
    fn search_listings(
        &self,
        _: &marketplace_api::store::ListingQuery,
    ) -> Result<Vec<Listing>, StoreError> {
        untouched()
    }
    fn set_payment_intent(&self, _: &str, _: &str) -> Result<(), StoreError> {
        untouched()
    }
    fn complete_purchase(
        &self,
        _: &str,
        _: &str,
        _: chrono::NaiveDateTime,
    ) -> Result<(), StoreError> {
        untouched()
    }
    fn record_refund(&self, _: &str) -> Result<(), StoreError> {
        untouched()
    }
    fn sold_listings_by_owner(&self, _: &str) -> Result<Vec<Listing>, StoreError> {
        untouched()
    }
}

fn user(name: &str) -> User {
    User::new(name.to_string(), format!("{}@example.com", name), "hash".to_string())
}

fn listing(owner: &str, regular: f64, discount: f64, offer: bool) -> Listing {
    let now = chrono::Utc::now().naive_utc();
    Listing {
        id: uuid::Uuid::new_v4().to_string(),
        name: "Sunny townhouse".to_string(),
        description: "Three floors, small garden".to_string(),
        address: "5 Birch Lane".to_string(),
        regular_price: regular,
        discount_price: discount,
        bathrooms: 2,
        bedrooms: 3,
        furnished: false,
        parking: true,
        listing_type: ListingType::Sale,
        offer,
        image_urls: vec![],
        user_ref: owner.to_string(),
        latitude: None,
        longitude: None,
        is_sold: false,
        buyer_id: None,
        sold_at: None,
        payment_intent_id: None,
        payment_status: PaymentStatus::Pending,
        created_at: now,
        updated_at: now,
    }
}

struct Setup {
    store: MemStore,
    gateway: MockGateway,
    seller: User,
    buyer: User,
    listing: Listing,
}

fn setup(regular: f64, discount: f64, offer: bool) -> Setup {
    let store = MemStore::new();
    let seller = user("seller");
    let buyer = user("buyer");
    let l = listing(&seller.id, regular, discount, offer);
    store.create_user(&seller).unwrap();
    store.create_user(&buyer).unwrap();
    store.create_listing(&l).unwrap();
    Setup {
        store,
        gateway: MockGateway::default(),
        seller,
        buyer,
        listing: l,
    }
}

#[tokio::test]
async fn unconfigured_payments_fail_before_touching_the_store() {
    let store = UntouchableStore;

    let err = payment::create_payment_intent(&store, None, "l1", "u1")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ServiceUnavailable));

    let err = payment::confirm_payment(&store, None, "pi_1", "u1")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ServiceUnavailable));

    let err = payment::refund_payment(&store, None, "l1", "u1")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ServiceUnavailable));
}

#[tokio::test]
async fn intent_charges_discount_price_in_cents_when_offer_is_active() {
    let s = setup(1000.0, 800.0, true);

    let created =
        payment::create_payment_intent(&s.store, Some(&s.gateway), &s.listing.id, &s.buyer.id)
            .await
            .unwrap();

    assert_eq!(s.gateway.amount_of(&created.payment_intent_id), 80_000);
    assert!(created.client_secret.ends_with("_secret"));

    let stored = s.store.listing_by_id(&s.listing.id).unwrap().unwrap();
    assert_eq!(stored.payment_intent_id.as_deref(), Some(created.payment_intent_id.as_str()));
    assert_eq!(stored.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn customer_record_is_provisioned_once_per_user() {
    let s = setup(500.0, 400.0, false);

    payment::create_payment_intent(&s.store, Some(&s.gateway), &s.listing.id, &s.buyer.id)
        .await
        .unwrap();
    let buyer = s.store.user_by_id(&s.buyer.id).unwrap().unwrap();
    let customer_id = buyer.stripe_customer_id.clone().expect("customer persisted");

    payment::create_payment_intent(&s.store, Some(&s.gateway), &s.listing.id, &s.buyer.id)
        .await
        .unwrap();
    let buyer = s.store.user_by_id(&s.buyer.id).unwrap().unwrap();
    assert_eq!(buyer.stripe_customer_id.as_deref(), Some(customer_id.as_str()));
    assert_eq!(s.gateway.customers_created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn buying_your_own_listing_is_rejected() {
    let s = setup(1000.0, 800.0, true);

    let err =
        payment::create_payment_intent(&s.store, Some(&s.gateway), &s.listing.id, &s.seller.id)
            .await
            .unwrap_err();
    assert!(matches!(err, ApiError::InvalidState(_)));

    // Still InvalidState once the listing is sold, just from the earlier guard.
    s.store
        .complete_purchase(&s.listing.id, &s.buyer.id, chrono::Utc::now().naive_utc())
        .unwrap();
    let err =
        payment::create_payment_intent(&s.store, Some(&s.gateway), &s.listing.id, &s.seller.id)
            .await
            .unwrap_err();
    assert!(matches!(err, ApiError::InvalidState(_)));
}

#[tokio::test]
async fn unknown_listing_and_unknown_buyer_are_not_found() {
    let s = setup(1000.0, 800.0, true);

    let err = payment::create_payment_intent(&s.store, Some(&s.gateway), "missing", &s.buyer.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let err =
        payment::create_payment_intent(&s.store, Some(&s.gateway), &s.listing.id, "missing")
            .await
            .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn confirmation_requires_a_succeeded_intent() {
    let s = setup(1000.0, 800.0, true);

    let created =
        payment::create_payment_intent(&s.store, Some(&s.gateway), &s.listing.id, &s.buyer.id)
            .await
            .unwrap();

    // Card was never confirmed client-side.
    let err = payment::confirm_payment(
        &s.store,
        Some(&s.gateway),
        &created.payment_intent_id,
        &s.buyer.id,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::InvalidState(_)));

    let stored = s.store.listing_by_id(&s.listing.id).unwrap().unwrap();
    assert!(!stored.is_sold);
}

#[tokio::test]
async fn full_purchase_and_refund_scenario() {
    let s = setup(1000.0, 800.0, true);

    // Intent: offer active, so 800 * 100 cents.
    let created =
        payment::create_payment_intent(&s.store, Some(&s.gateway), &s.listing.id, &s.buyer.id)
            .await
            .unwrap();
    assert_eq!(s.gateway.amount_of(&created.payment_intent_id), 80_000);

    s.gateway.mark_succeeded(&created.payment_intent_id);
    payment::confirm_payment(&s.store, Some(&s.gateway), &created.payment_intent_id, &s.buyer.id)
        .await
        .unwrap();

    let sold = s.store.listing_by_id(&s.listing.id).unwrap().unwrap();
    assert!(sold.is_sold);
    assert_eq!(sold.buyer_id.as_deref(), Some(s.buyer.id.as_str()));
    assert_eq!(sold.payment_status, PaymentStatus::Completed);
    assert!(sold.sold_at.is_some());
    let buyer = s.store.user_by_id(&s.buyer.id).unwrap().unwrap();
    assert_eq!(buyer.purchased_listings, vec![s.listing.id.clone()]);

    // Replaying the same succeeded intent must not double-sell.
    let err = payment::confirm_payment(
        &s.store,
        Some(&s.gateway),
        &created.payment_intent_id,
        &s.buyer.id,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::InvalidState(_)));
    let buyer = s.store.user_by_id(&s.buyer.id).unwrap().unwrap();
    assert_eq!(buyer.purchased_listings.len(), 1, "no double append");

    // Only the seller may refund.
    let err = payment::refund_payment(&s.store, Some(&s.gateway), &s.listing.id, &s.buyer.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));

    let refund_id =
        payment::refund_payment(&s.store, Some(&s.gateway), &s.listing.id, &s.seller.id)
            .await
            .unwrap();
    assert!(refund_id.starts_with("re_test_"));

    let refunded = s.store.listing_by_id(&s.listing.id).unwrap().unwrap();
    assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
    assert!(refunded.is_sold, "refund is a financial reversal, not a relisting");
    let buyer = s.store.user_by_id(&s.buyer.id).unwrap().unwrap();
    assert!(buyer.purchased_listings.is_empty());
}

#[tokio::test]
async fn refund_preconditions() {
    let s = setup(1000.0, 800.0, false);

    // Not sold yet.
    let err = payment::refund_payment(&s.store, Some(&s.gateway), &s.listing.id, &s.seller.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidState(_)));

    // Sold but with no intent recorded (out-of-band sale).
    s.store
        .complete_purchase(&s.listing.id, &s.buyer.id, chrono::Utc::now().naive_utc())
        .unwrap();
    let err = payment::refund_payment(&s.store, Some(&s.gateway), &s.listing.id, &s.seller.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidState(_)));
}

#[tokio::test]
async fn read_side_queries() {
    let s = setup(1000.0, 800.0, true);

    let err = payment::purchased_listings(&s.store, "missing").unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let created =
        payment::create_payment_intent(&s.store, Some(&s.gateway), &s.listing.id, &s.buyer.id)
            .await
            .unwrap();
    s.gateway.mark_succeeded(&created.payment_intent_id);
    payment::confirm_payment(&s.store, Some(&s.gateway), &created.payment_intent_id, &s.buyer.id)
        .await
        .unwrap();

    let purchased = payment::purchased_listings(&s.store, &s.buyer.id).unwrap();
    assert_eq!(purchased.len(), 1);
    assert_eq!(purchased[0].id, s.listing.id);

    let sold = payment::sold_listings(&s.store, &s.seller.id).unwrap();
    assert_eq!(sold.len(), 1);
    let buyer = sold[0].buyer.as_ref().expect("buyer projected");
    assert_eq!(buyer.username, s.buyer.username);
    assert_eq!(buyer.email, s.buyer.email);
}
