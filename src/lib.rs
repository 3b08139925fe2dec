use std::sync::Arc;

use axum::routing::get;
use axum::Router;

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod payment;
pub mod schema;
pub mod store;
pub mod stripe;

#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub store: Arc<dyn store::Store>,
    /// None when no processor key was configured at startup; payment routes
    /// answer 503 for the rest of the process lifetime.
    pub payments: Option<Arc<dyn stripe::PaymentGateway>>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Real Estate Marketplace API" }))
        .nest("/api/auth", handlers::auth::routes())
        .nest("/api/user", handlers::user::routes())
        .nest("/api/listing", handlers::listing::routes())
        .nest("/api/payment", handlers::payment::routes())
        .with_state(state)
}
