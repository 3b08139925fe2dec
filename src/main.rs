use std::net::SocketAddr;
use std::sync::Arc;

use diesel::prelude::*;
use diesel::PgConnection;

use marketplace_api::config::AppConfig;
use marketplace_api::store::PgStore;
use marketplace_api::stripe::{PaymentGateway, StripeClient};
use marketplace_api::{app, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let config = AppConfig::load()?;

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));

    let mut conn = PgConnection::establish(&config.database_url)
        .map_err(|e| format!("Failed to connect to database: {}", e))?;
    let test_query: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("1"))
        .get_result(&mut conn)?;
    log::info!("Database test query result: {}", test_query);

    let payments: Option<Arc<dyn PaymentGateway>> = match &config.stripe_secret_key {
        Some(key) => Some(Arc::new(StripeClient::new(key.clone()))),
        None => {
            log::warn!("STRIPE_SECRET_KEY not set. Payment features will be disabled.");
            None
        }
    };

    let store = Arc::new(PgStore::new(config.database_url.clone()));

    log::info!("Starting server on {}", addr);

    let state = AppState {
        config,
        store,
        payments,
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state).into_make_service()).await?;

    Ok(())
}
