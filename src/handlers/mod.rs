pub mod auth;
pub mod listing;
pub mod payment;
pub mod user;
