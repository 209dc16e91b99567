pub mod app;
pub mod config;
pub mod error;
pub mod idempotency;
pub mod models;
pub mod normalize;
pub mod validation;
