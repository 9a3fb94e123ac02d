pub mod auth;
pub mod credentials;
pub mod error;
pub mod filter;
pub mod models;
pub mod openapi;
pub mod repo;
pub mod routes;
pub mod settings;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
