pub mod connection;
pub mod models;
pub mod service;
pub mod transcript;

pub use connection::{get_connection, DbPool};
pub use models::*;
pub use service::{DbService, StoreError};
