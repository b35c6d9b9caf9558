// Postgres storage layer with sqlx

pub mod bulk;
pub mod encryption;
pub mod models;
pub mod queue_store;
pub mod repositories;

pub use bulk::{sanitize_text, BulkOperations, SqlValue};
pub use encryption::{
    generate_encryption_key, EncryptedPayload, EncryptionService, IntegrationCredentials,
};
pub use models::*;
pub use repositories::Database;
