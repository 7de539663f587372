//! SQLite adapters.

pub mod connection;
pub mod id_repository;
pub mod migrations;
pub mod queue_repository;

pub use connection::{create_pool, create_test_pool, verify_connection, PoolConfig};
pub use id_repository::{SqliteBridgeDedupe, SqliteIdRepository};
pub use migrations::{all_embedded_migrations, migrated_test_pool, Migration, Migrator};
pub use queue_repository::{RetryConfig, SqliteMessageQueue};
