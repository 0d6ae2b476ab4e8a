//! SQLite adapters for the run state store.

pub mod connection;
pub mod run_repository;

pub use connection::{create_pool, create_test_pool, run_migrations, ConnectionError, PoolConfig};
pub use run_repository::SqliteRunRepository;
