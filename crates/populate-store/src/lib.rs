//! PostgreSQL persistence for generated datasets.

pub mod options;
pub mod postgres;

pub use options::StoreOptions;
pub use postgres::PostgresStore;
