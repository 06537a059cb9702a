//! Record stores that live inside this crate: a CSV directory for
//! offline datasets and an in-memory store for tests and dry runs.

pub mod csv;
pub mod memory;

pub use self::csv::CsvStore;
pub use self::memory::{Fault, InMemoryStore};
