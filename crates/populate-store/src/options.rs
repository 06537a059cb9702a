use std::time::Duration;

/// Options that control how the PostgreSQL store connects and lays out its tables.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Add a PostGIS `geography(Point, 4326)` column next to the coordinates.
    pub postgis: bool,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            postgis: false,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}
