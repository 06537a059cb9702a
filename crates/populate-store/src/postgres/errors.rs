use populate_core::StoreError;

/// SQLSTATE codes worth resubmitting a batch for.
const TRANSIENT_CODES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "57P01", // admin_shutdown
    "08000", // connection_exception
    "08003", // connection_does_not_exist
    "08006", // connection_failure
    "53300", // too_many_connections
];

pub fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => StoreError::Transient(err.to_string()),
        sqlx::Error::Database(db) => {
            let transient = db
                .code()
                .is_some_and(|code| TRANSIENT_CODES.iter().any(|transient| *transient == code));
            if transient {
                StoreError::Transient(err.to_string())
            } else {
                StoreError::Fatal(err.to_string())
            }
        }
        _ => StoreError::Fatal(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_and_pool_timeouts_are_transient() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert!(classify(io).is_transient());
        assert!(classify(sqlx::Error::PoolTimedOut).is_transient());
    }

    #[test]
    fn decode_and_protocol_errors_are_fatal() {
        assert!(!classify(sqlx::Error::RowNotFound).is_transient());
        assert!(!classify(sqlx::Error::Protocol("bad message".to_string())).is_transient());
    }
}
