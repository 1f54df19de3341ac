//! Classification of MySQL driver errors into poolwarm errors.

use poolwarm_core::Error;
use sqlx::mysql::MySqlDatabaseError;

/// Server error numbers the adapter reacts to.
pub mod codes {
    /// ER_BAD_DB_ERROR
    pub const UNKNOWN_DATABASE: u16 = 1049;
    /// ER_UNKNOWN_TABLE
    pub const UNKNOWN_TABLE: u16 = 1109;
    /// ER_TABLEACCESS_DENIED_ERROR
    pub const TABLE_ACCESS_DENIED: u16 = 1142;
    /// ER_NO_SUCH_TABLE
    pub const NO_SUCH_TABLE: u16 = 1146;
    /// ER_KEY_DOES_NOT_EXITS
    pub const NO_SUCH_KEY: u16 = 1176;
    /// ER_SPECIFIC_ACCESS_DENIED_ERROR
    pub const SPECIFIC_ACCESS_DENIED: u16 = 1227;
}

/// MySQL error number carried by a database error, if any.
pub fn error_number(err: &sqlx::Error) -> Option<u16> {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .try_downcast_ref::<MySqlDatabaseError>()
            .map(|e| e.number()),
        _ => None,
    }
}

/// Whether the server rejected a statement because a referenced table,
/// index or schema does not exist.
pub fn is_missing_object(code: u16) -> bool {
    matches!(
        code,
        codes::NO_SUCH_TABLE | codes::NO_SUCH_KEY | codes::UNKNOWN_DATABASE
    )
}

/// Whether the server refused buffer pool introspection.
pub fn is_introspection_refused(code: u16) -> bool {
    matches!(
        code,
        codes::UNKNOWN_TABLE
            | codes::NO_SUCH_TABLE
            | codes::TABLE_ACCESS_DENIED
            | codes::SPECIFIC_ACCESS_DENIED
    )
}

/// Whether an error means the connection itself is unusable.
pub fn is_connection_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Protocol(_)
    )
}

/// Map a failure while establishing the connection.
pub fn map_connect_error(err: sqlx::Error) -> Error {
    Error::Connection(err.to_string())
}

/// Map a failure of an ordinary statement.
pub fn map_query_error(err: sqlx::Error) -> Error {
    if is_connection_error(&err) {
        Error::Connection(err.to_string())
    } else {
        Error::Query(err.to_string())
    }
}
