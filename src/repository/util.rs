//! Repository utilities.

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::result::DatabaseErrorInformation;

/// Storage format for every timestamp column.
pub const DB_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Simple error info wrapper for database errors.
#[derive(Debug)]
pub struct DbErrorInfo(pub String);

impl DatabaseErrorInformation for DbErrorInfo {
    fn message(&self) -> &str {
        &self.0
    }
    fn details(&self) -> Option<&str> {
        None
    }
    fn hint(&self) -> Option<&str> {
        None
    }
    fn table_name(&self) -> Option<&str> {
        None
    }
    fn column_name(&self) -> Option<&str> {
        None
    }
    fn constraint_name(&self) -> Option<&str> {
        None
    }
    fn statement_position(&self) -> Option<i32> {
        None
    }
}

/// Convert any displayable error to a diesel error with proper message.
pub fn to_diesel_error(e: impl std::fmt::Display) -> diesel::result::Error {
    diesel::result::Error::DatabaseError(
        diesel::result::DatabaseErrorKind::Unknown,
        Box::new(DbErrorInfo(e.to_string())),
    )
}

/// Current UTC time as a stored timestamp.
pub fn db_now() -> String {
    db_timestamp(&Utc::now())
}

pub fn db_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(DB_TIMESTAMP_FORMAT).to_string()
}

pub fn format_naive(dt: &NaiveDateTime) -> String {
    dt.format(DB_TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored naive timestamp, `None` when malformed.
pub fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DB_TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naive_round_trip_uses_fixed_format() {
        let dt = NaiveDateTime::parse_from_str("2024-05-10 14:30:00", DB_TIMESTAMP_FORMAT).unwrap();
        assert_eq!(format_naive(&dt), "2024-05-10 14:30:00");
        assert_eq!(parse_naive("2024-05-10 14:30:00"), Some(dt));
        assert_eq!(parse_naive("10/05/2024"), None);
    }

    #[test]
    fn wrapped_errors_keep_message() {
        let err = to_diesel_error("unable to open database file");
        assert!(err.to_string().contains("unable to open database file"));
    }
}
