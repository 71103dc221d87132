//! # SQLite Repositories
//!
//! One repository per table group. Each holds a pool clone and maps rows
//! into `tally-core` records through their validating `restore`
//! constructors, so a row that breaks a record invariant surfaces as
//! `DbError::Corrupt` instead of a live value.
//!
//! Statements that must run inside a transaction are free functions taking
//! `&mut SqliteConnection`.

pub mod client;
pub mod payment;
pub mod product;
pub mod sale;

use chrono::{DateTime, Utc};

use crate::error::{DbError, DbResult};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Timestamp → `*_at_ns` column value.
pub(crate) fn to_nanos(at: DateTime<Utc>) -> DbResult<i64> {
    at.timestamp_nanos_opt()
        .ok_or_else(|| DbError::InvalidWrite(format!("timestamp {} out of range", at)))
}

/// `*_at_ns` column value → timestamp.
pub(crate) fn from_nanos(nanos: i64) -> DbResult<DateTime<Utc>> {
    let secs = nanos.div_euclid(NANOS_PER_SEC);
    let subsec = nanos.rem_euclid(NANOS_PER_SEC) as u32;
    DateTime::from_timestamp(secs, subsec)
        .ok_or_else(|| DbError::Corrupt(format!("timestamp {}ns out of range", nanos)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_nanos_keep_full_precision() {
        let at = Utc.timestamp_opt(1_710_000_000, 123_456_789).unwrap();
        let back = from_nanos(to_nanos(at).unwrap()).unwrap();
        assert_eq!(back, at);
    }

    #[test]
    fn test_pre_epoch_timestamps() {
        let at = Utc.timestamp_opt(-5, 250).unwrap();
        assert_eq!(from_nanos(to_nanos(at).unwrap()).unwrap(), at);
    }
}
