//! Row-level persistence operations.
//!
//! Model types live in their domain modules; the impl blocks here add the
//! SQL that reads and writes them. Every operation takes a plain connection
//! so the caller decides transaction boundaries.

use chrono::{DateTime, Utc};

pub mod attachment;
pub mod identity;
pub mod message;

/// Current time at the millisecond precision rows are stored with, so a
/// value handed back to a caller equals its later re-read.
pub(crate) fn now_ms() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
