pub mod item;
pub mod note;
pub mod payment;
pub mod tag;

use chrono::{NaiveDateTime, Utc};

/// Current time in the UTC-naive convention used by every stored timestamp.
pub(crate) fn utc_now() -> NaiveDateTime {
    Utc::now().naive_utc()
}
