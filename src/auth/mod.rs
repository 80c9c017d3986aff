//! Request signing for the Azure Blob Storage API.

mod account_sas;
mod blob_sas;
mod credential;
mod sas_token;
pub mod shared_key;

pub use account_sas::*;
pub use blob_sas::*;
pub use credential::*;
pub use sas_token::*;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Formats a datetime for a SAS token (whole seconds).
pub fn format_sas_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parses a SAS datetime string.
pub fn parse_sas_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ")
                .ok()
                .map(|dt| dt.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}
