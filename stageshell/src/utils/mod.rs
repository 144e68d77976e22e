//! Shared utility functions.

mod timestamps;
mod uuid_utils;

pub use timestamps::{format_iso8601, iso_timestamp, now_utc, Timestamp};
pub use uuid_utils::generate_uuid;
