//! Input validation and normalisation helpers shared by all crates
//!
//! This module provides:
//! - Local timestamp parsing/formatting for the event wire format
//! - Time bucketing used as a coarse matching key
//! - String checks for configuration values
//! - Filename sanitising for output paths

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};

// ============================================================================
// CONSTANTS
// ============================================================================

/// `strftime` pattern of event timestamps (`YYYY-MM-DD HH:MM:SS`)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `strftime` pattern embedded in output file names and event ids
pub const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Maximum length for URIs in configuration
pub const MAX_URI_LENGTH: usize = 4096;

/// Maximum length for location and class names
pub const MAX_NAME_LENGTH: usize = 512;

// ============================================================================
// Local Time Operations
// ============================================================================

/// Current local wall-clock time without timezone
pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Format a local time in the event wire format
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse an event wire timestamp
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).with_context(|| {
        format!(
            "invalid timestamp '{}' (expected YYYY-MM-DD HH:MM:SS)",
            value
        )
    })
}

/// Round a timestamp down to a multiple of `bucket_secs`
pub fn floor_to_bucket(ts: NaiveDateTime, bucket_secs: i64) -> NaiveDateTime {
    if bucket_secs <= 0 {
        return ts;
    }
    let secs = ts.and_utc().timestamp();
    let floored = secs.div_euclid(bucket_secs) * bucket_secs;
    DateTime::from_timestamp(floored, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or(ts)
}

/// Bucket label for a wire timestamp.
///
/// Unparseable timestamps are their own bucket so they never collide with
/// well-formed ones.
pub fn time_bucket_label(timestamp: &str, bucket_secs: i64) -> String {
    match parse_timestamp(timestamp) {
        Ok(ts) => format_timestamp(floor_to_bucket(ts, bucket_secs)),
        Err(_) => timestamp.to_string(),
    }
}

// ============================================================================
// String Validation
// ============================================================================

/// Validate string length against a maximum
pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            max_length,
            value.len()
        ));
    }
    Ok(())
}

/// Validate non-empty string
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }
    Ok(())
}

/// Validate name (location, class name)
pub fn validate_name(name: &str, field_name: &str) -> Result<()> {
    validate_non_empty(name, field_name)?;
    validate_length(name, MAX_NAME_LENGTH, field_name)?;
    Ok(())
}

/// Validate stream URI
pub fn validate_uri(uri: &str, field_name: &str) -> Result<()> {
    validate_non_empty(uri, field_name)?;
    validate_length(uri, MAX_URI_LENGTH, field_name)?;

    // Prevent shell metacharacters (command injection)
    let dangerous_chars = ['`', '$', ';', '|', '&', '\n', '\r'];
    if uri.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(anyhow!(
            "{} contains dangerous shell metacharacters",
            field_name
        ));
    }

    Ok(())
}

// ============================================================================
// Filenames
// ============================================================================

/// Make `text` safe for use in a file name.
///
/// Names listed in `preserved` (configured locations) are returned unchanged,
/// umlauts included. Everything else gets spaces replaced by `_` and any
/// character outside `[A-Za-z0-9_äöüÄÖÜß]` removed.
pub fn sanitize_filename(text: &str, preserved: &[String]) -> String {
    if preserved.iter().any(|p| p == text) {
        return text.to_string();
    }
    text.replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || "üöäÜÖÄß".contains(*c))
        .collect()
}
